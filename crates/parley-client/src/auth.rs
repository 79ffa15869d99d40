//! Authentication collaborator.
//!
//! [`AuthProvider`] is the seam to whatever issues user ids.  [`LocalAuth`]
//! keeps accounts in process memory only, so a signed-in session lasts as
//! long as the process and is never written to disk.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;

use parley_shared::constants::MIN_PASSWORD_LEN;
use parley_shared::UserId;
use rand::RngCore;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Invalid email address")]
    InvalidEmail,

    #[error("Password must be at least {min} characters")]
    WeakPassword { min: usize },

    #[error("Email already in use")]
    EmailInUse,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Auth provider error: {0}")]
    Internal(String),
}

/// The signed-in identity reported by a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub uid: UserId,
    pub email: String,
}

pub trait AuthProvider: Send + Sync + 'static {
    /// Create a credential and sign it in.
    fn sign_up(
        &self,
        email: &str,
        password: &str,
    ) -> impl Future<Output = Result<AuthUser, AuthError>> + Send;

    fn sign_in(
        &self,
        email: &str,
        password: &str,
    ) -> impl Future<Output = Result<AuthUser, AuthError>> + Send;

    fn sign_out(&self) -> impl Future<Output = Result<(), AuthError>> + Send;

    fn current_user(&self) -> Option<AuthUser>;

    /// Observe sign-in and sign-out.
    fn watch_session(&self) -> watch::Receiver<Option<AuthUser>>;
}

// ---------------------------------------------------------------------------
// LocalAuth
// ---------------------------------------------------------------------------

const DIGEST_CONTEXT: &str = "parley local auth 2024-01 password digest";

struct Account {
    uid: UserId,
    email: String,
    salt: [u8; 16],
    digest: blake3::Hash,
}

/// In-memory email/password accounts with salted BLAKE3 digests.
pub struct LocalAuth {
    accounts: Mutex<HashMap<String, Account>>,
    session: watch::Sender<Option<AuthUser>>,
}

impl LocalAuth {
    pub fn new() -> Self {
        let (session, _) = watch::channel(None);
        Self {
            accounts: Mutex::new(HashMap::new()),
            session,
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Account>>, AuthError> {
        self.accounts
            .lock()
            .map_err(|e| AuthError::Internal(format!("Lock poisoned: {e}")))
    }

    fn register(&self, email: &str, password: &str) -> Result<AuthUser, AuthError> {
        let email = normalize_email(email)?;
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::WeakPassword {
                min: MIN_PASSWORD_LEN,
            });
        }

        let mut accounts = self.lock()?;
        if accounts.contains_key(&email) {
            return Err(AuthError::EmailInUse);
        }

        let mut salt = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut salt);
        let account = Account {
            uid: UserId::generate(),
            email: email.clone(),
            salt,
            digest: digest(&salt, password),
        };
        let user = AuthUser {
            uid: account.uid.clone(),
            email: account.email.clone(),
        };
        accounts.insert(email, account);
        Ok(user)
    }

    fn verify(&self, email: &str, password: &str) -> Result<AuthUser, AuthError> {
        let email = normalize_email(email).map_err(|_| AuthError::InvalidCredentials)?;
        let accounts = self.lock()?;
        let account = accounts.get(&email).ok_or(AuthError::InvalidCredentials)?;

        // blake3::Hash equality is constant time.
        if digest(&account.salt, password) != account.digest {
            return Err(AuthError::InvalidCredentials);
        }
        Ok(AuthUser {
            uid: account.uid.clone(),
            email: account.email.clone(),
        })
    }
}

impl Default for LocalAuth {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthProvider for LocalAuth {
    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthUser, AuthError> {
        let user = self.register(email, password)?;
        info!(uid = %user.uid.short(), "account created");
        self.session.send_replace(Some(user.clone()));
        Ok(user)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser, AuthError> {
        let user = self.verify(email, password)?;
        info!(uid = %user.uid.short(), "signed in");
        self.session.send_replace(Some(user.clone()));
        Ok(user)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        if let Some(user) = self.session.send_replace(None) {
            debug!(uid = %user.uid.short(), "signed out");
        }
        Ok(())
    }

    fn current_user(&self) -> Option<AuthUser> {
        self.session.borrow().clone()
    }

    fn watch_session(&self) -> watch::Receiver<Option<AuthUser>> {
        self.session.subscribe()
    }
}

fn digest(salt: &[u8; 16], password: &str) -> blake3::Hash {
    let mut hasher = blake3::Hasher::new_derive_key(DIGEST_CONTEXT);
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hasher.finalize()
}

/// Lowercase and sanity-check an email address.
fn normalize_email(email: &str) -> Result<String, AuthError> {
    let email = email.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain))
            if !local.is_empty() && domain.contains('.') && !domain.contains('@') =>
        {
            Ok(email)
        }
        _ => Err(AuthError::InvalidEmail),
    }
}
