//! Top-level client state machine.
//!
//! ```text
//! Unauthenticated --sign_in/sign_up--> Authenticating --ok--> Authenticated
//!        ^                                   |                     |
//!        +------------- error ---------------+                     |
//!        +------------------------ sign_out -----------------------+
//! ```
//!
//! Entering `Authenticated` opens a [`ChatSession`]; leaving it shuts the
//! session down, releasing every subscription and the heartbeat.

use std::sync::Arc;

use parley_shared::{Clock, UserId};
use parley_store::{DocumentStore, SetOptions};
use serde_json::json;
use tracing::{info, warn};

use crate::auth::{AuthProvider, AuthUser};
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::models::{self, email_local_part, User};
use crate::paths;
use crate::session::ChatSession;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPhase {
    Unauthenticated,
    Authenticating,
    Authenticated,
}

pub struct App<S: DocumentStore, A: AuthProvider> {
    store: Arc<S>,
    auth: A,
    config: ClientConfig,
    clock: Arc<dyn Clock>,
    phase: AuthPhase,
    session: Option<ChatSession<S>>,
    last_error: Option<String>,
}

impl<S: DocumentStore, A: AuthProvider> App<S, A> {
    pub fn new(store: Arc<S>, auth: A, config: ClientConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            auth,
            config,
            clock,
            phase: AuthPhase::Unauthenticated,
            session: None,
            last_error: None,
        }
    }

    pub fn phase(&self) -> AuthPhase {
        self.phase
    }

    pub fn session(&self) -> Option<&ChatSession<S>> {
        self.session.as_ref()
    }

    /// The active session, or `NotAuthenticated`.
    pub fn require_session(&self) -> Result<&ChatSession<S>> {
        self.session.as_ref().ok_or(ClientError::NotAuthenticated)
    }

    pub fn auth(&self) -> &A {
        &self.auth
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Message of the last failed authentication attempt.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Create an account, write its directory record and open a session.
    /// Without a username the local part of the email is used.
    pub async fn sign_up(
        &mut self,
        email: &str,
        password: &str,
        username: Option<&str>,
    ) -> Result<&ChatSession<S>> {
        self.begin_authentication().await;

        let outcome = match self.auth.sign_up(email, password).await {
            Ok(auth_user) => {
                let registered = self.register_directory(&auth_user, username).await;
                if registered.is_err() {
                    self.abandon_provider_session().await;
                }
                registered
            }
            Err(e) => Err(e.into()),
        };
        self.finish_authentication(outcome)
    }

    pub async fn sign_in(&mut self, email: &str, password: &str) -> Result<&ChatSession<S>> {
        self.begin_authentication().await;

        let outcome = match self.auth.sign_in(email, password).await {
            Ok(auth_user) => {
                let loaded = self.load_user(&auth_user).await;
                if loaded.is_err() {
                    self.abandon_provider_session().await;
                }
                loaded
            }
            Err(e) => Err(e.into()),
        };
        self.finish_authentication(outcome)
    }

    /// Open a session for a provider that is already signed in.  Returns
    /// `Ok(None)` when nobody is.
    pub async fn resume(&mut self) -> Result<Option<&ChatSession<S>>> {
        if self.session.is_some() {
            return Ok(self.session.as_ref());
        }
        let Some(auth_user) = self.auth.current_user() else {
            return Ok(None);
        };
        self.phase = AuthPhase::Authenticating;
        let outcome = self.load_user(&auth_user).await;
        self.finish_authentication(outcome).map(Some)
    }

    /// Shut the session down, then sign out of the provider.
    pub async fn sign_out(&mut self) -> Result<()> {
        if let Some(session) = self.session.take() {
            session.shutdown().await;
        }
        self.phase = AuthPhase::Unauthenticated;
        self.auth.sign_out().await?;
        info!("logged out");
        Ok(())
    }

    // ---- Internals ----

    async fn begin_authentication(&mut self) {
        if let Some(session) = self.session.take() {
            session.shutdown().await;
        }
        self.phase = AuthPhase::Authenticating;
        self.last_error = None;
    }

    /// Sign the provider out after a failure past the credential step, so
    /// provider and app agree on `Unauthenticated`.
    async fn abandon_provider_session(&self) {
        if let Err(e) = self.auth.sign_out().await {
            warn!(error = %e, "failed to sign out after aborted authentication");
        }
    }

    fn finish_authentication(&mut self, outcome: Result<User>) -> Result<&ChatSession<S>> {
        match outcome {
            Ok(user) => {
                let session =
                    ChatSession::start(self.store.clone(), user, &self.config, self.clock.clone());
                self.phase = AuthPhase::Authenticated;
                Ok(self.session.insert(session))
            }
            Err(e) => {
                warn!(error = %e, "authentication failed");
                self.phase = AuthPhase::Unauthenticated;
                self.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    async fn register_directory(&self, auth_user: &AuthUser, username: Option<&str>) -> Result<User> {
        let username = username
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| email_local_part(&auth_user.email));
        let user = User {
            uid: auth_user.uid.clone(),
            email: auth_user.email.clone(),
            username: Some(username.to_string()),
        };

        let fields = models::fields(json!({
            "uid": user.uid,
            "email": user.email,
            "username": username,
        }));
        self.store
            .set(&paths::user(&user.uid), fields, SetOptions::REPLACE)
            .await?;
        Ok(user)
    }

    /// The directory record of a signed-in user, or a bare one when the
    /// record is missing.
    async fn load_user(&self, auth_user: &AuthUser) -> Result<User> {
        let snapshot = self.store.get(&paths::user(&auth_user.uid)).await?;
        match snapshot.data {
            Some(fields) => models::decode_user(auth_user.uid.as_str(), fields),
            None => {
                warn!(uid = %auth_user.uid.short(), "signed-in user has no directory record");
                Ok(User {
                    uid: auth_user.uid.clone(),
                    email: auth_user.email.clone(),
                    username: None,
                })
            }
        }
    }

    /// Uid of the signed-in user.
    pub fn current_uid(&self) -> Option<&UserId> {
        self.session.as_ref().map(|s| &s.user().uid)
    }
}
