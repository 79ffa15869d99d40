use parley_shared::IdError;
use parley_store::StoreError;
use thiserror::Error;

use crate::auth::AuthError;

/// Errors surfaced by client operations.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The document store rejected or failed a request.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Invalid id: {0}")]
    InvalidId(#[from] IdError),

    /// A stored document could not be decoded into its model.
    #[error("Malformed {kind} document: {reason}")]
    Malformed { kind: &'static str, reason: String },

    /// The session was shut down while waiting on it.
    #[error("Session closed")]
    SessionClosed,

    // -- Validation (rejected before any write) --

    #[error("Not signed in")]
    NotAuthenticated,

    #[error("No conversation selected")]
    NoSelection,

    #[error("Message text is empty")]
    EmptyMessage,

    #[error("Conversation is blocked")]
    Blocked,

    #[error("Message {0} is not in the active conversation")]
    UnknownMessage(String),

    #[error("Only the sender can delete message {0}")]
    NotMessageOwner(String),

    #[error("Cannot target your own account")]
    SelfTarget,
}

impl ClientError {
    /// Whether the error was raised by local validation, without a round trip.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ClientError::NotAuthenticated
                | ClientError::NoSelection
                | ClientError::EmptyMessage
                | ClientError::Blocked
                | ClientError::UnknownMessage(_)
                | ClientError::NotMessageOwner(_)
                | ClientError::SelfTarget
        )
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ClientError>;
