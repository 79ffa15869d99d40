//! Client core of the Parley one-to-one messenger.
//!
//! A signed-in [`ChatSession`] keeps a live view of the directory, presence,
//! blocks and conversations of one user over a [`parley_store::DocumentStore`]
//! and exposes the compound conversation actions.  [`App`] drives
//! authentication and owns at most one session.

pub mod actions;
pub mod app;
pub mod auth;
pub mod blocks;
pub mod config;
pub mod error;
pub mod events;
pub mod messages;
pub mod models;
pub mod notifications;
pub mod paths;
pub mod presence;
pub mod roster;
pub mod session;
pub mod state;

#[cfg(test)]
mod testing;

use tracing_subscriber::{fmt, EnvFilter};

pub use app::{App, AuthPhase};
pub use auth::{AuthError, AuthProvider, AuthUser, LocalAuth};
pub use blocks::{BlockResolver, BlockStatus};
pub use config::{ClientConfig, StoreLocation};
pub use error::{ClientError, Result};
pub use models::{ConversationMeta, Message, PresenceRecord, User};
pub use notifications::{Notification, NotificationKind};
pub use roster::{Roster, RosterEntry};
pub use session::ChatSession;
pub use state::{ChatState, Selection};

/// Install the global tracing subscriber.  `RUST_LOG` overrides the default
/// filter.  Calling it twice is a no-op.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("parley_client=debug,parley_store=info,warn"));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}
