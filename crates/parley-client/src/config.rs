//! Client configuration loaded from environment variables.
//!
//! Every setting has a default, so a client starts with zero configuration.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parley_shared::constants::{
    HEARTBEAT_INTERVAL_SECS, LIVENESS_WINDOW_SECS, NOTIFICATION_TTL_SECS,
    PRESENCE_REEVALUATION_SECS,
};
use parley_shared::Clock;
use parley_store::{SqliteStore, StoreError};

/// Where the embedded document store lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    /// Platform data directory (`parley.db`).
    Default,
    /// Private in-memory database.
    InMemory,
    /// Explicit database file.
    Path(PathBuf),
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Env: `PARLEY_DB_PATH` (`:memory:` for an in-memory store)
    /// Default: platform data directory
    pub store: StoreLocation,

    /// How often this client refreshes its presence session.
    /// Env: `PARLEY_HEARTBEAT_SECS`
    /// Default: 30
    pub heartbeat_interval: Duration,

    /// A session counts as online if refreshed within this window.
    /// Env: `PARLEY_LIVENESS_SECS`
    /// Default: 60
    pub liveness_window: Duration,

    /// Period of the local presence re-evaluation.
    /// Env: `PARLEY_PRESENCE_REEVAL_SECS`
    /// Default: 30
    pub presence_reevaluation: Duration,

    /// Lifetime of a transient notification.
    /// Env: `PARLEY_NOTIFICATION_TTL_SECS`
    /// Default: 4
    pub notification_ttl: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            store: StoreLocation::Default,
            heartbeat_interval: Duration::from_secs(HEARTBEAT_INTERVAL_SECS),
            liveness_window: Duration::from_secs(LIVENESS_WINDOW_SECS),
            presence_reevaluation: Duration::from_secs(PRESENCE_REEVALUATION_SECS),
            notification_ttl: Duration::from_secs(NOTIFICATION_TTL_SECS),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(path) = lookup("PARLEY_DB_PATH") {
            config.store = match path.trim() {
                "" => StoreLocation::Default,
                ":memory:" => StoreLocation::InMemory,
                other => StoreLocation::Path(PathBuf::from(other)),
            };
        }

        read_secs(&lookup, "PARLEY_HEARTBEAT_SECS", &mut config.heartbeat_interval);
        read_secs(&lookup, "PARLEY_LIVENESS_SECS", &mut config.liveness_window);
        read_secs(
            &lookup,
            "PARLEY_PRESENCE_REEVAL_SECS",
            &mut config.presence_reevaluation,
        );
        read_secs(
            &lookup,
            "PARLEY_NOTIFICATION_TTL_SECS",
            &mut config.notification_ttl,
        );

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter.

        config
    }

    /// Open the embedded store this configuration points at.
    pub fn open_store(&self, clock: Arc<dyn Clock>) -> Result<SqliteStore, StoreError> {
        match &self.store {
            StoreLocation::Default => SqliteStore::open_default(clock),
            StoreLocation::InMemory => SqliteStore::open_in_memory(clock),
            StoreLocation::Path(path) => SqliteStore::open_at(path, clock),
        }
    }

    pub(crate) fn liveness_window_ms(&self) -> i64 {
        i64::try_from(self.liveness_window.as_millis()).unwrap_or(i64::MAX)
    }

    pub(crate) fn notification_ttl_ms(&self) -> i64 {
        i64::try_from(self.notification_ttl.as_millis()).unwrap_or(i64::MAX)
    }
}

/// Overwrite `target` with a positive number of seconds read from `key`.
fn read_secs(lookup: &impl Fn(&str) -> Option<String>, key: &str, target: &mut Duration) {
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => *target = Duration::from_secs(secs),
        _ => tracing::warn!(key, value = %raw, "Invalid duration, using default"),
    }
}
