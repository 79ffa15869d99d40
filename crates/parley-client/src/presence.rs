//! Presence tracking.
//!
//! Every running client owns one session entry under `status/{uid}`.  The
//! heartbeat refreshes its `lastActive` server timestamp; a clean shutdown
//! deletes just that entry so the user's other sessions survive.  Whether a
//! user is online is derived locally from all presence records against the
//! local clock, so the derivation has to be re-run as time passes even when
//! no snapshot arrives.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parley_shared::{SessionId, UserId};
use parley_store::{delete_field, server_timestamp, DocumentStore, QuerySnapshot, SetOptions};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::models::{self, PresenceRecord};
use crate::paths;

// ---- Writes ----

/// Create or refresh this client's session entry.
pub async fn touch_session<S: DocumentStore>(
    store: &S,
    uid: &UserId,
    session: &SessionId,
) -> Result<()> {
    let fields = models::fields(json!({
        "sessions": { session.as_str(): { "lastActive": server_timestamp() } },
        "lastSeen": server_timestamp(),
    }));
    store
        .set(&paths::status(uid), fields, SetOptions::MERGE)
        .await?;
    Ok(())
}

/// Remove this client's session entry, leaving other sessions in place.
pub async fn remove_session<S: DocumentStore>(
    store: &S,
    uid: &UserId,
    session: &SessionId,
) -> Result<()> {
    let fields = models::fields(json!({
        "sessions": { session.as_str(): delete_field() },
        "lastSeen": server_timestamp(),
    }));
    store
        .set(&paths::status(uid), fields, SetOptions::MERGE)
        .await?;
    info!(uid = %uid.short(), session = %session, "presence session removed");
    Ok(())
}

/// Register the session, then refresh it every `interval`.  Runs until
/// aborted; failed writes are logged and retried on the next tick.
pub(crate) async fn run_heartbeat<S: DocumentStore>(
    store: Arc<S>,
    uid: UserId,
    session: SessionId,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        match touch_session(&*store, &uid, &session).await {
            Ok(()) => debug!(uid = %uid.short(), session = %session, "heartbeat"),
            Err(e) => warn!(uid = %uid.short(), error = %e, "heartbeat write failed"),
        }
    }
}

// ---- Derivation ----

/// Decode a snapshot of the presence collection.  Undecodable records are
/// skipped.
pub fn decode_records(snapshot: QuerySnapshot) -> HashMap<UserId, PresenceRecord> {
    let mut records = HashMap::with_capacity(snapshot.len());
    for doc in snapshot.documents {
        let uid = match UserId::parse(&doc.id) {
            Ok(uid) => uid,
            Err(e) => {
                warn!(id = %doc.id, error = %e, "skipping presence record with invalid id");
                continue;
            }
        };
        match models::decode::<PresenceRecord>("presence", doc.data) {
            Ok(record) => {
                records.insert(uid, record);
            }
            Err(e) => warn!(uid = %uid.short(), error = %e, "skipping presence record"),
        }
    }
    records
}

/// `uid -> online` for every known presence record, evaluated at `now`.
pub fn online_map(
    records: &HashMap<UserId, PresenceRecord>,
    now: i64,
    window_ms: i64,
) -> HashMap<UserId, bool> {
    records
        .iter()
        .map(|(uid, record)| (uid.clone(), record.is_online(now, window_ms)))
        .collect()
}
