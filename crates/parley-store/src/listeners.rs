//! In-process listener registry for [`SqliteStore`](crate::SqliteStore).
//!
//! After every commit the store hands the touched document paths to
//! [`Listeners::notify`], which recomputes each affected listener's result
//! and pushes it when it differs from the last delivered snapshot.

use std::collections::HashMap;

use rusqlite::Connection;
use tracing::{debug, warn};

use crate::documents;
use crate::gateway::{DocumentSnapshot, QuerySnapshot};
use crate::path::DocumentPath;
use crate::query::Query;
use crate::subscription::SnapshotSender;

pub(crate) enum Listener {
    Document {
        path: DocumentPath,
        tx: SnapshotSender<DocumentSnapshot>,
        last: DocumentSnapshot,
    },
    Query {
        query: Query,
        tx: SnapshotSender<QuerySnapshot>,
        last: QuerySnapshot,
    },
}

#[derive(Default)]
pub(crate) struct Listeners {
    next_id: u64,
    entries: HashMap<u64, Listener>,
}

impl Listeners {
    pub(crate) fn insert(&mut self, listener: Listener) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.insert(id, listener);
        id
    }

    pub(crate) fn remove(&mut self, id: u64) {
        if self.entries.remove(&id).is_some() {
            debug!(listener = id, "listener detached");
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Push fresh snapshots to every listener affected by `touched`.
    ///
    /// Listeners whose receiver is gone, or whose snapshot cannot be
    /// recomputed, are dropped; the latter get the error first.
    pub(crate) fn notify(&mut self, conn: &Connection, touched: &[DocumentPath]) {
        self.entries.retain(|id, listener| match listener {
            Listener::Document { path, tx, last } => {
                if !touched.contains(path) {
                    return !tx.is_closed();
                }
                match documents::snapshot(conn, path) {
                    Ok(snapshot) => deliver(tx, last, snapshot),
                    Err(e) => {
                        warn!(listener = *id, path = %path, error = %e, "document listener failed");
                        let _ = tx.send(Err(e));
                        false
                    }
                }
            }
            Listener::Query { query, tx, last } => {
                if !touched.iter().any(|p| p.collection() == query.path()) {
                    return !tx.is_closed();
                }
                match documents::run_query(conn, query) {
                    Ok(snapshot) => deliver(tx, last, snapshot),
                    Err(e) => {
                        warn!(listener = *id, collection = %query.path(), error = %e, "query listener failed");
                        let _ = tx.send(Err(e));
                        false
                    }
                }
            }
        });
    }
}

fn deliver<T: Clone + PartialEq>(tx: &SnapshotSender<T>, last: &mut T, snapshot: T) -> bool {
    if *last == snapshot {
        return !tx.is_closed();
    }
    *last = snapshot.clone();
    tx.send(Ok(snapshot)).is_ok()
}
