//! Embedded document store.
//!
//! [`SqliteStore`] owns a [`rusqlite::Connection`] and an in-process
//! listener registry.  Every write runs in one SQLite transaction; after it
//! commits, the affected listeners receive fresh snapshots before the write
//! call returns.  Server timestamps come from the store's [`Clock`] and
//! never go backwards.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use directories::ProjectDirs;
use parley_shared::Clock;
use rusqlite::Connection;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::documents;
use crate::error::{Result, StoreError};
use crate::gateway::{
    BatchOp, DocumentSnapshot, DocumentStore, QuerySnapshot, SetOptions, WriteBatch,
};
use crate::listeners::{Listener, Listeners};
use crate::migrations;
use crate::path::{CollectionPath, DocumentPath};
use crate::query::Query;
use crate::subscription::Subscription;
use crate::value::{self, Fields};

struct Db {
    conn: Connection,
    /// Last server timestamp handed out.
    last_timestamp: i64,
}

struct Inner {
    db: Mutex<Db>,
    listeners: Mutex<Listeners>,
    clock: Arc<dyn Clock>,
}

/// SQLite-backed [`DocumentStore`].  Clones share the same database.
#[derive(Clone)]
pub struct SqliteStore {
    inner: Arc<Inner>,
}

impl SqliteStore {
    /// Open (or create) the default database in the platform data directory:
    /// - Linux:   `~/.local/share/parley/parley.db`
    /// - macOS:   `~/Library/Application Support/com.parley.parley/parley.db`
    /// - Windows: `{FOLDERID_RoamingAppData}\parley\parley\data\parley.db`
    pub fn open_default(clock: Arc<dyn Clock>) -> Result<Self> {
        let project_dirs =
            ProjectDirs::from("com", "parley", "parley").ok_or(StoreError::NoDataDir)?;

        let data_dir = project_dirs.data_dir();
        std::fs::create_dir_all(data_dir)?;

        Self::open_at(&data_dir.join("parley.db"), clock)
    }

    /// Open (or create) a database at an explicit path.
    pub fn open_at(path: &Path, clock: Arc<dyn Clock>) -> Result<Self> {
        tracing::info!(path = %path.display(), "opening document store");

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::from_connection(conn, clock)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory(clock: Arc<dyn Clock>) -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?, clock)
    }

    fn from_connection(conn: Connection, clock: Arc<dyn Clock>) -> Result<Self> {
        migrations::run_migrations(&conn)?;

        Ok(Self {
            inner: Arc::new(Inner {
                db: Mutex::new(Db {
                    conn,
                    last_timestamp: i64::MIN,
                }),
                listeners: Mutex::new(Listeners::default()),
                clock,
            }),
        })
    }

    /// Number of live listeners.
    pub fn listener_count(&self) -> usize {
        self.lock_listeners().map(|l| l.len()).unwrap_or(0)
    }

    fn lock_db(&self) -> Result<MutexGuard<'_, Db>> {
        self.inner
            .db
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("Lock poisoned: {e}")))
    }

    fn lock_listeners(&self) -> Result<MutexGuard<'_, Listeners>> {
        self.inner
            .listeners
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("Lock poisoned: {e}")))
    }

    /// Apply `ops` in one transaction, then notify listeners.
    fn apply(&self, ops: Vec<BatchOp>) -> Result<()> {
        for op in &ops {
            op.path().validate()?;
        }
        let touched: Vec<DocumentPath> = ops.iter().map(|op| op.path().clone()).collect();

        let mut db = self.lock_db()?;
        let now = self.inner.clock.now_millis().max(db.last_timestamp);

        let tx = db.conn.transaction()?;
        for op in ops {
            apply_op(&tx, op, now)?;
        }
        tx.commit()?;
        db.last_timestamp = now;

        debug!(writes = touched.len(), timestamp = now, "commit applied");

        self.lock_listeners()?.notify(&db.conn, &touched);
        Ok(())
    }

    fn subscription<T>(&self, id: u64, rx: mpsc::UnboundedReceiver<Result<T>>) -> Subscription<T> {
        let inner: Weak<Inner> = Arc::downgrade(&self.inner);
        Subscription::new(rx, move || {
            if let Some(inner) = inner.upgrade() {
                if let Ok(mut listeners) = inner.listeners.lock() {
                    listeners.remove(id);
                }
            }
        })
    }
}

fn apply_op(conn: &Connection, op: BatchOp, now: i64) -> Result<()> {
    match op {
        BatchOp::Set {
            path,
            fields,
            options,
        } => {
            let data = if options.merge {
                let mut base = documents::load(conn, &path)?.unwrap_or_default();
                value::merge_into(&mut base, fields, now);
                base
            } else {
                value::resolve(fields, now)
            };
            documents::upsert(conn, &path, &data)
        }
        BatchOp::Update { path, fields } => {
            let mut base = documents::load(conn, &path)?
                .ok_or_else(|| StoreError::NotFound(path.to_string()))?;
            value::update_fields(&mut base, fields, now);
            documents::upsert(conn, &path, &base)
        }
        BatchOp::Delete { path } => {
            documents::delete(conn, &path)?;
            Ok(())
        }
    }
}

impl DocumentStore for SqliteStore {
    async fn set(&self, path: &DocumentPath, fields: Fields, options: SetOptions) -> Result<()> {
        self.apply(vec![BatchOp::Set {
            path: path.clone(),
            fields,
            options,
        }])
    }

    async fn add(&self, collection: &CollectionPath, fields: Fields) -> Result<DocumentPath> {
        let path = collection.doc(&Uuid::new_v4().simple().to_string());
        self.apply(vec![BatchOp::Set {
            path: path.clone(),
            fields,
            options: SetOptions::REPLACE,
        }])?;
        Ok(path)
    }

    async fn update(&self, path: &DocumentPath, fields: Fields) -> Result<()> {
        self.apply(vec![BatchOp::Update {
            path: path.clone(),
            fields,
        }])
    }

    async fn delete(&self, path: &DocumentPath) -> Result<()> {
        self.apply(vec![BatchOp::Delete { path: path.clone() }])
    }

    async fn commit(&self, batch: WriteBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        self.apply(batch.into_ops())
    }

    async fn get(&self, path: &DocumentPath) -> Result<DocumentSnapshot> {
        path.validate()?;
        let db = self.lock_db()?;
        documents::snapshot(&db.conn, path)
    }

    async fn query(&self, query: &Query) -> Result<QuerySnapshot> {
        query.path().validate()?;
        let db = self.lock_db()?;
        documents::run_query(&db.conn, query)
    }

    async fn watch_document(&self, path: &DocumentPath) -> Result<Subscription<DocumentSnapshot>> {
        path.validate()?;
        // Holding the db lock while registering guarantees no commit slips
        // between the initial snapshot and the listener going live.
        let db = self.lock_db()?;
        let snapshot = documents::snapshot(&db.conn, path)?;

        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(Ok(snapshot.clone()));
        let id = self.lock_listeners()?.insert(Listener::Document {
            path: path.clone(),
            tx,
            last: snapshot,
        });
        drop(db);

        debug!(listener = id, path = %path, "document listener attached");
        Ok(self.subscription(id, rx))
    }

    async fn watch_query(&self, query: &Query) -> Result<Subscription<QuerySnapshot>> {
        query.path().validate()?;
        let db = self.lock_db()?;
        let snapshot = documents::run_query(&db.conn, query)?;

        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(Ok(snapshot.clone()));
        let id = self.lock_listeners()?.insert(Listener::Query {
            query: query.clone(),
            tx,
            last: snapshot,
        });
        drop(db);

        debug!(listener = id, collection = %query.path(), "query listener attached");
        Ok(self.subscription(id, rx))
    }
}

#[cfg(test)]
mod tests {
    use parley_shared::ManualClock;
    use serde_json::{json, Value};

    use super::*;
    use crate::value::{delete_field, server_timestamp};

    fn fields(value: Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    fn store_at(millis: i64) -> (SqliteStore, ManualClock) {
        let clock = ManualClock::new(millis);
        let store = SqliteStore::open_in_memory(Arc::new(clock.clone())).unwrap();
        (store, clock)
    }

    #[test]
    fn open_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let store = SqliteStore::open_at(&path, Arc::new(ManualClock::new(0)));
        assert!(store.is_ok());
    }

    #[tokio::test]
    async fn test_documents_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("persist.db");
        let doc = CollectionPath::root("users").doc("u1");
        {
            let store = SqliteStore::open_at(&path, Arc::new(ManualClock::new(0))).unwrap();
            store
                .set(&doc, fields(json!({ "uid": "u1" })), SetOptions::REPLACE)
                .await
                .unwrap();
        }
        let store = SqliteStore::open_at(&path, Arc::new(ManualClock::new(0))).unwrap();
        assert!(store.get(&doc).await.unwrap().exists());
    }

    #[tokio::test]
    async fn test_set_merge_and_server_timestamp() {
        let (store, clock) = store_at(1_000);
        let doc = CollectionPath::root("status").doc("u1");

        store
            .set(
                &doc,
                fields(json!({ "sessions": { "s1": { "lastActive": server_timestamp() } } })),
                SetOptions::MERGE,
            )
            .await
            .unwrap();
        clock.advance_secs(5);
        store
            .set(
                &doc,
                fields(json!({ "sessions": { "s2": { "lastActive": server_timestamp() } } })),
                SetOptions::MERGE,
            )
            .await
            .unwrap();

        let data = store.get(&doc).await.unwrap().data.unwrap();
        assert_eq!(
            Value::Object(data),
            json!({ "sessions": { "s1": { "lastActive": 1000 }, "s2": { "lastActive": 6000 } } })
        );
    }

    #[tokio::test]
    async fn test_server_timestamps_never_go_backwards() {
        let (store, clock) = store_at(5_000);
        let messages = CollectionPath::root("m");
        store
            .add(&messages, fields(json!({ "n": 1, "timestamp": server_timestamp() })))
            .await
            .unwrap();
        clock.set(1_000);
        store
            .add(&messages, fields(json!({ "n": 2, "timestamp": server_timestamp() })))
            .await
            .unwrap();

        let snap = store
            .query(&Query::collection(messages).order_by_asc("timestamp"))
            .await
            .unwrap();
        let stamps: Vec<i64> = snap
            .documents
            .iter()
            .map(|d| d.data["timestamp"].as_i64().unwrap())
            .collect();
        assert_eq!(stamps, vec![5_000, 5_000]);
        let order: Vec<i64> = snap.documents.iter().map(|d| d.data["n"].as_i64().unwrap()).collect();
        assert_eq!(order, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_update_missing_document_fails() {
        let (store, _) = store_at(0);
        let doc = CollectionPath::root("m").doc("nope");
        let err = store.update(&doc, fields(json!({ "deleted": true }))).await;
        assert!(matches!(err, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_failed_batch_applies_nothing() {
        let (store, _) = store_at(0);
        let keep = CollectionPath::root("m").doc("keep");
        store
            .set(&keep, fields(json!({ "v": 1 })), SetOptions::REPLACE)
            .await
            .unwrap();

        let mut batch = WriteBatch::new();
        batch
            .delete(keep.clone())
            .update(CollectionPath::root("m").doc("missing"), fields(json!({ "v": 2 })));
        assert!(store.commit(batch).await.is_err());

        assert!(store.get(&keep).await.unwrap().exists());
    }

    #[tokio::test]
    async fn test_batch_set_applies_with_other_writes() {
        let (store, _) = store_at(0);
        let gone = CollectionPath::root("m").doc("gone");
        let fresh = CollectionPath::root("m").doc("fresh");
        store
            .set(&gone, fields(json!({ "v": 1 })), SetOptions::REPLACE)
            .await
            .unwrap();

        let mut batch = WriteBatch::new();
        batch
            .delete(gone.clone())
            .set(fresh.clone(), fields(json!({ "v": 2 })), SetOptions::MERGE);
        assert_eq!(batch.len(), 2);
        store.commit(batch).await.unwrap();

        assert!(!store.get(&gone).await.unwrap().exists());
        assert_eq!(store.get(&fresh).await.unwrap().data.unwrap()["v"], 2);
    }

    #[tokio::test]
    async fn test_watch_query_pushes_changes() {
        let (store, _) = store_at(0);
        let users = CollectionPath::root("users");
        let query = Query::collection(users.clone()).where_ne("uid", "me");
        let mut sub = store.watch_query(&query).await.unwrap();

        let initial = sub.next_snapshot().await.unwrap().unwrap();
        assert!(initial.is_empty());

        store
            .set(&users.doc("me"), fields(json!({ "uid": "me" })), SetOptions::REPLACE)
            .await
            .unwrap();
        store
            .set(&users.doc("u2"), fields(json!({ "uid": "u2" })), SetOptions::REPLACE)
            .await
            .unwrap();

        // The write of "me" does not change the result, so only one snapshot follows.
        let next = sub.next_snapshot().await.unwrap().unwrap();
        assert_eq!(next.ids().collect::<Vec<_>>(), vec!["u2"]);
    }

    #[tokio::test]
    async fn test_watch_document_sees_deletion() {
        let (store, _) = store_at(0);
        let doc = CollectionPath::root("chatMeta").doc("a_b");
        store
            .set(&doc, fields(json!({ "lastMessage": "hi" })), SetOptions::MERGE)
            .await
            .unwrap();

        let mut sub = store.watch_document(&doc).await.unwrap();
        assert!(sub.next_snapshot().await.unwrap().unwrap().exists());

        store.delete(&doc).await.unwrap();
        assert!(!sub.next_snapshot().await.unwrap().unwrap().exists());
    }

    #[tokio::test]
    async fn test_dropping_subscription_detaches_listener() {
        let (store, _) = store_at(0);
        let sub = store
            .watch_query(&Query::collection(CollectionPath::root("status")))
            .await
            .unwrap();
        assert_eq!(store.listener_count(), 1);
        drop(sub);
        assert_eq!(store.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_delete_field_in_merge() {
        let (store, _) = store_at(0);
        let doc = CollectionPath::root("status").doc("u1");
        store
            .set(
                &doc,
                fields(json!({ "sessions": { "a": { "lastActive": 1 }, "b": { "lastActive": 2 } } })),
                SetOptions::REPLACE,
            )
            .await
            .unwrap();
        store
            .set(&doc, fields(json!({ "sessions": { "a": delete_field() } })), SetOptions::MERGE)
            .await
            .unwrap();
        let data = store.get(&doc).await.unwrap().data.unwrap();
        assert_eq!(data["sessions"], json!({ "b": { "lastActive": 2 } }));
    }
}
