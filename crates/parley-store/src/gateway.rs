//! The document store interface consumed by the client.
//!
//! Every operation is one remote round trip.  Reads through subscriptions
//! are push based: a [`Subscription`] yields the current snapshot first and
//! a fresh one after every commit that changes its result.

use std::future::Future;

use crate::error::Result;
use crate::path::{CollectionPath, DocumentPath};
use crate::query::Query;
use crate::subscription::Subscription;
use crate::value::Fields;

// ---------------------------------------------------------------------------
// Write options
// ---------------------------------------------------------------------------

/// How a `set` combines with an existing document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// Deep-merge into the existing document instead of replacing it.
    pub merge: bool,
}

impl SetOptions {
    pub const REPLACE: Self = Self { merge: false };
    pub const MERGE: Self = Self { merge: true };
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

/// One document returned by a query.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Fields,
}

/// The state of a single document.  `data` is `None` when it does not exist.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSnapshot {
    pub path: DocumentPath,
    pub data: Option<Fields>,
}

impl DocumentSnapshot {
    pub fn exists(&self) -> bool {
        self.data.is_some()
    }

    pub fn id(&self) -> &str {
        self.path.id()
    }
}

/// The ordered result set of a query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuerySnapshot {
    pub documents: Vec<Document>,
}

impl QuerySnapshot {
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.documents.iter().map(|d| d.id.as_str())
    }
}

// ---------------------------------------------------------------------------
// Batches
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum BatchOp {
    Set {
        path: DocumentPath,
        fields: Fields,
        options: SetOptions,
    },
    Update {
        path: DocumentPath,
        fields: Fields,
    },
    Delete {
        path: DocumentPath,
    },
}

impl BatchOp {
    pub fn path(&self) -> &DocumentPath {
        match self {
            BatchOp::Set { path, .. } | BatchOp::Update { path, .. } | BatchOp::Delete { path } => {
                path
            }
        }
    }
}

/// A group of writes committed all-or-nothing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) fn set(&mut self, path: DocumentPath, fields: Fields, options: SetOptions) -> &mut Self {
        self.ops.push(BatchOp::Set {
            path,
            fields,
            options,
        });
        self
    }

    #[cfg(test)]
    pub(crate) fn update(&mut self, path: DocumentPath, fields: Fields) -> &mut Self {
        self.ops.push(BatchOp::Update { path, fields });
        self
    }

    pub fn delete(&mut self, path: DocumentPath) -> &mut Self {
        self.ops.push(BatchOp::Delete { path });
        self
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<BatchOp> {
        self.ops
    }
}

// ---------------------------------------------------------------------------
// Gateway trait
// ---------------------------------------------------------------------------

/// Remote document store: keyed writes, atomic batches, one-shot reads and
/// snapshot subscriptions.
pub trait DocumentStore: Send + Sync + 'static {
    /// Create or overwrite (or, with [`SetOptions::MERGE`], merge into) a
    /// document.
    fn set(
        &self,
        path: &DocumentPath,
        fields: Fields,
        options: SetOptions,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Create a document with a store-assigned id.
    fn add(
        &self,
        collection: &CollectionPath,
        fields: Fields,
    ) -> impl Future<Output = Result<DocumentPath>> + Send;

    /// Replace top-level fields of an existing document.  Fails with
    /// `NotFound` when the document does not exist.
    fn update(&self, path: &DocumentPath, fields: Fields)
        -> impl Future<Output = Result<()>> + Send;

    /// Delete a document.  Deleting a missing document is not an error.
    fn delete(&self, path: &DocumentPath) -> impl Future<Output = Result<()>> + Send;

    /// Apply every write of `batch` atomically.
    fn commit(&self, batch: WriteBatch) -> impl Future<Output = Result<()>> + Send;

    /// One-shot read of a document.
    fn get(&self, path: &DocumentPath) -> impl Future<Output = Result<DocumentSnapshot>> + Send;

    /// One-shot read of a query.
    fn query(&self, query: &Query) -> impl Future<Output = Result<QuerySnapshot>> + Send;

    /// Subscribe to a single document.
    fn watch_document(
        &self,
        path: &DocumentPath,
    ) -> impl Future<Output = Result<Subscription<DocumentSnapshot>>> + Send;

    /// Subscribe to a query.
    fn watch_query(
        &self,
        query: &Query,
    ) -> impl Future<Output = Result<Subscription<QuerySnapshot>>> + Send;
}
