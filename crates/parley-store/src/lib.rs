//! # parley-store
//!
//! The document store gateway used by the Parley client.
//!
//! [`DocumentStore`] is the narrow interface the client consumes: keyed
//! document writes with merge semantics, atomic batches, one-shot reads and
//! push-based snapshot subscriptions.  [`SqliteStore`] implements it on top
//! of an embedded SQLite database so the client can run locally and in
//! tests without a hosted backend.

pub mod database;
pub mod gateway;
pub mod migrations;
pub mod path;
pub mod query;
pub mod subscription;
pub mod value;

mod documents;
mod error;
mod listeners;

pub use database::SqliteStore;
pub use error::{Result, StoreError};
pub use gateway::{
    BatchOp, Document, DocumentSnapshot, DocumentStore, QuerySnapshot, SetOptions, WriteBatch,
};
pub use path::{CollectionPath, DocumentPath};
pub use query::{Filter, Query};
pub use subscription::Subscription;
pub use value::{delete_field, server_timestamp, Fields};
