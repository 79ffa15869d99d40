use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Failed to determine a platform data directory.
    #[error("Could not determine application data directory")]
    NoDataDir,

    /// Generic I/O error (e.g. creating the database directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An update targeted a document that does not exist.
    #[error("Document not found: {0}")]
    NotFound(String),

    /// Migration failure.
    #[error("Migration error: {0}")]
    Migration(String),

    /// Stored or supplied document data is not a JSON object.
    #[error("Invalid document data: {0}")]
    Json(#[from] serde_json::Error),

    /// A stored row that does not hold a JSON object.
    #[error("Corrupt document: {0}")]
    Corrupt(String),

    /// A path with empty segments or the wrong number of segments.
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// The listener behind a subscription is gone.
    #[error("Subscription closed")]
    SubscriptionClosed,

    /// The backend could not serve the request (poisoned lock, network).
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
