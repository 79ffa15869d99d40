//! v001 -- Initial schema creation.
//!
//! Every document of every collection lives in one `documents` table, keyed
//! by its collection path and id.  `seq` records insertion order and breaks
//! ordering ties in queries.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    seq        INTEGER PRIMARY KEY AUTOINCREMENT,
    collection TEXT NOT NULL,                 -- slash separated collection path
    doc_id     TEXT NOT NULL,
    data       TEXT NOT NULL,                 -- JSON object

    UNIQUE (collection, doc_id)
);

CREATE INDEX IF NOT EXISTS idx_documents_collection
    ON documents(collection, seq);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
