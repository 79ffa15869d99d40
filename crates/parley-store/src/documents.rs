//! Row-level access to the `documents` table.

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use crate::error::{Result, StoreError};
use crate::gateway::{Document, DocumentSnapshot, QuerySnapshot};
use crate::path::{CollectionPath, DocumentPath};
use crate::query::Query;
use crate::value::Fields;

pub(crate) fn load(conn: &Connection, path: &DocumentPath) -> Result<Option<Fields>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT data FROM documents WHERE collection = ?1 AND doc_id = ?2",
            params![path.collection().as_str(), path.id()],
            |row| row.get(0),
        )
        .optional()?;

    raw.map(|s| parse_fields(&s)).transpose()
}

pub(crate) fn snapshot(conn: &Connection, path: &DocumentPath) -> Result<DocumentSnapshot> {
    Ok(DocumentSnapshot {
        path: path.clone(),
        data: load(conn, path)?,
    })
}

pub(crate) fn upsert(conn: &Connection, path: &DocumentPath, data: &Fields) -> Result<()> {
    let json = serde_json::to_string(data)?;
    conn.execute(
        "INSERT INTO documents (collection, doc_id, data) VALUES (?1, ?2, ?3)
         ON CONFLICT(collection, doc_id) DO UPDATE SET data = excluded.data",
        params![path.collection().as_str(), path.id(), json],
    )?;
    Ok(())
}

pub(crate) fn delete(conn: &Connection, path: &DocumentPath) -> Result<bool> {
    let affected = conn.execute(
        "DELETE FROM documents WHERE collection = ?1 AND doc_id = ?2",
        params![path.collection().as_str(), path.id()],
    )?;
    Ok(affected > 0)
}

/// All documents of a collection in insertion order.
pub(crate) fn list(conn: &Connection, collection: &CollectionPath) -> Result<Vec<Document>> {
    let mut stmt = conn.prepare(
        "SELECT doc_id, data FROM documents
         WHERE collection = ?1
         ORDER BY seq ASC",
    )?;

    let rows = stmt.query_map(params![collection.as_str()], |row| {
        let id: String = row.get(0)?;
        let data: String = row.get(1)?;
        Ok((id, data))
    })?;

    let mut documents = Vec::new();
    for row in rows {
        let (id, data) = row?;
        documents.push(Document {
            id,
            data: parse_fields(&data)?,
        });
    }
    Ok(documents)
}

pub(crate) fn run_query(conn: &Connection, query: &Query) -> Result<QuerySnapshot> {
    let mut documents: Vec<Document> = list(conn, query.path())?
        .into_iter()
        .filter(|d| query.matches(&d.data))
        .collect();
    query.sort(&mut documents, |d| &d.data);
    Ok(QuerySnapshot { documents })
}

fn parse_fields(raw: &str) -> Result<Fields> {
    match serde_json::from_str::<Value>(raw)? {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Corrupt(format!("expected an object, found {other}"))),
    }
}
