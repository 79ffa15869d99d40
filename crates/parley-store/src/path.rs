//! Slash-separated collection and document paths.
//!
//! A collection path has an odd number of segments (`users`,
//! `users/u1/blockedUsers`), a document path an even number
//! (`users/u1`, `chats/a_b/messages/m1`).

use std::fmt;

use crate::error::{Result, StoreError};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionPath(String);

impl CollectionPath {
    /// A top-level collection.
    pub fn root(name: &str) -> Self {
        Self(name.to_string())
    }

    /// Parse and validate a full collection path.
    pub fn parse(path: &str) -> Result<Self> {
        let segments = segments(path)?;
        if segments.len() % 2 == 0 {
            return Err(StoreError::InvalidPath(format!(
                "collection path needs an odd number of segments: {path}"
            )));
        }
        Ok(Self(path.to_string()))
    }

    /// The document `id` inside this collection.
    pub fn doc(&self, id: &str) -> DocumentPath {
        DocumentPath {
            collection: self.clone(),
            id: id.to_string(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub(crate) fn validate(&self) -> Result<()> {
        Self::parse(&self.0).map(|_| ())
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentPath {
    collection: CollectionPath,
    id: String,
}

impl DocumentPath {
    /// Parse and validate a full document path.
    pub fn parse(path: &str) -> Result<Self> {
        let segments = segments(path)?;
        if segments.len() % 2 != 0 {
            return Err(StoreError::InvalidPath(format!(
                "document path needs an even number of segments: {path}"
            )));
        }
        let (parent, id) = path
            .rsplit_once('/')
            .ok_or_else(|| StoreError::InvalidPath(path.to_string()))?;
        Ok(Self {
            collection: CollectionPath(parent.to_string()),
            id: id.to_string(),
        })
    }

    pub fn collection(&self) -> &CollectionPath {
        &self.collection
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// A sub-collection nested under this document.
    pub fn child(&self, name: &str) -> CollectionPath {
        CollectionPath(format!("{self}/{name}"))
    }

    pub(crate) fn validate(&self) -> Result<()> {
        self.collection.validate()?;
        if self.id.is_empty() || self.id.contains('/') {
            return Err(StoreError::InvalidPath(self.to_string()));
        }
        Ok(())
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

fn segments(path: &str) -> Result<Vec<&str>> {
    let segments: Vec<&str> = path.split('/').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(StoreError::InvalidPath(format!("empty segment in {path:?}")));
    }
    Ok(segments)
}
