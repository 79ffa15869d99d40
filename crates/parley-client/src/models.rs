//! Typed views of the documents the client works with.
//!
//! Documents are decoded from store [`Fields`] with serde; field names
//! follow the store's camelCase layout.

use std::collections::HashMap;

use parley_shared::UserId;
use parley_store::{Document, Fields};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ClientError, Result};

// ---------------------------------------------------------------------------
// Directory
// ---------------------------------------------------------------------------

/// Directory record of a registered user (`users/{uid}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub uid: UserId,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl User {
    /// The username, else the local part of the email.
    pub fn display_name(&self) -> &str {
        match self.username.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => email_local_part(&self.email),
        }
    }

    /// Upper-cased first letter of the display name, for avatars.
    pub fn initial(&self) -> char {
        self.display_name()
            .chars()
            .next()
            .map(|c| c.to_ascii_uppercase())
            .unwrap_or('U')
    }

    /// Case-insensitive substring match on display name or email.
    pub fn matches_search(&self, term: &str) -> bool {
        let term = term.trim().to_lowercase();
        if term.is_empty() {
            return true;
        }
        self.display_name().to_lowercase().contains(&term)
            || self.email.to_lowercase().contains(&term)
    }
}

pub fn email_local_part(email: &str) -> &str {
    email.split('@').next().unwrap_or(email)
}

// ---------------------------------------------------------------------------
// Presence
// ---------------------------------------------------------------------------

/// One running client of a user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEntry {
    #[serde(default)]
    pub last_active: Option<i64>,
}

/// `status/{uid}`: every live session of a user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceRecord {
    #[serde(default)]
    pub sessions: HashMap<String, SessionEntry>,
    #[serde(default)]
    pub last_seen: Option<i64>,
}

impl PresenceRecord {
    /// Whether any session was refreshed less than `window_ms` before `now`.
    pub fn is_online(&self, now: i64, window_ms: i64) -> bool {
        self.sessions
            .values()
            .filter_map(|s| s.last_active)
            .any(|t| now.saturating_sub(t) < window_ms)
    }
}

// ---------------------------------------------------------------------------
// Conversations
// ---------------------------------------------------------------------------

/// `chatMeta/{conversationId}`: the preview shown in the roster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationMeta {
    #[serde(default)]
    pub participants: Vec<UserId>,
    #[serde(default)]
    pub last_message: Option<String>,
    #[serde(default)]
    pub last_message_time: Option<i64>,
    #[serde(default)]
    pub last_sender: Option<UserId>,
}

/// `chats/{conversationId}/messages/{id}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(skip)]
    pub id: String,
    #[serde(default)]
    pub text: String,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub deleted: bool,
}

impl Message {
    pub fn is_from(&self, uid: &UserId) -> bool {
        &self.sender_id == uid
    }
}

/// `reports/{autoId}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub message_id: String,
    pub reported_user_id: UserId,
    pub reported_by: UserId,
    #[serde(default)]
    pub timestamp: i64,
    pub reason: String,
}

// ---------------------------------------------------------------------------
// Decoding helpers
// ---------------------------------------------------------------------------

/// Decode a document body into a model.
pub fn decode<T: DeserializeOwned>(kind: &'static str, fields: Fields) -> Result<T> {
    serde_json::from_value(Value::Object(fields)).map_err(|e| ClientError::Malformed {
        kind,
        reason: e.to_string(),
    })
}

/// Decode a message, taking its id from the document key.
pub fn decode_message(doc: Document) -> Result<Message> {
    let mut message: Message = decode("message", doc.data)?;
    message.id = doc.id;
    Ok(message)
}

/// Decode a directory record.  A missing `uid` field falls back to the
/// document key.
pub fn decode_user(id: &str, mut fields: Fields) -> Result<User> {
    if !fields.contains_key("uid") {
        fields.insert("uid".into(), Value::String(id.to_string()));
    }
    decode("user", fields)
}

/// Turn a `json!` object literal into document fields.
pub(crate) fn fields(value: Value) -> Fields {
    match value {
        Value::Object(map) => map,
        _ => Fields::new(),
    }
}
