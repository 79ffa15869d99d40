//! The message stream of the active conversation, and the writes issued
//! from it: send, soft-delete and report.

use parley_shared::constants::{DEFAULT_REPORT_REASON, DELETED_MESSAGE_TEXT};
use parley_shared::{ConversationId, UserId};
use parley_store::{server_timestamp, DocumentPath, DocumentStore, Query, QuerySnapshot, SetOptions};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::models::{self, Message};
use crate::paths;

/// Messages of one conversation in ascending timestamp order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageStream {
    conversation: Option<ConversationId>,
    messages: Vec<Message>,
    loaded: bool,
}

impl MessageStream {
    pub fn conversation(&self) -> Option<&ConversationId> {
        self.conversation.as_ref()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn get(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    /// Whether the first snapshot of the current conversation has arrived.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Switch to another conversation (or none), dropping the old history.
    pub(crate) fn reset(&mut self, conversation: Option<ConversationId>) {
        self.conversation = conversation;
        self.messages.clear();
        self.loaded = false;
    }

    pub(crate) fn replace(&mut self, messages: Vec<Message>) {
        self.messages = messages;
        self.loaded = true;
    }
}

/// Messages of `conversation`, oldest first.
pub fn stream_query(conversation: &ConversationId) -> Query {
    Query::collection(paths::messages(conversation)).order_by_asc("timestamp")
}

/// Decode a message snapshot, skipping documents that do not parse.
pub fn decode_messages(snapshot: QuerySnapshot) -> Vec<Message> {
    snapshot
        .documents
        .into_iter()
        .filter_map(|doc| {
            let id = doc.id.clone();
            match models::decode_message(doc) {
                Ok(message) => Some(message),
                Err(e) => {
                    warn!(message_id = %id, error = %e, "skipping undecodable message");
                    None
                }
            }
        })
        .collect()
}

// ---- Writes ----

/// Append a message to the conversation and refresh its metadata.
///
/// Both writes are attempted in order; a failure of either fails the send.
pub async fn send_message<S: DocumentStore>(
    store: &S,
    from: &UserId,
    to: &UserId,
    text: &str,
) -> Result<DocumentPath> {
    let conversation = ConversationId::between(from, to);

    let message = models::fields(json!({
        "text": text,
        "senderId": from,
        "receiverId": to,
        "timestamp": server_timestamp(),
        "deleted": false,
    }));
    let path = store.add(&paths::messages(&conversation), message).await?;

    let meta = models::fields(json!({
        "participants": [from, to],
        "lastMessage": text,
        "lastMessageTime": server_timestamp(),
        "lastSender": from,
    }));
    store
        .set(&paths::chat_meta(&conversation), meta, SetOptions::MERGE)
        .await?;

    debug!(conversation = %conversation, message_id = %path.id(), "message sent");
    Ok(path)
}

/// Replace a message's text with the tombstone and flag it deleted.
/// Conversation metadata is left untouched.
pub async fn soft_delete<S: DocumentStore>(
    store: &S,
    conversation: &ConversationId,
    message_id: &str,
) -> Result<()> {
    let path = paths::messages(conversation).doc(message_id);
    let fields = models::fields(json!({
        "text": DELETED_MESSAGE_TEXT,
        "deleted": true,
    }));
    store.update(&path, fields).await?;
    debug!(conversation = %conversation, message_id, "message soft-deleted");
    Ok(())
}

/// File a report against `message`.  The message itself is not changed.
pub async fn report_message<S: DocumentStore>(
    store: &S,
    reporter: &UserId,
    message: &Message,
) -> Result<DocumentPath> {
    let fields = models::fields(json!({
        "messageId": message.id,
        "reportedUserId": message.sender_id,
        "reportedBy": reporter,
        "timestamp": server_timestamp(),
        "reason": DEFAULT_REPORT_REASON,
    }));
    let path = store.add(&paths::reports(), fields).await?;
    info!(report = %path.id(), message_id = %message.id, "message reported");
    Ok(path)
}
