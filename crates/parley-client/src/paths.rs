//! Document locations of every record the client reads or writes.

use parley_shared::constants::{
    BLOCKED_USERS_SUBCOLLECTION, CHATS_COLLECTION, CHAT_META_COLLECTION, MESSAGES_SUBCOLLECTION,
    REPORTS_COLLECTION, STATUS_COLLECTION, USERS_COLLECTION,
};
use parley_shared::{ConversationId, UserId};
use parley_store::{CollectionPath, DocumentPath};

pub fn users() -> CollectionPath {
    CollectionPath::root(USERS_COLLECTION)
}

/// `users/{uid}`
pub fn user(uid: &UserId) -> DocumentPath {
    users().doc(uid.as_str())
}

pub fn statuses() -> CollectionPath {
    CollectionPath::root(STATUS_COLLECTION)
}

/// `status/{uid}`
pub fn status(uid: &UserId) -> DocumentPath {
    statuses().doc(uid.as_str())
}

/// `chatMeta/{conversationId}`
pub fn chat_meta(conversation: &ConversationId) -> DocumentPath {
    CollectionPath::root(CHAT_META_COLLECTION).doc(conversation.as_str())
}

/// `chats/{conversationId}/messages`
pub fn messages(conversation: &ConversationId) -> CollectionPath {
    CollectionPath::root(CHATS_COLLECTION)
        .doc(conversation.as_str())
        .child(MESSAGES_SUBCOLLECTION)
}

/// `users/{blocker}/blockedUsers`
pub fn blocked_users(blocker: &UserId) -> CollectionPath {
    user(blocker).child(BLOCKED_USERS_SUBCOLLECTION)
}

/// `users/{blocker}/blockedUsers/{blocked}`
pub fn block(blocker: &UserId, blocked: &UserId) -> DocumentPath {
    blocked_users(blocker).doc(blocked.as_str())
}

pub fn reports() -> CollectionPath {
    CollectionPath::root(REPORTS_COLLECTION)
}
