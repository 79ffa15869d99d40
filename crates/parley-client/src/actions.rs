//! Compound conversation actions: block, unblock and delete-conversation.

use parley_shared::{ConversationId, UserId};
use parley_store::{server_timestamp, DocumentStore, Query, SetOptions, WriteBatch};
use serde_json::json;
use tracing::info;

use crate::error::{ClientError, Result};
use crate::models;
use crate::paths;

/// Block `target`.  Re-blocking overwrites the relation.
pub async fn block_user<S: DocumentStore>(store: &S, local: &UserId, target: &UserId) -> Result<()> {
    if local == target {
        return Err(ClientError::SelfTarget);
    }
    let fields = models::fields(json!({ "blockedAt": server_timestamp() }));
    store
        .set(&paths::block(local, target), fields, SetOptions::REPLACE)
        .await?;
    info!(blocker = %local.short(), blocked = %target.short(), "user blocked");
    Ok(())
}

/// Lift a block.  Unblocking a user that is not blocked succeeds.
pub async fn unblock_user<S: DocumentStore>(
    store: &S,
    local: &UserId,
    target: &UserId,
) -> Result<()> {
    store.delete(&paths::block(local, target)).await?;
    info!(blocker = %local.short(), blocked = %target.short(), "user unblocked");
    Ok(())
}

/// Remove the whole conversation with `counterparty`: every message and the
/// metadata record, in one atomic batch.  Returns the number of messages
/// removed.
pub async fn delete_conversation<S: DocumentStore>(
    store: &S,
    local: &UserId,
    counterparty: &UserId,
) -> Result<usize> {
    let conversation = ConversationId::between(local, counterparty);
    let messages = store
        .query(&Query::collection(paths::messages(&conversation)))
        .await?;

    let mut batch = WriteBatch::new();
    for id in messages.ids() {
        batch.delete(paths::messages(&conversation).doc(id));
    }
    batch.delete(paths::chat_meta(&conversation));

    let removed = messages.len();
    store.commit(batch).await?;

    info!(conversation = %conversation, messages = removed, "conversation deleted");
    Ok(removed)
}
