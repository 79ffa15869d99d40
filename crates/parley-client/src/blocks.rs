//! Block relationship resolution.
//!
//! A block is directional: `users/{blocker}/blockedUsers/{blocked}` exists
//! while it is in effect.  The pair is blocked when either direction exists.
//! The local user's own set is observed continuously; the counterparty's
//! direction is fetched once per selection (and again when the local set
//! changes), so a block placed by the counterparty while already selected
//! stays unnoticed until then.

use std::collections::BTreeSet;

use parley_shared::UserId;
use parley_store::{DocumentStore, QuerySnapshot};
use tracing::{debug, warn};

use crate::error::Result;
use crate::models::{self, User};
use crate::paths;

/// Effective block state of a pair, from the local user's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockStatus {
    Clear,
    /// The local user blocked the counterparty.
    BlockedByMe,
    /// The counterparty blocked the local user.
    BlockedByThem,
    Mutual,
}

impl BlockStatus {
    pub fn from_directions(by_me: bool, by_them: bool) -> Self {
        match (by_me, by_them) {
            (false, false) => BlockStatus::Clear,
            (true, false) => BlockStatus::BlockedByMe,
            (false, true) => BlockStatus::BlockedByThem,
            (true, true) => BlockStatus::Mutual,
        }
    }

    pub fn is_blocked(self) -> bool {
        self != BlockStatus::Clear
    }

    /// Text explaining why the conversation is read-only.
    pub fn notice(self) -> Option<&'static str> {
        match self {
            BlockStatus::Clear => None,
            BlockStatus::BlockedByMe | BlockStatus::Mutual => Some("You have blocked this user"),
            BlockStatus::BlockedByThem => Some("This user has blocked you"),
        }
    }
}

/// Both directions of the block relation as currently known.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockResolver {
    mine: BTreeSet<UserId>,
    /// Last fetched answer to "has this counterparty blocked me".
    theirs: Option<(UserId, bool)>,
}

impl BlockResolver {
    /// Ids the local user has blocked.
    pub fn blocked_ids(&self) -> &BTreeSet<UserId> {
        &self.mine
    }

    pub fn blocked_by_me(&self, uid: &UserId) -> bool {
        self.mine.contains(uid)
    }

    /// `None` until the counterparty's direction has been fetched.
    pub fn blocked_me(&self, uid: &UserId) -> Option<bool> {
        match &self.theirs {
            Some((who, blocked)) if who == uid => Some(*blocked),
            _ => None,
        }
    }

    /// The effective state for `uid`.  An unfetched counterparty direction
    /// counts as not blocked.
    pub fn status(&self, uid: &UserId) -> BlockStatus {
        BlockStatus::from_directions(
            self.blocked_by_me(uid),
            self.blocked_me(uid).unwrap_or(false),
        )
    }

    /// Whether both directions are known for `uid`.
    pub fn is_resolved(&self, uid: &UserId) -> bool {
        self.blocked_me(uid).is_some()
    }

    pub(crate) fn set_local(&mut self, ids: BTreeSet<UserId>) {
        self.mine = ids;
    }

    pub(crate) fn set_counterparty(&mut self, uid: UserId, blocked_me: bool) {
        self.theirs = Some((uid, blocked_me));
    }

    pub(crate) fn forget_counterparty(&mut self) {
        self.theirs = None;
    }
}

/// Ids of a `blockedUsers` collection snapshot.
pub fn decode_block_set(snapshot: &QuerySnapshot) -> BTreeSet<UserId> {
    snapshot
        .ids()
        .filter_map(|id| match UserId::parse(id) {
            Ok(uid) => Some(uid),
            Err(e) => {
                warn!(id, error = %e, "skipping block relation with invalid id");
                None
            }
        })
        .collect()
}

/// One-shot check whether `blocker` has blocked `target`.
pub async fn has_blocked<S: DocumentStore>(
    store: &S,
    blocker: &UserId,
    target: &UserId,
) -> Result<bool> {
    let snapshot = store.get(&paths::block(blocker, target)).await?;
    Ok(snapshot.exists())
}

/// Directory records of the blocked users.  Ids without a directory record,
/// or whose record cannot be read, are skipped.
pub async fn resolve_blocked_users<S: DocumentStore>(store: &S, ids: &[UserId]) -> Vec<User> {
    let mut users = Vec::with_capacity(ids.len());
    for uid in ids {
        match store.get(&paths::user(uid)).await {
            Ok(snapshot) => match snapshot.data {
                Some(fields) => match models::decode_user(uid.as_str(), fields) {
                    Ok(user) => users.push(user),
                    Err(e) => warn!(uid = %uid.short(), error = %e, "blocked user record unreadable"),
                },
                None => debug!(uid = %uid.short(), "blocked user has no directory record"),
            },
            Err(e) => warn!(uid = %uid.short(), error = %e, "failed to fetch blocked user"),
        }
    }
    users
}
