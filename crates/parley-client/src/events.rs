//! Events consumed by the session reducer and the effects it requests.
//!
//! Observer tasks turn store snapshots into [`SessionEvent`]s; the session
//! handle adds user-driven ones.  All of them travel through one channel,
//! so the reducer applies them strictly one at a time.

use std::collections::{BTreeSet, HashMap};

use parley_shared::{ConversationId, UserId};

use crate::models::{ConversationMeta, Message, PresenceRecord, User};
use crate::notifications::NotificationKind;

/// An input source whose subscription can fail.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Source {
    Directory,
    Presence,
    BlockSet,
    Preview(UserId),
    Messages,
    CounterpartBlock,
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Source::Directory => f.write_str("directory"),
            Source::Presence => f.write_str("presence"),
            Source::BlockSet => f.write_str("block-set"),
            Source::Preview(uid) => write!(f, "preview:{}", uid.short()),
            Source::Messages => f.write_str("messages"),
            Source::CounterpartBlock => f.write_str("counterpart-block"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    // -- Snapshots --
    /// Every directory record except the local user's.
    DirectorySnapshot(Vec<User>),

    /// Conversation metadata with one directory member; `None` when absent.
    PreviewSnapshot {
        counterparty: UserId,
        meta: Option<ConversationMeta>,
    },

    PresenceSnapshot(HashMap<UserId, PresenceRecord>),

    /// Ids the local user has blocked.
    BlockSetSnapshot(BTreeSet<UserId>),

    /// History of the selected conversation.
    MessagesSnapshot { epoch: u64, messages: Vec<Message> },

    // -- One-shot fetch results --
    CounterpartBlockFetched {
        epoch: u64,
        counterparty: UserId,
        blocked_me: bool,
    },

    BlockedUsersResolved { generation: u64, users: Vec<User> },

    // -- Local --
    /// Periodic presence re-evaluation and notification expiry.
    Tick,

    Select(Option<UserId>),

    /// The conversation with this user was deleted by the local user.
    ConversationDeleted(UserId),

    Notify {
        kind: NotificationKind,
        message: String,
    },

    DismissNotification(u64),

    /// A subscription or fetch failed.  `epoch` is set for sources scoped to
    /// a selection.
    SourceFailed {
        source: Source,
        epoch: Option<u64>,
        error: String,
    },
}

impl SessionEvent {
    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            SessionEvent::DirectorySnapshot(_) => "directory",
            SessionEvent::PreviewSnapshot { .. } => "preview",
            SessionEvent::PresenceSnapshot(_) => "presence",
            SessionEvent::BlockSetSnapshot(_) => "block-set",
            SessionEvent::MessagesSnapshot { .. } => "messages",
            SessionEvent::CounterpartBlockFetched { .. } => "counterpart-block",
            SessionEvent::BlockedUsersResolved { .. } => "blocked-users",
            SessionEvent::Tick => "tick",
            SessionEvent::Select(_) => "select",
            SessionEvent::ConversationDeleted(_) => "conversation-deleted",
            SessionEvent::Notify { .. } => "notify",
            SessionEvent::DismissNotification(_) => "dismiss",
            SessionEvent::SourceFailed { .. } => "source-failed",
        }
    }
}

/// Work the reducer asks its runtime to perform after a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Keep exactly one metadata observer per listed member.
    SyncPreviews(BTreeSet<UserId>),

    /// Replace the conversation observer.
    WatchConversation {
        epoch: u64,
        conversation: ConversationId,
    },

    StopConversation,

    FetchCounterpartBlock { epoch: u64, counterparty: UserId },

    ResolveBlockedUsers { generation: u64, ids: Vec<UserId> },
}
