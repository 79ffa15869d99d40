/// Presence heartbeat interval in seconds
pub const HEARTBEAT_INTERVAL_SECS: u64 = 30;

/// A session is live if refreshed within this many seconds
pub const LIVENESS_WINDOW_SECS: u64 = 60;

/// Interval of the local presence re-evaluation, independent of snapshots
pub const PRESENCE_REEVALUATION_SECS: u64 = 30;

/// Lifetime of a transient notification in seconds
pub const NOTIFICATION_TTL_SECS: u64 = 4;

/// Joins the two sorted user ids of a conversation id
pub const CONVERSATION_ID_SEPARATOR: char = '_';

/// Text that replaces the content of a soft-deleted message
pub const DELETED_MESSAGE_TEXT: &str = "This message was deleted.";

/// Reason attached to reports filed from the message menu
pub const DEFAULT_REPORT_REASON: &str = "inappropriate_content";

/// Roster previews longer than this are truncated
pub const PREVIEW_MAX_CHARS: usize = 35;

/// Placeholder shown in the roster for conversations without history
pub const EMPTY_PREVIEW_TEXT: &str = "Start a conversation";

/// Minimum password length accepted at sign-up
pub const MIN_PASSWORD_LEN: usize = 6;

/// Document store collection names
pub const USERS_COLLECTION: &str = "users";
pub const STATUS_COLLECTION: &str = "status";
pub const CHAT_META_COLLECTION: &str = "chatMeta";
pub const CHATS_COLLECTION: &str = "chats";
pub const MESSAGES_SUBCOLLECTION: &str = "messages";
pub const BLOCKED_USERS_SUBCOLLECTION: &str = "blockedUsers";
pub const REPORTS_COLLECTION: &str = "reports";
