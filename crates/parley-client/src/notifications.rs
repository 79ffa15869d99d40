//! Transient notifications reporting the outcome of user actions.

use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Success,
    Error,
    Info,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub id: u64,
    pub kind: NotificationKind,
    pub message: String,
    /// Creation time, milliseconds since the epoch.
    pub created_at: i64,
}

/// Notifications that have not expired yet, oldest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notifications {
    items: VecDeque<Notification>,
    next_id: u64,
    ttl_ms: i64,
}

impl Notifications {
    pub fn new(ttl_ms: i64) -> Self {
        Self {
            items: VecDeque::new(),
            next_id: 1,
            ttl_ms,
        }
    }

    pub fn push(&mut self, kind: NotificationKind, message: impl Into<String>, now: i64) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.items.push_back(Notification {
            id,
            kind,
            message: message.into(),
            created_at: now,
        });
        id
    }

    /// Drop every notification older than the TTL.
    pub fn prune(&mut self, now: i64) -> usize {
        let before = self.items.len();
        self.items.retain(|n| now.saturating_sub(n.created_at) < self.ttl_ms);
        before - self.items.len()
    }

    pub fn dismiss(&mut self, id: u64) -> bool {
        let before = self.items.len();
        self.items.retain(|n| n.id != id);
        self.items.len() != before
    }

    pub fn iter(&self) -> impl Iterator<Item = &Notification> {
        self.items.iter()
    }

    pub fn latest(&self) -> Option<&Notification> {
        self.items.back()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
