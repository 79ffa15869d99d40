//! The conversation roster: every other user with the preview of the
//! conversation held with them, most recent first.
//!
//! Two sources feed it.  The directory snapshot decides membership; each
//! member's conversation metadata document decides its preview.  Only a
//! preview event re-sorts the list: members new to the directory are
//! appended and find their place once their own preview arrives.

use std::collections::BTreeSet;

use chrono::{DateTime, Local, TimeZone, Utc};
use parley_shared::constants::{EMPTY_PREVIEW_TEXT, PREVIEW_MAX_CHARS};
use parley_shared::UserId;

use crate::models::{ConversationMeta, User};

/// Last-message preview of one conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preview {
    pub text: Option<String>,
    /// Milliseconds since the epoch; 0 when the metadata carries no time.
    pub timestamp: i64,
    pub sender: Option<UserId>,
}

impl From<ConversationMeta> for Preview {
    fn from(meta: ConversationMeta) -> Self {
        Self {
            text: meta.last_message,
            timestamp: meta.last_message_time.unwrap_or(0),
            sender: meta.last_sender,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub user: User,
    /// `None` when the conversation has no metadata (no history).
    pub preview: Option<Preview>,
}

impl RosterEntry {
    /// Sort key; conversations without history sort last.
    pub fn last_activity(&self) -> i64 {
        self.preview.as_ref().map(|p| p.timestamp).unwrap_or(0)
    }

    /// Preview line as shown in the list.
    pub fn preview_text(&self) -> String {
        format_preview(self.preview.as_ref().and_then(|p| p.text.as_deref()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Roster {
    entries: Vec<RosterEntry>,
    loaded: bool,
}

impl Roster {
    pub fn entries(&self) -> &[RosterEntry] {
        &self.entries
    }

    pub fn get(&self, uid: &UserId) -> Option<&RosterEntry> {
        self.entries.iter().find(|e| &e.user.uid == uid)
    }

    pub fn contains(&self, uid: &UserId) -> bool {
        self.get(uid).is_some()
    }

    pub fn member_ids(&self) -> BTreeSet<UserId> {
        self.entries.iter().map(|e| e.user.uid.clone()).collect()
    }

    /// Whether the first directory snapshot has arrived.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries whose display name or email contains `term`, in list order.
    pub fn search<'a>(&'a self, term: &'a str) -> impl Iterator<Item = &'a RosterEntry> + 'a {
        self.entries.iter().filter(move |e| e.user.matches_search(term))
    }

    /// Replace membership with a directory snapshot.  Existing members keep
    /// their position and preview; new members are appended in snapshot
    /// order.
    pub(crate) fn apply_directory(&mut self, users: Vec<User>) {
        let mut incoming = users;
        let mut next = Vec::with_capacity(incoming.len());

        for entry in self.entries.drain(..) {
            if let Some(pos) = incoming.iter().position(|u| u.uid == entry.user.uid) {
                next.push(RosterEntry {
                    user: incoming.remove(pos),
                    preview: entry.preview,
                });
            }
        }
        next.extend(incoming.into_iter().map(|user| RosterEntry {
            user,
            preview: None,
        }));

        self.entries = next;
        self.loaded = true;
    }

    /// Set (or clear) the preview of a member and re-sort.  Events for
    /// users that are no longer members are ignored.
    pub(crate) fn apply_preview(&mut self, uid: &UserId, meta: Option<ConversationMeta>) -> bool {
        let Some(entry) = self.entries.iter_mut().find(|e| &e.user.uid == uid) else {
            return false;
        };
        entry.preview = meta.map(Preview::from);

        // Stable: equal times keep their relative order.
        self.entries
            .sort_by(|a, b| b.last_activity().cmp(&a.last_activity()));
        true
    }

    /// Drop a member locally until the next directory snapshot.
    pub(crate) fn remove(&mut self, uid: &UserId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| &e.user.uid != uid);
        self.entries.len() != before
    }
}

// ---- Presentation helpers ----

/// `"Start a conversation"` without history, otherwise the text truncated
/// to the preview width.
pub fn format_preview(text: Option<&str>) -> String {
    match text {
        None | Some("") => EMPTY_PREVIEW_TEXT.to_string(),
        Some(text) if text.chars().count() > PREVIEW_MAX_CHARS => {
            let cut: String = text.chars().take(PREVIEW_MAX_CHARS).collect();
            format!("{cut}...")
        }
        Some(text) => text.to_string(),
    }
}

/// Compact age of a timestamp: `now`, `Nm`, `Nh`, `Nd` within a week, then
/// the short local date (`Mar 5`).  Empty for a zero timestamp.
pub fn format_relative_time(timestamp: i64, now: i64) -> String {
    format_relative_time_in(timestamp, now, &Local)
}

/// [`format_relative_time`] with the date fallback rendered in `tz`.
pub fn format_relative_time_in<Tz>(timestamp: i64, now: i64, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    if timestamp == 0 {
        return String::new();
    }
    let minutes = now.saturating_sub(timestamp).div_euclid(60_000);
    if minutes < 1 {
        return "now".to_string();
    }
    if minutes < 60 {
        return format!("{minutes}m");
    }
    if minutes < 1440 {
        return format!("{}h", minutes / 60);
    }
    let days = minutes / 1440;
    if days < 7 {
        return format!("{days}d");
    }
    match DateTime::<Utc>::from_timestamp_millis(timestamp) {
        Some(at) => at.with_timezone(tz).format("%b %-d").to_string(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::FixedOffset;

    use super::*;

    fn uid(s: &str) -> UserId {
        UserId::parse(s).unwrap()
    }

    fn user(s: &str) -> User {
        User {
            uid: uid(s),
            email: format!("{s}@example.com"),
            username: None,
        }
    }

    fn meta(text: &str, at: i64) -> Option<ConversationMeta> {
        Some(ConversationMeta {
            participants: vec![],
            last_message: Some(text.to_string()),
            last_message_time: Some(at),
            last_sender: None,
        })
    }

    fn order(roster: &Roster) -> Vec<&str> {
        roster.entries().iter().map(|e| e.user.uid.as_str()).collect()
    }

    #[test]
    fn test_preview_sorts_most_recent_first() {
        let mut roster = Roster::default();
        roster.apply_directory(vec![user("a"), user("b"), user("c")]);
        assert!(roster.is_loaded());

        roster.apply_preview(&uid("b"), meta("older", 50));
        roster.apply_preview(&uid("c"), meta("hi", 100));
        assert_eq!(order(&roster), ["c", "b", "a"]);
        assert_eq!(roster.get(&uid("c")).unwrap().preview_text(), "hi");
        assert_eq!(
            roster.get(&uid("a")).unwrap().preview_text(),
            "Start a conversation"
        );
    }

    #[test]
    fn test_ties_keep_relative_order() {
        let mut roster = Roster::default();
        roster.apply_directory(vec![user("a"), user("b"), user("c")]);

        roster.apply_preview(&uid("c"), meta("x", 10));
        roster.apply_preview(&uid("a"), meta("y", 10));
        assert_eq!(order(&roster), ["c", "a", "b"]);
    }

    #[test]
    fn test_new_member_is_appended_until_its_preview_arrives() {
        let mut roster = Roster::default();
        roster.apply_directory(vec![user("a"), user("b")]);
        roster.apply_preview(&uid("b"), meta("x", 10));
        assert_eq!(order(&roster), ["b", "a"]);

        roster.apply_directory(vec![user("a"), user("b"), user("n")]);
        assert_eq!(order(&roster), ["b", "a", "n"]);

        roster.apply_preview(&uid("n"), meta("newest", 99));
        assert_eq!(order(&roster), ["n", "b", "a"]);
    }

    #[test]
    fn test_directory_update_keeps_previews() {
        let mut roster = Roster::default();
        roster.apply_directory(vec![user("a"), user("b")]);
        roster.apply_preview(&uid("a"), meta("kept", 10));

        let mut renamed = user("a");
        renamed.username = Some("Ada".into());
        roster.apply_directory(vec![user("b"), renamed]);

        let entry = roster.get(&uid("a")).unwrap();
        assert_eq!(entry.user.display_name(), "Ada");
        assert_eq!(entry.preview_text(), "kept");
        assert_eq!(order(&roster), ["a", "b"]);
    }

    #[test]
    fn test_absent_meta_reverts_preview() {
        let mut roster = Roster::default();
        roster.apply_directory(vec![user("a"), user("b")]);
        roster.apply_preview(&uid("b"), meta("x", 10));

        roster.apply_preview(&uid("b"), None);
        let entry = roster.get(&uid("b")).unwrap();
        assert!(entry.preview.is_none());
        assert_eq!(entry.last_activity(), 0);
    }

    #[test]
    fn test_preview_for_non_member_is_ignored() {
        let mut roster = Roster::default();
        roster.apply_directory(vec![user("a")]);
        assert!(!roster.apply_preview(&uid("gone"), meta("x", 1)));
        assert_eq!(roster.len(), 1);
    }

    #[test]
    fn test_remove_until_next_snapshot() {
        let mut roster = Roster::default();
        roster.apply_directory(vec![user("a"), user("b")]);
        assert!(roster.remove(&uid("a")));
        assert!(!roster.contains(&uid("a")));

        roster.apply_directory(vec![user("a"), user("b")]);
        assert_eq!(order(&roster), ["b", "a"]);
    }

    #[test]
    fn test_search() {
        let mut roster = Roster::default();
        let mut ada = user("ada");
        ada.username = Some("Lovelace".into());
        roster.apply_directory(vec![ada, user("bob")]);

        let hits: Vec<_> = roster.search("LOVE").map(|e| e.user.uid.as_str()).collect();
        assert_eq!(hits, ["ada"]);
        assert_eq!(roster.search("example").count(), 2);
        assert_eq!(roster.search("").count(), 2);
    }

    #[test]
    fn test_format_preview() {
        assert_eq!(format_preview(None), "Start a conversation");
        assert_eq!(format_preview(Some("short")), "short");

        let exact = "x".repeat(35);
        assert_eq!(format_preview(Some(&exact)), exact);

        let long = "y".repeat(40);
        assert_eq!(format_preview(Some(&long)), format!("{}...", "y".repeat(35)));
    }

    #[test]
    fn test_format_relative_time() {
        let now = 1_700_000_000_000;
        assert_eq!(format_relative_time(0, now), "");
        assert_eq!(format_relative_time(now - 30_000, now), "now");
        assert_eq!(format_relative_time(now - 5 * 60_000, now), "5m");
        assert_eq!(format_relative_time(now - 3 * 3_600_000, now), "3h");
        assert_eq!(format_relative_time(now - 86_400_000, now), "1d");
        assert_eq!(format_relative_time(now - 6 * 86_400_000, now), "6d");
    }

    #[test]
    fn test_format_relative_time_falls_back_to_date() {
        // 2024-03-15 12:00 UTC
        let at = 1_710_504_000_000;
        let now = at + 30 * 86_400_000;
        let utc = FixedOffset::east_opt(0).unwrap();
        let kiritimati = FixedOffset::east_opt(14 * 3600).unwrap();
        let honolulu = FixedOffset::west_opt(10 * 3600).unwrap();
        assert_eq!(format_relative_time_in(at, now, &utc), "Mar 15");
        assert_eq!(format_relative_time_in(at, now, &kiritimati), "Mar 16");
        assert_eq!(format_relative_time_in(at, now, &honolulu), "Mar 15");

        let local = DateTime::<Utc>::from_timestamp_millis(at)
            .unwrap()
            .with_timezone(&Local)
            .format("%b %-d")
            .to_string();
        assert_eq!(format_relative_time(at, now), local);
    }

    #[test]
    fn test_format_relative_time_extreme_timestamps() {
        let now = 1_700_000_000_000;
        assert_eq!(format_relative_time(i64::MIN, now), "");
        assert_eq!(format_relative_time(i64::MAX, now), "now");
        assert_eq!(format_relative_time(1, i64::MIN), "now");
    }
}
