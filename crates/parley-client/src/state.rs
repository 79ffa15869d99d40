//! The authoritative client state of one signed-in session.
//!
//! [`ChatState`] is owned by the session reducer, which feeds it one
//! [`SessionEvent`] at a time through [`ChatState::apply`] and publishes a
//! clone after every step.  Each input source owns distinct fields, so the
//! result does not depend on how events of different sources interleave.
//! Selection-scoped events carry the epoch of the selection they were issued
//! for and are dropped once the selection has moved on.

use std::collections::{BTreeSet, HashMap};

use parley_shared::{ConversationId, UserId};
use tracing::{debug, warn};

use crate::blocks::{BlockResolver, BlockStatus};
use crate::events::{Effect, SessionEvent, Source};
use crate::models::{PresenceRecord, User};
use crate::messages::MessageStream;
use crate::notifications::Notifications;
use crate::presence;
use crate::roster::Roster;

/// The conversation currently open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub user: UserId,
    pub conversation: ConversationId,
    /// Increases with every selection change.
    pub epoch: u64,
}

#[derive(Debug, Clone)]
pub struct ChatState {
    local: User,
    roster: Roster,
    presence: HashMap<UserId, PresenceRecord>,
    online: HashMap<UserId, bool>,
    blocks: BlockResolver,
    blocked_users: Vec<User>,
    blocked_users_generation: u64,
    selection: Option<Selection>,
    last_epoch: u64,
    messages: MessageStream,
    notifications: Notifications,
    stale_sources: BTreeSet<Source>,
    liveness_window_ms: i64,
}

impl ChatState {
    pub fn new(local: User, liveness_window_ms: i64, notification_ttl_ms: i64) -> Self {
        Self {
            local,
            roster: Roster::default(),
            presence: HashMap::new(),
            online: HashMap::new(),
            blocks: BlockResolver::default(),
            blocked_users: Vec::new(),
            blocked_users_generation: 0,
            selection: None,
            last_epoch: 0,
            messages: MessageStream::default(),
            notifications: Notifications::new(notification_ttl_ms),
            stale_sources: BTreeSet::new(),
            liveness_window_ms,
        }
    }

    // ---- Read access ----

    pub fn local_user(&self) -> &User {
        &self.local
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// Whether `uid` has a live session.  Users without a presence record
    /// are offline.
    pub fn is_online(&self, uid: &UserId) -> bool {
        self.online.get(uid).copied().unwrap_or(false)
    }

    pub fn online(&self) -> &HashMap<UserId, bool> {
        &self.online
    }

    pub fn blocks(&self) -> &BlockResolver {
        &self.blocks
    }

    /// Directory records of the users the local user has blocked.
    pub fn blocked_users(&self) -> &[User] {
        &self.blocked_users
    }

    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    /// Directory record of the selected user, when known.
    pub fn selected_user(&self) -> Option<&User> {
        let selection = self.selection.as_ref()?;
        self.roster
            .get(&selection.user)
            .map(|e| &e.user)
            .or_else(|| self.blocked_users.iter().find(|u| u.uid == selection.user))
    }

    /// Effective block state of the selected conversation.
    pub fn block_status(&self) -> Option<BlockStatus> {
        self.selection
            .as_ref()
            .map(|s| self.blocks.status(&s.user))
    }

    pub fn messages(&self) -> &MessageStream {
        &self.messages
    }

    pub fn notifications(&self) -> &Notifications {
        &self.notifications
    }

    /// Sources whose subscription has failed; their fields may be out of
    /// date.
    pub fn stale_sources(&self) -> &BTreeSet<Source> {
        &self.stale_sources
    }

    pub fn is_stale(&self, source: &Source) -> bool {
        self.stale_sources.contains(source)
    }

    // ---- Reducer ----

    /// Apply one event observed at `now` and return the effects it requires.
    pub fn apply(&mut self, event: SessionEvent, now: i64) -> Vec<Effect> {
        debug!(event = event.kind(), "reducer step");

        match event {
            SessionEvent::DirectorySnapshot(users) => {
                let users = users
                    .into_iter()
                    .filter(|u| u.uid != self.local.uid)
                    .collect();
                self.roster.apply_directory(users);
                self.stale_sources.remove(&Source::Directory);
                self.retain_preview_staleness();
                vec![Effect::SyncPreviews(self.roster.member_ids())]
            }

            SessionEvent::PreviewSnapshot { counterparty, meta } => {
                if self.roster.apply_preview(&counterparty, meta) {
                    self.stale_sources.remove(&Source::Preview(counterparty));
                }
                Vec::new()
            }

            SessionEvent::PresenceSnapshot(records) => {
                self.presence = records;
                self.stale_sources.remove(&Source::Presence);
                self.reevaluate_presence(now);
                Vec::new()
            }

            SessionEvent::BlockSetSnapshot(ids) => {
                self.blocks.set_local(ids);
                self.stale_sources.remove(&Source::BlockSet);

                self.blocked_users_generation += 1;
                let mut effects = vec![Effect::ResolveBlockedUsers {
                    generation: self.blocked_users_generation,
                    ids: self.blocks.blocked_ids().iter().cloned().collect(),
                }];
                if let Some(selection) = &self.selection {
                    effects.push(Effect::FetchCounterpartBlock {
                        epoch: selection.epoch,
                        counterparty: selection.user.clone(),
                    });
                }
                effects
            }

            SessionEvent::MessagesSnapshot { epoch, messages } => {
                if self.is_current(epoch) {
                    self.messages.replace(messages);
                    self.stale_sources.remove(&Source::Messages);
                } else {
                    debug!(epoch, "discarding messages of a previous selection");
                }
                Vec::new()
            }

            SessionEvent::CounterpartBlockFetched {
                epoch,
                counterparty,
                blocked_me,
            } => {
                let matches = self
                    .selection
                    .as_ref()
                    .is_some_and(|s| s.epoch == epoch && s.user == counterparty);
                if matches {
                    self.blocks.set_counterparty(counterparty, blocked_me);
                    self.stale_sources.remove(&Source::CounterpartBlock);
                } else {
                    debug!(epoch, "discarding block check of a previous selection");
                }
                Vec::new()
            }

            SessionEvent::BlockedUsersResolved { generation, users } => {
                if generation == self.blocked_users_generation {
                    self.blocked_users = users;
                }
                Vec::new()
            }

            SessionEvent::Tick => {
                self.reevaluate_presence(now);
                self.notifications.prune(now);
                Vec::new()
            }

            SessionEvent::Select(Some(uid)) if uid == self.local.uid => {
                warn!("ignoring selection of the local user");
                Vec::new()
            }

            SessionEvent::Select(Some(uid)) => self.select(uid),

            SessionEvent::Select(None) => self.clear_selection(),

            SessionEvent::ConversationDeleted(uid) => {
                self.roster.remove(&uid);
                self.retain_preview_staleness();
                let mut effects = vec![Effect::SyncPreviews(self.roster.member_ids())];
                if self.selection.as_ref().is_some_and(|s| s.user == uid) {
                    effects.extend(self.clear_selection());
                }
                effects
            }

            SessionEvent::Notify { kind, message } => {
                self.notifications.push(kind, message, now);
                Vec::new()
            }

            SessionEvent::DismissNotification(id) => {
                self.notifications.dismiss(id);
                Vec::new()
            }

            SessionEvent::SourceFailed {
                source,
                epoch,
                error,
            } => {
                if epoch.is_some_and(|e| !self.is_current(e)) {
                    debug!(source = %source, "discarding failure of a previous selection");
                    return Vec::new();
                }
                if let Source::Preview(uid) = &source {
                    if !self.roster.contains(uid) {
                        return Vec::new();
                    }
                }
                warn!(source = %source, error = %error, "source marked stale");
                self.stale_sources.insert(source);
                Vec::new()
            }
        }
    }

    fn select(&mut self, uid: UserId) -> Vec<Effect> {
        self.last_epoch += 1;
        let epoch = self.last_epoch;
        let conversation = ConversationId::between(&self.local.uid, &uid);

        self.messages.reset(Some(conversation.clone()));
        self.blocks.forget_counterparty();
        self.stale_sources.remove(&Source::Messages);
        self.stale_sources.remove(&Source::CounterpartBlock);
        self.selection = Some(Selection {
            user: uid.clone(),
            conversation: conversation.clone(),
            epoch,
        });

        vec![
            Effect::WatchConversation {
                epoch,
                conversation,
            },
            Effect::FetchCounterpartBlock {
                epoch,
                counterparty: uid,
            },
        ]
    }

    fn clear_selection(&mut self) -> Vec<Effect> {
        self.last_epoch += 1;
        self.selection = None;
        self.messages.reset(None);
        self.blocks.forget_counterparty();
        self.stale_sources.remove(&Source::Messages);
        self.stale_sources.remove(&Source::CounterpartBlock);
        vec![Effect::StopConversation]
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.selection.as_ref().is_some_and(|s| s.epoch == epoch)
    }

    fn reevaluate_presence(&mut self, now: i64) {
        self.online = presence::online_map(&self.presence, now, self.liveness_window_ms);
    }

    /// Forget staleness of preview sources whose member left the roster.
    fn retain_preview_staleness(&mut self) {
        let roster = &self.roster;
        self.stale_sources.retain(|s| match s {
            Source::Preview(uid) => roster.contains(uid),
            _ => true,
        });
    }
}
