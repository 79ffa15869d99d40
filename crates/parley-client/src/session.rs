//! A signed-in chat session.
//!
//! [`ChatSession::start`] spawns every task the session needs:
//!
//! - the presence heartbeat and the periodic re-evaluation tick,
//! - observers for the directory, presence and local block-set
//!   subscriptions,
//! - the reducer, which owns [`ChatState`], applies one [`SessionEvent`] per
//!   step and publishes the result on a `watch` channel.
//!
//! The reducer also owns the observers whose lifetime depends on the state
//! (one conversation-metadata observer per roster member, the message
//! observer of the selected conversation, one-shot fetches) and replaces
//! them as its effects demand.  Every task is wrapped in a [`TaskGuard`], so
//! dropping the session (or calling [`ChatSession::shutdown`]) aborts all of
//! them.

use std::collections::HashMap;
use std::sync::Arc;

use futures::StreamExt;
use parley_shared::{Clock, ConversationId, SessionId, UserId};
use parley_store::{
    DocumentPath, DocumentSnapshot, DocumentStore, Query, QuerySnapshot, StoreError, Subscription,
};
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::actions;
use crate::blocks::{self, BlockStatus};
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::events::{Effect, SessionEvent, Source};
use crate::messages;
use crate::models::{self, ConversationMeta, User};
use crate::notifications::NotificationKind;
use crate::paths;
use crate::presence;
use crate::state::ChatState;

type EventSender = mpsc::UnboundedSender<SessionEvent>;

/// Aborts the wrapped task when dropped.
pub(crate) struct TaskGuard(JoinHandle<()>);

impl TaskGuard {
    fn spawn<F>(future: F) -> Self
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        Self(tokio::spawn(future))
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

// ---------------------------------------------------------------------------
// Session handle
// ---------------------------------------------------------------------------

pub struct ChatSession<S: DocumentStore> {
    store: Arc<S>,
    user: User,
    session_id: SessionId,
    events: EventSender,
    view: watch::Receiver<ChatState>,
    tasks: Vec<TaskGuard>,
    closed: bool,
}

impl<S: DocumentStore> ChatSession<S> {
    /// Start a session for `user`.  Must be called inside a tokio runtime.
    pub fn start(store: Arc<S>, user: User, config: &ClientConfig, clock: Arc<dyn Clock>) -> Self {
        let session_id = SessionId::new();
        let local = user.uid.clone();
        let (events, rx) = mpsc::unbounded_channel();

        let state = ChatState::new(
            user.clone(),
            config.liveness_window_ms(),
            config.notification_ttl_ms(),
        );
        let (view_tx, view) = watch::channel(state.clone());

        let runtime = Runtime {
            store: store.clone(),
            local: local.clone(),
            events: events.clone(),
            previews: HashMap::new(),
            conversation: None,
            fetches: JoinSet::new(),
        };

        let mut tasks = vec![TaskGuard::spawn(run_reducer(
            state,
            runtime,
            rx,
            view_tx,
            clock,
        ))];

        tasks.push(TaskGuard::spawn(presence::run_heartbeat(
            store.clone(),
            local.clone(),
            session_id.clone(),
            config.heartbeat_interval,
        )));
        tasks.push(TaskGuard::spawn(run_ticker(
            events.clone(),
            config.presence_reevaluation,
        )));

        let directory = Query::collection(paths::users()).where_ne("uid", local.as_str());
        tasks.push(observe_query(
            store.clone(),
            directory,
            events.clone(),
            Source::Directory,
            None,
            |snapshot| SessionEvent::DirectorySnapshot(decode_directory(snapshot)),
        ));
        tasks.push(observe_query(
            store.clone(),
            Query::collection(paths::statuses()),
            events.clone(),
            Source::Presence,
            None,
            |snapshot| SessionEvent::PresenceSnapshot(presence::decode_records(snapshot)),
        ));
        tasks.push(observe_query(
            store.clone(),
            Query::collection(paths::blocked_users(&local)),
            events.clone(),
            Source::BlockSet,
            None,
            |snapshot| SessionEvent::BlockSetSnapshot(blocks::decode_block_set(&snapshot)),
        ));

        info!(uid = %local.short(), session = %session_id, "chat session started");

        Self {
            store,
            user,
            session_id,
            events,
            view,
            tasks,
            closed: false,
        }
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// The most recently published state.
    pub fn state(&self) -> ChatState {
        self.view.borrow().clone()
    }

    /// A receiver that observes every published state.
    pub fn subscribe(&self) -> watch::Receiver<ChatState> {
        self.view.clone()
    }

    /// Wait until the published state satisfies `ready`.
    pub async fn wait_until(&self, ready: impl FnMut(&ChatState) -> bool) -> Result<ChatState> {
        let mut view = self.view.clone();
        let state = view
            .wait_for(ready)
            .await
            .map_err(|_| ClientError::SessionClosed)?;
        Ok(state.clone())
    }

    // ---- Selection ----

    /// Open the conversation with `uid`.
    pub fn select_user(&self, uid: &UserId) {
        self.dispatch(SessionEvent::Select(Some(uid.clone())));
    }

    pub fn clear_selection(&self) {
        self.dispatch(SessionEvent::Select(None));
    }

    pub fn dismiss_notification(&self, id: u64) {
        self.dispatch(SessionEvent::DismissNotification(id));
    }

    // ---- Messages ----

    /// Send `text` to the selected user.
    pub async fn send_message(&self, text: &str) -> Result<()> {
        let state = self.state();
        let selection = state.selection().ok_or(ClientError::NoSelection)?;
        if text.trim().is_empty() {
            return Err(ClientError::EmptyMessage);
        }

        let counterparty = selection.user.clone();
        let by_me = state.blocks().blocked_by_me(&counterparty);
        let by_them = match state.blocks().blocked_me(&counterparty) {
            Some(blocked_me) => blocked_me,
            None if by_me => false,
            // The check for this selection is still in flight.
            None => blocks::has_blocked(&*self.store, &counterparty, &self.user.uid).await?,
        };
        if let Some(notice) = BlockStatus::from_directions(by_me, by_them).notice() {
            warn!(to = %counterparty.short(), "send rejected: conversation is blocked");
            self.notify(NotificationKind::Info, notice);
            return Err(ClientError::Blocked);
        }

        let result = messages::send_message(&*self.store, &self.user.uid, &counterparty, text).await;
        self.report(result.map(|_| ()), "Message sent successfully", "Failed to send message")
    }

    /// Soft-delete one of the local user's messages in the active
    /// conversation.
    pub async fn delete_message(&self, message_id: &str) -> Result<()> {
        let state = self.state();
        let conversation = state
            .messages()
            .conversation()
            .cloned()
            .ok_or(ClientError::NoSelection)?;
        let message = state
            .messages()
            .get(message_id)
            .ok_or_else(|| ClientError::UnknownMessage(message_id.to_string()))?;
        if !message.is_from(&self.user.uid) {
            return Err(ClientError::NotMessageOwner(message_id.to_string()));
        }

        let result = messages::soft_delete(&*self.store, &conversation, message_id).await;
        self.report(result, "Message deleted", "Failed to delete message")
    }

    /// Report a message of the active conversation.
    pub async fn report_message(&self, message_id: &str) -> Result<()> {
        let state = self.state();
        let message = state
            .messages()
            .get(message_id)
            .ok_or_else(|| ClientError::UnknownMessage(message_id.to_string()))?;

        let result = messages::report_message(&*self.store, &self.user.uid, message).await;
        self.report(
            result.map(|_| ()),
            "Message reported successfully",
            "Failed to report message",
        )
    }

    // ---- Conversation actions ----

    /// Block `uid`; closes the conversation if it is the selected one.
    pub async fn block_user(&self, uid: &UserId) -> Result<()> {
        let result = actions::block_user(&*self.store, &self.user.uid, uid).await;
        if result.is_ok() && self.is_selected(uid) {
            self.dispatch(SessionEvent::Select(None));
        }
        self.report(result, "User blocked successfully", "Failed to block user")
    }

    pub async fn unblock_user(&self, uid: &UserId) -> Result<()> {
        let result = actions::unblock_user(&*self.store, &self.user.uid, uid).await;
        self.report(result, "User unblocked successfully", "Failed to unblock user")
    }

    /// Delete the whole conversation with `uid` and drop them from the
    /// roster until the next directory snapshot.
    pub async fn delete_conversation(&self, uid: &UserId) -> Result<usize> {
        let result = actions::delete_conversation(&*self.store, &self.user.uid, uid).await;
        if result.is_ok() {
            self.dispatch(SessionEvent::ConversationDeleted(uid.clone()));
        }
        match result {
            Ok(removed) => {
                self.notify(NotificationKind::Success, "Chat deleted successfully");
                Ok(removed)
            }
            Err(e) => {
                error!(peer = %uid.short(), error = %e, "failed to delete conversation");
                self.notify(NotificationKind::Error, "Failed to delete chat");
                Err(e)
            }
        }
    }

    // ---- Lifecycle ----

    /// Stop every task, then remove this client's presence session.
    pub async fn shutdown(mut self) {
        self.closed = true;
        self.tasks.clear();
        if let Err(e) = presence::remove_session(&*self.store, &self.user.uid, &self.session_id).await
        {
            warn!(error = %e, "failed to remove presence session");
        }
        info!(uid = %self.user.uid.short(), "chat session closed");
    }

    // ---- Internals ----

    fn dispatch(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            warn!("session reducer is gone; event dropped");
        }
    }

    fn notify(&self, kind: NotificationKind, message: &str) {
        self.dispatch(SessionEvent::Notify {
            kind,
            message: message.to_string(),
        });
    }

    fn report(&self, result: Result<()>, success: &str, failure: &str) -> Result<()> {
        match result {
            Ok(()) => {
                self.notify(NotificationKind::Success, success);
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "{failure}");
                self.notify(NotificationKind::Error, failure);
                Err(e)
            }
        }
    }

    fn is_selected(&self, uid: &UserId) -> bool {
        self.view
            .borrow()
            .selection()
            .is_some_and(|s| &s.user == uid)
    }
}

impl<S: DocumentStore> Drop for ChatSession<S> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.tasks.clear();

        // Best effort: without a runtime the entry ages out instead.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let store = self.store.clone();
            let uid = self.user.uid.clone();
            let session = self.session_id.clone();
            handle.spawn(async move {
                if let Err(e) = presence::remove_session(&*store, &uid, &session).await {
                    debug!(error = %e, "presence cleanup after drop failed");
                }
            });
        }
    }
}

// ---------------------------------------------------------------------------
// Reducer
// ---------------------------------------------------------------------------

/// Tasks owned by the reducer, replaced as state changes.
struct Runtime<S: DocumentStore> {
    store: Arc<S>,
    local: UserId,
    events: EventSender,
    previews: HashMap<UserId, TaskGuard>,
    conversation: Option<TaskGuard>,
    fetches: JoinSet<()>,
}

impl<S: DocumentStore> Runtime<S> {
    fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::SyncPreviews(members) => {
                self.previews.retain(|uid, _| members.contains(uid));
                for uid in members {
                    if !self.previews.contains_key(&uid) {
                        let guard = self.observe_preview(uid.clone());
                        self.previews.insert(uid, guard);
                    }
                }
            }

            Effect::WatchConversation {
                epoch,
                conversation,
            } => {
                // Detach the previous conversation before subscribing anew.
                self.conversation = None;
                self.conversation = Some(observe_query(
                    self.store.clone(),
                    messages::stream_query(&conversation),
                    self.events.clone(),
                    Source::Messages,
                    Some(epoch),
                    move |snapshot| SessionEvent::MessagesSnapshot {
                        epoch,
                        messages: messages::decode_messages(snapshot),
                    },
                ));
            }

            Effect::StopConversation => self.conversation = None,

            Effect::FetchCounterpartBlock {
                epoch,
                counterparty,
            } => {
                let store = self.store.clone();
                let local = self.local.clone();
                let events = self.events.clone();
                self.fetches.spawn(async move {
                    let event = match blocks::has_blocked(&*store, &counterparty, &local).await {
                        Ok(blocked_me) => SessionEvent::CounterpartBlockFetched {
                            epoch,
                            counterparty,
                            blocked_me,
                        },
                        Err(e) => SessionEvent::SourceFailed {
                            source: Source::CounterpartBlock,
                            epoch: Some(epoch),
                            error: e.to_string(),
                        },
                    };
                    let _ = events.send(event);
                });
            }

            Effect::ResolveBlockedUsers { generation, ids } => {
                let store = self.store.clone();
                let events = self.events.clone();
                self.fetches.spawn(async move {
                    let users = blocks::resolve_blocked_users(&*store, &ids).await;
                    let _ = events.send(SessionEvent::BlockedUsersResolved { generation, users });
                });
            }
        }
    }

    fn observe_preview(&self, counterparty: UserId) -> TaskGuard {
        let conversation = ConversationId::between(&self.local, &counterparty);
        let source = Source::Preview(counterparty.clone());
        observe_document(
            self.store.clone(),
            paths::chat_meta(&conversation),
            self.events.clone(),
            source,
            move |snapshot| SessionEvent::PreviewSnapshot {
                counterparty: counterparty.clone(),
                meta: decode_meta(snapshot),
            },
        )
    }

    /// Collect finished one-shot fetches.
    fn reap(&mut self) {
        while self.fetches.try_join_next().is_some() {}
    }
}

async fn run_reducer<S: DocumentStore>(
    mut state: ChatState,
    mut runtime: Runtime<S>,
    mut rx: mpsc::UnboundedReceiver<SessionEvent>,
    view: watch::Sender<ChatState>,
    clock: Arc<dyn Clock>,
) {
    while let Some(event) = rx.recv().await {
        for effect in state.apply(event, clock.now_millis()) {
            runtime.execute(effect);
        }
        runtime.reap();
        view.send_replace(state.clone());
    }
    debug!("session reducer stopped");
}

async fn run_ticker(events: EventSender, period: std::time::Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately; presence was just derived.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        if events.send(SessionEvent::Tick).is_err() {
            return;
        }
    }
}

// ---------------------------------------------------------------------------
// Observers
// ---------------------------------------------------------------------------

fn observe_query<S, F>(
    store: Arc<S>,
    query: Query,
    events: EventSender,
    source: Source,
    epoch: Option<u64>,
    map: F,
) -> TaskGuard
where
    S: DocumentStore,
    F: FnMut(QuerySnapshot) -> SessionEvent + Send + 'static,
{
    TaskGuard::spawn(async move {
        match store.watch_query(&query).await {
            Ok(subscription) => forward(subscription, &events, source, epoch, map).await,
            Err(e) => report_failure(&events, source, epoch, &e),
        }
    })
}

fn observe_document<S, F>(
    store: Arc<S>,
    path: DocumentPath,
    events: EventSender,
    source: Source,
    map: F,
) -> TaskGuard
where
    S: DocumentStore,
    F: FnMut(DocumentSnapshot) -> SessionEvent + Send + 'static,
{
    TaskGuard::spawn(async move {
        match store.watch_document(&path).await {
            Ok(subscription) => forward(subscription, &events, source, None, map).await,
            Err(e) => report_failure(&events, source, None, &e),
        }
    })
}

/// Forward snapshots as events until the subscription fails or ends.
async fn forward<T, F>(
    mut subscription: Subscription<T>,
    events: &EventSender,
    source: Source,
    epoch: Option<u64>,
    mut map: F,
) where
    T: Send + 'static,
    F: FnMut(T) -> SessionEvent,
{
    while let Some(item) = subscription.next().await {
        match item {
            Ok(snapshot) => {
                if events.send(map(snapshot)).is_err() {
                    return;
                }
            }
            Err(e) => {
                report_failure(events, source, epoch, &e);
                return;
            }
        }
    }
    report_failure(events, source, epoch, &StoreError::SubscriptionClosed);
}

fn report_failure(events: &EventSender, source: Source, epoch: Option<u64>, error: &StoreError) {
    warn!(source = %source, error = %error, "subscription failed");
    let _ = events.send(SessionEvent::SourceFailed {
        source,
        epoch,
        error: error.to_string(),
    });
}

fn decode_directory(snapshot: QuerySnapshot) -> Vec<User> {
    snapshot
        .documents
        .into_iter()
        .filter_map(|doc| match models::decode_user(&doc.id, doc.data) {
            Ok(user) => Some(user),
            Err(e) => {
                warn!(id = %doc.id, error = %e, "skipping undecodable directory record");
                None
            }
        })
        .collect()
}

fn decode_meta(snapshot: DocumentSnapshot) -> Option<ConversationMeta> {
    let fields = snapshot.data?;
    match models::decode::<ConversationMeta>("conversation metadata", fields) {
        Ok(meta) => Some(meta),
        Err(e) => {
            warn!(path = %snapshot.path, error = %e, "undecodable conversation metadata");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use parley_shared::constants::DELETED_MESSAGE_TEXT;
    use parley_shared::ManualClock;
    use parley_store::{SetOptions, SqliteStore};
    use serde_json::json;

    use super::*;
    use crate::testing::FlakyStore;

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

    fn store(clock: &ManualClock) -> Arc<SqliteStore> {
        Arc::new(SqliteStore::open_in_memory(Arc::new(clock.clone())).unwrap())
    }

    async fn register<S: DocumentStore>(store: &S, name: &str) -> User {
        let user = user(name);
        let fields = models::fields(json!({
            "uid": user.uid,
            "email": user.email,
        }));
        store
            .set(&paths::user(&user.uid), fields, SetOptions::REPLACE)
            .await
            .unwrap();
        user
    }

    fn start<S: DocumentStore>(store: &Arc<S>, user: &User, clock: &ManualClock) -> ChatSession<S> {
        ChatSession::start(
            store.clone(),
            user.clone(),
            &ClientConfig::default(),
            Arc::new(clock.clone()),
        )
    }

    async fn settle<S: DocumentStore>(
        session: &ChatSession<S>,
        ready: impl FnMut(&ChatState) -> bool,
    ) -> ChatState {
        tokio::time::timeout(Duration::from_secs(5), session.wait_until(ready))
            .await
            .expect("state did not settle")
            .unwrap()
    }

    async fn select<S: DocumentStore>(session: &ChatSession<S>, peer: &UserId) -> ChatState {
        session.select_user(peer);
        settle(session, |s| {
            s.selection().is_some_and(|sel| &sel.user == peer)
                && s.messages().is_loaded()
                && s.blocks().is_resolved(peer)
        })
        .await
    }

    async fn message_count<S: DocumentStore>(store: &S, a: &UserId, b: &UserId) -> usize {
        let conversation = ConversationId::between(a, b);
        store
            .query(&Query::collection(paths::messages(&conversation)))
            .await
            .unwrap()
            .len()
    }

    // ---- Roster ----

    #[tokio::test]
    async fn test_new_message_sorts_sender_first() {
        let clock = ManualClock::new(100);
        let store = store(&clock);
        let alice = register(&*store, "alice").await;
        let bob = register(&*store, "bob").await;
        let carol = register(&*store, "carol").await;

        let a = start(&store, &alice, &clock);
        let b = start(&store, &bob, &clock);

        select(&a, &bob.uid).await;
        a.send_message("hi").await.unwrap();

        let state = settle(&b, |s| {
            s.roster()
                .get(&alice.uid)
                .is_some_and(|e| e.preview.is_some())
        })
        .await;
        let entries = state.roster().entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].user.uid, alice.uid);
        assert_eq!(entries[0].preview_text(), "hi");
        assert_eq!(entries[0].last_activity(), 100);
        assert_eq!(entries[1].user.uid, carol.uid);
        assert_eq!(entries[1].last_activity(), 0);

        // The sender's own roster carries the same preview.
        let state = settle(&a, |s| {
            s.roster()
                .get(&bob.uid)
                .is_some_and(|e| e.preview.is_some())
        })
        .await;
        assert_eq!(state.roster().entries()[0].user.uid, bob.uid);

        a.shutdown().await;
        b.shutdown().await;
    }

    #[tokio::test]
    async fn test_roster_excludes_local_user() {
        let clock = ManualClock::new(0);
        let store = store(&clock);
        let alice = register(&*store, "alice").await;
        let bob = register(&*store, "bob").await;

        let a = start(&store, &alice, &clock);
        let state = settle(&a, |s| s.roster().is_loaded()).await;
        assert_eq!(state.roster().member_ids().into_iter().collect::<Vec<_>>(), vec![bob.uid]);
    }

    // ---- Blocks ----

    #[tokio::test]
    async fn test_blocked_by_counterparty_rejects_send_without_write() {
        let clock = ManualClock::new(0);
        let store = store(&clock);
        let alice = register(&*store, "alice").await;
        let bob = register(&*store, "bob").await;

        let a = start(&store, &alice, &clock);
        let b = start(&store, &bob, &clock);

        a.block_user(&bob.uid).await.unwrap();

        let state = select(&b, &alice.uid).await;
        assert_eq!(state.block_status(), Some(BlockStatus::BlockedByThem));
        assert_eq!(
            state.block_status().and_then(BlockStatus::notice),
            Some("This user has blocked you")
        );

        let err = b.send_message("hello?").await.unwrap_err();
        assert!(matches!(err, ClientError::Blocked));
        assert!(err.is_validation());
        assert_eq!(message_count(&*store, &alice.uid, &bob.uid).await, 0);

        let state = settle(&b, |s| s.notifications().latest().is_some()).await;
        let latest = state.notifications().latest().unwrap();
        assert_eq!(latest.kind, NotificationKind::Info);
        assert_eq!(latest.message, "This user has blocked you");
    }

    #[tokio::test]
    async fn test_send_checks_pending_counterparty_direction() {
        let clock = ManualClock::new(0);
        let store = store(&clock);
        let alice = register(&*store, "alice").await;
        let bob = register(&*store, "bob").await;

        actions::block_user(&*store, &alice.uid, &bob.uid).await.unwrap();

        let b = start(&store, &bob, &clock);
        b.select_user(&alice.uid);
        settle(&b, |s| s.selection().is_some()).await;

        // Whether or not the fetch has landed, the send must see the block.
        assert!(matches!(
            b.send_message("hello?").await,
            Err(ClientError::Blocked)
        ));
        assert_eq!(message_count(&*store, &alice.uid, &bob.uid).await, 0);
    }

    #[tokio::test]
    async fn test_blocking_selected_user_clears_selection() {
        let clock = ManualClock::new(0);
        let store = store(&clock);
        let alice = register(&*store, "alice").await;
        let bob = register(&*store, "bob").await;

        let a = start(&store, &alice, &clock);
        select(&a, &bob.uid).await;

        a.block_user(&bob.uid).await.unwrap();
        let state = settle(&a, |s| s.selection().is_none() && !s.blocked_users().is_empty()).await;
        assert_eq!(state.blocked_users()[0].uid, bob.uid);
        assert!(state.blocks().blocked_by_me(&bob.uid));

        let state = select(&a, &bob.uid).await;
        assert_eq!(state.block_status(), Some(BlockStatus::BlockedByMe));
        assert!(matches!(a.send_message("hi").await, Err(ClientError::Blocked)));

        a.unblock_user(&bob.uid).await.unwrap();
        let state = settle(&a, |s| s.blocked_users().is_empty()).await;
        assert_eq!(state.block_status(), Some(BlockStatus::Clear));
    }

    // ---- Conversations ----

    #[tokio::test]
    async fn test_delete_conversation_resets_both_sides() {
        let clock = ManualClock::new(1_000);
        let store = store(&clock);
        let alice = register(&*store, "alice").await;
        let bob = register(&*store, "bob").await;

        let a = start(&store, &alice, &clock);
        let b = start(&store, &bob, &clock);

        select(&a, &bob.uid).await;
        a.send_message("one").await.unwrap();
        clock.advance_secs(1);
        a.send_message("two").await.unwrap();
        settle(&b, |s| {
            s.roster()
                .get(&alice.uid)
                .is_some_and(|e| e.preview_text() == "two")
        })
        .await;

        assert_eq!(a.delete_conversation(&bob.uid).await.unwrap(), 2);

        let state = settle(&a, |s| !s.roster().contains(&bob.uid)).await;
        assert!(state.selection().is_none());
        let state = settle(&b, |s| {
            s.roster()
                .get(&alice.uid)
                .is_some_and(|e| e.preview.is_none())
        })
        .await;
        assert_eq!(state.roster().entries()[0].preview_text(), "Start a conversation");

        assert_eq!(message_count(&*store, &alice.uid, &bob.uid).await, 0);
        let meta = store
            .get(&paths::chat_meta(&ConversationId::between(&alice.uid, &bob.uid)))
            .await
            .unwrap();
        assert!(!meta.exists());

        // The next directory snapshot brings the member back without history.
        register(&*store, "dave").await;
        let state = settle(&a, |s| s.roster().contains(&bob.uid)).await;
        assert!(state.roster().get(&bob.uid).unwrap().preview.is_none());
    }

    #[tokio::test]
    async fn test_soft_delete_keeps_preview() {
        let clock = ManualClock::new(0);
        let store = store(&clock);
        let alice = register(&*store, "alice").await;
        let bob = register(&*store, "bob").await;

        let a = start(&store, &alice, &clock);
        let b = start(&store, &bob, &clock);

        select(&a, &bob.uid).await;
        a.send_message("regrettable").await.unwrap();
        let state = settle(&a, |s| s.messages().messages().len() == 1).await;
        let id = state.messages().messages()[0].id.clone();

        // Only the sender may delete.
        select(&b, &alice.uid).await;
        settle(&b, |s| s.messages().get(&id).is_some()).await;
        assert!(matches!(
            b.delete_message(&id).await,
            Err(ClientError::NotMessageOwner(_))
        ));

        a.delete_message(&id).await.unwrap();
        let state = settle(&b, |s| {
            s.messages().get(&id).is_some_and(|m| m.deleted)
                && s.roster()
                    .get(&alice.uid)
                    .is_some_and(|e| e.preview.is_some())
        })
        .await;
        assert_eq!(state.messages().get(&id).unwrap().text, DELETED_MESSAGE_TEXT);
        assert_eq!(
            state.roster().get(&alice.uid).unwrap().preview_text(),
            "regrettable"
        );

        // Deleting again changes nothing.
        a.delete_message(&id).await.unwrap();
        assert!(matches!(
            a.delete_message("missing").await,
            Err(ClientError::UnknownMessage(_))
        ));
    }

    #[tokio::test]
    async fn test_report_message_files_report() {
        let clock = ManualClock::new(0);
        let store = store(&clock);
        let alice = register(&*store, "alice").await;
        let bob = register(&*store, "bob").await;

        let a = start(&store, &alice, &clock);
        let b = start(&store, &bob, &clock);

        select(&a, &bob.uid).await;
        a.send_message("spam").await.unwrap();

        select(&b, &alice.uid).await;
        let state = settle(&b, |s| !s.messages().messages().is_empty()).await;
        let id = state.messages().messages()[0].id.clone();
        b.report_message(&id).await.unwrap();

        let reports = store.query(&Query::collection(paths::reports())).await.unwrap();
        assert_eq!(reports.len(), 1);
        let state = settle(&b, |s| {
            s.notifications()
                .latest()
                .is_some_and(|n| n.message == "Message reported successfully")
        })
        .await;
        assert_eq!(state.notifications().latest().unwrap().kind, NotificationKind::Success);
    }

    #[tokio::test]
    async fn test_switching_selection_discards_previous_stream() {
        let clock = ManualClock::new(0);
        let store = store(&clock);
        let alice = register(&*store, "alice").await;
        let bob = register(&*store, "bob").await;
        let carol = register(&*store, "carol").await;

        messages::send_message(&*store, &bob.uid, &alice.uid, "from bob")
            .await
            .unwrap();

        let a = start(&store, &alice, &clock);
        a.select_user(&bob.uid);
        let state = select(&a, &carol.uid).await;
        assert_eq!(
            state.messages().conversation(),
            Some(&ConversationId::between(&alice.uid, &carol.uid))
        );
        assert!(state.messages().messages().is_empty());
    }

    #[tokio::test]
    async fn test_empty_and_unselected_sends_are_rejected() {
        let clock = ManualClock::new(0);
        let store = store(&clock);
        let alice = register(&*store, "alice").await;
        let bob = register(&*store, "bob").await;

        let a = start(&store, &alice, &clock);
        assert!(matches!(a.send_message("hi").await, Err(ClientError::NoSelection)));

        select(&a, &bob.uid).await;
        assert!(matches!(a.send_message("   ").await, Err(ClientError::EmptyMessage)));
        assert_eq!(message_count(&*store, &alice.uid, &bob.uid).await, 0);
    }

    // ---- Presence ----

    #[tokio::test(start_paused = true)]
    async fn test_silent_user_goes_offline_after_window() {
        let clock = ManualClock::new(0);
        let store = store(&clock);
        let alice = register(&*store, "alice").await;
        let bob = register(&*store, "bob").await;
        presence::touch_session(&*store, &bob.uid, &SessionId::new())
            .await
            .unwrap();

        let a = start(&store, &alice, &clock);
        a.wait_until(|s| s.is_online(&bob.uid)).await.unwrap();

        clock.advance_secs(59);
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(a.state().is_online(&bob.uid));

        clock.advance_secs(2);
        a.wait_until(|s| !s.is_online(&bob.uid)).await.unwrap();
        assert!(a.state().is_online(&alice.uid));
    }

    #[tokio::test]
    async fn test_shutdown_removes_presence_session() {
        let clock = ManualClock::new(0);
        let store = store(&clock);
        let alice = register(&*store, "alice").await;
        let bob = register(&*store, "bob").await;

        let a = start(&store, &alice, &clock);
        let b = start(&store, &bob, &clock);
        settle(&a, |s| s.is_online(&bob.uid)).await;

        b.shutdown().await;
        settle(&a, |s| !s.is_online(&bob.uid)).await;
    }

    // ---- Failures ----

    #[tokio::test]
    async fn test_write_failure_notifies_and_leaves_state() {
        let clock = ManualClock::new(0);
        let store = Arc::new(FlakyStore::new(
            SqliteStore::open_in_memory(Arc::new(clock.clone())).unwrap(),
        ));
        let alice = register(&*store, "alice").await;
        let bob = register(&*store, "bob").await;

        let a = start(&store, &alice, &clock);
        select(&a, &bob.uid).await;

        store.fail_writes.store(true, Ordering::SeqCst);
        let err = a.send_message("lost").await.unwrap_err();
        assert!(matches!(err, ClientError::Store(StoreError::Unavailable(_))));

        let state = settle(&a, |s| s.notifications().latest().is_some()).await;
        let latest = state.notifications().latest().unwrap();
        assert_eq!(latest.kind, NotificationKind::Error);
        assert_eq!(latest.message, "Failed to send message");
        assert!(state.messages().messages().is_empty());
        assert!(state.selection().is_some());

        store.fail_writes.store(false, Ordering::SeqCst);
        assert_eq!(message_count(&*store, &alice.uid, &bob.uid).await, 0);
    }

    #[tokio::test]
    async fn test_failed_subscriptions_mark_sources_stale() {
        let clock = ManualClock::new(0);
        let store = Arc::new(FlakyStore::new(
            SqliteStore::open_in_memory(Arc::new(clock.clone())).unwrap(),
        ));
        let alice = register(&*store, "alice").await;
        store.fail_watches.store(true, Ordering::SeqCst);

        let a = start(&store, &alice, &clock);
        let state = settle(&a, |s| s.stale_sources().len() == 3).await;
        assert!(state.is_stale(&Source::Directory));
        assert!(state.is_stale(&Source::Presence));
        assert!(state.is_stale(&Source::BlockSet));
        assert!(!state.roster().is_loaded());
    }

    #[tokio::test]
    async fn test_dropping_session_releases_listeners() {
        let clock = ManualClock::new(0);
        let store = store(&clock);
        let alice = register(&*store, "alice").await;
        let bob = register(&*store, "bob").await;

        let a = start(&store, &alice, &clock);
        select(&a, &bob.uid).await;
        assert!(store.listener_count() > 0);

        drop(a);
        tokio::time::timeout(Duration::from_secs(5), async {
            while store.listener_count() > 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("listeners still attached");
    }
}
