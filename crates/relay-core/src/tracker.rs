//! Unread counts and incoming-message notifications.
//!
//! The tracker watches every message insert in the store.  A message from
//! someone else in a conversation the local user belongs to bumps that
//! sender's unread count and raises a toast (plus an OS notification and a
//! tone, when enabled).  Messages for the conversation the UI has open are
//! ignored.  The feed may deliver an insert more than once; each message id
//! is counted at most once.
//!
//! Counts are published on a `tokio::sync::watch` channel; the roster
//! subscribes to it and recomputes badges without refetching.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use relay_shared::{ConversationId, UserId};
use relay_store::{Message, Record, Store, Table, WatchFilter};

use crate::events::{EventSink, Toast, UiEvent};
use crate::notify::Notifier;

pub type UnreadCounts = HashMap<UserId, u32>;

/// How many handled message ids are remembered for de-duplication.
const SEEN_CAPACITY: usize = 1024;

/// Bounded set of message ids, oldest evicted first.
#[derive(Debug, Default)]
struct SeenIds {
    ids: HashSet<Uuid>,
    order: VecDeque<Uuid>,
}

impl SeenIds {
    /// Returns `false` if `id` was already recorded.
    fn insert(&mut self, id: Uuid) -> bool {
        if !self.ids.insert(id) {
            return false;
        }
        self.order.push_back(id);
        if self.order.len() > SEEN_CAPACITY {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
        true
    }

    fn clear(&mut self) {
        self.ids.clear();
        self.order.clear();
    }
}

pub struct UnreadTracker {
    local: UserId,
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
    events: EventSink,
    notifications_enabled: bool,
    counts: watch::Sender<UnreadCounts>,
    open_conversation: Mutex<Option<ConversationId>>,
    seen: Mutex<SeenIds>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl UnreadTracker {
    pub fn new(
        local: UserId,
        store: Arc<dyn Store>,
        notifier: Arc<dyn Notifier>,
        events: EventSink,
        notifications_enabled: bool,
    ) -> Arc<Self> {
        let (counts, _) = watch::channel(UnreadCounts::new());
        Arc::new(Self {
            local,
            store,
            notifier,
            events,
            notifications_enabled,
            counts,
            open_conversation: Mutex::new(None),
            seen: Mutex::new(SeenIds::default()),
            task: Mutex::new(None),
        })
    }

    /// Start watching message inserts.  Calling it again while running does
    /// nothing.
    pub fn start(self: &Arc<Self>) {
        let mut task = self.task.lock().unwrap_or_else(|p| p.into_inner());
        if task.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }

        let mut subscription = self.store.watch(WatchFilter::inserts(Table::Messages));
        let tracker: Weak<Self> = Arc::downgrade(self);
        *task = Some(tokio::spawn(async move {
            while let Some(event) = subscription.next().await {
                let Record::Message(message) = event.record else {
                    continue;
                };
                let Some(tracker) = tracker.upgrade() else {
                    break;
                };
                tracker.handle_message(&message).await;
            }
            debug!("unread watch ended");
        }));
        info!(user = %self.local, "unread tracker started");
    }

    /// Stop watching and forget all counts.
    pub fn stop(&self) {
        if let Some(handle) = self.task.lock().unwrap_or_else(|p| p.into_inner()).take() {
            handle.abort();
            info!(user = %self.local, "unread tracker stopped");
        }
        self.seen.lock().unwrap_or_else(|p| p.into_inner()).clear();
        self.counts.send_if_modified(|counts| {
            let had_any = !counts.is_empty();
            counts.clear();
            had_any
        });
    }

    /// Receiver side of the counts, for the roster.
    pub fn subscribe(&self) -> watch::Receiver<UnreadCounts> {
        self.counts.subscribe()
    }

    pub fn counts(&self) -> UnreadCounts {
        self.counts.borrow().clone()
    }

    pub fn unread_for(&self, counterpart: &UserId) -> u32 {
        self.counts.borrow().get(counterpart).copied().unwrap_or(0)
    }

    /// The conversation currently shown in the UI, if any.  Its messages do
    /// not count as unread.
    pub fn set_open_conversation(&self, conversation: Option<ConversationId>) {
        *self
            .open_conversation
            .lock()
            .unwrap_or_else(|p| p.into_inner()) = conversation;
    }

    pub fn mark_read(&self, counterpart: &UserId) {
        let cleared = self
            .counts
            .send_if_modified(|counts| counts.remove(counterpart).is_some_and(|n| n > 0));
        if cleared {
            debug!(counterpart = %counterpart, "marked read");
            self.events.emit(UiEvent::UnreadChanged {
                counterpart: counterpart.clone(),
                count: 0,
            });
        }
    }

    fn is_open(&self, conversation: ConversationId) -> bool {
        *self
            .open_conversation
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            == Some(conversation)
    }

    pub(crate) async fn handle_message(&self, message: &Message) {
        if message.sender_id == self.local {
            return;
        }

        let conversation = match self.store.conversation(message.conversation_id).await {
            Ok(Some(conversation)) => conversation,
            Ok(None) => {
                debug!(conversation = %message.conversation_id, "message for unknown conversation ignored");
                return;
            }
            Err(e) => {
                debug!(conversation = %message.conversation_id, error = %e, "participant lookup failed, event dropped");
                return;
            }
        };
        if !conversation.involves(&self.local) {
            return;
        }
        if self.is_open(conversation.id) {
            debug!(conversation = %conversation.id, "message for open conversation");
            return;
        }

        let first_delivery = self
            .seen
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(message.id);
        if !first_delivery {
            debug!(msg_id = %message.id, "duplicate delivery ignored");
            return;
        }

        let sender = message.sender_id.clone();
        let mut count = 0;
        self.counts.send_modify(|counts| {
            let entry = counts.entry(sender.clone()).or_insert(0);
            *entry += 1;
            count = *entry;
        });
        debug!(counterpart = %sender, count, "unread incremented");
        self.events.emit(UiEvent::UnreadChanged {
            counterpart: sender.clone(),
            count,
        });

        self.notify(message).await;
    }

    async fn notify(&self, message: &Message) {
        let title = format!("Message from {}", self.sender_name(&message.sender_id).await);
        let body = if message.content.trim().is_empty() {
            "New message received".to_string()
        } else {
            message.content.clone()
        };

        self.events.emit(UiEvent::Toast(Toast::info(&title, &body)));

        if !self.notifications_enabled {
            return;
        }
        if let Err(e) = self.notifier.notify(&title, &body) {
            debug!(error = %e, "OS notification failed");
        }
        if let Err(e) = self.notifier.play_tone() {
            debug!(error = %e, "notification tone failed");
        }
    }

    async fn sender_name(&self, sender: &UserId) -> String {
        match self.store.profile(sender).await {
            Ok(Some(profile)) => profile
                .preferred_name()
                .map(str::to_string)
                .unwrap_or_else(|| sender.fallback_name()),
            Ok(None) => sender.fallback_name(),
            Err(e) => {
                warn!(sender = %sender, error = %e, "sender lookup failed");
                sender.fallback_name()
            }
        }
    }
}

impl Drop for UnreadTracker {
    fn drop(&mut self) {
        if let Some(handle) = self.task.lock().unwrap_or_else(|p| p.into_inner()).take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NotifyError;
    use relay_store::{rows, Profile, SqliteStore};
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingNotifier {
        shown: Mutex<Vec<(String, String)>>,
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, title: &str, body: &str) -> Result<(), NotifyError> {
            self.shown
                .lock()
                .unwrap()
                .push((title.to_string(), body.to_string()));
            Ok(())
        }

        fn play_tone(&self) -> Result<(), NotifyError> {
            Err(NotifyError::Playback("autoplay blocked".into()))
        }
    }

    fn uid(s: &str) -> UserId {
        UserId::parse(s).unwrap()
    }

    async fn setup() -> (Arc<dyn Store>, Arc<RecordingNotifier>, Arc<UnreadTracker>, ConversationId) {
        let store = SqliteStore::in_memory().unwrap();
        for (id, name) in [("AAAA1111", None), ("BBBB2222", Some("Bea"))] {
            store
                .register_profile(&Profile {
                    id: uid(id),
                    name: None,
                    display_name: name.map(str::to_string),
                    created_at: rows::now(),
                })
                .await
                .unwrap();
        }
        let conversation = store
            .insert_conversation(&uid("AAAA1111"), &uid("BBBB2222"))
            .await
            .unwrap()
            .id;
        let store: Arc<dyn Store> = Arc::new(store);
        let notifier = Arc::new(RecordingNotifier::default());
        let tracker = UnreadTracker::new(
            uid("AAAA1111"),
            store.clone(),
            notifier.clone(),
            EventSink::disabled(),
            true,
        );
        (store, notifier, tracker, conversation)
    }

    #[tokio::test]
    async fn test_incoming_message_counts_and_notifies() {
        let (store, notifier, tracker, conversation) = setup().await;
        let message = store
            .insert_message(conversation, &uid("BBBB2222"), "hello")
            .await
            .unwrap();

        tracker.handle_message(&message).await;

        assert_eq!(tracker.unread_for(&uid("BBBB2222")), 1);
        let shown = notifier.shown.lock().unwrap();
        assert_eq!(*shown, [("Message from Bea".to_string(), "hello".to_string())]);
    }

    #[tokio::test]
    async fn test_redelivered_message_counts_once() {
        let (store, notifier, tracker, conversation) = setup().await;
        let message = store
            .insert_message(conversation, &uid("BBBB2222"), "hello")
            .await
            .unwrap();

        tracker.handle_message(&message).await;
        tracker.handle_message(&message).await;
        assert_eq!(tracker.unread_for(&uid("BBBB2222")), 1);
        assert_eq!(notifier.shown.lock().unwrap().len(), 1);

        // Still ignored after the count was cleared.
        tracker.mark_read(&uid("BBBB2222"));
        tracker.handle_message(&message).await;
        assert_eq!(tracker.unread_for(&uid("BBBB2222")), 0);

        let next = store
            .insert_message(conversation, &uid("BBBB2222"), "again")
            .await
            .unwrap();
        tracker.handle_message(&next).await;
        assert_eq!(tracker.unread_for(&uid("BBBB2222")), 1);
    }

    #[test]
    fn test_seen_ids_evict_oldest() {
        let mut seen = SeenIds::default();
        let first = Uuid::new_v4();
        assert!(seen.insert(first));
        assert!(!seen.insert(first));
        for _ in 0..SEEN_CAPACITY {
            seen.insert(Uuid::new_v4());
        }
        assert_eq!(seen.order.len(), SEEN_CAPACITY);
        assert!(seen.insert(first));
    }

    #[tokio::test]
    async fn test_own_messages_are_not_counted() {
        let (store, notifier, tracker, conversation) = setup().await;
        let message = store
            .insert_message(conversation, &uid("AAAA1111"), "mine")
            .await
            .unwrap();
        tracker.handle_message(&message).await;
        assert!(tracker.counts().is_empty());
        assert!(notifier.shown.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_open_conversation_is_not_counted() {
        let (store, notifier, tracker, conversation) = setup().await;
        tracker.set_open_conversation(Some(conversation));
        let message = store
            .insert_message(conversation, &uid("BBBB2222"), "seen")
            .await
            .unwrap();
        tracker.handle_message(&message).await;
        assert_eq!(tracker.unread_for(&uid("BBBB2222")), 0);
        assert!(notifier.shown.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mark_read_clears_and_notifies_subscribers() {
        let (store, _notifier, tracker, conversation) = setup().await;
        let mut rx = tracker.subscribe();
        let message = store
            .insert_message(conversation, &uid("BBBB2222"), "hello")
            .await
            .unwrap();
        tracker.handle_message(&message).await;
        assert!(rx.has_changed().unwrap());
        let _ = rx.borrow_and_update();

        tracker.mark_read(&uid("BBBB2222"));
        assert!(rx.has_changed().unwrap());
        assert_eq!(tracker.unread_for(&uid("BBBB2222")), 0);

        let _ = rx.borrow_and_update();
        tracker.mark_read(&uid("BBBB2222"));
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_watch_drives_counts() {
        let (store, _notifier, tracker, conversation) = setup().await;
        tracker.start();
        store
            .insert_message(conversation, &uid("BBBB2222"), "live")
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(tracker.unread_for(&uid("BBBB2222")), 1);

        tracker.stop();
        assert!(tracker.counts().is_empty());
        store
            .insert_message(conversation, &uid("BBBB2222"), "after stop")
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(tracker.counts().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_conversation_is_dropped() {
        let (_store, notifier, tracker, _conversation) = setup().await;
        let orphan = Message {
            id: uuid::Uuid::new_v4(),
            conversation_id: ConversationId::new(),
            sender_id: uid("BBBB2222"),
            content: "lost".into(),
            created_at: rows::now(),
        };
        tracker.handle_message(&orphan).await;
        assert!(tracker.counts().is_empty());
        assert!(notifier.shown.lock().unwrap().is_empty());
    }
}
