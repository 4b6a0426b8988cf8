//! Message channel: the view of one open conversation.
//!
//! Holds the ordered message list for the bound conversation, merges live
//! inserts from the store's change feed, and runs the optimistic send flow
//! (temporary entry, durable write, confirm or roll back).
//!
//! At most one conversation is bound at a time.  Binding another one tears
//! the previous watch down first, so events for the old conversation can never
//! land in the new list.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use relay_shared::{ConversationId, UserId};
use relay_store::{rows, ColumnFilter, Message, Record, Store, Table, WatchFilter};

use crate::error::Result;
use crate::events::{EventSink, Toast, UiEvent};
use crate::resolver::ConversationResolver;

/// Delivery state of a message as seen by this client.
///
/// Moves forward only: `Sending -> Sent -> Delivered -> Read`, where `Sent`
/// may also jump straight to `Read`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sending,
    Sent,
    Delivered,
    Read,
}

impl MessageStatus {
    pub fn can_advance_to(self, next: MessageStatus) -> bool {
        use MessageStatus::*;
        matches!(
            (self, next),
            (Sending, Sent) | (Sent, Delivered) | (Sent, Read) | (Delivered, Read)
        )
    }
}

/// Identity of an entry in the list: a store id once confirmed, a local
/// placeholder while the write is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum MessageKey {
    Pending(u64),
    Confirmed(Uuid),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelMessage {
    pub key: MessageKey,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub status: MessageStatus,
    /// Sent by the local user.
    pub outgoing: bool,
    /// Arrival order, breaks `created_at` ties.
    #[serde(skip)]
    seq: u64,
}

impl ChannelMessage {
    pub fn id(&self) -> Option<Uuid> {
        match self.key {
            MessageKey::Confirmed(id) => Some(id),
            MessageKey::Pending(_) => None,
        }
    }
}

#[derive(Debug, Default)]
struct ChannelState {
    conversation: Option<ConversationId>,
    messages: Vec<ChannelMessage>,
    next_seq: u64,
    next_pending: u64,
}

impl ChannelState {
    fn bind(&mut self, conversation: Option<ConversationId>) {
        self.conversation = conversation;
        self.messages.clear();
    }

    fn contains(&self, id: Uuid) -> bool {
        self.messages
            .iter()
            .any(|m| m.key == MessageKey::Confirmed(id))
    }

    fn seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    /// Insert keeping `(created_at, seq)` order.
    fn insert_ordered(&mut self, message: ChannelMessage) {
        let pos = self
            .messages
            .partition_point(|m| (m.created_at, m.seq) <= (message.created_at, message.seq));
        self.messages.insert(pos, message);
    }

    fn confirmed(&mut self, message: &Message, local: &UserId) -> ChannelMessage {
        ChannelMessage {
            key: MessageKey::Confirmed(message.id),
            conversation_id: message.conversation_id,
            sender_id: message.sender_id.clone(),
            content: message.content.clone(),
            created_at: message.created_at,
            status: MessageStatus::Sent,
            outgoing: &message.sender_id == local,
            seq: self.seq(),
        }
    }

    /// Merge a persisted message.  Returns `false` if it was not applied
    /// (other conversation, or already present).
    fn merge(&mut self, message: &Message, local: &UserId) -> bool {
        if self.conversation != Some(message.conversation_id) || self.contains(message.id) {
            return false;
        }
        let entry = self.confirmed(message, local);
        self.insert_ordered(entry);
        true
    }

    fn push_pending(&mut self, conversation: ConversationId, sender: &UserId, content: &str) -> MessageKey {
        self.next_pending += 1;
        let key = MessageKey::Pending(self.next_pending);
        let entry = ChannelMessage {
            key,
            conversation_id: conversation,
            sender_id: sender.clone(),
            content: content.to_string(),
            created_at: rows::now(),
            status: MessageStatus::Sending,
            outgoing: true,
            seq: self.seq(),
        };
        self.insert_ordered(entry);
        key
    }

    fn remove(&mut self, key: MessageKey) -> Option<ChannelMessage> {
        let pos = self.messages.iter().position(|m| m.key == key)?;
        Some(self.messages.remove(pos))
    }

    /// Replace the placeholder with the acknowledged row.  If the feed already
    /// delivered the row, the placeholder is simply dropped.
    fn confirm(&mut self, pending: MessageKey, stored: &Message) {
        let Some(mut entry) = self.remove(pending) else {
            return;
        };
        if self.conversation != Some(stored.conversation_id) || self.contains(stored.id) {
            return;
        }
        entry.key = MessageKey::Confirmed(stored.id);
        entry.created_at = stored.created_at;
        entry.status = MessageStatus::Sent;
        self.insert_ordered(entry);
    }

    fn advance(&mut self, id: Uuid, next: MessageStatus) -> bool {
        match self
            .messages
            .iter_mut()
            .find(|m| m.key == MessageKey::Confirmed(id))
        {
            Some(entry) if entry.status.can_advance_to(next) => {
                entry.status = next;
                true
            }
            _ => false,
        }
    }
}

fn lock(state: &Mutex<ChannelState>) -> MutexGuard<'_, ChannelState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn emit_snapshot(state: &Mutex<ChannelState>, events: &EventSink) {
    let (conversation, messages) = {
        let state = lock(state);
        (state.conversation, state.messages.clone())
    };
    if let Some(conversation_id) = conversation {
        events.emit(UiEvent::MessagesChanged {
            conversation_id,
            messages,
        });
    }
}

pub struct MessageChannel {
    local: UserId,
    store: Arc<dyn Store>,
    resolver: ConversationResolver,
    events: EventSink,
    state: Arc<Mutex<ChannelState>>,
    watch: Mutex<Option<JoinHandle<()>>>,
}

impl MessageChannel {
    pub fn new(
        local: UserId,
        store: Arc<dyn Store>,
        resolver: ConversationResolver,
        events: EventSink,
    ) -> Self {
        Self {
            local,
            store,
            resolver,
            events,
            state: Arc::new(Mutex::new(ChannelState::default())),
            watch: Mutex::new(None),
        }
    }

    pub fn conversation_id(&self) -> Option<ConversationId> {
        lock(&self.state).conversation
    }

    /// Snapshot of the ordered message list.
    pub fn messages(&self) -> Vec<ChannelMessage> {
        lock(&self.state).messages.clone()
    }

    /// Bind `conversation`, start watching it and load its history.
    /// Re-opening the bound conversation is a no-op.
    pub async fn open(&self, conversation: ConversationId) {
        if self.conversation_id() == Some(conversation) && self.is_watching() {
            return;
        }
        self.subscribe(conversation);
        self.load(conversation).await;
    }

    /// Bind `conversation` and start merging its live inserts.  Any previous
    /// watch is stopped and the list is cleared first.
    pub fn subscribe(&self, conversation: ConversationId) {
        self.stop_watch();
        lock(&self.state).bind(Some(conversation));

        let mut subscription = self.store.watch(
            WatchFilter::inserts(Table::Messages)
                .with_column(ColumnFilter::ConversationId(conversation)),
        );
        let state = Arc::clone(&self.state);
        let events = self.events.clone();
        let local = self.local.clone();

        let handle = tokio::spawn(async move {
            while let Some(event) = subscription.next().await {
                let Record::Message(message) = event.record else {
                    continue;
                };
                let applied = lock(&state).merge(&message, &local);
                if applied {
                    debug!(msg_id = %message.id, conversation = %conversation, "live message merged");
                    emit_snapshot(&state, &events);
                }
            }
            debug!(conversation = %conversation, "message watch ended");
        });

        *self.watch.lock().unwrap_or_else(|p| p.into_inner()) = Some(handle);
        debug!(conversation = %conversation, "message watch started");
    }

    /// Fetch the history of `conversation` and merge it into the list.
    ///
    /// Entries already present (live inserts that raced the fetch, pending
    /// sends) are kept; history rows are merged by id.  A failed fetch logs
    /// and leaves only the pending sends.
    pub async fn load(&self, conversation: ConversationId) {
        let history = match self.store.messages(conversation).await {
            Ok(history) => history,
            Err(e) => {
                warn!(conversation = %conversation, error = %e, "failed to load messages");
                let mut state = lock(&self.state);
                if state.conversation == Some(conversation) {
                    state
                        .messages
                        .retain(|m| matches!(m.key, MessageKey::Pending(_)));
                }
                drop(state);
                emit_snapshot(&self.state, &self.events);
                return;
            }
        };

        {
            let mut state = lock(&self.state);
            if state.conversation != Some(conversation) {
                debug!(conversation = %conversation, "stale history load discarded");
                return;
            }
            for message in &history {
                state.merge(message, &self.local);
            }
        }
        debug!(conversation = %conversation, count = history.len(), "history loaded");
        emit_snapshot(&self.state, &self.events);
    }

    /// Stop watching and unbind.
    pub fn close(&self) {
        self.stop_watch();
        lock(&self.state).bind(None);
    }

    /// Send `text` to `recipient`.
    ///
    /// Blank text is ignored.  If no conversation is bound, the pair is
    /// resolved (creating the conversation on first send) and bound.  The
    /// message shows up immediately as `Sending`; it becomes `Sent` once the
    /// store acknowledges it, or disappears again if the write fails.
    ///
    /// Returns the conversation the message went to, `None` if nothing was
    /// sent.
    pub async fn send(&self, text: &str, recipient: &UserId) -> Result<Option<ConversationId>> {
        if text.trim().is_empty() {
            debug!("blank message ignored");
            return Ok(None);
        }

        let conversation = match self.conversation_id() {
            Some(id) => id,
            None => {
                let id = self.resolver.resolve(&self.local, recipient).await?;
                self.open(id).await;
                id
            }
        };

        let pending = lock(&self.state).push_pending(conversation, &self.local, text);
        emit_snapshot(&self.state, &self.events);

        match self.store.insert_message(conversation, &self.local, text).await {
            Ok(stored) => {
                lock(&self.state).confirm(pending, &stored);
                emit_snapshot(&self.state, &self.events);
                info!(msg_id = %stored.id, conversation = %conversation, "message sent");

                if let Err(e) = self
                    .store
                    .touch_conversation(conversation, text, stored.created_at)
                    .await
                {
                    warn!(conversation = %conversation, error = %e, "failed to update conversation preview");
                }
                Ok(Some(conversation))
            }
            Err(e) => {
                lock(&self.state).remove(pending);
                emit_snapshot(&self.state, &self.events);
                warn!(conversation = %conversation, error = %e, "message send failed");
                self.events.emit(UiEvent::SendFailed {
                    conversation_id: Some(conversation),
                    reason: e.to_string(),
                });
                self.events
                    .emit(UiEvent::Toast(Toast::error("Message not sent", "Please try again.")));
                Err(e.into())
            }
        }
    }

    pub fn mark_delivered(&self, id: Uuid) -> bool {
        self.advance(id, MessageStatus::Delivered)
    }

    pub fn mark_read(&self, id: Uuid) -> bool {
        self.advance(id, MessageStatus::Read)
    }

    fn advance(&self, id: Uuid, next: MessageStatus) -> bool {
        let changed = lock(&self.state).advance(id, next);
        if changed {
            emit_snapshot(&self.state, &self.events);
        }
        changed
    }

    fn is_watching(&self) -> bool {
        self.watch
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    fn stop_watch(&self) {
        if let Some(handle) = self.watch.lock().unwrap_or_else(|p| p.into_inner()).take() {
            handle.abort();
        }
    }
}

impl Drop for MessageChannel {
    fn drop(&mut self) {
        self.stop_watch();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_store::{Profile, SqliteStore};

    fn uid(s: &str) -> UserId {
        UserId::parse(s).unwrap()
    }

    fn stored(conversation: ConversationId, sender: &str, content: &str) -> Message {
        Message {
            id: Uuid::new_v4(),
            conversation_id: conversation,
            sender_id: uid(sender),
            content: content.into(),
            created_at: rows::now(),
        }
    }

    async fn setup() -> (Arc<dyn Store>, MessageChannel, ConversationId) {
        let store = SqliteStore::in_memory().unwrap();
        for id in ["AAAA1111", "BBBB2222"] {
            store
                .register_profile(&Profile {
                    id: uid(id),
                    name: None,
                    display_name: None,
                    created_at: rows::now(),
                })
                .await
                .unwrap();
        }
        let store: Arc<dyn Store> = Arc::new(store);
        let resolver = ConversationResolver::new(store.clone());
        let conversation = resolver
            .resolve(&uid("AAAA1111"), &uid("BBBB2222"))
            .await
            .unwrap();
        let channel = MessageChannel::new(
            uid("AAAA1111"),
            store.clone(),
            resolver,
            EventSink::disabled(),
        );
        (store, channel, conversation)
    }

    #[test]
    fn test_status_moves_forward_only() {
        use MessageStatus::*;
        assert!(Sending.can_advance_to(Sent));
        assert!(Sent.can_advance_to(Delivered));
        assert!(Sent.can_advance_to(Read));
        assert!(Delivered.can_advance_to(Read));
        assert!(!Sending.can_advance_to(Read));
        assert!(!Read.can_advance_to(Delivered));
        assert!(!Delivered.can_advance_to(Sent));
    }

    #[test]
    fn test_merge_is_idempotent_and_scoped() {
        let conversation = ConversationId::new();
        let local = uid("AAAA1111");
        let mut state = ChannelState::default();
        state.bind(Some(conversation));

        let message = stored(conversation, "BBBB2222", "hi");
        assert!(state.merge(&message, &local));
        assert!(!state.merge(&message, &local));
        assert!(!state.merge(&stored(ConversationId::new(), "BBBB2222", "elsewhere"), &local));
        assert_eq!(state.messages.len(), 1);
        assert!(!state.messages[0].outgoing);
    }

    #[test]
    fn test_confirm_after_feed_delivery_leaves_one_copy() {
        let conversation = ConversationId::new();
        let local = uid("AAAA1111");
        let mut state = ChannelState::default();
        state.bind(Some(conversation));

        let pending = state.push_pending(conversation, &local, "hello");
        let row = stored(conversation, "AAAA1111", "hello");
        // Feed first, acknowledgement second.
        assert!(state.merge(&row, &local));
        state.confirm(pending, &row);

        assert_eq!(state.messages.len(), 1);
        assert_eq!(state.messages[0].key, MessageKey::Confirmed(row.id));
        assert_eq!(state.messages[0].status, MessageStatus::Sent);
    }

    #[test]
    fn test_messages_ordered_by_creation_time() {
        let conversation = ConversationId::new();
        let local = uid("AAAA1111");
        let mut state = ChannelState::default();
        state.bind(Some(conversation));

        let mut late = stored(conversation, "BBBB2222", "second");
        let early = stored(conversation, "BBBB2222", "first");
        late.created_at = early.created_at + chrono::Duration::seconds(5);
        state.merge(&late, &local);
        state.merge(&early, &local);

        let contents: Vec<_> = state.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_send_shows_sending_before_sent() {
        let (store, _, conversation) = setup().await;
        let (events, mut rx) = EventSink::channel();
        let channel = MessageChannel::new(
            uid("AAAA1111"),
            store.clone(),
            ConversationResolver::new(store.clone()),
            events,
        );
        channel.open(conversation).await;
        while rx.try_recv().is_ok() {}

        channel.send("hello", &uid("BBBB2222")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let mut snapshots = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let UiEvent::MessagesChanged { messages, .. } = event {
                snapshots.push(messages);
            }
        }
        assert!(snapshots.len() >= 2, "expected pending and confirmed snapshots");

        let first = &snapshots[0];
        assert_eq!(first.len(), 1);
        assert!(matches!(first[0].key, MessageKey::Pending(_)));
        assert_eq!(first[0].status, MessageStatus::Sending);
        assert_eq!(first[0].content, "hello");

        let last = &snapshots[snapshots.len() - 1];
        assert_eq!(last.len(), 1);
        assert!(matches!(last[0].key, MessageKey::Confirmed(_)));
        assert_eq!(last[0].status, MessageStatus::Sent);
    }

    #[tokio::test]
    async fn test_send_confirms_single_copy() {
        let (store, channel, conversation) = setup().await;
        channel.open(conversation).await;

        let sent_to = channel.send("hello", &uid("BBBB2222")).await.unwrap();
        assert_eq!(sent_to, Some(conversation));

        // Let the live watch deliver the same row.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let messages = channel.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].status, MessageStatus::Sent);
        assert!(messages[0].outgoing);

        let conv = store.conversation(conversation).await.unwrap().unwrap();
        assert_eq!(conv.last_message_preview.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn test_blank_text_is_ignored() {
        let (store, channel, conversation) = setup().await;
        channel.open(conversation).await;
        assert_eq!(channel.send("   \n", &uid("BBBB2222")).await.unwrap(), None);
        assert!(channel.messages().is_empty());
        assert!(store.messages(conversation).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_live_insert_from_counterpart_is_merged() {
        let (store, channel, conversation) = setup().await;
        channel.open(conversation).await;

        let row = store
            .insert_message(conversation, &uid("BBBB2222"), "ping")
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let messages = channel.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id(), Some(row.id));
        assert!(!messages[0].outgoing);
    }

    #[tokio::test]
    async fn test_rebinding_drops_old_conversation_events() {
        let (store, channel, first) = setup().await;
        store
            .register_profile(&Profile {
                id: uid("CCCC3333"),
                name: None,
                display_name: None,
                created_at: rows::now(),
            })
            .await
            .unwrap();
        let second = store
            .insert_conversation(&uid("AAAA1111"), &uid("CCCC3333"))
            .await
            .unwrap()
            .id;

        channel.open(first).await;
        channel.open(second).await;
        store
            .insert_message(first, &uid("BBBB2222"), "old")
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        assert_eq!(channel.conversation_id(), Some(second));
        assert!(channel.messages().is_empty());
    }

    #[tokio::test]
    async fn test_delivery_receipts() {
        let (store, channel, conversation) = setup().await;
        let row = store
            .insert_message(conversation, &uid("AAAA1111"), "receipt me")
            .await
            .unwrap();
        channel.open(conversation).await;

        assert!(channel.mark_delivered(row.id));
        assert!(channel.mark_read(row.id));
        assert!(!channel.mark_delivered(row.id));
        assert_eq!(channel.messages()[0].status, MessageStatus::Read);
        assert!(!channel.mark_read(Uuid::new_v4()));
    }
}
