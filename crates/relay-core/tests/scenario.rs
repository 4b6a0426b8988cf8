//! Two users sharing one store, driven through the public session API.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use relay_core::{
    ClientConfig, ConversationResolver, CoreError, EventSink, LocalIdentity, LogNotifier,
    MessageStatus, Session, UiEvent, ValidationError,
};
use relay_shared::{ConversationId, UserId};
use relay_store::{
    Contact, Conversation, Message, Profile, Result as StoreResult, SqliteStore, Store,
    StoreError, Subscription, WatchFilter,
};

fn uid(s: &str) -> UserId {
    UserId::parse(s).unwrap()
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

/// Message written by another participant while a conversation lookup is in
/// flight.
struct ArrivingMessage {
    conversation: ConversationId,
    sender: UserId,
    content: String,
}

/// Delegates to SQLite, with switches to fail message writes, to make the
/// next N conversation lookups miss, or to land a message mid-lookup.
struct FaultyStore {
    inner: SqliteStore,
    fail_message_inserts: AtomicBool,
    hidden_lookups: AtomicUsize,
    arrive_during_lookup: Mutex<Option<ArrivingMessage>>,
}

impl FaultyStore {
    fn new() -> Self {
        Self {
            inner: SqliteStore::in_memory().unwrap(),
            fail_message_inserts: AtomicBool::new(false),
            hidden_lookups: AtomicUsize::new(0),
            arrive_during_lookup: Mutex::new(None),
        }
    }
}

#[async_trait]
impl Store for FaultyStore {
    async fn profile(&self, id: &UserId) -> StoreResult<Option<Profile>> {
        self.inner.profile(id).await
    }

    async fn register_profile(&self, profile: &Profile) -> StoreResult<()> {
        self.inner.register_profile(profile).await
    }

    async fn set_display_name(&self, id: &UserId, display_name: &str) -> StoreResult<Profile> {
        self.inner.set_display_name(id, display_name).await
    }

    async fn search_profiles(&self, prefix: &str, limit: usize) -> StoreResult<Vec<Profile>> {
        self.inner.search_profiles(prefix, limit).await
    }

    async fn contacts(&self, owner: &UserId) -> StoreResult<Vec<Contact>> {
        self.inner.contacts(owner).await
    }

    async fn contact(&self, owner: &UserId, contact: &UserId) -> StoreResult<Option<Contact>> {
        self.inner.contact(owner, contact).await
    }

    async fn insert_contact(&self, contact: &Contact) -> StoreResult<()> {
        self.inner.insert_contact(contact).await
    }

    async fn delete_contact(&self, owner: &UserId, contact: &UserId) -> StoreResult<bool> {
        self.inner.delete_contact(owner, contact).await
    }

    async fn conversation(&self, id: ConversationId) -> StoreResult<Option<Conversation>> {
        self.inner.conversation(id).await
    }

    async fn find_conversation(&self, a: &UserId, b: &UserId) -> StoreResult<Option<Conversation>> {
        let hide = self
            .hidden_lookups
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if hide {
            return Ok(None);
        }
        let arriving = self.arrive_during_lookup.lock().unwrap().take();
        if let Some(m) = arriving {
            self.inner
                .insert_message(m.conversation, &m.sender, &m.content)
                .await?;
            // Give the unread watch a chance to see it before we answer.
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        self.inner.find_conversation(a, b).await
    }

    async fn insert_conversation(&self, a: &UserId, b: &UserId) -> StoreResult<Conversation> {
        self.inner.insert_conversation(a, b).await
    }

    async fn conversations_for(&self, user: &UserId) -> StoreResult<Vec<Conversation>> {
        self.inner.conversations_for(user).await
    }

    async fn touch_conversation(
        &self,
        id: ConversationId,
        preview: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Conversation> {
        self.inner.touch_conversation(id, preview, at).await
    }

    async fn messages(&self, conversation: ConversationId) -> StoreResult<Vec<Message>> {
        self.inner.messages(conversation).await
    }

    async fn insert_message(
        &self,
        conversation: ConversationId,
        sender: &UserId,
        content: &str,
    ) -> StoreResult<Message> {
        if self.fail_message_inserts.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("network unreachable".into()));
        }
        self.inner.insert_message(conversation, sender, content).await
    }

    fn watch(&self, filter: WatchFilter) -> Subscription {
        self.inner.watch(filter)
    }
}

async fn login_with(store: Arc<dyn Store>, id: &str, events: EventSink) -> Session {
    Session::login(
        &ClientConfig::default(),
        Arc::new(LocalIdentity::in_memory(uid(id), None)),
        store,
        Arc::new(LogNotifier),
        events,
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn two_users_exchange_a_message() {
    let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());
    let bea = login_with(store.clone(), "BBBB2222", EventSink::disabled()).await;
    let ada = login_with(store.clone(), "AAAA1111", EventSink::disabled()).await;

    ada.add_contact("bbbb2222", "Bea").await.unwrap();
    let conversation = store
        .find_conversation(&uid("AAAA1111"), &uid("BBBB2222"))
        .await
        .unwrap()
        .expect("contact add creates the conversation");

    ada.open_conversation(&uid("BBBB2222")).await.unwrap();
    ada.send("hello").await.unwrap();
    settle().await;

    let roster = ada.roster();
    assert_eq!(roster.len(), 1);
    assert_eq!(roster[0].display_name, "Bea");
    assert_eq!(roster[0].last_message_preview.as_deref(), Some("hello"));
    assert_eq!(roster[0].conversation_id, Some(conversation.id));

    let roster = bea.roster();
    assert_eq!(roster.len(), 1);
    assert_eq!(roster[0].counterpart_id, uid("AAAA1111"));
    assert!(!roster[0].is_contact);
    assert_eq!(roster[0].display_name, "User 1111");
    assert_eq!(roster[0].unread_count, 1);
    assert!(roster[0].has_new_message);

    bea.mark_read(&uid("AAAA1111"));
    settle().await;
    let roster = bea.roster();
    assert_eq!(roster[0].unread_count, 0);
    assert!(!roster[0].has_new_message);

    bea.open_conversation(&uid("AAAA1111")).await.unwrap();
    let history = bea.messages();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].content, "hello");
    assert!(!history[0].outgoing);
}

#[tokio::test]
async fn open_conversation_suppresses_unread() {
    let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());
    let bea = login_with(store.clone(), "BBBB2222", EventSink::disabled()).await;
    let ada = login_with(store.clone(), "AAAA1111", EventSink::disabled()).await;

    ada.add_contact("BBBB2222", "Bea").await.unwrap();
    bea.open_conversation(&uid("AAAA1111")).await.unwrap();

    ada.open_conversation(&uid("BBBB2222")).await.unwrap();
    ada.send("are you there?").await.unwrap();
    settle().await;

    assert!(bea.unread_counts().is_empty());
    let seen = bea.messages();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].content, "are you there?");
}

#[tokio::test]
async fn message_arriving_while_opening_is_not_unread() {
    let faulty = Arc::new(FaultyStore::new());
    let store: Arc<dyn Store> = faulty.clone();
    let bea = login_with(store.clone(), "BBBB2222", EventSink::disabled()).await;
    let ada = login_with(store.clone(), "AAAA1111", EventSink::disabled()).await;
    let conversation = ada.resolve(&uid("BBBB2222")).await.unwrap();

    *faulty.arrive_during_lookup.lock().unwrap() = Some(ArrivingMessage {
        conversation,
        sender: uid("AAAA1111"),
        content: "just in time".into(),
    });
    let opened = bea.open_conversation(&uid("AAAA1111")).await.unwrap();
    assert_eq!(opened, Some(conversation));
    settle().await;

    assert_eq!(bea.unread_counts().get(&uid("AAAA1111")).copied().unwrap_or(0), 0);
    let seen = bea.messages();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].content, "just in time");
}

#[tokio::test]
async fn failed_send_rolls_back() {
    let faulty = Arc::new(FaultyStore::new());
    let store: Arc<dyn Store> = faulty.clone();
    let _bea = login_with(store.clone(), "BBBB2222", EventSink::disabled()).await;
    let (events, mut rx) = EventSink::channel();
    let ada = login_with(store.clone(), "AAAA1111", events).await;

    ada.open_conversation(&uid("BBBB2222")).await.unwrap();
    ada.send("first").await.unwrap();
    settle().await;
    let before = ada.messages();

    faulty.fail_message_inserts.store(true, Ordering::SeqCst);
    let err = ada.send("second").await.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(ada.messages(), before);
    assert!(before.iter().all(|m| m.status == MessageStatus::Sent));

    let mut saw_failure = false;
    while let Ok(event) = rx.try_recv() {
        if let UiEvent::SendFailed { .. } = event {
            saw_failure = true;
        }
    }
    assert!(saw_failure);
}

#[tokio::test]
async fn resolver_recovers_from_lost_race() {
    let faulty = Arc::new(FaultyStore::new());
    let store: Arc<dyn Store> = faulty.clone();
    let _bea = login_with(store.clone(), "BBBB2222", EventSink::disabled()).await;
    let _ada = login_with(store.clone(), "AAAA1111", EventSink::disabled()).await;

    let resolver = ConversationResolver::new(store.clone());
    let existing = resolver
        .resolve(&uid("AAAA1111"), &uid("BBBB2222"))
        .await
        .unwrap();

    // The lookup misses once, so the insert runs and hits the pair index.
    faulty.hidden_lookups.store(1, Ordering::SeqCst);
    let again = resolver
        .resolve(&uid("BBBB2222"), &uid("AAAA1111"))
        .await
        .unwrap();
    assert_eq!(again, existing);
    assert_eq!(
        store.conversations_for(&uid("AAAA1111")).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn contact_validation() {
    let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());
    let _bea = login_with(store.clone(), "BBBB2222", EventSink::disabled()).await;
    let ada = login_with(store.clone(), "AAAA1111", EventSink::disabled()).await;

    let err = ada.add_contact("ZZZZ9999", "Ghost").await.unwrap_err();
    assert!(matches!(
        err,
        CoreError::Validation(ValidationError::UnknownUser(_))
    ));
    assert!(store.contacts(&uid("AAAA1111")).await.unwrap().is_empty());

    let err = ada.add_contact("AAAA1111", "Me").await.unwrap_err();
    assert!(matches!(err, CoreError::Validation(ValidationError::SelfContact)));

    ada.add_contact("BBBB2222", "Bea").await.unwrap();
    let err = ada.add_contact("bbbb2222", "Bea again").await.unwrap_err();
    assert!(matches!(
        err,
        CoreError::Validation(ValidationError::DuplicateContact(_))
    ));
    assert_eq!(store.contacts(&uid("AAAA1111")).await.unwrap().len(), 1);
}

#[tokio::test]
async fn deleted_contact_keeps_conversation() {
    let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());
    let _bea = login_with(store.clone(), "BBBB2222", EventSink::disabled()).await;
    let ada = login_with(store.clone(), "AAAA1111", EventSink::disabled()).await;

    ada.add_contact("BBBB2222", "Bea").await.unwrap();
    ada.open_conversation(&uid("BBBB2222")).await.unwrap();
    ada.send("keep me").await.unwrap();

    assert!(ada.delete_contact(&uid("BBBB2222")).await.unwrap());
    assert_eq!(ada.open_counterpart(), None);

    let roster = ada.refresh_roster().await;
    assert_eq!(roster.len(), 1);
    assert!(!roster[0].is_contact);
    assert_eq!(roster[0].display_name, "User 2222");
    assert_eq!(roster[0].last_message_preview.as_deref(), Some("keep me"));
}

#[tokio::test]
async fn search_excludes_self_and_caps_results() {
    let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());
    for id in ["AB000001", "AB000002", "AB000003", "AB000004", "AB000005", "AB000006"] {
        store
            .register_profile(&Profile {
                id: uid(id),
                name: None,
                display_name: None,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
    }
    let me = login_with(store.clone(), "AB000001", EventSink::disabled()).await;

    let found = me.search("ab").await.unwrap();
    assert_eq!(found.len(), 5);
    assert!(found.iter().all(|p| p.id != uid("AB000001")));

    assert!(me.search("").await.unwrap().is_empty());
    assert!(me.search("a%").await.unwrap().is_empty());
}
