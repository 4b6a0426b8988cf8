//! [`Store`] implementation over the local SQLite [`Database`].
//!
//! Writes are committed first and then published on the change feed, so a
//! watcher never sees a row that a subsequent read cannot find.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use relay_shared::constants::DEFAULT_FEED_CAPACITY;
use relay_shared::{ConversationId, UserId};

use crate::database::Database;
use crate::error::{optional, Result, StoreError};
use crate::feed::{ChangeEvent, ChangeFeed, Record, Subscription, WatchFilter};
use crate::models::{Contact, Conversation, Message, Profile};
use crate::rows;
use crate::store::Store;

pub struct SqliteStore {
    db: Mutex<Database>,
    feed: ChangeFeed,
}

impl SqliteStore {
    pub fn new(db: Database, feed_capacity: usize) -> Self {
        Self {
            db: Mutex::new(db),
            feed: ChangeFeed::new(feed_capacity),
        }
    }

    pub fn open_at(path: &Path, feed_capacity: usize) -> Result<Self> {
        Ok(Self::new(Database::open_at(path)?, feed_capacity))
    }

    pub fn in_memory() -> Result<Self> {
        Ok(Self::new(Database::open_in_memory()?, DEFAULT_FEED_CAPACITY))
    }

    fn with_db<T>(&self, f: impl FnOnce(&Database) -> Result<T>) -> Result<T> {
        let guard = self
            .db
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {e}")))?;
        f(&guard)
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn profile(&self, id: &UserId) -> Result<Option<Profile>> {
        self.with_db(|db| optional(db.get_profile(id)))
    }

    async fn register_profile(&self, profile: &Profile) -> Result<()> {
        self.with_db(|db| db.insert_profile(profile))?;
        debug!(user = %profile.id, "profile registered");
        self.feed
            .publish(ChangeEvent::insert(Record::Profile(profile.clone())));
        Ok(())
    }

    async fn set_display_name(&self, id: &UserId, display_name: &str) -> Result<Profile> {
        let updated = self.with_db(|db| db.set_profile_display_name(id, display_name))?;
        self.feed
            .publish(ChangeEvent::update(Record::Profile(updated.clone())));
        Ok(updated)
    }

    async fn search_profiles(&self, prefix: &str, limit: usize) -> Result<Vec<Profile>> {
        self.with_db(|db| db.search_profiles_by_id_prefix(prefix, limit))
    }

    async fn contacts(&self, owner: &UserId) -> Result<Vec<Contact>> {
        self.with_db(|db| db.list_contacts(owner))
    }

    async fn contact(&self, owner: &UserId, contact: &UserId) -> Result<Option<Contact>> {
        self.with_db(|db| optional(db.get_contact(owner, contact)))
    }

    async fn insert_contact(&self, contact: &Contact) -> Result<()> {
        self.with_db(|db| db.insert_contact(contact))?;
        self.feed
            .publish(ChangeEvent::insert(Record::Contact(contact.clone())));
        Ok(())
    }

    async fn delete_contact(&self, owner: &UserId, contact: &UserId) -> Result<bool> {
        match self.with_db(|db| db.delete_contact(owner, contact))? {
            Some(removed) => {
                self.feed.publish(ChangeEvent::delete(Record::Contact(removed)));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn conversation(&self, id: ConversationId) -> Result<Option<Conversation>> {
        self.with_db(|db| optional(db.get_conversation(id)))
    }

    async fn find_conversation(&self, a: &UserId, b: &UserId) -> Result<Option<Conversation>> {
        self.with_db(|db| optional(db.find_conversation_between(a, b)))
    }

    async fn insert_conversation(&self, a: &UserId, b: &UserId) -> Result<Conversation> {
        let now = rows::now();
        let conversation = Conversation {
            id: ConversationId::new(),
            participant_a: a.clone(),
            participant_b: b.clone(),
            last_message_preview: None,
            last_activity_at: now,
            created_at: now,
        };
        self.with_db(|db| db.create_conversation(&conversation))?;
        debug!(conversation = %conversation.id, a = %a, b = %b, "conversation created");
        self.feed
            .publish(ChangeEvent::insert(Record::Conversation(conversation.clone())));
        Ok(conversation)
    }

    async fn conversations_for(&self, user: &UserId) -> Result<Vec<Conversation>> {
        self.with_db(|db| db.list_conversations_for(user))
    }

    async fn touch_conversation(
        &self,
        id: ConversationId,
        preview: &str,
        at: DateTime<Utc>,
    ) -> Result<Conversation> {
        let updated = self.with_db(|db| db.touch_conversation(id, preview, at))?;
        self.feed
            .publish(ChangeEvent::update(Record::Conversation(updated.clone())));
        Ok(updated)
    }

    async fn messages(&self, conversation: ConversationId) -> Result<Vec<Message>> {
        self.with_db(|db| db.get_messages_for_conversation(conversation))
    }

    async fn insert_message(
        &self,
        conversation: ConversationId,
        sender: &UserId,
        content: &str,
    ) -> Result<Message> {
        let message = Message {
            id: Uuid::new_v4(),
            conversation_id: conversation,
            sender_id: sender.clone(),
            content: content.to_string(),
            created_at: rows::now(),
        };
        self.with_db(|db| db.insert_message(&message))?;
        debug!(msg_id = %message.id, conversation = %conversation, "message stored");
        self.feed
            .publish(ChangeEvent::insert(Record::Message(message.clone())));
        Ok(message)
    }

    fn watch(&self, filter: WatchFilter) -> Subscription {
        self.feed.subscribe(filter)
    }
}
