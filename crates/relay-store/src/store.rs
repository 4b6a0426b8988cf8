//! The contract between the sync core and its backing store.
//!
//! The core only ever talks to `dyn Store`; the SQLite implementation in
//! [`crate::sqlite`] is one realisation of it.  Every call is a suspension
//! point: a remote store would do network I/O here.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use relay_shared::{ConversationId, UserId};

use crate::error::Result;
use crate::feed::{Subscription, WatchFilter};
use crate::models::{Contact, Conversation, Message, Profile};

#[async_trait]
pub trait Store: Send + Sync {
    // -- profiles ---------------------------------------------------------

    async fn profile(&self, id: &UserId) -> Result<Option<Profile>>;

    /// Insert a profile row; [`StoreError::Conflict`] if the id exists.
    ///
    /// [`StoreError::Conflict`]: crate::StoreError::Conflict
    async fn register_profile(&self, profile: &Profile) -> Result<()>;

    async fn set_display_name(&self, id: &UserId, display_name: &str) -> Result<Profile>;

    async fn search_profiles(&self, prefix: &str, limit: usize) -> Result<Vec<Profile>>;

    // -- contacts ---------------------------------------------------------

    async fn contacts(&self, owner: &UserId) -> Result<Vec<Contact>>;

    async fn contact(&self, owner: &UserId, contact: &UserId) -> Result<Option<Contact>>;

    async fn insert_contact(&self, contact: &Contact) -> Result<()>;

    /// Returns `true` if a row was removed.
    async fn delete_contact(&self, owner: &UserId, contact: &UserId) -> Result<bool>;

    // -- conversations ----------------------------------------------------

    async fn conversation(&self, id: ConversationId) -> Result<Option<Conversation>>;

    /// Conversation for the unordered pair `{a, b}`.
    async fn find_conversation(&self, a: &UserId, b: &UserId) -> Result<Option<Conversation>>;

    /// Create the conversation `{a, b}`; [`StoreError::Conflict`] if the pair
    /// already has one.
    ///
    /// [`StoreError::Conflict`]: crate::StoreError::Conflict
    async fn insert_conversation(&self, a: &UserId, b: &UserId) -> Result<Conversation>;

    /// Conversations involving `user`, most recently active first.
    async fn conversations_for(&self, user: &UserId) -> Result<Vec<Conversation>>;

    async fn touch_conversation(
        &self,
        id: ConversationId,
        preview: &str,
        at: DateTime<Utc>,
    ) -> Result<Conversation>;

    // -- messages ---------------------------------------------------------

    /// History of a conversation, oldest first.
    async fn messages(&self, conversation: ConversationId) -> Result<Vec<Message>>;

    /// Durable insert.  The store assigns id and creation time.
    async fn insert_message(
        &self,
        conversation: ConversationId,
        sender: &UserId,
        content: &str,
    ) -> Result<Message>;

    // -- change feed ------------------------------------------------------

    /// Register a standing watch.  Only changes committed after this call
    /// are delivered.
    fn watch(&self, filter: WatchFilter) -> Subscription;
}
