//! A logged-in user's runtime: one store connection, one unread tracker, one
//! roster and the message channel for whatever conversation is open.
//!
//! Everything is created by [`Session::login`] and torn down by
//! [`Session::logout`] (or on drop).

use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use relay_shared::{ConversationId, UserId};
use relay_store::{ColumnFilter, Profile, Store, Table, WatchFilter};

use crate::channel::{ChannelMessage, MessageChannel};
use crate::config::ClientConfig;
use crate::error::{Result, ValidationError};
use crate::events::EventSink;
use crate::identity::{ensure_registered, IdentityProvider};
use crate::notify::Notifier;
use crate::resolver::ConversationResolver;
use crate::roster::{RosterAggregator, RosterEntry};
use crate::tracker::{UnreadCounts, UnreadTracker};

pub struct Session {
    local: UserId,
    identity: Arc<dyn IdentityProvider>,
    store: Arc<dyn Store>,
    resolver: ConversationResolver,
    tracker: Arc<UnreadTracker>,
    roster: Arc<RosterAggregator>,
    channel: MessageChannel,
    open_counterpart: Mutex<Option<UserId>>,
    pumps: Mutex<Vec<JoinHandle<()>>>,
}

impl Session {
    /// Register the local profile if needed, start the unread tracker and
    /// build the first roster.
    pub async fn login(
        config: &ClientConfig,
        identity: Arc<dyn IdentityProvider>,
        store: Arc<dyn Store>,
        notifier: Arc<dyn Notifier>,
        events: EventSink,
    ) -> Result<Self> {
        ensure_registered(store.as_ref(), identity.as_ref()).await?;
        let local = identity.current_user_id();

        let resolver = ConversationResolver::new(store.clone());
        let tracker = UnreadTracker::new(
            local.clone(),
            store.clone(),
            notifier,
            events.clone(),
            config.notifications_enabled,
        );
        let roster = Arc::new(RosterAggregator::new(
            local.clone(),
            store.clone(),
            resolver.clone(),
            tracker.subscribe(),
            events.clone(),
            config.search_limit,
        ));
        let channel = MessageChannel::new(local.clone(), store.clone(), resolver.clone(), events);

        let session = Self {
            local,
            identity,
            store,
            resolver,
            tracker,
            roster,
            channel,
            open_counterpart: Mutex::new(None),
            pumps: Mutex::new(Vec::new()),
        };

        session.tracker.start();
        session.start_pumps();
        session.roster.list().await;
        info!(user = %session.local, "logged in");
        Ok(session)
    }

    /// Keep the roster current: unread changes are re-applied to the cached
    /// inputs, conversation changes trigger a refetch.
    fn start_pumps(&self) {
        let mut unread = self.tracker.subscribe();
        let roster = Arc::clone(&self.roster);
        let unread_pump = tokio::spawn(async move {
            while unread.changed().await.is_ok() {
                roster.recompose();
            }
        });

        let mut conversations = self.store.watch(
            WatchFilter::all(Table::Conversations)
                .with_column(ColumnFilter::Participant(self.local.clone())),
        );
        let roster = Arc::clone(&self.roster);
        let conversation_pump = tokio::spawn(async move {
            while conversations.next().await.is_some() {
                roster.list().await;
            }
        });

        self.pumps
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .extend([unread_pump, conversation_pump]);
    }

    pub fn user_id(&self) -> &UserId {
        &self.local
    }

    pub fn display_name(&self) -> String {
        self.identity.display_name()
    }

    /// Change the local display name and publish it on the profile row.
    pub async fn set_display_name(&self, name: &str) -> Result<Profile> {
        let name = self.identity.set_display_name(name)?;
        let profile = self.store.set_display_name(&self.local, &name).await?;
        info!(user = %self.local, "display name updated");
        Ok(profile)
    }

    pub fn roster(&self) -> Vec<RosterEntry> {
        self.roster.entries()
    }

    pub async fn refresh_roster(&self) -> Vec<RosterEntry> {
        self.roster.list().await
    }

    /// Add a contact from user input (id in any case, optional name).
    pub async fn add_contact(&self, id_input: &str, name: &str) -> Result<()> {
        let counterpart = UserId::parse(id_input).map_err(ValidationError::from)?;
        self.roster.add_contact(&counterpart, name).await?;
        Ok(())
    }

    /// Remove a contact; closes its conversation if it is the open one.
    pub async fn delete_contact(&self, counterpart: &UserId) -> Result<bool> {
        let removed = self.roster.delete_contact(counterpart).await?;
        if removed && self.open_counterpart().as_ref() == Some(counterpart) {
            self.close_conversation();
        }
        Ok(removed)
    }

    pub async fn search(&self, prefix: &str) -> Result<Vec<Profile>> {
        self.roster.search_by_id_prefix(prefix).await
    }

    pub fn open_counterpart(&self) -> Option<UserId> {
        self.open_counterpart
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Show the conversation with `counterpart`.
    ///
    /// Clears that counterpart's unread count.  If no conversation exists yet
    /// nothing is created: the first send does that.
    ///
    /// The count is cleared only after the open flag is set, so a message
    /// arriving during the lookup is not left behind as unread.
    pub async fn open_conversation(&self, counterpart: &UserId) -> Result<Option<ConversationId>> {
        if counterpart == &self.local {
            return Err(ValidationError::SameParticipants.into());
        }

        *self.open_counterpart.lock().unwrap_or_else(|p| p.into_inner()) =
            Some(counterpart.clone());

        let lookup = self.store.find_conversation(&self.local, counterpart).await;
        let open = match &lookup {
            Ok(Some(conversation)) => Some(conversation.id),
            _ => None,
        };
        self.tracker.set_open_conversation(open);
        self.tracker.mark_read(counterpart);

        match lookup {
            Ok(Some(conversation)) => {
                self.channel.open(conversation.id).await;
                debug!(conversation = %conversation.id, counterpart = %counterpart, "conversation opened");
                Ok(Some(conversation.id))
            }
            Ok(None) => {
                self.channel.close();
                Ok(None)
            }
            Err(e) => {
                warn!(counterpart = %counterpart, error = %e, "conversation lookup failed");
                self.channel.close();
                Err(e.into())
            }
        }
    }

    pub fn close_conversation(&self) {
        self.channel.close();
        self.tracker.set_open_conversation(None);
        *self.open_counterpart.lock().unwrap_or_else(|p| p.into_inner()) = None;
    }

    /// Send `text` to the open counterpart.
    pub async fn send(&self, text: &str) -> Result<Option<ConversationId>> {
        let counterpart = self
            .open_counterpart()
            .ok_or(ValidationError::NoOpenConversation)?;
        let sent_to = self.channel.send(text, &counterpart).await?;
        if let Some(conversation) = sent_to {
            self.tracker.set_open_conversation(Some(conversation));
        }
        Ok(sent_to)
    }

    pub fn messages(&self) -> Vec<ChannelMessage> {
        self.channel.messages()
    }

    pub fn channel(&self) -> &MessageChannel {
        &self.channel
    }

    pub fn unread_counts(&self) -> UnreadCounts {
        self.tracker.counts()
    }

    pub fn mark_read(&self, counterpart: &UserId) {
        self.tracker.mark_read(counterpart);
    }

    /// Conversation id for the pair, creating it if needed.
    pub async fn resolve(&self, counterpart: &UserId) -> Result<ConversationId> {
        self.resolver.resolve(&self.local, counterpart).await
    }

    /// Stop every watch owned by this session.
    pub fn logout(&self) {
        self.channel.close();
        self.tracker.stop();
        for pump in self.pumps.lock().unwrap_or_else(|p| p.into_inner()).drain(..) {
            pump.abort();
        }
        info!(user = %self.local, "logged out");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        for pump in self.pumps.lock().unwrap_or_else(|p| p.into_inner()).drain(..) {
            pump.abort();
        }
        self.tracker.stop();
    }
}
