//! Roster: the local user's contacts merged with every conversation they
//! take part in.
//!
//! Composition is a pure function over one fetch of raw inputs
//! ([`RosterSource`]) and the current unread counts, so unread changes are
//! reapplied to the cached source without going back to the store.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use relay_shared::{ConversationId, UserId};
use relay_store::{rows, Contact, Conversation, Profile, Store, StoreError};

use crate::error::{Result, ValidationError};
use crate::events::{EventSink, UiEvent};
use crate::resolver::ConversationResolver;
use crate::tracker::UnreadCounts;

/// One row of the roster, keyed by the counterpart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    pub counterpart_id: UserId,
    pub display_name: String,
    pub conversation_id: Option<ConversationId>,
    pub last_message_preview: Option<String>,
    pub last_activity_at: Option<DateTime<Utc>>,
    /// Presence is not tracked; always `None`.
    pub online: Option<bool>,
    pub unread_count: u32,
    pub has_new_message: bool,
    /// Backed by a contact row (as opposed to a conversation-only entry).
    pub is_contact: bool,
}

/// Raw inputs of one roster fetch.
#[derive(Debug, Clone, Default)]
pub struct RosterSource {
    pub contacts: Vec<Contact>,
    pub conversations: Vec<Conversation>,
    pub profiles: HashMap<UserId, Profile>,
}

/// Build the roster for `local`.
///
/// Name precedence: the counterpart's own profile name, then the name the
/// local user gave the contact, then "User XXXX".  If several conversations
/// exist for one counterpart, the most recently active one is used.
pub fn compose(local: &UserId, source: &RosterSource, unread: &UnreadCounts) -> Vec<RosterEntry> {
    let mut latest: HashMap<&UserId, &Conversation> = HashMap::new();
    for conversation in &source.conversations {
        let Some(counterpart) = conversation.counterpart_of(local) else {
            continue;
        };
        match latest.get(counterpart).map(|c| (c.id, c.last_activity_at)) {
            Some((current_id, current_at)) => {
                warn!(
                    counterpart = %counterpart,
                    first = %current_id,
                    second = %conversation.id,
                    "duplicate conversations for one pair, keeping the most recent"
                );
                if conversation.last_activity_at > current_at {
                    latest.insert(counterpart, conversation);
                }
            }
            None => {
                latest.insert(counterpart, conversation);
            }
        }
    }

    let contact_names: HashMap<&UserId, &str> = source
        .contacts
        .iter()
        .map(|c| (&c.contact_id, c.contact_name.as_str()))
        .collect();

    let entry_for = |counterpart: &UserId, is_contact: bool| -> RosterEntry {
        let conversation = latest.get(counterpart);
        let unread_count = unread.get(counterpart).copied().unwrap_or(0);
        RosterEntry {
            counterpart_id: counterpart.clone(),
            display_name: resolve_name(
                counterpart,
                source.profiles.get(counterpart),
                contact_names.get(counterpart).copied(),
            ),
            conversation_id: conversation.map(|c| c.id),
            last_message_preview: conversation.and_then(|c| c.last_message_preview.clone()),
            last_activity_at: conversation.map(|c| c.last_activity_at),
            online: None,
            unread_count,
            has_new_message: unread_count > 0,
            is_contact,
        }
    };

    let mut by_counterpart: HashMap<UserId, RosterEntry> = HashMap::new();
    let contacts = source
        .contacts
        .iter()
        .filter(|c| &c.owner_id == local && &c.contact_id != local)
        .map(|c| entry_for(&c.contact_id, true));
    let virtual_entries = latest.keys().map(|counterpart| entry_for(*counterpart, false));

    for entry in contacts.chain(virtual_entries) {
        match by_counterpart.remove(&entry.counterpart_id) {
            Some(existing) => {
                let merged = merge_entries(existing, entry);
                by_counterpart.insert(merged.counterpart_id.clone(), merged);
            }
            None => {
                by_counterpart.insert(entry.counterpart_id.clone(), entry);
            }
        }
    }

    let mut entries: Vec<RosterEntry> = by_counterpart.into_values().collect();
    entries.sort_by(by_activity);
    entries
}

fn resolve_name(counterpart: &UserId, profile: Option<&Profile>, contact_name: Option<&str>) -> String {
    profile
        .and_then(Profile::preferred_name)
        .or_else(|| contact_name.map(str::trim).filter(|n| !n.is_empty()))
        .map(str::to_string)
        .unwrap_or_else(|| counterpart.fallback_name())
}

/// Two entries for one counterpart: keep the one bound to a conversation,
/// then the more recent one.
fn merge_entries(a: RosterEntry, b: RosterEntry) -> RosterEntry {
    let is_contact = a.is_contact || b.is_contact;
    let a_rank = (a.conversation_id.is_some(), a.last_activity_at);
    let b_rank = (b.conversation_id.is_some(), b.last_activity_at);
    let mut kept = if b_rank > a_rank { b } else { a };
    kept.is_contact = is_contact;
    kept
}

/// Most recent activity first; entries without activity last, by name.
fn by_activity(a: &RosterEntry, b: &RosterEntry) -> Ordering {
    match (a.last_activity_at, b.last_activity_at) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| a.display_name.cmp(&b.display_name))
    .then_with(|| a.counterpart_id.cmp(&b.counterpart_id))
}

#[derive(Default)]
struct RosterState {
    source: Option<RosterSource>,
    entries: Vec<RosterEntry>,
}

pub struct RosterAggregator {
    local: UserId,
    store: Arc<dyn Store>,
    resolver: ConversationResolver,
    unread: watch::Receiver<UnreadCounts>,
    events: EventSink,
    search_limit: usize,
    state: Mutex<RosterState>,
}

impl RosterAggregator {
    pub fn new(
        local: UserId,
        store: Arc<dyn Store>,
        resolver: ConversationResolver,
        unread: watch::Receiver<UnreadCounts>,
        events: EventSink,
        search_limit: usize,
    ) -> Self {
        Self {
            local,
            store,
            resolver,
            unread,
            events,
            search_limit,
            state: Mutex::new(RosterState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RosterState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Last composed roster, without touching the store.
    pub fn entries(&self) -> Vec<RosterEntry> {
        self.lock().entries.clone()
    }

    /// Fetch contacts, conversations and counterpart profiles and compose
    /// the roster.  If the fetch fails the previous roster is kept.
    pub async fn list(&self) -> Vec<RosterEntry> {
        match self.fetch().await {
            Ok(source) => {
                let entries = {
                    let unread = self.unread.borrow().clone();
                    let entries = compose(&self.local, &source, &unread);
                    let mut state = self.lock();
                    state.source = Some(source);
                    state.entries = entries.clone();
                    entries
                };
                debug!(count = entries.len(), "roster refreshed");
                self.events.emit(UiEvent::RosterChanged {
                    entries: entries.clone(),
                });
                entries
            }
            Err(e) => {
                warn!(error = %e, "roster fetch failed, keeping previous roster");
                self.entries()
            }
        }
    }

    /// Re-apply the current unread counts to the cached inputs.
    pub fn recompose(&self) -> Vec<RosterEntry> {
        let unread = self.unread.borrow().clone();
        let entries = {
            let mut state = self.lock();
            let Some(source) = state.source.as_ref() else {
                return Vec::new();
            };
            let entries = compose(&self.local, source, &unread);
            state.entries = entries.clone();
            entries
        };
        self.events.emit(UiEvent::RosterChanged {
            entries: entries.clone(),
        });
        entries
    }

    async fn fetch(&self) -> std::result::Result<RosterSource, StoreError> {
        let contacts = self.store.contacts(&self.local).await?;
        let conversations = self.store.conversations_for(&self.local).await?;

        let mut profiles = HashMap::new();
        let counterparts = contacts
            .iter()
            .map(|c| &c.contact_id)
            .chain(conversations.iter().filter_map(|c| c.counterpart_of(&self.local)));
        for id in counterparts {
            if profiles.contains_key(id) {
                continue;
            }
            match self.store.profile(id).await {
                Ok(Some(profile)) => {
                    profiles.insert(id.clone(), profile);
                }
                Ok(None) => {}
                // A missing name degrades to the contact name or fallback.
                Err(e) => debug!(counterpart = %id, error = %e, "profile lookup failed"),
            }
        }

        Ok(RosterSource {
            contacts,
            conversations,
            profiles,
        })
    }

    /// Add `counterpart` to the local user's contacts under `display_name`
    /// and make sure a conversation exists for the pair.
    pub async fn add_contact(&self, counterpart: &UserId, display_name: &str) -> Result<Contact> {
        if counterpart == &self.local {
            return Err(ValidationError::SelfContact.into());
        }
        let Some(profile) = self.store.profile(counterpart).await? else {
            return Err(ValidationError::UnknownUser(counterpart.clone()).into());
        };
        if self.store.contact(&self.local, counterpart).await?.is_some() {
            return Err(ValidationError::DuplicateContact(counterpart.clone()).into());
        }

        let typed = display_name.trim();
        let contact_name = if typed.is_empty() {
            profile
                .preferred_name()
                .map(str::to_string)
                .unwrap_or_else(|| counterpart.fallback_name())
        } else {
            typed.to_string()
        };
        let contact = Contact {
            owner_id: self.local.clone(),
            contact_id: counterpart.clone(),
            contact_name,
            created_at: rows::now(),
        };
        match self.store.insert_contact(&contact).await {
            Ok(()) => {}
            Err(e) if e.is_conflict() => {
                return Err(ValidationError::DuplicateContact(counterpart.clone()).into());
            }
            Err(e) => return Err(e.into()),
        }
        info!(contact = %counterpart, "contact added");

        if let Err(e) = self.resolver.resolve(&self.local, counterpart).await {
            warn!(contact = %counterpart, error = %e, "could not create conversation for new contact");
        }

        self.list().await;
        Ok(contact)
    }

    /// Remove the contact row.  The conversation and its messages stay, so
    /// the counterpart may reappear as a conversation-only entry.
    pub async fn delete_contact(&self, counterpart: &UserId) -> Result<bool> {
        let removed = self.store.delete_contact(&self.local, counterpart).await?;
        if removed {
            info!(contact = %counterpart, "contact deleted");
        }
        self.list().await;
        Ok(removed)
    }

    /// Registered users whose id starts with `prefix` (case-insensitive),
    /// excluding the local user.  Only meant to assist contact entry.
    pub async fn search_by_id_prefix(&self, prefix: &str) -> Result<Vec<Profile>> {
        let prefix = prefix.trim().to_ascii_uppercase();
        if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Ok(Vec::new());
        }

        let mut found = self
            .store
            .search_profiles(&prefix, self.search_limit + 1)
            .await?;
        found.retain(|p| p.id != self.local);
        found.truncate(self.search_limit);
        Ok(found)
    }
}
