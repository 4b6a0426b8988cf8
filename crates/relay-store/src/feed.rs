//! Row-level change feed.
//!
//! Every successful write on a [`Store`](crate::Store) is published as a
//! [`ChangeEvent`] on a tokio broadcast channel.  Consumers register a
//! [`WatchFilter`] (table, optional change kind, optional column predicate)
//! and pull matching events from a [`Subscription`].
//!
//! Delivery is at-least-once from the consumer's point of view: the same row
//! may be observed through both a write acknowledgement and the feed, so
//! consumers merge idempotently by id.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{trace, warn};

use relay_shared::{ConversationId, UserId};

use crate::models::{Contact, Conversation, Message, Profile};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Table {
    Profiles,
    Contacts,
    Conversations,
    Messages,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// The row carried by a change event (the new row, or the removed row for
/// deletes).
#[derive(Debug, Clone, Serialize)]
pub enum Record {
    Profile(Profile),
    Contact(Contact),
    Conversation(Conversation),
    Message(Message),
}

impl Record {
    pub fn table(&self) -> Table {
        match self {
            Record::Profile(_) => Table::Profiles,
            Record::Contact(_) => Table::Contacts,
            Record::Conversation(_) => Table::Conversations,
            Record::Message(_) => Table::Messages,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub record: Record,
}

impl ChangeEvent {
    pub fn insert(record: Record) -> Self {
        Self {
            kind: ChangeKind::Insert,
            record,
        }
    }

    pub fn update(record: Record) -> Self {
        Self {
            kind: ChangeKind::Update,
            record,
        }
    }

    pub fn delete(record: Record) -> Self {
        Self {
            kind: ChangeKind::Delete,
            record,
        }
    }
}

/// Column predicate narrowing a watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnFilter {
    /// `conversation_id = X` on messages, `id = X` on conversations.
    ConversationId(ConversationId),
    /// Rows involving a user: conversation participant, contact owner, or
    /// the profile itself.
    Participant(UserId),
}

/// What a subscription wants to see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchFilter {
    pub table: Table,
    pub kind: Option<ChangeKind>,
    pub column: Option<ColumnFilter>,
}

impl WatchFilter {
    /// Every change on `table`.
    pub fn all(table: Table) -> Self {
        Self {
            table,
            kind: None,
            column: None,
        }
    }

    /// Inserts on `table`.
    pub fn inserts(table: Table) -> Self {
        Self {
            table,
            kind: Some(ChangeKind::Insert),
            column: None,
        }
    }

    pub fn with_column(mut self, column: ColumnFilter) -> Self {
        self.column = Some(column);
        self
    }

    pub fn matches(&self, event: &ChangeEvent) -> bool {
        if event.record.table() != self.table {
            return false;
        }
        if let Some(kind) = self.kind {
            if event.kind != kind {
                return false;
            }
        }
        match &self.column {
            None => true,
            Some(ColumnFilter::ConversationId(id)) => match &event.record {
                Record::Message(m) => &m.conversation_id == id,
                Record::Conversation(c) => &c.id == id,
                _ => false,
            },
            Some(ColumnFilter::Participant(user)) => match &event.record {
                Record::Conversation(c) => c.involves(user),
                Record::Contact(c) => &c.owner_id == user,
                Record::Profile(p) => &p.id == user,
                Record::Message(m) => &m.sender_id == user,
            },
        }
    }
}

/// Publishing half of the feed, owned by a store implementation.
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<ChangeEvent>,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, event: ChangeEvent) {
        // No receivers is fine: nobody is watching yet.
        match self.tx.send(event) {
            Ok(receivers) => trace!(receivers, "change event published"),
            Err(_) => trace!("change event dropped, no subscribers"),
        }
    }

    pub fn subscribe(&self, filter: WatchFilter) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
            filter,
        }
    }
}

/// A standing registration for future change events.
///
/// Only events published after the subscription was created are delivered.
#[derive(Debug)]
pub struct Subscription {
    rx: broadcast::Receiver<ChangeEvent>,
    filter: WatchFilter,
}

impl Subscription {
    pub fn filter(&self) -> &WatchFilter {
        &self.filter
    }

    /// Wait for the next matching event.  Returns `None` once the feed is
    /// closed (the store was dropped).
    pub async fn next(&mut self) -> Option<ChangeEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, table = ?self.filter.table, "subscriber lagged, events skipped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
