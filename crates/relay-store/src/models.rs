//! Domain model structs persisted in the backing store.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be handed
//! directly to the UI layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use relay_shared::{ConversationId, UserId};

// ---------------------------------------------------------------------------
// Profile
// ---------------------------------------------------------------------------

/// A registered user.  The primary key is the shareable 8-character id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: UserId,
    /// Legacy / account name.
    pub name: Option<String>,
    /// Name the user chose for themselves; wins over every other name.
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Profile {
    /// Best self-chosen name: display name first, then the account name.
    /// Blank values are skipped.
    pub fn preferred_name(&self) -> Option<&str> {
        [self.display_name.as_deref(), self.name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|n| !n.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Contact
// ---------------------------------------------------------------------------

/// A directed contact relation.  Adding A -> B says nothing about B -> A.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub owner_id: UserId,
    pub contact_id: UserId,
    /// Name the owner gave this contact.
    pub contact_name: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Conversation
// ---------------------------------------------------------------------------

/// A two-party conversation.  The participant pair is unordered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: ConversationId,
    pub participant_a: UserId,
    pub participant_b: UserId,
    pub last_message_preview: Option<String>,
    /// Set at creation, bumped on every successful send.
    pub last_activity_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn involves(&self, user: &UserId) -> bool {
        &self.participant_a == user || &self.participant_b == user
    }

    /// The participant that is not `user`, if `user` takes part at all.
    pub fn counterpart_of(&self, user: &UserId) -> Option<&UserId> {
        if &self.participant_a == user {
            Some(&self.participant_b)
        } else if &self.participant_b == user {
            Some(&self.participant_a)
        } else {
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A persisted chat message.  Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Store-assigned identifier.
    pub id: Uuid,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub content: String,
    /// Store-assigned creation time; the ordering key within a conversation.
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uid(s: &str) -> UserId {
        UserId::parse(s).unwrap()
    }

    #[test]
    fn test_preferred_name_order() {
        let mut profile = Profile {
            id: uid("AAAA1111"),
            name: Some("alice".into()),
            display_name: Some("  ".into()),
            created_at: Utc::now(),
        };
        assert_eq!(profile.preferred_name(), Some("alice"));

        profile.display_name = Some("Alice A.".into());
        assert_eq!(profile.preferred_name(), Some("Alice A."));

        profile.display_name = None;
        profile.name = None;
        assert_eq!(profile.preferred_name(), None);
    }

    #[test]
    fn test_counterpart_of() {
        let conv = Conversation {
            id: ConversationId::new(),
            participant_a: uid("AAAA1111"),
            participant_b: uid("BBBB2222"),
            last_message_preview: None,
            last_activity_at: Utc::now(),
            created_at: Utc::now(),
        };
        assert_eq!(conv.counterpart_of(&uid("AAAA1111")), Some(&uid("BBBB2222")));
        assert_eq!(conv.counterpart_of(&uid("BBBB2222")), Some(&uid("AAAA1111")));
        assert_eq!(conv.counterpart_of(&uid("CCCC3333")), None);
        assert!(!conv.involves(&uid("CCCC3333")));
    }
}
