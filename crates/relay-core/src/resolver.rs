//! Find-or-create the single conversation for an unordered user pair.

use std::sync::Arc;

use tracing::{debug, info};

use relay_shared::constants::RESOLVE_MAX_ATTEMPTS;
use relay_shared::{ConversationId, UserId};
use relay_store::{Store, StoreError};

use crate::error::{Result, ValidationError};

/// Maps `{a, b}` to exactly one conversation id, no matter the argument order
/// or how many clients resolve the same pair at once.
///
/// The store rejects a second conversation for a pair with a conflict; the
/// loser of a creation race re-reads and returns the winner's row.
#[derive(Clone)]
pub struct ConversationResolver {
    store: Arc<dyn Store>,
}

impl ConversationResolver {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn resolve(&self, a: &UserId, b: &UserId) -> Result<ConversationId> {
        if a == b {
            return Err(ValidationError::SameParticipants.into());
        }

        for attempt in 1..=RESOLVE_MAX_ATTEMPTS {
            if let Some(existing) = self.store.find_conversation(a, b).await? {
                return Ok(existing.id);
            }

            match self.store.insert_conversation(a, b).await {
                Ok(created) => {
                    info!(conversation = %created.id, a = %a, b = %b, "conversation created");
                    return Ok(created.id);
                }
                Err(e) if e.is_conflict() => {
                    debug!(attempt, a = %a, b = %b, "conversation created concurrently, re-reading");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(StoreError::Conflict(format!(
            "conversation {a}/{b} still missing after {RESOLVE_MAX_ATTEMPTS} attempts"
        ))
        .into())
    }
}
