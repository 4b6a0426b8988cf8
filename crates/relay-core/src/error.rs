use thiserror::Error;

use relay_shared::{IdError, UserId};
use relay_store::StoreError;

/// Input rejected before any store call.  Nothing was mutated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Message is empty")]
    EmptyMessage,

    #[error("A conversation needs two different participants")]
    SameParticipants,

    #[error("You cannot add your own id")]
    SelfContact,

    #[error("Id {0} does not match any registered user")]
    UnknownUser(UserId),

    #[error("{0} is already in your contacts")]
    DuplicateContact(UserId),

    #[error("Invalid id: {0}")]
    InvalidId(#[from] IdError),

    #[error("Display name cannot be empty")]
    EmptyDisplayName,

    #[error("No conversation is open")]
    NoOpenConversation,
}

/// Errors surfaced by the sync core to its caller (the UI layer).
#[derive(Error, Debug)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Identity file error: {0}")]
    IdentityFile(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CoreError {
    /// Whether retrying the same call later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoreError::Store(StoreError::Unavailable(_))
                | CoreError::Store(StoreError::Sqlite(_))
                | CoreError::Store(StoreError::Io(_))
        )
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
