//! Identifier types, constants and error enums shared by every Relay crate.

pub mod constants;
pub mod error;
pub mod types;

pub use error::IdError;
pub use types::{ConversationId, UserId};
