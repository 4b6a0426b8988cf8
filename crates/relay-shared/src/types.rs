use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::{FALLBACK_NAME_SUFFIX_LEN, USER_ID_ALPHABET, USER_ID_LEN};
use crate::error::IdError;

/// Human-shareable user identifier: 8 upper-case alphanumeric characters.
///
/// Input is case-insensitive; the canonical form is always upper-cased, so two
/// `UserId`s compare equal exactly when they name the same user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    /// Generate a fresh random id.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let id = (0..USER_ID_LEN)
            .map(|_| USER_ID_ALPHABET[rng.gen_range(0..USER_ID_ALPHABET.len())] as char)
            .collect();
        Self(id)
    }

    /// Parse user input, trimming surrounding whitespace and upper-casing.
    pub fn parse(s: &str) -> Result<Self, IdError> {
        let canonical = s.trim().to_ascii_uppercase();
        let actual = canonical.chars().count();
        if actual != USER_ID_LEN {
            return Err(IdError::InvalidLength {
                expected: USER_ID_LEN,
                actual,
            });
        }
        if let Some(bad) = canonical
            .chars()
            .find(|c| !c.is_ascii() || !USER_ID_ALPHABET.contains(&(*c as u8)))
        {
            return Err(IdError::InvalidCharacter(bad));
        }
        Ok(Self(canonical))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Trailing characters used in generated names ("User 1A2B").
    pub fn short(&self) -> &str {
        &self.0[self.0.len() - FALLBACK_NAME_SUFFIX_LEN..]
    }

    /// Name shown when neither a profile nor a contact supplies one.
    pub fn fallback_name(&self) -> String {
        format!("User {}", self.short())
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for UserId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for UserId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.0
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct ConversationId(pub Uuid);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
