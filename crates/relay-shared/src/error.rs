use thiserror::Error;

/// Errors produced while parsing a user-entered identifier.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdError {
    #[error("User id must be {expected} characters, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("User id contains invalid character {0:?}")]
    InvalidCharacter(char),
}
