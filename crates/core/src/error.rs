//! Errors raised while turning operator or wire input into domain values.

use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Identifier text is not a UUID.
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// Table key text is not `LEAGUE_ID/SEASON_ID`.
    #[error("invalid table key {input:?}: {reason}")]
    InvalidKey { input: String, reason: String },
}

impl DomainError {
    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn invalid_key(input: &str, reason: impl Into<String>) -> Self {
        Self::InvalidKey {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}
