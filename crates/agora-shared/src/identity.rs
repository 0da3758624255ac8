use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum length of a handle after normalization.
pub const MAX_HANDLE_LEN: usize = 64;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("Handle is empty")]
    Empty,

    #[error("Handle is too long: {0} chars (max {MAX_HANDLE_LEN})")]
    TooLong(usize),

    #[error("Handle contains invalid character: {0:?}")]
    InvalidChar(char),
}

/// A verified user handle, normalized for case-insensitive comparison.
///
/// Handles are owned by the identity service; this subsystem only ever
/// references them by value.  Construction trims and lowercases so that
/// `Alice` and `alice` key the same conversations, block edges, and hub
/// connections.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity(String);

impl Identity {
    /// Parse and normalize a raw handle.
    ///
    /// Same restriction the platform applies at signup: ASCII letters,
    /// digits, underscore, dash, dot.  Rejects homoglyph look-alikes
    /// outright instead of trying to fold them.
    pub fn parse(raw: &str) -> Result<Self, IdentityError> {
        let normalized = raw.trim().to_ascii_lowercase();

        if normalized.is_empty() {
            return Err(IdentityError::Empty);
        }
        if normalized.len() > MAX_HANDLE_LEN {
            return Err(IdentityError::TooLong(normalized.len()));
        }
        if let Some(c) = normalized
            .chars()
            .find(|c| !c.is_ascii_alphanumeric() && !matches!(c, '_' | '-' | '.'))
        {
            return Err(IdentityError::InvalidChar(c));
        }

        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Identity {
    type Error = IdentityError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(&raw)
    }
}

impl From<Identity> for String {
    fn from(identity: Identity) -> Self {
        identity.0
    }
}
