//! Idempotency keys.
//!
//! The store itself accepts any `Eq + Hash + Clone` key. `IdempotencyKey` is the
//! string-backed key used by the guard and the CLI.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::{Uuid, Version};

/// A caller-supplied token identifying one logical request.
///
/// `Debug` prints the bare quoted value (`"abc"`), matching how plain `String`
/// keys appear in error messages.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

/// KeyError は key の形式チェックに失敗したときのエラー
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    #[error("idempotency key is empty")]
    Empty,

    #[error("idempotency key '{0}' must be formatted as a v4 UUID")]
    NotUuidV4(String),
}

impl IdempotencyKey {
    /// Wrap any value as a key. No validation.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Parse a key that must be a v4 UUID (hyphenated or simple form).
    ///
    /// The original casing is kept so a replayed key round-trips unchanged.
    pub fn parse_uuid4(raw: &str) -> Result<Self, KeyError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(KeyError::Empty);
        }
        match Uuid::try_parse(trimmed) {
            Ok(uuid) if uuid.get_version() == Some(Version::Random) => Ok(Self(trimmed.to_string())),
            _ => Err(KeyError::NotUuidV4(trimmed.to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for IdempotencyKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for IdempotencyKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for IdempotencyKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}
