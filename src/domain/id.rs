//! Task identifiers
//!
//! Task IDs are opaque strings. Any id made of 1-128 characters from
//! `[A-Za-z0-9._:-]` is accepted, so ids coming from other tools can be
//! loaded as-is.
//!
//! IDs generated locally use the format `t-{7-char-hash}` (e.g., `t-9d3e5f2`),
//! where the hash is derived from the description + creation timestamp.
//! Same description at different times produces different IDs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Longest accepted task id
pub const MAX_ID_LEN: usize = 128;

#[derive(Debug, Error, PartialEq)]
pub enum IdError {
    #[error("Task ID must not be empty")]
    Empty,

    #[error("Task ID is longer than {max} characters: '{0}'", max = MAX_ID_LEN)]
    TooLong(String),

    #[error("Invalid task ID '{0}': only letters, digits, '.', '_', ':' and '-' are allowed")]
    InvalidCharacter(String),
}

/// Generates a 7-character hash from description and timestamp
fn generate_hash(description: &str, timestamp: DateTime<Utc>) -> String {
    let input = format!(
        "{}{}",
        description,
        timestamp.timestamp_nanos_opt().unwrap_or(0)
    );
    let hash = blake3::hash(input.as_bytes());
    let hex = hash.to_hex();
    hex[..7].to_string()
}

fn is_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | ':' | '-')
}

/// Opaque, validated task identifier
///
/// Ordering is plain byte-wise string ordering; it is the final tie-break of
/// the task ordering policy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaskId(String);

impl TaskId {
    /// Generates a new `t-{hash}` ID from description and timestamp
    pub fn generate(description: &str, timestamp: DateTime<Utc>) -> Self {
        Self(format!("t-{}", generate_hash(description, timestamp)))
    }

    /// Returns the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the id was generated locally (`t-` prefix and 7 hex chars)
    pub fn is_generated(&self) -> bool {
        self.0
            .strip_prefix("t-")
            .is_some_and(|h| h.len() == 7 && h.chars().all(|c| c.is_ascii_hexdigit()))
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl FromStr for TaskId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(IdError::Empty);
        }
        if s.len() > MAX_ID_LEN {
            return Err(IdError::TooLong(s.to_string()));
        }
        if !s.chars().all(is_id_char) {
            return Err(IdError::InvalidCharacter(s.to_string()));
        }

        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for TaskId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl TryFrom<&str> for TaskId {
    type Error = IdError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TaskId> for String {
    fn from(id: TaskId) -> Self {
        id.0
    }
}

impl AsRef<str> for TaskId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
