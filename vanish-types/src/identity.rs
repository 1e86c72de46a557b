//! User identity handle.

use crate::error::{EnvelopeError, EnvelopeResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Longest accepted identity, in bytes.
pub const MAX_IDENTITY_LEN: usize = 64;

/// Opaque, validated identity handle (e.g. a username).
///
/// Identities are used as room names by the relay and as URL path segments
/// by the HTTP directory, so `/` and control characters are rejected.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity(String);

impl Identity {
    pub fn new(raw: impl Into<String>) -> EnvelopeResult<Self> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(EnvelopeError::InvalidIdentity("empty".into()));
        }
        if trimmed.len() > MAX_IDENTITY_LEN {
            return Err(EnvelopeError::InvalidIdentity(format!(
                "longer than {MAX_IDENTITY_LEN} bytes"
            )));
        }
        if trimmed.chars().any(|c| c == '/' || c.is_control()) {
            return Err(EnvelopeError::InvalidIdentity(format!(
                "{trimmed:?} contains '/' or control characters"
            )));
        }
        Ok(Self(trimmed.to_string()))
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

impl FromStr for Identity {
    type Err = EnvelopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Identity {
    type Error = EnvelopeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Identity> for String {
    fn from(id: Identity) -> Self {
        id.0
    }
}
