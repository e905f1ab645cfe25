//! Anonymous shopper session token.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Opaque token identifying an anonymous shopper.
///
/// Clients generate and hold this value; the server only requires that it is
/// non-empty. It is stored verbatim, never normalized.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Accept a client-supplied token.
    ///
    /// Returns `None` for empty or whitespace-only input.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        if s.trim().is_empty() {
            None
        } else {
            Some(Self(s.to_owned()))
        }
    }

    /// Returns the token as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
