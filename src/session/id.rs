use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of characters in every session identifier
pub const SESSION_ID_LEN: usize = 8;

const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Identifier of a stored session.
///
/// Always exactly [`SESSION_ID_LEN`] ASCII letters, which makes it safe to use
/// directly as a directory name and easy to type back on the command line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh random identifier.
    ///
    /// Uniqueness against stored sessions is the caller's job.
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let id = (0..SESSION_ID_LEN)
            .map(|_| LETTERS[rng.random_range(0..LETTERS.len())] as char)
            .collect();
        Self(id)
    }

    /// Validate a user supplied identifier
    pub fn parse(value: &str) -> Option<Self> {
        is_valid_session_id(value).then(|| Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Check the shape of a session identifier without allocating
pub fn is_valid_session_id(value: &str) -> bool {
    value.len() == SESSION_ID_LEN && value.bytes().all(|b| b.is_ascii_alphabetic())
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

impl TryFrom<String> for SessionId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if is_valid_session_id(&value) {
            Ok(Self(value))
        } else {
            Err(format!("invalid session id '{}'", value))
        }
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.0
    }
}
