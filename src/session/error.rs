use std::io;
use thiserror::Error;

/// Failures reported by the session store and lifecycle manager.
///
/// Everything except `Io` needs a decision from the user and is never retried.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session '{id}' not found")]
    NotFound { id: String },

    #[error("Session '{id}' is corrupt: {reason}")]
    CorruptFormat { id: String, reason: String },

    #[error("Session '{id}' uses format version {found}, newer than supported version {supported}")]
    IncompatibleVersion {
        id: String,
        found: u32,
        supported: u32,
    },

    #[error("Session '{id}' is in use by another process")]
    SessionBusy { id: String },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl SessionError {
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
