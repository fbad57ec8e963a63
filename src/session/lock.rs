//! Advisory locking that keeps a session to a single writer.
//!
//! The lifecycle manager takes a [`SessionLease`] from a [`SessionLocker`]
//! on begin/resume and drops it on close. Dropping the lease releases the
//! lock, so a crashed process never leaves a session locked.

use crate::env;
use crate::session::error::SessionError;
use crate::session::id::SessionId;
use fs2::FileExt;
use std::collections::HashSet;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Grants exclusive access to a session directory
pub trait SessionLocker: Send + Sync + fmt::Debug {
    /// Try to take the lock without waiting.
    ///
    /// Fails with [`SessionError::SessionBusy`] when another holder exists.
    fn try_lock(&self, id: &SessionId, session_root: &Path) -> Result<SessionLease, SessionError>;
}

/// Held lock on one session; released on drop
pub struct SessionLease {
    id: SessionId,
    // NOTE(lifetime): released when the lease is dropped
    _guard: Box<dyn Send + Sync>,
}

impl SessionLease {
    pub fn new(id: SessionId, guard: impl Send + Sync + 'static) -> Self {
        Self {
            id,
            _guard: Box::new(guard),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }
}

impl fmt::Debug for SessionLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionLease").field("id", &self.id).finish()
    }
}

/// Cross-process locker backed by `flock` on `<session>/session.lock`
#[derive(Debug, Default, Clone, Copy)]
pub struct FileLocker;

struct FileLockGuard {
    file: File,
}

impl Drop for FileLockGuard {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

impl SessionLocker for FileLocker {
    fn try_lock(&self, id: &SessionId, session_root: &Path) -> Result<SessionLease, SessionError> {
        let lock_path = env::session_lock_file_path(session_root, id.as_str());

        // Don't truncate before holding the lock, it would wipe the holder's pid.
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    SessionError::not_found(id.as_str())
                } else {
                    SessionError::io(
                        format!("Failed to open lock file {}", lock_path.display()),
                        e,
                    )
                }
            })?;

        if let Err(e) = FileExt::try_lock_exclusive(&file) {
            if e.kind() == std::io::ErrorKind::WouldBlock
                || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
            {
                return Err(SessionError::SessionBusy {
                    id: id.to_string(),
                });
            }
            return Err(SessionError::io(
                format!("Failed to lock {}", lock_path.display()),
                e,
            ));
        }

        file.set_len(0)
            .and_then(|_| writeln!(file, "{}", std::process::id()))
            .map_err(|e| SessionError::io("Failed to record lock owner", e))?;

        debug!("Acquired file lock for session {}", id);
        Ok(SessionLease::new(id.clone(), FileLockGuard { file }))
    }
}

/// In-process locker, for tests and embedders that run a single process
#[derive(Debug, Default, Clone)]
pub struct MemoryLocker {
    held: Arc<Mutex<HashSet<SessionId>>>,
}

struct MemoryLockGuard {
    id: SessionId,
    held: Arc<Mutex<HashSet<SessionId>>>,
}

impl Drop for MemoryLockGuard {
    fn drop(&mut self) {
        if let Ok(mut held) = self.held.lock() {
            held.remove(&self.id);
        }
    }
}

impl MemoryLocker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_locked(&self, id: &SessionId) -> bool {
        self.held.lock().map(|held| held.contains(id)).unwrap_or(false)
    }
}

impl SessionLocker for MemoryLocker {
    fn try_lock(&self, id: &SessionId, session_root: &Path) -> Result<SessionLease, SessionError> {
        if !env::session_dir_path(session_root, id.as_str()).is_dir() {
            return Err(SessionError::not_found(id.as_str()));
        }

        let mut held = self
            .held
            .lock()
            .map_err(|_| SessionError::SessionBusy { id: id.to_string() })?;
        if !held.insert(id.clone()) {
            return Err(SessionError::SessionBusy { id: id.to_string() });
        }

        Ok(SessionLease::new(
            id.clone(),
            MemoryLockGuard {
                id: id.clone(),
                held: Arc::clone(&self.held),
            },
        ))
    }
}

/// Locker that never refuses, used when `lock_sessions` is off
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLocker;

impl SessionLocker for NoopLocker {
    fn try_lock(&self, id: &SessionId, session_root: &Path) -> Result<SessionLease, SessionError> {
        if !env::session_dir_path(session_root, id.as_str()).is_dir() {
            return Err(SessionError::not_found(id.as_str()));
        }
        Ok(SessionLease::new(id.clone(), ()))
    }
}
