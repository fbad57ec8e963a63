use crate::session::id::SessionId;
use crate::session::lock::SessionLease;
use crate::session::metadata::*;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use tracing::debug;

/// In-memory session: identity, header, and where it lives on disk.
///
/// Cloning is cheap and every clone shares the same header, so concurrent
/// transfer workers can all report progress into one session.
#[derive(Debug, Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

#[derive(Debug)]
struct SessionInner {
    id: SessionId,
    dir: PathBuf,
    header: RwLock<SessionHeader>,
    lease: Mutex<Option<SessionLease>>,
    deleted: AtomicBool,
}

impl Session {
    pub(crate) fn new(id: SessionId, dir: PathBuf, header: SessionHeader) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                id,
                dir,
                header: RwLock::new(header),
                lease: Mutex::new(None),
                deleted: AtomicBool::new(false),
            }),
        }
    }

    pub(crate) fn with_lease(self, lease: SessionLease) -> Self {
        if let Ok(mut slot) = self.inner.lease.lock() {
            *slot = Some(lease);
        }
        self
    }

    pub fn id(&self) -> &SessionId {
        &self.inner.id
    }

    /// Directory holding this session's files
    pub fn dir(&self) -> &Path {
        &self.inner.dir
    }

    /// Snapshot of the current header
    pub async fn header(&self) -> SessionHeader {
        self.inner.header.read().await.clone()
    }

    pub async fn command_args(&self) -> Option<CommandArgs> {
        self.inner.header.read().await.command_args.clone()
    }

    pub async fn progress(&self) -> Progress {
        self.inner.header.read().await.progress.clone()
    }

    /// Attach the owning command's arguments
    pub async fn set_command_args(&self, args: CommandArgs) {
        let mut header = self.inner.header.write().await;
        header.command_args = Some(args);
    }

    /// Merge a progress update in memory; persistence is a separate step
    pub async fn checkpoint(&self, delta: ProgressDelta) -> bool {
        let mut header = self.inner.header.write().await;
        header.progress.apply(delta)
    }

    pub async fn is_completed(&self, source: &str) -> bool {
        self.inner.header.read().await.progress.is_completed(source)
    }

    /// Run `f` against the header under the write lock
    pub(crate) async fn update_header<R>(&self, f: impl FnOnce(&mut SessionHeader) -> R) -> R {
        let mut header = self.inner.header.write().await;
        f(&mut header)
    }

    /// Whether this process currently holds the session's lock
    pub fn is_locked(&self) -> bool {
        self.inner
            .lease
            .lock()
            .map(|lease| lease.is_some())
            .unwrap_or(false)
    }

    /// Drop the lock, if held. Returns true if a lock was released.
    pub(crate) fn release_lease(&self) -> bool {
        let lease = match self.inner.lease.lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => None,
        };
        let released = lease.is_some();
        if released {
            debug!("Released lock for session {}", self.inner.id);
        }
        released
    }

    pub fn is_deleted(&self) -> bool {
        self.inner.deleted.load(Ordering::SeqCst)
    }

    pub(crate) fn mark_deleted(&self) {
        self.inner.deleted.store(true, Ordering::SeqCst);
    }
}
