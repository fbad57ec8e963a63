use crate::session::error::SessionError;
use crate::session::handle::Session;
use crate::session::id::SessionId;
use crate::session::lock::{FileLocker, NoopLocker, SessionLocker};
use crate::session::metadata::*;
use crate::session::persistence::{SaveReport, SessionStore};
use chrono::Utc;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Attempts at finding an unused identifier before giving up
pub const MAX_ID_ATTEMPTS: u32 = 16;

/// Coordinates session creation, checkpoints, persistence and removal.
///
/// Owns the single-writer guarantee: every session it hands out for writing
/// holds a lease from the injected [`SessionLocker`].
#[derive(Debug, Clone)]
pub struct SessionManager {
    store: SessionStore,
    locker: Arc<dyn SessionLocker>,
}

/// Which sessions `clear` removes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClearTarget {
    One(String),
    All,
}

/// How an interruptible operation ended
#[derive(Debug)]
pub enum RunOutcome<T> {
    Completed(T),
    /// Cancelled; `saved` is the result of the final best-effort save
    Interrupted {
        saved: Result<SaveReport, SessionError>,
    },
}

impl ClearTarget {
    pub fn parse(value: &str) -> Self {
        if value == "all" {
            Self::All
        } else {
            Self::One(value.to_string())
        }
    }
}

impl SessionManager {
    pub fn new(store: SessionStore, locker: Arc<dyn SessionLocker>) -> Self {
        Self { store, locker }
    }

    /// Manager over `root` using cross-process file locks
    pub fn with_file_locks(root: impl Into<PathBuf>) -> Self {
        Self::new(SessionStore::new(root), Arc::new(FileLocker))
    }

    /// Manager over `root` without any locking
    pub fn without_locks(root: impl Into<PathBuf>) -> Self {
        Self::new(SessionStore::new(root), Arc::new(NoopLocker))
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Allocate a session with no command attached yet.
    ///
    /// The session directory is claimed and locked, but nothing is durable
    /// until the first [`SessionManager::save`].
    pub async fn create(&self) -> Result<Session, SessionError> {
        self.store.create_session_root().await?;

        for attempt in 1..=MAX_ID_ATTEMPTS {
            let id = SessionId::generate();
            if !self.store.create_session_dir(&id).await? {
                debug!("Session id {} taken (attempt {})", id, attempt);
                continue;
            }

            let lease = match self.locker.try_lock(&id, self.store.root()) {
                Ok(lease) => lease,
                Err(e) => {
                    if let Err(cleanup) = self.store.delete(&id).await {
                        warn!("Failed to remove unlocked session {}: {}", id, cleanup);
                    }
                    return Err(e);
                }
            };

            let root_path = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
            let session = Session::new(
                id.clone(),
                self.store.session_dir(&id),
                SessionHeader::new(root_path),
            )
            .with_lease(lease);

            info!("Created session {}", id);
            return Ok(session);
        }

        error!(
            "No unused session id found after {} attempts",
            MAX_ID_ATTEMPTS
        );
        Err(SessionError::io(
            "Failed to allocate a session id",
            std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                format!("{} consecutive id collisions", MAX_ID_ATTEMPTS),
            ),
        ))
    }

    /// Allocate a session for `command` with empty progress
    pub async fn begin(
        &self,
        command: impl Into<String>,
        args: Vec<String>,
    ) -> Result<Session, SessionError> {
        let session = self.create().await?;
        session
            .set_command_args(CommandArgs::new(command, args))
            .await;
        Ok(session)
    }

    /// Merge progress into the session in memory
    pub async fn checkpoint(&self, session: &Session, delta: ProgressDelta) -> bool {
        session.checkpoint(delta).await
    }

    /// Persist the session's current state
    pub async fn save(&self, session: &Session) -> Result<SaveReport, SessionError> {
        if session.is_deleted() {
            return Err(SessionError::not_found(session.id().as_str()));
        }

        let header = session
            .update_header(|header| {
                header.state = if header.progress.is_empty() {
                    SessionState::Fresh
                } else {
                    SessionState::Resumable
                };
                header.saved_at = Some(Utc::now());
                header.clone()
            })
            .await;

        let report = self.store.save_header(session.id(), &header).await?;
        info!(
            "Session {} saved: {} bytes in {}ms",
            session.id(),
            report.bytes_written,
            report.duration_ms
        );
        Ok(report)
    }

    /// Release in-process resources; persisted data stays.
    ///
    /// A session that was never saved has nothing to keep, so its directory
    /// is removed. Safe to call more than once.
    pub async fn close(&self, session: &Session) -> Result<(), SessionError> {
        let released = session.release_lease();
        if released && !session.is_deleted() && !self.store.has_header(session.id()) {
            debug!("Removing unsaved session {}", session.id());
            self.store.delete(session.id()).await?;
        }
        Ok(())
    }

    /// Remove the session permanently and release its lock
    pub async fn delete(&self, session: &Session) -> Result<(), SessionError> {
        self.store.delete(session.id()).await?;
        session.mark_deleted();
        session.release_lease();
        Ok(())
    }

    /// Reload a saved session for writing
    pub async fn resume(&self, id: &str) -> Result<Session, SessionError> {
        let id = SessionId::parse(id).ok_or_else(|| SessionError::not_found(id))?;
        // Unsaved sessions are not resumable, locked or not
        if !self.store.has_header(&id) {
            return Err(SessionError::not_found(id.as_str()));
        }

        let lease = self.locker.try_lock(&id, self.store.root())?;
        let session = self.store.load(&id).await?.with_lease(lease);

        info!("Resumed session {}", id);
        Ok(session)
    }

    /// Read a session without taking its lock
    pub async fn inspect(&self, id: &SessionId) -> Result<Session, SessionError> {
        self.store.load(id).await
    }

    pub async fn list(&self) -> Result<Vec<SessionId>, SessionError> {
        self.store.list_session_ids().await
    }

    /// Delete one session, or every session under the root.
    ///
    /// Returns the identifiers that were removed.
    pub async fn clear(&self, target: ClearTarget) -> Result<Vec<SessionId>, SessionError> {
        match target {
            ClearTarget::One(id) => {
                let id = SessionId::parse(&id).ok_or_else(|| SessionError::not_found(id))?;
                self.clear_one(&id).await?;
                Ok(vec![id])
            }
            ClearTarget::All => {
                let mut cleared = Vec::new();
                let ids = match self.store.list_session_ids().await {
                    Ok(ids) => ids,
                    Err(e) => {
                        warn!("Unable to read session root, nothing cleared: {}", e);
                        return Ok(cleared);
                    }
                };
                for id in ids {
                    match self.clear_one(&id).await {
                        Ok(()) => cleared.push(id),
                        Err(e) => warn!("Skipping session {}: {}", id, e),
                    }
                }
                info!("Cleared {} sessions", cleared.len());
                Ok(cleared)
            }
        }
    }

    async fn clear_one(&self, id: &SessionId) -> Result<(), SessionError> {
        if !self.store.session_dir(id).is_dir() {
            return Err(SessionError::not_found(id.as_str()));
        }
        let _lease = self.locker.try_lock(id, self.store.root())?;
        self.store.delete(id).await
    }

    /// Drive `operation` until it finishes or `cancel` fires.
    ///
    /// On cancellation the session gets one final save and is closed; the
    /// save result is handed back instead of being retried.
    pub async fn run_interruptible<F, T>(
        &self,
        session: &Session,
        operation: F,
        cancel: CancellationToken,
    ) -> RunOutcome<T>
    where
        F: Future<Output = T>,
    {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("Interrupted, saving session {}", session.id());
                let saved = self.save(session).await;
                if let Err(e) = &saved {
                    error!("Final save of session {} failed: {}", session.id(), e);
                }
                if let Err(e) = self.close(session).await {
                    warn!("Failed to close session {}: {}", session.id(), e);
                }
                RunOutcome::Interrupted { saved }
            }
            result = operation => RunOutcome::Completed(result),
        }
    }
}
