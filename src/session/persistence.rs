use crate::env;
use crate::session::error::SessionError;
use crate::session::handle::Session;
use crate::session::id::SessionId;
use crate::session::metadata::*;
use serde::Deserialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs as async_fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Directory-backed persistence for session headers.
///
/// Layout: `<root>/<SessionId>/session.json`, one directory per session.
/// Headers are written to a temporary file in the same directory and renamed
/// into place, so readers only ever see a complete snapshot.
#[derive(Debug, Clone)]
pub struct SessionStore {
    root: PathBuf,
}

/// Result of a save operation
#[derive(Debug, Clone)]
pub struct SaveReport {
    pub bytes_written: u64,
    pub duration_ms: u64,
}

/// Only the version field, read before committing to the full header schema
#[derive(Deserialize)]
struct VersionProbe {
    version: u32,
}

impl SessionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn session_dir(&self, id: &SessionId) -> PathBuf {
        env::session_dir_path(&self.root, id.as_str())
    }

    pub fn header_path(&self, id: &SessionId) -> PathBuf {
        env::session_header_file_path(&self.root, id.as_str())
    }

    /// Ensure the session root exists; idempotent
    pub async fn create_session_root(&self) -> Result<(), SessionError> {
        async_fs::create_dir_all(&self.root).await.map_err(|e| {
            SessionError::io(
                format!("Failed to create session root {}", self.root.display()),
                e,
            )
        })
    }

    pub fn session_root_exists(&self) -> bool {
        self.root.is_dir()
    }

    /// Claim a directory for `id`. Returns false if it already exists.
    pub async fn create_session_dir(&self, id: &SessionId) -> Result<bool, SessionError> {
        self.create_session_root().await?;
        let dir = self.session_dir(id);
        match async_fs::create_dir(&dir).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(SessionError::io(
                format!("Failed to create session directory {}", dir.display()),
                e,
            )),
        }
    }

    pub fn has_header(&self, id: &SessionId) -> bool {
        self.header_path(id).is_file()
    }

    /// Write the session's current header atomically
    pub async fn save(&self, session: &Session) -> Result<SaveReport, SessionError> {
        let header = session.header().await;
        self.save_header(session.id(), &header).await
    }

    pub(crate) async fn save_header(
        &self,
        id: &SessionId,
        header: &SessionHeader,
    ) -> Result<SaveReport, SessionError> {
        let start_time = std::time::Instant::now();

        let serialized = serde_json::to_vec_pretty(header)
            .map_err(|e| SessionError::io("Failed to serialize session header", e.into()))?;

        let dir = self.session_dir(id);
        async_fs::create_dir_all(&dir).await.map_err(|e| {
            SessionError::io(
                format!("Failed to create session directory {}", dir.display()),
                e,
            )
        })?;

        let nonce = uuid::Uuid::new_v4().simple().to_string();
        let temp_file = env::session_temp_file_path(&self.root, id.as_str(), &nonce);
        let final_file = self.header_path(id);

        if let Err(e) = write_synced(&temp_file, &serialized).await {
            let _ = async_fs::remove_file(&temp_file).await;
            return Err(SessionError::io(
                format!("Failed to write session file {}", temp_file.display()),
                e,
            ));
        }

        if let Err(e) = async_fs::rename(&temp_file, &final_file).await {
            let _ = async_fs::remove_file(&temp_file).await;
            return Err(SessionError::io(
                format!("Failed to commit session file {}", final_file.display()),
                e,
            ));
        }

        let report = SaveReport {
            bytes_written: serialized.len() as u64,
            duration_ms: start_time.elapsed().as_millis() as u64,
        };
        debug!(
            "Session {} saved: {} bytes in {}ms",
            id, report.bytes_written, report.duration_ms
        );
        Ok(report)
    }

    /// Read a session back from disk.
    ///
    /// The returned session holds no lock; the lifecycle manager attaches one
    /// when it resumes the session for writing.
    pub async fn load(&self, id: &SessionId) -> Result<Session, SessionError> {
        let header = self.load_header(id).await?;
        Ok(Session::new(id.clone(), self.session_dir(id), header))
    }

    pub(crate) async fn load_header(&self, id: &SessionId) -> Result<SessionHeader, SessionError> {
        let session_file = self.header_path(id);

        let content = match async_fs::read(&session_file).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(SessionError::not_found(id.as_str()));
            }
            Err(e) => {
                return Err(SessionError::io(
                    format!("Failed to read session file {}", session_file.display()),
                    e,
                ));
            }
        };

        let probe: VersionProbe =
            serde_json::from_slice(&content).map_err(|e| SessionError::CorruptFormat {
                id: id.to_string(),
                reason: e.to_string(),
            })?;

        if probe.version > SESSION_FORMAT_VERSION {
            return Err(SessionError::IncompatibleVersion {
                id: id.to_string(),
                found: probe.version,
                supported: SESSION_FORMAT_VERSION,
            });
        }

        let header: SessionHeader =
            serde_json::from_slice(&content).map_err(|e| SessionError::CorruptFormat {
                id: id.to_string(),
                reason: e.to_string(),
            })?;

        debug!("Session {} loaded (format v{})", id, header.version);
        Ok(header)
    }

    /// Remove a session directory. Already absent counts as success.
    pub async fn delete(&self, id: &SessionId) -> Result<(), SessionError> {
        let dir = self.session_dir(id);
        match async_fs::remove_dir_all(&dir).await {
            Ok(()) => {
                info!("Session {} deleted", id);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Session {} already absent", id);
                Ok(())
            }
            Err(e) => Err(SessionError::io(
                format!("Failed to delete session directory {}", dir.display()),
                e,
            )),
        }
    }

    /// All session directories under the root, sorted
    pub async fn list_session_ids(&self) -> Result<Vec<SessionId>, SessionError> {
        let mut ids = Vec::new();

        let mut entries = match async_fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(ids),
            Err(e) => {
                return Err(SessionError::io(
                    format!("Failed to read session root {}", self.root.display()),
                    e,
                ));
            }
        };

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| SessionError::io("Failed to read session root entry", e))?
        {
            let is_dir = entry
                .file_type()
                .await
                .map(|t| t.is_dir())
                .unwrap_or(false);
            if !is_dir {
                continue;
            }
            match entry.file_name().to_str().and_then(SessionId::parse) {
                Some(id) => ids.push(id),
                None => warn!(
                    "Ignoring unexpected entry in session root: {:?}",
                    entry.file_name()
                ),
            }
        }

        ids.sort();
        Ok(ids)
    }
}

async fn write_synced(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = async_fs::File::create(path).await?;
    file.write_all(data).await?;
    file.sync_all().await?;
    Ok(())
}
