//! Storage client abstraction used by the transfer commands.
//!
//! Commands talk to a [`StorageClient`] per target. Only the local filesystem
//! backend ships here; remote URLs are rejected with
//! [`StorageError::UnsupportedTarget`].

pub mod local;

pub use local::LocalClient;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncRead;

/// Suffix marking a target as recursive, e.g. `photos/...`
pub const RECURSIVE_SUFFIX: &str = "...";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Target '{0}' not found")]
    NotFound(String),

    #[error("Unsupported target '{url}': {reason}")]
    UnsupportedTarget { url: String, reason: String },

    #[error("Target '{0}' is a directory, use --recursive")]
    IsDirectory(String),

    #[error("IO error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StorageError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    File,
    Directory,
}

/// One listed object; `key` is relative to the client's URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub key: String,
    pub size: u64,
    pub modified: DateTime<Utc>,
    pub kind: ObjectKind,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ListOptions {
    pub recursive: bool,
    /// List partially written objects instead of complete ones
    pub incomplete: bool,
}

pub type ObjectReader = Box<dyn AsyncRead + Send + Unpin>;

/// Operations a command may perform against one target
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// The URL this client was built for
    fn url(&self) -> &str;

    /// Information about the target itself
    async fn stat(&self) -> Result<ObjectInfo, StorageError>;

    /// Objects under the target, sorted by key
    async fn list(&self, options: ListOptions) -> Result<Vec<ObjectInfo>, StorageError>;

    /// Open an object for reading; an empty key is the target itself
    async fn get(&self, key: &str) -> Result<(ObjectReader, u64), StorageError>;

    /// Write an object, returning the bytes written
    async fn put(&self, key: &str, reader: ObjectReader, size: u64) -> Result<u64, StorageError>;
}

pub fn is_recursive_url(url: &str) -> bool {
    url.ends_with(RECURSIVE_SUFFIX)
}

pub fn strip_recursive_url(url: &str) -> &str {
    url.strip_suffix(RECURSIVE_SUFFIX).unwrap_or(url)
}

/// Build the client for a target. Relative paths resolve against `base_dir`.
pub fn client_for_url(target: &str, base_dir: &Path) -> Result<Box<dyn StorageClient>, StorageError> {
    let target = strip_recursive_url(target);
    let path = local_path_for(target)?;
    let path = if path.is_absolute() {
        path
    } else {
        base_dir.join(path)
    };
    Ok(Box::new(LocalClient::new(target, path)))
}

fn local_path_for(target: &str) -> Result<PathBuf, StorageError> {
    match url::Url::parse(target) {
        Ok(url) if url.scheme() == "file" => {
            url.to_file_path()
                .map_err(|_| StorageError::UnsupportedTarget {
                    url: target.to_string(),
                    reason: "file URL has no local path".to_string(),
                })
        }
        // Windows drive letters parse as one-letter schemes
        Ok(url) if url.scheme().len() == 1 => Ok(PathBuf::from(target)),
        Ok(url) => Err(StorageError::UnsupportedTarget {
            url: target.to_string(),
            reason: format!("no client for scheme '{}'", url.scheme()),
        }),
        Err(_) => Ok(PathBuf::from(target)),
    }
}

/// Render a byte count the way listings show it, e.g. `1.5KiB`
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB"];
    if bytes < 1024 {
        return format!("{}B", bytes);
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1}{}", value, UNITS[unit])
}
