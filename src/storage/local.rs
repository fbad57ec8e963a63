use crate::env;
use crate::storage::*;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fs::Metadata;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs as async_fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use walkdir::WalkDir;

/// Filesystem backend rooted at one path
#[derive(Debug, Clone)]
pub struct LocalClient {
    url: String,
    path: PathBuf,
}

impl LocalClient {
    pub fn new(url: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn path_for(&self, key: &str) -> PathBuf {
        if key.is_empty() {
            self.path.clone()
        } else {
            self.path.join(key)
        }
    }

    fn map_err(&self, path: &Path, e: std::io::Error) -> StorageError {
        if e.kind() == ErrorKind::NotFound {
            StorageError::NotFound(self.url.clone())
        } else {
            StorageError::io(path, e)
        }
    }

    async fn list_dir(&self, incomplete: bool) -> Result<Vec<ObjectInfo>, StorageError> {
        let mut objects = Vec::new();
        let mut entries = async_fs::read_dir(&self.path)
            .await
            .map_err(|e| self.map_err(&self.path, e))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::io(&self.path, e))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            let metadata = match entry.metadata().await {
                Ok(metadata) => metadata,
                Err(e) => {
                    debug!("Skipping {}: {}", name, e);
                    continue;
                }
            };

            if metadata.is_dir() {
                if !incomplete {
                    objects.push(object_info(format!("{}/", name), &metadata));
                }
            } else if is_part_file(&name) == incomplete {
                objects.push(object_info(name, &metadata));
            }
        }

        Ok(objects)
    }

    async fn list_recursive(&self, incomplete: bool) -> Result<Vec<ObjectInfo>, StorageError> {
        let root = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let mut objects = Vec::new();
            for entry in WalkDir::new(&root).follow_links(true) {
                let entry = entry.map_err(|e| {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.clone());
                    StorageError::io(path, e.into())
                })?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let Ok(relative) = entry.path().strip_prefix(&root) else {
                    continue;
                };
                let key = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                if is_part_file(&key) != incomplete {
                    continue;
                }
                let metadata = entry
                    .metadata()
                    .map_err(|e| StorageError::io(entry.path(), e.into()))?;
                objects.push(object_info(key, &metadata));
            }
            Ok(objects)
        })
        .await
        .map_err(|e| StorageError::io(&self.path, std::io::Error::other(e)))?
    }
}

#[async_trait]
impl StorageClient for LocalClient {
    fn url(&self) -> &str {
        &self.url
    }

    async fn stat(&self) -> Result<ObjectInfo, StorageError> {
        let metadata = async_fs::metadata(&self.path)
            .await
            .map_err(|e| self.map_err(&self.path, e))?;
        Ok(object_info(String::new(), &metadata))
    }

    async fn list(&self, options: ListOptions) -> Result<Vec<ObjectInfo>, StorageError> {
        let target = self.stat().await?;

        let mut objects = match target.kind {
            ObjectKind::File => {
                let is_part = self.path.to_string_lossy().ends_with(env::storage::PART_SUFFIX);
                if is_part == options.incomplete {
                    vec![target]
                } else {
                    Vec::new()
                }
            }
            ObjectKind::Directory if options.recursive => {
                self.list_recursive(options.incomplete).await?
            }
            ObjectKind::Directory => self.list_dir(options.incomplete).await?,
        };

        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }

    async fn get(&self, key: &str) -> Result<(ObjectReader, u64), StorageError> {
        let path = self.path_for(key);
        let file = async_fs::File::open(&path)
            .await
            .map_err(|e| self.map_err(&path, e))?;
        let metadata = file
            .metadata()
            .await
            .map_err(|e| StorageError::io(&path, e))?;
        if metadata.is_dir() {
            return Err(StorageError::IsDirectory(path.display().to_string()));
        }
        Ok((Box::new(file), metadata.len()))
    }

    async fn put(&self, key: &str, mut reader: ObjectReader, size: u64) -> Result<u64, StorageError> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            async_fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::io(parent, e))?;
        }

        let part_path = env::part_file_path(&path);
        let mut file = async_fs::File::create(&part_path)
            .await
            .map_err(|e| StorageError::io(&part_path, e))?;
        let written = tokio::io::copy(&mut reader, &mut file)
            .await
            .map_err(|e| StorageError::io(&part_path, e))?;
        file.flush()
            .await
            .map_err(|e| StorageError::io(&part_path, e))?;
        file.sync_all()
            .await
            .map_err(|e| StorageError::io(&part_path, e))?;
        drop(file);

        if written != size {
            // Leave the part file behind, it shows up as an incomplete upload
            return Err(StorageError::io(
                &part_path,
                std::io::Error::new(
                    ErrorKind::UnexpectedEof,
                    format!("expected {} bytes, wrote {}", size, written),
                ),
            ));
        }

        async_fs::rename(&part_path, &path)
            .await
            .map_err(|e| StorageError::io(&path, e))?;
        debug!("Wrote {} ({} bytes)", path.display(), written);
        Ok(written)
    }
}

fn is_part_file(name: &str) -> bool {
    name.ends_with(env::storage::PART_SUFFIX)
}

fn object_info(key: String, metadata: &Metadata) -> ObjectInfo {
    let modified = metadata
        .modified()
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now());
    ObjectInfo {
        key,
        size: metadata.len(),
        modified,
        kind: if metadata.is_dir() {
            ObjectKind::Directory
        } else {
            ObjectKind::File
        },
    }
}
