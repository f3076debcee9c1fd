//! Filesystem-backed artifact store

use crate::persistence::{normalize_relative, ArtifactStore, DirEntry, EntryKind, StorageError, WriteOptions};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Artifact store rooted at a local directory
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    /// Create a store rooted at `root`, creating the directory if needed
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root)
            .await
            .map_err(|e| StorageError::from_io(&root, e))?;
        Ok(Self { root })
    }

    /// Absolute location of a store-relative path
    pub fn resolve(&self, path: &Path) -> Result<PathBuf, StorageError> {
        Ok(self.root.join(normalize_relative(path)?))
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn read(&self, path: &Path) -> Result<Vec<u8>, StorageError> {
        let full = self.resolve(path)?;
        fs::read(&full).await.map_err(|e| StorageError::from_io(path, e))
    }

    async fn write(&self, path: &Path, contents: &[u8], options: WriteOptions) -> Result<(), StorageError> {
        let full = self.resolve(path)?;

        let mut open = fs::OpenOptions::new();
        open.write(true);
        match (options.create, options.overwrite) {
            (true, true) => {
                open.create(true).truncate(true);
            }
            // Refused atomically when the file appears concurrently
            (true, false) => {
                open.create_new(true);
            }
            (false, true) => {
                open.truncate(true);
            }
            (false, false) => {
                let exists = fs::try_exists(&full)
                    .await
                    .map_err(|e| StorageError::from_io(path, e))?;
                return Err(if exists {
                    StorageError::AlreadyExists(path.to_path_buf())
                } else {
                    StorageError::NotFound(path.to_path_buf())
                });
            }
        }

        if options.create {
            if let Some(parent) = full.parent() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| StorageError::from_io(path, e))?;
            }
        }

        let mut file = open.open(&full).await.map_err(|e| StorageError::from_io(path, e))?;
        file.write_all(contents)
            .await
            .map_err(|e| StorageError::from_io(path, e))?;
        file.flush().await.map_err(|e| StorageError::from_io(path, e))?;

        debug!("Wrote {} bytes to {}", contents.len(), full.display());
        Ok(())
    }

    async fn delete(&self, path: &Path, recursive: bool) -> Result<(), StorageError> {
        let full = self.resolve(path)?;
        if full == self.root {
            return Err(StorageError::InvalidPath(path.to_path_buf()));
        }

        let metadata = fs::symlink_metadata(&full)
            .await
            .map_err(|e| StorageError::from_io(path, e))?;

        let result = if metadata.is_dir() {
            if recursive {
                fs::remove_dir_all(&full).await
            } else {
                fs::remove_dir(&full).await
            }
        } else {
            fs::remove_file(&full).await
        };
        result.map_err(|e| StorageError::from_io(path, e))?;

        debug!("Deleted {}", full.display());
        Ok(())
    }

    async fn list(&self, dir: &Path) -> Result<Vec<DirEntry>, StorageError> {
        let full = self.resolve(dir)?;
        let mut reader = fs::read_dir(&full)
            .await
            .map_err(|e| StorageError::from_io(dir, e))?;

        let mut entries = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|e| StorageError::from_io(dir, e))?
        {
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| StorageError::from_io(dir, e))?;
            let kind = if file_type.is_dir() {
                EntryKind::Directory
            } else if file_type.is_file() {
                EntryKind::File
            } else {
                EntryKind::Other
            };
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                kind,
            });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn create_dir(&self, path: &Path) -> Result<(), StorageError> {
        let full = self.resolve(path)?;
        fs::create_dir_all(&full)
            .await
            .map_err(|e| StorageError::from_io(path, e))
    }

    async fn exists(&self, path: &Path) -> Result<bool, StorageError> {
        let full = self.resolve(path)?;
        fs::try_exists(&full)
            .await
            .map_err(|e| StorageError::from_io(path, e))
    }
}
