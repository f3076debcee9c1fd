//! In-memory artifact store (for testing or ephemeral use)

use crate::persistence::{normalize_relative, ArtifactStore, DirEntry, EntryKind, StorageError, WriteOptions};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
enum Entry {
    File(Vec<u8>),
    Directory,
}

/// Artifact store kept entirely in memory
#[derive(Debug, Default)]
pub struct InMemoryArtifactStore {
    entries: RwLock<BTreeMap<PathBuf, Entry>>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Insert directory entries for every ancestor of `path`
fn ensure_ancestors(entries: &mut BTreeMap<PathBuf, Entry>, path: &Path) -> Result<(), StorageError> {
    for ancestor in path.ancestors().skip(1) {
        if ancestor.as_os_str().is_empty() {
            break;
        }
        match entries.get(ancestor) {
            Some(Entry::File(_)) => return Err(StorageError::AlreadyExists(ancestor.to_path_buf())),
            Some(Entry::Directory) => {}
            None => {
                entries.insert(ancestor.to_path_buf(), Entry::Directory);
            }
        }
    }
    Ok(())
}

fn is_dir(entries: &BTreeMap<PathBuf, Entry>, path: &Path) -> bool {
    path.as_os_str().is_empty() || matches!(entries.get(path), Some(Entry::Directory))
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn read(&self, path: &Path) -> Result<Vec<u8>, StorageError> {
        let key = normalize_relative(path)?;
        let entries = self.entries.read().await;
        match entries.get(&key) {
            Some(Entry::File(bytes)) => Ok(bytes.clone()),
            Some(Entry::Directory) => Err(StorageError::Io {
                path: key,
                source: std::io::Error::new(std::io::ErrorKind::Other, "is a directory"),
            }),
            None => Err(StorageError::NotFound(key)),
        }
    }

    async fn write(&self, path: &Path, contents: &[u8], options: WriteOptions) -> Result<(), StorageError> {
        let key = normalize_relative(path)?;
        if key.as_os_str().is_empty() {
            return Err(StorageError::InvalidPath(key));
        }

        let mut entries = self.entries.write().await;
        match entries.get(&key) {
            Some(Entry::Directory) => return Err(StorageError::AlreadyExists(key)),
            Some(Entry::File(_)) if !options.overwrite => return Err(StorageError::AlreadyExists(key)),
            None if !options.create => return Err(StorageError::NotFound(key)),
            _ => {}
        }

        ensure_ancestors(&mut entries, &key)?;
        entries.insert(key, Entry::File(contents.to_vec()));
        Ok(())
    }

    async fn delete(&self, path: &Path, recursive: bool) -> Result<(), StorageError> {
        let key = normalize_relative(path)?;
        if key.as_os_str().is_empty() {
            return Err(StorageError::InvalidPath(key));
        }

        let mut entries = self.entries.write().await;
        let is_directory = match entries.get(&key) {
            None => return Err(StorageError::NotFound(key)),
            Some(Entry::File(_)) => false,
            Some(Entry::Directory) => true,
        };

        if is_directory {
            let nested: Vec<PathBuf> = entries
                .keys()
                .filter(|k| **k != key && k.starts_with(&key))
                .cloned()
                .collect();
            if !nested.is_empty() && !recursive {
                return Err(StorageError::DirectoryNotEmpty(key));
            }
            for k in nested {
                entries.remove(&k);
            }
        }
        entries.remove(&key);
        Ok(())
    }

    async fn list(&self, dir: &Path) -> Result<Vec<DirEntry>, StorageError> {
        let key = normalize_relative(dir)?;
        let entries = self.entries.read().await;
        if !is_dir(&entries, &key) {
            return Err(StorageError::NotFound(key));
        }

        Ok(entries
            .iter()
            .filter(|(path, _)| path.parent() == Some(key.as_path()))
            .filter_map(|(path, entry)| {
                let name = path.file_name()?.to_string_lossy().into_owned();
                let kind = match entry {
                    Entry::File(_) => EntryKind::File,
                    Entry::Directory => EntryKind::Directory,
                };
                Some(DirEntry { name, kind })
            })
            .collect())
    }

    async fn create_dir(&self, path: &Path) -> Result<(), StorageError> {
        let key = normalize_relative(path)?;
        if key.as_os_str().is_empty() {
            return Ok(());
        }

        let mut entries = self.entries.write().await;
        if let Some(Entry::File(_)) = entries.get(&key) {
            return Err(StorageError::AlreadyExists(key));
        }
        ensure_ancestors(&mut entries, &key)?;
        entries.insert(key, Entry::Directory);
        Ok(())
    }

    async fn exists(&self, path: &Path) -> Result<bool, StorageError> {
        let key = normalize_relative(path)?;
        let entries = self.entries.read().await;
        Ok(key.as_os_str().is_empty() || entries.contains_key(&key))
    }
}
