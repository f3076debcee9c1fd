//! Persistence layer: artifact storage, the pipeline graph store and run history

pub mod fs;
pub mod history;
pub mod memory;
pub mod pipeline_store;

#[cfg(feature = "sqlite")]
pub mod store;

pub use fs::FsArtifactStore;
pub use history::{InMemoryRunHistory, RunHistory, RunRecord};
pub use memory::InMemoryArtifactStore;
pub use pipeline_store::PipelineStore;

#[cfg(feature = "sqlite")]
pub use store::SqliteRunHistory;

use crate::core::{GraphError, InvalidSessionId};
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Error types for storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("already exists: {}", .0.display())]
    AlreadyExists(PathBuf),

    #[error("invalid storage path: {}", .0.display())]
    InvalidPath(PathBuf),

    #[error("directory not empty: {}", .0.display())]
    DirectoryNotEmpty(PathBuf),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid session metadata: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    InvalidSession(#[from] InvalidSessionId),
}

impl StorageError {
    /// Map an I/O error on `path` onto the storage taxonomy
    pub fn from_io(path: &Path, source: std::io::Error) -> Self {
        match source.kind() {
            std::io::ErrorKind::NotFound => StorageError::NotFound(path.to_path_buf()),
            std::io::ErrorKind::AlreadyExists => StorageError::AlreadyExists(path.to_path_buf()),
            _ => StorageError::Io {
                path: path.to_path_buf(),
                source,
            },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}

/// Create/overwrite policy for [`ArtifactStore::write`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    /// Allow creating a file that does not exist
    pub create: bool,
    /// Allow replacing a file that exists
    pub overwrite: bool,
}

impl WriteOptions {
    /// Create or replace
    pub const UPSERT: Self = Self {
        create: true,
        overwrite: true,
    };
    /// Only create; fail if present
    pub const CREATE_NEW: Self = Self {
        create: true,
        overwrite: false,
    };
    /// Only replace; fail if absent
    pub const REPLACE: Self = Self {
        create: false,
        overwrite: true,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Other,
}

/// One entry returned by [`ArtifactStore::list`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
}

/// Raw file storage keyed by relative path (`<session>/<filename>`)
///
/// Paths are always relative to the store's root; anything that would
/// escape it is rejected with [`StorageError::InvalidPath`].
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Read a whole file
    async fn read(&self, path: &Path) -> Result<Vec<u8>, StorageError>;

    /// Write a whole file, creating parent directories as needed
    async fn write(&self, path: &Path, contents: &[u8], options: WriteOptions) -> Result<(), StorageError>;

    /// Delete a file, or a directory (which must be empty unless `recursive`)
    async fn delete(&self, path: &Path, recursive: bool) -> Result<(), StorageError>;

    /// List the entries of a directory (the root is the empty path)
    async fn list(&self, dir: &Path) -> Result<Vec<DirEntry>, StorageError>;

    /// Create a directory and any missing ancestors
    async fn create_dir(&self, path: &Path) -> Result<(), StorageError>;

    /// Whether anything exists at `path`
    async fn exists(&self, path: &Path) -> Result<bool, StorageError>;
}

/// Normalize a store-relative path, dropping `.` and rejecting escapes
pub fn normalize_relative(path: &Path) -> Result<PathBuf, StorageError> {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(StorageError::InvalidPath(path.to_path_buf()));
            }
        }
    }
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_relative() {
        assert_eq!(normalize_relative(Path::new("./s/a.json")).unwrap(), PathBuf::from("s/a.json"));
        assert_eq!(normalize_relative(Path::new("")).unwrap(), PathBuf::new());
        assert!(normalize_relative(Path::new("../x")).is_err());
        assert!(normalize_relative(Path::new("/etc/passwd")).is_err());
    }

    #[test]
    fn test_io_errors_map_to_taxonomy() {
        let path = Path::new("s/a.json");
        let missing = std::io::Error::from(std::io::ErrorKind::NotFound);
        assert!(StorageError::from_io(path, missing).is_not_found());

        let denied = std::io::Error::from(std::io::ErrorKind::PermissionDenied);
        assert!(matches!(StorageError::from_io(path, denied), StorageError::Io { .. }));
    }
}
