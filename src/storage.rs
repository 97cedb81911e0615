//! Filesystem contract for sources and derivatives.
//!
//! The generator never touches `std::fs` directly; it goes through
//! [`Storage`] so tests can count writes and so a derivative is only ever
//! observable complete. [`LocalStorage::save`] writes into a temporary
//! sibling ([`tempfile::NamedTempFile`]) and renames it over the target.

use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Byte-level file access used by the generator and the resolver.
pub trait Storage: Send + Sync {
    fn exists(&self, path: &Path) -> bool;

    fn read(&self, path: &Path) -> Result<Vec<u8>, StorageError>;

    /// Write `bytes` to `path`, creating parent directories. Readers see
    /// either the previous content or the complete new content.
    fn save(&self, path: &Path, bytes: &[u8]) -> Result<(), StorageError>;

    /// Size in bytes of an existing file.
    fn size(&self, path: &Path) -> Result<u64, StorageError>;
}

/// [`Storage`] backed by the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalStorage;

impl LocalStorage {
    pub fn new() -> Self {
        Self
    }
}

impl Storage for LocalStorage {
    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>, StorageError> {
        std::fs::read(path).map_err(|source| StorageError::Read {
            path: path.to_path_buf(),
            source,
        })
    }

    fn save(&self, path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
        let write_err = |source| StorageError::Write {
            path: path.to_path_buf(),
            source,
        };
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent).map_err(write_err)?;

        let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(write_err)?;
        tmp.write_all(bytes).map_err(write_err)?;
        tmp.persist(path).map_err(|e| write_err(e.error))?;
        Ok(())
    }

    fn size(&self, path: &Path) -> Result<u64, StorageError> {
        std::fs::metadata(path)
            .map(|m| m.len())
            .map_err(|source| StorageError::Read {
                path: path.to_path_buf(),
                source,
            })
    }
}
