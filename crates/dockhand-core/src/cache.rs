//! Identity-keyed cache of embedded image configurations.
//!
//! Reading a backing service's configuration means running its image, so the
//! raw output is kept per image identity. Entries are only written from a
//! live read and are never invalidated.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use dockhand_common::config::DockhandConfig;
use dockhand_common::error::{DockhandError, Result};
use dockhand_common::types::ImageIdentity;
use sha2::{Digest, Sha256};

/// Persistent key/value storage for raw configuration bytes.
pub trait ConfigurationStore {
    /// Loads the bytes stored under `key`, `None` when absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the store exists but cannot be read.
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Stores `bytes` under `key`, replacing any previous entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry cannot be written.
    fn save(&self, key: &str, bytes: &[u8]) -> Result<()>;

    /// Removes every entry. Succeeds when the store was never written.
    ///
    /// # Errors
    ///
    /// Returns an error if existing entries cannot be removed.
    fn clear(&self) -> Result<()>;
}

/// A directory with one file per entry.
///
/// The directory is created on first write. Entries are written to a
/// temporary file in the same directory and renamed into place, so readers
/// never observe a partial entry.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    /// Creates a store rooted at `root` without touching the filesystem.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the file backing `key`.
    #[must_use]
    pub fn entry_path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    fn io_error(path: &Path, source: std::io::Error) -> DockhandError {
        DockhandError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl ConfigurationStore for DirectoryStore {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.entry_path(key);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Self::io_error(&path, e)),
        }
    }

    fn save(&self, key: &str, bytes: &[u8]) -> Result<()> {
        std::fs::create_dir_all(&self.root).map_err(|e| Self::io_error(&self.root, e))?;

        let mut file =
            tempfile::NamedTempFile::new_in(&self.root).map_err(|e| Self::io_error(&self.root, e))?;
        file.write_all(bytes)
            .map_err(|e| Self::io_error(&self.root, e))?;

        let path = self.entry_path(key);
        let _ = file
            .persist(&path)
            .map_err(|e| Self::io_error(&path, e.error))?;
        tracing::debug!(path = %path.display(), bytes = bytes.len(), "cache entry written");
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match std::fs::remove_dir_all(&self.root) {
            Ok(()) => {
                tracing::info!(path = %self.root.display(), "configuration cache cleared");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Self::io_error(&self.root, e)),
        }
    }
}

/// An in-process store, for tests and one-shot resolutions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RefCell<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Returns whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl ConfigurationStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn save(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let _ = self
            .entries
            .borrow_mut()
            .insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.entries.borrow_mut().clear();
        Ok(())
    }
}

/// Cache of raw embedded configurations keyed by image identity.
pub struct ConfigurationCache {
    store: Box<dyn ConfigurationStore>,
}

impl std::fmt::Debug for ConfigurationCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigurationCache").finish_non_exhaustive()
    }
}

impl ConfigurationCache {
    /// Creates a cache over `store`.
    #[must_use]
    pub fn new(store: impl ConfigurationStore + 'static) -> Self {
        Self {
            store: Box::new(store),
        }
    }

    /// Creates a cache backed by a directory.
    #[must_use]
    pub fn in_directory(root: impl Into<PathBuf>) -> Self {
        Self::new(DirectoryStore::new(root))
    }

    /// Creates a cache in the configured cache directory.
    #[must_use]
    pub fn from_config(config: &DockhandConfig) -> Self {
        Self::in_directory(&config.cache_dir)
    }

    /// Creates a cache that lives as long as the process.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(MemoryStore::new())
    }

    /// Returns the storage key for an identity: the hex SHA-256 of its text.
    #[must_use]
    pub fn key_for(identity: &ImageIdentity) -> String {
        format!("{:x}", Sha256::digest(identity.as_str().as_bytes()))
    }

    /// Returns the cached configuration of `identity`, `None` on a miss.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn get(&self, identity: &ImageIdentity) -> Result<Option<Vec<u8>>> {
        let hit = self.store.load(&Self::key_for(identity))?;
        tracing::debug!(identity = %identity, hit = hit.is_some(), "configuration cache lookup");
        Ok(hit)
    }

    /// Stores the raw configuration of `identity`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    pub fn put(&self, identity: &ImageIdentity, raw: &[u8]) -> Result<()> {
        self.store.save(&Self::key_for(identity), raw)
    }

    /// Empties the cache.
    ///
    /// # Errors
    ///
    /// Returns an error if existing entries cannot be removed.
    pub fn clear(&self) -> Result<()> {
        self.store.clear()
    }
}
