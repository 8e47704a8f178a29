//! Parsed test file cache.
//!
//! The runner never reads test files directly; it goes through a
//! [`ModuleCache`]. The session invalidates a file before every (re)run so a
//! run always sees the file's current content.

use crate::result::EnsayoResult;
use crate::testfile::TestFile;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A cached, parsed test file
#[derive(Debug, Clone)]
pub struct CachedModule {
    /// Parsed content
    pub file: Arc<TestFile>,
    /// SHA-256 of the source text, hex encoded
    pub hash: String,
}

/// Shared cache of parsed test files keyed by canonical path
#[derive(Debug, Clone, Default)]
pub struct ModuleCache {
    entries: Arc<Mutex<HashMap<PathBuf, CachedModule>>>,
}

impl ModuleCache {
    /// Create an empty cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, CachedModule>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn key(path: &Path) -> PathBuf {
        std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
    }

    /// Cached module for `path`, reading and parsing it on a miss
    pub fn load(&self, path: &Path) -> EnsayoResult<CachedModule> {
        let key = Self::key(path);
        if let Some(hit) = self.lock().get(&key) {
            return Ok(hit.clone());
        }

        let source = std::fs::read_to_string(path)?;
        let file = TestFile::from_yaml(&source, path)?;
        let module = CachedModule {
            file: Arc::new(file),
            hash: content_hash(&source),
        };
        tracing::trace!(path = %key.display(), hash = %module.hash, "cached test file");
        self.lock().insert(key, module.clone());
        Ok(module)
    }

    /// Drop the entry for `path`; returns whether one was present
    pub fn invalidate(&self, path: &Path) -> bool {
        let removed = self.lock().remove(&Self::key(path)).is_some();
        if removed {
            tracing::debug!(path = %path.display(), "invalidated cached test file");
        }
        removed
    }

    /// Drop every entry
    pub fn invalidate_all(&self) {
        self.lock().clear();
    }

    /// Whether `path` is cached
    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        self.lock().contains_key(&Self::key(path))
    }

    /// Number of cached files
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the cache is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Hex SHA-256 of `text`
#[must_use]
pub fn content_hash(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}
