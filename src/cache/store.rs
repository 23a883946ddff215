//! Cache storage for upstream responses
//!
//! `CacheStore` is the seam between the request algorithm and where entries
//! live. `FsCacheStore` keeps one JSON file per key under a base directory;
//! `MemoryCacheStore` keeps entries in-process.
//!
//! Stale files are never pruned. An entry is only replaced when a later fetch
//! for the same key overwrites it.

use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::sync::RwLock;

use super::key::CacheKey;

/// Directory name used when no platform cache directory is available
const FALLBACK_DIR_NAME: &str = "twitter-api-proxy";

/// A cached upstream response as stored on disk
///
/// Serialized as `{ "_cached": <unix seconds>, "data": <payload> }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// When the payload was fetched from upstream, in seconds since the epoch
    #[serde(rename = "_cached")]
    pub fetched_at: i64,
    /// The upstream response body
    #[serde(rename = "data")]
    pub payload: Value,
}

/// Errors from reading or writing cache entries
#[derive(Debug, Error)]
pub enum CacheError {
    /// The cache file exists but could not be read
    #[error("failed to read cache file {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    /// The cache file is not a valid entry
    #[error("corrupt cache file {}: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// The cache file could not be written
    #[error("failed to write cache file {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },

    /// The entry could not be serialized
    #[error("failed to serialize cache entry: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The background write task did not complete
    #[error("cache write task failed: {0}")]
    Task(String),
}

/// Storage backend for cache entries
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Reads the entry for `key`
    ///
    /// Returns `Ok(None)` when there is no entry and `Err` when an entry exists
    /// but cannot be read. Callers treat both as a miss.
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError>;

    /// Replaces the entry for `key`
    ///
    /// Readers observe either the previous entry or the new one, never a
    /// partial write.
    async fn put(&self, key: &CacheKey, entry: &CacheEntry) -> Result<(), CacheError>;
}

/// Stores each entry as a JSON file under a base directory
#[derive(Debug, Clone)]
pub struct FsCacheStore {
    /// Directory where cache files are stored
    cache_dir: PathBuf,
}

impl FsCacheStore {
    /// Creates a store in the platform cache directory
    ///
    /// Uses `~/.cache/twitter-api-proxy/` on Linux, or the system temp
    /// directory when no home directory can be determined.
    pub fn new() -> Self {
        Self::with_dir(default_cache_dir())
    }

    /// Creates a store rooted at a specific directory
    pub fn with_dir(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    /// The directory cache files are written to
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Returns the path to the cache file for the given key
    pub fn cache_path(&self, key: &CacheKey) -> PathBuf {
        self.cache_dir.join(key.as_str())
    }
}

impl Default for FsCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

/// The default cache directory for this platform
pub fn default_cache_dir() -> PathBuf {
    ProjectDirs::from("", "", FALLBACK_DIR_NAME)
        .map(|dirs| dirs.cache_dir().to_path_buf())
        .unwrap_or_else(|| std::env::temp_dir().join(FALLBACK_DIR_NAME))
}

#[async_trait]
impl CacheStore for FsCacheStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        let path = self.cache_path(key);
        let content = match tokio::fs::read(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(CacheError::Read { path, source }),
        };

        serde_json::from_slice(&content)
            .map(Some)
            .map_err(|source| CacheError::Corrupt { path, source })
    }

    async fn put(&self, key: &CacheKey, entry: &CacheEntry) -> Result<(), CacheError> {
        let json = serde_json::to_vec_pretty(entry)?;
        let dir = self.cache_dir.clone();
        let path = self.cache_path(key);

        tokio::task::spawn_blocking(move || write_atomically(&dir, &path, &json))
            .await
            .map_err(|e| CacheError::Task(e.to_string()))?
    }
}

/// Writes `contents` to a temp file in `dir` and renames it over `path`
///
/// The temp file is deleted when dropped, so every early return discards it.
fn write_atomically(dir: &Path, path: &Path, contents: &[u8]) -> Result<(), CacheError> {
    let write_err = |source| CacheError::Write {
        path: path.to_path_buf(),
        source,
    };

    std::fs::create_dir_all(dir).map_err(write_err)?;
    let mut file = NamedTempFile::new_in(dir).map_err(write_err)?;
    file.write_all(contents).map_err(write_err)?;
    file.as_file().sync_all().map_err(write_err)?;
    file.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}

/// Keeps entries in memory for the lifetime of the process
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
}

impl MemoryCacheStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether no entries are stored
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &CacheKey, entry: &CacheEntry) -> Result<(), CacheError> {
        self.entries.write().await.insert(key.clone(), entry.clone());
        Ok(())
    }
}
