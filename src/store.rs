//! Key-value store for feedback and corrections.
//!
//! Lists hold newest-first records trimmed to a maximum length. Hash fields
//! may carry an expiry. [`FallbackStore`] wraps a persistent store and
//! switches to memory the first time the primary errors.

use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::StoreConfig;
use crate::error::{GnosisError, Result};

/// List and hash operations used by the feedback loop.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Push `value` to the front of `key` and trim the list to `max_len`.
    async fn list_push(&self, key: &str, value: String, max_len: usize) -> Result<()>;

    /// Up to `count` items starting at `start`, newest first.
    async fn list_range(&self, key: &str, start: usize, count: usize) -> Result<Vec<String>>;

    /// Set a hash field. With a `ttl` the field disappears once it elapses.
    async fn hash_set(
        &self,
        key: &str,
        field: &str,
        value: String,
        ttl: Option<Duration>,
    ) -> Result<()>;

    /// Read a live hash field.
    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>>;

    /// Delete a hash field. Returns whether a live field was removed.
    async fn hash_del(&self, key: &str, field: &str) -> Result<bool>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct HashEntry {
    value: String,
    /// Unix seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<i64>,
}

impl HashEntry {
    fn is_live(&self, now: i64) -> bool {
        self.expires_at.is_none_or(|t| t > now)
    }
}

/// Shared shape of the memory and file stores.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct StoreData {
    lists: BTreeMap<String, VecDeque<String>>,
    hashes: BTreeMap<String, BTreeMap<String, HashEntry>>,
}

fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

impl StoreData {
    fn list_push(&mut self, key: &str, value: String, max_len: usize) {
        let list = self.lists.entry(key.to_owned()).or_default();
        list.push_front(value);
        list.truncate(max_len);
        if list.is_empty() {
            self.lists.remove(key);
        }
    }

    fn list_range(&self, key: &str, start: usize, count: usize) -> Vec<String> {
        self.lists
            .get(key)
            .map(|l| l.iter().skip(start).take(count).cloned().collect())
            .unwrap_or_default()
    }

    fn hash_set(&mut self, key: &str, field: &str, value: String, ttl: Option<Duration>) {
        let expires_at = ttl.map(|t| {
            let secs = i64::try_from(t.as_secs()).unwrap_or(i64::MAX);
            now_secs().saturating_add(secs)
        });
        self.hashes
            .entry(key.to_owned())
            .or_default()
            .insert(field.to_owned(), HashEntry { value, expires_at });
    }

    fn hash_get(&mut self, key: &str, field: &str) -> Option<String> {
        let now = now_secs();
        let hash = self.hashes.get_mut(key)?;
        match hash.get(field) {
            Some(entry) if entry.is_live(now) => Some(entry.value.clone()),
            Some(_) => {
                hash.remove(field);
                None
            }
            None => None,
        }
    }

    fn hash_del(&mut self, key: &str, field: &str) -> bool {
        let now = now_secs();
        let Some(hash) = self.hashes.get_mut(key) else {
            return false;
        };
        let removed = hash.remove(field).is_some_and(|e| e.is_live(now));
        if hash.is_empty() {
            self.hashes.remove(key);
        }
        removed
    }
}

fn lock(data: &Mutex<StoreData>) -> Result<MutexGuard<'_, StoreData>> {
    data.lock()
        .map_err(|_| GnosisError::Store("store lock poisoned".into()))
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: Mutex<StoreData>,
}

impl MemoryStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn list_push(&self, key: &str, value: String, max_len: usize) -> Result<()> {
        lock(&self.data)?.list_push(key, value, max_len);
        Ok(())
    }

    async fn list_range(&self, key: &str, start: usize, count: usize) -> Result<Vec<String>> {
        Ok(lock(&self.data)?.list_range(key, start, count))
    }

    async fn hash_set(
        &self,
        key: &str,
        field: &str,
        value: String,
        ttl: Option<Duration>,
    ) -> Result<()> {
        lock(&self.data)?.hash_set(key, field, value, ttl);
        Ok(())
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>> {
        Ok(lock(&self.data)?.hash_get(key, field))
    }

    async fn hash_del(&self, key: &str, field: &str) -> Result<bool> {
        Ok(lock(&self.data)?.hash_del(key, field))
    }
}

/// Store persisted as a JSON snapshot after every write.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    data: Mutex<StoreData>,
}

impl FileStore {
    /// Open `path`, starting empty when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`GnosisError::Store`] if the file exists but is not a valid
    /// snapshot, or [`GnosisError::Io`] if it cannot be read.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let data = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                GnosisError::Store(format!("invalid store snapshot {}: {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoreData::default(),
            Err(e) => return Err(e.into()),
        };
        debug!(path = %path.display(), "opened file store");
        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    /// Snapshot location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the snapshot to a sibling temp file, then rename over the target.
    fn persist(&self, data: &StoreData) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                GnosisError::Store(format!(
                    "cannot create store directory {}: {e}",
                    parent.display()
                ))
            })?;
        }
        let json = serde_json::to_vec_pretty(data)
            .map_err(|e| GnosisError::Store(format!("cannot serialize store: {e}")))?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| {
            GnosisError::Store(format!("cannot write {}: {e}", tmp.display()))
        })?;
        std::fs::rename(&tmp, &self.path).map_err(|e| {
            GnosisError::Store(format!("cannot replace {}: {e}", self.path.display()))
        })
    }

    /// Apply `f` to a copy, persist it, and only then publish it in memory.
    fn mutate<T>(&self, f: impl FnOnce(&mut StoreData) -> T) -> Result<T> {
        let mut data = lock(&self.data)?;
        let mut next = data.clone();
        let out = f(&mut next);
        self.persist(&next)?;
        *data = next;
        Ok(out)
    }
}

#[async_trait]
impl KvStore for FileStore {
    async fn list_push(&self, key: &str, value: String, max_len: usize) -> Result<()> {
        self.mutate(|d| d.list_push(key, value, max_len))
    }

    async fn list_range(&self, key: &str, start: usize, count: usize) -> Result<Vec<String>> {
        Ok(lock(&self.data)?.list_range(key, start, count))
    }

    async fn hash_set(
        &self,
        key: &str,
        field: &str,
        value: String,
        ttl: Option<Duration>,
    ) -> Result<()> {
        self.mutate(|d| d.hash_set(key, field, value, ttl))
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>> {
        // Expired fields are dropped from memory; the snapshot catches up on
        // the next write.
        Ok(lock(&self.data)?.hash_get(key, field))
    }

    async fn hash_del(&self, key: &str, field: &str) -> Result<bool> {
        self.mutate(|d| d.hash_del(key, field))
    }
}

/// A primary store that degrades to memory once it fails.
pub struct FallbackStore {
    primary: Arc<dyn KvStore>,
    memory: MemoryStore,
    degraded: AtomicBool,
}

impl std::fmt::Debug for FallbackStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackStore")
            .field("degraded", &self.is_degraded())
            .finish_non_exhaustive()
    }
}

impl FallbackStore {
    /// Wrap `primary`.
    pub fn new(primary: Arc<dyn KvStore>) -> Self {
        Self {
            primary,
            memory: MemoryStore::new(),
            degraded: AtomicBool::new(false),
        }
    }

    /// Whether calls are being served from memory.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    fn degrade(&self, op: &str, error: &GnosisError) {
        if !self.degraded.swap(true, Ordering::Relaxed) {
            warn!(op, error = %error, "key-value store unavailable, using in-memory store");
        }
    }
}

#[async_trait]
impl KvStore for FallbackStore {
    async fn list_push(&self, key: &str, value: String, max_len: usize) -> Result<()> {
        if !self.is_degraded() {
            match self.primary.list_push(key, value.clone(), max_len).await {
                Ok(()) => return Ok(()),
                Err(e) => self.degrade("list_push", &e),
            }
        }
        self.memory.list_push(key, value, max_len).await
    }

    async fn list_range(&self, key: &str, start: usize, count: usize) -> Result<Vec<String>> {
        if !self.is_degraded() {
            match self.primary.list_range(key, start, count).await {
                Ok(items) => return Ok(items),
                Err(e) => self.degrade("list_range", &e),
            }
        }
        self.memory.list_range(key, start, count).await
    }

    async fn hash_set(
        &self,
        key: &str,
        field: &str,
        value: String,
        ttl: Option<Duration>,
    ) -> Result<()> {
        if !self.is_degraded() {
            match self.primary.hash_set(key, field, value.clone(), ttl).await {
                Ok(()) => return Ok(()),
                Err(e) => self.degrade("hash_set", &e),
            }
        }
        self.memory.hash_set(key, field, value, ttl).await
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>> {
        if !self.is_degraded() {
            match self.primary.hash_get(key, field).await {
                Ok(v) => return Ok(v),
                Err(e) => self.degrade("hash_get", &e),
            }
        }
        self.memory.hash_get(key, field).await
    }

    async fn hash_del(&self, key: &str, field: &str) -> Result<bool> {
        if !self.is_degraded() {
            match self.primary.hash_del(key, field).await {
                Ok(v) => return Ok(v),
                Err(e) => self.degrade("hash_del", &e),
            }
        }
        self.memory.hash_del(key, field).await
    }
}

/// Store for `config`: a file store behind a fallback wrapper when a path is
/// configured, memory otherwise. An unreadable snapshot also yields memory.
pub fn open_store(config: &StoreConfig) -> Arc<dyn KvStore> {
    let Some(path) = &config.path else {
        return Arc::new(MemoryStore::new());
    };
    match FileStore::open(path) {
        Ok(store) => Arc::new(FallbackStore::new(Arc::new(store))),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot open file store, using in-memory store");
            Arc::new(MemoryStore::new())
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[tokio::test]
    async fn list_is_newest_first_and_trimmed() {
        let store = MemoryStore::new();
        for i in 0..5 {
            store.list_push("l", i.to_string(), 3).await.unwrap();
        }
        assert_eq!(store.list_range("l", 0, 10).await.unwrap(), vec!["4", "3", "2"]);
        assert_eq!(store.list_range("l", 1, 1).await.unwrap(), vec!["3"]);
        assert!(store.list_range("missing", 0, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn hash_set_get_delete() {
        let store = MemoryStore::new();
        store.hash_set("h", "a", "1".into(), None).await.unwrap();
        assert_eq!(store.hash_get("h", "a").await.unwrap().as_deref(), Some("1"));
        assert!(store.hash_del("h", "a").await.unwrap());
        assert!(!store.hash_del("h", "a").await.unwrap());
        assert!(store.hash_get("h", "a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_fields_are_invisible() {
        let store = MemoryStore::new();
        store
            .hash_set("h", "gone", "x".into(), Some(Duration::ZERO))
            .await
            .unwrap();
        store
            .hash_set("h", "kept", "y".into(), Some(Duration::from_secs(3600)))
            .await
            .unwrap();
        assert!(store.hash_get("h", "gone").await.unwrap().is_none());
        assert_eq!(store.hash_get("h", "kept").await.unwrap().as_deref(), Some("y"));
    }

    #[tokio::test]
    async fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        {
            let store = FileStore::open(&path).unwrap();
            store.list_push("l", "a".into(), 10).await.unwrap();
            store.hash_set("h", "f", "v".into(), None).await.unwrap();
        }
        let store = FileStore::open(&path).unwrap();
        assert_eq!(store.list_range("l", 0, 10).await.unwrap(), vec!["a"]);
        assert_eq!(store.hash_get("h", "f").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn failed_write_leaves_memory_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let parent = dir.path().join("state");
        let store = FileStore::open(parent.join("store.json")).unwrap();
        store.list_push("l", "kept".into(), 10).await.unwrap();

        std::fs::remove_dir_all(&parent).unwrap();
        std::fs::write(&parent, "not a directory").unwrap();

        let err = store.list_push("l", "lost".into(), 10).await.unwrap_err();
        assert_eq!(err.code(), "STORE_FAILED");
        assert_eq!(store.list_range("l", 0, 10).await.unwrap(), vec!["kept"]);
        assert!(store.hash_set("h", "f", "v".into(), None).await.is_err());
        assert!(store.hash_get("h", "f").await.unwrap().is_none());
    }

    #[test]
    fn corrupt_snapshot_is_store_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = FileStore::open(&path).unwrap_err();
        assert_eq!(err.code(), "STORE_FAILED");
    }

    struct Broken;

    #[async_trait]
    impl KvStore for Broken {
        async fn list_push(&self, _: &str, _: String, _: usize) -> Result<()> {
            Err(GnosisError::Store("down".into()))
        }
        async fn list_range(&self, _: &str, _: usize, _: usize) -> Result<Vec<String>> {
            Err(GnosisError::Store("down".into()))
        }
        async fn hash_set(&self, _: &str, _: &str, _: String, _: Option<Duration>) -> Result<()> {
            Err(GnosisError::Store("down".into()))
        }
        async fn hash_get(&self, _: &str, _: &str) -> Result<Option<String>> {
            Err(GnosisError::Store("down".into()))
        }
        async fn hash_del(&self, _: &str, _: &str) -> Result<bool> {
            Err(GnosisError::Store("down".into()))
        }
    }

    #[tokio::test]
    async fn fallback_degrades_transparently() {
        let store = FallbackStore::new(Arc::new(Broken));
        store.list_push("l", "a".into(), 10).await.unwrap();
        assert!(store.is_degraded());
        assert_eq!(store.list_range("l", 0, 10).await.unwrap(), vec!["a"]);
        store.hash_set("h", "f", "v".into(), None).await.unwrap();
        assert_eq!(store.hash_get("h", "f").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn open_store_without_path_is_memory() {
        let store = open_store(&StoreConfig::default());
        store.list_push("l", "a".into(), 1).await.unwrap();
        assert_eq!(store.list_range("l", 0, 1).await.unwrap(), vec!["a"]);
    }
}
