//! Named key/value caches persisted as JSON documents.
//!
//! A [`Cache`] lives in memory and is mirrored to `<dir>/<name>.json` only
//! when [`Cache::save`] is called. Fresh data comes from a [`Refresh`]
//! strategy bound at construction.
//!
//! The entry map is only locked for the duration of a single read or
//! write, never across an upstream call. Two concurrent refreshes both merge
//! their results and the last one wins for keys they share.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{Result, ServerError};
use crate::io;

/// Source of fresh cache contents.
///
/// Implementations return new data and never touch the cache themselves.
pub trait Refresh<T>: Send + Sync {
    /// Fetch the entries of the cache called `name`. `rules` is the opaque
    /// value given to [`Cache::with_rules`].
    fn refresh(
        &self,
        name: &str,
        rules: &Value,
    ) -> impl Future<Output = Result<BTreeMap<String, T>>> + Send;
}

/// In-memory map of `String` keys to `T`, backed by a JSON document.
#[derive(Debug)]
pub struct Cache<T, R> {
    name: String,
    path: PathBuf,
    dir: PathBuf,
    refresher: R,
    rules: Value,
    entries: RwLock<BTreeMap<String, T>>,
}

impl<T, R> Cache<T, R>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync,
    R: Refresh<T>,
{
    /// Create a new, empty [`Cache`] stored under `dir`.
    pub fn new(name: impl Into<String>, dir: impl Into<PathBuf>, refresher: R) -> Self {
        let name = name.into();
        let dir = dir.into();

        Self {
            path: dir.join(format!("{name}.json")),
            name,
            dir,
            refresher,
            rules: Value::Null,
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// Set the rules handed to the refresh strategy.
    pub fn with_rules(mut self, rules: Value) -> Self {
        self.rules = rules;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Backing document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the document, or refresh and save when there is none.
    ///
    /// A corrupt document is an error and does not trigger a refresh.
    /// Calling it again reloads from disk.
    pub async fn init(&self) -> Result<()> {
        if self.load().await? {
            return Ok(());
        }

        tracing::info!(cache = %self.name, "no cache document; refreshing");
        self.refresh().await?;
        self.save().await
    }

    /// Replace the entries with the document on disk.
    ///
    /// `Ok(false)` when the document does not exist.
    pub async fn load(&self) -> Result<bool> {
        let Some(entries) = io::read_document::<BTreeMap<String, T>>(&self.path).await? else {
            tracing::debug!(cache = %self.name, path = %self.path.display(), "cache document does not exist");
            return Ok(false);
        };

        tracing::debug!(cache = %self.name, count = entries.len(), "loaded cache document");
        *self.write() = entries;

        Ok(true)
    }

    /// Fetch fresh entries and merge them, overwriting existing keys.
    /// Nothing is persisted.
    pub async fn refresh(&self) -> Result<()> {
        let fresh = self.refresher.refresh(&self.name, &self.rules).await?;
        let count = fresh.len();

        self.write().extend(fresh);
        tracing::info!(cache = %self.name, count, "refreshed cache");

        Ok(())
    }

    /// Write every entry to the backing document.
    pub async fn save(&self) -> Result<()> {
        io::ensure_directory(&self.dir).await?;

        let snapshot = self.entries();
        io::write_document(&self.path, &snapshot).await?;
        tracing::debug!(cache = %self.name, path = %self.path.display(), count = snapshot.len(), "saved cache document");

        Ok(())
    }

    pub fn has(&self, key: &str) -> bool {
        self.read().contains_key(key)
    }

    /// Copy of the value under `key`, [`ServerError::NotFound`] when absent.
    pub fn get(&self, key: &str) -> Result<T> {
        self.read().get(key).cloned().ok_or_else(|| {
            ServerError::NotFound(format!("key {key:?} of cache {:?}", self.name))
        })
    }

    pub fn get_or_default(&self, key: &str, fallback: T) -> T {
        self.read().get(key).cloned().unwrap_or(fallback)
    }

    /// Value under `key`. When absent and `refresh` is set, refresh, save
    /// and look again.
    ///
    /// `Ok(None)` means the key does not exist.
    pub async fn lookup(&self, key: &str, refresh: bool) -> Result<Option<T>> {
        let cached = self.read().get(key).cloned();
        if cached.is_some() || !refresh {
            return Ok(cached);
        }

        tracing::debug!(cache = %self.name, %key, "cache miss; refreshing");
        self.refresh().await?;
        self.save().await?;

        Ok(self.read().get(key).cloned())
    }

    /// Insert a new entry. Fails when `key` already exists.
    pub fn add(&self, key: impl Into<String>, value: T) -> Result<()> {
        let key = key.into();
        let mut entries = self.write();

        if entries.contains_key(&key) {
            return Err(ServerError::Api(format!(
                "key {key:?} already exists in cache {:?}",
                self.name
            )));
        }

        entries.insert(key, value);
        Ok(())
    }

    /// Insert or overwrite an entry.
    pub fn set(&self, key: impl Into<String>, value: T) {
        self.write().insert(key.into(), value);
    }

    /// Snapshot of every entry.
    pub fn entries(&self) -> BTreeMap<String, T> {
        self.read().clone()
    }

    pub fn keys(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    pub fn values(&self) -> Vec<T> {
        self.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, T>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, T>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}
