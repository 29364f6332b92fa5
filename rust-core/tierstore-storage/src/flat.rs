// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Flat fallback backend for TierStore.
//
// A flat store is a synchronous, string-keyed, string-valued map with no
// transactions and no notion of collections. `FlatBackend` adapts one to the
// `KvBackend` contract: keys are prefixed with `"{collection}:"` so several
// collections can share a single flat store, and values are encoded as JSON
// text.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::backend::KvBackend;
use crate::error::StorageError;

/// A synchronous string-keyed store.
pub trait FlatStore: Send + Sync {
    /// Read the text stored under `key`.
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Store `value` under `key`, replacing any previous text.
    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove `key`. Returns `Ok(true)` if it was present.
    fn remove_item(&self, key: &str) -> Result<bool, StorageError>;

    /// Every key currently in the store, in ascending order.
    fn keys(&self) -> Result<Vec<String>, StorageError>;

    /// Remove every key.
    fn clear(&self) -> Result<(), StorageError>;

    /// Remove every key starting with `prefix` in one mutation. Returns the
    /// number of keys removed.
    fn remove_prefix(&self, prefix: &str) -> Result<usize, StorageError> {
        let mut removed = 0;
        for key in self.keys()?.into_iter().filter(|k| k.starts_with(prefix)) {
            if self.remove_item(&key)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// A human-readable name for this store, used in logging.
    fn name(&self) -> &str;
}

fn lock_items(
    items: &Mutex<BTreeMap<String, String>>,
) -> Result<MutexGuard<'_, BTreeMap<String, String>>, StorageError> {
    items
        .lock()
        .map_err(|_| StorageError::Transaction("flat store lock poisoned".to_string()))
}

fn retain_outside(items: &mut BTreeMap<String, String>, prefix: &str) -> usize {
    let before = items.len();
    items.retain(|k, _| !k.starts_with(prefix));
    before - items.len()
}

fn used_bytes(items: &BTreeMap<String, String>) -> usize {
    items.iter().map(|(k, v)| k.len() + v.len()).sum()
}

// ---------------------------------------------------------------------------
// MemoryFlatStore
// ---------------------------------------------------------------------------

/// A flat store held in process memory, with an optional byte quota.
///
/// When a quota is set, a write that would push the total key and value
/// length past it is rejected and leaves the store unchanged.
#[derive(Debug, Default)]
pub struct MemoryFlatStore {
    items: Mutex<BTreeMap<String, String>>,
    quota_bytes: Option<usize>,
}

impl MemoryFlatStore {
    /// An unbounded in-memory flat store.
    pub fn new() -> Self {
        Self::default()
    }

    /// An in-memory flat store that holds at most `quota_bytes` of keys and values.
    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            items: Mutex::new(BTreeMap::new()),
            quota_bytes: Some(quota_bytes),
        }
    }
}

impl FlatStore for MemoryFlatStore {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(lock_items(&self.items)?.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut items = lock_items(&self.items)?;
        if let Some(quota) = self.quota_bytes {
            let current = used_bytes(&items);
            let replaced = items.get(key).map(|v| key.len() + v.len()).unwrap_or(0);
            let needed = current - replaced + key.len() + value.len();
            if needed > quota {
                return Err(StorageError::Transaction(format!(
                    "flat store quota exceeded: {needed} bytes (max: {quota})"
                )));
            }
        }
        items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<bool, StorageError> {
        Ok(lock_items(&self.items)?.remove(key).is_some())
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(lock_items(&self.items)?.keys().cloned().collect())
    }

    fn clear(&self) -> Result<(), StorageError> {
        lock_items(&self.items)?.clear();
        Ok(())
    }

    fn remove_prefix(&self, prefix: &str) -> Result<usize, StorageError> {
        Ok(retain_outside(&mut *lock_items(&self.items)?, prefix))
    }

    fn name(&self) -> &str {
        "memory-flat"
    }
}

// ---------------------------------------------------------------------------
// FileFlatStore
// ---------------------------------------------------------------------------

/// A flat store persisted as a single JSON object file.
///
/// The whole map is loaded on open and rewritten on every mutation: written
/// to a sibling temp file, then renamed over the original, so a crash leaves
/// either the old or the new contents.
#[derive(Debug)]
pub struct FileFlatStore {
    path: PathBuf,
    items: Mutex<BTreeMap<String, String>>,
}

impl FileFlatStore {
    /// Open the store at `path`, creating parent directories as needed.
    ///
    /// A missing file is an empty store. A file that is not a JSON object of
    /// strings is reported as [`StorageError::CorruptedData`].
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let items = if path.exists() {
            let text = fs::read_to_string(&path)?;
            if text.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&text).map_err(|e| {
                    StorageError::CorruptedData(format!("flat store {}: {e}", path.display()))
                })?
            }
        } else {
            BTreeMap::new()
        };

        debug!(path = %path.display(), keys = items.len(), "opened flat store");

        Ok(Self {
            path,
            items: Mutex::new(items),
        })
    }

    /// Return the filesystem path of the store file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, items: &BTreeMap<String, String>) -> Result<(), StorageError> {
        let text = serde_json::to_string(items)
            .map_err(|e| StorageError::Serialization(format!("flat store: {e}")))?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, text)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Apply `mutate` to a copy of the map and persist it; the in-memory map
    /// only changes once the file write succeeded.
    fn mutate<T>(
        &self,
        mutate: impl FnOnce(&mut BTreeMap<String, String>) -> T,
    ) -> Result<T, StorageError> {
        let mut items = lock_items(&self.items)?;
        let mut next = items.clone();
        let out = mutate(&mut next);
        self.persist(&next)?;
        *items = next;
        Ok(out)
    }
}

impl FlatStore for FileFlatStore {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(lock_items(&self.items)?.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.mutate(|items| {
            items.insert(key.to_string(), value.to_string());
        })
    }

    fn remove_item(&self, key: &str) -> Result<bool, StorageError> {
        if !lock_items(&self.items)?.contains_key(key) {
            return Ok(false);
        }
        self.mutate(|items| items.remove(key).is_some())
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(lock_items(&self.items)?.keys().cloned().collect())
    }

    fn clear(&self) -> Result<(), StorageError> {
        self.mutate(|items| items.clear())
    }

    fn remove_prefix(&self, prefix: &str) -> Result<usize, StorageError> {
        if !lock_items(&self.items)?
            .keys()
            .any(|k| k.starts_with(prefix))
        {
            return Ok(0);
        }
        self.mutate(|items| retain_outside(items, prefix))
    }

    fn name(&self) -> &str {
        "file-flat"
    }
}

// ---------------------------------------------------------------------------
// FlatBackend
// ---------------------------------------------------------------------------

/// Adapts a [`FlatStore`] to the [`KvBackend`] contract for one collection.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use tierstore_storage::backend::KvBackend;
/// use tierstore_storage::flat::{FlatBackend, FlatStore, MemoryFlatStore};
///
/// # tokio_test::block_on(async {
/// let flat = Arc::new(MemoryFlatStore::new());
/// let backend = FlatBackend::new(flat.clone(), "settings");
///
/// backend.put("theme", &serde_json::json!({"dark": true})).await.unwrap();
/// assert_eq!(
///     flat.get_item("settings:theme").unwrap().as_deref(),
///     Some(r#"{"dark":true}"#)
/// );
/// # });
/// ```
pub struct FlatBackend {
    store: Arc<dyn FlatStore>,
    namespace: String,
}

impl FlatBackend {
    /// Bind `store` to `collection`.
    pub fn new(store: Arc<dyn FlatStore>, collection: &str) -> Self {
        Self {
            store,
            namespace: collection.to_string(),
        }
    }

    /// Return the collection this backend is bound to.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn prefixed_key(&self, key: &str) -> String {
        format!("{}:{}", self.namespace, key)
    }

    fn prefix(&self) -> String {
        format!("{}:", self.namespace)
    }

    fn collection_keys(&self) -> Result<Vec<String>, StorageError> {
        let prefix = self.prefix();
        Ok(self
            .store
            .keys()?
            .into_iter()
            .filter(|k| k.starts_with(&prefix))
            .collect())
    }
}

impl std::fmt::Debug for FlatBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlatBackend")
            .field("store", &self.store.name())
            .field("namespace", &self.namespace)
            .finish()
    }
}

#[async_trait]
impl KvBackend for FlatBackend {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        match self.store.get_item(&self.prefixed_key(key))? {
            Some(text) => {
                let value = serde_json::from_str(&text).map_err(|err| {
                    StorageError::CorruptedData(format!(
                        "failed to decode value for key '{key}': {err}"
                    ))
                })?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: &Value) -> Result<(), StorageError> {
        let text = serde_json::to_string(value).map_err(|err| {
            StorageError::Serialization(format!("failed to encode value for key '{key}': {err}"))
        })?;
        self.store.set_item(&self.prefixed_key(key), &text)
    }

    async fn put_many(&self, entries: &[(String, Value)]) -> Result<(), StorageError> {
        for (key, value) in entries {
            self.put(key, value).await?;
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        self.store.remove_item(&self.prefixed_key(key))
    }

    async fn clear(&self) -> Result<(), StorageError> {
        self.store.remove_prefix(&self.prefix())?;
        Ok(())
    }

    async fn count(&self) -> Result<usize, StorageError> {
        Ok(self.collection_keys()?.len())
    }

    fn name(&self) -> &str {
        self.store.name()
    }
}
