// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-memory storage backend for TierStore.
//
// Uses a `BTreeMap` wrapped in a tokio `RwLock` for thread-safe, ordered
// key-value storage. Intended for testing, development, and stores whose
// contents need not outlive the process.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::backend::{KvBackend, PrimaryConnector};
use crate::error::StorageError;

/// An in-memory backend backed by a sorted `BTreeMap`.
///
/// All data lives in process memory and is lost on drop. Clones share the
/// same map.
///
/// # Example
///
/// ```rust
/// use tierstore_storage::memory::InMemoryBackend;
/// use tierstore_storage::backend::KvBackend;
///
/// # tokio_test::block_on(async {
/// let store = InMemoryBackend::new();
/// store.put("hello", &serde_json::json!("world")).await.unwrap();
/// let val = store.get("hello").await.unwrap();
/// assert_eq!(val, Some(serde_json::json!("world")));
/// # });
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    data: Arc<RwLock<BTreeMap<String, Value>>>,
}

impl InMemoryBackend {
    /// Create a new, empty in-memory backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the number of keys currently stored.
    pub async fn len(&self) -> usize {
        self.data.read().await.len()
    }

    /// Return true if the store contains no keys.
    pub async fn is_empty(&self) -> bool {
        self.data.read().await.is_empty()
    }
}

#[async_trait]
impl KvBackend for InMemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let map = self.data.read().await;
        Ok(map.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &Value) -> Result<(), StorageError> {
        let mut map = self.data.write().await;
        map.insert(key.to_string(), value.clone());
        Ok(())
    }

    async fn put_many(&self, entries: &[(String, Value)]) -> Result<(), StorageError> {
        let mut map = self.data.write().await;
        for (key, value) in entries {
            map.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        let mut map = self.data.write().await;
        Ok(map.remove(key).is_some())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        self.data.write().await.clear();
        Ok(())
    }

    async fn count(&self) -> Result<usize, StorageError> {
        Ok(self.data.read().await.len())
    }

    fn name(&self) -> &str {
        "in-memory"
    }
}

/// Connector that hands out in-memory backends.
///
/// By default every `open` call creates a fresh, empty backend. A connector
/// built with [`MemoryConnector::with_backend`] always returns the supplied
/// backend instead, which lets a caller keep a handle to the same data.
#[derive(Clone, Default)]
pub struct MemoryConnector {
    shared: Option<Arc<dyn KvBackend>>,
}

impl MemoryConnector {
    /// A connector that opens a fresh backend per call.
    pub fn new() -> Self {
        Self::default()
    }

    /// A connector that always opens `backend`.
    pub fn with_backend(backend: Arc<dyn KvBackend>) -> Self {
        Self {
            shared: Some(backend),
        }
    }
}

impl std::fmt::Debug for MemoryConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryConnector")
            .field("shared", &self.shared.as_ref().map(|b| b.name().to_string()))
            .finish()
    }
}

#[async_trait]
impl PrimaryConnector for MemoryConnector {
    async fn open(
        &self,
        _collection: &str,
        _version: u32,
    ) -> Result<Arc<dyn KvBackend>, StorageError> {
        match &self.shared {
            Some(backend) => Ok(Arc::clone(backend)),
            None => Ok(Arc::new(InMemoryBackend::new())),
        }
    }

    fn name(&self) -> &str {
        "in-memory"
    }
}
