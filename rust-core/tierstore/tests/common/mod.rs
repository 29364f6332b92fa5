// SPDX-License-Identifier: PMPL-1.0-or-later
//! Shared fakes for the TierStore integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tierstore::{
    InMemoryBackend, KvBackend, KvStore, KvStoreBuilder, MemoryConnector, MemoryFlatStore,
    MeteredBackend, PrimaryConnector, StorageError,
};

/// In-memory backend that counts every operation.
pub type CountingBackend = MeteredBackend<InMemoryBackend>;

/// A connector whose open fails while `failing` is set, counting attempts.
#[derive(Default)]
pub struct FailingConnector {
    failing: AtomicBool,
    opens: AtomicUsize,
    backend: InMemoryBackend,
}

impl FailingConnector {
    pub fn new() -> Self {
        Self {
            failing: AtomicBool::new(true),
            ..Default::default()
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// The backend handed out once the connector stops failing.
    pub fn backend(&self) -> &InMemoryBackend {
        &self.backend
    }
}

#[async_trait]
impl PrimaryConnector for FailingConnector {
    async fn open(
        &self,
        collection: &str,
        _version: u32,
    ) -> Result<Arc<dyn KvBackend>, StorageError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::Initialization(format!(
                "cannot open '{collection}': access denied"
            )));
        }
        Ok(Arc::new(self.backend.clone()))
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// An in-memory backend whose reads, writes and batches can be made to fail.
#[derive(Default)]
pub struct FlakyBackend {
    inner: InMemoryBackend,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    fail_batches: AtomicBool,
}

impl FlakyBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Fails `put`, `delete` and `clear`.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_batches(&self, fail: bool) {
        self.fail_batches.store(fail, Ordering::SeqCst);
    }

    pub fn inner(&self) -> &InMemoryBackend {
        &self.inner
    }

    fn check(flag: &AtomicBool, op: &str) -> Result<(), StorageError> {
        if flag.load(Ordering::SeqCst) {
            Err(StorageError::Transaction(format!("{op} aborted")))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl KvBackend for FlakyBackend {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Self::check(&self.fail_reads, "get")?;
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, value: &Value) -> Result<(), StorageError> {
        Self::check(&self.fail_writes, "put")?;
        self.inner.put(key, value).await
    }

    async fn put_many(&self, entries: &[(String, Value)]) -> Result<(), StorageError> {
        Self::check(&self.fail_batches, "put_many")?;
        self.inner.put_many(entries).await
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        Self::check(&self.fail_writes, "delete")?;
        self.inner.delete(key).await
    }

    async fn clear(&self) -> Result<(), StorageError> {
        Self::check(&self.fail_writes, "clear")?;
        self.inner.clear().await
    }

    async fn count(&self) -> Result<usize, StorageError> {
        self.inner.count().await
    }

    fn name(&self) -> &str {
        "flaky"
    }
}

/// A store over a fresh in-memory primary and flat fallback.
pub fn memory_store(collection: &str) -> KvStore {
    KvStoreBuilder::new(collection)
        .primary(MemoryConnector::new())
        .fallback(Arc::new(MemoryFlatStore::new()))
        .build()
        .expect("valid store")
}

/// A store whose primary is a counting backend the caller can inspect.
pub fn counted_store(collection: &str) -> (KvStore, Arc<CountingBackend>) {
    let backend = Arc::new(MeteredBackend::new(InMemoryBackend::new()));
    let store = KvStoreBuilder::new(collection)
        .primary(MemoryConnector::with_backend(backend.clone()))
        .fallback(Arc::new(MemoryFlatStore::new()))
        .build()
        .expect("valid store");
    (store, backend)
}

/// A store over a flaky primary with an inspectable flat fallback.
pub fn flaky_store(collection: &str) -> (KvStore, Arc<FlakyBackend>, Arc<MemoryFlatStore>) {
    let primary = Arc::new(FlakyBackend::new());
    let flat = Arc::new(MemoryFlatStore::new());
    let store = KvStoreBuilder::new(collection)
        .primary(MemoryConnector::with_backend(primary.clone()))
        .fallback(flat.clone())
        .build()
        .expect("valid store");
    (store, primary, flat)
}
