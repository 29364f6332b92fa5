// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Operation-counting wrapper for TierStore backends.
//
// Wraps any `KvBackend` and transparently collects operation counts and
// latency sums. Useful for diagnostics and for checking which tier actually
// served a request.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::backend::KvBackend;
use crate::error::StorageError;

/// Accumulated statistics for a backend.
///
/// All counters are monotonically increasing until [`MeteredBackend::reset_stats`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackendStats {
    /// Number of `get` operations performed.
    pub get_count: u64,
    /// Number of records written, counting each pair of a `put_many`.
    pub put_count: u64,
    /// Number of `put_many` transactions issued.
    pub batch_count: u64,
    /// Number of `delete` operations performed.
    pub delete_count: u64,
    /// Number of `clear` operations performed.
    pub clear_count: u64,
    /// Number of operations that returned an error.
    pub error_count: u64,
    /// Cumulative wall-clock latency of all `get` calls, in milliseconds.
    pub get_latency_sum_ms: f64,
    /// Cumulative wall-clock latency of all writes, in milliseconds.
    pub put_latency_sum_ms: f64,
}

/// A backend wrapper that collects operation metrics.
///
/// # Example
///
/// ```rust
/// use tierstore_storage::memory::InMemoryBackend;
/// use tierstore_storage::metrics::MeteredBackend;
/// use tierstore_storage::backend::KvBackend;
///
/// # tokio_test::block_on(async {
/// let metered = MeteredBackend::new(InMemoryBackend::new());
///
/// metered.put("key", &serde_json::json!(1)).await.unwrap();
/// metered.get("key").await.unwrap();
///
/// let stats = metered.stats().await;
/// assert_eq!(stats.put_count, 1);
/// assert_eq!(stats.get_count, 1);
/// # });
/// ```
pub struct MeteredBackend<B: KvBackend> {
    inner: B,
    stats: Arc<RwLock<BackendStats>>,
}

impl<B: KvBackend> MeteredBackend<B> {
    /// Wrap `inner` with metrics collection.
    pub fn new(inner: B) -> Self {
        Self {
            inner,
            stats: Arc::new(RwLock::new(BackendStats::default())),
        }
    }

    /// Return a snapshot of the current statistics.
    pub async fn stats(&self) -> BackendStats {
        self.stats.read().await.clone()
    }

    /// Reset all statistics to zero.
    pub async fn reset_stats(&self) {
        *self.stats.write().await = BackendStats::default();
    }

    /// Return a reference to the inner backend.
    pub fn inner(&self) -> &B {
        &self.inner
    }

    async fn note_error<T>(&self, result: &Result<T, StorageError>) {
        if result.is_err() {
            self.stats.write().await.error_count += 1;
        }
    }
}

#[async_trait]
impl<B: KvBackend> KvBackend for MeteredBackend<B> {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let start = Instant::now();
        let result = self.inner.get(key).await;
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

        {
            let mut s = self.stats.write().await;
            s.get_count += 1;
            s.get_latency_sum_ms += elapsed_ms;
        }
        self.note_error(&result).await;

        result
    }

    async fn put(&self, key: &str, value: &Value) -> Result<(), StorageError> {
        let start = Instant::now();
        let result = self.inner.put(key, value).await;
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

        {
            let mut s = self.stats.write().await;
            s.put_count += 1;
            s.put_latency_sum_ms += elapsed_ms;
        }
        self.note_error(&result).await;

        result
    }

    async fn put_many(&self, entries: &[(String, Value)]) -> Result<(), StorageError> {
        let start = Instant::now();
        let result = self.inner.put_many(entries).await;
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

        {
            let mut s = self.stats.write().await;
            s.batch_count += 1;
            s.put_count += entries.len() as u64;
            s.put_latency_sum_ms += elapsed_ms;
        }
        self.note_error(&result).await;

        result
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        self.stats.write().await.delete_count += 1;
        let result = self.inner.delete(key).await;
        self.note_error(&result).await;
        result
    }

    async fn clear(&self) -> Result<(), StorageError> {
        self.stats.write().await.clear_count += 1;
        let result = self.inner.clear().await;
        self.note_error(&result).await;
        result
    }

    async fn count(&self) -> Result<usize, StorageError> {
        self.inner.count().await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
