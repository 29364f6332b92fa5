// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// KeyValue facade.
//
// `KvStore` is the error boundary of the crate: every storage failure ends in
// a fallback attempt or a falsy result plus a log line, never an `Err`.
// Reads consult the write-through cache first; writes always land in the
// cache and then in the active tier, retrying on the fallback when the
// primary refuses them.

use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};

use tierstore_storage::{FlatBackend, FlatStore, KvBackend, PrimaryConnector, StorageError};

use crate::batch::BatchController;
use crate::cache::RecordCache;
use crate::config::StoreConfig;
use crate::device::DeviceProfile;
use crate::error::{TierError, TierResult};
use crate::init::{ActiveTier, BackendCell, BackendState};
use crate::monitor::{MemoryMonitor, NoopMonitor};
use crate::perf::{PerformanceMetrics, PerformanceMonitor};
use crate::pressure::{PressureHandler, PressureSubscription, SharedCache};
use crate::writer::{stream_chunks, BatchReport, ChunkOutcome};

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Assembles a [`KvStore`] from its injected collaborators.
pub struct KvStoreBuilder {
    collection: String,
    config: StoreConfig,
    primary: Option<Arc<dyn PrimaryConnector>>,
    fallback: Option<Arc<dyn KvBackend>>,
    monitor: Option<Arc<dyn MemoryMonitor>>,
    device: DeviceProfile,
}

impl KvStoreBuilder {
    /// Start a builder for `collection`.
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            config: StoreConfig::default(),
            primary: None,
            fallback: None,
            monitor: None,
            device: DeviceProfile::default(),
        }
    }

    pub fn config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Connector used for the single primary open.
    pub fn primary(mut self, connector: impl PrimaryConnector + 'static) -> Self {
        self.primary = Some(Arc::new(connector));
        self
    }

    /// Like [`KvStoreBuilder::primary`], for a connector that is shared.
    pub fn shared_primary(mut self, connector: Arc<dyn PrimaryConnector>) -> Self {
        self.primary = Some(connector);
        self
    }

    /// Use a flat store as the fallback, namespaced by the collection name.
    pub fn fallback(mut self, store: Arc<dyn FlatStore>) -> Self {
        self.fallback = Some(Arc::new(FlatBackend::new(store, &self.collection)));
        self
    }

    /// Use an arbitrary backend as the fallback.
    pub fn fallback_backend(mut self, backend: Arc<dyn KvBackend>) -> Self {
        self.fallback = Some(backend);
        self
    }

    /// Source of pressure events. Defaults to [`NoopMonitor`].
    pub fn monitor(mut self, monitor: Arc<dyn MemoryMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn device(mut self, device: DeviceProfile) -> Self {
        self.device = device;
        self
    }

    /// Validate and assemble. The primary is opened lazily.
    pub fn build(self) -> TierResult<KvStore> {
        self.config.validate()?;
        if self.collection.is_empty() {
            return Err(TierError::InvalidConfig(
                "collection name must not be empty".into(),
            ));
        }
        let primary = self
            .primary
            .ok_or_else(|| TierError::MissingPrimary(self.collection.clone()))?;

        let cache: SharedCache = Arc::new(Mutex::new(RecordCache::new()));
        let batch = Arc::new(BatchController::new(&self.config, &self.device));
        let pressure = Arc::new(PressureHandler::new(
            &self.collection,
            &self.config,
            Arc::clone(&cache),
            Arc::clone(&batch),
        ));

        if self.fallback.is_none() {
            debug!(collection = %self.collection, "no fallback configured");
        }

        Ok(KvStore {
            name: self.collection,
            config: self.config,
            primary,
            fallback: self.fallback,
            monitor: self
                .monitor
                .unwrap_or_else(|| Arc::new(NoopMonitor::new())),
            cell: BackendCell::new(),
            cache,
            batch,
            pressure,
            subscription: Mutex::new(None),
            perf: PerformanceMonitor::new(false),
        })
    }

    /// Build, then open the primary straight away if `eager_init` is set.
    pub async fn open(self) -> TierResult<KvStore> {
        let store = self.build()?;
        if store.config.eager_init {
            let tier = store.ensure_ready().await;
            debug!(collection = %store.name, %tier, "eager initialization finished");
        }
        Ok(store)
    }
}

impl std::fmt::Debug for KvStoreBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvStoreBuilder")
            .field("collection", &self.collection)
            .field("config", &self.config)
            .field("has_primary", &self.primary.is_some())
            .field("has_fallback", &self.fallback.is_some())
            .field("device", &self.device)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// KvStore
// ---------------------------------------------------------------------------

/// A named collection served by a primary tier with a flat fallback.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use serde_json::json;
/// use tierstore::{KvStoreBuilder, MemoryConnector, MemoryFlatStore};
///
/// # tokio_test::block_on(async {
/// let store = KvStoreBuilder::new("settings")
///     .primary(MemoryConnector::new())
///     .fallback(Arc::new(MemoryFlatStore::new()))
///     .build()
///     .unwrap();
///
/// assert_eq!(store.set("theme", json!({"dark": true})).await, Some("theme".into()));
/// assert_eq!(store.get("theme").await, Some(json!({"dark": true})));
/// # });
/// ```
pub struct KvStore {
    name: String,
    config: StoreConfig,
    primary: Arc<dyn PrimaryConnector>,
    fallback: Option<Arc<dyn KvBackend>>,
    monitor: Arc<dyn MemoryMonitor>,
    cell: BackendCell,
    cache: SharedCache,
    batch: Arc<BatchController>,
    pressure: Arc<PressureHandler>,
    subscription: Mutex<Option<PressureSubscription>>,
    perf: PerformanceMonitor,
}

impl KvStore {
    /// Shorthand for [`KvStoreBuilder::new`].
    pub fn builder(collection: impl Into<String>) -> KvStoreBuilder {
        KvStoreBuilder::new(collection)
    }

    // -- public operations --------------------------------------------------

    /// Read `key`. `None` when absent or when every tier failed.
    #[instrument(skip(self), fields(collection = %self.name))]
    pub async fn get(&self, key: &str) -> Option<Value> {
        self.perf.track(self.read(key)).await
    }

    /// Read `key` and deserialize it as `T`.
    pub async fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get(key).await?;
        match serde_json::from_value(value) {
            Ok(typed) => Some(typed),
            Err(e) => {
                warn!(collection = %self.name, key, error = %e, "stored value has unexpected shape");
                None
            }
        }
    }

    /// Store `value` under `key`. Returns the key on success.
    #[instrument(skip(self, value), fields(collection = %self.name))]
    pub async fn set(&self, key: &str, value: impl Serialize) -> Option<String> {
        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(e) => {
                let err = StorageError::Serialization(e.to_string());
                warn!(key, error = %err, "value rejected");
                return None;
            }
        };
        self.perf.track(self.write(key, value)).await
    }

    /// Remove `key` from the cache and the active tier.
    #[instrument(skip(self), fields(collection = %self.name))]
    pub async fn remove_item(&self, key: &str) -> bool {
        self.perf.track(self.delete(key)).await
    }

    /// Remove every record in the collection.
    #[instrument(skip(self), fields(collection = %self.name))]
    pub async fn clear(&self) -> bool {
        self.perf.track(self.clear_all()).await
    }

    /// Write every pair, in chunks sized by the current batch size.
    ///
    /// Returns `true` once every pair has been attempted. That does not mean
    /// every pair persisted; use [`KvStore::batch_set_with_report`] or read
    /// the keys back for that.
    pub async fn batch_set<I, K, V>(&self, pairs: I) -> bool
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Serialize,
    {
        self.batch_set_with_report(pairs).await;
        true
    }

    /// Like [`KvStore::batch_set`], reporting what happened to each chunk.
    #[instrument(skip_all, fields(collection = %self.name))]
    pub async fn batch_set_with_report<I, K, V>(&self, pairs: I) -> BatchReport
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Serialize,
    {
        let mut unserializable = 0;
        let encoded: Vec<(String, Value)> = pairs
            .into_iter()
            .filter_map(|(key, value)| {
                let key = key.into();
                match serde_json::to_value(value) {
                    Ok(value) => Some((key, value)),
                    Err(e) => {
                        warn!(key = %key, error = %e, "pair skipped, value not serializable");
                        unserializable += 1;
                        None
                    }
                }
            })
            .collect();

        let mut report = self.perf.track(self.write_batch(encoded)).await;
        report.failed += unserializable;
        report
    }

    /// Turn pressure handling on or off.
    ///
    /// Enabling subscribes to the monitor, bounds the cache and resets the
    /// batch size to its baseline. Disabling unsubscribes, lifts the bound and
    /// also resets the batch size. A call that does not change the state
    /// leaves the batch size alone.
    pub fn enable_memory_optimization(&self, enabled: bool) -> &Self {
        let mut slot = match self.subscription.lock() {
            Ok(slot) => slot,
            Err(_) => {
                warn!(collection = %self.name, "optimization state poisoned, left unchanged");
                return self;
            }
        };

        if enabled {
            if slot.is_none() {
                self.batch.reset();
                self.monitor.start_monitoring();
                *slot = Some(self.pressure.subscribe(self.monitor.as_ref()));
            }
            self.set_cache_capacity(Some(self.config.optimized_cache_capacity));
        } else {
            if let Some(subscription) = slot.take() {
                self.batch.reset();
                subscription.cancel(self.monitor.as_ref());
            }
            self.set_cache_capacity(None);
        }

        info!(
            collection = %self.name,
            enabled,
            batch_size = self.batch.current(),
            "memory optimization toggled"
        );
        self
    }

    /// Turn operation timing on or off. Counters survive a toggle.
    pub fn enable_performance_monitoring(&self, enabled: bool) -> &Self {
        self.perf.set_enabled(enabled);
        debug!(collection = %self.name, enabled, "performance monitoring toggled");
        self
    }

    pub fn performance_metrics(&self) -> PerformanceMetrics {
        self.perf.metrics()
    }

    pub fn reset_performance_metrics(&self) {
        self.perf.reset();
    }

    // -- introspection -------------------------------------------------------

    /// The collection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn backend_state(&self) -> BackendState {
        self.cell.state()
    }

    /// The serving tier, once initialization has settled.
    pub fn active_tier(&self) -> Option<ActiveTier> {
        self.cell.active_tier()
    }

    /// The batch size in effect right now.
    pub fn batch_size(&self) -> usize {
        self.batch.current()
    }

    /// The batch size fixed at construction.
    pub fn baseline_batch_size(&self) -> usize {
        self.batch.baseline()
    }

    pub fn cache_len(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// Whether `key` is cached. Does not count as an access.
    pub fn is_cached(&self, key: &str) -> bool {
        self.cache.lock().map(|c| c.contains(key)).unwrap_or(false)
    }

    pub fn memory_optimization_enabled(&self) -> bool {
        self.subscription
            .lock()
            .map(|slot| slot.is_some())
            .unwrap_or(false)
    }

    /// Open the primary if that has not happened yet.
    pub async fn ensure_ready(&self) -> ActiveTier {
        self.cell
            .ensure_ready(
                self.primary.as_ref(),
                &self.name,
                self.config.schema_version,
            )
            .await
    }

    // -- internals -----------------------------------------------------------

    async fn primary_backend(&self) -> Option<Arc<dyn KvBackend>> {
        match self.ensure_ready().await {
            ActiveTier::Primary => self.cell.primary(),
            ActiveTier::Fallback => None,
        }
    }

    fn fallback_backend(&self) -> Result<&Arc<dyn KvBackend>, StorageError> {
        self.fallback.as_ref().ok_or_else(|| {
            StorageError::Environment(format!(
                "no fallback backend configured for collection '{}'",
                self.name
            ))
        })
    }

    fn cache_get(&self, key: &str) -> Option<Value> {
        self.cache.lock().ok().and_then(|mut c| c.get(key))
    }

    fn cache_insert(&self, key: &str, value: Value) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(key, value);
        }
    }

    fn cache_remove(&self, key: &str) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.remove(key);
        }
    }

    fn set_cache_capacity(&self, capacity: Option<usize>) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.set_capacity(capacity);
        }
    }

    async fn read(&self, key: &str) -> Option<Value> {
        let primary = self.primary_backend().await;

        if let Some(value) = self.cache_get(key) {
            debug!(key, "cache hit");
            return Some(value);
        }

        let value = match primary {
            Some(backend) => match backend.get(key).await {
                Ok(value) => value,
                Err(e) => {
                    warn!(key, backend = backend.name(), error = %e, "primary read failed, trying fallback");
                    self.read_fallback(key).await
                }
            },
            None => self.read_fallback(key).await,
        };

        if let Some(value) = &value {
            self.cache_insert(key, value.clone());
        }
        value
    }

    async fn read_fallback(&self, key: &str) -> Option<Value> {
        let result = match self.fallback_backend() {
            Ok(fallback) => fallback.get(key).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(value) => value,
            Err(e) => {
                error!(key, error = %e, "read failed on every tier");
                None
            }
        }
    }

    async fn write(&self, key: &str, value: Value) -> Option<String> {
        let primary = self.primary_backend().await;
        self.cache_insert(key, value.clone());

        if let Some(backend) = primary {
            match backend.put(key, &value).await {
                Ok(()) => return Some(key.to_string()),
                Err(e) => {
                    warn!(key, backend = backend.name(), error = %e, "primary write failed, retrying on fallback");
                }
            }
        }

        let result = match self.fallback_backend() {
            Ok(fallback) => fallback.put(key, &value).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => Some(key.to_string()),
            Err(e) => {
                error!(key, error = %e, "write failed on every tier");
                None
            }
        }
    }

    // Both tiers are swept: a per-call fallback write may have left a copy
    // in the fallback even while the primary is active.
    async fn delete(&self, key: &str) -> bool {
        let primary = self.primary_backend().await;
        self.cache_remove(key);

        let mut removed = false;
        if let Some(backend) = primary {
            match backend.delete(key).await {
                Ok(_) => removed = true,
                Err(e) => {
                    warn!(key, backend = backend.name(), error = %e, "primary delete failed, trying fallback");
                }
            }
        }

        let result = match self.fallback_backend() {
            Ok(fallback) => fallback.delete(key).await.map(|_| ()),
            Err(e) => Err(e),
        };
        self.settle_sweep(removed, result, Some(key), "delete")
    }

    async fn clear_all(&self) -> bool {
        let primary = self.primary_backend().await;
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }

        let mut cleared = false;
        if let Some(backend) = primary {
            match backend.clear().await {
                Ok(()) => cleared = true,
                Err(e) => {
                    warn!(backend = backend.name(), error = %e, "primary clear failed, trying fallback");
                }
            }
        }

        let result = match self.fallback_backend() {
            Ok(fallback) => fallback.clear().await,
            Err(e) => Err(e),
        };
        self.settle_sweep(cleared, result, None, "clear")
    }

    fn settle_sweep(
        &self,
        primary_ok: bool,
        fallback: Result<(), StorageError>,
        key: Option<&str>,
        op: &str,
    ) -> bool {
        match fallback {
            Ok(()) => true,
            Err(StorageError::Environment(_)) if primary_ok => true,
            Err(e) if primary_ok => {
                warn!(key, op, error = %e, "fallback copy not swept");
                true
            }
            Err(e) => {
                error!(key, op, error = %e, "{op} failed on every tier");
                false
            }
        }
    }

    async fn write_batch(&self, pairs: Vec<(String, Value)>) -> BatchReport {
        let primary = self.primary_backend().await;
        let optimizing = self.memory_optimization_enabled();
        let monitor = self.monitor.as_ref();

        stream_chunks(
            pairs,
            &self.batch,
            || {
                if optimizing {
                    monitor.suggest_garbage_collection();
                }
            },
            |chunk| self.write_chunk(primary.as_ref(), chunk),
        )
        .await
    }

    async fn write_chunk(
        &self,
        primary: Option<&Arc<dyn KvBackend>>,
        chunk: Vec<(String, Value)>,
    ) -> ChunkOutcome {
        if let Ok(mut cache) = self.cache.lock() {
            for (key, value) in &chunk {
                cache.insert(key, value.clone());
            }
        }

        let active = primary.or(self.fallback.as_ref());
        if let Some(backend) = active {
            match backend.put_many(&chunk).await {
                Ok(()) => {
                    return ChunkOutcome {
                        written: chunk.len(),
                        failed: 0,
                    }
                }
                Err(e) => {
                    warn!(
                        size = chunk.len(),
                        backend = backend.name(),
                        error = %e,
                        "chunk transaction failed, retrying pair by pair on fallback"
                    );
                }
            }
        }

        let fallback = match self.fallback_backend() {
            Ok(fallback) => fallback,
            Err(e) => {
                error!(size = chunk.len(), error = %e, "chunk dropped");
                return ChunkOutcome {
                    written: 0,
                    failed: chunk.len(),
                };
            }
        };

        let mut outcome = ChunkOutcome::default();
        for (key, value) in &chunk {
            match fallback.put(key, value).await {
                Ok(()) => outcome.written += 1,
                Err(e) => {
                    warn!(key = %key, error = %e, "pair skipped");
                    outcome.failed += 1;
                }
            }
        }
        outcome
    }
}

impl Drop for KvStore {
    fn drop(&mut self) {
        if let Ok(slot) = self.subscription.get_mut() {
            if let Some(subscription) = slot.take() {
                subscription.cancel(self.monitor.as_ref());
            }
        }
    }
}

impl std::fmt::Debug for KvStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvStore")
            .field("name", &self.name)
            .field("primary", &self.primary.name())
            .field("fallback", &self.fallback.as_ref().map(|b| b.name()))
            .field("cell", &self.cell)
            .field("batch_size", &self.batch.current())
            .field("cache_len", &self.cache_len())
            .finish()
    }
}
