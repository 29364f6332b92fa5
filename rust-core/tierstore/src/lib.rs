// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// TierStore
//
// A key-value facade over a transactional primary and a flat fallback. The
// primary is opened once; if that fails the fallback serves the store for
// the rest of its life. Writes go through an in-memory cache whose size, and
// the write-batch size, react to memory pressure reported by an injected
// monitor.
//
// # Modules
//
// - [`store`] -- `KvStore`, the error boundary, and its builder.
// - [`init`] -- Single-attempt primary initialization and tier selection.
// - [`cache`] -- The write-through recency cache.
// - [`batch`] -- The adaptive batch-size controller.
// - [`writer`] -- Chunked streaming of bulk writes.
// - [`pressure`] -- Warning and danger responses.
// - [`monitor`] -- The memory monitor contract and two monitors.
// - [`perf`] -- Operation timing.
// - [`device`], [`config`], [`error`] -- Construction inputs and errors.

pub mod batch;
pub mod cache;
pub mod config;
pub mod device;
pub mod error;
pub mod init;
pub mod monitor;
pub mod perf;
pub mod pressure;
pub mod store;
pub mod writer;

pub use config::StoreConfig;
pub use device::DeviceProfile;
pub use error::{TierError, TierResult};
pub use init::{ActiveTier, BackendState};
pub use monitor::{
    CallbackId, MemoryMonitor, NoopMonitor, PressureCallback, PressureEvent, PressureLevel,
    ThresholdMonitor,
};
pub use perf::PerformanceMetrics;
pub use store::{KvStore, KvStoreBuilder};
pub use writer::BatchReport;

pub use tierstore_storage::{
    BackendStats, FileFlatStore, FlatBackend, FlatStore, InMemoryBackend, KvBackend,
    MemoryConnector, MemoryFlatStore, MeteredBackend, PrimaryConnector, StorageError,
};

#[cfg(feature = "redb-backend")]
pub use tierstore_storage::{RedbBackend, RedbConnector};
