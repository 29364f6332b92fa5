// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// TierStore Storage Backends
//
// This crate provides the backend tiers behind the TierStore facade. The
// `KvBackend` trait is the one contract every tier satisfies, so the facade
// can move between a transactional primary and a flat fallback without
// changing its own logic.
//
// # Modules
//
// - [`backend`] -- The `KvBackend` and `PrimaryConnector` traits.
// - [`error`] -- The `StorageError` enum covering every backend failure mode.
// - [`memory`] -- An in-memory `BTreeMap` backend and its connector.
// - [`flat`] -- The flat fallback: `FlatStore` implementations and the
//   `FlatBackend` adapter.
// - [`metrics`] -- A transparent wrapper that counts backend operations.
// - [`redb_backend`] -- The redb primary (feature `redb-backend`, on by default).
//
// # Example
//
// ```rust
// use std::sync::Arc;
// use tierstore_storage::backend::KvBackend;
// use tierstore_storage::flat::{FlatBackend, MemoryFlatStore};
// use tierstore_storage::metrics::MeteredBackend;
//
// # tokio_test::block_on(async {
// let flat = FlatBackend::new(Arc::new(MemoryFlatStore::new()), "entities");
// let metered = MeteredBackend::new(flat);
//
// metered.put("e1", &serde_json::json!({"name": "test"})).await.unwrap();
// let val = metered.get("e1").await.unwrap().unwrap();
// assert_eq!(val["name"], "test");
// # });
// ```

pub mod backend;
pub mod error;
pub mod flat;
pub mod memory;
pub mod metrics;

#[cfg(feature = "redb-backend")]
pub mod redb_backend;

pub use backend::{KvBackend, PrimaryConnector};
pub use error::StorageError;
pub use flat::{FileFlatStore, FlatBackend, FlatStore, MemoryFlatStore};
pub use memory::{InMemoryBackend, MemoryConnector};
pub use metrics::{BackendStats, MeteredBackend};

#[cfg(feature = "redb-backend")]
pub use redb_backend::{RedbBackend, RedbConnector};
