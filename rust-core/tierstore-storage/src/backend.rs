// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core backend contract for TierStore.
//
// Every tier (transactional primary, flat fallback, in-memory) implements the
// same small key-value contract over one named collection. Values are JSON
// documents; each backend chooses its own on-disk encoding but never adds an
// envelope or version field to a record.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StorageError;

/// A key-value backend bound to a single collection.
///
/// Implementations must be safe to share across threads and tokio tasks.
#[async_trait]
pub trait KvBackend: Send + Sync {
    /// Retrieve the value stored under `key`.
    ///
    /// Returns `Ok(None)` if the key does not exist, rather than an error.
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError>;

    /// Store a value, overwriting any previous value for `key`.
    async fn put(&self, key: &str, value: &Value) -> Result<(), StorageError>;

    /// Write several pairs as one unit.
    ///
    /// Transactional backends commit all pairs or none. Flat backends have no
    /// transactions and write pair by pair, stopping at the first failure.
    async fn put_many(&self, entries: &[(String, Value)]) -> Result<(), StorageError>;

    /// Delete the value stored under `key`.
    ///
    /// Returns `Ok(true)` if the key existed and was removed.
    async fn delete(&self, key: &str) -> Result<bool, StorageError>;

    /// Remove every record in the collection.
    async fn clear(&self) -> Result<(), StorageError>;

    /// Number of records currently in the collection.
    async fn count(&self) -> Result<usize, StorageError>;

    /// A human-readable name for this backend, used in logging.
    fn name(&self) -> &str;
}

/// Opens the primary backend for a named collection.
///
/// `version` is the collection layout version the caller expects. Opening
/// creates the collection if it is missing (the upgrade step). A connector
/// performs no retries; the caller decides what a failure means.
#[async_trait]
pub trait PrimaryConnector: Send + Sync {
    /// Open or create `collection` and return a backend bound to it.
    async fn open(&self, collection: &str, version: u32)
        -> Result<Arc<dyn KvBackend>, StorageError>;

    /// A human-readable name for the connector, used in logging.
    fn name(&self) -> &str;
}
