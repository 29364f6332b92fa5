// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>
//
// redb-backed primary storage for TierStore.
//
// Uses redb (pure Rust, B-tree, ACID, single-file database) as the
// transactional tier. No C/C++ dependencies.
//
// # Design
//
// - One redb `Database` file may hold many collections; each collection is
//   its own table, keyed by `&str` with JSON-encoded `&[u8]` values.
// - `RedbConnector::open` is the upgrade step: it creates the collection's
//   table and records the layout version in a metadata table, inside a
//   single write transaction.
// - Read transactions for reads, write transactions for every mutation.
//   `put_many` commits all pairs in one transaction.
// - redb calls are blocking; each one runs on `spawn_blocking` so the async
//   caller only ever awaits a future.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use redb::{
    Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition, TableError,
};
use serde_json::Value;
use tracing::{debug, info};

use crate::backend::{KvBackend, PrimaryConnector};
use crate::error::StorageError;

/// Collection layout versions, keyed by collection name.
const META_TABLE: TableDefinition<&str, u32> = TableDefinition::new("__tierstore_meta");

fn collection_table(name: &str) -> TableDefinition<'_, &'static str, &'static [u8]> {
    TableDefinition::new(name)
}

fn init_error(e: impl std::fmt::Display) -> StorageError {
    StorageError::Initialization(e.to_string())
}

fn join_error(e: tokio::task::JoinError) -> StorageError {
    StorageError::Transaction(format!("task join: {e}"))
}

fn encode(key: &str, value: &Value) -> Result<Vec<u8>, StorageError> {
    serde_json::to_vec(value).map_err(|err| {
        StorageError::Serialization(format!("failed to encode value for key '{key}': {err}"))
    })
}

// ---------------------------------------------------------------------------
// RedbConnector
// ---------------------------------------------------------------------------

/// Opens collections inside a single redb database file.
///
/// The database itself is opened lazily on the first `open` call and shared
/// by every collection opened through this connector afterwards.
pub struct RedbConnector {
    path: PathBuf,
    db: tokio::sync::OnceCell<Arc<Database>>,
}

impl RedbConnector {
    /// A connector for the database file at `path`.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            db: tokio::sync::OnceCell::new(),
        }
    }

    /// Return the filesystem path of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn database(&self) -> Result<Arc<Database>, StorageError> {
        let db = self
            .db
            .get_or_try_init(|| async {
                let path = self.path.clone();
                tokio::task::spawn_blocking(move || -> Result<Arc<Database>, StorageError> {
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent).map_err(|e| {
                            StorageError::Initialization(format!(
                                "create {}: {e}",
                                parent.display()
                            ))
                        })?;
                    }
                    let db = Database::create(&path).map_err(|e| {
                        StorageError::Initialization(format!(
                            "failed to open redb at {}: {e}",
                            path.display()
                        ))
                    })?;
                    debug!(path = %path.display(), "opened redb database");
                    Ok(Arc::new(db))
                })
                .await
                .map_err(|e| StorageError::Initialization(format!("task join: {e}")))?
            })
            .await?;
        Ok(Arc::clone(db))
    }
}

impl std::fmt::Debug for RedbConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbConnector")
            .field("path", &self.path)
            .field("opened", &self.db.initialized())
            .finish()
    }
}

#[async_trait]
impl PrimaryConnector for RedbConnector {
    async fn open(
        &self,
        collection: &str,
        version: u32,
    ) -> Result<Arc<dyn KvBackend>, StorageError> {
        if collection.is_empty() || collection == "__tierstore_meta" {
            return Err(StorageError::Initialization(format!(
                "invalid collection name '{collection}'"
            )));
        }

        let db = self.database().await?;
        let name = collection.to_string();

        let upgraded_from = {
            let db = Arc::clone(&db);
            let name = name.clone();
            tokio::task::spawn_blocking(move || -> Result<Option<u32>, StorageError> {
                let txn = db.begin_write().map_err(init_error)?;
                let previous;
                {
                    let mut meta = txn.open_table(META_TABLE).map_err(init_error)?;
                    previous = meta
                        .get(name.as_str())
                        .map_err(init_error)?
                        .map(|v| v.value());
                    if let Some(stored) = previous {
                        if stored > version {
                            return Err(StorageError::Initialization(format!(
                                "collection '{name}' is at version {stored}, \
                                 cannot open at older version {version}"
                            )));
                        }
                    }
                    meta.insert(name.as_str(), version).map_err(init_error)?;
                    // Creates the collection table if it does not exist yet.
                    txn.open_table(collection_table(&name)).map_err(init_error)?;
                }
                txn.commit().map_err(init_error)?;
                Ok(previous)
            })
            .await
            .map_err(|e| StorageError::Initialization(format!("task join: {e}")))??
        };

        match upgraded_from {
            Some(prev) if prev < version => {
                info!(collection = %name, from = prev, to = version, "upgraded collection");
            }
            None => info!(collection = %name, version, "created collection"),
            _ => debug!(collection = %name, version, "opened collection"),
        }

        Ok(Arc::new(RedbBackend {
            db,
            table: name,
            path: self.path.clone(),
        }))
    }

    fn name(&self) -> &str {
        "redb"
    }
}

// ---------------------------------------------------------------------------
// RedbBackend
// ---------------------------------------------------------------------------

/// A transactional backend bound to one table of a redb database.
///
/// Thread-safe: `Database` is `Send + Sync` and handles internal locking.
///
/// # Example
///
/// ```rust,no_run
/// use tierstore_storage::backend::PrimaryConnector;
/// use tierstore_storage::redb_backend::RedbConnector;
///
/// # tokio_test::block_on(async {
/// let connector = RedbConnector::new("/tmp/tierstore-test.redb");
/// let store = connector.open("settings", 1).await.unwrap();
/// store.put("hello", &serde_json::json!("world")).await.unwrap();
/// let val = store.get("hello").await.unwrap();
/// assert_eq!(val, Some(serde_json::json!("world")));
/// # });
/// ```
pub struct RedbBackend {
    db: Arc<Database>,
    table: String,
    path: PathBuf,
}

impl RedbBackend {
    /// Return the collection (table) name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Return the filesystem path of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for RedbBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbBackend")
            .field("path", &self.path)
            .field("table", &self.table)
            .finish()
    }
}

#[async_trait]
impl KvBackend for RedbBackend {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let db = Arc::clone(&self.db);
        let table = self.table.clone();
        let key = key.to_string();

        tokio::task::spawn_blocking(move || -> Result<Option<Value>, StorageError> {
            let txn = db
                .begin_read()
                .map_err(|e| StorageError::Transaction(format!("read txn: {e}")))?;

            let table = match txn.open_table(collection_table(&table)) {
                Ok(t) => t,
                // Table was dropped out from under us; nothing to read.
                Err(TableError::TableDoesNotExist(_)) => return Ok(None),
                Err(e) => return Err(StorageError::Transaction(format!("open table: {e}"))),
            };

            match table.get(key.as_str()) {
                Ok(Some(bytes)) => {
                    let value = serde_json::from_slice(bytes.value()).map_err(|err| {
                        StorageError::CorruptedData(format!(
                            "failed to decode value for key '{key}': {err}"
                        ))
                    })?;
                    Ok(Some(value))
                }
                Ok(None) => Ok(None),
                Err(e) => Err(StorageError::Transaction(format!("get: {e}"))),
            }
        })
        .await
        .map_err(join_error)?
    }

    async fn put(&self, key: &str, value: &Value) -> Result<(), StorageError> {
        let bytes = encode(key, value)?;
        let db = Arc::clone(&self.db);
        let table = self.table.clone();
        let key = key.to_string();

        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            let txn = db
                .begin_write()
                .map_err(|e| StorageError::Transaction(format!("write txn: {e}")))?;
            {
                let mut table = txn
                    .open_table(collection_table(&table))
                    .map_err(|e| StorageError::Transaction(format!("open table: {e}")))?;
                table
                    .insert(key.as_str(), bytes.as_slice())
                    .map_err(|e| StorageError::Transaction(format!("insert: {e}")))?;
            }
            txn.commit()
                .map_err(|e| StorageError::Transaction(format!("commit: {e}")))?;
            Ok(())
        })
        .await
        .map_err(join_error)?
    }

    async fn put_many(&self, entries: &[(String, Value)]) -> Result<(), StorageError> {
        let owned = entries
            .iter()
            .map(|(k, v)| Ok((k.clone(), encode(k, v)?)))
            .collect::<Result<Vec<(String, Vec<u8>)>, StorageError>>()?;
        let db = Arc::clone(&self.db);
        let table = self.table.clone();

        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            let txn = db
                .begin_write()
                .map_err(|e| StorageError::Transaction(format!("write txn: {e}")))?;
            {
                let mut table = txn
                    .open_table(collection_table(&table))
                    .map_err(|e| StorageError::Transaction(format!("open table: {e}")))?;
                for (k, v) in &owned {
                    table
                        .insert(k.as_str(), v.as_slice())
                        .map_err(|e| StorageError::Transaction(format!("batch insert: {e}")))?;
                }
            }
            txn.commit()
                .map_err(|e| StorageError::Transaction(format!("batch commit: {e}")))?;
            Ok(())
        })
        .await
        .map_err(join_error)?
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        let db = Arc::clone(&self.db);
        let table = self.table.clone();
        let key = key.to_string();

        tokio::task::spawn_blocking(move || -> Result<bool, StorageError> {
            let txn = db
                .begin_write()
                .map_err(|e| StorageError::Transaction(format!("write txn: {e}")))?;
            let existed;
            {
                let mut table = txn
                    .open_table(collection_table(&table))
                    .map_err(|e| StorageError::Transaction(format!("open table: {e}")))?;
                existed = table
                    .remove(key.as_str())
                    .map_err(|e| StorageError::Transaction(format!("remove: {e}")))?
                    .is_some();
            }
            txn.commit()
                .map_err(|e| StorageError::Transaction(format!("commit: {e}")))?;
            Ok(existed)
        })
        .await
        .map_err(join_error)?
    }

    async fn clear(&self) -> Result<(), StorageError> {
        let db = Arc::clone(&self.db);
        let table = self.table.clone();

        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            let txn = db
                .begin_write()
                .map_err(|e| StorageError::Transaction(format!("write txn: {e}")))?;
            txn.delete_table(collection_table(&table))
                .map_err(|e| StorageError::Transaction(format!("delete table: {e}")))?;
            // Recreate empty so later reads see the collection.
            txn.open_table(collection_table(&table))
                .map_err(|e| StorageError::Transaction(format!("open table: {e}")))?;
            txn.commit()
                .map_err(|e| StorageError::Transaction(format!("commit: {e}")))?;
            Ok(())
        })
        .await
        .map_err(join_error)?
    }

    async fn count(&self) -> Result<usize, StorageError> {
        let db = Arc::clone(&self.db);
        let table = self.table.clone();

        tokio::task::spawn_blocking(move || -> Result<usize, StorageError> {
            let txn = db
                .begin_read()
                .map_err(|e| StorageError::Transaction(format!("read txn: {e}")))?;
            let table = match txn.open_table(collection_table(&table)) {
                Ok(t) => t,
                Err(TableError::TableDoesNotExist(_)) => return Ok(0),
                Err(e) => return Err(StorageError::Transaction(format!("open table: {e}"))),
            };
            let len = table
                .len()
                .map_err(|e| StorageError::Transaction(format!("len: {e}")))?;
            Ok(len as usize)
        })
        .await
        .map_err(join_error)?
    }

    fn name(&self) -> &str {
        "redb"
    }
}
