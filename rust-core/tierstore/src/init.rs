// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Backend initializer.
//
// Opens the primary exactly once per store instance. Callers that arrive
// while the open is in flight wait on the same attempt. A failed open selects
// the fallback tier for the rest of the instance's life; the primary is
// never retried.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use tierstore_storage::{KvBackend, PrimaryConnector};

/// Which tier serves operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActiveTier {
    /// The transactional primary opened successfully.
    Primary,
    /// The primary could not be opened; the flat fallback serves everything.
    Fallback,
}

impl std::fmt::Display for ActiveTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActiveTier::Primary => write!(f, "primary"),
            ActiveTier::Fallback => write!(f, "fallback"),
        }
    }
}

/// Snapshot of the initializer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendState {
    /// Initialization has settled, one way or the other.
    pub initialized: bool,
    /// An open attempt is in flight.
    pub initializing: bool,
    /// The primary has been abandoned. Never reverts once set.
    pub fallback_active: bool,
}

/// Holds the outcome of the single primary open.
#[derive(Default)]
pub struct BackendCell {
    primary: OnceCell<Option<Arc<dyn KvBackend>>>,
    initializing: AtomicBool,
    fallback_active: AtomicBool,
}

impl BackendCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the primary if nobody has yet, and report the selected tier.
    ///
    /// Open errors are logged and absorbed here.
    pub async fn ensure_ready(
        &self,
        connector: &dyn PrimaryConnector,
        collection: &str,
        version: u32,
    ) -> ActiveTier {
        let slot = self
            .primary
            .get_or_init(|| async {
                self.initializing.store(true, Ordering::SeqCst);
                debug!(
                    connector = connector.name(),
                    collection, version, "opening primary backend"
                );
                let opened = connector.open(collection, version).await;
                let slot = match opened {
                    Ok(backend) => {
                        info!(
                            collection,
                            backend = backend.name(),
                            tier = %ActiveTier::Primary,
                            "storage tier selected"
                        );
                        Some(backend)
                    }
                    Err(e) => {
                        warn!(
                            collection,
                            connector = connector.name(),
                            error = %e,
                            "primary backend unavailable, switching to fallback"
                        );
                        self.fallback_active.store(true, Ordering::SeqCst);
                        None
                    }
                };
                self.initializing.store(false, Ordering::SeqCst);
                slot
            })
            .await;

        if slot.is_some() {
            ActiveTier::Primary
        } else {
            ActiveTier::Fallback
        }
    }

    /// The opened primary, if initialization settled on it.
    pub fn primary(&self) -> Option<Arc<dyn KvBackend>> {
        self.primary.get().and_then(|slot| slot.clone())
    }

    /// The selected tier, once initialization has settled.
    pub fn active_tier(&self) -> Option<ActiveTier> {
        self.primary.get().map(|slot| match slot {
            Some(_) => ActiveTier::Primary,
            None => ActiveTier::Fallback,
        })
    }

    pub fn state(&self) -> BackendState {
        BackendState {
            initialized: self.primary.initialized(),
            initializing: self.initializing.load(Ordering::SeqCst),
            fallback_active: self.fallback_active.load(Ordering::SeqCst),
        }
    }
}

impl std::fmt::Debug for BackendCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendCell")
            .field("state", &self.state())
            .field("active_tier", &self.active_tier())
            .finish()
    }
}
