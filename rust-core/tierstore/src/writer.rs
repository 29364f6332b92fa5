// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Streaming batch writer.
//
// Splits a bulk write into ordered chunks and hands each to a dispatch
// function. The chunk size is read from the controller immediately before
// each chunk, so pressure that arrives mid-job shrinks the remaining chunks.
// Between chunks the writer yields to the runtime.

use std::future::Future;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::batch::BatchController;

/// What happened to one chunk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkOutcome {
    /// Pairs that reached some backend.
    pub written: usize,
    /// Pairs that no backend accepted.
    pub failed: usize,
}

/// Summary of a whole bulk write.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Size of each dispatched chunk, in dispatch order.
    pub chunk_sizes: Vec<usize>,
    /// Pairs that reached some backend.
    pub written: usize,
    /// Pairs that were skipped after every backend refused them, or that
    /// could not be serialized.
    pub failed: usize,
}

impl BatchReport {
    /// Total pairs attempted.
    pub fn attempted(&self) -> usize {
        self.written + self.failed
    }

    /// True when every pair reached a backend.
    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }
}

/// Dispatch `pairs` in chunks sized by `controller`.
///
/// `between_chunks` runs after every chunk except the last, before the
/// writer yields. Every pair is handed to `dispatch` exactly once.
pub async fn stream_chunks<F, Fut>(
    pairs: Vec<(String, Value)>,
    controller: &BatchController,
    between_chunks: impl Fn(),
    mut dispatch: F,
) -> BatchReport
where
    F: FnMut(Vec<(String, Value)>) -> Fut,
    Fut: Future<Output = ChunkOutcome>,
{
    let total = pairs.len();
    let mut report = BatchReport::default();
    let mut remaining = pairs.into_iter().peekable();

    while remaining.peek().is_some() {
        let size = controller.current().max(1);
        let chunk: Vec<(String, Value)> = remaining.by_ref().take(size).collect();
        let chunk_len = chunk.len();

        debug!(
            chunk = report.chunk_sizes.len(),
            size = chunk_len,
            batch_size = size,
            "dispatching chunk"
        );

        let outcome = dispatch(chunk).await;
        report.chunk_sizes.push(chunk_len);
        report.written += outcome.written;
        report.failed += outcome.failed;

        if remaining.peek().is_some() {
            between_chunks();
            tokio::task::yield_now().await;
        }
    }

    debug!(
        total,
        chunks = report.chunk_sizes.len(),
        written = report.written,
        failed = report.failed,
        "bulk write finished"
    );
    report
}
