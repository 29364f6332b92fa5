// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Operation timing for the facade.
//
// Wraps any future, measures its wall-clock duration and keeps running
// totals. Disabled monitors pass futures through untouched.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Snapshot of the running counters. Times are in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    /// Number of operations measured.
    pub operations: u64,
    /// Sum of all measured durations.
    pub total_time: f64,
    /// `total_time / operations`, or zero before the first operation.
    pub avg_time: f64,
    /// Duration of the most recent operation.
    pub last_operation_time: f64,
}

impl PerformanceMetrics {
    fn record(&mut self, elapsed_ms: f64) {
        self.operations += 1;
        self.total_time += elapsed_ms;
        self.last_operation_time = elapsed_ms;
        self.avg_time = self.total_time / self.operations as f64;
    }
}

/// Measures operations while enabled.
#[derive(Debug, Default)]
pub struct PerformanceMonitor {
    enabled: AtomicBool,
    metrics: Mutex<PerformanceMetrics>,
}

impl PerformanceMonitor {
    /// A monitor that starts in the given state.
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            metrics: Mutex::new(PerformanceMetrics::default()),
        }
    }

    /// Turn measurement on or off. Counters are kept either way.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Whether operations are currently measured.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Run `fut`, recording its duration when enabled.
    pub async fn track<F: Future>(&self, fut: F) -> F::Output {
        if !self.is_enabled() {
            return fut.await;
        }
        let start = Instant::now();
        let output = fut.await;
        self.record(start.elapsed().as_secs_f64() * 1000.0);
        output
    }

    /// Record one operation of `elapsed_ms`.
    pub fn record(&self, elapsed_ms: f64) {
        if let Ok(mut metrics) = self.metrics.lock() {
            metrics.record(elapsed_ms);
        }
    }

    /// Current counters.
    pub fn metrics(&self) -> PerformanceMetrics {
        self.metrics.lock().map(|m| *m).unwrap_or_default()
    }

    /// Zero all counters.
    pub fn reset(&self) {
        if let Ok(mut metrics) = self.metrics.lock() {
            *metrics = PerformanceMetrics::default();
        }
    }
}
