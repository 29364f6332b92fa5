// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Memory monitor contract.
//
// A store never measures memory itself. It subscribes to a `MemoryMonitor`
// for warning and danger notifications and, while streaming large batches,
// passes on garbage-collection hints. Only the four trait methods are ever
// called by the store.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Severity of a pressure notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PressureLevel {
    /// Usage is elevated; shed some load.
    Warning,
    /// Usage is critical; shed everything that can be rebuilt.
    Danger,
}

impl std::fmt::Display for PressureLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PressureLevel::Warning => write!(f, "warning"),
            PressureLevel::Danger => write!(f, "danger"),
        }
    }
}

/// A pressure notification.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PressureEvent {
    /// Which callbacks this event was dispatched to.
    pub level: PressureLevel,
    /// Memory in use, as a percentage (0 to 100) of what is available.
    pub percentage: f64,
}

impl PressureEvent {
    /// Usage as a ratio in `[0, 1]`.
    pub fn ratio(&self) -> f64 {
        (self.percentage / 100.0).clamp(0.0, 1.0)
    }
}

/// Callback invoked synchronously by the monitor.
pub type PressureCallback = Arc<dyn Fn(&PressureEvent) + Send + Sync>;

/// Handle returned by [`MemoryMonitor::add_callback`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(pub u64);

/// Source of memory-pressure notifications.
pub trait MemoryMonitor: Send + Sync {
    /// Begin watching memory. Calling it again is harmless.
    fn start_monitoring(&self);

    /// Subscribe `callback` to events of `level`.
    fn add_callback(&self, level: PressureLevel, callback: PressureCallback) -> CallbackId;

    /// Unsubscribe. Returns `false` if `id` was not registered for `level`.
    fn remove_callback(&self, level: PressureLevel, id: CallbackId) -> bool;

    /// Hint that now is a good moment to release memory.
    fn suggest_garbage_collection(&self);
}

// ---------------------------------------------------------------------------
// NoopMonitor
// ---------------------------------------------------------------------------

/// A monitor that never reports pressure.
#[derive(Debug, Default)]
pub struct NoopMonitor {
    next_id: AtomicU64,
}

impl NoopMonitor {
    /// Create a monitor that never fires.
    pub fn new() -> Self {
        Self::default()
    }
}

impl MemoryMonitor for NoopMonitor {
    fn start_monitoring(&self) {}

    fn add_callback(&self, _level: PressureLevel, _callback: PressureCallback) -> CallbackId {
        CallbackId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn remove_callback(&self, _level: PressureLevel, _id: CallbackId) -> bool {
        true
    }

    fn suggest_garbage_collection(&self) {}
}

// ---------------------------------------------------------------------------
// ThresholdMonitor
// ---------------------------------------------------------------------------

struct Subscription {
    id: CallbackId,
    level: PressureLevel,
    callback: PressureCallback,
}

/// A monitor fed with usage readings by its owner.
///
/// Each reading is classified against two percentages and dispatched to the
/// callbacks of the most severe level it exceeds; a reading at or below the
/// warning percentage dispatches nothing. Readings taken before
/// [`MemoryMonitor::start_monitoring`] are ignored.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use tierstore::monitor::{MemoryMonitor, PressureLevel, ThresholdMonitor};
///
/// let monitor = ThresholdMonitor::new(70.0, 85.0);
/// let hits = Arc::new(AtomicUsize::new(0));
/// let seen = Arc::clone(&hits);
/// monitor.add_callback(
///     PressureLevel::Danger,
///     Arc::new(move |_event| {
///         seen.fetch_add(1, Ordering::SeqCst);
///     }),
/// );
///
/// monitor.start_monitoring();
/// monitor.record_percentage(91.0);
/// assert_eq!(hits.load(Ordering::SeqCst), 1);
/// ```
pub struct ThresholdMonitor {
    warning_pct: f64,
    danger_pct: f64,
    monitoring: AtomicBool,
    next_id: AtomicU64,
    gc_hints: AtomicU64,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl ThresholdMonitor {
    /// Classify readings above `warning_pct` as warnings and above
    /// `danger_pct` as danger.
    pub fn new(warning_pct: f64, danger_pct: f64) -> Self {
        Self {
            warning_pct,
            danger_pct,
            monitoring: AtomicBool::new(false),
            next_id: AtomicU64::new(0),
            gc_hints: AtomicU64::new(0),
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    /// Whether [`MemoryMonitor::start_monitoring`] has been called.
    pub fn is_monitoring(&self) -> bool {
        self.monitoring.load(Ordering::SeqCst)
    }

    /// Number of garbage-collection hints received so far.
    pub fn gc_suggestions(&self) -> u64 {
        self.gc_hints.load(Ordering::SeqCst)
    }

    /// Number of live subscriptions for `level`.
    pub fn callback_count(&self, level: PressureLevel) -> usize {
        self.subscriptions
            .lock()
            .map(|subs| subs.iter().filter(|s| s.level == level).count())
            .unwrap_or(0)
    }

    /// Record a reading of `used` out of `total` bytes.
    pub fn record_usage(&self, used: u64, total: u64) -> Option<PressureLevel> {
        if total == 0 {
            return None;
        }
        self.record_percentage(used as f64 / total as f64 * 100.0)
    }

    /// Record a usage percentage and dispatch it. Returns the level it was
    /// dispatched at, if any.
    pub fn record_percentage(&self, percentage: f64) -> Option<PressureLevel> {
        if !self.is_monitoring() {
            debug!(percentage, "reading ignored, monitoring not started");
            return None;
        }
        let level = if percentage > self.danger_pct {
            PressureLevel::Danger
        } else if percentage > self.warning_pct {
            PressureLevel::Warning
        } else {
            return None;
        };
        self.dispatch(PressureEvent { level, percentage });
        Some(level)
    }

    /// Dispatch `event` to its level's callbacks, whatever the thresholds.
    pub fn dispatch(&self, event: PressureEvent) {
        // Snapshot first: a callback may subscribe or unsubscribe.
        let targets: Vec<PressureCallback> = match self.subscriptions.lock() {
            Ok(subs) => subs
                .iter()
                .filter(|s| s.level == event.level)
                .map(|s| Arc::clone(&s.callback))
                .collect(),
            Err(_) => {
                warn!("subscription list poisoned, dropping pressure event");
                return;
            }
        };
        debug!(
            level = %event.level,
            percentage = event.percentage,
            callbacks = targets.len(),
            "dispatching pressure event"
        );
        for callback in targets {
            callback(&event);
        }
    }
}

impl Default for ThresholdMonitor {
    fn default() -> Self {
        Self::new(70.0, 85.0)
    }
}

impl std::fmt::Debug for ThresholdMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThresholdMonitor")
            .field("warning_pct", &self.warning_pct)
            .field("danger_pct", &self.danger_pct)
            .field("monitoring", &self.is_monitoring())
            .field("gc_hints", &self.gc_suggestions())
            .finish()
    }
}

impl MemoryMonitor for ThresholdMonitor {
    fn start_monitoring(&self) {
        if !self.monitoring.swap(true, Ordering::SeqCst) {
            debug!(
                warning_pct = self.warning_pct,
                danger_pct = self.danger_pct,
                "memory monitoring started"
            );
        }
    }

    fn add_callback(&self, level: PressureLevel, callback: PressureCallback) -> CallbackId {
        let id = CallbackId(self.next_id.fetch_add(1, Ordering::SeqCst));
        match self.subscriptions.lock() {
            Ok(mut subs) => subs.push(Subscription {
                id,
                level,
                callback,
            }),
            Err(_) => warn!(%level, "subscription list poisoned, callback not registered"),
        }
        id
    }

    fn remove_callback(&self, level: PressureLevel, id: CallbackId) -> bool {
        match self.subscriptions.lock() {
            Ok(mut subs) => {
                let before = subs.len();
                subs.retain(|s| !(s.id == id && s.level == level));
                subs.len() != before
            }
            Err(_) => false,
        }
    }

    fn suggest_garbage_collection(&self) {
        self.gc_hints.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter(monitor: &ThresholdMonitor, level: PressureLevel) -> (Arc<AtomicUsize>, CallbackId) {
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&hits);
        let id = monitor.add_callback(
            level,
            Arc::new(move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            }),
        );
        (hits, id)
    }

    #[test]
    fn test_readings_ignored_until_started() {
        let monitor = ThresholdMonitor::default();
        let (hits, _) = counter(&monitor, PressureLevel::Warning);

        assert_eq!(monitor.record_percentage(80.0), None);
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        monitor.start_monitoring();
        assert_eq!(monitor.record_percentage(80.0), Some(PressureLevel::Warning));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_classification_picks_most_severe_level() {
        let monitor = ThresholdMonitor::new(70.0, 85.0);
        monitor.start_monitoring();
        let (warnings, _) = counter(&monitor, PressureLevel::Warning);
        let (dangers, _) = counter(&monitor, PressureLevel::Danger);

        assert_eq!(monitor.record_percentage(50.0), None);
        assert_eq!(monitor.record_percentage(70.0), None);
        assert_eq!(monitor.record_percentage(78.0), Some(PressureLevel::Warning));
        assert_eq!(monitor.record_percentage(90.0), Some(PressureLevel::Danger));

        assert_eq!(warnings.load(Ordering::SeqCst), 1);
        assert_eq!(dangers.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_record_usage_converts_to_percentage() {
        let monitor = ThresholdMonitor::default();
        monitor.start_monitoring();
        assert_eq!(monitor.record_usage(90, 100), Some(PressureLevel::Danger));
        assert_eq!(monitor.record_usage(1, 0), None);
    }

    #[test]
    fn test_remove_callback() {
        let monitor = ThresholdMonitor::default();
        monitor.start_monitoring();
        let (hits, id) = counter(&monitor, PressureLevel::Warning);

        // Wrong level leaves the subscription in place.
        assert!(!monitor.remove_callback(PressureLevel::Danger, id));
        assert!(monitor.remove_callback(PressureLevel::Warning, id));
        assert!(!monitor.remove_callback(PressureLevel::Warning, id));
        assert_eq!(monitor.callback_count(PressureLevel::Warning), 0);

        monitor.record_percentage(80.0);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_gc_hints_are_counted() {
        let monitor = ThresholdMonitor::default();
        monitor.suggest_garbage_collection();
        monitor.suggest_garbage_collection();
        assert_eq!(monitor.gc_suggestions(), 2);
    }

    #[test]
    fn test_event_ratio_is_clamped() {
        let event = PressureEvent {
            level: PressureLevel::Danger,
            percentage: 140.0,
        };
        assert_eq!(event.ratio(), 1.0);
        let event = PressureEvent {
            level: PressureLevel::Warning,
            percentage: 78.0,
        };
        assert!((event.ratio() - 0.78).abs() < 1e-9);
    }

    #[test]
    fn test_noop_monitor_hands_out_distinct_ids() {
        let monitor = NoopMonitor::new();
        let a = monitor.add_callback(PressureLevel::Warning, Arc::new(|_| {}));
        let b = monitor.add_callback(PressureLevel::Danger, Arc::new(|_| {}));
        assert_ne!(a, b);
        assert!(monitor.remove_callback(PressureLevel::Warning, a));
    }
}
