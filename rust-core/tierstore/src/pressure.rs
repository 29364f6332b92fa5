// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Memory-pressure response.
//
// Warning shrinks the batch size and prunes the cache to its most recent
// entries. Danger clears the cache and drops the batch size to the floor.
// Events at or below the configured ratio for their level are ignored, so a
// monitor with looser thresholds cannot trigger early shedding.

use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use crate::batch::BatchController;
use crate::cache::RecordCache;
use crate::config::StoreConfig;
use crate::monitor::{CallbackId, MemoryMonitor, PressureEvent, PressureLevel};

/// Cache shared between the facade and pressure callbacks.
pub type SharedCache = Arc<Mutex<RecordCache>>;

/// Applies pressure events to one store's cache and batch controller.
#[derive(Debug)]
pub struct PressureHandler {
    collection: String,
    cache: SharedCache,
    batch: Arc<BatchController>,
    warning_threshold: f64,
    danger_threshold: f64,
    warning_cache_retain: usize,
}

impl PressureHandler {
    pub fn new(
        collection: &str,
        config: &StoreConfig,
        cache: SharedCache,
        batch: Arc<BatchController>,
    ) -> Self {
        Self {
            collection: collection.to_string(),
            cache,
            batch,
            warning_threshold: config.warning_threshold,
            danger_threshold: config.danger_threshold,
            warning_cache_retain: config.warning_cache_retain,
        }
    }

    /// Route `event` by its level. Returns whether anything was done.
    pub fn handle(&self, event: &PressureEvent) -> bool {
        match event.level {
            PressureLevel::Warning => self.on_warning(event),
            PressureLevel::Danger => self.on_danger(event),
        }
    }

    /// Shrink the batch size and keep only the most recent cache entries.
    pub fn on_warning(&self, event: &PressureEvent) -> bool {
        let ratio = event.ratio();
        if ratio <= self.warning_threshold {
            return false;
        }
        let previous = self.batch.current();
        let batch_size = self.batch.shrink_for_ratio(ratio);
        let evicted = match self.cache.lock() {
            Ok(mut cache) => cache.retain_most_recent(self.warning_cache_retain),
            Err(_) => {
                warn!(collection = %self.collection, "cache lock poisoned during warning");
                0
            }
        };
        info!(
            collection = %self.collection,
            percentage = event.percentage,
            previous,
            batch_size,
            evicted,
            "memory warning handled"
        );
        true
    }

    /// Drop every cached entry and fall to the minimum batch size.
    pub fn on_danger(&self, event: &PressureEvent) -> bool {
        let ratio = event.ratio();
        if ratio <= self.danger_threshold {
            return false;
        }
        let evicted = match self.cache.lock() {
            Ok(mut cache) => {
                let n = cache.len();
                cache.clear();
                n
            }
            Err(_) => {
                warn!(collection = %self.collection, "cache lock poisoned during danger");
                0
            }
        };
        let batch_size = self.batch.drop_to_floor();
        info!(
            collection = %self.collection,
            percentage = event.percentage,
            batch_size,
            evicted,
            "memory danger handled"
        );
        true
    }

    /// Register warning and danger callbacks with `monitor`.
    pub fn subscribe(self: &Arc<Self>, monitor: &dyn MemoryMonitor) -> PressureSubscription {
        let on_warning = Arc::clone(self);
        let warning = monitor.add_callback(
            PressureLevel::Warning,
            Arc::new(move |event: &PressureEvent| {
                on_warning.on_warning(event);
            }),
        );
        let on_danger = Arc::clone(self);
        let danger = monitor.add_callback(
            PressureLevel::Danger,
            Arc::new(move |event: &PressureEvent| {
                on_danger.on_danger(event);
            }),
        );
        PressureSubscription { warning, danger }
    }
}

/// Callback ids held while memory optimization is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PressureSubscription {
    warning: CallbackId,
    danger: CallbackId,
}

impl PressureSubscription {
    /// Remove both callbacks from `monitor`.
    pub fn cancel(self, monitor: &dyn MemoryMonitor) {
        let warning = monitor.remove_callback(PressureLevel::Warning, self.warning);
        let danger = monitor.remove_callback(PressureLevel::Danger, self.danger);
        if !(warning && danger) {
            warn!(warning, danger, "pressure callback was already gone");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceProfile;
    use crate::monitor::ThresholdMonitor;
    use serde_json::json;

    fn handler() -> (Arc<PressureHandler>, SharedCache, Arc<BatchController>) {
        let config = StoreConfig::default();
        let cache: SharedCache = Arc::new(Mutex::new(RecordCache::new()));
        let batch = Arc::new(BatchController::new(&config, &DeviceProfile::desktop()));
        let handler = Arc::new(PressureHandler::new(
            "test",
            &config,
            Arc::clone(&cache),
            Arc::clone(&batch),
        ));
        {
            let mut c = cache.lock().unwrap();
            for i in 0..50 {
                c.insert(&format!("k{i}"), json!(i));
            }
        }
        (handler, cache, batch)
    }

    fn event(level: PressureLevel, percentage: f64) -> PressureEvent {
        PressureEvent { level, percentage }
    }

    #[test]
    fn test_warning_shrinks_and_prunes() {
        let (handler, cache, batch) = handler();
        assert!(handler.handle(&event(PressureLevel::Warning, 75.0)));

        assert!(batch.current() < 100);
        assert!(batch.current() >= batch.floor());
        let cache = cache.lock().unwrap();
        assert_eq!(cache.len(), 20);
        assert!(cache.contains("k49"));
        assert!(!cache.contains("k0"));
    }

    #[test]
    fn test_danger_clears_and_floors() {
        let (handler, cache, batch) = handler();
        assert!(handler.handle(&event(PressureLevel::Danger, 90.0)));
        assert_eq!(batch.current(), 10);
        assert!(cache.lock().unwrap().is_empty());
    }

    #[test]
    fn test_events_at_or_below_threshold_are_ignored() {
        let (handler, cache, batch) = handler();
        assert!(!handler.handle(&event(PressureLevel::Warning, 70.0)));
        assert!(!handler.handle(&event(PressureLevel::Warning, 40.0)));
        assert!(!handler.handle(&event(PressureLevel::Danger, 85.0)));
        assert_eq!(batch.current(), 100);
        assert_eq!(cache.lock().unwrap().len(), 50);
    }

    #[test]
    fn test_subscription_round_trip() {
        let (handler, cache, batch) = handler();
        let monitor = ThresholdMonitor::default();
        monitor.start_monitoring();

        let subscription = handler.subscribe(&monitor);
        assert_eq!(monitor.callback_count(PressureLevel::Warning), 1);
        assert_eq!(monitor.callback_count(PressureLevel::Danger), 1);

        monitor.record_percentage(95.0);
        assert_eq!(batch.current(), 10);
        assert!(cache.lock().unwrap().is_empty());

        subscription.cancel(&monitor);
        assert_eq!(monitor.callback_count(PressureLevel::Warning), 0);
        assert_eq!(monitor.callback_count(PressureLevel::Danger), 0);

        batch.reset();
        monitor.record_percentage(95.0);
        assert_eq!(batch.current(), 100);
    }
}
