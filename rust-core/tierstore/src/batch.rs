// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Adaptive batch-size controller.
//
// The baseline is fixed at construction from the device profile. After that
// the size only moves down, driven by pressure, until `reset` restores the
// baseline. It always stays within `[floor, baseline]`.

use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::debug;

use crate::config::StoreConfig;
use crate::device::DeviceProfile;

/// Owns the effective write-batch size.
#[derive(Debug)]
pub struct BatchController {
    baseline: usize,
    floor: usize,
    min_fraction: f64,
    warning_threshold: f64,
    current: AtomicUsize,
}

impl BatchController {
    /// Derive the baseline from `config` and `device`.
    ///
    /// The baseline is the smallest of the default size, the mobile size when
    /// the device is mobile, and the low-memory size when the device reports
    /// little memory; never below the configured floor.
    pub fn new(config: &StoreConfig, device: &DeviceProfile) -> Self {
        let mut baseline = config.default_batch_size;
        if device.is_mobile {
            baseline = baseline.min(config.mobile_batch_size);
        }
        if device.is_low_memory(config.low_memory_threshold_gb) {
            baseline = baseline.min(config.low_memory_batch_size);
        }
        let baseline = baseline.max(config.min_batch_size);

        debug!(
            baseline,
            floor = config.min_batch_size,
            is_mobile = device.is_mobile,
            device_memory_gb = ?device.device_memory_gb,
            "batch size derived"
        );

        Self {
            baseline,
            floor: config.min_batch_size,
            min_fraction: config.min_batch_fraction,
            warning_threshold: config.warning_threshold,
            current: AtomicUsize::new(baseline),
        }
    }

    /// The batch size in effect right now.
    pub fn current(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }

    /// The size fixed at construction, also the ceiling.
    pub fn baseline(&self) -> usize {
        self.baseline
    }

    /// The absolute floor.
    pub fn floor(&self) -> usize {
        self.floor
    }

    /// Shrink factor for a usage ratio:
    /// `max(min_fraction, 1 - (ratio - warning_threshold) * 2)`, capped at 1.
    pub fn shrink_factor(&self, ratio: f64) -> f64 {
        let raw = 1.0 - (ratio - self.warning_threshold) * 2.0;
        raw.max(self.min_fraction).min(1.0)
    }

    /// Apply a warning at `ratio`. Returns the new size.
    ///
    /// Whenever the size is above the floor the result is strictly smaller.
    pub fn shrink_for_ratio(&self, ratio: f64) -> usize {
        let factor = self.shrink_factor(ratio);
        let floor = self.floor;
        let update = self
            .current
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                if current <= floor {
                    return None;
                }
                let scaled = (current as f64 * factor).round() as usize;
                Some(scaled.min(current - 1).max(floor))
            });
        match update {
            Ok(previous) => {
                let next = self.current();
                debug!(previous, next, ratio, factor, "batch size reduced");
                next
            }
            Err(current) => current,
        }
    }

    /// Drop straight to the floor. Returns the new size.
    pub fn drop_to_floor(&self) -> usize {
        let previous = self.current.swap(self.floor, Ordering::SeqCst);
        if previous != self.floor {
            debug!(previous, next = self.floor, "batch size dropped to floor");
        }
        self.floor
    }

    /// Restore the baseline.
    pub fn reset(&self) {
        self.current.store(self.baseline, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn controller(device: DeviceProfile) -> BatchController {
        BatchController::new(&StoreConfig::default(), &device)
    }

    #[test]
    fn test_baseline_per_device_class() {
        assert_eq!(controller(DeviceProfile::desktop()).baseline(), 100);
        assert_eq!(controller(DeviceProfile::mobile(None)).baseline(), 50);
        assert_eq!(
            controller(DeviceProfile::desktop().with_memory_gb(1.0)).baseline(),
            25
        );
        assert_eq!(controller(DeviceProfile::mobile(Some(1.0))).baseline(), 25);
        assert_eq!(controller(DeviceProfile::mobile(Some(8.0))).baseline(), 50);
    }

    #[test]
    fn test_baseline_never_below_floor() {
        let config = StoreConfig {
            low_memory_batch_size: 2,
            min_batch_size: 10,
            ..Default::default()
        };
        let c = BatchController::new(&config, &DeviceProfile::mobile(Some(0.5)));
        assert_eq!(c.baseline(), 10);
        assert_eq!(c.current(), 10);
    }

    #[test]
    fn test_warning_at_78_percent() {
        let c = controller(DeviceProfile::desktop());
        // factor = 1 - 0.08 * 2 = 0.84
        assert!((c.shrink_factor(0.78) - 0.84).abs() < 1e-9);
        assert_eq!(c.shrink_for_ratio(0.78), 84);
        assert_eq!(c.current(), 84);
    }

    #[test]
    fn test_factor_bounded_by_min_fraction() {
        let c = controller(DeviceProfile::desktop());
        assert_eq!(c.shrink_factor(0.99), 0.5);
        assert_eq!(c.shrink_for_ratio(0.99), 50);
    }

    #[test]
    fn test_shrink_makes_progress_near_threshold() {
        let c = controller(DeviceProfile::desktop());
        // 100 * 0.998 rounds back to 100; the size still drops by one.
        assert_eq!(c.shrink_for_ratio(0.701), 99);
        // At the threshold the factor is 1, still shrinks by one.
        assert_eq!(c.shrink_for_ratio(0.7), 98);
    }

    #[test]
    fn test_floor_and_reset() {
        let c = controller(DeviceProfile::desktop());
        assert_eq!(c.drop_to_floor(), 10);
        assert_eq!(c.current(), 10);

        // Warnings cannot push below the floor.
        assert_eq!(c.shrink_for_ratio(0.95), 10);

        c.reset();
        assert_eq!(c.current(), 100);
    }

    proptest! {
        #[test]
        fn test_shrink_stays_in_bounds(ratios in prop::collection::vec(0.7f64..1.0, 1..40)) {
            let c = controller(DeviceProfile::desktop());
            for ratio in ratios {
                let before = c.current();
                let after = c.shrink_for_ratio(ratio);
                prop_assert!(after >= c.floor());
                prop_assert!(after <= c.baseline());
                if before > c.floor() {
                    prop_assert!(after < before);
                } else {
                    prop_assert_eq!(after, before);
                }
            }
        }
    }
}
