// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Store configuration.
//
// Every tunable of the facade lives in `StoreConfig`: batch sizing per
// device class, the pressure thresholds and what each tier does, cache
// bounds, and whether the primary is opened eagerly. Defaults match a
// typical desktop client; `from_env` overlays `TIERSTORE_*` variables.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{TierError, TierResult};

/// Configuration for a [`crate::KvStore`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Layout version passed to the primary connector on open.
    pub schema_version: u32,
    /// Batch size for a desktop-class device.
    pub default_batch_size: usize,
    /// Batch size cap applied on mobile devices.
    pub mobile_batch_size: usize,
    /// Batch size cap applied on low-memory devices.
    pub low_memory_batch_size: usize,
    /// Devices reporting this much memory (GB) or less count as low-memory.
    pub low_memory_threshold_gb: f64,
    /// Absolute floor for the batch size; danger pressure drops straight to it.
    pub min_batch_size: usize,
    /// Smallest factor a single warning event may shrink the batch size by.
    pub min_batch_fraction: f64,
    /// Usage ratio above which a warning event is acted on.
    pub warning_threshold: f64,
    /// Usage ratio above which a danger event is acted on.
    pub danger_threshold: f64,
    /// Entries kept in the cache after a warning prune.
    pub warning_cache_retain: usize,
    /// Cache capacity while memory optimization is enabled.
    pub optimized_cache_capacity: usize,
    /// Open the primary while building the store instead of on first use.
    pub eager_init: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            schema_version: 1,
            default_batch_size: 100,
            mobile_batch_size: 50,
            low_memory_batch_size: 25,
            low_memory_threshold_gb: 2.0,
            min_batch_size: 10,
            min_batch_fraction: 0.5,
            warning_threshold: 0.7,
            danger_threshold: 0.85,
            warning_cache_retain: 20,
            optimized_cache_capacity: 500,
            eager_init: false,
        }
    }
}

impl StoreConfig {
    /// Check that the values are usable together.
    pub fn validate(&self) -> TierResult<()> {
        if self.min_batch_size == 0 {
            return Err(TierError::InvalidConfig(
                "min_batch_size must be at least 1".into(),
            ));
        }
        if self.default_batch_size < self.min_batch_size {
            return Err(TierError::InvalidConfig(format!(
                "default_batch_size ({}) is below min_batch_size ({})",
                self.default_batch_size, self.min_batch_size
            )));
        }
        if !(self.min_batch_fraction > 0.0 && self.min_batch_fraction <= 1.0) {
            return Err(TierError::InvalidConfig(format!(
                "min_batch_fraction must be in (0, 1], got {}",
                self.min_batch_fraction
            )));
        }
        for (name, value) in [
            ("warning_threshold", self.warning_threshold),
            ("danger_threshold", self.danger_threshold),
        ] {
            if !(value > 0.0 && value < 1.0) {
                return Err(TierError::InvalidConfig(format!(
                    "{name} must be in (0, 1), got {value}"
                )));
            }
        }
        if self.warning_threshold >= self.danger_threshold {
            return Err(TierError::InvalidConfig(format!(
                "warning_threshold ({}) must be below danger_threshold ({})",
                self.warning_threshold, self.danger_threshold
            )));
        }
        if self.optimized_cache_capacity == 0 {
            return Err(TierError::InvalidConfig(
                "optimized_cache_capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Defaults overlaid with any `TIERSTORE_*` environment variables.
    ///
    /// Recognised variables: `TIERSTORE_SCHEMA_VERSION`,
    /// `TIERSTORE_DEFAULT_BATCH_SIZE`, `TIERSTORE_MOBILE_BATCH_SIZE`,
    /// `TIERSTORE_LOW_MEMORY_BATCH_SIZE`, `TIERSTORE_MIN_BATCH_SIZE`,
    /// `TIERSTORE_WARNING_THRESHOLD`, `TIERSTORE_DANGER_THRESHOLD`,
    /// `TIERSTORE_WARNING_CACHE_RETAIN`, `TIERSTORE_CACHE_CAPACITY` and
    /// `TIERSTORE_EAGER_INIT`.
    pub fn from_env() -> TierResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`StoreConfig::from_env`], reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> TierResult<Self> {
        let mut config = Self::default();

        overlay(&lookup, "TIERSTORE_SCHEMA_VERSION", &mut config.schema_version)?;
        overlay(&lookup, "TIERSTORE_DEFAULT_BATCH_SIZE", &mut config.default_batch_size)?;
        overlay(&lookup, "TIERSTORE_MOBILE_BATCH_SIZE", &mut config.mobile_batch_size)?;
        overlay(
            &lookup,
            "TIERSTORE_LOW_MEMORY_BATCH_SIZE",
            &mut config.low_memory_batch_size,
        )?;
        overlay(&lookup, "TIERSTORE_MIN_BATCH_SIZE", &mut config.min_batch_size)?;
        overlay(&lookup, "TIERSTORE_WARNING_THRESHOLD", &mut config.warning_threshold)?;
        overlay(&lookup, "TIERSTORE_DANGER_THRESHOLD", &mut config.danger_threshold)?;
        overlay(
            &lookup,
            "TIERSTORE_WARNING_CACHE_RETAIN",
            &mut config.warning_cache_retain,
        )?;
        overlay(
            &lookup,
            "TIERSTORE_CACHE_CAPACITY",
            &mut config.optimized_cache_capacity,
        )?;
        overlay(&lookup, "TIERSTORE_EAGER_INIT", &mut config.eager_init)?;

        config.validate()?;
        Ok(config)
    }
}

fn overlay<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &str,
    slot: &mut T,
) -> TierResult<()> {
    if let Some(raw) = lookup(var) {
        *slot = raw.trim().parse().map_err(|_| TierError::InvalidEnv {
            var: var.to_string(),
            value: raw.clone(),
        })?;
        debug!(var, value = %raw, "config override from environment");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_default_is_valid() {
        StoreConfig::default().validate().unwrap();
    }

    #[test]
    fn test_rejects_zero_floor() {
        let config = StoreConfig {
            min_batch_size: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(TierError::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_floor_above_default() {
        let config = StoreConfig {
            default_batch_size: 5,
            min_batch_size: 10,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_inverted_thresholds() {
        let config = StoreConfig {
            warning_threshold: 0.9,
            danger_threshold: 0.8,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = StoreConfig {
            danger_threshold: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_fraction() {
        for fraction in [0.0, -0.1, 1.5, f64::NAN] {
            let config = StoreConfig {
                min_batch_fraction: fraction,
                ..Default::default()
            };
            assert!(config.validate().is_err(), "fraction {fraction} accepted");
        }
    }

    #[test]
    fn test_env_overlay() {
        let config = StoreConfig::from_lookup(lookup_from(&[
            ("TIERSTORE_DEFAULT_BATCH_SIZE", "200"),
            ("TIERSTORE_MIN_BATCH_SIZE", " 5 "),
            ("TIERSTORE_EAGER_INIT", "true"),
        ]))
        .unwrap();

        assert_eq!(config.default_batch_size, 200);
        assert_eq!(config.min_batch_size, 5);
        assert!(config.eager_init);
        assert_eq!(config.mobile_batch_size, 50);
    }

    #[test]
    fn test_env_overlay_rejects_garbage() {
        let err = StoreConfig::from_lookup(lookup_from(&[("TIERSTORE_MIN_BATCH_SIZE", "ten")]))
            .unwrap_err();
        assert!(matches!(err, TierError::InvalidEnv { .. }));
    }

    #[test]
    fn test_env_overlay_is_validated() {
        let err = StoreConfig::from_lookup(lookup_from(&[("TIERSTORE_MIN_BATCH_SIZE", "0")]))
            .unwrap_err();
        assert!(matches!(err, TierError::InvalidConfig(_)));
    }

    #[test]
    fn test_serde_fills_missing_fields() {
        let config: StoreConfig = serde_json::from_str(r#"{"default_batch_size": 64}"#).unwrap();
        assert_eq!(config.default_batch_size, 64);
        assert_eq!(config.min_batch_size, 10);
    }
}
