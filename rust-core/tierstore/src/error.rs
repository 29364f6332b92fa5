// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Construction-time errors for the TierStore facade.
//
// Storage failures never escape the facade; these are the only errors a
// caller can observe, and only while building a store.

use thiserror::Error;

/// Errors raised while building a [`crate::KvStore`].
#[derive(Debug, Error)]
pub enum TierError {
    /// A configuration value is out of range or inconsistent with another.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// No primary connector was supplied to the builder.
    #[error("no primary connector configured for collection '{0}'")]
    MissingPrimary(String),

    /// An environment variable could not be parsed.
    #[error("invalid value for {var}: {value}")]
    InvalidEnv {
        /// Variable name.
        var: String,
        /// The raw value that failed to parse.
        value: String,
    },
}

/// Convenience alias for builder results.
pub type TierResult<T> = Result<T, TierError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_config_display() {
        let err = TierError::InvalidConfig("min_batch_size must be at least 1".into());
        assert_eq!(
            err.to_string(),
            "invalid config: min_batch_size must be at least 1"
        );
    }

    #[test]
    fn test_missing_primary_display() {
        let err = TierError::MissingPrimary("settings".into());
        assert!(err.to_string().contains("'settings'"));
    }

    #[test]
    fn test_invalid_env_display() {
        let err = TierError::InvalidEnv {
            var: "TIERSTORE_MIN_BATCH_SIZE".into(),
            value: "ten".into(),
        };
        let message = format!("{err}");
        assert!(message.contains("TIERSTORE_MIN_BATCH_SIZE"));
        assert!(message.contains("ten"));
    }
}
