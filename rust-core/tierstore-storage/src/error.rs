// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Storage error types for TierStore backends.
//
// The four tiers of failure a store can meet: the primary cannot be opened,
// a single operation fails inside an open backend, a value cannot be encoded
// for the flat backend, or no backend is available at all. Corruption and raw
// I/O failures are reported separately so callers can log them precisely.

use thiserror::Error;

/// Errors that can occur when interacting with a storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The primary backend could not be opened or its collection created.
    #[error("initialization failed: {0}")]
    Initialization(String),

    /// A single operation failed inside an otherwise open backend.
    #[error("transaction failed: {0}")]
    Transaction(String),

    /// A value could not be encoded as or decoded from JSON.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The backend itself is not available in this environment.
    #[error("environment unavailable: {0}")]
    Environment(String),

    /// The stored bytes are not in the expected format.
    #[error("corrupted data: {0}")]
    CorruptedData(String),

    /// An I/O error occurred in the underlying storage layer.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// True when nothing is left to degrade to.
    pub fn is_environment(&self) -> bool {
        matches!(self, StorageError::Environment(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_display() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file gone");
        let err = StorageError::Io(io_err);
        assert!(err.to_string().contains("I/O error"));
    }

    #[test]
    fn test_initialization_display() {
        let err = StorageError::Initialization("locked".to_string());
        assert_eq!(err.to_string(), "initialization failed: locked");
    }

    #[test]
    fn test_transaction_display() {
        let err = StorageError::Transaction("commit: disk full".to_string());
        assert!(err.to_string().contains("transaction failed"));
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn test_serialization_display() {
        let err = StorageError::Serialization("key must be a string".to_string());
        assert!(err.to_string().contains("serialization error"));
    }

    #[test]
    fn test_environment_display_and_predicate() {
        let err = StorageError::Environment("no flat store configured".to_string());
        assert!(err.to_string().contains("environment unavailable"));
        assert!(err.is_environment());
        assert!(!StorageError::Transaction("x".into()).is_environment());
    }

    #[test]
    fn test_corrupted_data_display() {
        let err = StorageError::CorruptedData("trailing characters".to_string());
        assert!(err.to_string().contains("corrupted data"));
    }
}
