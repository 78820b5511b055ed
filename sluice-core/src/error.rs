//! Error types for sluice operations

use crate::EntityKind;
use std::time::Duration;
use thiserror::Error;

/// Cache layer errors.
///
/// These never reach callers of the cache store: they are logged and the
/// failed operation is treated as a miss.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache backend failure during {operation}: {reason}")]
    Backend { operation: String, reason: String },

    #[error("Serialization failed for key {key}: {reason}")]
    Serialization { key: String, reason: String },

    #[error("Deserialization failed for key {key}: {reason}")]
    Deserialization { key: String, reason: String },

    #[error("Cache lock poisoned")]
    LockPoisoned,
}

/// Failures raised by injected fetch and mutation collaborators.
///
/// Every variant names the operation and the entity it concerned so the
/// caller can report what failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("{operation} failed for {kind} {id}: {reason}")]
    RequestFailed {
        operation: String,
        kind: EntityKind,
        id: String,
        reason: String,
    },

    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: String },

    #[error("{operation} returned an unusable payload for {kind} {id}: {reason}")]
    InvalidPayload {
        operation: String,
        kind: EntityKind,
        id: String,
        reason: String,
    },

    #[error("{operation} timed out for {kind} {id} after {elapsed:?}")]
    Timeout {
        operation: String,
        kind: EntityKind,
        id: String,
        elapsed: Duration,
    },

    #[error("{operation} for {kind} {id} was cancelled before completing")]
    Cancelled {
        operation: String,
        kind: EntityKind,
        id: String,
    },
}

/// Validation errors for caller-supplied input.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all sluice errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SluiceError {
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl SluiceError {
    /// True if this error came from a fetch or mutation collaborator.
    pub fn is_fetch_failure(&self) -> bool {
        matches!(self, SluiceError::Fetch(_))
    }
}

/// Result type alias for sluice operations.
pub type SluiceResult<T> = Result<T, SluiceError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_display_names_operation_and_id() {
        let err = FetchError::RequestFailed {
            operation: "get dataflow".to_string(),
            kind: EntityKind::Dataflow,
            id: "42".to_string(),
            reason: "HTTP 502".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("get dataflow"));
        assert!(msg.contains("dataflow 42"));
        assert!(msg.contains("HTTP 502"));
    }

    #[test]
    fn test_fetch_error_display_timeout() {
        let err = FetchError::Timeout {
            operation: "search".to_string(),
            kind: EntityKind::Dataflow,
            id: "*".to_string(),
            elapsed: Duration::from_secs(30),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("timed out"));
        assert!(msg.contains("30s"));
    }

    #[test]
    fn test_cache_error_display_backend() {
        let err = CacheError::Backend {
            operation: "put".to_string(),
            reason: "map full".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("put"));
        assert!(msg.contains("map full"));
    }

    #[test]
    fn test_config_error_display_invalid_value() {
        let err = ConfigError::InvalidValue {
            field: "cache.default_ttl".to_string(),
            value: "0ns".to_string(),
            reason: "must be positive".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("cache.default_ttl"));
        assert!(msg.contains("0ns"));
        assert!(msg.contains("must be positive"));
    }

    #[test]
    fn test_sluice_error_from_variants() {
        let cache = SluiceError::from(CacheError::LockPoisoned);
        assert!(matches!(cache, SluiceError::Cache(_)));

        let fetch = SluiceError::from(FetchError::NotFound {
            kind: EntityKind::Dataflow,
            id: "7".to_string(),
        });
        assert!(fetch.is_fetch_failure());

        let validation = SluiceError::from(ValidationError::RequiredFieldMissing {
            field: "id".to_string(),
        });
        assert!(matches!(validation, SluiceError::Validation(_)));
        assert!(!validation.is_fetch_failure());

        let config = SluiceError::from(ConfigError::MissingRequired {
            field: "cache.backend.path".to_string(),
        });
        assert!(matches!(config, SluiceError::Config(_)));
    }
}
