//! Engine Error Types
//!
//! One error enum for the whole core. The MCP shell maps these onto
//! structured JSON error payloads; lock contention is the only retryable
//! kind.

use std::time::Duration;

/// Engine error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Bad enum value, bad length, bad UUID, bad query
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    /// Write lock not acquired within the timeout
    #[error("Write lock busy (waited {0:?})")]
    Busy(Duration),
    /// Unknown id
    #[error("Not found: {0}")]
    NotFound(String),
    /// Ingestion reinforced an existing memory instead of creating one
    #[error("Duplicate suppressed; reinforced memory {0}")]
    DuplicateSuppressed(String),
    /// Underlying engine could not be initialized or reached
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
    /// Post-condition check failed; a compensating delete was attempted
    #[error("Integrity violation: {0}")]
    IntegrityViolation(String),
    /// Operation disabled by configuration (e.g. test memories quarantined)
    #[error("Capability disabled: {0}")]
    CapabilityDisabled(String),
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Serialization error
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl EngineError {
    /// Whether the caller should retry with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Busy(_) | EngineError::StoreUnavailable(_))
    }

    /// Short machine-readable kind tag for wire errors.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::InvalidInput(_) => "invalid_input",
            EngineError::Busy(_) => "busy",
            EngineError::NotFound(_) => "not_found",
            EngineError::DuplicateSuppressed(_) => "duplicate_suppressed",
            EngineError::StoreUnavailable(_) => "store_unavailable",
            EngineError::IntegrityViolation(_) => "integrity_violation",
            EngineError::CapabilityDisabled(_) => "capability_disabled",
            EngineError::Database(_) => "store_unavailable",
            EngineError::Io(_) => "store_unavailable",
            EngineError::Serde(_) => "invalid_input",
        }
    }
}

/// Engine result type
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        assert!(EngineError::Busy(Duration::from_secs(10)).is_retryable());
        assert!(EngineError::StoreUnavailable("locked".into()).is_retryable());
        assert!(!EngineError::InvalidInput("bad layer".into()).is_retryable());
        assert!(!EngineError::NotFound("x".into()).is_retryable());
    }

    #[test]
    fn test_kind_tags() {
        assert_eq!(EngineError::InvalidInput("x".into()).kind(), "invalid_input");
        assert_eq!(
            EngineError::Busy(Duration::from_secs(1)).kind(),
            "busy"
        );
        assert_eq!(
            EngineError::CapabilityDisabled("test memories".into()).kind(),
            "capability_disabled"
        );
    }
}
