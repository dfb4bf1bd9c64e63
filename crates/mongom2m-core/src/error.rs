//! Core error types for mongom2m.
//!
//! [`M2MError`] covers the failures the relationship layer can surface: the
//! single-object fetch errors the host framework raises (`DoesNotExist`,
//! `MultipleObjectsReturned`), the dedicated query error raised when a
//! relationship filter cannot be translated, usage errors on the synthetic
//! through model, and errors bubbled up from the storage driver.

use thiserror::Error;

/// The primary error type for mongom2m.
#[derive(Error, Debug)]
pub enum M2MError {
    // ── Single-object fetch ──────────────────────────────────────────

    /// Raised when a query expected exactly one result but found none.
    #[error("Object does not exist: {0}")]
    DoesNotExist(String),

    /// Raised when a query expected exactly one result but found multiple.
    #[error("Multiple objects returned when one expected: {0}")]
    MultipleObjectsReturned(String),

    // ── Relationship queries ─────────────────────────────────────────

    /// A filter on a relationship field could not be translated into the
    /// stored representation.
    #[error("Invalid relationship query: {0}")]
    QueryError(String),

    /// A value could not be coerced into a document identifier.
    #[error("Invalid object id: {0}")]
    InvalidId(String),

    /// An operation was called with arguments it cannot accept.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The through model query set was accessed without first being bound to
    /// a host or target instance through `filter()`.
    #[error("Relationship query is not bound to an instance: {0}")]
    UnboundQuery(String),

    /// An operation needs a saved document (one with a primary key).
    #[error("Unsaved instance: {0}")]
    UnsavedInstance(String),

    // ── Configuration ────────────────────────────────────────────────

    /// A schema or field definition is inconsistent.
    #[error("Improperly configured: {0}")]
    ImproperlyConfigured(String),

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    // ── Storage ──────────────────────────────────────────────────────

    /// A generic error reported by the storage driver.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// A stored value could not be converted.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl M2MError {
    /// Returns `true` for the "no such object" family of errors.
    ///
    /// Dangling references are expected in an embedded-copy model, so callers
    /// resolving references use this to skip rather than propagate.
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::DoesNotExist(_))
    }
}

/// A convenience type alias for `Result<T, M2MError>`.
pub type M2MResult<T> = Result<T, M2MError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = M2MError::DoesNotExist("TestTag matching query does not exist.".into());
        assert_eq!(
            err.to_string(),
            "Object does not exist: TestTag matching query does not exist."
        );
    }

    #[test]
    fn test_query_error_display() {
        let err = M2MError::QueryError("name = 'tom'".into());
        assert!(err.to_string().contains("name = 'tom'"));
    }

    #[test]
    fn test_is_not_found() {
        assert!(M2MError::DoesNotExist("x".into()).is_not_found());
        assert!(!M2MError::MultipleObjectsReturned("x".into()).is_not_found());
        assert!(!M2MError::DatabaseError("x".into()).is_not_found());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err: M2MError = io_err.into();
        assert!(err.to_string().contains("file missing"));
    }
}
