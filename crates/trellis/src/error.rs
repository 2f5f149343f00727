//! Error types for trellis.
//!
//! Errors are layered the same way the components are:
//!
//! - **`StoreError`**: failures inside a [`GraphStore`](crate::storage::GraphStore)
//! - **`AuditError`**: failures inside an [`AuditSink`](crate::audit::AuditSink)
//! - **`Error`**: what callers of the engine see
//!
//! ## Error Categorization
//!
//! [`ErrorKind`] uses a 4xx/5xx style split: conflicts, missing flags and
//! rejected input are the caller's problem; store, audit and configuration
//! failures are ours.

use crate::domain::FlagId;
use std::time::Duration;
use thiserror::Error;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure reported by a graph store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A flag with this name already exists
    #[error("flag name already taken: {0}")]
    DuplicateName(String),

    /// A flag referenced by a write does not exist
    #[error("flag {0} does not exist")]
    MissingFlag(FlagId),

    /// An activation was refused because these dependencies are inactive
    #[error("inactive dependencies: {}", join_ids(.0))]
    InactiveDependencies(Vec<FlagId>),

    /// The store did not answer within the configured deadline
    #[error("store operation '{operation}' timed out after {after:?}")]
    Timeout {
        /// Name of the store operation that was cut off.
        operation: &'static str,
        /// The deadline that elapsed.
        after: Duration,
    },

    /// Backend-specific failure with no richer representation
    #[error("store backend error: {0}")]
    Backend(String),

    /// File system operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure reported by an audit sink.
#[derive(Debug, Error)]
pub enum AuditError {
    /// The JSONL file could not be written or decoded
    #[error("audit log error: {0}")]
    Jsonl(#[from] trellis_jsonl::Error),

    /// File system operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Backend-specific failure
    #[error("audit backend error: {0}")]
    Backend(String),

    /// The sink did not answer within the configured deadline
    #[error("audit operation timed out after {0:?}")]
    Timeout(Duration),
}

/// Error returned by engine operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Another flag already uses this name
    #[error("flag name '{0}' is already in use")]
    NameConflict(String),

    /// The addressed flag does not exist
    #[error("flag {0} not found")]
    FlagNotFound(FlagId),

    /// Some requested dependencies do not exist
    #[error("dependencies not found: {}", join_ids(.0))]
    DependenciesNotFound(Vec<FlagId>),

    /// Some dependencies are inactive
    #[error("inactive dependencies: {}", join_ids(.inactive))]
    InactiveDependencies {
        /// Every inactive dependency, ascending.
        inactive: Vec<FlagId>,
    },

    /// Flag name failed validation
    #[error("invalid flag name: {0}")]
    InvalidName(String),

    /// Toggle reason failed validation
    #[error("invalid reason: {0}")]
    InvalidReason(String),

    /// Page or page size out of range
    #[error("invalid pagination: {0}")]
    InvalidPagination(String),

    /// The graph store failed
    #[error(transparent)]
    Store(StoreError),

    /// The audit sink failed
    #[error(transparent)]
    Audit(#[from] AuditError),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// File system operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateName(name) => Self::NameConflict(name),
            StoreError::MissingFlag(id) => Self::FlagNotFound(id),
            StoreError::InactiveDependencies(inactive) => Self::InactiveDependencies { inactive },
            other => Self::Store(other),
        }
    }
}

fn join_ids(ids: &[FlagId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    // === Caller problems (analogous to HTTP 4xx) ===
    /// Uniqueness violated
    Conflict,

    /// Addressed flag does not exist
    NotFound,

    /// Dependency rules rejected the request
    ValidationFailed,

    /// Malformed input
    InvalidInput,

    // === Internal problems (analogous to HTTP 5xx) ===
    /// Graph store failure
    Store,

    /// Audit sink failure
    Audit,

    /// Configuration or startup failure
    Config,
}

impl ErrorKind {
    /// Returns `true` if the caller can fix the request.
    #[must_use]
    pub fn is_input_error(self) -> bool {
        matches!(
            self,
            Self::Conflict | Self::NotFound | Self::ValidationFailed | Self::InvalidInput
        )
    }

    /// Returns `true` if the failure is on the service side.
    #[must_use]
    pub fn is_internal_error(self) -> bool {
        !self.is_input_error()
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Conflict => "conflict",
            Self::NotFound => "not_found",
            Self::ValidationFailed => "validation_failed",
            Self::InvalidInput => "invalid_input",
            Self::Store => "store_error",
            Self::Audit => "audit_error",
            Self::Config => "config_error",
        };
        f.write_str(label)
    }
}

impl Error {
    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NameConflict(_) => ErrorKind::Conflict,
            Self::FlagNotFound(_) | Self::DependenciesNotFound(_) => ErrorKind::NotFound,
            Self::InactiveDependencies { .. } => ErrorKind::ValidationFailed,
            Self::InvalidName(_) | Self::InvalidReason(_) | Self::InvalidPagination(_) => {
                ErrorKind::InvalidInput
            }
            Self::Store(_) => ErrorKind::Store,
            Self::Audit(_) => ErrorKind::Audit,
            Self::Config(_) | Self::Io(_) => ErrorKind::Config,
        }
    }

    /// Returns `true` if repeating the same request may succeed.
    ///
    /// Store failures abort the whole operation with no partial effect, so
    /// they are always safe to retry. Input errors fail the same way again.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Store(_) | Self::Audit(AuditError::Timeout(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::conflict(Error::NameConflict("a".into()), ErrorKind::Conflict)]
    #[case::not_found(Error::FlagNotFound(FlagId(9)), ErrorKind::NotFound)]
    #[case::missing_deps(Error::DependenciesNotFound(vec![FlagId(2)]), ErrorKind::NotFound)]
    #[case::inactive_deps(
        Error::InactiveDependencies { inactive: vec![FlagId(1)] },
        ErrorKind::ValidationFailed
    )]
    #[case::bad_reason(Error::InvalidReason("empty".into()), ErrorKind::InvalidInput)]
    #[case::store(Error::Store(StoreError::Backend("down".into())), ErrorKind::Store)]
    #[case::audit(Error::Audit(AuditError::Backend("down".into())), ErrorKind::Audit)]
    fn kinds(#[case] err: Error, #[case] expected: ErrorKind) {
        assert_eq!(err.kind(), expected);
    }

    #[test]
    fn store_errors_with_domain_meaning_are_lifted() {
        let conflict: Error = StoreError::DuplicateName("checkout".into()).into();
        assert!(matches!(conflict, Error::NameConflict(ref n) if n == "checkout"));

        let missing: Error = StoreError::MissingFlag(FlagId(4)).into();
        assert!(matches!(missing, Error::FlagNotFound(FlagId(4))));

        let refused: Error = StoreError::InactiveDependencies(vec![FlagId(6)]).into();
        assert!(matches!(refused, Error::InactiveDependencies { ref inactive } if inactive == &[FlagId(6)]));
        assert!(!refused.is_retryable());
    }

    #[test]
    fn id_lists_render_comma_separated() {
        let err = Error::InactiveDependencies {
            inactive: vec![FlagId(2), FlagId(5)],
        };
        assert_eq!(err.to_string(), "inactive dependencies: 2, 5");
    }

    #[test]
    fn store_failures_are_retryable() {
        let timeout: Error = StoreError::Timeout {
            operation: "find_by_id",
            after: Duration::from_millis(5),
        }
        .into();
        assert!(timeout.is_retryable());
        assert!(Error::Store(StoreError::Backend("down".into())).is_retryable());
        assert!(!Error::FlagNotFound(FlagId(1)).is_retryable());
        assert!(!Error::Audit(AuditError::Backend("down".into())).is_retryable());
    }

    #[test]
    fn input_and_internal_are_disjoint() {
        assert!(ErrorKind::NotFound.is_input_error());
        assert!(ErrorKind::Store.is_internal_error());
        assert!(!ErrorKind::Audit.is_input_error());
    }
}
