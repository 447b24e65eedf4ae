//! Unified error handling for the scheduling service
//!
//! Domain components return typed errors carrying a kind; the HTTP boundary
//! maps kinds to status codes. Only truly unexpected faults travel as
//! `Internal`, logged server-side and surfaced with a stable error id in
//! production.
//!
//! # Error taxonomy
//!
//! ```text
//! Error
//! ├── Validation (all offending fields enumerated)
//! ├── Unauthenticated / Forbidden / Locked
//! ├── NotFound
//! ├── Conflict
//! │   ├── duplicate
//! │   ├── overlap
//! │   ├── qualification
//! │   ├── availability
//! │   └── schedule_not_editable
//! ├── RateLimited / DeadlineExceeded / Cancelled
//! ├── SolverInfeasible / SolverTimeout
//! ├── DependencyUnavailable
//! └── Internal (anyhow::Error)
//! ```

use thiserror::Error;

/// Unified result type for service operations
pub type Result<T> = std::result::Result<T, Error>;

/// A single offending field in a validation failure
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Domain conflict sub-kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConflictKind {
    /// The (schedule, employee, shift) tuple already exists
    Duplicate,
    /// The employee already holds an overlapping shift
    Overlap,
    /// The employee lacks a required qualification tag
    Qualification,
    /// The shift falls outside the employee's availability
    Availability,
    /// The schedule is not in an editable status
    ScheduleNotEditable,
}

impl ConflictKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Duplicate => "duplicate",
            Self::Overlap => "overlap",
            Self::Qualification => "qualification",
            Self::Availability => "availability",
            Self::ScheduleNotEditable => "schedule_not_editable",
        }
    }
}

/// Unified error type
#[derive(Error, Debug)]
pub enum Error {
    /// Input failed validation; all offending fields are listed
    #[error("validation failed: {}", format_fields(.0))]
    Validation(Vec<FieldError>),

    /// Missing or invalid credentials
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// The actor is not permitted to perform the action
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The referenced entity does not exist
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A domain conflict
    #[error("conflict ({}): {message}", .kind.as_str())]
    Conflict {
        kind: ConflictKind,
        message: String,
    },

    /// The account is locked
    #[error("account locked: {0}")]
    Locked(String),

    /// Too many requests from the principal
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// The request deadline elapsed before completion
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// No assignment satisfies the hard constraints
    #[error("no feasible plan: {0}")]
    SolverInfeasible(String),

    /// The solver hit its time budget without any solution
    #[error("solver timed out without a solution")]
    SolverTimeout,

    /// The operation was cancelled
    #[error("cancelled")]
    Cancelled,

    /// A backing service is unavailable
    #[error("dependency unavailable: {0}")]
    DependencyUnavailable(String),

    /// Unexpected fault
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

fn format_fields(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(|f| format!("{}: {}", f.field, f.message))
        .collect::<Vec<_>>()
        .join("; ")
}

impl Error {
    /// Build a validation error from a single field
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation(vec![FieldError::new(field, message)])
    }

    /// Build a validation error from (field, message) pairs
    pub fn validation_all(errors: Vec<(&'static str, String)>) -> Self {
        Self::Validation(
            errors
                .into_iter()
                .map(|(f, m)| FieldError::new(f, m))
                .collect(),
        )
    }

    pub fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn conflict(kind: ConflictKind, message: impl Into<String>) -> Self {
        Self::Conflict {
            kind,
            message: message.into(),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::Unauthenticated(message.into())
    }

    pub fn dependency(message: impl Into<String>) -> Self {
        Self::DependencyUnavailable(message.into())
    }

    /// Wire-level kind string, stable across releases
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Unauthenticated(_) => "unauthenticated",
            Self::Forbidden(_) => "forbidden",
            Self::NotFound { .. } => "not_found",
            Self::Conflict { .. } => "conflict",
            Self::Locked(_) => "locked",
            Self::RateLimited { .. } => "rate_limited",
            Self::DeadlineExceeded => "deadline_exceeded",
            Self::SolverInfeasible(_) => "solver_infeasible",
            Self::SolverTimeout => "solver_timeout",
            Self::Cancelled => "cancelled",
            Self::DependencyUnavailable(_) => "dependency_unavailable",
            Self::Internal(_) => "internal",
        }
    }

    /// Whether the client may retry without modifying the request
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::DependencyUnavailable(_) | Self::SolverTimeout
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_lists_all_fields() {
        let err = Error::validation_all(vec![
            ("email", "invalid".to_string()),
            ("hourly_rate", "out of range".to_string()),
        ]);
        let text = err.to_string();
        assert!(text.contains("email"));
        assert!(text.contains("hourly_rate"));
        assert_eq!(err.kind(), "validation");
    }

    #[test]
    fn test_conflict_kind_strings() {
        let err = Error::conflict(ConflictKind::Overlap, "shifts overlap on Monday");
        assert_eq!(err.kind(), "conflict");
        assert!(err.to_string().contains("overlap"));
    }

    #[test]
    fn test_retryable() {
        assert!(Error::RateLimited { retry_after_secs: 30 }.is_retryable());
        assert!(Error::dependency("redis down").is_retryable());
        assert!(Error::SolverTimeout.is_retryable());
        assert!(!Error::conflict(ConflictKind::Duplicate, "dup").is_retryable());
        assert!(!Error::validation("f", "m").is_retryable());
    }

    #[test]
    fn test_not_found_message() {
        let err = Error::not_found("employee", "abc-123");
        assert_eq!(err.to_string(), "employee not found: abc-123");
        assert_eq!(err.kind(), "not_found");
    }

    #[test]
    fn test_internal_from_anyhow() {
        let err: Error = anyhow::anyhow!("boom").into();
        assert_eq!(err.kind(), "internal");
    }
}
