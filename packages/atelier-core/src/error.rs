//! # Error Handling
//!
//! Error types for Atelier Core.
//!
//! ## Error Hierarchy
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           ERROR HIERARCHY                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Error (top-level)                    Category                          │
//! │  │                                                                      │
//! │  ├── Validation(String)          ──►  Validation  (400)                 │
//! │  ├── Deserialization(String)     ──►  Validation  (400)                 │
//! │  ├── NotFound(String)            ──►  NotFound    (404)                 │
//! │  ├── NoSeats                     ──►  Capacity    (409)                 │
//! │  ├── AlreadyEnrolled             ──►  Conflict    (409)                 │
//! │  ├── Conflict(String)            ──►  Conflict    (409)                 │
//! │  ├── EnrollmentRolledBack(String)──►  Storage     (500)                 │
//! │  └── DatabaseError(String)       ──►  Storage     (500)                 │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Signaling handlers never surface these to the peer; they log and drop.
//! The REST layer maps [`Error::category`] onto an HTTP status.

use thiserror::Error;

/// Result type alias for Atelier Core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Atelier Core
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Validation Errors
    // ========================================================================

    /// A required field is missing or malformed
    #[error("Invalid request: {0}")]
    Validation(String),

    /// A payload could not be decoded
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    // ========================================================================
    // Lookup Errors
    // ========================================================================

    /// Referenced classroom, lesson, conversation or user does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    // ========================================================================
    // Enrollment Errors
    // ========================================================================

    /// Every active classroom of the course is at capacity
    #[error("No seats available for this course.")]
    NoSeats,

    /// The user already holds an active seat in this course
    #[error("User is already enrolled in this course.")]
    AlreadyEnrolled,

    /// A generic duplicate or state conflict
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The seat was claimed but the user record could not be updated, so
    /// the seat was released again
    #[error("Enrollment rolled back: {0}")]
    EnrollmentRolledBack(String),

    // ========================================================================
    // Storage Errors
    // ========================================================================

    /// Database error
    #[error("Database error: {0}")]
    DatabaseError(String),
}

/// Coarse error taxonomy shared by every surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    NotFound,
    Capacity,
    Conflict,
    Storage,
}

impl Error {
    /// Map this error onto the shared taxonomy.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Validation(_) | Error::Deserialization(_) => ErrorCategory::Validation,
            Error::NotFound(_) => ErrorCategory::NotFound,
            Error::NoSeats => ErrorCategory::Capacity,
            Error::AlreadyEnrolled | Error::Conflict(_) => ErrorCategory::Conflict,
            Error::EnrollmentRolledBack(_) | Error::DatabaseError(_) => ErrorCategory::Storage,
        }
    }

    /// Check if retrying the same request may succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::DatabaseError(_) | Error::EnrollmentRolledBack(_) | Error::NoSeats
        )
    }
}

// ============================================================================
// ERROR CONVERSIONS
// ============================================================================

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Deserialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert_eq!(Error::NoSeats.category(), ErrorCategory::Capacity);
        assert_eq!(Error::AlreadyEnrolled.category(), ErrorCategory::Conflict);
        assert_eq!(
            Error::NotFound("classroom".into()).category(),
            ErrorCategory::NotFound
        );
        assert_eq!(
            Error::Validation("missing userId".into()).category(),
            ErrorCategory::Validation
        );
        assert_eq!(
            Error::DatabaseError("locked".into()).category(),
            ErrorCategory::Storage
        );
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            Error::NoSeats.to_string(),
            "No seats available for this course."
        );
        assert!(Error::NotFound("lesson".into()).to_string().contains("lesson"));
    }

    #[test]
    fn test_rusqlite_conversion() {
        let err: Error = rusqlite::Error::QueryReturnedNoRows.into();
        assert_eq!(err.category(), ErrorCategory::Storage);
    }
}
