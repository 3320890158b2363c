//! Error types for resume-state operations.

use std::fmt;

use thiserror::Error;

use super::ItemStatus;

/// Classification of resume-database failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeDbErrorKind {
    /// `SQLite` returned busy/locked.
    BusyOrLocked,
    /// Constraint failure (unique/check/not-null).
    ConstraintViolation,
    /// Connection pool timed out waiting for a free connection.
    PoolTimeout,
    /// Connection pool is closed.
    PoolClosed,
    /// Filesystem or transport IO failure.
    Io,
    /// Unclassified database failure.
    Other,
}

impl ResumeDbErrorKind {
    /// Maps a sqlx error onto a kind.
    #[must_use]
    pub fn from_sqlx(error: &sqlx::Error) -> Self {
        match error {
            sqlx::Error::PoolTimedOut => Self::PoolTimeout,
            sqlx::Error::PoolClosed => Self::PoolClosed,
            sqlx::Error::Io(_) => Self::Io,
            sqlx::Error::Database(database_error) => {
                let code = database_error.code();
                if matches!(
                    code.as_deref(),
                    Some("SQLITE_BUSY" | "SQLITE_LOCKED" | "5" | "6")
                ) || database_error.message().contains("database is locked")
                {
                    Self::BusyOrLocked
                } else if database_error.is_unique_violation()
                    || database_error.is_check_violation()
                {
                    Self::ConstraintViolation
                } else {
                    Self::Other
                }
            }
            _ => Self::Other,
        }
    }
}

impl fmt::Display for ResumeDbErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::BusyOrLocked => "busy_or_locked",
            Self::ConstraintViolation => "constraint_violation",
            Self::PoolTimeout => "pool_timeout",
            Self::PoolClosed => "pool_closed",
            Self::Io => "io",
            Self::Other => "other",
        };
        write!(f, "{label}")
    }
}

/// Errors that can occur while reading or updating resume state.
#[derive(Debug, Clone, Error)]
pub enum ResumeError {
    /// Database operation failed.
    #[error("resume database error ({kind}): {message}")]
    Database {
        /// Typed classification.
        kind: ResumeDbErrorKind,
        /// Database error text.
        message: String,
    },

    /// No work item exists for the key.
    #[error("work item not found: {0}")]
    ItemNotFound(String),

    /// The requested status change is not an edge of the state machine.
    #[error("invalid transition for {key}: {from} -> {to}")]
    InvalidTransition {
        /// Work item key (`conference/year/paper`).
        key: String,
        /// Current status.
        from: ItemStatus,
        /// Requested status.
        to: ItemStatus,
    },
}

impl From<sqlx::Error> for ResumeError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database {
            kind: ResumeDbErrorKind::from_sqlx(&err),
            message: err.to_string(),
        }
    }
}

impl ResumeError {
    /// Returns the database error kind, when this is a database error.
    #[must_use]
    pub fn database_kind(&self) -> Option<ResumeDbErrorKind> {
        match self {
            Self::Database { kind, .. } => Some(*kind),
            Self::ItemNotFound(_) | Self::InvalidTransition { .. } => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_resume_error_database_message() {
        let err = ResumeError::Database {
            kind: ResumeDbErrorKind::BusyOrLocked,
            message: "database is locked".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("busy_or_locked"));
        assert!(msg.contains("database is locked"));
        assert_eq!(err.database_kind(), Some(ResumeDbErrorKind::BusyOrLocked));
    }

    #[test]
    fn test_resume_error_invalid_transition_message() {
        let err = ResumeError::InvalidTransition {
            key: "icml/2023/abc".to_string(),
            from: ItemStatus::Done,
            to: ItemStatus::Fetching,
        };
        assert_eq!(
            err.to_string(),
            "invalid transition for icml/2023/abc: done -> fetching"
        );
        assert_eq!(err.database_kind(), None);
    }

    #[test]
    fn test_resume_error_from_sqlx_pool_timeout() {
        let err = ResumeError::from(sqlx::Error::PoolTimedOut);
        assert_eq!(err.database_kind(), Some(ResumeDbErrorKind::PoolTimeout));
    }
}
