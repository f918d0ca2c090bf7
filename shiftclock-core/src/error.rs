//! Error types for shiftclock-core

use crate::validate::Rejection;
use thiserror::Error;

/// Main error type for the shiftclock-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// A record failed the shape check and was not persisted
    #[error("record rejected: {0}")]
    Rejected(#[from] Rejection),

    /// Scanned identifier does not match `firstname.lastname[digits]`
    #[error("invalid employee id {0:?}: use firstname.lastname or firstname.lastname2")]
    InvalidEmployeeId(String),

    /// Department is not part of the catalog
    #[error("unknown department: {0}")]
    UnknownDepartment(String),

    /// Task is not listed under the selected department
    #[error("task {task:?} is not offered in department {department:?}")]
    UnknownTask { department: String, task: String },

    /// Backend read/write failure outside of SQLite
    #[error("store error: {message}")]
    Store { message: String, transient: bool },

    /// The active entry changed between read and conditional write
    #[error("conflicting update for {0}: active task changed concurrently")]
    Conflict(String),

    /// Administrator check failed
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Timestamp string could not be parsed
    #[error("invalid timestamp {value:?}: {source}")]
    Timestamp {
        value: String,
        source: chrono::ParseError,
    },
}

impl Error {
    /// Whether retrying the same store call may succeed.
    ///
    /// SQLite busy/locked conditions and backend errors flagged transient
    /// qualify; everything else fails immediately.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Database(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            Error::Store { transient, .. } => *transient,
            _ => false,
        }
    }

    pub(crate) fn poisoned() -> Self {
        Error::Store {
            message: "store lock poisoned".to_string(),
            transient: false,
        }
    }
}

/// Result type alias for shiftclock-core
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_busy_database_is_transient() {
        let busy = Error::Database(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        ));
        assert!(busy.is_transient());

        let constraint = Error::Database(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CONSTRAINT),
            None,
        ));
        assert!(!constraint.is_transient());
    }

    #[test]
    fn test_store_error_transient_flag() {
        let flaky = Error::Store {
            message: "timeout".to_string(),
            transient: true,
        };
        assert!(flaky.is_transient());
        assert!(!Error::Conflict("a.b".to_string()).is_transient());
        assert!(!Error::InvalidEmployeeId("Ajay".to_string()).is_transient());
    }
}
