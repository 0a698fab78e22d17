use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageErrorKind {
    /// Backend unreachable, timed out or misconfigured.
    Unavailable,
    NotFound,
    /// Write rejected by the backend (constraint or failed precondition).
    Conflict,
    Unknown,
}

impl fmt::Display for StorageErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StorageErrorKind::Unavailable => "unavailable",
            StorageErrorKind::NotFound => "not found",
            StorageErrorKind::Conflict => "conflict",
            StorageErrorKind::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
#[error("Storage {kind}: {message}")]
pub struct StorageError {
    pub kind: StorageErrorKind,
    pub message: String,
}

impl StorageError {
    pub fn new(kind: StorageErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StorageErrorKind::Unavailable, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StorageErrorKind::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StorageErrorKind::Conflict, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(StorageErrorKind::Unknown, message)
    }

    pub fn is_conflict(&self) -> bool {
        self.kind == StorageErrorKind::Conflict
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == StorageErrorKind::NotFound
    }
}

impl From<diesel::result::Error> for StorageError {
    fn from(err: diesel::result::Error) -> Self {
        use diesel::result::{DatabaseErrorKind, Error as DieselError};

        match err {
            DieselError::NotFound => StorageError::not_found("Record not found"),
            DieselError::DatabaseError(
                DatabaseErrorKind::UniqueViolation
                | DatabaseErrorKind::ForeignKeyViolation
                | DatabaseErrorKind::CheckViolation
                | DatabaseErrorKind::NotNullViolation,
                info,
            ) => StorageError::conflict(info.message().to_string()),
            DieselError::DatabaseError(_, info) if is_lock_timeout(info.message()) => {
                StorageError::unavailable(info.message().to_string())
            }
            DieselError::DatabaseError(_, info) => {
                StorageError::unknown(info.message().to_string())
            }
            other => StorageError::unknown(other.to_string()),
        }
    }
}

/// SQLite gave up waiting for another writer after `busy_timeout`.
fn is_lock_timeout(message: &str) -> bool {
    message.contains("database is locked") || message.contains("database is busy")
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::unknown(format!("Malformed stored payload: {}", err))
    }
}

impl From<reqwest::Error> for StorageError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            StorageError::unknown(format!("Undecodable remote response: {}", err))
        } else if err.is_timeout() {
            StorageError::unavailable(format!("Remote store timed out: {}", err))
        } else {
            StorageError::unavailable(format!("Remote store unreachable: {}", err))
        }
    }
}
