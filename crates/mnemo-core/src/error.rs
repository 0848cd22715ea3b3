//! Error Taxonomy
//!
//! Single error type surfaced across the engine. Tool boundaries translate
//! these into the `{ok, error}` envelope; nothing below the tool layer
//! leaks SQLite or HTTP details to clients.

use serde::Serialize;

/// Engine result type
pub type Result<T> = std::result::Result<T, MemoryError>;

/// Client-facing error kind with a stable machine code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Schema or semantic validation failure
    InvalidInput,
    /// Unknown memory/link/task id
    NotFound,
    /// Contention persisted beyond the retry budget
    Busy,
    /// Component disabled or degraded (e.g. vector search without embeddings)
    Unavailable,
    /// Deadline exceeded
    Timeout,
    /// Schema drift: on-disk state newer than this binary understands
    Conflict,
    /// Unexpected failure
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Busy => "busy",
            ErrorKind::Unavailable => "unavailable",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Internal => "internal",
        }
    }

    /// Positive wire code for the JSON-RPC surface
    pub fn code(&self) -> u16 {
        match self {
            ErrorKind::InvalidInput => 1001,
            ErrorKind::NotFound => 1002,
            ErrorKind::Busy => 1003,
            ErrorKind::Unavailable => 1004,
            ErrorKind::Timeout => 1005,
            ErrorKind::Conflict => 1006,
            ErrorKind::Internal => 1007,
        }
    }
}

/// Engine error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    /// Schema or semantic validation failure
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Unknown id
    #[error("not found: {0}")]
    NotFound(String),
    /// Database contention survived the retry budget
    #[error("storage busy: {0}")]
    Busy(String),
    /// Component disabled or degraded
    #[error("unavailable: {0}")]
    Unavailable(String),
    /// Deadline exceeded
    #[error("timed out: {0}")]
    Timeout(String),
    /// Schema drift
    #[error("schema conflict: {0}")]
    Conflict(String),
    /// Unexpected failure
    #[error("internal error: {0}")]
    Internal(String),
}

impl MemoryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MemoryError::InvalidInput(_) => ErrorKind::InvalidInput,
            MemoryError::NotFound(_) => ErrorKind::NotFound,
            MemoryError::Busy(_) => ErrorKind::Busy,
            MemoryError::Unavailable(_) => ErrorKind::Unavailable,
            MemoryError::Timeout(_) => ErrorKind::Timeout,
            MemoryError::Conflict(_) => ErrorKind::Conflict,
            MemoryError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Map a raw SQLite failure into the taxonomy.
    ///
    /// Constraint violations are caller mistakes (`InvalidInput`); busy and
    /// locked conditions are handled by the retry helpers before they reach
    /// this function, so seeing one here means the budget was exhausted.
    pub fn from_sqlite(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::QueryReturnedNoRows => MemoryError::NotFound("row not found".into()),
            rusqlite::Error::SqliteFailure(e, _) => match e.code {
                rusqlite::ErrorCode::ConstraintViolation => {
                    MemoryError::InvalidInput(err.to_string())
                }
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked => {
                    MemoryError::Busy(err.to_string())
                }
                rusqlite::ErrorCode::NotADatabase | rusqlite::ErrorCode::DatabaseCorrupt => {
                    MemoryError::Conflict(err.to_string())
                }
                _ => MemoryError::Internal(err.to_string()),
            },
            _ => MemoryError::Internal(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for MemoryError {
    fn from(err: rusqlite::Error) -> Self {
        MemoryError::from_sqlite(err)
    }
}

impl From<std::io::Error> for MemoryError {
    fn from(err: std::io::Error) -> Self {
        MemoryError::Internal(err.to_string())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_codes_are_stable() {
        assert_eq!(ErrorKind::InvalidInput.code(), 1001);
        assert_eq!(ErrorKind::NotFound.code(), 1002);
        assert_eq!(ErrorKind::Busy.code(), 1003);
        assert_eq!(ErrorKind::Internal.code(), 1007);
    }

    #[test]
    fn test_from_sqlite_constraint_maps_to_invalid_input() {
        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CONSTRAINT),
            Some("CHECK constraint failed".to_string()),
        );
        assert_eq!(
            MemoryError::from_sqlite(err).kind(),
            ErrorKind::InvalidInput
        );
    }

    #[test]
    fn test_from_sqlite_no_rows_maps_to_not_found() {
        let err = rusqlite::Error::QueryReturnedNoRows;
        assert_eq!(MemoryError::from_sqlite(err).kind(), ErrorKind::NotFound);
    }
}
