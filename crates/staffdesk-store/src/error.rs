use staffdesk_shared::TransportError;
use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Failed to determine a platform data directory.
    #[error("Could not determine application data directory")]
    NoDataDir,

    /// Generic I/O error (e.g. creating the database directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The addressed document does not exist.
    #[error("Document not found: {0}")]
    NotFound(String),

    /// Migration failure.
    #[error("Migration error: {0}")]
    Migration(String),

    /// A stored body is not a JSON object, or a value failed to encode.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The blocking database task could not be joined.
    #[error("Database task failed: {0}")]
    Task(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;

impl From<StoreError> for TransportError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(path) => TransportError::NotFound(path),
            StoreError::Json(e) => TransportError::Malformed(e.to_string()),
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(code, msg))
                if code.code == rusqlite::ErrorCode::DatabaseBusy
                    || code.code == rusqlite::ErrorCode::DatabaseLocked =>
            {
                TransportError::Conflict(msg.unwrap_or_else(|| code.to_string()))
            }
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(code, msg))
                if code.code == rusqlite::ErrorCode::ReadOnly
                    || code.code == rusqlite::ErrorCode::PermissionDenied =>
            {
                TransportError::PermissionDenied(msg.unwrap_or_else(|| code.to_string()))
            }
            other => TransportError::Other(other.to_string()),
        }
    }
}
