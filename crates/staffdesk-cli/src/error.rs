use thiserror::Error;

use staffdesk_client::{ClientError, SessionError};
use staffdesk_shared::{SaveError, TransportError};
use staffdesk_store::StoreError;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Invalid input: {0}")]
    BadInput(String),

    #[error("Employee not found: {0}")]
    NotFound(String),

    #[error("Record did not finish loading: {0}")]
    NotLoaded(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Save(#[from] SaveError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Process exit status for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::BadInput(_) | CliError::Json(_) => 2,
            CliError::NotFound(_) => 3,
            CliError::NotLoaded(_) => 4,
            CliError::Save(e) if e.is_conflict() => 5,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use staffdesk_shared::{EditSet, EmployeeId, SaveFailure};

    #[test]
    fn test_exit_codes() {
        assert_eq!(CliError::BadInput("x".into()).exit_code(), 2);
        assert_eq!(CliError::NotFound("e9".into()).exit_code(), 3);

        let conflict = SaveError {
            id: EmployeeId::new("e1"),
            failure: SaveFailure::Conflict("stale".into()),
            edits: EditSet::default(),
        };
        assert_eq!(CliError::from(conflict).exit_code(), 5);
        assert_eq!(
            CliError::from(TransportError::Network("offline".into())).exit_code(),
            1
        );
    }
}
