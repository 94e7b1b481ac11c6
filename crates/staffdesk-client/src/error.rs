use thiserror::Error;

use staffdesk_shared::{CallError, EmployeeId};

/// Requests the detail session cannot honour in its current state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("No record is open")]
    NothingOpen,

    #[error("Retry is only possible after a degraded or failed load (state: {state})")]
    RetryNotAllowed { state: &'static str },

    #[error("Record {0} has not finished loading")]
    NotLoaded(EmployeeId),

    #[error("Record {0} was closed or replaced while the request was in flight")]
    Superseded(EmployeeId),
}

/// Errors from sub-collection mutations issued through the detail view.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Call(#[from] CallError),

    #[error("Could not encode item: {0}")]
    Encode(#[from] serde_json::Error),
}
