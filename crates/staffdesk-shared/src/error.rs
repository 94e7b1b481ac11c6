use thiserror::Error;

use crate::edit::EditSet;
use crate::record::EmployeeRecord;
use crate::types::{EmployeeId, FailureClass, Subcollection};

/// A bounded call exceeded its deadline.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Timed out after {elapsed_ms} ms")]
pub struct TimeoutError {
    pub elapsed_ms: u64,
}

/// Failures reported by the document store itself.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Write conflict: {0}")]
    Conflict(String),

    #[error("Malformed document: {0}")]
    Malformed(String),

    #[error("Store error: {0}")]
    Other(String),
}

/// Outcome of a remote call wrapped with a deadline.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    #[error(transparent)]
    Timeout(#[from] TimeoutError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl CallError {
    pub fn class(&self) -> FailureClass {
        match self {
            CallError::Timeout(_) => FailureClass::Timeout,
            CallError::Transport(TransportError::PermissionDenied(_)) => FailureClass::Permission,
            CallError::Transport(TransportError::Network(_)) => FailureClass::Network,
            CallError::Transport(_) => FailureClass::Unknown,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, CallError::Timeout(_))
    }
}

/// The primary fetch failed, so no record could be assembled.
///
/// `partial` carries the shallow copy the caller already had (if any) so the
/// detail view still has something to render.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Failed to load {id}: {cause}")]
pub struct LoadError {
    pub id: EmployeeId,
    pub class: FailureClass,
    pub cause: CallError,
    pub partial: Option<EmployeeRecord>,
}

impl LoadError {
    pub fn new(id: EmployeeId, cause: CallError, partial: Option<EmployeeRecord>) -> Self {
        Self {
            id,
            class: cause.class(),
            cause,
            partial,
        }
    }
}

/// Primary fetch succeeded but some sub-collections are missing.
///
/// This is a degraded-state signal, not a hard failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Partially loaded, unavailable: {}", format_sections(.unavailable))]
pub struct PartialAggregationError {
    pub unavailable: Vec<Subcollection>,
}

fn format_sections(sections: &[Subcollection]) -> String {
    sections
        .iter()
        .map(Subcollection::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SaveFailure {
    /// The store rejected the write-back.
    #[error("Save rejected: {0}")]
    Conflict(String),

    #[error(transparent)]
    Timeout(TimeoutError),

    #[error(transparent)]
    Transport(TransportError),

    #[error("No loaded record to save against")]
    NoBaseline,
}

impl From<CallError> for SaveFailure {
    fn from(err: CallError) -> Self {
        match err {
            CallError::Timeout(t) => SaveFailure::Timeout(t),
            CallError::Transport(TransportError::Conflict(msg)) => SaveFailure::Conflict(msg),
            CallError::Transport(t) => SaveFailure::Transport(t),
        }
    }
}

/// A failed save. The edit set is handed back untouched so the form can
/// stay populated.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Failed to save {id}: {failure}")]
pub struct SaveError {
    pub id: EmployeeId,
    pub failure: SaveFailure,
    pub edits: EditSet,
}

impl SaveError {
    pub fn is_conflict(&self) -> bool {
        matches!(self.failure, SaveFailure::Conflict(_))
    }
}
