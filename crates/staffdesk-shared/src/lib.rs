//! # staffdesk-shared
//!
//! Types shared by every staffdesk crate: the employee record model, operator
//! edit sets, the error taxonomy and default constants.

pub mod constants;
pub mod edit;
pub mod error;
pub mod record;
pub mod types;

pub use edit::{BankDetailsPatch, EditSet, IdentityDocumentPatch};
pub use error::{
    CallError, LoadError, PartialAggregationError, SaveError, SaveFailure, TimeoutError,
    TransportError,
};
pub use record::*;
pub use types::{EmployeeId, FailureClass, Subcollection};
