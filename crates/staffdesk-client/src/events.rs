use serde::Serialize;

use staffdesk_shared::{AggregatedRecord, EmployeeRecord, FailureClass, Subcollection};

use crate::session::LoadState;

pub const EVENT_DETAIL_STATE: &str = "detail-state-changed";

/// What the detail view needs to render one [`LoadState`].
#[derive(Debug, Clone, Serialize)]
pub struct StatePayload {
    pub kind: &'static str,
    pub id: Option<String>,
    pub retries: u32,
    pub retrying: bool,
    pub record: Option<AggregatedRecord>,
    pub preview: Option<EmployeeRecord>,
    pub unavailable: Vec<Subcollection>,
    pub failure: Option<FailurePayload>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailurePayload {
    pub class: FailureClass,
    pub message: &'static str,
    pub detail: String,
}

impl From<&LoadState> for StatePayload {
    fn from(state: &LoadState) -> Self {
        let mut payload = StatePayload {
            kind: state.name(),
            id: None,
            retries: state.retries(),
            retrying: false,
            record: None,
            preview: None,
            unavailable: Vec::new(),
            failure: None,
        };

        match state {
            LoadState::Idle => {}
            LoadState::Loading {
                id,
                retrying,
                preview,
                ..
            } => {
                payload.id = Some(id.to_string());
                payload.retrying = *retrying;
                payload.preview = preview.clone();
            }
            LoadState::Ready { record, .. } => {
                payload.id = Some(record.id().to_string());
                payload.record = Some(record.clone());
            }
            LoadState::Degraded {
                record, partial, ..
            } => {
                payload.id = Some(record.id().to_string());
                payload.record = Some(record.clone());
                payload.unavailable = partial.unavailable.clone();
            }
            LoadState::Failed {
                error, fallback, ..
            } => {
                payload.id = Some(error.id.to_string());
                payload.preview = fallback.clone();
                payload.failure = Some(FailurePayload {
                    class: error.class,
                    message: error.class.user_message(),
                    detail: error.cause.to_string(),
                });
            }
        }
        payload
    }
}

/// An event name and its payload, as one JSON object.
#[derive(Debug, Clone, Serialize)]
pub struct Event<P: Serialize> {
    pub event: &'static str,
    pub payload: P,
}

pub fn state_event(state: &LoadState) -> Event<StatePayload> {
    Event {
        event: EVENT_DETAIL_STATE,
        payload: StatePayload::from(state),
    }
}
