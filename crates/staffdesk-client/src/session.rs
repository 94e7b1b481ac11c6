//! Lifecycle of the record shown in the detail view.
//!
//! [`LoadMachine`] is the only place that knows which record is currently of
//! interest. Every load attempt is identified by a [`LoadTicket`] carrying a
//! generation number; opening another record, retrying or closing bumps the
//! generation, and results presented with an older ticket are dropped.
//!
//! Writes are tied to the session rather than to one attempt. A
//! [`SessionTicket`] stays valid across retries and refreshes of the same
//! record and only expires when another record is opened or the view is
//! closed. A write that lands while a reload is in flight is held and folded
//! into the reloaded record, which may have been read before the write.
//!
//! The machine is synchronous. The detail controller wraps it in a mutex and
//! drives it from async tasks.

use tracing::{debug, info, warn};

use staffdesk_shared::{
    AggregatedRecord, EmployeeId, EmployeeRecord, LoadError, PartialAggregationError,
};

use crate::aggregate::Aggregation;
use crate::error::SessionError;
use crate::reconcile::Committed;

/// Identifies one load attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    pub id: EmployeeId,
    pub generation: u64,
}

/// Identifies the open record for writes issued against it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTicket {
    pub id: EmployeeId,
    pub epoch: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadState {
    /// No record selected.
    Idle,
    Loading {
        id: EmployeeId,
        generation: u64,
        /// Entered through `retry` rather than a fresh open.
        retrying: bool,
        retries: u32,
        /// Shallow data to show while waiting.
        preview: Option<EmployeeRecord>,
    },
    /// Primary record and every requested sub-collection loaded.
    Ready {
        record: AggregatedRecord,
        retries: u32,
    },
    /// Primary record loaded, some sub-collections did not.
    Degraded {
        record: AggregatedRecord,
        partial: PartialAggregationError,
        retries: u32,
    },
    /// Primary fetch failed.
    Failed {
        error: LoadError,
        /// Best shallow data known for the record, if any.
        fallback: Option<EmployeeRecord>,
        retries: u32,
    },
}

impl LoadState {
    pub fn name(&self) -> &'static str {
        match self {
            LoadState::Idle => "idle",
            LoadState::Loading { retrying: false, .. } => "loading",
            LoadState::Loading { retrying: true, .. } => "retrying",
            LoadState::Ready { .. } => "ready",
            LoadState::Degraded { .. } => "degraded",
            LoadState::Failed { .. } => "failed",
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, LoadState::Loading { .. })
    }

    /// The record on screen, when one has loaded.
    pub fn record(&self) -> Option<&AggregatedRecord> {
        match self {
            LoadState::Ready { record, .. } | LoadState::Degraded { record, .. } => Some(record),
            _ => None,
        }
    }

    pub fn retries(&self) -> u32 {
        match self {
            LoadState::Idle => 0,
            LoadState::Loading { retries, .. }
            | LoadState::Ready { retries, .. }
            | LoadState::Degraded { retries, .. }
            | LoadState::Failed { retries, .. } => *retries,
        }
    }
}

/// Whether [`LoadMachine::start`] needs a new aggregation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Start {
    /// A new attempt was minted; the caller must run it.
    Started(LoadTicket),
    /// The same record is already loading; share its attempt.
    AlreadyLoading(LoadTicket),
}

impl Start {
    pub fn ticket(&self) -> &LoadTicket {
        match self {
            Start::Started(ticket) | Start::AlreadyLoading(ticket) => ticket,
        }
    }
}

struct Session {
    id: EmployeeId,
    seed: Option<EmployeeRecord>,
    last_good: Option<AggregatedRecord>,
    retries: u32,
    /// Writes committed while a reload was in flight.
    pending: Vec<Committed>,
}

impl Session {
    fn preview(&self) -> Option<EmployeeRecord> {
        self.last_good
            .as_ref()
            .map(|record| record.employee.clone())
            .or_else(|| self.seed.clone())
    }
}

pub struct LoadMachine {
    state: LoadState,
    generation: u64,
    epoch: u64,
    session: Option<Session>,
}

impl LoadMachine {
    pub fn new() -> Self {
        Self {
            state: LoadState::Idle,
            generation: 0,
            epoch: 0,
            session: None,
        }
    }

    pub fn state(&self) -> &LoadState {
        &self.state
    }

    pub fn current_id(&self) -> Option<&EmployeeId> {
        self.session.as_ref().map(|s| &s.id)
    }

    pub fn seed(&self) -> Option<&EmployeeRecord> {
        self.session.as_ref().and_then(|s| s.seed.as_ref())
    }

    pub fn is_current(&self, ticket: &LoadTicket) -> bool {
        ticket.generation == self.generation
            && self.current_id().is_some_and(|id| *id == ticket.id)
    }

    /// Open `id`. Re-opening the record that is already loading does not
    /// start a second aggregation.
    pub fn start(&mut self, id: EmployeeId, seed: Option<EmployeeRecord>) -> Start {
        if let LoadState::Loading {
            id: loading,
            generation,
            ..
        } = &self.state
        {
            if *loading == id {
                debug!(id = %id, generation, "already loading, sharing attempt");
                return Start::AlreadyLoading(LoadTicket {
                    id,
                    generation: *generation,
                });
            }
        }

        // Reopening the record on screen keeps what we already know about it.
        let (last_good, previous_seed) = match self.session.take() {
            Some(session) if session.id == id => (session.last_good, session.seed),
            Some(session) => {
                info!(from = %session.id, to = %id, "switching record");
                self.epoch += 1;
                (None, None)
            }
            None => {
                self.epoch += 1;
                (None, None)
            }
        };

        self.session = Some(Session {
            id,
            seed: seed.or(previous_seed),
            last_good,
            retries: 0,
            pending: Vec::new(),
        });
        Start::Started(self.enter_loading(false))
    }

    /// Re-run the aggregation for the open record. Only valid once the
    /// previous attempt has ended degraded or failed.
    pub fn retry(&mut self) -> Result<LoadTicket, SessionError> {
        match &self.state {
            LoadState::Degraded { .. } | LoadState::Failed { .. } => {}
            LoadState::Idle => return Err(SessionError::NothingOpen),
            other => {
                return Err(SessionError::RetryNotAllowed {
                    state: other.name(),
                })
            }
        }

        let session = self.session.as_mut().ok_or(SessionError::NothingOpen)?;
        session.retries += 1;
        info!(id = %session.id, retries = session.retries, "retrying load");
        Ok(self.enter_loading(true))
    }

    fn enter_loading(&mut self, retrying: bool) -> LoadTicket {
        self.generation += 1;
        let (id, retries, preview) = match &self.session {
            Some(s) => (s.id.clone(), s.retries, s.preview()),
            None => (EmployeeId::default(), 0, None),
        };

        self.state = LoadState::Loading {
            id: id.clone(),
            generation: self.generation,
            retrying,
            retries,
            preview,
        };
        LoadTicket {
            id,
            generation: self.generation,
        }
    }

    /// Apply the outcome of an aggregation. Returns false when the ticket is
    /// stale and the result was dropped.
    pub fn complete(
        &mut self,
        ticket: &LoadTicket,
        result: Result<Aggregation, LoadError>,
    ) -> bool {
        if !self.is_current(ticket) || !self.state.is_loading() {
            debug!(
                id = %ticket.id,
                generation = ticket.generation,
                current = self.generation,
                "dropping stale load result"
            );
            return false;
        }
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        let retries = session.retries;

        self.state = match result {
            Ok(Aggregation { mut record, elapsed }) => {
                if let Some(previous) = &session.last_good {
                    record.retain_known_good(previous);
                }
                for write in session.pending.drain(..) {
                    debug!(id = %ticket.id, ?write, "replaying write onto reload");
                    write.apply(&mut record);
                }
                session.last_good = Some(record.clone());

                match record.partial() {
                    None => {
                        info!(id = %ticket.id, elapsed_ms = elapsed.as_millis() as u64, retries, "ready");
                        LoadState::Ready { record, retries }
                    }
                    Some(partial) => {
                        warn!(id = %ticket.id, %partial, retries, "degraded");
                        LoadState::Degraded {
                            record,
                            partial,
                            retries,
                        }
                    }
                }
            }
            Err(error) => {
                warn!(id = %ticket.id, error = %error, class = ?error.class, retries, "failed");
                session.pending.clear();
                let fallback = session.preview().or_else(|| error.partial.clone());
                LoadState::Failed {
                    error,
                    fallback,
                    retries,
                }
            }
        };
        true
    }

    /// Leave the detail view. Anything still in flight becomes stale.
    pub fn close(&mut self) {
        if let Some(session) = self.session.take() {
            info!(id = %session.id, state = self.state.name(), "closing record");
        }
        self.generation += 1;
        self.epoch += 1;
        self.state = LoadState::Idle;
    }

    /// The record edits and appends are applied against, with the ticket
    /// their result must be committed under.
    pub fn baseline(&self) -> Result<(SessionTicket, AggregatedRecord), SessionError> {
        let session = self.session.as_ref().ok_or(SessionError::NothingOpen)?;
        let record = self
            .state
            .record()
            .ok_or_else(|| SessionError::NotLoaded(session.id.clone()))?;
        Ok((
            SessionTicket {
                id: session.id.clone(),
                epoch: self.epoch,
            },
            record.clone(),
        ))
    }

    pub fn holds(&self, ticket: &SessionTicket) -> bool {
        ticket.epoch == self.epoch && self.current_id().is_some_and(|id| *id == ticket.id)
    }

    /// Fold a write the store accepted into the session and return the
    /// record as it now stands.
    ///
    /// While a reload is in flight the write is also held back and replayed
    /// onto the reloaded record when it arrives.
    pub fn commit(
        &mut self,
        ticket: &SessionTicket,
        write: &Committed,
    ) -> Result<AggregatedRecord, SessionError> {
        if !self.holds(ticket) {
            return Err(SessionError::Superseded(ticket.id.clone()));
        }
        let Some(session) = self.session.as_mut() else {
            return Err(SessionError::NothingOpen);
        };
        let Some(known) = session.last_good.as_mut() else {
            return Err(SessionError::NotLoaded(ticket.id.clone()));
        };
        write.apply(known);
        let updated = known.clone();

        match &mut self.state {
            LoadState::Ready { record, .. } | LoadState::Degraded { record, .. } => {
                write.apply(record);
            }
            LoadState::Loading { preview, .. } => {
                debug!(id = %ticket.id, "holding write until reload completes");
                *preview = Some(updated.employee.clone());
                session.pending.push(write.clone());
            }
            LoadState::Failed { fallback, .. } => {
                *fallback = Some(updated.employee.clone());
            }
            LoadState::Idle => {}
        }
        debug!(id = %ticket.id, "baseline updated");
        Ok(updated)
    }
}

impl Default for LoadMachine {
    fn default() -> Self {
        Self::new()
    }
}
