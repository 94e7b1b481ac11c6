//! The detail-view controller.
//!
//! Owns the [`LoadMachine`] and publishes every transition on a watch
//! channel. Aggregations run on spawned tasks and report back through the
//! machine, which drops anything that arrives for a superseded attempt.
//! Writes are committed against the open record, so they survive retries and
//! refreshes of it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tracing::{debug, warn};

use staffdesk_shared::{
    AggregatedRecord, Advance, AdvanceStatus, EditSet, EmployeeId, EmployeeRecord, LoadError,
    SaveError, SaveFailure, Transaction,
};
use staffdesk_store::RecordSource;

use crate::aggregate::{Aggregation, Aggregator};
use crate::config::LoadConfig;
use crate::error::{ClientError, SessionError};
use crate::reconcile::{Committed, Reconciler};
use crate::session::{LoadMachine, LoadState, LoadTicket, SessionTicket, Start};

struct Inner {
    machine: Mutex<LoadMachine>,
    state_tx: watch::Sender<LoadState>,
    aggregator: Aggregator,
    reconciler: Reconciler,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, LoadMachine> {
        self.machine.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Called with the machine locked so subscribers see transitions in order.
    fn publish(&self, machine: &LoadMachine) {
        self.state_tx.send_replace(machine.state().clone());
    }

    fn finish(&self, ticket: &LoadTicket, result: Result<Aggregation, LoadError>) {
        let mut machine = self.lock();
        if machine.complete(ticket, result) {
            self.publish(&machine);
        }
    }
}

/// Cheap to clone; every clone drives the same session.
#[derive(Clone)]
pub struct DetailController {
    inner: Arc<Inner>,
}

impl DetailController {
    pub fn new(source: Arc<dyn RecordSource>, config: LoadConfig) -> Self {
        let (state_tx, _) = watch::channel(LoadState::Idle);
        Self {
            inner: Arc::new(Inner {
                machine: Mutex::new(LoadMachine::new()),
                state_tx,
                aggregator: Aggregator::new(Arc::clone(&source), config.clone()),
                reconciler: Reconciler::new(source, config),
            }),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<LoadState> {
        self.inner.state_tx.subscribe()
    }

    pub fn state(&self) -> LoadState {
        self.inner.lock().state().clone()
    }

    /// Open `id` in the detail view. Must be called inside a tokio runtime.
    ///
    /// Opening the record that is already loading returns a handle to the
    /// attempt in flight instead of starting another one.
    pub fn open_detail(&self, id: EmployeeId, seed: Option<EmployeeRecord>) -> LoadHandle {
        let mut machine = self.inner.lock();
        let ticket = match machine.start(id, seed) {
            Start::Started(ticket) => {
                self.inner.publish(&machine);
                self.spawn_load(ticket.clone(), machine.seed().cloned());
                ticket
            }
            Start::AlreadyLoading(ticket) => ticket,
        };
        drop(machine);
        self.handle(ticket)
    }

    /// Re-run the load for the open record after a degraded or failed attempt.
    pub fn retry_detail(&self) -> Result<LoadHandle, SessionError> {
        let mut machine = self.inner.lock();
        let ticket = machine.retry()?;
        self.inner.publish(&machine);
        self.spawn_load(ticket.clone(), machine.seed().cloned());
        drop(machine);
        Ok(self.handle(ticket))
    }

    pub fn close_detail(&self) {
        let mut machine = self.inner.lock();
        machine.close();
        self.inner.publish(&machine);
    }

    /// Save operator edits against the displayed record.
    ///
    /// The saved fields become part of the displayed record even if a retry
    /// or refresh started meanwhile. A save that completes after the operator
    /// moved to another record is still returned to the caller but leaves the
    /// new session alone.
    pub async fn save_edits(&self, edits: EditSet) -> Result<AggregatedRecord, SaveError> {
        let baseline = {
            let machine = self.inner.lock();
            let baseline = machine
                .baseline()
                .map_err(|_| machine.current_id().cloned().unwrap_or_default());
            baseline
        };
        let (ticket, baseline) = match baseline {
            Ok(baseline) => baseline,
            Err(id) => {
                warn!(id = %id, "save requested with no loaded record");
                return Err(SaveError {
                    id,
                    failure: SaveFailure::NoBaseline,
                    edits,
                });
            }
        };

        let resolved = self
            .inner
            .reconciler
            .write(&ticket.id, &edits, &baseline.employee)
            .await?;
        if resolved.is_empty() {
            return Ok(baseline);
        }

        Ok(self.commit(&ticket, baseline, Committed::Edits(resolved)))
    }

    pub async fn append_advance(&self, advance: Advance) -> Result<AggregatedRecord, ClientError> {
        let (ticket, baseline) = self.inner.lock().baseline()?;
        let added = self
            .inner
            .reconciler
            .append_advance(&ticket.id, advance)
            .await?;

        Ok(self.commit(&ticket, baseline, Committed::Advance(added)))
    }

    pub async fn append_transaction(
        &self,
        transaction: Transaction,
    ) -> Result<AggregatedRecord, ClientError> {
        let (ticket, baseline) = self.inner.lock().baseline()?;
        let added = self
            .inner
            .reconciler
            .append_transaction(&ticket.id, transaction)
            .await?;

        Ok(self.commit(&ticket, baseline, Committed::Transaction(added)))
    }

    pub async fn set_advance_status(
        &self,
        advance_id: &str,
        status: AdvanceStatus,
    ) -> Result<AggregatedRecord, ClientError> {
        let (ticket, baseline) = self.inner.lock().baseline()?;
        self.inner
            .reconciler
            .set_advance_status(&ticket.id, advance_id, status)
            .await?;

        let write = Committed::AdvanceStatus {
            advance_id: advance_id.to_string(),
            status,
        };
        Ok(self.commit(&ticket, baseline, write))
    }

    /// Fold a completed write into the session if the record it was issued
    /// against is still open; otherwise apply it to the caller's copy only.
    fn commit(
        &self,
        ticket: &SessionTicket,
        mut baseline: AggregatedRecord,
        write: Committed,
    ) -> AggregatedRecord {
        let mut machine = self.inner.lock();
        match machine.commit(ticket, &write) {
            Ok(updated) => {
                self.inner.publish(&machine);
                updated
            }
            Err(e) => {
                debug!(id = %ticket.id, reason = %e, "write landed outside its session");
                write.apply(&mut baseline);
                baseline
            }
        }
    }

    fn spawn_load(&self, ticket: LoadTicket, seed: Option<EmployeeRecord>) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let result = inner.aggregator.load_record(&ticket.id, seed.as_ref()).await;
            inner.finish(&ticket, result);
        });
    }

    fn handle(&self, ticket: LoadTicket) -> LoadHandle {
        LoadHandle {
            ticket,
            rx: self.subscribe(),
            inner: Arc::clone(&self.inner),
        }
    }
}

/// One load attempt, shared by everyone who asked for it.
pub struct LoadHandle {
    ticket: LoadTicket,
    rx: watch::Receiver<LoadState>,
    inner: Arc<Inner>,
}

impl LoadHandle {
    pub fn ticket(&self) -> &LoadTicket {
        &self.ticket
    }

    /// Wait for the attempt to end. `None` if it was superseded first.
    pub async fn settled(mut self) -> Option<LoadState> {
        loop {
            let _ = self.rx.borrow_and_update();
            {
                let machine = self.inner.lock();
                if !machine.is_current(&self.ticket) {
                    return None;
                }
                if !machine.state().is_loading() {
                    return Some(machine.state().clone());
                }
            }
            if self.rx.changed().await.is_err() {
                return None;
            }
        }
    }
}
