//! Assembles one [`AggregatedRecord`] from the primary document and its
//! sub-collections.
//!
//! All fetches start together. Each one is bounded by its own timeout and by
//! the batch deadline, whichever comes first, so the batch can never outlast
//! its deadline and nothing is awaited after it. A primary failure ends the
//! load at once; a sub-collection failure only marks its slot unavailable.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use serde::de::DeserializeOwned;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use staffdesk_shared::{
    AggregatedRecord, CallError, Document, EmployeeId, EmployeeRecord, LoadError, Slot,
    Subcollection, TransportError,
};
use staffdesk_store::RecordSource;

use crate::bounded::with_deadline;
use crate::config::LoadConfig;

/// A successful load.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregation {
    pub record: AggregatedRecord,
    pub elapsed: Duration,
}

/// Stateless apart from the source handle and its configuration.
#[derive(Clone)]
pub struct Aggregator {
    source: Arc<dyn RecordSource>,
    config: LoadConfig,
}

impl Aggregator {
    pub fn new(source: Arc<dyn RecordSource>, config: LoadConfig) -> Self {
        Self { source, config }
    }

    pub fn config(&self) -> &LoadConfig {
        &self.config
    }

    /// Load the record `id`.
    ///
    /// `seed` is whatever shallow copy the caller already holds. It is only
    /// used to populate [`LoadError::partial`] when the primary fetch fails.
    pub async fn load_record(
        &self,
        id: &EmployeeId,
        seed: Option<&EmployeeRecord>,
    ) -> Result<Aggregation, LoadError> {
        let started = Instant::now();
        let batch_deadline = started + self.config.batch_timeout;
        let primary_deadline = (started + self.config.primary_timeout).min(batch_deadline);
        let sub_deadline = (started + self.config.subcollection_timeout).min(batch_deadline);

        debug!(
            id = %id,
            subcollections = self.config.subcollections.len(),
            "starting aggregation"
        );

        let primary = self.fetch_primary(id, primary_deadline);
        tokio::pin!(primary);

        let mut pending: FuturesUnordered<_> = self
            .config
            .subcollections
            .iter()
            .map(|&sub| {
                let source = Arc::clone(&self.source);
                let collection = self.config.collection.clone();
                let id = id.clone();
                async move {
                    let fetch = async move {
                        source
                            .list_sub_records(&collection, id.as_str(), sub.as_str())
                            .await
                    };
                    (sub, with_deadline(fetch, sub_deadline).await)
                }
            })
            .collect();

        let mut employee: Option<EmployeeRecord> = None;
        let mut fetched: BTreeMap<Subcollection, Result<Vec<Document>, CallError>> =
            BTreeMap::new();

        loop {
            tokio::select! {
                result = &mut primary, if employee.is_none() => match result {
                    Ok(record) => employee = Some(record),
                    Err(cause) => {
                        warn!(
                            id = %id,
                            error = %cause,
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            "primary fetch failed"
                        );
                        return Err(LoadError::new(id.clone(), cause, seed.cloned()));
                    }
                },
                Some((sub, result)) = pending.next() => {
                    fetched.insert(sub, result);
                }
                else => break,
            }
        }

        // Both branches are exhausted, so the primary has resolved.
        let Some(employee) = employee else {
            return Err(LoadError::new(
                id.clone(),
                TransportError::Other("primary fetch did not resolve".into()).into(),
                seed.cloned(),
            ));
        };

        let record = AggregatedRecord {
            employee,
            advances: take_slot(id, Subcollection::Advances, &mut fetched),
            transactions: take_slot(id, Subcollection::Transactions, &mut fetched),
        };
        let elapsed = started.elapsed();

        match record.partial() {
            None => info!(id = %id, elapsed_ms = elapsed.as_millis() as u64, "record loaded"),
            Some(partial) => warn!(
                id = %id,
                elapsed_ms = elapsed.as_millis() as u64,
                %partial,
                "record loaded with gaps"
            ),
        }

        Ok(Aggregation { record, elapsed })
    }

    async fn fetch_primary(
        &self,
        id: &EmployeeId,
        deadline: Instant,
    ) -> Result<EmployeeRecord, CallError> {
        let source = Arc::clone(&self.source);
        let collection = self.config.collection.clone();
        let key = id.clone();
        let fetch = async move { source.get_record(&collection, key.as_str()).await };

        let document = with_deadline(fetch, deadline).await?.ok_or_else(|| {
            TransportError::NotFound(format!("{}/{}", self.config.collection, id))
        })?;

        document
            .decode::<EmployeeRecord>()
            .map_err(|e| TransportError::Malformed(e.to_string()).into())
    }
}

fn take_slot<T: DeserializeOwned>(
    id: &EmployeeId,
    sub: Subcollection,
    fetched: &mut BTreeMap<Subcollection, Result<Vec<Document>, CallError>>,
) -> Slot<T> {
    match fetched.remove(&sub) {
        None => Slot::Skipped,
        Some(Ok(documents)) => match documents
            .iter()
            .map(Document::decode::<T>)
            .collect::<Result<Vec<T>, _>>()
        {
            Ok(items) => Slot::Loaded { items },
            Err(e) => {
                warn!(id = %id, subcollection = %sub, error = %e, "undecodable sub-record");
                Slot::Unavailable {
                    reason: CallError::from(TransportError::Malformed(e.to_string())).class(),
                }
            }
        },
        Some(Err(cause)) => {
            warn!(id = %id, subcollection = %sub, error = %cause, "sub-collection unavailable");
            Slot::Unavailable {
                reason: cause.class(),
            }
        }
    }
}
