//! Write-back of operator edits.
//!
//! The store replaces nested objects wholesale, so a patch to one passport
//! field has to be sent as the whole passport. [`ResolvedEdits`] does that
//! read-modify-write against the record the operator was looking at. Nothing
//! the operator did not touch ends up in the payload, and sub-collections
//! never do: they change only through the dedicated append operations.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use staffdesk_shared::{
    to_fields, AggregatedRecord, Advance, AdvanceStatus, BankDetails, CallError, EditSet,
    EmployeeId, EmployeeRecord, HrNote, IdentityDocument, LeaveBalances, PerformanceReview,
    SaveError, SaveFailure, Subcollection, Transaction, TransportError,
};
use staffdesk_store::RecordSource;

use crate::bounded::with_timeout;
use crate::config::LoadConfig;
use crate::error::ClientError;

/// An [`EditSet`] with every nested patch expanded into the whole object it
/// will replace.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedEdits {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub salary: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passport: Option<IdentityDocument>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qid: Option<IdentityDocument>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bank_details: Option<BankDetails>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leave_balances: Option<LeaveBalances>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub performance_reviews: Option<Vec<PerformanceReview>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hr_notes: Option<Vec<HrNote>>,
}

impl ResolvedEdits {
    /// Expand `edits` against `baseline`. Empty nested patches are dropped.
    pub fn resolve(edits: &EditSet, baseline: &EmployeeRecord) -> Self {
        Self {
            name: edits.name.clone(),
            email: edits.email.clone(),
            phone: edits.phone.clone(),
            department: edits.department.clone(),
            position: edits.position.clone(),
            salary: edits.salary,
            address: edits.address.clone(),
            passport: edits
                .passport
                .as_ref()
                .filter(|patch| !patch.is_empty())
                .map(|patch| patch.resolve(baseline.passport.as_ref())),
            qid: edits
                .qid
                .as_ref()
                .filter(|patch| !patch.is_empty())
                .map(|patch| patch.resolve(baseline.qid.as_ref())),
            bank_details: edits
                .bank_details
                .as_ref()
                .filter(|patch| !patch.is_empty())
                .map(|patch| patch.resolve(baseline.bank_details.as_ref())),
            leave_balances: edits.leave_balances.clone(),
            performance_reviews: edits.performance_reviews.clone(),
            hr_notes: edits.hr_notes.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// The partial document sent to the store.
    pub fn to_payload(&self) -> Result<Map<String, Value>, serde_json::Error> {
        to_fields(self)
    }

    /// Fold the written fields into a local copy of the record.
    pub fn apply(&self, record: &mut EmployeeRecord) {
        fn set<T: Clone>(slot: &mut T, value: &Option<T>) {
            if let Some(value) = value {
                *slot = value.clone();
            }
        }
        fn set_opt<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
            if value.is_some() {
                *slot = value.clone();
            }
        }

        set(&mut record.name, &self.name);
        set(&mut record.email, &self.email);
        set(&mut record.phone, &self.phone);
        set(&mut record.department, &self.department);
        set(&mut record.position, &self.position);
        set(&mut record.salary, &self.salary);
        set(&mut record.address, &self.address);
        set_opt(&mut record.passport, &self.passport);
        set_opt(&mut record.qid, &self.qid);
        set_opt(&mut record.bank_details, &self.bank_details);
        set_opt(&mut record.leave_balances, &self.leave_balances);
        set_opt(&mut record.performance_reviews, &self.performance_reviews);
        set_opt(&mut record.hr_notes, &self.hr_notes);
    }
}

/// Applies edits and sub-collection mutations to the source.
#[derive(Clone)]
pub struct Reconciler {
    source: Arc<dyn RecordSource>,
    config: LoadConfig,
}

impl Reconciler {
    pub fn new(source: Arc<dyn RecordSource>, config: LoadConfig) -> Self {
        Self { source, config }
    }

    /// Save `edits` made against `last_known` and return the merged record.
    ///
    /// On failure the edits come back untouched in the [`SaveError`].
    pub async fn save(
        &self,
        id: &EmployeeId,
        edits: EditSet,
        last_known: &AggregatedRecord,
    ) -> Result<AggregatedRecord, SaveError> {
        let resolved = self.write(id, &edits, &last_known.employee).await?;
        let mut merged = last_known.clone();
        resolved.apply(&mut merged.employee);
        Ok(merged)
    }

    /// Resolve and send the payload. An empty edit set sends nothing.
    pub async fn write(
        &self,
        id: &EmployeeId,
        edits: &EditSet,
        baseline: &EmployeeRecord,
    ) -> Result<ResolvedEdits, SaveError> {
        let fail = |failure: SaveFailure| SaveError {
            id: id.clone(),
            failure,
            edits: edits.clone(),
        };

        let resolved = ResolvedEdits::resolve(edits, baseline);
        if resolved.is_empty() {
            debug!(id = %id, "nothing to save");
            return Ok(resolved);
        }

        let payload = resolved
            .to_payload()
            .map_err(|e| fail(SaveFailure::Transport(TransportError::Malformed(e.to_string()))))?;
        let keys: Vec<String> = payload.keys().cloned().collect();

        let source = Arc::clone(&self.source);
        let collection = self.config.collection.clone();
        let key = id.clone();
        let call = async move { source.update_record(&collection, key.as_str(), payload).await };

        match with_timeout(call, self.config.save_timeout).await {
            Ok(()) => {
                info!(id = %id, fields = ?keys, "record saved");
                Ok(resolved)
            }
            Err(e) => {
                warn!(id = %id, fields = ?keys, error = %e, "save failed");
                Err(fail(SaveFailure::from(e)))
            }
        }
    }

    /// Add an advance and return it with its assigned id.
    pub async fn append_advance(
        &self,
        id: &EmployeeId,
        advance: Advance,
    ) -> Result<Advance, ClientError> {
        let fields = to_fields(&advance)?;
        let new_id = self.add_sub(id, Subcollection::Advances, fields).await?;
        Ok(Advance { id: new_id, ..advance })
    }

    pub async fn append_transaction(
        &self,
        id: &EmployeeId,
        transaction: Transaction,
    ) -> Result<Transaction, ClientError> {
        let fields = to_fields(&transaction)?;
        let new_id = self
            .add_sub(id, Subcollection::Transactions, fields)
            .await?;
        Ok(Transaction {
            id: new_id,
            ..transaction
        })
    }

    pub async fn set_advance_status(
        &self,
        id: &EmployeeId,
        advance_id: &str,
        status: AdvanceStatus,
    ) -> Result<(), ClientError> {
        let mut fields = Map::new();
        fields.insert("status".to_string(), serde_json::to_value(status)?);

        let source = Arc::clone(&self.source);
        let collection = self.config.collection.clone();
        let key = id.clone();
        let sub_id = advance_id.to_string();
        let call = async move {
            source
                .update_sub_record(
                    &collection,
                    key.as_str(),
                    Subcollection::Advances.as_str(),
                    &sub_id,
                    fields,
                )
                .await
        };

        match with_timeout(call, self.config.save_timeout).await {
            Ok(()) => {
                info!(id = %id, advance = advance_id, ?status, "advance status updated");
                Ok(())
            }
            Err(e) => {
                warn!(id = %id, advance = advance_id, error = %e, "status update failed");
                Err(e.into())
            }
        }
    }

    async fn add_sub(
        &self,
        id: &EmployeeId,
        sub: Subcollection,
        fields: Map<String, Value>,
    ) -> Result<String, CallError> {
        let source = Arc::clone(&self.source);
        let collection = self.config.collection.clone();
        let key = id.clone();
        let call =
            async move { source.add_sub_record(&collection, key.as_str(), sub.as_str(), fields).await };

        match with_timeout(call, self.config.save_timeout).await {
            Ok(new_id) => {
                info!(id = %id, subcollection = %sub, item = %new_id, "sub-record added");
                Ok(new_id)
            }
            Err(e) => {
                warn!(id = %id, subcollection = %sub, error = %e, "sub-record add failed");
                Err(e)
            }
        }
    }
}

/// A write the store accepted, in a form that can be folded into any copy
/// of the record.
///
/// Folding is idempotent: applying the same write to a record that already
/// reflects it changes nothing.
#[derive(Debug, Clone, PartialEq)]
pub enum Committed {
    Edits(ResolvedEdits),
    Advance(Advance),
    Transaction(Transaction),
    AdvanceStatus {
        advance_id: String,
        status: AdvanceStatus,
    },
}

impl Committed {
    /// Items only land in slots that hold data; an unavailable slot stays
    /// unavailable.
    pub fn apply(&self, record: &mut AggregatedRecord) {
        match self {
            Committed::Edits(edits) => edits.apply(&mut record.employee),
            Committed::Advance(advance) => {
                let present = record
                    .advances
                    .items()
                    .is_some_and(|items| items.iter().any(|a| a.id == advance.id));
                if !present {
                    record.advances.push(advance.clone());
                }
            }
            Committed::Transaction(transaction) => {
                let present = record
                    .transactions
                    .items()
                    .is_some_and(|items| items.iter().any(|t| t.id == transaction.id));
                if !present {
                    record.transactions.push(transaction.clone());
                }
            }
            Committed::AdvanceStatus { advance_id, status } => {
                if let Some(advance) = record
                    .advances
                    .items_mut()
                    .and_then(|items| items.iter_mut().find(|a| a.id == *advance_id))
                {
                    advance.status = *status;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;
    use staffdesk_shared::{BankDetailsPatch, FailureClass, IdentityDocumentPatch, Slot};
    use staffdesk_store::{Behavior, Route, ScriptedSource};

    fn fields(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn baseline() -> AggregatedRecord {
        let mut employee = EmployeeRecord::shallow(EmployeeId::new("e1"), "Amina Yusuf");
        employee.salary = 7200.0;
        employee.passport = Some(IdentityDocument {
            number: "P123".into(),
            expiry: NaiveDate::from_ymd_opt(2030, 1, 31),
            document_url: Some("blobs/p123.pdf".into()),
        });
        employee.bank_details = Some(BankDetails {
            bank_name: "QNB".into(),
            account_number: "0001".into(),
            iban: None,
        });
        AggregatedRecord {
            employee,
            advances: Slot::Loaded { items: vec![] },
            transactions: Slot::Unavailable {
                reason: FailureClass::Timeout,
            },
        }
    }

    fn source_with(record: &AggregatedRecord) -> Arc<ScriptedSource> {
        let source = Arc::new(ScriptedSource::new());
        source.put(
            "employees",
            "e1",
            to_fields(&record.employee).unwrap(),
        );
        source
    }

    fn reconciler(source: Arc<ScriptedSource>) -> Reconciler {
        Reconciler::new(source, LoadConfig::default())
    }

    #[tokio::test]
    async fn salary_edit_sends_only_salary() {
        let record = baseline();
        let source = source_with(&record);
        let edits = EditSet {
            salary: Some(9000.0),
            ..Default::default()
        };

        let saved = reconciler(source.clone())
            .save(record.id(), edits, &record)
            .await
            .unwrap();

        let writes = source.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].fields, fields(json!({ "salary": 9000.0 })));

        assert_eq!(saved.employee.salary, 9000.0);
        assert_eq!(saved.employee.passport, record.employee.passport);
        // Slots are untouched, including the one that never loaded.
        assert_eq!(saved.advances, record.advances);
        assert_eq!(saved.transactions, record.transactions);
    }

    #[tokio::test]
    async fn nested_patch_sends_the_whole_group() {
        let record = baseline();
        let source = source_with(&record);
        let edits = EditSet {
            passport: Some(IdentityDocumentPatch {
                number: Some("P999".into()),
                ..Default::default()
            }),
            bank_details: Some(BankDetailsPatch::default()),
            ..Default::default()
        };

        reconciler(source.clone())
            .save(record.id(), edits, &record)
            .await
            .unwrap();

        let writes = source.writes();
        assert_eq!(
            writes[0].fields,
            fields(json!({
                "passport": {
                    "number": "P999",
                    "expiry": "2030-01-31",
                    "documentUrl": "blobs/p123.pdf"
                }
            }))
        );

        let stored: EmployeeRecord = source.document("employees", "e1").unwrap().decode().unwrap();
        assert_eq!(stored.passport.unwrap().number, "P999");
        assert_eq!(stored.bank_details, record.employee.bank_details);
    }

    #[tokio::test]
    async fn empty_edit_set_makes_no_call() {
        let record = baseline();
        let source = source_with(&record);

        let saved = reconciler(source.clone())
            .save(record.id(), EditSet::default(), &record)
            .await
            .unwrap();

        assert_eq!(saved, record);
        assert_eq!(source.started(&Route::update("employees", "e1")), 0);
    }

    #[tokio::test]
    async fn rejected_save_returns_edits_intact() {
        let record = baseline();
        let source = source_with(&record);
        source.script(
            Route::update("employees", "e1"),
            [Behavior::fail(TransportError::Conflict("document changed".into()))],
        );
        let edits = EditSet {
            department: Some("Operations".into()),
            ..Default::default()
        };

        let err = reconciler(source)
            .save(record.id(), edits.clone(), &record)
            .await
            .unwrap_err();

        assert!(err.is_conflict());
        assert_eq!(err.edits, edits);
        assert_eq!(err.id, EmployeeId::new("e1"));
    }

    #[tokio::test(start_paused = true)]
    async fn hung_save_times_out() {
        let record = baseline();
        let source = source_with(&record);
        source.script(Route::update("employees", "e1"), [Behavior::Hang]);
        let edits = EditSet {
            phone: Some("+974 5555 0000".into()),
            ..Default::default()
        };

        let err = reconciler(source)
            .save(record.id(), edits, &record)
            .await
            .unwrap_err();
        assert!(matches!(err.failure, SaveFailure::Timeout(_)));
    }

    #[tokio::test]
    async fn appended_advance_gets_store_id() {
        let record = baseline();
        let source = source_with(&record);
        let advance = Advance {
            id: String::new(),
            amount: 800.0,
            date: NaiveDate::from_ymd_opt(2024, 4, 2).unwrap(),
            reason: "school fees".into(),
            status: AdvanceStatus::Pending,
        };

        let added = reconciler(source.clone())
            .append_advance(record.id(), advance)
            .await
            .unwrap();

        assert!(!added.id.is_empty());
        let writes = source.writes();
        assert_eq!(writes[0].route, Route::add("employees", "e1", "advances"));
        assert!(!writes[0].fields.contains_key("id"));
        assert_eq!(writes[0].fields["status"], json!("pending"));
    }

    #[tokio::test]
    async fn advance_status_update_writes_only_status() {
        let record = baseline();
        let source = source_with(&record);
        source.put_sub(
            "employees",
            "e1",
            "advances",
            "a1",
            fields(json!({"amount": 500, "date": "2024-03-01", "status": "pending"})),
        );

        reconciler(source.clone())
            .set_advance_status(record.id(), "a1", AdvanceStatus::Approved)
            .await
            .unwrap();

        let writes = source.writes();
        assert_eq!(writes[0].fields, fields(json!({"status": "approved"})));
    }

    #[tokio::test(start_paused = true)]
    async fn status_update_on_missing_advance_is_not_found() {
        let record = baseline();
        let source = source_with(&record);
        let err = reconciler(source)
            .set_advance_status(record.id(), "nope", AdvanceStatus::Paid)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ClientError::Call(CallError::Transport(TransportError::NotFound(_)))
        ));
    }

    #[test]
    fn status_fold_ignores_unloaded_slot() {
        let mut record = baseline();
        record.advances = Slot::Unavailable {
            reason: FailureClass::Network,
        };
        Committed::AdvanceStatus {
            advance_id: "a1".into(),
            status: AdvanceStatus::Paid,
        }
        .apply(&mut record);
        assert!(record.advances.is_unavailable());
    }

    #[test]
    fn folding_an_append_twice_keeps_one_copy() {
        let mut record = baseline();
        let advance = Advance {
            id: "adv-9".into(),
            amount: 250.0,
            date: NaiveDate::from_ymd_opt(2024, 5, 2).unwrap(),
            reason: "travel".into(),
            status: AdvanceStatus::Pending,
        };
        let write = Committed::Advance(advance.clone());

        write.apply(&mut record);
        write.apply(&mut record);
        assert_eq!(record.advances.items().unwrap(), &[advance][..]);
    }
}
