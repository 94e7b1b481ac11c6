//! Employee record model.
//!
//! [`EmployeeRecord`] is what the primary document holds. [`AggregatedRecord`]
//! is the detail-view projection: the primary record plus one [`Slot`] per
//! independently fetched sub-collection.

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::PartialAggregationError;
use crate::types::{EmployeeId, FailureClass, Subcollection};

/// Raw document as held by the store: an id plus its JSON body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub fields: Map<String, Value>,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Decode the body into a typed value, exposing the document id as `id`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        let mut fields = self.fields.clone();
        fields.insert("id".to_string(), Value::String(self.id.clone()));
        serde_json::from_value(Value::Object(fields))
    }
}

/// Serialize a value into a document body, dropping its `id` key.
pub fn to_fields<T: Serialize>(value: &T) -> Result<Map<String, Value>, serde_json::Error> {
    match serde_json::to_value(value)? {
        Value::Object(mut map) => {
            map.remove("id");
            Ok(map)
        }
        other => Err(serde::ser::Error::custom(format!(
            "expected an object, got {other}"
        ))),
    }
}

// ---------------------------------------------------------------------------
// Primary record
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeRecord {
    #[serde(default)]
    pub id: EmployeeId,
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub department: String,
    #[serde(default)]
    pub position: String,
    #[serde(default)]
    pub salary: f64,
    #[serde(default)]
    pub address: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passport: Option<IdentityDocument>,
    /// National ID card.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qid: Option<IdentityDocument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bank_details: Option<BankDetails>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leave_balances: Option<LeaveBalances>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub performance_reviews: Option<Vec<PerformanceReview>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hr_notes: Option<Vec<HrNote>>,
}

impl EmployeeRecord {
    /// Minimal record, as a list view would know it.
    pub fn shallow(id: EmployeeId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            email: String::new(),
            phone: String::new(),
            department: String::new(),
            position: String::new(),
            salary: 0.0,
            address: String::new(),
            passport: None,
            qid: None,
            bank_details: None,
            leave_balances: None,
            performance_reviews: None,
            hr_notes: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityDocument {
    pub number: String,
    #[serde(default)]
    pub expiry: Option<NaiveDate>,
    /// Reference to the scanned document in blob storage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankDetails {
    pub bank_name: String,
    pub account_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iban: Option<String>,
}

/// Remaining leave, in days.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveBalances {
    #[serde(default)]
    pub annual: f64,
    #[serde(default)]
    pub sick: f64,
    #[serde(default)]
    pub unpaid: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceReview {
    pub date: NaiveDate,
    pub rating: u8,
    pub reviewer: String,
    #[serde(default)]
    pub comments: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HrNote {
    pub date: NaiveDate,
    pub author: String,
    pub note: String,
}

// ---------------------------------------------------------------------------
// Sub-collection items
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdvanceStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
    Paid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Advance {
    #[serde(default)]
    pub id: String,
    pub amount: f64,
    pub date: NaiveDate,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub status: AdvanceStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Salary,
    Advance,
    Bonus,
    Deduction,
    Reimbursement,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    #[serde(default)]
    pub id: String,
    pub amount: f64,
    pub date: NaiveDate,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    #[serde(default)]
    pub description: String,
}

// ---------------------------------------------------------------------------
// Slots
// ---------------------------------------------------------------------------

/// Load state of one sub-collection inside an aggregated record.
///
/// `Loaded` with an empty list means the store confirmed there is nothing;
/// `Unavailable` means we do not know.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Slot<T> {
    Loaded { items: Vec<T> },
    /// Last known-good items, kept after a refresh failed.
    Stale { items: Vec<T>, reason: FailureClass },
    Unavailable { reason: FailureClass },
    /// Not requested by this load.
    Skipped,
}

impl<T> Slot<T> {
    pub fn items(&self) -> Option<&[T]> {
        match self {
            Slot::Loaded { items } | Slot::Stale { items, .. } => Some(items),
            Slot::Unavailable { .. } | Slot::Skipped => None,
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, Slot::Loaded { .. })
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, Slot::Unavailable { .. })
    }

    /// True when the slot reflects a failed fetch, stale or not.
    pub fn is_degraded(&self) -> bool {
        matches!(self, Slot::Stale { .. } | Slot::Unavailable { .. })
    }

    /// Append an item if the slot holds data. Returns false when the slot
    /// has no list to extend.
    pub fn push(&mut self, item: T) -> bool {
        match self {
            Slot::Loaded { items } | Slot::Stale { items, .. } => {
                items.push(item);
                true
            }
            Slot::Unavailable { .. } | Slot::Skipped => false,
        }
    }

    pub fn items_mut(&mut self) -> Option<&mut Vec<T>> {
        match self {
            Slot::Loaded { items } | Slot::Stale { items, .. } => Some(items),
            Slot::Unavailable { .. } | Slot::Skipped => None,
        }
    }
}

impl<T: Clone> Slot<T> {
    /// Keep previously loaded items when this slot failed to refresh.
    pub fn retain_known_good(self, previous: &Slot<T>) -> Slot<T> {
        match (self, previous.items()) {
            (Slot::Unavailable { reason }, Some(items)) => Slot::Stale {
                items: items.to_vec(),
                reason,
            },
            (slot, _) => slot,
        }
    }
}

// ---------------------------------------------------------------------------
// Aggregated record
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedRecord {
    pub employee: EmployeeRecord,
    pub advances: Slot<Advance>,
    pub transactions: Slot<Transaction>,
}

impl AggregatedRecord {
    /// A record with only primary data; every sub-collection skipped.
    pub fn from_primary(employee: EmployeeRecord) -> Self {
        Self {
            employee,
            advances: Slot::Skipped,
            transactions: Slot::Skipped,
        }
    }

    pub fn id(&self) -> &EmployeeId {
        &self.employee.id
    }

    pub fn is_degraded(&self, sub: Subcollection) -> bool {
        match sub {
            Subcollection::Advances => self.advances.is_degraded(),
            Subcollection::Transactions => self.transactions.is_degraded(),
        }
    }

    /// `Some` when at least one sub-collection could not be refreshed.
    pub fn partial(&self) -> Option<PartialAggregationError> {
        let unavailable: Vec<Subcollection> = Subcollection::ALL
            .into_iter()
            .filter(|sub| self.is_degraded(*sub))
            .collect();

        if unavailable.is_empty() {
            None
        } else {
            Some(PartialAggregationError { unavailable })
        }
    }

    /// Fold the last known-good record into a fresh one so that slots never
    /// go from loaded back to unavailable.
    pub fn retain_known_good(&mut self, previous: &AggregatedRecord) {
        let advances = std::mem::replace(&mut self.advances, Slot::Skipped);
        self.advances = advances.retain_known_good(&previous.advances);

        let transactions = std::mem::replace(&mut self.transactions, Slot::Skipped);
        self.transactions = transactions.retain_known_good(&previous.transactions);
    }
}
