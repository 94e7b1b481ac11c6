//! Operator edits against a loaded employee record.
//!
//! An [`EditSet`] only carries the fields the operator touched. Nested groups
//! are expressed as patches; the reconciler resolves them into whole objects
//! before writing because the store replaces nested objects wholesale.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::record::{BankDetails, HrNote, IdentityDocument, LeaveBalances, PerformanceReview};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EditSet {
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
    pub passport: Option<IdentityDocumentPatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qid: Option<IdentityDocumentPatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bank_details: Option<BankDetailsPatch>,

    /// Replaces the stored balances as a whole.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leave_balances: Option<LeaveBalances>,
    /// Replaces the stored list as a whole.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub performance_reviews: Option<Vec<PerformanceReview>>,
    /// Replaces the stored list as a whole.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hr_notes: Option<Vec<HrNote>>,
}

impl EditSet {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IdentityDocumentPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_url: Option<String>,
}

impl IdentityDocumentPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Overlay the patch onto the current value, producing the whole object.
    pub fn resolve(&self, current: Option<&IdentityDocument>) -> IdentityDocument {
        let mut doc = current.cloned().unwrap_or_default();
        if let Some(number) = &self.number {
            doc.number = number.clone();
        }
        if let Some(expiry) = self.expiry {
            doc.expiry = Some(expiry);
        }
        if let Some(url) = &self.document_url {
            doc.document_url = Some(url.clone());
        }
        doc
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BankDetailsPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bank_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iban: Option<String>,
}

impl BankDetailsPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn resolve(&self, current: Option<&BankDetails>) -> BankDetails {
        let mut bank = current.cloned().unwrap_or_default();
        if let Some(name) = &self.bank_name {
            bank.bank_name = name.clone();
        }
        if let Some(account) = &self.account_number {
            bank.account_number = account.clone();
        }
        if let Some(iban) = &self.iban {
            bank.iban = Some(iban.clone());
        }
        bank
    }
}
