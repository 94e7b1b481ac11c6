use std::str::FromStr;

use serde::{Deserialize, Serialize};

// Record identity is assigned by the document store and never changes.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct EmployeeId(pub String);

impl EmployeeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EmployeeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EmployeeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Independently stored lists hanging off an employee document.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Subcollection {
    Advances,
    Transactions,
}

impl Subcollection {
    pub const ALL: [Subcollection; 2] = [Subcollection::Advances, Subcollection::Transactions];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Advances => "advances",
            Self::Transactions => "transactions",
        }
    }
}

impl std::fmt::Display for Subcollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Subcollection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "advances" => Ok(Self::Advances),
            "transactions" => Ok(Self::Transactions),
            other => Err(format!("unknown subcollection: {other}")),
        }
    }
}

/// Coarse classification of a failed remote call, used to pick the message
/// shown to the operator. It never drives control flow.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FailureClass {
    Timeout,
    Permission,
    Network,
    Unknown,
}

impl FailureClass {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Timeout => "The server took too long to respond.",
            Self::Permission => "You do not have permission to view this record.",
            Self::Network => "Could not reach the server. Check your connection.",
            Self::Unknown => "Something went wrong while loading this record.",
        }
    }
}
