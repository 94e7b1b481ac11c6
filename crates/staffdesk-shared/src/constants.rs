/// Application name
pub const APP_NAME: &str = "Staffdesk";

/// Collection holding one document per employee
pub const EMPLOYEES_COLLECTION: &str = "employees";

/// Primary record fetch deadline in milliseconds
pub const DEFAULT_PRIMARY_TIMEOUT_MS: u64 = 8_000;

/// Per sub-collection fetch deadline in milliseconds
pub const DEFAULT_SUBCOLLECTION_TIMEOUT_MS: u64 = 5_000;

/// Deadline for the whole aggregation batch in milliseconds
pub const DEFAULT_BATCH_TIMEOUT_MS: u64 = 12_000;

/// Write-back deadline in milliseconds
pub const DEFAULT_SAVE_TIMEOUT_MS: u64 = 10_000;
