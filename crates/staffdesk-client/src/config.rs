//! Load configuration, read from environment variables.
//!
//! The timeouts are operational guesses rather than SLA-derived numbers, so
//! every one of them can be overridden without a rebuild.

use std::time::Duration;

use staffdesk_shared::constants::{
    DEFAULT_BATCH_TIMEOUT_MS, DEFAULT_PRIMARY_TIMEOUT_MS, DEFAULT_SAVE_TIMEOUT_MS,
    DEFAULT_SUBCOLLECTION_TIMEOUT_MS, EMPLOYEES_COLLECTION,
};
use staffdesk_shared::Subcollection;

/// Deadlines and addressing for detail-view loads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadConfig {
    /// Collection holding employee documents.
    /// Env: `STAFFDESK_COLLECTION`
    /// Default: `employees`
    pub collection: String,

    /// Sub-collections fetched alongside the primary record.
    /// Env: `STAFFDESK_SUBCOLLECTIONS` (comma separated)
    /// Default: `advances,transactions`
    pub subcollections: Vec<Subcollection>,

    /// Env: `STAFFDESK_PRIMARY_TIMEOUT_MS`
    pub primary_timeout: Duration,

    /// Applied to each sub-collection fetch on its own.
    /// Env: `STAFFDESK_SUBCOLLECTION_TIMEOUT_MS`
    pub subcollection_timeout: Duration,

    /// Caps the whole aggregation, whatever the per-call deadlines say.
    /// Env: `STAFFDESK_BATCH_TIMEOUT_MS`
    pub batch_timeout: Duration,

    /// Env: `STAFFDESK_SAVE_TIMEOUT_MS`
    pub save_timeout: Duration,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            collection: EMPLOYEES_COLLECTION.to_string(),
            subcollections: Subcollection::ALL.to_vec(),
            primary_timeout: Duration::from_millis(DEFAULT_PRIMARY_TIMEOUT_MS),
            subcollection_timeout: Duration::from_millis(DEFAULT_SUBCOLLECTION_TIMEOUT_MS),
            batch_timeout: Duration::from_millis(DEFAULT_BATCH_TIMEOUT_MS),
            save_timeout: Duration::from_millis(DEFAULT_SAVE_TIMEOUT_MS),
        }
    }
}

impl LoadConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`LoadConfig::from_env`] with an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(collection) = lookup("STAFFDESK_COLLECTION") {
            let collection = collection.trim();
            if collection.is_empty() || collection.contains('/') {
                tracing::warn!(value = %collection, "Invalid STAFFDESK_COLLECTION, using default");
            } else {
                config.collection = collection.to_string();
            }
        }

        if let Some(list) = lookup("STAFFDESK_SUBCOLLECTIONS") {
            let mut subs = Vec::new();
            for name in list.split(',').filter(|s| !s.trim().is_empty()) {
                match name.parse::<Subcollection>() {
                    Ok(sub) if !subs.contains(&sub) => subs.push(sub),
                    Ok(_) => {}
                    Err(e) => tracing::warn!(error = %e, "Ignoring entry in STAFFDESK_SUBCOLLECTIONS"),
                }
            }
            config.subcollections = subs;
        }

        read_ms(&lookup, "STAFFDESK_PRIMARY_TIMEOUT_MS", &mut config.primary_timeout);
        read_ms(
            &lookup,
            "STAFFDESK_SUBCOLLECTION_TIMEOUT_MS",
            &mut config.subcollection_timeout,
        );
        read_ms(&lookup, "STAFFDESK_BATCH_TIMEOUT_MS", &mut config.batch_timeout);
        read_ms(&lookup, "STAFFDESK_SAVE_TIMEOUT_MS", &mut config.save_timeout);

        config
    }
}

/// Parse a positive millisecond count into `slot`, leaving it untouched on
/// missing, malformed or zero values.
fn read_ms(lookup: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut Duration) {
    let Some(raw) = lookup(key) else {
        return;
    };

    match raw.trim().parse::<u64>() {
        Ok(ms) if ms > 0 => *slot = Duration::from_millis(ms),
        _ => tracing::warn!(key, value = %raw, "Invalid timeout, using default"),
    }
}
