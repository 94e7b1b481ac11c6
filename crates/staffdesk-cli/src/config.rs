//! CLI configuration loaded from environment variables.
//!
//! Everything has a default so `staffdesk` runs with zero configuration.

use std::path::PathBuf;

use staffdesk_client::LoadConfig;
use staffdesk_store::{Database, StoreError};

#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    /// SQLite document database.
    /// Env: `STAFFDESK_DB_PATH`
    /// Default: `staffdesk.db` in the platform data directory.
    pub db_path: Option<PathBuf>,

    /// Deadlines and addressing for detail loads (`STAFFDESK_*_TIMEOUT_MS`,
    /// `STAFFDESK_COLLECTION`, `STAFFDESK_SUBCOLLECTIONS`).
    pub load: LoadConfig,
}

impl CliConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let db_path = lookup("STAFFDESK_DB_PATH")
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .map(PathBuf::from);

        Self {
            db_path,
            load: LoadConfig::from_lookup(lookup),
        }
    }

    pub fn open_database(&self) -> Result<Database, StoreError> {
        match &self.db_path {
            Some(path) => {
                if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                    std::fs::create_dir_all(dir)?;
                }
                tracing::info!(path = %path.display(), "opening database");
                Database::open_at(path)
            }
            None => Database::new(),
        }
    }
}
