use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the rusqlite-backed position store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub path: PathBuf,
    /// `busy_timeout` applied to the connection, covering lock contention
    /// between the reconciler, validator, accountant and API handlers.
    pub busy_timeout_ms: u64,
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/rewards.db"),
            busy_timeout_ms: 5_000,
            wal_mode: true,
        }
    }
}
