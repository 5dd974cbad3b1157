use std::path::PathBuf;
use std::time::Duration;

use clap::Args;

use crate::error::StoreError;

pub const DB_FILE_NAME: &str = "parley.db";
/// Log filter used when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Clone, Args)]
pub struct StoreConfig {
    /// Path of the server database. Defaults to the platform data directory.
    #[arg(long, env = "PARLEY_DB")]
    pub db_path: Option<PathBuf>,

    #[arg(long, env = "PARLEY_DB_CONNECTIONS", default_value_t = 4)]
    pub max_connections: u32,
}

impl StoreConfig {
    pub fn resolve_db_path(&self) -> Result<PathBuf, StoreError> {
        match &self.db_path {
            Some(path) => Ok(path.clone()),
            None => Ok(get_working_dir()?.join(DB_FILE_NAME)),
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct ProbeConfig {
    /// Timeout of each capability probe request, in seconds.
    #[arg(long, env = "PARLEY_PROBE_TIMEOUT", default_value_t = 10)]
    pub probe_timeout_secs: u64,
}

impl ProbeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs.max(1))
    }
}

/// Per-user directory holding the database.
pub fn get_working_dir() -> Result<PathBuf, StoreError> {
    dirs_next::data_local_dir()
        .map(|x| x.join("parley"))
        .ok_or(StoreError::NoDataDir)
}
