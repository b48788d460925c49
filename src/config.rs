// Configuration: store location, backend choice and CLI defaults

use crate::backend::{FileBackend, KeyValueBackend, SqliteBackend};
use crate::models::Priority;
use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

pub const CONFIG_FILE: &str = "config.yaml";
pub const DB_FILE: &str = "tasklist.db";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Sqlite,
    Files,
}

/// Optional `config.yaml` inside the store directory
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct Config {
    pub backend: BackendKind,
    /// Priority used by `add` when none is given
    pub default_priority: Priority,
}

impl Config {
    /// Read `config.yaml` from `store_path`, falling back to defaults when absent
    pub fn load(store_path: &Path) -> Result<Self> {
        let path = store_path.join(CONFIG_FILE);
        if !path.exists() {
            debug!(path = ?path, "No config file, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }
}

/// Default store directory under the platform data dir
pub fn default_store_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tasklist")
}

/// Open the configured backend rooted at `store_path`
pub fn open_backend(kind: BackendKind, store_path: &Path) -> Result<Arc<dyn KeyValueBackend>> {
    let backend: Arc<dyn KeyValueBackend> = match kind {
        BackendKind::Sqlite => Arc::new(SqliteBackend::open(store_path.join(DB_FILE))?),
        BackendKind::Files => Arc::new(FileBackend::open(store_path)?),
    };
    Ok(backend)
}
