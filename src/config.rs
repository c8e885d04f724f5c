use std::path::PathBuf;
use std::time::Duration;

use crate::error::{DbError, Result};
use crate::index::{IndexAlgorithm, LshParams};

/// Database configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Canonical path of the on-disk snapshot. A sibling `.bak` file keeps
    /// the previous generation.
    pub snapshot_path: PathBuf,
    /// How often the background snapshotter wakes up. Must be at least one
    /// second.
    pub snapshot_interval: Duration,
    /// Optional JSON file of `{text, embedding, metadata}` records used to
    /// seed a default library when neither snapshot nor backup exists.
    pub sample_embeddings_path: Option<PathBuf>,
    /// Algorithm used by `index_library` when the caller does not pick one,
    /// and by bootstrap seeding.
    pub default_algorithm: IndexAlgorithm,
    /// LSH parameters applied to every library's LSH backend.
    pub lsh_params: LshParams,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            snapshot_path: PathBuf::from("./vectordb.snapshot"),
            snapshot_interval: Duration::from_secs(30),
            sample_embeddings_path: None,
            default_algorithm: IndexAlgorithm::Lsh,
            lsh_params: LshParams::default(),
        }
    }
}

impl DbConfig {
    pub fn validate(&self) -> Result<()> {
        if self.snapshot_interval < Duration::from_secs(1) {
            return Err(DbError::InvalidArgument(
                "snapshot_interval must be at least 1 second".into(),
            ));
        }
        if self.snapshot_path.as_os_str().is_empty() {
            return Err(DbError::InvalidArgument(
                "snapshot_path must not be empty".into(),
            ));
        }
        self.lsh_params.validate()
    }
}
