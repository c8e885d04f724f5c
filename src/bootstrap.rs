//! Startup and shutdown lifecycle.
//!
//! Resolution order on open: canonical snapshot, then `.bak`, then the
//! configured sample-embeddings file, then empty.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, warn};

use crate::config::DbConfig;
use crate::error::{DbError, Result};
use crate::model::{Metadata, NewChunk, NewDocument};
use crate::snapshot::{read_snapshot, sibling, write_snapshot, SnapshotState, Snapshotter};
use crate::store::Store;

/// Library id used when seeding from a sample-embeddings file.
pub const DEFAULT_LIBRARY_ID: &str = "default_library";

/// One record of the sample-embeddings seed file.
#[derive(Debug, Deserialize)]
struct SeedRecord {
    text: String,
    embedding: Vec<f32>,
    #[serde(default)]
    metadata: Metadata,
}

/// A running database: the store plus its background snapshot worker.
///
/// Construct one per process with [`Database::open`]; hand out clones of
/// the inner [`Store`] arc to request handlers. Dropping the database (or
/// calling [`Database::shutdown`]) stops the worker cooperatively, with a
/// final flush when changes are pending.
pub struct Database {
    store: Arc<Store>,
    snapshotter: Option<Snapshotter>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}

impl Database {
    pub fn open(config: DbConfig) -> Result<Self> {
        config.validate()?;
        let store = Arc::new(Store::new(&config));

        if let Some(state) = load_state(&config.snapshot_path)? {
            let libraries = state.libraries.len();
            store.restore(state)?;
            info!(libraries, path = %config.snapshot_path.display(), "loaded snapshot");
        } else if let Some(seed_path) = config
            .sample_embeddings_path
            .as_deref()
            .filter(|p| p.exists())
        {
            let chunks = seed_store(&store, seed_path, &config)?;
            write_snapshot(&store.snapshot_state(), &config.snapshot_path)?;
            store.note_snapshot_written();
            info!(chunks, path = %seed_path.display(), "seeded store from sample embeddings");
        } else {
            info!("starting with an empty store");
        }

        let snapshotter = Snapshotter::spawn(
            Arc::clone(&store),
            config.snapshot_path.clone(),
            config.snapshot_interval,
        )?;
        Ok(Self {
            store,
            snapshotter: Some(snapshotter),
        })
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Stop the snapshot worker, flushing pending changes first.
    pub fn shutdown(mut self) {
        if let Some(snapshotter) = self.snapshotter.take() {
            snapshotter.stop();
        }
    }
}

/// Resolve the snapshot to adopt: canonical first, then backup.
///
/// `Ok(None)` means no state file exists and seeding/empty start may
/// proceed. A state file that exists but cannot be parsed, with no
/// parseable alternative, is fatal rather than silently discarded: the
/// next periodic write would otherwise overwrite the only copy.
fn load_state(path: &Path) -> Result<Option<SnapshotState>> {
    let primary_err = if path.exists() {
        match read_snapshot(path) {
            Ok(state) => return Ok(Some(state)),
            Err(e) => {
                warn!(error = %e, path = %path.display(), "canonical snapshot unreadable; trying backup");
                Some(e)
            }
        }
    } else {
        None
    };
    let backup = sibling(path, "bak");
    if backup.exists() {
        match read_snapshot(&backup) {
            Ok(state) => {
                warn!(path = %backup.display(), "adopted backup snapshot; canonical was missing or corrupt");
                return Ok(Some(state));
            }
            Err(e) => {
                warn!(error = %e, path = %backup.display(), "backup snapshot unreadable");
                return Err(primary_err.unwrap_or(e));
            }
        }
    }
    match primary_err {
        Some(e) => Err(e),
        None => Ok(None),
    }
}

/// Load the seed file into a default library, grouping records into
/// documents by their `document_title` metadata, and index it.
fn seed_store(store: &Store, path: &Path, config: &DbConfig) -> Result<usize> {
    let bytes = fs::read(path)?;
    let records: Vec<SeedRecord> = serde_json::from_slice(&bytes)
        .map_err(|e| DbError::Persistence(format!("sample embeddings file: {e}")))?;
    let total = records.len();

    let mut by_document: BTreeMap<String, Vec<SeedRecord>> = BTreeMap::new();
    for record in records {
        let title = record
            .metadata
            .get("document_title")
            .and_then(|v| v.as_str())
            .unwrap_or("Untitled")
            .to_string();
        by_document.entry(title).or_default().push(record);
    }

    store.create_library(DEFAULT_LIBRARY_ID, Metadata::new())?;
    for (title, records) in by_document {
        let chunks = records
            .into_iter()
            .map(|record| NewChunk {
                chunk_id: None,
                text: record.text,
                embedding: record.embedding,
                metadata: record.metadata,
            })
            .collect();
        let mut metadata = Metadata::new();
        metadata.insert(
            "document_title".into(),
            serde_json::Value::String(title.clone()),
        );
        store.create_document(
            DEFAULT_LIBRARY_ID,
            NewDocument {
                document_id: None,
                title,
                metadata,
                chunks,
            },
        )?;
    }
    store.index_library(DEFAULT_LIBRARY_ID, Some(config.default_algorithm))?;
    Ok(total)
}
