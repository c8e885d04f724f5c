//! On-disk persistence: a single versioned blob holding entities and index
//! configuration, written atomically, plus the background worker that
//! persists the store on a fixed interval.
//!
//! Index internals are never trusted from disk; LSH projections and
//! buckets are regenerated from the persisted seed and parameters when a
//! snapshot is adopted.

use std::fs::{self, File};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{DbError, Result};
use crate::index::LshParams;
use crate::model::{Chunk, Document, Library};
use crate::store::Store;

pub(crate) const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct SnapshotState {
    pub schema_version: u32,
    pub libraries: Vec<LibraryRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct LibraryRecord {
    pub library: Library,
    pub lsh_params: LshParams,
    pub dimension: Option<usize>,
    pub documents: Vec<DocumentRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct DocumentRecord {
    pub document: Document,
    pub chunks: Vec<Chunk>,
}

/// Sibling path with an extra suffix: `vectordb.snapshot` ->
/// `vectordb.snapshot.bak`.
pub(crate) fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

/// Serialize and atomically install a snapshot at `path`.
///
/// The blob is written to a `.tmp` sibling and fsynced before any rename,
/// so a crash mid-write leaves the canonical file untouched. The previous
/// canonical file survives one generation as `.bak`.
pub(crate) fn write_snapshot(state: &SnapshotState, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let bytes = serde_json::to_vec(state)
        .map_err(|e| DbError::Persistence(format!("snapshot serialization failed: {e}")))?;

    let tmp = sibling(path, "tmp");
    {
        let mut file = File::create(&tmp)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
    }
    if path.exists() {
        fs::rename(path, sibling(path, "bak"))?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

pub(crate) fn read_snapshot(path: &Path) -> Result<SnapshotState> {
    let bytes = fs::read(path)?;
    let state: SnapshotState = serde_json::from_slice(&bytes)
        .map_err(|e| DbError::Persistence(format!("snapshot parse failed: {e}")))?;
    if state.schema_version != SCHEMA_VERSION {
        return Err(DbError::Persistence(format!(
            "unsupported snapshot schema version {}",
            state.schema_version
        )));
    }
    Ok(state)
}

#[derive(Default)]
struct SignalState {
    dirty: bool,
    stop: bool,
}

/// Shared dirty/stop signal between the store and the snapshot worker.
///
/// Mutations set the dirty flag without waking the worker; the worker
/// drains it on its next interval tick, which coalesces any number of
/// requests into one write. Only shutdown notifies.
pub(crate) struct SnapshotSignal {
    state: Mutex<SignalState>,
    cond: Condvar,
}

impl SnapshotSignal {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(SignalState::default()),
            cond: Condvar::new(),
        }
    }

    pub(crate) fn mark_dirty(&self) {
        self.state.lock().dirty = true;
    }

    fn request_stop(&self) {
        let mut state = self.state.lock();
        state.stop = true;
        self.cond.notify_all();
    }

    /// Sleep until the next tick (or shutdown), then drain the dirty flag.
    fn next_tick(&self, interval: Duration) -> (bool, bool) {
        let mut state = self.state.lock();
        if !state.stop {
            let _ = self.cond.wait_for(&mut state, interval);
        }
        let dirty = state.dirty;
        state.dirty = false;
        (dirty, state.stop)
    }
}

/// Handle to the background snapshot thread.
///
/// Dropping the handle stops the worker cooperatively, flushing a pending
/// dirty state first, and joins the thread.
pub(crate) struct Snapshotter {
    handle: Option<JoinHandle<()>>,
    signal: Arc<SnapshotSignal>,
}

impl Snapshotter {
    pub(crate) fn spawn(store: Arc<Store>, path: PathBuf, interval: Duration) -> Result<Self> {
        let signal = store.snapshot_signal();
        let worker_signal = Arc::clone(&signal);
        let handle = thread::Builder::new()
            .name("chunkdb-snapshot".into())
            .spawn(move || run(store, path, interval, worker_signal))?;
        Ok(Self {
            handle: Some(handle),
            signal,
        })
    }

    pub(crate) fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.signal.request_stop();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Snapshotter {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(store: Arc<Store>, path: PathBuf, interval: Duration, signal: Arc<SnapshotSignal>) {
    loop {
        let (dirty, stop) = signal.next_tick(interval);
        if dirty {
            let state = store.snapshot_state();
            match write_snapshot(&state, &path) {
                Ok(()) => {
                    store.note_snapshot_written();
                    debug!(
                        path = %path.display(),
                        libraries = state.libraries.len(),
                        "wrote snapshot"
                    );
                }
                Err(e) => {
                    // Leave the flag set so the next tick retries.
                    warn!(error = %e, path = %path.display(), "snapshot write failed");
                    signal.mark_dirty();
                }
            }
        }
        if stop {
            break;
        }
    }
}
