//! The authoritative in-memory store.
//!
//! Locking discipline: one `RwLock` guards the library set (create/delete
//! library), and every library carries its own reentrant exclusive lock.
//! Locks are acquired set-first, then libraries in ascending `library_id`
//! order (the `BTreeMap` iteration order), so multi-library holders such as
//! the snapshotter cannot deadlock against single-library operations.
//! Entity maps and index updates mutate under the same library lock, so a
//! search observes either the pre- or post-state of any competing mutation.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use parking_lot::{ReentrantMutex, RwLock};
use tracing::{debug, info};

use crate::config::DbConfig;
use crate::error::{DbError, Entity, Result};
use crate::index::{IndexAlgorithm, IndexFacade, LshParams};
use crate::metrics::{MetricsSnapshot, SearchTimer, StoreMetrics};
use crate::model::{
    mint_id, Chunk, ChunkPatch, Document, DocumentPatch, Library, Metadata, NewChunk, NewDocument,
};
use crate::snapshot::{
    DocumentRecord, LibraryRecord, SnapshotSignal, SnapshotState, SCHEMA_VERSION,
};

/// One search result: a chunk and its cosine distance from the query.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub distance: f32,
    pub chunk: Chunk,
}

/// Per-library state, owned by that library's lock.
struct Shard {
    library: Library,
    dimension: Option<usize>,
    documents: BTreeMap<String, Document>,
    /// document_id -> chunk_id -> chunk.
    chunks: BTreeMap<String, BTreeMap<String, Chunk>>,
    /// Library-wide ownership map; also enforces chunk-id uniqueness
    /// across documents.
    chunk_owner: BTreeMap<String, String>,
    facade: IndexFacade,
}

impl Shard {
    fn new(library: Library, lsh_params: LshParams) -> Self {
        Self {
            library,
            dimension: None,
            documents: BTreeMap::new(),
            chunks: BTreeMap::new(),
            chunk_owner: BTreeMap::new(),
            facade: IndexFacade::new(lsh_params),
        }
    }

    fn total_chunks(&self) -> usize {
        self.chunk_owner.len()
    }

    fn resolve_chunk(&self, chunk_id: &str) -> Option<&Chunk> {
        let document_id = self.chunk_owner.get(chunk_id)?;
        self.chunks.get(document_id)?.get(chunk_id)
    }

    fn all_chunk_pairs(&self) -> Vec<(String, Vec<f32>)> {
        self.chunk_owner
            .iter()
            .filter_map(|(chunk_id, document_id)| {
                self.chunks
                    .get(document_id)
                    .and_then(|m| m.get(chunk_id))
                    .map(|chunk| (chunk_id.clone(), chunk.embedding.clone()))
            })
            .collect()
    }

    /// Validate a batch of chunk candidates against current library state
    /// and against the batch itself. Returns the resolved chunk ids
    /// (minting where absent) without mutating anything, so a failure
    /// anywhere leaves the library untouched.
    fn validate_new_chunks(&self, inputs: &[NewChunk]) -> Result<Vec<String>> {
        let mut expected_dim = self.dimension;
        let mut batch_ids: BTreeSet<String> = BTreeSet::new();
        let mut resolved = Vec::with_capacity(inputs.len());
        for input in inputs {
            if input.text.is_empty() {
                return Err(DbError::InvalidArgument(
                    "chunk text must not be empty".into(),
                ));
            }
            validate_embedding(expected_dim, &input.embedding)?;
            expected_dim = expected_dim.or(Some(input.embedding.len()));

            let chunk_id = input.chunk_id.clone().unwrap_or_else(mint_id);
            if self.chunk_owner.contains_key(&chunk_id) || !batch_ids.insert(chunk_id.clone()) {
                return Err(DbError::DuplicateId {
                    entity: Entity::Chunk,
                    id: chunk_id,
                });
            }
            resolved.push(chunk_id);
        }
        Ok(resolved)
    }

    /// Insert an already-validated chunk, fixing the library dimension on
    /// first insertion and keeping the index in sync when one is active.
    fn insert_chunk(&mut self, document_id: &str, chunk_id: String, input: NewChunk) -> Result<Chunk> {
        let chunk = Chunk::new(
            chunk_id.clone(),
            document_id.to_string(),
            self.library.library_id.clone(),
            input.text,
            input.embedding,
            input.metadata,
        );
        if self.dimension.is_none() {
            self.dimension = Some(chunk.embedding.len());
        }
        self.facade.observe_dimension(chunk.embedding.len());
        if self.library.is_indexed {
            self.facade.on_chunk_added(&chunk_id, &chunk.embedding)?;
        }
        self.chunk_owner
            .insert(chunk_id.clone(), document_id.to_string());
        self.chunks
            .entry(document_id.to_string())
            .or_default()
            .insert(chunk_id, chunk.clone());
        Ok(chunk)
    }
}

fn validate_embedding(expected_dim: Option<usize>, embedding: &[f32]) -> Result<()> {
    if embedding.is_empty() {
        return Err(DbError::InvalidArgument(
            "embedding must not be empty".into(),
        ));
    }
    if embedding.iter().any(|x| !x.is_finite()) {
        return Err(DbError::InvalidArgument(
            "embedding contains non-finite values".into(),
        ));
    }
    if let Some(expected) = expected_dim {
        if embedding.len() != expected {
            return Err(DbError::DimensionMismatch {
                expected,
                got: embedding.len(),
            });
        }
    }
    let norm_sq: f32 = embedding.iter().map(|x| x * x).sum();
    if norm_sq.sqrt() <= f32::EPSILON {
        return Err(DbError::DegenerateVector);
    }
    Ok(())
}

fn not_found(entity: Entity, id: &str) -> DbError {
    DbError::NotFound {
        entity,
        id: id.to_string(),
    }
}

type ShardCell = Arc<ReentrantMutex<RefCell<Shard>>>;

/// Thread-safe vector database over libraries of documents of chunks.
///
/// All operations bracket their work in the locking discipline described
/// in the module docs; mutations additionally flag the snapshot signal so
/// the background writer persists them on its next tick.
pub struct Store {
    libraries: RwLock<BTreeMap<String, ShardCell>>,
    default_algorithm: IndexAlgorithm,
    lsh_params: LshParams,
    signal: Arc<SnapshotSignal>,
    metrics: StoreMetrics,
}

impl Store {
    pub fn new(config: &DbConfig) -> Self {
        Self {
            libraries: RwLock::new(BTreeMap::new()),
            default_algorithm: config.default_algorithm,
            lsh_params: config.lsh_params,
            signal: Arc::new(SnapshotSignal::new()),
            metrics: StoreMetrics::new(),
        }
    }

    pub(crate) fn snapshot_signal(&self) -> Arc<SnapshotSignal> {
        Arc::clone(&self.signal)
    }

    pub(crate) fn note_snapshot_written(&self) {
        self.metrics.record_snapshot_write();
    }

    /// Point-in-time view of the operation counters.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Reset the operation counters.
    pub fn reset_metrics(&self) {
        self.metrics.reset();
    }

    fn mark_dirty(&self) {
        self.signal.mark_dirty();
    }

    fn shard(&self, library_id: &str) -> Result<ShardCell> {
        self.libraries
            .read()
            .get(library_id)
            .cloned()
            .ok_or_else(|| not_found(Entity::Library, library_id))
    }

    // ------------------------------------------------------------------
    // Libraries
    // ------------------------------------------------------------------

    pub fn create_library(&self, library_id: &str, metadata: Metadata) -> Result<Library> {
        if library_id.is_empty() {
            return Err(DbError::InvalidArgument(
                "library_id must not be empty".into(),
            ));
        }
        let mut set = self.libraries.write();
        if set.contains_key(library_id) {
            return Err(DbError::DuplicateId {
                entity: Entity::Library,
                id: library_id.to_string(),
            });
        }
        let library = Library::new(library_id.to_string(), metadata);
        let shard = Shard::new(library.clone(), self.lsh_params);
        set.insert(
            library_id.to_string(),
            Arc::new(ReentrantMutex::new(RefCell::new(shard))),
        );
        drop(set);
        self.mark_dirty();
        info!(library_id = %library_id, "created library");
        Ok(library)
    }

    pub fn get_library(&self, library_id: &str) -> Result<Library> {
        let cell = self.shard(library_id)?;
        let guard = cell.lock();
        let library = guard.borrow().library.clone();
        Ok(library)
    }

    pub fn list_libraries(&self) -> Vec<Library> {
        let cells: Vec<ShardCell> = self.libraries.read().values().cloned().collect();
        cells
            .iter()
            .map(|cell| {
                let guard = cell.lock();
                let library = guard.borrow().library.clone();
                library
            })
            .collect()
    }

    /// Merge `metadata` into the library's metadata.
    pub fn update_library(&self, library_id: &str, metadata: Metadata) -> Result<Library> {
        let cell = self.shard(library_id)?;
        let guard = cell.lock();
        let mut shard = guard.borrow_mut();
        for (key, value) in metadata {
            shard.library.metadata.insert(key, value);
        }
        shard.library.touch();
        let library = shard.library.clone();
        drop(shard);
        self.mark_dirty();
        debug!(library_id = %library_id, "updated library metadata");
        Ok(library)
    }

    /// Delete a library and, by cascade, all of its documents and chunks.
    pub fn delete_library(&self, library_id: &str) -> Result<()> {
        let mut set = self.libraries.write();
        let cell = set
            .remove(library_id)
            .ok_or_else(|| not_found(Entity::Library, library_id))?;
        drop(set);

        // Removing the map entry is the whole cascade: every future lookup
        // resolves to NotFound. The detached shard is left untouched so an
        // in-flight operation that already resolved it completes against a
        // valid pre-delete view, whichever side wins the shard lock.
        let guard = cell.lock();
        let removed = guard.borrow().total_chunks();
        drop(guard);

        self.metrics.record_chunk_deletes(removed as u64);
        self.mark_dirty();
        info!(library_id = %library_id, chunks = removed, "deleted library");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Documents
    // ------------------------------------------------------------------

    /// Create a document, optionally with inline chunks.
    ///
    /// All-or-nothing: if any inline chunk fails validation, neither the
    /// document nor any chunk is inserted.
    pub fn create_document(&self, library_id: &str, input: NewDocument) -> Result<Document> {
        let cell = self.shard(library_id)?;
        let guard = cell.lock();
        let mut shard = guard.borrow_mut();

        let document_id = input.document_id.clone().unwrap_or_else(mint_id);
        if shard.documents.contains_key(&document_id) {
            return Err(DbError::DuplicateId {
                entity: Entity::Document,
                id: document_id,
            });
        }
        let chunk_ids = shard.validate_new_chunks(&input.chunks)?;

        let document = Document::new(
            document_id.clone(),
            library_id.to_string(),
            input.title,
            input.metadata,
        );
        shard.documents.insert(document_id.clone(), document.clone());
        let inserted = input.chunks.len();
        for (chunk_id, chunk_input) in chunk_ids.into_iter().zip(input.chunks) {
            shard.insert_chunk(&document_id, chunk_id, chunk_input)?;
        }
        shard.library.touch();
        drop(shard);

        self.metrics.record_chunk_inserts(inserted as u64);
        self.mark_dirty();
        debug!(library_id = %library_id, document_id = %document_id, chunks = inserted, "created document");
        Ok(document)
    }

    pub fn get_document(&self, library_id: &str, document_id: &str) -> Result<Document> {
        let cell = self.shard(library_id)?;
        let guard = cell.lock();
        let shard = guard.borrow();
        shard
            .documents
            .get(document_id)
            .cloned()
            .ok_or_else(|| not_found(Entity::Document, document_id))
    }

    pub fn list_documents(&self, library_id: &str) -> Result<Vec<Document>> {
        let cell = self.shard(library_id)?;
        let guard = cell.lock();
        let documents = guard.borrow().documents.values().cloned().collect();
        Ok(documents)
    }

    pub fn update_document(
        &self,
        library_id: &str,
        document_id: &str,
        patch: DocumentPatch,
    ) -> Result<Document> {
        let cell = self.shard(library_id)?;
        let guard = cell.lock();
        let mut shard = guard.borrow_mut();
        let document = shard
            .documents
            .get_mut(document_id)
            .ok_or_else(|| not_found(Entity::Document, document_id))?;
        if let Some(title) = patch.title {
            document.title = title;
        }
        if let Some(metadata) = patch.metadata {
            for (key, value) in metadata {
                document.metadata.insert(key, value);
            }
        }
        document.touch();
        let updated = document.clone();
        drop(shard);
        self.mark_dirty();
        debug!(library_id = %library_id, document_id = %document_id, "updated document");
        Ok(updated)
    }

    /// Delete a document and all of its chunks.
    pub fn delete_document(&self, library_id: &str, document_id: &str) -> Result<()> {
        let cell = self.shard(library_id)?;
        let guard = cell.lock();
        let mut shard = guard.borrow_mut();
        if shard.documents.remove(document_id).is_none() {
            return Err(not_found(Entity::Document, document_id));
        }
        let removed = shard.chunks.remove(document_id).unwrap_or_default();
        for chunk_id in removed.keys() {
            shard.chunk_owner.remove(chunk_id);
            if shard.library.is_indexed {
                shard.facade.on_chunk_removed(chunk_id)?;
            }
        }
        shard.library.touch();
        drop(shard);

        self.metrics.record_chunk_deletes(removed.len() as u64);
        self.mark_dirty();
        debug!(library_id = %library_id, document_id = %document_id, chunks = removed.len(), "deleted document");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Chunks
    // ------------------------------------------------------------------

    pub fn create_chunk(
        &self,
        library_id: &str,
        document_id: &str,
        input: NewChunk,
    ) -> Result<Chunk> {
        let cell = self.shard(library_id)?;
        let guard = cell.lock();
        let mut shard = guard.borrow_mut();
        if !shard.documents.contains_key(document_id) {
            return Err(not_found(Entity::Document, document_id));
        }
        let chunk_id = shard
            .validate_new_chunks(std::slice::from_ref(&input))?
            .pop()
            .ok_or_else(|| DbError::Internal("validation returned no chunk id".into()))?;
        let chunk = shard.insert_chunk(document_id, chunk_id, input)?;
        if let Some(document) = shard.documents.get_mut(document_id) {
            document.touch();
        }
        drop(shard);

        self.metrics.record_chunk_inserts(1);
        self.mark_dirty();
        debug!(library_id = %library_id, document_id = %document_id, chunk_id = %chunk.chunk_id, "created chunk");
        Ok(chunk)
    }

    /// All-or-nothing batch creation: every candidate is validated against
    /// the current library state and against the batch itself before any
    /// insert happens.
    pub fn create_chunks_bulk(
        &self,
        library_id: &str,
        document_id: &str,
        inputs: Vec<NewChunk>,
    ) -> Result<Vec<Chunk>> {
        let cell = self.shard(library_id)?;
        let guard = cell.lock();
        let mut shard = guard.borrow_mut();
        if !shard.documents.contains_key(document_id) {
            return Err(not_found(Entity::Document, document_id));
        }
        let chunk_ids = shard.validate_new_chunks(&inputs)?;

        let mut created = Vec::with_capacity(inputs.len());
        for (chunk_id, input) in chunk_ids.into_iter().zip(inputs) {
            created.push(shard.insert_chunk(document_id, chunk_id, input)?);
        }
        if let Some(document) = shard.documents.get_mut(document_id) {
            document.touch();
        }
        drop(shard);

        self.metrics.record_chunk_inserts(created.len() as u64);
        self.mark_dirty();
        debug!(library_id = %library_id, document_id = %document_id, chunks = created.len(), "bulk-created chunks");
        Ok(created)
    }

    pub fn get_chunk(
        &self,
        library_id: &str,
        document_id: &str,
        chunk_id: &str,
    ) -> Result<Chunk> {
        let cell = self.shard(library_id)?;
        let guard = cell.lock();
        let shard = guard.borrow();
        if !shard.documents.contains_key(document_id) {
            return Err(not_found(Entity::Document, document_id));
        }
        shard
            .chunks
            .get(document_id)
            .and_then(|m| m.get(chunk_id))
            .cloned()
            .ok_or_else(|| not_found(Entity::Chunk, chunk_id))
    }

    pub fn list_chunks(&self, library_id: &str, document_id: &str) -> Result<Vec<Chunk>> {
        let cell = self.shard(library_id)?;
        let guard = cell.lock();
        let shard = guard.borrow();
        if !shard.documents.contains_key(document_id) {
            return Err(not_found(Entity::Document, document_id));
        }
        Ok(shard
            .chunks
            .get(document_id)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default())
    }

    pub fn update_chunk(
        &self,
        library_id: &str,
        document_id: &str,
        chunk_id: &str,
        patch: ChunkPatch,
    ) -> Result<Chunk> {
        let cell = self.shard(library_id)?;
        let guard = cell.lock();
        let mut shard = guard.borrow_mut();
        if !shard.documents.contains_key(document_id) {
            return Err(not_found(Entity::Document, document_id));
        }
        if shard.chunk_owner.get(chunk_id).map(String::as_str) != Some(document_id) {
            return Err(not_found(Entity::Chunk, chunk_id));
        }

        let ChunkPatch {
            text,
            embedding,
            metadata,
        } = patch;
        // Validate before touching anything so a rejected patch leaves the
        // chunk unchanged.
        if let Some(text) = &text {
            if text.is_empty() {
                return Err(DbError::InvalidArgument(
                    "chunk text must not be empty".into(),
                ));
            }
        }
        if let Some(embedding) = &embedding {
            validate_embedding(shard.dimension, embedding)?;
        }

        let embedding_changed = embedding.is_some();
        let updated = {
            let chunk = shard
                .chunks
                .get_mut(document_id)
                .and_then(|m| m.get_mut(chunk_id))
                .ok_or_else(|| {
                    DbError::Internal(format!("chunk {chunk_id} missing from its document map"))
                })?;
            if let Some(text) = text {
                chunk.text = text;
            }
            if let Some(embedding) = embedding {
                chunk.embedding = embedding;
            }
            if let Some(metadata) = metadata {
                for (key, value) in metadata {
                    chunk.metadata.insert(key, value);
                }
            }
            chunk.touch();
            chunk.clone()
        };
        if embedding_changed && shard.library.is_indexed {
            shard.facade.on_chunk_updated(chunk_id, &updated.embedding)?;
        }
        drop(shard);

        self.mark_dirty();
        debug!(library_id = %library_id, chunk_id = %chunk_id, "updated chunk");
        Ok(updated)
    }

    pub fn delete_chunk(
        &self,
        library_id: &str,
        document_id: &str,
        chunk_id: &str,
    ) -> Result<()> {
        let cell = self.shard(library_id)?;
        let guard = cell.lock();
        let mut shard = guard.borrow_mut();
        if shard.chunk_owner.get(chunk_id).map(String::as_str) != Some(document_id) {
            return Err(not_found(Entity::Chunk, chunk_id));
        }
        shard.chunk_owner.remove(chunk_id);
        if let Some(map) = shard.chunks.get_mut(document_id) {
            map.remove(chunk_id);
        }
        if shard.library.is_indexed {
            shard.facade.on_chunk_removed(chunk_id)?;
        }
        if let Some(document) = shard.documents.get_mut(document_id) {
            document.touch();
        }
        drop(shard);

        self.metrics.record_chunk_deletes(1);
        self.mark_dirty();
        debug!(library_id = %library_id, chunk_id = %chunk_id, "deleted chunk");
        Ok(())
    }

    /// Total number of chunks in a library, across all documents.
    pub fn chunk_count(&self, library_id: &str) -> Result<usize> {
        let cell = self.shard(library_id)?;
        let guard = cell.lock();
        let count = guard.borrow().total_chunks();
        Ok(count)
    }

    // ------------------------------------------------------------------
    // Indexing and search
    // ------------------------------------------------------------------

    /// Materialize an index over the library, or swap the algorithm of an
    /// existing one. The new backend is fully built before the old one is
    /// replaced, so a mid-build failure leaves the library answering from
    /// the previous index.
    pub fn index_library(
        &self,
        library_id: &str,
        algorithm: Option<IndexAlgorithm>,
    ) -> Result<()> {
        let cell = self.shard(library_id)?;
        let guard = cell.lock();
        let mut shard = guard.borrow_mut();
        let algorithm = algorithm.unwrap_or(self.default_algorithm);
        let pairs = shard.all_chunk_pairs();
        shard.facade.materialize(algorithm, pairs)?;
        shard.library.is_indexed = true;
        shard.library.index_algorithm = Some(algorithm);
        shard.library.touch();
        let total = shard.total_chunks();
        drop(shard);

        self.mark_dirty();
        info!(library_id = %library_id, algorithm = %algorithm, chunks = total, "indexed library");
        Ok(())
    }

    /// Top-k cosine search over an indexed library.
    ///
    /// With a metadata filter, all scored candidates are fetched, filtered
    /// by exact key-value equality, and only then truncated to k, so k
    /// matching chunks are returned whenever the index surfaces them.
    pub fn search(
        &self,
        library_id: &str,
        query: &[f32],
        k: usize,
        metadata_filter: Option<&Metadata>,
    ) -> Result<Vec<SearchHit>> {
        if k == 0 {
            return Err(DbError::InvalidArgument("k must be greater than 0".into()));
        }
        let timer = SearchTimer::new();
        let cell = self.shard(library_id)?;
        let guard = cell.lock();
        let shard = guard.borrow();
        if !shard.library.is_indexed {
            return Err(DbError::NotIndexed(library_id.to_string()));
        }

        let fetch_k = match metadata_filter {
            Some(_) => shard.total_chunks(),
            None => k,
        };
        let neighbors = shard.facade.search(query, fetch_k)?;
        let candidates = neighbors.len();

        let mut hits = Vec::with_capacity(k.min(candidates));
        for neighbor in neighbors {
            let chunk = shard.resolve_chunk(&neighbor.chunk_id).ok_or_else(|| {
                DbError::Internal(format!(
                    "index returned unknown chunk {}",
                    neighbor.chunk_id
                ))
            })?;
            if let Some(filter) = metadata_filter {
                if !metadata_matches(&chunk.metadata, filter) {
                    continue;
                }
            }
            hits.push(SearchHit {
                distance: neighbor.distance,
                chunk: chunk.clone(),
            });
            if hits.len() == k {
                break;
            }
        }
        drop(shard);

        self.metrics.record_search(candidates as u64, timer.elapsed_ns());
        Ok(hits)
    }

    // ------------------------------------------------------------------
    // Snapshot plumbing
    // ------------------------------------------------------------------

    /// Consistent copy of the full store for serialization.
    ///
    /// Holds the set lock (read) and every library lock, acquired in
    /// ascending library order, for the duration of the copy; the caller
    /// serializes after all locks are released.
    pub(crate) fn snapshot_state(&self) -> SnapshotState {
        let set = self.libraries.read();
        let guards: Vec<_> = set.values().map(|cell| cell.lock()).collect();
        let mut libraries = Vec::with_capacity(guards.len());
        for guard in &guards {
            let shard = guard.borrow();
            let documents = shard
                .documents
                .values()
                .map(|document| DocumentRecord {
                    document: document.clone(),
                    chunks: shard
                        .chunks
                        .get(&document.document_id)
                        .map(|m| m.values().cloned().collect())
                        .unwrap_or_default(),
                })
                .collect();
            libraries.push(LibraryRecord {
                library: shard.library.clone(),
                lsh_params: shard.facade.lsh_params(),
                dimension: shard.dimension,
                documents,
            });
        }
        SnapshotState {
            schema_version: SCHEMA_VERSION,
            libraries,
        }
    }

    /// Replace the store contents with a deserialized snapshot.
    ///
    /// Only entities and index configuration are trusted from disk; every
    /// library marked indexed is re-materialized so LSH projections and
    /// buckets are regenerated from the persisted seed.
    pub(crate) fn restore(&self, state: SnapshotState) -> Result<()> {
        let mut set = self.libraries.write();
        set.clear();
        for record in state.libraries {
            let library_id = record.library.library_id.clone();
            let mut shard = Shard::new(record.library, record.lsh_params);
            shard.dimension = record.dimension;
            if let Some(dim) = record.dimension {
                shard.facade.observe_dimension(dim);
            }
            for doc_record in record.documents {
                let document_id = doc_record.document.document_id.clone();
                shard
                    .documents
                    .insert(document_id.clone(), doc_record.document);
                for chunk in doc_record.chunks {
                    if shard.dimension.is_none() {
                        shard.dimension = Some(chunk.embedding.len());
                        shard.facade.observe_dimension(chunk.embedding.len());
                    }
                    shard
                        .chunk_owner
                        .insert(chunk.chunk_id.clone(), document_id.clone());
                    shard
                        .chunks
                        .entry(document_id.clone())
                        .or_default()
                        .insert(chunk.chunk_id.clone(), chunk);
                }
            }
            if shard.library.is_indexed {
                let algorithm = shard.library.index_algorithm.ok_or_else(|| {
                    DbError::Persistence(format!(
                        "library {library_id} marked indexed but carries no algorithm"
                    ))
                })?;
                let pairs = shard.all_chunk_pairs();
                shard.facade.materialize(algorithm, pairs)?;
            }
            set.insert(
                library_id,
                Arc::new(ReentrantMutex::new(RefCell::new(shard))),
            );
        }
        drop(set);
        // The reloaded state is pending persistence again so the next tick
        // rewrites a fresh canonical file.
        self.mark_dirty();
        Ok(())
    }
}

fn metadata_matches(metadata: &Metadata, filter: &Metadata) -> bool {
    filter
        .iter()
        .all(|(key, value)| metadata.get(key) == Some(value))
}
