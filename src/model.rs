use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::index::IndexAlgorithm;

/// Arbitrary JSON-representable key-value metadata attached to an entity.
pub type Metadata = Map<String, Value>;

/// Mint an opaque id for entities created without a caller-supplied one.
pub(crate) fn mint_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Top-level namespace owning documents, chunks, and at most one index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Library {
    pub library_id: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// True iff an index is materialized and kept in sync for this library.
    pub is_indexed: bool,
    /// Meaningful only while `is_indexed` is true.
    pub index_algorithm: Option<IndexAlgorithm>,
}

impl Library {
    pub(crate) fn new(library_id: String, metadata: Metadata) -> Self {
        let now = Utc::now();
        Self {
            library_id,
            metadata,
            created_at: now,
            updated_at: now,
            is_indexed: false,
            index_algorithm: None,
        }
    }

    pub(crate) fn touch(&mut self) {
        // Monotone even if the wall clock steps backwards.
        self.updated_at = Utc::now().max(self.updated_at);
    }
}

/// Named collection of chunks within one library.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub document_id: String,
    pub library_id: String,
    pub title: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    pub(crate) fn new(
        document_id: String,
        library_id: String,
        title: String,
        metadata: Metadata,
    ) -> Self {
        let now = Utc::now();
        Self {
            document_id,
            library_id,
            title,
            metadata,
            created_at: now,
            updated_at: now,
        }
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now().max(self.updated_at);
    }
}

/// Smallest unit of retrieval: one text fragment plus its embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub document_id: String,
    pub library_id: String,
    pub text: String,
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Chunk {
    pub(crate) fn new(
        chunk_id: String,
        document_id: String,
        library_id: String,
        text: String,
        embedding: Vec<f32>,
        metadata: Metadata,
    ) -> Self {
        let now = Utc::now();
        Self {
            chunk_id,
            document_id,
            library_id,
            text,
            embedding,
            metadata,
            created_at: now,
            updated_at: now,
        }
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now().max(self.updated_at);
    }
}

/// Input for chunk creation. A missing `chunk_id` gets a minted one.
#[derive(Debug, Clone, Default)]
pub struct NewChunk {
    pub chunk_id: Option<String>,
    pub text: String,
    pub embedding: Vec<f32>,
    pub metadata: Metadata,
}

/// Input for document creation, with optional inline chunks created
/// all-or-nothing alongside the document.
#[derive(Debug, Clone, Default)]
pub struct NewDocument {
    pub document_id: Option<String>,
    pub title: String,
    pub metadata: Metadata,
    pub chunks: Vec<NewChunk>,
}

/// Partial update for a document. `metadata` merges key-wise; `title`
/// replaces.
#[derive(Debug, Clone, Default)]
pub struct DocumentPatch {
    pub title: Option<String>,
    pub metadata: Option<Metadata>,
}

/// Partial update for a chunk. `metadata` merges key-wise; `text` and
/// `embedding` replace.
#[derive(Debug, Clone, Default)]
pub struct ChunkPatch {
    pub text: Option<String>,
    pub embedding: Option<Vec<f32>>,
    pub metadata: Option<Metadata>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minted_ids_are_unique() {
        let a = mint_id();
        let b = mint_id();
        assert_ne!(a, b);
        assert!(!a.is_empty());
    }

    #[test]
    fn touch_is_monotone() {
        let mut library = Library::new("lib".into(), Metadata::new());
        let before = library.updated_at;
        library.touch();
        assert!(library.updated_at >= before);
    }

    #[test]
    fn library_starts_unindexed() {
        let library = Library::new("lib".into(), Metadata::new());
        assert!(!library.is_indexed);
        assert!(library.index_algorithm.is_none());
        assert_eq!(library.created_at, library.updated_at);
    }
}
