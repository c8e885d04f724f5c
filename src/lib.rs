//! # chunkdb
//!
//! A small in-process vector database. Text chunks and their embeddings
//! are organized into libraries of documents, and each library can answer
//! approximate-nearest-neighbor queries by cosine similarity through one
//! of two interchangeable backends: an exact brute-force index or a
//! random-hyperplane LSH index. A background worker periodically persists
//! the whole store to an atomically replaced snapshot file.
//!
//! ## Quick start
//!
//! ```rust
//! use chunkdb::{DbConfig, IndexAlgorithm, NewChunk, NewDocument, Store};
//!
//! let store = Store::new(&DbConfig::default());
//! store.create_library("articles", Default::default()).unwrap();
//!
//! let doc = store
//!     .create_document(
//!         "articles",
//!         NewDocument {
//!             title: "intro".into(),
//!             chunks: vec![NewChunk {
//!                 text: "hello world".into(),
//!                 embedding: vec![0.1, 0.9, 0.0],
//!                 ..Default::default()
//!             }],
//!             ..Default::default()
//!         },
//!     )
//!     .unwrap();
//!
//! store.index_library("articles", Some(IndexAlgorithm::Exact)).unwrap();
//!
//! let hits = store.search("articles", &[0.1, 0.9, 0.0], 1, None).unwrap();
//! assert_eq!(hits[0].chunk.document_id, doc.document_id);
//! ```
//!
//! For a persistent database with the background snapshotter running, use
//! [`Database::open`] instead of constructing a bare [`Store`].

pub mod bootstrap;
pub mod config;
pub mod distance;
pub mod error;
pub mod exact;
pub mod hash;
pub mod index;
pub mod lsh;
pub mod metrics;
pub mod model;
pub mod store;

mod snapshot;

// Re-exports for convenience.
pub use bootstrap::{Database, DEFAULT_LIBRARY_ID};
pub use config::DbConfig;
pub use error::{DbError, Entity, Result};
pub use exact::ExactIndex;
pub use index::{IndexAlgorithm, IndexFacade, LshParams, Neighbor};
pub use lsh::LshIndex;
pub use metrics::MetricsSnapshot;
pub use model::{
    Chunk, ChunkPatch, Document, DocumentPatch, Library, Metadata, NewChunk, NewDocument,
};
pub use store::{SearchHit, Store};
