use std::cmp::Ordering;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DbError, Result};
use crate::exact::ExactIndex;
use crate::lsh::LshIndex;

/// Which nearest-neighbor backend a library uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexAlgorithm {
    /// Brute-force scan over every stored vector.
    Exact,
    /// Random-hyperplane locality-sensitive hashing.
    Lsh,
}

impl std::fmt::Display for IndexAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexAlgorithm::Exact => write!(f, "exact"),
            IndexAlgorithm::Lsh => write!(f, "lsh"),
        }
    }
}

impl FromStr for IndexAlgorithm {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "exact" => Ok(IndexAlgorithm::Exact),
            "lsh" => Ok(IndexAlgorithm::Lsh),
            other => Err(DbError::InvalidArgument(format!(
                "unknown index algorithm: {other}"
            ))),
        }
    }
}

/// LSH construction parameters. Fixed per index; persisted so buckets can
/// be regenerated deterministically after a restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LshParams {
    /// Number of independent hash tables.
    pub tables: usize,
    /// Number of hyperplanes (signature bits) per table, 1..=64.
    pub planes: usize,
    /// RNG seed for the hyperplane draw.
    pub seed: u64,
}

impl Default for LshParams {
    fn default() -> Self {
        Self {
            tables: 4,
            planes: 8,
            seed: 42,
        }
    }
}

impl LshParams {
    pub fn validate(&self) -> Result<()> {
        if self.tables == 0 {
            return Err(DbError::InvalidArgument("lsh tables must be > 0".into()));
        }
        if self.planes == 0 || self.planes > 64 {
            return Err(DbError::InvalidArgument(format!(
                "lsh planes must be between 1 and 64, got {}",
                self.planes
            )));
        }
        Ok(())
    }
}

/// A single nearest-neighbor result.
#[derive(Debug, Clone)]
pub struct Neighbor {
    pub chunk_id: String,
    /// Cosine distance from the query (lower is closer).
    pub distance: f32,
}

/// Sort scored candidates by ascending distance, breaking ties by
/// ascending chunk id, and truncate to k. Both indices rank through this
/// so results are deterministic for any stored set.
pub(crate) fn rank(mut scored: Vec<Neighbor>, k: usize) -> Vec<Neighbor> {
    scored.sort_unstable_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
    scored.truncate(k);
    scored
}

#[derive(Debug)]
enum Backend {
    None,
    Exact(ExactIndex),
    Lsh(LshIndex),
}

/// Per-library indirection over the two index backends.
///
/// Holds the currently materialized backend (or none), the embedding
/// dimension once observed, and the LSH parameters to use whenever an LSH
/// backend is built.
#[derive(Debug)]
pub struct IndexFacade {
    backend: Backend,
    dimension: Option<usize>,
    lsh_params: LshParams,
}

impl IndexFacade {
    pub fn new(lsh_params: LshParams) -> Self {
        Self {
            backend: Backend::None,
            dimension: None,
            lsh_params,
        }
    }

    pub fn is_indexed(&self) -> bool {
        !matches!(self.backend, Backend::None)
    }

    pub fn algorithm(&self) -> Option<IndexAlgorithm> {
        match self.backend {
            Backend::None => None,
            Backend::Exact(_) => Some(IndexAlgorithm::Exact),
            Backend::Lsh(_) => Some(IndexAlgorithm::Lsh),
        }
    }

    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    pub fn lsh_params(&self) -> LshParams {
        self.lsh_params
    }

    /// Number of chunks in the active backend (0 when not materialized).
    pub fn len(&self) -> usize {
        match &self.backend {
            Backend::None => 0,
            Backend::Exact(idx) => idx.len(),
            Backend::Lsh(idx) => idx.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn observe_dimension(&mut self, dim: usize) {
        if self.dimension.is_none() {
            self.dimension = Some(dim);
        }
    }

    /// Build the chosen backend from the full chunk set and install it.
    ///
    /// Chunks are inserted in ascending chunk-id order so rebuilds are
    /// deterministic. The new backend is constructed completely before the
    /// old one is replaced; any failure leaves the previous backend (and
    /// the recorded dimension) intact. Serves first indexing, algorithm
    /// swap, and rebuild after snapshot load alike.
    pub fn materialize(
        &mut self,
        algorithm: IndexAlgorithm,
        mut chunks: Vec<(String, Vec<f32>)>,
    ) -> Result<()> {
        chunks.sort_by(|a, b| a.0.cmp(&b.0));

        let dim = match self.dimension.or_else(|| chunks.first().map(|(_, v)| v.len())) {
            Some(dim) => dim,
            None => {
                // Empty library with no fixed dimension yet: an exact
                // backend can start empty, an LSH backend cannot draw its
                // hyperplanes.
                return match algorithm {
                    IndexAlgorithm::Exact => {
                        self.backend = Backend::Exact(ExactIndex::new());
                        Ok(())
                    }
                    IndexAlgorithm::Lsh => Err(DbError::InvalidArgument(
                        "cannot build an lsh index before the library embedding dimension is known"
                            .into(),
                    )),
                };
            }
        };

        for (_, vector) in &chunks {
            if vector.len() != dim {
                return Err(DbError::DimensionMismatch {
                    expected: dim,
                    got: vector.len(),
                });
            }
        }

        let backend = match algorithm {
            IndexAlgorithm::Exact => {
                let mut idx = ExactIndex::new();
                for (id, vector) in &chunks {
                    idx.add(id.clone(), vector)?;
                }
                Backend::Exact(idx)
            }
            IndexAlgorithm::Lsh => {
                let mut idx = LshIndex::new(dim, self.lsh_params)?;
                for (id, vector) in &chunks {
                    idx.add(id.clone(), vector)?;
                }
                Backend::Lsh(idx)
            }
        };

        self.backend = backend;
        self.dimension = Some(dim);
        Ok(())
    }

    /// Forward a chunk insertion to the active backend; no-op when the
    /// library is not indexed.
    pub fn on_chunk_added(&mut self, chunk_id: &str, embedding: &[f32]) -> Result<()> {
        self.observe_dimension(embedding.len());
        match &mut self.backend {
            Backend::None => Ok(()),
            Backend::Exact(idx) => idx.add(chunk_id.to_string(), embedding),
            Backend::Lsh(idx) => idx.add(chunk_id.to_string(), embedding),
        }
    }

    pub fn on_chunk_removed(&mut self, chunk_id: &str) -> Result<()> {
        match &mut self.backend {
            Backend::None => Ok(()),
            Backend::Exact(idx) => idx.remove(chunk_id),
            Backend::Lsh(idx) => idx.remove(chunk_id),
        }
    }

    pub fn on_chunk_updated(&mut self, chunk_id: &str, embedding: &[f32]) -> Result<()> {
        match &mut self.backend {
            Backend::None => Ok(()),
            Backend::Exact(idx) => idx.update(chunk_id, embedding),
            Backend::Lsh(idx) => idx.update(chunk_id, embedding),
        }
    }

    /// Delegate a top-k query to the active backend.
    ///
    /// The store rejects searches on un-indexed libraries with
    /// `NotIndexed` before reaching here; hitting an unmaterialized
    /// backend is therefore an internal inconsistency.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        if let Some(dim) = self.dimension {
            if query.len() != dim {
                return Err(DbError::DimensionMismatch {
                    expected: dim,
                    got: query.len(),
                });
            }
        }
        match &self.backend {
            Backend::None => Err(DbError::Internal(
                "search delegated to an unmaterialized index".into(),
            )),
            Backend::Exact(idx) => idx.search(query, k),
            Backend::Lsh(idx) => idx.search(query, k),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_chunks() -> Vec<(String, Vec<f32>)> {
        vec![
            ("a".into(), vec![1.0, 0.0, 0.0]),
            ("b".into(), vec![0.0, 1.0, 0.0]),
            ("c".into(), vec![0.0, 0.0, 1.0]),
        ]
    }

    #[test]
    fn algorithm_from_str() {
        assert_eq!("exact".parse::<IndexAlgorithm>().unwrap(), IndexAlgorithm::Exact);
        assert_eq!("lsh".parse::<IndexAlgorithm>().unwrap(), IndexAlgorithm::Lsh);
        assert!(matches!(
            "hnsw".parse::<IndexAlgorithm>().unwrap_err(),
            DbError::InvalidArgument(_)
        ));
    }

    #[test]
    fn rank_breaks_ties_by_id() {
        let scored = vec![
            Neighbor { chunk_id: "b".into(), distance: 0.5 },
            Neighbor { chunk_id: "a".into(), distance: 0.5 },
            Neighbor { chunk_id: "c".into(), distance: 0.1 },
        ];
        let ranked = rank(scored, 3);
        let ids: Vec<&str> = ranked.iter().map(|n| n.chunk_id.as_str()).collect();
        assert_eq!(ids, ["c", "a", "b"]);
    }

    #[test]
    fn unmaterialized_facade_forwards_nothing() {
        let mut facade = IndexFacade::new(LshParams::default());
        assert!(!facade.is_indexed());
        facade.on_chunk_added("a", &[1.0, 0.0]).unwrap();
        facade.on_chunk_removed("a").unwrap();
        assert_eq!(facade.len(), 0);
        assert!(matches!(
            facade.search(&[1.0, 0.0], 1).unwrap_err(),
            DbError::Internal(_)
        ));
    }

    #[test]
    fn materialize_then_search() {
        let mut facade = IndexFacade::new(LshParams::default());
        facade.materialize(IndexAlgorithm::Exact, three_chunks()).unwrap();
        assert_eq!(facade.algorithm(), Some(IndexAlgorithm::Exact));
        assert_eq!(facade.dimension(), Some(3));
        assert_eq!(facade.len(), 3);

        let results = facade.search(&[0.9, 0.1, 0.0], 2).unwrap();
        assert_eq!(results[0].chunk_id, "a");
        assert_eq!(results[1].chunk_id, "b");
    }

    #[test]
    fn swap_preserves_chunk_set() {
        let mut facade = IndexFacade::new(LshParams { tables: 8, planes: 4, seed: 42 });
        facade.materialize(IndexAlgorithm::Exact, three_chunks()).unwrap();
        facade.materialize(IndexAlgorithm::Lsh, three_chunks()).unwrap();
        assert_eq!(facade.algorithm(), Some(IndexAlgorithm::Lsh));
        assert_eq!(facade.len(), 3);
    }

    #[test]
    fn failed_swap_keeps_old_backend() {
        let mut facade = IndexFacade::new(LshParams::default());
        facade.materialize(IndexAlgorithm::Exact, three_chunks()).unwrap();

        let mut bad = three_chunks();
        bad.push(("d".into(), vec![1.0, 0.0]));
        let err = facade.materialize(IndexAlgorithm::Lsh, bad).unwrap_err();
        assert!(matches!(err, DbError::DimensionMismatch { expected: 3, got: 2 }));

        // Still the old exact backend, still answering.
        assert_eq!(facade.algorithm(), Some(IndexAlgorithm::Exact));
        let results = facade.search(&[1.0, 0.0, 0.0], 1).unwrap();
        assert_eq!(results[0].chunk_id, "a");
    }

    #[test]
    fn query_dimension_checked() {
        let mut facade = IndexFacade::new(LshParams::default());
        facade.materialize(IndexAlgorithm::Exact, three_chunks()).unwrap();
        assert!(matches!(
            facade.search(&[1.0, 0.0], 1).unwrap_err(),
            DbError::DimensionMismatch { expected: 3, got: 2 }
        ));
    }

    #[test]
    fn empty_exact_materialize_allowed_lsh_rejected() {
        let mut facade = IndexFacade::new(LshParams::default());
        assert!(matches!(
            facade.materialize(IndexAlgorithm::Lsh, Vec::new()).unwrap_err(),
            DbError::InvalidArgument(_)
        ));
        facade.materialize(IndexAlgorithm::Exact, Vec::new()).unwrap();
        assert!(facade.is_indexed());
        assert_eq!(facade.len(), 0);
    }
}
