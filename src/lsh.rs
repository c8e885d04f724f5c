use hashbrown::{HashMap, HashSet};
use ndarray::Array1;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::distance::{cosine_distance_normalized, normalized};
use crate::error::{DbError, Entity, Result};
use crate::hash::RandomProjectionHasher;
use crate::index::{rank, LshParams, Neighbor};

/// Multi-table random-projection LSH index.
///
/// Each of the `tables` hash tables maps a packed `planes`-bit signature to
/// the bucket of chunk ids whose vectors fall in that cell. All hyperplanes
/// are drawn from a single `StdRng` seeded with `params.seed`, in table
/// order, so rebuilding with the same parameters reproduces the exact same
/// projections (and therefore the same buckets).
#[derive(Debug)]
pub struct LshIndex {
    dim: usize,
    params: LshParams,
    hashers: Vec<RandomProjectionHasher>,
    tables: Vec<HashMap<u64, Vec<String>>>,
    vectors: HashMap<String, Array1<f32>>,
}

impl LshIndex {
    pub fn new(dim: usize, params: LshParams) -> Result<Self> {
        if dim == 0 {
            return Err(DbError::InvalidArgument(
                "dimension must be greater than 0".into(),
            ));
        }
        params.validate()?;

        let mut rng = StdRng::seed_from_u64(params.seed);
        let hashers: Vec<RandomProjectionHasher> = (0..params.tables)
            .map(|_| RandomProjectionHasher::new(dim, params.planes, &mut rng))
            .collect();
        let tables = (0..params.tables).map(|_| HashMap::new()).collect();

        Ok(Self {
            dim,
            params,
            hashers,
            tables,
            vectors: HashMap::new(),
        })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn params(&self) -> LshParams {
        self.params
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn contains(&self, chunk_id: &str) -> bool {
        self.vectors.contains_key(chunk_id)
    }

    fn check_dim(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dim {
            return Err(DbError::DimensionMismatch {
                expected: self.dim,
                got: vector.len(),
            });
        }
        Ok(())
    }

    fn insert_unit(&mut self, chunk_id: String, unit: Array1<f32>) {
        for (t, hasher) in self.hashers.iter().enumerate() {
            let sig = hasher.signature(&unit);
            self.tables[t].entry(sig).or_default().push(chunk_id.clone());
        }
        self.vectors.insert(chunk_id, unit);
    }

    /// Normalize, hash into every table, and store the vector.
    pub fn add(&mut self, chunk_id: String, vector: &[f32]) -> Result<()> {
        if self.vectors.contains_key(&chunk_id) {
            return Err(DbError::DuplicateId {
                entity: Entity::Chunk,
                id: chunk_id,
            });
        }
        self.check_dim(vector)?;
        let unit = normalized(vector)?;
        self.insert_unit(chunk_id, unit);
        Ok(())
    }

    /// Erase `chunk_id` from every bucket it hashes into.
    ///
    /// Signatures are recomputed from the stored unit vector, which yields
    /// the same bits as at insertion time.
    pub fn remove(&mut self, chunk_id: &str) -> Result<()> {
        let unit = self
            .vectors
            .remove(chunk_id)
            .ok_or_else(|| DbError::NotFound {
                entity: Entity::Chunk,
                id: chunk_id.to_string(),
            })?;
        for (t, hasher) in self.hashers.iter().enumerate() {
            let sig = hasher.signature(&unit);
            if let Some(bucket) = self.tables[t].get_mut(&sig) {
                bucket.retain(|id| id != chunk_id);
                if bucket.is_empty() {
                    self.tables[t].remove(&sig);
                }
            }
        }
        Ok(())
    }

    /// Replace the vector under `chunk_id`: remove + add with the new
    /// vector. All validation happens before the removal, so a failed
    /// update leaves the index untouched.
    pub fn update(&mut self, chunk_id: &str, vector: &[f32]) -> Result<()> {
        if !self.vectors.contains_key(chunk_id) {
            return Err(DbError::NotFound {
                entity: Entity::Chunk,
                id: chunk_id.to_string(),
            });
        }
        self.check_dim(vector)?;
        let unit = normalized(vector)?;
        self.remove(chunk_id)?;
        self.insert_unit(chunk_id.to_string(), unit);
        Ok(())
    }

    /// Top-k over the union of the query's buckets across all tables.
    ///
    /// Candidates are deduplicated, scored by cosine distance (the query
    /// is normalized once), and ranked with the same tie-break as the
    /// exact index. An empty union yields an empty result; falling back to
    /// a full scan is a caller decision, never taken here.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        self.check_dim(query)?;
        let q = normalized(query)?;

        let mut candidates: HashSet<&String> = HashSet::new();
        for (t, hasher) in self.hashers.iter().enumerate() {
            let sig = hasher.signature(&q);
            if let Some(bucket) = self.tables[t].get(&sig) {
                for id in bucket {
                    candidates.insert(id);
                }
            }
        }
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let scored: Vec<Neighbor> = candidates
            .into_iter()
            .filter_map(|id| {
                self.vectors.get(id).map(|v| Neighbor {
                    chunk_id: id.clone(),
                    distance: cosine_distance_normalized(&q, v),
                })
            })
            .collect();
        Ok(rank(scored, k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(tables: usize, planes: usize, seed: u64) -> LshParams {
        LshParams {
            tables,
            planes,
            seed,
        }
    }

    #[test]
    fn add_and_self_query() {
        let mut index = LshIndex::new(8, LshParams::default()).unwrap();
        index.add("a".into(), &[1.0; 8]).unwrap();
        let results = index.search(&[1.0; 8], 5).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk_id, "a");
        assert!(results[0].distance < 1e-5);
    }

    #[test]
    fn duplicate_id_rejected() {
        let mut index = LshIndex::new(4, LshParams::default()).unwrap();
        index.add("a".into(), &[1.0, 0.0, 0.0, 0.0]).unwrap();
        let err = index.add("a".into(), &[0.0, 1.0, 0.0, 0.0]).unwrap_err();
        assert!(matches!(err, DbError::DuplicateId { .. }));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn remove_erases_all_buckets() {
        let mut index = LshIndex::new(8, params(6, 4, 42)).unwrap();
        index.add("a".into(), &[1.0; 8]).unwrap();
        index.add("b".into(), &[-1.0; 8]).unwrap();

        index.remove("a").unwrap();
        assert!(!index.contains("a"));
        let results = index.search(&[1.0; 8], 10).unwrap();
        assert!(results.iter().all(|n| n.chunk_id != "a"));

        let total_bucketed: usize = index
            .tables
            .iter()
            .flat_map(|t| t.values())
            .map(|b| b.len())
            .sum();
        assert_eq!(total_bucketed, index.params.tables, "one entry per table");
    }

    #[test]
    fn update_moves_vector_between_buckets() {
        let mut index = LshIndex::new(4, params(4, 8, 42)).unwrap();
        index.add("a".into(), &[1.0, 0.0, 0.0, 0.0]).unwrap();
        index.update("a", &[-1.0, 0.0, 0.0, 0.0]).unwrap();

        let results = index.search(&[-1.0, 0.0, 0.0, 0.0], 1).unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].distance < 1e-5);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn failed_update_leaves_index_untouched() {
        let mut index = LshIndex::new(4, LshParams::default()).unwrap();
        index.add("a".into(), &[1.0, 0.0, 0.0, 0.0]).unwrap();

        let err = index.update("a", &[0.0; 4]).unwrap_err();
        assert!(matches!(err, DbError::DegenerateVector));
        assert!(index.contains("a"));
        let results = index.search(&[1.0, 0.0, 0.0, 0.0], 1).unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn empty_union_returns_empty() {
        // One table, one plane: two buckets total. A vector and its
        // negation land in different buckets, so querying the negation
        // finds nothing.
        let mut index = LshIndex::new(3, params(1, 1, 42)).unwrap();
        index.add("a".into(), &[1.0, 2.0, 3.0]).unwrap();

        let hit = index.search(&[1.0, 2.0, 3.0], 1).unwrap();
        let miss = index.search(&[-1.0, -2.0, -3.0], 1).unwrap();
        assert_eq!(hit.len(), 1);
        assert!(miss.is_empty());
    }

    #[test]
    fn same_seed_rebuild_gives_identical_results() {
        let vectors: Vec<Vec<f32>> = (0..20)
            .map(|i| (0..16).map(|j| ((i * 31 + j * 7) % 13) as f32 - 6.0).collect())
            .collect();

        let build = || {
            let mut index = LshIndex::new(16, params(4, 8, 42)).unwrap();
            for (i, v) in vectors.iter().enumerate() {
                index.add(format!("c{i:02}"), v).unwrap();
            }
            index
        };

        let a = build();
        let b = build();
        let q: Vec<f32> = (0..16).map(|j| (j as f32).sin()).collect();
        let ra = a.search(&q, 5).unwrap();
        let rb = b.search(&q, 5).unwrap();
        assert_eq!(ra.len(), rb.len());
        for (x, y) in ra.iter().zip(rb.iter()) {
            assert_eq!(x.chunk_id, y.chunk_id);
            assert!((x.distance - y.distance).abs() < 1e-9);
        }
    }

    #[test]
    fn invalid_params_rejected() {
        assert!(matches!(
            LshIndex::new(0, LshParams::default()).unwrap_err(),
            DbError::InvalidArgument(_)
        ));
        assert!(matches!(
            LshIndex::new(4, params(0, 8, 42)).unwrap_err(),
            DbError::InvalidArgument(_)
        ));
        assert!(matches!(
            LshIndex::new(4, params(4, 0, 42)).unwrap_err(),
            DbError::InvalidArgument(_)
        ));
        assert!(matches!(
            LshIndex::new(4, params(4, 65, 42)).unwrap_err(),
            DbError::InvalidArgument(_)
        ));
    }

    #[test]
    fn dimension_mismatch_on_query() {
        let mut index = LshIndex::new(8, LshParams::default()).unwrap();
        index.add("a".into(), &[1.0; 8]).unwrap();
        let err = index.search(&[1.0; 4], 1).unwrap_err();
        assert!(matches!(
            err,
            DbError::DimensionMismatch { expected: 8, got: 4 }
        ));
    }
}
