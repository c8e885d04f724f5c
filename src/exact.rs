use hashbrown::HashMap;
use ndarray::Array1;

use crate::distance::{cosine_distance_normalized, normalized};
use crate::error::{DbError, Entity, Result};
use crate::index::{rank, Neighbor};

/// Brute-force nearest-neighbor index.
///
/// Stores an ordered sequence of `(chunk_id, unit vector)` pairs plus an
/// id-to-position lookup, so removal is an O(1) swap-remove and search is a
/// single scan over every stored vector.
#[derive(Debug, Default)]
pub struct ExactIndex {
    entries: Vec<(String, Array1<f32>)>,
    positions: HashMap<String, usize>,
}

impl ExactIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored vectors.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, chunk_id: &str) -> bool {
        self.positions.contains_key(chunk_id)
    }

    fn check_dim(&self, vector: &[f32]) -> Result<()> {
        if let Some((_, first)) = self.entries.first() {
            if vector.len() != first.len() {
                return Err(DbError::DimensionMismatch {
                    expected: first.len(),
                    got: vector.len(),
                });
            }
        }
        Ok(())
    }

    /// Normalize and append a vector under `chunk_id`.
    pub fn add(&mut self, chunk_id: String, vector: &[f32]) -> Result<()> {
        if self.positions.contains_key(&chunk_id) {
            return Err(DbError::DuplicateId {
                entity: Entity::Chunk,
                id: chunk_id,
            });
        }
        self.check_dim(vector)?;
        let unit = normalized(vector)?;
        self.positions.insert(chunk_id.clone(), self.entries.len());
        self.entries.push((chunk_id, unit));
        Ok(())
    }

    /// Swap-remove the vector under `chunk_id`, moving the last entry into
    /// the vacated slot.
    pub fn remove(&mut self, chunk_id: &str) -> Result<()> {
        let pos = self
            .positions
            .remove(chunk_id)
            .ok_or_else(|| DbError::NotFound {
                entity: Entity::Chunk,
                id: chunk_id.to_string(),
            })?;
        self.entries.swap_remove(pos);
        if pos < self.entries.len() {
            let moved = self.entries[pos].0.clone();
            self.positions.insert(moved, pos);
        }
        Ok(())
    }

    /// Replace the stored vector under `chunk_id` in place.
    pub fn update(&mut self, chunk_id: &str, vector: &[f32]) -> Result<()> {
        let pos = *self
            .positions
            .get(chunk_id)
            .ok_or_else(|| DbError::NotFound {
                entity: Entity::Chunk,
                id: chunk_id.to_string(),
            })?;
        self.check_dim(vector)?;
        self.entries[pos].1 = normalized(vector)?;
        Ok(())
    }

    /// Top-k by cosine distance over every stored vector.
    ///
    /// Ties are broken by ascending `chunk_id`; fewer than k stored means
    /// everything is returned.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        self.check_dim(query)?;
        let q = normalized(query)?;
        let scored: Vec<Neighbor> = self
            .entries
            .iter()
            .map(|(id, v)| Neighbor {
                chunk_id: id.clone(),
                distance: cosine_distance_normalized(&q, v),
            })
            .collect();
        Ok(rank(scored, k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(results: &[Neighbor]) -> Vec<&str> {
        results.iter().map(|n| n.chunk_id.as_str()).collect()
    }

    #[test]
    fn search_ranks_by_cosine_distance() {
        let mut index = ExactIndex::new();
        index.add("a".into(), &[1.0, 0.0, 0.0]).unwrap();
        index.add("b".into(), &[0.0, 1.0, 0.0]).unwrap();
        index.add("c".into(), &[0.0, 0.0, 1.0]).unwrap();

        let results = index.search(&[0.9, 0.1, 0.0], 2).unwrap();
        assert_eq!(ids(&results), ["a", "b"]);
        assert!(results[0].distance < results[1].distance);
    }

    #[test]
    fn duplicate_id_rejected() {
        let mut index = ExactIndex::new();
        index.add("a".into(), &[1.0, 0.0]).unwrap();
        let err = index.add("a".into(), &[0.0, 1.0]).unwrap_err();
        assert!(matches!(err, DbError::DuplicateId { .. }));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn swap_remove_keeps_lookup_consistent() {
        let mut index = ExactIndex::new();
        index.add("a".into(), &[1.0, 0.0]).unwrap();
        index.add("b".into(), &[0.0, 1.0]).unwrap();
        index.add("c".into(), &[1.0, 1.0]).unwrap();

        // Removing the first entry moves "c" into its slot.
        index.remove("a").unwrap();
        assert_eq!(index.len(), 2);
        assert!(!index.contains("a"));
        assert!(index.contains("b") && index.contains("c"));

        let results = index.search(&[1.0, 1.0], 2).unwrap();
        assert_eq!(ids(&results), ["c", "b"]);
    }

    #[test]
    fn remove_unknown_id() {
        let mut index = ExactIndex::new();
        let err = index.remove("missing").unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[test]
    fn update_changes_ranking() {
        let mut index = ExactIndex::new();
        index.add("a".into(), &[1.0, 0.0]).unwrap();
        index.add("b".into(), &[0.0, 1.0]).unwrap();

        index.update("a", &[0.0, 1.0]).unwrap();
        let results = index.search(&[0.0, 1.0], 1).unwrap();
        // Both now tie at distance ~0; "a" wins the lexicographic tie-break.
        assert_eq!(ids(&results), ["a"]);
    }

    #[test]
    fn tie_break_is_lexicographic() {
        let mut index = ExactIndex::new();
        index.add("z".into(), &[1.0, 0.0]).unwrap();
        index.add("a".into(), &[2.0, 0.0]).unwrap();
        index.add("m".into(), &[0.5, 0.0]).unwrap();

        // All three normalize to the same unit vector.
        let results = index.search(&[1.0, 0.0], 3).unwrap();
        assert_eq!(ids(&results), ["a", "m", "z"]);
    }

    #[test]
    fn k_larger_than_len_returns_all() {
        let mut index = ExactIndex::new();
        index.add("a".into(), &[1.0, 0.0]).unwrap();
        let results = index.search(&[1.0, 0.0], 100).unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn dimension_mismatch_on_add_and_search() {
        let mut index = ExactIndex::new();
        index.add("a".into(), &[1.0, 0.0, 0.0]).unwrap();
        let err = index.add("b".into(), &[1.0, 0.0]).unwrap_err();
        assert!(matches!(
            err,
            DbError::DimensionMismatch { expected: 3, got: 2 }
        ));
        let err = index.search(&[1.0, 0.0], 1).unwrap_err();
        assert!(matches!(err, DbError::DimensionMismatch { .. }));
    }
}
