use ndarray::Array1;

use crate::error::{DbError, Result};

/// Return a unit-length (L2) copy of `v`.
///
/// Fails with [`DbError::DegenerateVector`] if the norm is zero (or not
/// finite), since such a vector has no direction to compare against.
pub fn normalized(v: &[f32]) -> Result<Array1<f32>> {
    let arr = Array1::from_vec(v.to_vec());
    let norm = arr.dot(&arr).sqrt();
    if !norm.is_finite() || norm <= f32::EPSILON {
        return Err(DbError::DegenerateVector);
    }
    Ok(arr / norm)
}

/// Cosine distance between two unit vectors: `1 - dot(a, b)`.
///
/// Range [0, 2]; smaller means more similar. Both inputs must already be
/// L2-normalized, so the whole score is a single fused dot product.
pub fn cosine_distance_normalized(a: &Array1<f32>, b: &Array1<f32>) -> f32 {
    1.0 - a.dot(b)
}

/// Cosine distance between two arbitrary (possibly un-normalized) vectors.
pub fn cosine_distance(a: &Array1<f32>, b: &Array1<f32>) -> f32 {
    let denom = a.dot(a).sqrt() * b.dot(b).sqrt();
    if denom < f32::EPSILON {
        return 1.0;
    }
    1.0 - a.dot(b) / denom
}
