//! Distance helpers for dense feature rows.
//!
//! PDCI ranks its final candidates by exact Euclidean distance, and the
//! benchmark module uses the same function for brute-force ground truth, so
//! both sides of a recall comparison agree on the metric. The exact `nn`
//! backend ranks with the same function; `hnsw` and `lsh_forest` use cosine
//! distance.

use crate::vectorize::RowMatrix;

const NORM_EPSILON: f32 = 1e-9;

/// Dot product of two vectors.
#[inline]
#[must_use]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// L2 norm of a vector.
#[inline]
#[must_use]
pub fn norm(v: &[f32]) -> f32 {
    dot(v, v).sqrt()
}

/// L2 distance squared (cheaper when only comparing distances).
#[inline]
#[must_use]
pub fn l2_distance_squared(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}

/// L2 (Euclidean) distance.
///
/// If dimensions mismatch, this returns `f32::INFINITY` (so it is never selected as a
/// nearest neighbor).
#[inline]
#[must_use]
pub fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return f32::INFINITY;
    }
    l2_distance_squared(a, b).sqrt()
}

/// Normalize a vector to unit L2 norm in place.
///
/// Near-zero vectors are left untouched.
pub fn normalize_in_place(v: &mut [f32]) {
    let n = norm(v);
    if n > NORM_EPSILON {
        v.iter_mut().for_each(|x| *x /= n);
    }
}

/// Cosine distance `1 - cos(a, b)`, in `[0, 2]`.
///
/// A zero vector has no direction and sits at distance 1 from everything.
#[inline]
#[must_use]
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return f32::INFINITY;
    }
    let denom = norm(a) * norm(b);
    if denom <= NORM_EPSILON {
        return 1.0;
    }
    (1.0 - dot(a, b) / denom).clamp(0.0, 2.0)
}

/// Exact `k` nearest rows of `database` to `query` as `(distance, offset)`,
/// ascending by Euclidean distance, ties by offset.
pub fn k_nearest(query: &[f32], database: &RowMatrix, k: usize) -> Vec<(f32, usize)> {
    let mut distances: Vec<(f32, usize)> = database
        .rows()
        .enumerate()
        .map(|(i, row)| (l2_distance(query, row), i))
        .collect();
    distances.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    distances.truncate(k);
    distances
}

/// Map a Euclidean distance onto a bounded similarity in `(0, 1]`.
///
/// Monotonically decreasing, so sorting by similarity descending is the same
/// as sorting by distance ascending.
#[inline]
#[must_use]
pub fn distance_to_similarity(distance: f32) -> f32 {
    1.0 / (1.0 + distance.max(0.0))
}
