//! HNSW beam search within one layer.

use crate::distance::dot;
use smallvec::SmallVec;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

/// Neighbor lists of one layer, indexed by node.
pub(crate) type Layer = Vec<SmallVec<[u32; 16]>>;

/// Cosine distance between unit vectors.
#[inline]
pub(crate) fn unit_distance(a: &[f32], b: &[f32]) -> f32 {
    (1.0 - dot(a, b)).max(0.0)
}

/// Get vector from SoA storage.
#[inline]
pub(crate) fn get_vector(vectors: &[f32], dimension: usize, idx: usize) -> &[f32] {
    let start = idx * dimension;
    &vectors[start..start + dimension]
}

/// Frontier entry: nearest first when popped from a max-heap.
#[derive(Debug, Clone, Copy, PartialEq)]
struct MinCandidate {
    id: u32,
    distance: f32,
}

impl Eq for MinCandidate {}

impl Ord for MinCandidate {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .distance
            .total_cmp(&self.distance)
            .then(other.id.cmp(&self.id))
    }
}

impl PartialOrd for MinCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Result entry: worst first, so the heap top is the one to evict.
#[derive(Debug, Clone, Copy, PartialEq)]
struct MaxResult {
    id: u32,
    distance: f32,
}

impl Eq for MaxResult {}

impl Ord for MaxResult {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then(self.id.cmp(&other.id))
    }
}

impl PartialOrd for MaxResult {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Standard HNSW beam search (Malkov & Yashunin):
/// - a min-heap frontier explores the closest node first
/// - a max-heap keeps the `ef` best seen so far
/// - stop once the closest unexplored node is worse than the worst kept
///
/// Returns `(node, distance)` ascending by distance, ties by node.
pub(crate) fn search_layer(
    query: &[f32],
    entry_point: u32,
    layer: &Layer,
    vectors: &[f32],
    dimension: usize,
    ef: usize,
) -> Vec<(u32, f32)> {
    let ef = ef.max(1);
    let mut candidates: BinaryHeap<MinCandidate> = BinaryHeap::with_capacity(ef * 2);
    let mut results: BinaryHeap<MaxResult> = BinaryHeap::with_capacity(ef + 1);
    let mut visited: HashSet<u32> = HashSet::with_capacity(ef * 2);

    let entry_distance = unit_distance(query, get_vector(vectors, dimension, entry_point as usize));
    candidates.push(MinCandidate {
        id: entry_point,
        distance: entry_distance,
    });
    results.push(MaxResult {
        id: entry_point,
        distance: entry_distance,
    });
    visited.insert(entry_point);

    while let Some(candidate) = candidates.pop() {
        let worst = results.peek().map_or(f32::INFINITY, |r| r.distance);
        if candidate.distance > worst && results.len() >= ef {
            break;
        }

        let Some(neighbors) = layer.get(candidate.id as usize) else {
            continue;
        };
        for &neighbor in neighbors {
            if !visited.insert(neighbor) {
                continue;
            }
            let distance = unit_distance(query, get_vector(vectors, dimension, neighbor as usize));
            let worst = results.peek().map_or(f32::INFINITY, |r| r.distance);
            if results.len() < ef || distance < worst {
                candidates.push(MinCandidate {
                    id: neighbor,
                    distance,
                });
                results.push(MaxResult {
                    id: neighbor,
                    distance,
                });
                if results.len() > ef {
                    results.pop();
                }
            }
        }
    }

    results
        .into_sorted_vec()
        .into_iter()
        .map(|r| (r.id, r.distance))
        .collect()
}
