//! Ball tree over the rows of a [`RowMatrix`].
//!
//! Space-partitioning tree using hyperspheres (balls) instead of hyperplanes.
//! Each node owns a contiguous range of a permutation of row offsets and
//! records the centroid and radius of those rows. A search skips any ball
//! whose nearest possible point is already farther than the current k-th
//! best, so results are exact.
//!
//! Splits seed with two far-apart rows: the row farthest from the centroid,
//! then the row farthest from that one. Every row goes to the nearer seed.
//!
//! # References
//!
//! - Omohundro (1989): "Five balltree construction algorithms"

use crate::distance::l2_distance;
use crate::error::{IndexError, Result};
use crate::vectorize::RowMatrix;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Nodes deeper than this stay leaves whatever their size.
const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct BallNode {
    center: Vec<f32>,
    radius: f32,
    start: usize,
    end: usize,
    children: Option<(usize, usize)>,
}

/// Exact Euclidean k-NN tree. Holds offsets only; searches take the rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BallTree {
    leaf_size: usize,
    order: Vec<u32>,
    nodes: Vec<BallNode>,
}

/// Search hit ordered by distance, then offset.
#[derive(Debug, Clone, Copy)]
struct Hit {
    dist: f32,
    offset: usize,
}

impl PartialEq for Hit {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Hit {}

impl PartialOrd for Hit {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Hit {
    fn cmp(&self, other: &Self) -> Ordering {
        self.dist
            .total_cmp(&other.dist)
            .then(self.offset.cmp(&other.offset))
    }
}

impl BallTree {
    /// Build over every row of `rows`.
    pub fn build(rows: &RowMatrix, leaf_size: usize) -> Result<Self> {
        if rows.is_empty() {
            return Err(IndexError::InvalidParameter(
                "cannot build a ball tree over no rows".into(),
            ));
        }
        let n = u32::try_from(rows.num_rows()).map_err(|_| {
            IndexError::InvalidParameter(format!("{} rows exceed u32 offsets", rows.num_rows()))
        })?;
        let mut tree = Self {
            leaf_size: leaf_size.max(1),
            order: (0..n).collect(),
            nodes: Vec::new(),
        };
        tree.build_node(rows, 0, n as usize, 0);
        Ok(tree)
    }

    /// Number of rows the tree covers.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[BallNode], id: usize) -> usize {
            match nodes[id].children {
                Some((l, r)) => 1 + walk(nodes, l).max(walk(nodes, r)),
                None => 1,
            }
        }
        if self.nodes.is_empty() {
            0
        } else {
            walk(&self.nodes, 0)
        }
    }

    fn build_node(&mut self, rows: &RowMatrix, start: usize, end: usize, depth: usize) -> usize {
        let members = &self.order[start..end];
        let center = centroid(rows, members);
        let radius = members
            .iter()
            .map(|&i| l2_distance(rows.row(i as usize), &center))
            .fold(0.0f32, f32::max);

        let id = self.nodes.len();
        self.nodes.push(BallNode {
            center,
            radius,
            start,
            end,
            children: None,
        });
        if end - start <= self.leaf_size || radius == 0.0 || depth >= MAX_DEPTH {
            return id;
        }

        let members = &self.order[start..end];
        let a = farthest(rows, members, &self.nodes[id].center);
        let b = farthest(rows, members, rows.row(a));
        let (seed_a, seed_b) = (rows.row(a), rows.row(b));
        let (near_a, near_b): (Vec<u32>, Vec<u32>) = members.iter().partition(|&&i| {
            let row = rows.row(i as usize);
            l2_distance(row, seed_a) < l2_distance(row, seed_b)
        });
        if near_a.is_empty() || near_b.is_empty() {
            return id;
        }
        let mid = start + near_a.len();
        self.order[start..mid].copy_from_slice(&near_a);
        self.order[mid..end].copy_from_slice(&near_b);

        let left = self.build_node(rows, start, mid, depth + 1);
        let right = self.build_node(rows, mid, end, depth + 1);
        self.nodes[id].children = Some((left, right));
        id
    }

    /// Exact `k` nearest rows to `query` as `(distance, offset)`, ascending
    /// by distance, ties by offset.
    ///
    /// `rows` must be the matrix the tree was built over.
    pub fn search(&self, rows: &RowMatrix, query: &[f32], k: usize) -> Result<Vec<(f32, usize)>> {
        if query.len() != rows.dimension() {
            return Err(IndexError::DimensionMismatch {
                expected: rows.dimension(),
                actual: query.len(),
            });
        }
        if rows.num_rows() != self.len() {
            return Err(IndexError::Serialization(format!(
                "ball tree covers {} rows, matrix has {}",
                self.len(),
                rows.num_rows()
            )));
        }
        if k == 0 || self.nodes.is_empty() {
            return Ok(Vec::new());
        }
        let mut best = BinaryHeap::with_capacity(k + 1);
        self.search_node(0, rows, query, k, &mut best);
        let mut hits: Vec<(f32, usize)> = best
            .into_sorted_vec()
            .into_iter()
            .map(|h| (h.dist, h.offset))
            .collect();
        hits.truncate(k);
        Ok(hits)
    }

    fn search_node(
        &self,
        id: usize,
        rows: &RowMatrix,
        query: &[f32],
        k: usize,
        best: &mut BinaryHeap<Hit>,
    ) {
        let node = &self.nodes[id];
        if best.len() == k {
            if let Some(worst) = best.peek() {
                if beyond(lower_bound(node, query), worst.dist) {
                    return;
                }
            }
        }

        match node.children {
            None => {
                for &i in &self.order[node.start..node.end] {
                    let hit = Hit {
                        dist: l2_distance(query, rows.row(i as usize)),
                        offset: i as usize,
                    };
                    if best.len() < k {
                        best.push(hit);
                    } else if best.peek().is_some_and(|worst| hit < *worst) {
                        best.pop();
                        best.push(hit);
                    }
                }
            }
            Some((left, right)) => {
                // nearer ball first tightens the bound sooner
                let (first, second) =
                    if lower_bound(&self.nodes[left], query) <= lower_bound(&self.nodes[right], query) {
                        (left, right)
                    } else {
                        (right, left)
                    };
                self.search_node(first, rows, query, k, best);
                self.search_node(second, rows, query, k, best);
            }
        }
    }
}

fn centroid(rows: &RowMatrix, members: &[u32]) -> Vec<f32> {
    let mut center = vec![0.0f64; rows.dimension()];
    for &i in members {
        for (c, &x) in center.iter_mut().zip(rows.row(i as usize)) {
            *c += f64::from(x);
        }
    }
    let count = members.len().max(1) as f64;
    center.into_iter().map(|c| (c / count) as f32).collect()
}

fn farthest(rows: &RowMatrix, members: &[u32], from: &[f32]) -> usize {
    members
        .iter()
        .map(|&i| (l2_distance(rows.row(i as usize), from), i as usize))
        .max_by(|a, b| a.0.total_cmp(&b.0).then(b.1.cmp(&a.1)))
        .map_or(0, |(_, i)| i)
}

/// Smallest distance any row inside `node` can have to `query`.
fn lower_bound(node: &BallNode, query: &[f32]) -> f32 {
    (l2_distance(query, &node.center) - node.radius).max(0.0)
}

/// `bound > worst`, with slack for f32 rounding in the triangle inequality.
fn beyond(bound: f32, worst: f32) -> bool {
    bound > worst + 1e-5 * (1.0 + worst.abs())
}
