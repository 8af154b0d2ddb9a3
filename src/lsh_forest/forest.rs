//! Forest of random-hyperplane hash trees.
//!
//! Each tree hashes a row to 32 sign bits against its own random
//! hyperplanes (SimHash) and keeps `(hash, offset)` pairs sorted. Rows whose
//! hashes share a long prefix with the query's are likely to have a small
//! angle to it, and a sorted array answers "every hash with this prefix" as
//! one contiguous range.
//!
//! A query starts from the full 32-bit prefix and shortens it one bit at a
//! time, gathering the matching rows of every tree, until enough distinct
//! candidates are in hand or the prefix reaches `min_hash_match`. The
//! candidates are then ranked by exact cosine distance.
//!
//! # References
//!
//! - Charikar (2002): "Similarity estimation techniques from rounding algorithms"
//! - Bawa, Condie & Ganesan (2005): "LSH Forest: Self-Tuning Indexes for
//!   Similarity Search"

use crate::distance::cosine_distance;
use crate::error::{IndexError, Result};
use crate::projection::RandomProjection;
use crate::vectorize::RowMatrix;
use serde::{Deserialize, Serialize};

/// Bits per tree hash.
pub const HASH_BITS: u32 = 32;

/// Sign-hash trees over row offsets. Searches take the rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LshForest {
    projection: RandomProjection,
    /// Per tree: `(hash, offset)` ascending.
    trees: Vec<Vec<(u32, u32)>>,
}

impl LshForest {
    pub fn new(n_estimators: usize, dimension: usize, seed: u64) -> Result<Self> {
        if n_estimators == 0 {
            return Err(IndexError::InvalidParameter(
                "lsh forest needs at least one tree".into(),
            ));
        }
        let projection =
            RandomProjection::gaussian(n_estimators * HASH_BITS as usize, dimension, seed)?;
        Ok(Self {
            projection,
            trees: vec![Vec::new(); n_estimators],
        })
    }

    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn dimension(&self) -> usize {
        self.projection.dimension()
    }

    /// Number of rows hashed.
    pub fn len(&self) -> usize {
        self.trees.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hash of `x` in every tree.
    pub fn hashes(&self, x: &[f32]) -> Result<Vec<u32>> {
        (0..self.trees.len())
            .map(|t| self.projection.sign_hash(x, t * HASH_BITS as usize))
            .collect()
    }

    /// Hash every row of `rows` and add it at offset `len() + i`.
    pub fn extend(&mut self, rows: &RowMatrix) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        if rows.dimension() != self.dimension() {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension(),
                actual: rows.dimension(),
            });
        }
        let start = self.len();
        let end = u32::try_from(start + rows.num_rows()).map_err(|_| {
            IndexError::InvalidParameter("lsh forest is full (u32 offsets)".into())
        })?;
        let hashed: Vec<Vec<u32>> = rows.rows().map(|r| self.hashes(r)).collect::<Result<_>>()?;
        for (t, tree) in self.trees.iter_mut().enumerate() {
            tree.reserve(hashed.len());
            for (offset, h) in (start as u32..end).zip(&hashed) {
                tree.push((h[t], offset));
            }
            tree.sort_unstable();
        }
        Ok(())
    }

    /// Distinct candidate offsets for `query`, in discovery order.
    ///
    /// Gathering stops once there are at least `n_candidates` of them and at
    /// least `want`, or when the shared prefix would drop to
    /// `min_hash_match` bits. If that still leaves fewer than `want`, the
    /// lowest unseen offsets top it up.
    pub fn candidates(
        &self,
        query: &[f32],
        want: usize,
        n_candidates: usize,
        min_hash_match: u32,
    ) -> Result<Vec<usize>> {
        let n = self.len();
        let want = want.min(n);
        let hashes = self.hashes(query)?;
        let mut seen = vec![false; n];
        let mut found = Vec::new();

        let mut depth = HASH_BITS;
        while depth > min_hash_match && (found.len() < n_candidates || found.len() < want) {
            let mask = u32::MAX << (HASH_BITS - depth);
            for (tree, &h) in self.trees.iter().zip(&hashes) {
                let target = h & mask;
                let lo = tree.partition_point(|&(x, _)| x & mask < target);
                let hi = lo + tree[lo..].partition_point(|&(x, _)| x & mask == target);
                for &(_, offset) in &tree[lo..hi] {
                    let offset = offset as usize;
                    if !seen[offset] {
                        seen[offset] = true;
                        found.push(offset);
                    }
                }
            }
            depth -= 1;
        }

        if found.len() < want {
            let missing = want - found.len();
            found.extend((0..n).filter(|&i| !seen[i]).take(missing));
        }
        Ok(found)
    }

    /// Approximate `k` nearest rows to `query` by cosine distance, as
    /// `(distance, offset)` ascending, ties by offset.
    ///
    /// `rows` must be the matrix the forest hashed.
    pub fn search(
        &self,
        rows: &RowMatrix,
        query: &[f32],
        k: usize,
        n_candidates: usize,
        min_hash_match: u32,
    ) -> Result<Vec<(f32, usize)>> {
        if rows.num_rows() != self.len() {
            return Err(IndexError::Serialization(format!(
                "lsh forest hashed {} rows, matrix has {}",
                self.len(),
                rows.num_rows()
            )));
        }
        if k == 0 {
            return Ok(Vec::new());
        }
        let mut ranked: Vec<(f32, usize)> = self
            .candidates(query, k, n_candidates, min_hash_match)?
            .into_iter()
            .map(|i| (cosine_distance(query, rows.row(i)), i))
            .collect();
        ranked.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        ranked.truncate(k);
        Ok(ranked)
    }

    /// Structural checks for a forest read back from disk.
    pub fn validate(&self) -> Result<()> {
        let n = self.len();
        if self.projection.num_projections() != self.trees.len() * HASH_BITS as usize {
            return Err(IndexError::Serialization(format!(
                "{} hyperplanes for {} trees",
                self.projection.num_projections(),
                self.trees.len()
            )));
        }
        for tree in &self.trees {
            let mut present = vec![false; n];
            for &(_, offset) in tree {
                match present.get_mut(offset as usize) {
                    Some(p) if !*p => *p = true,
                    _ => {
                        return Err(IndexError::Serialization(format!(
                            "lsh tree offset {offset} is duplicated or out of range"
                        )))
                    }
                }
            }
            if tree.len() != n || tree.windows(2).any(|w| w[0] > w[1]) {
                return Err(IndexError::Serialization("lsh tree is not sorted".into()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::benchmark::create_clustered_dataset;

    fn exact(rows: &RowMatrix, q: &[f32], k: usize) -> Vec<usize> {
        let mut all: Vec<(f32, usize)> = rows
            .rows()
            .enumerate()
            .map(|(i, r)| (cosine_distance(q, r), i))
            .collect();
        all.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        all.into_iter().take(k).map(|(_, i)| i).collect()
    }

    #[test]
    fn trees_stay_sorted_across_batches() {
        let data = create_clustered_dataset(300, 1, 8, 4, 0.2, 1).unwrap();
        let mut forest = LshForest::new(5, 8, 1).unwrap();
        let mut first = RowMatrix::new(8);
        let mut second = RowMatrix::new(8);
        for (i, row) in data.train.rows().enumerate() {
            let half = if i < 100 { &mut first } else { &mut second };
            half.push_row(row).unwrap();
        }
        forest.extend(&first).unwrap();
        forest.extend(&second).unwrap();
        assert_eq!(forest.len(), 300);
        assert_eq!(forest.num_trees(), 5);
        forest.validate().unwrap();

        let mut whole = LshForest::new(5, 8, 1).unwrap();
        whole.extend(&data.train).unwrap();
        assert_eq!(forest, whole);
    }

    #[test]
    fn identical_direction_shares_every_hash() {
        let forest = LshForest::new(3, 4, 9).unwrap();
        let a = forest.hashes(&[1.0, 2.0, -1.0, 0.5]).unwrap();
        let b = forest.hashes(&[2.0, 4.0, -2.0, 1.0]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn recall_against_exact_cosine() {
        let data = create_clustered_dataset(1000, 40, 16, 10, 0.15, 3).unwrap();
        let mut forest = LshForest::new(20, 16, 3).unwrap();
        forest.extend(&data.train).unwrap();

        let k = 10;
        let mut found = 0;
        for q in data.test.rows() {
            let truth = exact(&data.train, q, k);
            let got = forest.search(&data.train, q, k, 200, 4).unwrap();
            assert_eq!(got.len(), k);
            found += got.iter().filter(|(_, i)| truth.contains(i)).count();
        }
        let recall = found as f64 / (k * data.test.num_rows()) as f64;
        assert!(recall >= 0.6, "recall {recall}");
    }

    #[test]
    fn short_prefixes_are_topped_up() {
        // min_hash_match 32 stops before any prefix is tried
        let data = create_clustered_dataset(50, 1, 4, 2, 0.2, 4).unwrap();
        let mut forest = LshForest::new(2, 4, 4).unwrap();
        forest.extend(&data.train).unwrap();
        let got = forest.candidates(data.test.row(0), 5, 10, 32).unwrap();
        assert_eq!(got, vec![0, 1, 2, 3, 4]);
        assert_eq!(forest.candidates(data.test.row(0), 500, 10, 32).unwrap().len(), 50);
    }

    #[test]
    fn mismatches_are_rejected() {
        assert!(LshForest::new(0, 4, 0).is_err());
        let mut forest = LshForest::new(2, 4, 0).unwrap();
        let rows = RowMatrix::from_rows(&[[1.0f32, 0.0, 0.0]]).unwrap();
        assert!(matches!(
            forest.extend(&rows),
            Err(IndexError::DimensionMismatch { .. })
        ));
        let four = RowMatrix::from_rows(&[[1.0f32, 0.0, 0.0, 0.0]]).unwrap();
        forest.extend(&four).unwrap();
        assert!(forest.search(&RowMatrix::new(4), &[1.0, 0.0, 0.0, 0.0], 1, 5, 4).is_err());
        assert!(forest.search(&four, &[1.0, 0.0], 1, 5, 4).is_err());
    }
}
