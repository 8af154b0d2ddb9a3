//! HNSW graph: layered proximity graph over unit vectors.
//!
//! Nodes are inserted one at a time, so the graph grows incrementally. Each
//! node draws a top layer from an exponentially decaying distribution; upper
//! layers are sparse long-range shortcuts, layer 0 holds every node.
//!
//! Insertion descends greedily (beam 1) to the node's top layer, then at
//! each layer below runs a beam search of width `ef_construction`, picks
//! neighbors with the relative-neighborhood heuristic and links both ways.
//! Overfull neighbor lists keep their closest entries.
//!
//! # References
//!
//! - Malkov & Yashunin (2016): "Efficient and robust approximate nearest
//!   neighbor search using Hierarchical Navigable Small World graphs"

use super::search::{get_vector, search_layer, unit_distance, Layer};
use crate::distance::normalize_in_place;
use crate::error::{IndexError, Result};
use crate::vectorize::RowMatrix;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Layer draws are capped here.
const MAX_LEVEL: usize = 16;

/// Hierarchical navigable small world graph with cosine distance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HnswGraph {
    dimension: usize,
    m: usize,
    ef_construction: usize,
    seed: u64,
    /// Unit-normalized vectors, row-major.
    vectors: Vec<f32>,
    levels: Vec<u8>,
    /// `layers[l][node]`; empty for nodes below layer `l`.
    layers: Vec<Layer>,
    entry_point: Option<u32>,
}

impl HnswGraph {
    pub fn new(dimension: usize, m: usize, ef_construction: usize, seed: u64) -> Result<Self> {
        if dimension == 0 || m < 2 || ef_construction == 0 {
            return Err(IndexError::InvalidParameter(format!(
                "hnsw graph needs dimension > 0, m >= 2, ef_construction > 0 \
                 (got {dimension}, {m}, {ef_construction})"
            )));
        }
        Ok(Self {
            dimension,
            m,
            ef_construction,
            seed,
            vectors: Vec::new(),
            levels: Vec::new(),
            layers: vec![Vec::new()],
            entry_point: None,
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Number of layers in use.
    pub fn num_layers(&self) -> usize {
        self.entry_point
            .map_or(0, |ep| self.levels[ep as usize] as usize + 1)
    }

    /// Neighbors of `node` on `layer`.
    pub fn neighbors(&self, layer: usize, node: u32) -> &[u32] {
        self.layers
            .get(layer)
            .and_then(|l| l.get(node as usize))
            .map(|n| n.as_slice())
            .unwrap_or(&[])
    }

    /// Insert every row of `rows`, in order.
    pub fn extend(&mut self, rows: &RowMatrix) -> Result<()> {
        for row in rows.rows() {
            self.insert(row)?;
        }
        Ok(())
    }

    /// Insert one vector; returns its node id, which is its insertion offset.
    pub fn insert(&mut self, vector: &[f32]) -> Result<u32> {
        if vector.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        let id = u32::try_from(self.len()).map_err(|_| {
            IndexError::InvalidParameter("hnsw graph is full (u32 node ids)".into())
        })?;
        let mut unit = vector.to_vec();
        normalize_in_place(&mut unit);

        let level = self.draw_level(id);
        self.vectors.extend_from_slice(&unit);
        // level <= MAX_LEVEL < 256
        self.levels.push(level as u8);
        for layer in &mut self.layers {
            layer.push(SmallVec::new());
        }
        while self.layers.len() <= level {
            self.layers.push(vec![SmallVec::new(); id as usize + 1]);
        }

        let Some(entry) = self.entry_point else {
            self.entry_point = Some(id);
            return Ok(id);
        };
        let top = self.levels[entry as usize] as usize;

        let mut ep = entry;
        for l in (level + 1..=top).rev() {
            ep = self.closest(&unit, ep, l);
        }

        for l in (0..=level.min(top)).rev() {
            let found = search_layer(
                &unit,
                ep,
                &self.layers[l],
                &self.vectors,
                self.dimension,
                self.ef_construction,
            );
            if let Some(&(best, _)) = found.first() {
                ep = best;
            }
            let selected = self.select_neighbors(&found, self.m);
            let m_max = if l == 0 { self.m * 2 } else { self.m };
            for &neighbor in &selected {
                self.link(l, neighbor, id, m_max);
            }
            self.layers[l][id as usize] = selected.into_iter().collect();
        }

        if level > top {
            self.entry_point = Some(id);
        }
        Ok(id)
    }

    /// Approximate `k` nearest nodes to `query` as `(distance, node)`,
    /// ascending. `ef` is the layer-0 beam width, at least `k`.
    pub fn search(&self, query: &[f32], k: usize, ef: usize) -> Result<Vec<(f32, usize)>> {
        if query.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        let Some(entry) = self.entry_point else {
            return Ok(Vec::new());
        };
        if k == 0 {
            return Ok(Vec::new());
        }
        let mut unit = query.to_vec();
        normalize_in_place(&mut unit);

        let mut ep = entry;
        for l in (1..self.num_layers()).rev() {
            ep = self.closest(&unit, ep, l);
        }
        let mut hits = search_layer(
            &unit,
            ep,
            &self.layers[0],
            &self.vectors,
            self.dimension,
            ef.max(k),
        );
        hits.truncate(k);
        Ok(hits
            .into_iter()
            .map(|(node, d)| (d, node as usize))
            .collect())
    }

    /// Greedy (beam 1) step toward `query` on layer `l`.
    fn closest(&self, query: &[f32], entry: u32, l: usize) -> u32 {
        search_layer(query, entry, &self.layers[l], &self.vectors, self.dimension, 1)
            .first()
            .map_or(entry, |&(node, _)| node)
    }

    /// `floor(-ln(U) / ln(m))`, from a generator keyed by seed and node, so
    /// the graph depends only on the seed and the insertion order.
    fn draw_level(&self, id: u32) -> usize {
        let mut rng =
            StdRng::seed_from_u64(self.seed ^ u64::from(id).wrapping_mul(0x9E37_79B9_7F4A_7C15));
        let u: f64 = 1.0 - rng.random::<f64>();
        let ml = 1.0 / (self.m as f64).ln();
        ((-u.ln() * ml).floor() as usize).min(MAX_LEVEL)
    }

    /// Relative-neighborhood selection: keep a candidate only if it is
    /// closer to the query than to every neighbor already kept, then top up
    /// with the nearest leftovers. `candidates` is sorted ascending.
    fn select_neighbors(&self, candidates: &[(u32, f32)], m: usize) -> Vec<u32> {
        let mut selected: Vec<u32> = Vec::with_capacity(m);
        let mut skipped: Vec<u32> = Vec::new();
        for &(candidate, distance) in candidates {
            if selected.len() >= m {
                break;
            }
            let c = self.vector(candidate);
            let diverse = selected
                .iter()
                .all(|&s| distance < unit_distance(c, self.vector(s)));
            if diverse {
                selected.push(candidate);
            } else {
                skipped.push(candidate);
            }
        }
        for candidate in skipped {
            if selected.len() >= m {
                break;
            }
            selected.push(candidate);
        }
        selected
    }

    /// Add `to` to the neighbors of `from` on layer `l`, keeping the
    /// `m_max` closest.
    fn link(&mut self, l: usize, from: u32, to: u32, m_max: usize) {
        let mut list: Vec<u32> = self.layers[l][from as usize].to_vec();
        list.push(to);
        if list.len() > m_max {
            let base = self.vector(from);
            let mut scored: Vec<(f32, u32)> = list
                .iter()
                .map(|&o| (unit_distance(base, self.vector(o)), o))
                .collect();
            scored.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
            scored.truncate(m_max);
            list = scored.into_iter().map(|(_, o)| o).collect();
        }
        self.layers[l][from as usize] = list.into_iter().collect();
    }

    fn vector(&self, node: u32) -> &[f32] {
        get_vector(&self.vectors, self.dimension, node as usize)
    }

    /// Structural checks for a graph read back from disk.
    pub fn validate(&self) -> Result<()> {
        let n = self.len();
        let corrupt =
            |what: String| -> Result<()> { Err(IndexError::Serialization(format!("hnsw graph: {what}"))) };
        if self.vectors.len() != n * self.dimension {
            return corrupt(format!("{} floats for {n} nodes", self.vectors.len()));
        }
        if self.layers.iter().any(|l| l.len() != n) {
            return corrupt("layer sizes disagree with node count".into());
        }
        if self.levels.iter().any(|&lv| lv as usize >= self.layers.len()) {
            return corrupt("node level above the top layer".into());
        }
        let dangling = self
            .layers
            .iter()
            .flat_map(|l| l.iter().flatten())
            .any(|&o| o as usize >= n);
        if dangling {
            return corrupt("edge to a missing node".into());
        }
        match self.entry_point {
            None if n > 0 => corrupt("no entry point".into()),
            Some(ep) if ep as usize >= n => corrupt("entry point out of range".into()),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::benchmark::create_clustered_dataset;
    use crate::distance::cosine_distance;

    fn brute_cosine(rows: &RowMatrix, q: &[f32], k: usize) -> Vec<usize> {
        let mut all: Vec<(f32, usize)> = rows
            .rows()
            .enumerate()
            .map(|(i, r)| (cosine_distance(q, r), i))
            .collect();
        all.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        all.into_iter().take(k).map(|(_, i)| i).collect()
    }

    // =========================================================================
    // Construction
    // =========================================================================

    #[test]
    fn first_node_is_the_entry_point() {
        let mut g = HnswGraph::new(2, 4, 16, 1).unwrap();
        assert!(g.is_empty());
        assert_eq!(g.num_layers(), 0);
        assert_eq!(g.insert(&[1.0, 0.0]).unwrap(), 0);
        assert_eq!(g.insert(&[0.0, 1.0]).unwrap(), 1);
        assert_eq!(g.len(), 2);
        assert!(g.num_layers() >= 1);
        assert_eq!(g.neighbors(0, 0), &[1]);
        assert_eq!(g.neighbors(0, 1), &[0]);
        g.validate().unwrap();
    }

    #[test]
    fn degree_is_bounded() {
        let data = create_clustered_dataset(400, 1, 8, 4, 0.2, 3).unwrap();
        let mut g = HnswGraph::new(8, 4, 32, 3).unwrap();
        g.extend(&data.train).unwrap();
        for node in 0..g.len() as u32 {
            assert!(g.neighbors(0, node).len() <= 8);
            for l in 1..g.num_layers() {
                assert!(g.neighbors(l, node).len() <= 4);
            }
        }
        g.validate().unwrap();
    }

    #[test]
    fn same_seed_same_graph() {
        let data = create_clustered_dataset(200, 1, 6, 3, 0.2, 5).unwrap();
        let mut a = HnswGraph::new(6, 6, 40, 11).unwrap();
        let mut b = HnswGraph::new(6, 6, 40, 11).unwrap();
        a.extend(&data.train).unwrap();
        b.extend(&data.train).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn bad_parameters_and_dimensions() {
        assert!(HnswGraph::new(0, 4, 8, 0).is_err());
        assert!(HnswGraph::new(3, 1, 8, 0).is_err());
        let mut g = HnswGraph::new(3, 4, 8, 0).unwrap();
        assert!(matches!(
            g.insert(&[1.0, 2.0]),
            Err(IndexError::DimensionMismatch { .. })
        ));
        assert!(g.search(&[1.0, 0.0, 0.0], 3, 10).unwrap().is_empty());
        assert!(g.search(&[1.0], 3, 10).is_err());
    }

    // =========================================================================
    // Search
    // =========================================================================

    #[test]
    fn recall_against_exact_cosine() {
        let data = create_clustered_dataset(1000, 50, 16, 10, 0.15, 7).unwrap();
        let mut g = HnswGraph::new(16, 12, 100, 7).unwrap();
        g.extend(&data.train).unwrap();

        let k = 10;
        let mut found = 0;
        for q in data.test.rows() {
            let truth = brute_cosine(&data.train, q, k);
            let got: Vec<usize> = g.search(q, k, 64).unwrap().into_iter().map(|(_, i)| i).collect();
            found += got.iter().filter(|i| truth.contains(i)).count();
        }
        let recall = found as f64 / (k * data.test.num_rows()) as f64;
        assert!(recall >= 0.9, "recall {recall}");
    }

    #[test]
    fn indexed_vector_finds_itself() {
        let data = create_clustered_dataset(300, 1, 8, 5, 0.1, 2).unwrap();
        let mut g = HnswGraph::new(8, 8, 64, 2).unwrap();
        g.extend(&data.train).unwrap();
        for i in [0usize, 150, 299] {
            let hits = g.search(data.train.row(i), 1, 32).unwrap();
            assert!(hits[0].0 < 1e-5);
        }
    }

    #[test]
    fn scale_does_not_change_neighbors() {
        let rows = RowMatrix::from_rows(&[[1.0f32, 0.0], [0.0, 1.0], [1.0, 1.0]]).unwrap();
        let mut g = HnswGraph::new(2, 2, 8, 0).unwrap();
        g.extend(&rows).unwrap();
        let hits = g.search(&[100.0, 90.0], 1, 8).unwrap();
        assert_eq!(hits[0].1, 2);
    }

    #[test]
    fn validate_catches_dangling_edges() {
        let rows = RowMatrix::from_rows(&[[1.0f32, 0.0], [0.0, 1.0]]).unwrap();
        let mut g = HnswGraph::new(2, 2, 8, 0).unwrap();
        g.extend(&rows).unwrap();
        g.layers[0][0].push(9);
        assert!(matches!(g.validate(), Err(IndexError::Serialization(_))));
    }
}
