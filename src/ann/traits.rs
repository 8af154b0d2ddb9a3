//! Unified lifecycle trait for every index backend.

use crate::error::{IndexError, Result};
use crate::sample::{Sample, SampleId};

/// A raw neighbor produced by a backend, before hydration.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub id: SampleId,
    /// Higher is more similar. CTPH: `0..=100`; PDCI: `(0, 1]`; nn, hnsw
    /// and lsh_forest: `1 - distance`, at most 1 and possibly negative.
    pub similarity: f32,
}

impl Candidate {
    pub fn new(id: SampleId, similarity: f32) -> Self {
        Self { id, similarity }
    }
}

/// Backend-specific query knobs. Backends ignore knobs they do not use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryOptions {
    /// PDCI: candidates to collect per composite group.
    pub k_retrieve: Option<usize>,
    /// PDCI: points to visit per composite group.
    pub k_visit: Option<usize>,
}

/// Statistics about an index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexStats {
    pub backend: &'static str,
    pub num_samples: usize,
}

/// Lifecycle shared by every nearest-neighbor backend.
///
/// `fit` and `query_candidates` are required. `partial_fit`, `save` and
/// `load` default to [`IndexError::Unsupported`] so a backend only opts in
/// to what it can actually do.
pub trait NeighborIndex {
    /// Backend identifier, also the key for its files under the index dir.
    fn name(&self) -> &'static str;

    /// Discard any existing structure and build from `samples`.
    fn fit(&mut self, samples: &[Sample]) -> Result<()>;

    /// Append `samples` to the existing structure.
    fn partial_fit(&mut self, _samples: &[Sample]) -> Result<()> {
        Err(IndexError::Unsupported {
            backend: self.name(),
            operation: "partial_fit",
        })
    }

    /// Raw neighbors for `sample`, in candidate-generation order.
    ///
    /// May include the query's own identity and more than `k` entries; the
    /// contract-level [`nearest_k`] filters and truncates.
    fn query_candidates(
        &self,
        sample: &Sample,
        k: usize,
        options: &QueryOptions,
    ) -> Result<Vec<Candidate>>;

    /// Persist state under the configured index directory.
    fn save(&self) -> Result<()> {
        Err(IndexError::Unsupported {
            backend: self.name(),
            operation: "save",
        })
    }

    /// Restore state saved by [`NeighborIndex::save`].
    fn load(&mut self) -> Result<()> {
        Err(IndexError::Unsupported {
            backend: self.name(),
            operation: "load",
        })
    }

    /// Number of indexed samples.
    fn len(&self) -> Result<usize>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn stats(&self) -> Result<IndexStats> {
        Ok(IndexStats {
            backend: self.name(),
            num_samples: self.len()?,
        })
    }
}

/// Contract-level nearest-k selection.
///
/// Drops the query's own identity, sorts by similarity descending and keeps
/// at most `k`. The sort is stable, so equal similarities stay in
/// candidate-generation order.
pub fn nearest_k(query: &SampleId, mut candidates: Vec<Candidate>, k: usize) -> Vec<Candidate> {
    candidates.retain(|c| &c.id != query);
    candidates.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
    candidates.truncate(k);
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(tag: &str) -> SampleId {
        SampleId::of_content(tag.as_bytes())
    }

    #[test]
    fn nearest_k_excludes_query_and_truncates() {
        let q = id("q");
        let candidates = vec![
            Candidate::new(id("a"), 10.0),
            Candidate::new(q.clone(), 100.0),
            Candidate::new(id("b"), 80.0),
            Candidate::new(id("c"), 50.0),
        ];
        let out = nearest_k(&q, candidates, 2);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].id, id("b"));
        assert_eq!(out[1].id, id("c"));
    }

    #[test]
    fn nearest_k_keeps_generation_order_on_ties() {
        let q = id("q");
        let candidates = vec![
            Candidate::new(id("first"), 70.0),
            Candidate::new(id("second"), 70.0),
            Candidate::new(id("top"), 90.0),
            Candidate::new(id("third"), 70.0),
        ];
        let out = nearest_k(&q, candidates, 10);
        let order: Vec<_> = out.iter().map(|c| c.id.clone()).collect();
        assert_eq!(order, vec![id("top"), id("first"), id("second"), id("third")]);
    }

    #[test]
    fn nearest_k_with_zero_k_is_empty() {
        let out = nearest_k(&id("q"), vec![Candidate::new(id("a"), 1.0)], 0);
        assert!(out.is_empty());
    }

    struct FitOnly;

    impl NeighborIndex for FitOnly {
        fn name(&self) -> &'static str {
            "fit-only"
        }
        fn fit(&mut self, _samples: &[Sample]) -> Result<()> {
            Ok(())
        }
        fn query_candidates(&self, _: &Sample, _: usize, _: &QueryOptions) -> Result<Vec<Candidate>> {
            Ok(Vec::new())
        }
        fn len(&self) -> Result<usize> {
            Ok(0)
        }
    }

    #[test]
    fn optional_operations_default_to_unsupported() {
        let mut index = FitOnly;
        let err = index.partial_fit(&[]).unwrap_err();
        assert!(matches!(
            err,
            IndexError::Unsupported {
                backend: "fit-only",
                operation: "partial_fit"
            }
        ));
        assert!(matches!(index.save(), Err(IndexError::Unsupported { .. })));
        assert!(matches!(index.load(), Err(IndexError::Unsupported { .. })));
        assert!(index.is_empty().unwrap());
    }
}
