//! Query protocol on top of a backend: nearest-k selection plus hydration of
//! neighbor identities into full samples through the [`SampleStore`].

use super::traits::{nearest_k, Candidate, NeighborIndex, QueryOptions};
use crate::error::Result;
use crate::sample::{Sample, SampleId, SampleStore};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// A hydrated neighbor.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub sample: Sample,
    pub similarity: f32,
}

/// Neighbors of one query sample, most similar first.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub query: Sample,
    pub neighbors: Vec<Neighbor>,
}

/// A backend paired with the store used to hydrate its results.
pub struct Searcher<S> {
    index: Box<dyn NeighborIndex>,
    store: S,
}

impl<S: SampleStore> Searcher<S> {
    pub fn new(index: Box<dyn NeighborIndex>, store: S) -> Self {
        Self { index, store }
    }

    pub fn index(&self) -> &dyn NeighborIndex {
        self.index.as_ref()
    }

    pub fn index_mut(&mut self) -> &mut dyn NeighborIndex {
        self.index.as_mut()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_parts(self) -> (Box<dyn NeighborIndex>, S) {
        (self.index, self.store)
    }

    pub fn fit(&mut self, samples: &[Sample]) -> Result<()> {
        self.index.fit(samples)
    }

    pub fn partial_fit(&mut self, samples: &[Sample]) -> Result<()> {
        self.index.partial_fit(samples)
    }

    pub fn save(&self) -> Result<()> {
        self.index.save()
    }

    pub fn load(&mut self) -> Result<()> {
        self.index.load()
    }

    fn nearest(&self, sample: &Sample, k: usize, options: &QueryOptions) -> Result<Vec<Candidate>> {
        let raw = self.index.query_candidates(sample, k, options)?;
        debug!(
            backend = self.index.name(),
            query = %sample.id(),
            raw = raw.len(),
            k,
            "query candidates"
        );
        Ok(nearest_k(sample.id(), raw, k))
    }

    /// The `k` most similar samples to `sample`, excluding itself.
    pub fn query(&self, sample: &Sample, k: usize, options: &QueryOptions) -> Result<QueryResult> {
        let mut neighbors = Vec::new();
        for candidate in self.nearest(sample, k, options)? {
            match self.store.load_sample(&candidate.id)? {
                Some(s) => neighbors.push(Neighbor {
                    sample: s,
                    similarity: candidate.similarity,
                }),
                None => warn!(neighbor = %candidate.id, "neighbor missing from sample store"),
            }
        }
        Ok(QueryResult {
            query: sample.clone(),
            neighbors,
        })
    }

    /// k-NN for every seed, optionally expanded by one hop to the neighbors
    /// of those neighbors.
    ///
    /// Every identity is fetched from the store at most once, however many
    /// result lists reference it. Seeds are never fetched.
    pub fn query_samples(
        &self,
        seeds: &[Sample],
        k: usize,
        include_neighbors: bool,
        options: &QueryOptions,
    ) -> Result<Vec<QueryResult>> {
        let mut loaded: HashMap<SampleId, Sample> = seeds
            .iter()
            .map(|s| (s.id().clone(), s.clone()))
            .collect();
        let mut requested: HashSet<SampleId> = loaded.keys().cloned().collect();

        let mut pending: Vec<(Sample, Vec<Candidate>)> = Vec::with_capacity(seeds.len());
        for seed in seeds {
            pending.push((seed.clone(), self.nearest(seed, k, options)?));
        }

        let neighbor_samples = self.load_unrequested(&pending, &mut requested, &mut loaded)?;

        if include_neighbors {
            let first_hop = pending.len();
            for sample in neighbor_samples {
                let candidates = self.nearest(&sample, k, options)?;
                pending.push((sample, candidates));
            }
            self.load_unrequested(&pending[first_hop..], &mut requested, &mut loaded)?;
        }

        let results = pending
            .into_iter()
            .map(|(query, candidates)| {
                let neighbors = candidates
                    .into_iter()
                    .filter_map(|c| match loaded.get(&c.id) {
                        Some(s) => Some(Neighbor {
                            sample: s.clone(),
                            similarity: c.similarity,
                        }),
                        None => {
                            warn!(neighbor = %c.id, "neighbor missing from sample store");
                            None
                        }
                    })
                    .collect();
                QueryResult { query, neighbors }
            })
            .collect();
        Ok(results)
    }

    /// Fetch every referenced identity not fetched before, in first-seen order.
    fn load_unrequested(
        &self,
        results: &[(Sample, Vec<Candidate>)],
        requested: &mut HashSet<SampleId>,
        loaded: &mut HashMap<SampleId, Sample>,
    ) -> Result<Vec<Sample>> {
        let mut ids = Vec::new();
        for (_, candidates) in results {
            for c in candidates {
                if requested.insert(c.id.clone()) {
                    ids.push(c.id.clone());
                }
            }
        }
        let samples = self.store.load_samples(&ids)?;
        for s in &samples {
            loaded.insert(s.id().clone(), s.clone());
        }
        Ok(samples)
    }
}
