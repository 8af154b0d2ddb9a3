//! HNSW backend: vectorizes samples into an [`HnswGraph`] and reports
//! cosine similarity.

use super::graph::HnswGraph;
use crate::ann::{Candidate, IndexedRows, NeighborIndex, QueryOptions};
use crate::config::{HnswParams, IndexConfig};
use crate::error::{IndexError, Result};
use crate::persistence::blob_store::{get_value, put_value};
use crate::persistence::{BlobStore, FileBlobStore};
use crate::sample::{Sample, SampleId};
use crate::vectorize::{FeatureVectorizer, Vectorizer};
use std::path::PathBuf;
use tracing::{debug, info};

const GRAPH_BLOB: &str = "hnsw.graph";
const IDS_BLOB: &str = "hnsw.ids";
const PARAMS_BLOB: &str = "hnsw.params";

struct Fitted {
    graph: HnswGraph,
    ids: Vec<SampleId>,
}

/// Approximate cosine neighbors over one numeric sample feature.
pub struct HnswIndex {
    index_dir: PathBuf,
    params: HnswParams,
    vectorizer: Box<dyn Vectorizer>,
    fitted: Option<Fitted>,
}

impl HnswIndex {
    pub const NAME: &'static str = "hnsw";

    pub fn new(config: &IndexConfig) -> Result<Self> {
        config.hnsw.validate()?;
        Ok(Self {
            index_dir: config.index_dir.clone(),
            params: config.hnsw.clone(),
            vectorizer: Box::new(FeatureVectorizer::new(config.vector_feature.clone())),
            fitted: None,
        })
    }

    pub fn params(&self) -> &HnswParams {
        &self.params
    }

    /// The fitted graph, if any.
    pub fn graph(&self) -> Option<&HnswGraph> {
        self.fitted.as_ref().map(|f| &f.graph)
    }

    fn fitted(&self) -> Result<&Fitted> {
        self.fitted.as_ref().ok_or(IndexError::NotFitted(Self::NAME))
    }
}

impl NeighborIndex for HnswIndex {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn fit(&mut self, samples: &[Sample]) -> Result<()> {
        self.fitted = None;
        let data = IndexedRows::from_samples(self.vectorizer.as_ref(), samples)?;
        if data.is_empty() {
            return Err(IndexError::InvalidParameter(
                "cannot fit hnsw on an empty batch".into(),
            ));
        }
        let seed = self.params.seed.unwrap_or_else(rand::random);
        let mut graph = HnswGraph::new(
            data.rows().dimension(),
            self.params.m,
            self.params.ef_construction,
            seed,
        )?;
        graph.extend(data.rows())?;
        info!(
            backend = Self::NAME,
            samples = graph.len(),
            layers = graph.num_layers(),
            seed,
            "fit"
        );
        self.fitted = Some(Fitted {
            graph,
            ids: data.ids().to_vec(),
        });
        Ok(())
    }

    /// Insert rows into the existing graph.
    fn partial_fit(&mut self, samples: &[Sample]) -> Result<()> {
        let added = IndexedRows::from_samples(self.vectorizer.as_ref(), samples)?;
        let fitted = self.fitted.as_mut().ok_or(IndexError::NotFitted(Self::NAME))?;
        if !added.is_empty() && added.rows().dimension() != fitted.graph.dimension() {
            return Err(IndexError::DimensionMismatch {
                expected: fitted.graph.dimension(),
                actual: added.rows().dimension(),
            });
        }
        // ids track nodes one-to-one, so push each only once its node exists
        for (row, id) in added.rows().rows().zip(added.ids()) {
            fitted.graph.insert(row)?;
            fitted.ids.push(id.clone());
        }
        info!(
            backend = Self::NAME,
            added = added.len(),
            total = fitted.graph.len(),
            "partial_fit"
        );
        Ok(())
    }

    fn query_candidates(
        &self,
        sample: &Sample,
        k: usize,
        _options: &QueryOptions,
    ) -> Result<Vec<Candidate>> {
        let fitted = self.fitted()?;
        let (x, _) = self.vectorizer.transform(std::slice::from_ref(sample))?;
        let want = k.saturating_add(1);
        let hits = fitted
            .graph
            .search(x.row(0), want, self.params.ef.max(want))?;
        debug!(backend = Self::NAME, k, returned = hits.len(), "query");
        hits.into_iter()
            .map(|(distance, node)| {
                let id = fitted.ids.get(node).ok_or_else(|| {
                    IndexError::Serialization(format!("hnsw node {node} has no identity"))
                })?;
                Ok(Candidate::new(id.clone(), 1.0 - distance))
            })
            .collect()
    }

    fn save(&self) -> Result<()> {
        let fitted = self.fitted()?;
        let blobs = FileBlobStore::new(&self.index_dir)?;
        blobs.delete(PARAMS_BLOB)?;
        put_value(&blobs, GRAPH_BLOB, &fitted.graph)?;
        put_value(&blobs, IDS_BLOB, &fitted.ids)?;
        put_value(&blobs, PARAMS_BLOB, &self.params)?;
        info!(backend = Self::NAME, samples = fitted.ids.len(), "save");
        Ok(())
    }

    fn load(&mut self) -> Result<()> {
        let blobs = FileBlobStore::new(&self.index_dir)?;
        if !blobs.exists(PARAMS_BLOB)? {
            return Err(IndexError::NotFitted(Self::NAME));
        }
        let params: HnswParams = get_value(&blobs, PARAMS_BLOB)?;
        let graph: HnswGraph = get_value(&blobs, GRAPH_BLOB)?;
        let ids: Vec<SampleId> = get_value(&blobs, IDS_BLOB)?;
        graph.validate()?;
        if ids.len() != graph.len() {
            return Err(IndexError::Serialization(format!(
                "{} identities for {} hnsw nodes",
                ids.len(),
                graph.len()
            )));
        }
        info!(backend = Self::NAME, samples = ids.len(), "load");
        self.params = params;
        self.fitted = Some(Fitted { graph, ids });
        Ok(())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.fitted.as_ref().map_or(0, |f| f.ids.len()))
    }
}
