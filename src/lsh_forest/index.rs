//! LSH forest backend over one numeric sample feature.

use super::forest::LshForest;
use crate::ann::{Candidate, IndexedRows, NeighborIndex, QueryOptions};
use crate::config::{IndexConfig, LshForestParams};
use crate::error::{IndexError, Result};
use crate::persistence::blob_store::{get_value, put_value};
use crate::persistence::{BlobStore, FileBlobStore};
use crate::sample::Sample;
use crate::vectorize::{FeatureVectorizer, Vectorizer};
use std::path::PathBuf;
use tracing::{debug, info};

const FOREST_BLOB: &str = "lsh_forest.forest";
const PARAMS_BLOB: &str = "lsh_forest.params";

/// Similarity reported for a cosine distance: `1 - d`, capped at 1.
pub fn lsh_similarity(distance: f32) -> f32 {
    (1.0 - distance).min(1.0)
}

struct Fitted {
    data: IndexedRows,
    forest: LshForest,
}

/// Approximate cosine neighbors through random-hyperplane hash trees.
pub struct LshForestIndex {
    index_dir: PathBuf,
    params: LshForestParams,
    vectorizer: Box<dyn Vectorizer>,
    fitted: Option<Fitted>,
}

impl LshForestIndex {
    pub const NAME: &'static str = "lsh_forest";

    pub fn new(config: &IndexConfig) -> Result<Self> {
        config.lsh_forest.validate()?;
        Ok(Self {
            index_dir: config.index_dir.clone(),
            params: config.lsh_forest.clone(),
            vectorizer: Box::new(FeatureVectorizer::new(config.vector_feature.clone())),
            fitted: None,
        })
    }

    pub fn params(&self) -> &LshForestParams {
        &self.params
    }

    fn fitted(&self) -> Result<&Fitted> {
        self.fitted.as_ref().ok_or(IndexError::NotFitted(Self::NAME))
    }
}

impl NeighborIndex for LshForestIndex {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn fit(&mut self, samples: &[Sample]) -> Result<()> {
        self.fitted = None;
        let data = IndexedRows::from_samples(self.vectorizer.as_ref(), samples)?;
        if data.is_empty() {
            return Err(IndexError::InvalidParameter(
                "cannot fit lsh_forest on an empty batch".into(),
            ));
        }
        let seed = self.params.seed.unwrap_or_else(rand::random);
        let mut forest = LshForest::new(self.params.n_estimators, data.rows().dimension(), seed)?;
        forest.extend(data.rows())?;
        info!(
            backend = Self::NAME,
            samples = data.len(),
            trees = forest.num_trees(),
            seed,
            "fit"
        );
        self.fitted = Some(Fitted { data, forest });
        Ok(())
    }

    /// Hash new rows into the existing trees; hyperplanes stay as drawn.
    fn partial_fit(&mut self, samples: &[Sample]) -> Result<()> {
        let added = IndexedRows::from_samples(self.vectorizer.as_ref(), samples)?;
        let fitted = self.fitted.as_mut().ok_or(IndexError::NotFitted(Self::NAME))?;
        // forest first: it rejects a dimension change before rows move
        fitted.forest.extend(added.rows())?;
        fitted.data.append(added)?;
        info!(
            backend = Self::NAME,
            added = samples.len(),
            total = fitted.data.len(),
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
        let hits = fitted.forest.search(
            fitted.data.rows(),
            x.row(0),
            k.saturating_add(1),
            self.params.n_candidates,
            self.params.min_hash_match,
        )?;
        debug!(backend = Self::NAME, k, returned = hits.len(), "query");
        hits.into_iter()
            .map(|(distance, offset)| fitted.data.candidate(offset, lsh_similarity(distance)))
            .collect()
    }

    fn save(&self) -> Result<()> {
        let fitted = self.fitted()?;
        let blobs = FileBlobStore::new(&self.index_dir)?;
        blobs.delete(PARAMS_BLOB)?;
        fitted.data.save(&blobs, Self::NAME)?;
        put_value(&blobs, FOREST_BLOB, &fitted.forest)?;
        put_value(&blobs, PARAMS_BLOB, &self.params)?;
        info!(backend = Self::NAME, samples = fitted.data.len(), "save");
        Ok(())
    }

    fn load(&mut self) -> Result<()> {
        let blobs = FileBlobStore::new(&self.index_dir)?;
        if !blobs.exists(PARAMS_BLOB)? {
            return Err(IndexError::NotFitted(Self::NAME));
        }
        let params: LshForestParams = get_value(&blobs, PARAMS_BLOB)?;
        let data = IndexedRows::load(&blobs, Self::NAME)?;
        let forest: LshForest = get_value(&blobs, FOREST_BLOB)?;
        forest.validate()?;
        if forest.len() != data.len() {
            return Err(IndexError::Serialization(format!(
                "lsh forest hashed {} rows, {} saved",
                forest.len(),
                data.len()
            )));
        }
        info!(backend = Self::NAME, samples = data.len(), "load");
        self.params = params;
        self.fitted = Some(Fitted { data, forest });
        Ok(())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.fitted.as_ref().map_or(0, |f| f.data.len()))
    }
}
