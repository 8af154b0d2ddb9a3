//! Exact backend: vectorizes samples and answers with true Euclidean
//! neighbors, through a ball tree or a linear scan.

use super::balltree::BallTree;
use crate::ann::{Candidate, IndexedRows, NeighborIndex, QueryOptions};
use crate::config::{IndexConfig, NnAlgorithm, NnParams};
use crate::distance::k_nearest;
use crate::error::{IndexError, Result};
use crate::persistence::blob_store::{get_value, put_value};
use crate::persistence::{BlobStore, FileBlobStore};
use crate::sample::Sample;
use crate::vectorize::{FeatureVectorizer, Vectorizer};
use std::path::PathBuf;
use tracing::{debug, info};

const TREE_BLOB: &str = "nn.tree";
const PARAMS_BLOB: &str = "nn.params";

/// Similarity reported for a Euclidean distance: `1 - d`, capped at 1.
///
/// Unbounded below; only the order matters.
pub fn nn_similarity(distance: f32) -> f32 {
    (1.0 - distance).min(1.0)
}

struct Fitted {
    data: IndexedRows,
    tree: Option<BallTree>,
}

/// Exact nearest neighbors over one numeric sample feature.
///
/// Everything is held in memory; `save` writes the rows, identities, tree
/// and parameters as `nn.*` blobs under the index directory.
pub struct NnIndex {
    index_dir: PathBuf,
    params: NnParams,
    vectorizer: Box<dyn Vectorizer>,
    fitted: Option<Fitted>,
}

impl NnIndex {
    pub const NAME: &'static str = "nn";

    pub fn new(config: &IndexConfig) -> Result<Self> {
        config.nn.validate()?;
        Ok(Self {
            index_dir: config.index_dir.clone(),
            params: config.nn.clone(),
            vectorizer: Box::new(FeatureVectorizer::new(config.vector_feature.clone())),
            fitted: None,
        })
    }

    pub fn params(&self) -> &NnParams {
        &self.params
    }

    /// Whether queries currently walk a ball tree.
    pub fn uses_tree(&self) -> bool {
        self.fitted.as_ref().is_some_and(|f| f.tree.is_some())
    }

    fn build_tree(params: &NnParams, data: &IndexedRows) -> Result<Option<BallTree>> {
        let tree = match params.algorithm {
            NnAlgorithm::Brute => false,
            NnAlgorithm::BallTree => true,
            NnAlgorithm::Auto => data.len() > params.leaf_size,
        };
        if tree {
            Ok(Some(BallTree::build(data.rows(), params.leaf_size)?))
        } else {
            Ok(None)
        }
    }

    fn fitted(&self) -> Result<&Fitted> {
        self.fitted.as_ref().ok_or(IndexError::NotFitted(Self::NAME))
    }
}

impl NeighborIndex for NnIndex {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn fit(&mut self, samples: &[Sample]) -> Result<()> {
        self.fitted = None;
        let data = IndexedRows::from_samples(self.vectorizer.as_ref(), samples)?;
        if data.is_empty() {
            return Err(IndexError::InvalidParameter(
                "cannot fit nn on an empty batch".into(),
            ));
        }
        let tree = Self::build_tree(&self.params, &data)?;
        info!(
            backend = Self::NAME,
            samples = data.len(),
            tree_depth = tree.as_ref().map_or(0, BallTree::depth),
            "fit"
        );
        self.fitted = Some(Fitted { data, tree });
        Ok(())
    }

    /// Append rows and rebuild the tree over the whole corpus.
    fn partial_fit(&mut self, samples: &[Sample]) -> Result<()> {
        let added = IndexedRows::from_samples(self.vectorizer.as_ref(), samples)?;
        let fitted = self.fitted.as_mut().ok_or(IndexError::NotFitted(Self::NAME))?;
        fitted.data.append(added)?;
        fitted.tree = Self::build_tree(&self.params, &fitted.data)?;
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
        let rows = fitted.data.rows();
        if x.dimension() != rows.dimension() {
            return Err(IndexError::DimensionMismatch {
                expected: rows.dimension(),
                actual: x.dimension(),
            });
        }
        // one extra so an indexed query still yields k others
        let want = k.saturating_add(1);
        let hits = match &fitted.tree {
            Some(tree) => tree.search(rows, x.row(0), want)?,
            None => k_nearest(x.row(0), rows, want),
        };
        debug!(backend = Self::NAME, k, returned = hits.len(), "query");
        hits.into_iter()
            .map(|(distance, offset)| fitted.data.candidate(offset, nn_similarity(distance)))
            .collect()
    }

    fn save(&self) -> Result<()> {
        let fitted = self.fitted()?;
        let blobs = FileBlobStore::new(&self.index_dir)?;
        // params are written last; load treats them as the commit marker
        blobs.delete(PARAMS_BLOB)?;
        fitted.data.save(&blobs, Self::NAME)?;
        put_value(&blobs, TREE_BLOB, &fitted.tree)?;
        put_value(&blobs, PARAMS_BLOB, &self.params)?;
        info!(backend = Self::NAME, samples = fitted.data.len(), "save");
        Ok(())
    }

    fn load(&mut self) -> Result<()> {
        let blobs = FileBlobStore::new(&self.index_dir)?;
        if !blobs.exists(PARAMS_BLOB)? {
            return Err(IndexError::NotFitted(Self::NAME));
        }
        let params: NnParams = get_value(&blobs, PARAMS_BLOB)?;
        let data = IndexedRows::load(&blobs, Self::NAME)?;
        let tree: Option<BallTree> = get_value(&blobs, TREE_BLOB)?;
        if let Some(tree) = &tree {
            if tree.len() != data.len() {
                return Err(IndexError::Serialization(format!(
                    "ball tree covers {} rows, {} saved",
                    tree.len(),
                    data.len()
                )));
            }
        }
        info!(backend = Self::NAME, samples = data.len(), "load");
        self.params = params;
        self.fitted = Some(Fitted { data, tree });
        Ok(())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.fitted.as_ref().map_or(0, |f| f.data.len()))
    }
}
