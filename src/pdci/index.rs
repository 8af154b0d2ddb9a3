//! PDCI backend: vectorizes samples and maps row offsets back to identities.

use crate::projection::RandomProjection;
use super::search::Pdci;
use super::sorted::SortedProjectionStore;
use crate::ann::{Candidate, NeighborIndex, QueryOptions};
use crate::config::{IndexConfig, PdciParams};
use crate::distance::distance_to_similarity;
use crate::error::{IndexError, Result};
use crate::persistence::blob_store::{get_value, put_value};
use crate::persistence::{BlobStore, FileBlobStore};
use crate::sample::{Sample, SampleId};
use crate::vectorize::{FeatureVectorizer, RowMatrix, Vectorizer};
use std::path::PathBuf;
use tracing::info;

const BASIS_BLOB: &str = "pdci.basis";
const ROWS_BLOB: &str = "pdci.rows";
const IDS_BLOB: &str = "pdci.ids";
const PARAMS_BLOB: &str = "pdci.params";
const LID_BLOB: &str = "pdci.lid";

/// PDCI over one numeric sample feature.
///
/// The sorted projections live in `<index_dir>/pdci.db` and are written as
/// rows are added; `save` writes the basis, raw rows, identities, the
/// intrinsic dimensionality estimate and parameters next to it.
pub struct PdciIndex {
    index_dir: Option<PathBuf>,
    params: PdciParams,
    vectorizer: Box<dyn Vectorizer>,
    pdci: Option<Pdci>,
    ids: Vec<SampleId>,
}

impl PdciIndex {
    pub const NAME: &'static str = "pdci";
    pub const FILE: &'static str = "pdci.db";

    pub fn new(config: &IndexConfig) -> Result<Self> {
        config.pdci.validate()?;
        Ok(Self {
            index_dir: Some(config.index_dir.clone()),
            params: config.pdci.clone(),
            vectorizer: Box::new(FeatureVectorizer::new(config.vector_feature.clone())),
            pdci: None,
            ids: Vec::new(),
        })
    }

    /// Index with in-memory projections; `save` and `load` are unsupported.
    pub fn in_memory(params: PdciParams, vectorizer: Box<dyn Vectorizer>) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            index_dir: None,
            params,
            vectorizer,
            pdci: None,
            ids: Vec::new(),
        })
    }

    pub fn params(&self) -> &PdciParams {
        &self.params
    }

    /// Intrinsic dimensionality estimated at fit, when enabled.
    pub fn estimated_dim(&self) -> Option<f64> {
        self.pdci.as_ref().and_then(Pdci::estimated_dim)
    }

    /// Identity of each indexed row, by offset.
    pub fn ids(&self) -> &[SampleId] {
        &self.ids
    }

    fn open_store(&self) -> Result<SortedProjectionStore> {
        match &self.index_dir {
            Some(dir) => SortedProjectionStore::open(&dir.join(Self::FILE)),
            None => SortedProjectionStore::open_in_memory(),
        }
    }

    fn blobs(&self, operation: &'static str) -> Result<FileBlobStore> {
        match &self.index_dir {
            Some(dir) => FileBlobStore::new(dir),
            None => Err(IndexError::Unsupported {
                backend: Self::NAME,
                operation,
            }),
        }
    }

    fn fitted(&self) -> Result<&Pdci> {
        self.pdci.as_ref().ok_or(IndexError::NotFitted(Self::NAME))
    }
}

impl NeighborIndex for PdciIndex {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn fit(&mut self, samples: &[Sample]) -> Result<()> {
        // a failed refit leaves the index unfitted, never half-replaced
        self.pdci = None;
        self.ids.clear();
        let (xs, ids) = self.vectorizer.transform(samples)?;
        let mut pdci = Pdci::new(self.params.clone(), self.open_store()?)?;
        pdci.fit(&xs)?;
        self.pdci = Some(pdci);
        self.ids = ids;
        info!(backend = Self::NAME, samples = self.ids.len(), "fit");
        Ok(())
    }

    fn partial_fit(&mut self, samples: &[Sample]) -> Result<()> {
        let (xs, ids) = self.vectorizer.transform(samples)?;
        let pdci = self.pdci.as_mut().ok_or(IndexError::NotFitted(Self::NAME))?;
        pdci.partial_fit(&xs)?;
        self.ids.extend(ids);
        info!(
            backend = Self::NAME,
            added = samples.len(),
            total = self.ids.len(),
            "partial_fit"
        );
        Ok(())
    }

    fn query_candidates(
        &self,
        sample: &Sample,
        k: usize,
        options: &QueryOptions,
    ) -> Result<Vec<Candidate>> {
        let pdci = self.fitted()?;
        let (x, _) = self.vectorizer.transform(std::slice::from_ref(sample))?;
        // one extra so an indexed query still yields k others
        let hits = pdci.query(x.row(0), k.saturating_add(1), options)?;
        hits.into_iter()
            .map(|(distance, offset)| {
                let id = self.ids.get(offset).ok_or_else(|| {
                    IndexError::Serialization(format!(
                        "row offset {offset} has no identity ({} known)",
                        self.ids.len()
                    ))
                })?;
                Ok(Candidate::new(id.clone(), distance_to_similarity(distance)))
            })
            .collect()
    }

    fn save(&self) -> Result<()> {
        let pdci = self.fitted()?;
        let blobs = self.blobs("save")?;
        let projection = pdci.projection().ok_or(IndexError::NotFitted(Self::NAME))?;
        // params are written last; load treats them as the commit marker
        blobs.delete(PARAMS_BLOB)?;
        put_value(&blobs, BASIS_BLOB, projection)?;
        put_value(&blobs, ROWS_BLOB, pdci.rows())?;
        put_value(&blobs, IDS_BLOB, &self.ids)?;
        put_value(&blobs, LID_BLOB, &pdci.estimated_dim())?;
        put_value(&blobs, PARAMS_BLOB, pdci.params())?;
        info!(backend = Self::NAME, samples = self.ids.len(), "save");
        Ok(())
    }

    fn load(&mut self) -> Result<()> {
        let blobs = self.blobs("load")?;
        if !blobs.exists(PARAMS_BLOB)? {
            return Err(IndexError::NotFitted(Self::NAME));
        }
        let params: PdciParams = get_value(&blobs, PARAMS_BLOB)?;
        let projection: RandomProjection = get_value(&blobs, BASIS_BLOB)?;
        let rows: RowMatrix = get_value(&blobs, ROWS_BLOB)?;
        let ids: Vec<SampleId> = get_value(&blobs, IDS_BLOB)?;
        if ids.len() != rows.num_rows() {
            return Err(IndexError::Serialization(format!(
                "{} identities saved for {} rows",
                ids.len(),
                rows.num_rows()
            )));
        }
        let estimated_dim: Option<f64> = if blobs.exists(LID_BLOB)? {
            get_value(&blobs, LID_BLOB)?
        } else {
            None
        };
        let pdci = Pdci::from_parts(params.clone(), projection, rows, self.open_store()?)?
            .with_estimated_dim(estimated_dim);
        self.params = params;
        self.pdci = Some(pdci);
        self.ids = ids;
        info!(backend = Self::NAME, samples = self.ids.len(), "load");
        Ok(())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.ids.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ann::nearest_k;
    use crate::sample::FeatureValue;

    fn sample(i: usize, v: Vec<f32>) -> Sample {
        Sample::from_content(format!("sample-{i}").as_bytes()).with("vector", FeatureValue::Vector(v))
    }

    fn grid() -> Vec<Sample> {
        (0..40)
            .map(|i| {
                let f = i as f32;
                sample(i, vec![f, (f * 0.37).cos() * 5.0, (i % 5) as f32])
            })
            .collect()
    }

    fn index() -> PdciIndex {
        PdciIndex::in_memory(
            PdciParams::new(3, 2).with_seed(9),
            Box::new(FeatureVectorizer::new("vector")),
        )
        .unwrap()
    }

    #[test]
    fn indexed_query_returns_k_others() {
        let samples = grid();
        let mut idx = index();
        idx.fit(&samples).unwrap();

        // a visit budget covering every entry admits each row eventually
        let opts = QueryOptions {
            k_retrieve: None,
            k_visit: Some(3 * samples.len()),
        };
        let raw = idx.query_candidates(&samples[10], 5, &opts).unwrap();
        assert_eq!(&raw[0].id, samples[10].id());
        assert_eq!(raw[0].similarity, 1.0);

        let top = nearest_k(samples[10].id(), raw, 5);
        assert_eq!(top.len(), 5);
        assert!(top.iter().all(|c| c.similarity > 0.0 && c.similarity < 1.0));
    }

    #[test]
    fn partial_fit_before_fit_is_not_fitted() {
        let mut idx = index();
        assert!(matches!(idx.partial_fit(&grid()), Err(IndexError::NotFitted("pdci"))));
        assert!(matches!(
            idx.query_candidates(&grid()[0], 1, &QueryOptions::default()),
            Err(IndexError::NotFitted("pdci"))
        ));
    }

    #[test]
    fn partial_fit_appends_identities() {
        let samples = grid();
        let mut idx = index();
        idx.fit(&samples[..30]).unwrap();
        idx.partial_fit(&samples[30..]).unwrap();
        assert_eq!(idx.len().unwrap(), 40);
        assert_eq!(idx.ids()[35], *samples[35].id());
    }

    #[test]
    fn missing_vector_feature() {
        let mut idx = index();
        let bare = Sample::from_content(b"bare");
        assert!(matches!(idx.fit(&[bare]), Err(IndexError::MissingFeature { .. })));
    }

    #[test]
    fn in_memory_cannot_persist() {
        let mut idx = index();
        idx.fit(&grid()).unwrap();
        assert!(matches!(idx.save(), Err(IndexError::Unsupported { .. })));
        assert!(matches!(idx.load(), Err(IndexError::Unsupported { .. })));
    }
}
