//! Numeric rows for PDCI and the pipeline that produces them.
//!
//! Turning PE features into numbers (TF-IDF, SVD, hashing) happens upstream.
//! By the time a sample reaches PDCI it carries a ready-made dense or sparse
//! vector, and [`FeatureVectorizer`] only has to pull it out and stack the
//! batch into a [`RowMatrix`].

use crate::error::{IndexError, Result};
use crate::sample::{FeatureValue, Sample, SampleId};
use serde::{Deserialize, Serialize};

/// Sparse vector: `(index, value)` pairs plus the full width.
///
/// Every index is below `dimension`. Decoding checks this too, so a row
/// read back from the sample store can always be densified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSparseRow")]
pub struct SparseRow {
    dimension: usize,
    indices: Vec<u32>,
    values: Vec<f32>,
}

/// Unchecked wire form of [`SparseRow`].
#[derive(Deserialize)]
struct RawSparseRow {
    dimension: usize,
    indices: Vec<u32>,
    values: Vec<f32>,
}

impl TryFrom<RawSparseRow> for SparseRow {
    type Error = IndexError;

    fn try_from(raw: RawSparseRow) -> Result<Self> {
        SparseRow::new(raw.dimension, raw.indices, raw.values)
    }
}

impl SparseRow {
    pub fn new(dimension: usize, indices: Vec<u32>, values: Vec<f32>) -> Result<Self> {
        if indices.len() != values.len() {
            return Err(IndexError::InvalidParameter(format!(
                "sparse row has {} indices but {} values",
                indices.len(),
                values.len()
            )));
        }
        if let Some(&bad) = indices.iter().find(|&&i| i as usize >= dimension) {
            return Err(IndexError::InvalidParameter(format!(
                "sparse index {bad} out of range for dimension {dimension}"
            )));
        }
        Ok(Self {
            dimension,
            indices,
            values,
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Densify. Duplicate indices accumulate.
    pub fn to_dense(&self) -> Vec<f32> {
        let mut dense = vec![0.0; self.dimension];
        for (&i, &v) in self.indices.iter().zip(&self.values) {
            if let Some(slot) = dense.get_mut(i as usize) {
                *slot += v;
            }
        }
        dense
    }
}

/// Dense row-major matrix; every row has `dimension` columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowMatrix {
    dimension: usize,
    data: Vec<f32>,
}

impl RowMatrix {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            data: Vec::new(),
        }
    }

    /// Stack rows; all must share the first row's length.
    pub fn from_rows<R: AsRef<[f32]>>(rows: &[R]) -> Result<Self> {
        let dimension = rows.first().map_or(0, |r| r.as_ref().len());
        let mut m = Self::new(dimension);
        m.data.reserve(rows.len() * dimension);
        for row in rows {
            m.push_row(row.as_ref())?;
        }
        Ok(m)
    }

    pub fn push_row(&mut self, row: &[f32]) -> Result<()> {
        if row.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: row.len(),
            });
        }
        self.data.extend_from_slice(row);
        Ok(())
    }

    pub fn push_sparse(&mut self, row: &SparseRow) -> Result<()> {
        if row.dimension() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: row.dimension(),
            });
        }
        self.data.extend(row.to_dense());
        Ok(())
    }

    /// Append all rows of `other`.
    pub fn extend(&mut self, other: &RowMatrix) -> Result<()> {
        if other.dimension != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: other.dimension,
            });
        }
        self.data.extend_from_slice(&other.data);
        Ok(())
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn num_rows(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }

    pub fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.dimension..(i + 1) * self.dimension]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f32]> {
        // chunks_exact panics on a zero chunk size
        self.data.chunks_exact(self.dimension.max(1))
    }

    /// Fail on the first NaN or infinite entry.
    pub fn ensure_finite(&self) -> Result<()> {
        match self.data.iter().position(|x| !x.is_finite()) {
            None => Ok(()),
            Some(pos) => Err(IndexError::InvalidParameter(format!(
                "row {} has non-finite value {} at column {}",
                pos / self.dimension.max(1),
                self.data[pos],
                pos % self.dimension.max(1)
            ))),
        }
    }
}

/// Turns a batch of samples into numeric rows aligned with their identities.
pub trait Vectorizer {
    fn transform(&self, samples: &[Sample]) -> Result<(RowMatrix, Vec<SampleId>)>;
}

/// Reads a precomputed dense or sparse vector from one named feature.
#[derive(Debug, Clone)]
pub struct FeatureVectorizer {
    feature: String,
}

impl FeatureVectorizer {
    pub fn new(feature: impl Into<String>) -> Self {
        Self {
            feature: feature.into(),
        }
    }

    fn width(&self, sample: &Sample) -> Result<usize> {
        match sample.get(&self.feature) {
            Some(FeatureValue::Vector(v)) => Ok(v.len()),
            Some(FeatureValue::Sparse(s)) => Ok(s.dimension()),
            _ => Err(self.missing(sample)),
        }
    }

    fn missing(&self, sample: &Sample) -> IndexError {
        IndexError::MissingFeature {
            identity: sample.id().to_string(),
            feature: self.feature.clone(),
        }
    }
}

impl Vectorizer for FeatureVectorizer {
    fn transform(&self, samples: &[Sample]) -> Result<(RowMatrix, Vec<SampleId>)> {
        let Some(first) = samples.first() else {
            return Ok((RowMatrix::new(0), Vec::new()));
        };
        let mut matrix = RowMatrix::new(self.width(first)?);
        let mut ids = Vec::with_capacity(samples.len());
        for sample in samples {
            match sample.get(&self.feature) {
                Some(FeatureValue::Vector(v)) => matrix.push_row(v)?,
                Some(FeatureValue::Sparse(s)) => matrix.push_sparse(s)?,
                _ => return Err(self.missing(sample)),
            }
            ids.push(sample.id().clone());
        }
        Ok((matrix, ids))
    }
}
