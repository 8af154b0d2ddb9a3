//! Vectorized rows paired with the identity of each row.
//!
//! The in-memory vector backends (`nn`, `hnsw`, `lsh_forest`) address rows
//! by offset. This keeps the offset-to-identity map next to the rows so the
//! two can never drift apart.

use super::traits::Candidate;
use crate::error::{IndexError, Result};
use crate::persistence::blob_store::{get_value, put_value};
use crate::persistence::BlobStore;
use crate::sample::{Sample, SampleId};
use crate::vectorize::{RowMatrix, Vectorizer};

/// Finite rows plus one identity per row.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedRows {
    rows: RowMatrix,
    ids: Vec<SampleId>,
}

impl IndexedRows {
    pub fn new(rows: RowMatrix, ids: Vec<SampleId>) -> Result<Self> {
        if ids.len() != rows.num_rows() {
            return Err(IndexError::Serialization(format!(
                "{} identities for {} rows",
                ids.len(),
                rows.num_rows()
            )));
        }
        rows.ensure_finite()?;
        Ok(Self { rows, ids })
    }

    /// Vectorize `samples`.
    pub fn from_samples(vectorizer: &dyn Vectorizer, samples: &[Sample]) -> Result<Self> {
        let (rows, ids) = vectorizer.transform(samples)?;
        Self::new(rows, ids)
    }

    pub fn rows(&self) -> &RowMatrix {
        &self.rows
    }

    pub fn ids(&self) -> &[SampleId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Append `other`, keeping offsets of existing rows.
    pub fn append(&mut self, other: IndexedRows) -> Result<()> {
        if other.is_empty() {
            return Ok(());
        }
        self.rows.extend(&other.rows)?;
        self.ids.extend(other.ids);
        Ok(())
    }

    /// Candidate for the row at `offset`.
    pub fn candidate(&self, offset: usize, similarity: f32) -> Result<Candidate> {
        let id = self.ids.get(offset).ok_or_else(|| {
            IndexError::Serialization(format!(
                "row offset {offset} has no identity ({} known)",
                self.ids.len()
            ))
        })?;
        Ok(Candidate::new(id.clone(), similarity))
    }

    /// Write rows and identities as `<prefix>.rows` and `<prefix>.ids`.
    pub fn save<B: BlobStore + ?Sized>(&self, blobs: &B, prefix: &str) -> Result<()> {
        put_value(blobs, &format!("{prefix}.rows"), &self.rows)?;
        put_value(blobs, &format!("{prefix}.ids"), &self.ids)
    }

    pub fn load<B: BlobStore + ?Sized>(blobs: &B, prefix: &str) -> Result<Self> {
        let rows: RowMatrix = get_value(blobs, &format!("{prefix}.rows"))?;
        let ids: Vec<SampleId> = get_value(blobs, &format!("{prefix}.ids"))?;
        Self::new(rows, ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::FileBlobStore;
    use crate::sample::FeatureValue;
    use crate::vectorize::FeatureVectorizer;

    fn samples(n: usize) -> Vec<Sample> {
        (0..n)
            .map(|i| {
                Sample::from_content(format!("row-{i}").as_bytes())
                    .with("vector", FeatureValue::Vector(vec![i as f32, 1.0]))
            })
            .collect()
    }

    #[test]
    fn identities_follow_offsets() {
        let vectorizer = FeatureVectorizer::new("vector");
        let all = samples(5);
        let mut rows = IndexedRows::from_samples(&vectorizer, &all[..3]).unwrap();
        rows.append(IndexedRows::from_samples(&vectorizer, &all[3..]).unwrap())
            .unwrap();
        assert_eq!(rows.len(), 5);
        assert_eq!(rows.rows().row(4), &[4.0, 1.0]);
        assert_eq!(&rows.candidate(4, 0.5).unwrap().id, all[4].id());
        assert!(matches!(
            rows.candidate(5, 0.5),
            Err(IndexError::Serialization(_))
        ));
    }

    #[test]
    fn mismatched_or_non_finite_rows_are_rejected() {
        let rows = RowMatrix::from_rows(&[[1.0f32, 2.0]]).unwrap();
        assert!(IndexedRows::new(rows, Vec::new()).is_err());

        let nan = RowMatrix::from_rows(&[[f32::NAN, 2.0]]).unwrap();
        let id = SampleId::of_content(b"nan");
        assert!(matches!(
            IndexedRows::new(nan, vec![id]),
            Err(IndexError::InvalidParameter(_))
        ));
    }

    #[test]
    fn blobs_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = FileBlobStore::new(dir.path()).unwrap();
        let rows = IndexedRows::from_samples(&FeatureVectorizer::new("vector"), &samples(4)).unwrap();
        rows.save(&blobs, "nn").unwrap();
        assert!(blobs.exists("nn.rows").unwrap());
        assert_eq!(IndexedRows::load(&blobs, "nn").unwrap(), rows);
    }
}
