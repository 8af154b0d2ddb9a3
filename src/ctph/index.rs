//! CTPH backend: chunk-posting candidate generation plus digest scoring.

use super::compare::compare_digests;
use super::digest::Digest;
use super::postings::ChunkPostingStore;
use crate::ann::{Candidate, NeighborIndex, QueryOptions};
use crate::config::IndexConfig;
use crate::error::{IndexError, Result};
use crate::sample::{Sample, CTPH_DIGEST_FEATURE};
use std::path::PathBuf;
use tracing::{debug, info};

/// Fuzzy-hash index stored in `<index_dir>/ctph.db`.
///
/// A sample is a candidate for a query only if it shares at least one chunk
/// with each half of the query's digest at the query's block size.
pub struct CtphIndex {
    path: Option<PathBuf>,
    postings: ChunkPostingStore,
}

impl CtphIndex {
    pub const NAME: &'static str = "ctph";
    pub const FILE: &'static str = "ctph.db";

    pub fn new(config: &IndexConfig) -> Result<Self> {
        let path = config.index_path(Self::FILE);
        Ok(Self {
            postings: ChunkPostingStore::open(&path)?,
            path: Some(path),
        })
    }

    /// Index with no backing file; `load` is unsupported.
    pub fn in_memory() -> Result<Self> {
        Ok(Self {
            path: None,
            postings: ChunkPostingStore::open_in_memory()?,
        })
    }

    fn digest_of(sample: &Sample) -> Result<Digest> {
        Digest::parse(sample.require_text(CTPH_DIGEST_FEATURE)?)
    }

    fn add_all(&mut self, samples: &[Sample]) -> Result<usize> {
        let mut added = 0;
        for sample in samples {
            let digest = Self::digest_of(sample)?;
            if self.postings.add(sample.id(), &digest)? {
                added += 1;
            } else {
                debug!(sample = %sample.id(), "already indexed");
            }
        }
        Ok(added)
    }
}

impl NeighborIndex for CtphIndex {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn fit(&mut self, samples: &[Sample]) -> Result<()> {
        self.postings.reset()?;
        let added = self.add_all(samples)?;
        info!(backend = Self::NAME, samples = added, "fit");
        Ok(())
    }

    fn partial_fit(&mut self, samples: &[Sample]) -> Result<()> {
        self.postings.initialize()?;
        let added = self.add_all(samples)?;
        info!(backend = Self::NAME, samples = added, "partial_fit");
        Ok(())
    }

    fn query_candidates(
        &self,
        sample: &Sample,
        k: usize,
        _options: &QueryOptions,
    ) -> Result<Vec<Candidate>> {
        if !self.postings.is_initialized()? {
            return Err(IndexError::NotFitted(Self::NAME));
        }
        let digest = Self::digest_of(sample)?;
        let (block_chunks, double_chunks) = digest.chunks();

        let mut rows = self.postings.lookup(digest.block_size(), &block_chunks)?;
        if !rows.is_empty() {
            let double_rows = self.postings.lookup(digest.block_size(), &double_chunks)?;
            rows.retain(|r| double_rows.contains(r));
        }

        let mut candidates = Vec::with_capacity(rows.len());
        for (id, hash) in self.postings.digests_for(&rows, sample.id())? {
            let stored = Digest::parse(&hash)?;
            candidates.push(Candidate::new(id, compare_digests(&digest, &stored) as f32));
        }
        debug!(
            backend = Self::NAME,
            block_size = digest.block_size(),
            candidates = candidates.len(),
            k,
            "query"
        );
        Ok(candidates)
    }

    /// Every write is committed as it happens.
    fn save(&self) -> Result<()> {
        info!(backend = Self::NAME, "save");
        Ok(())
    }

    fn load(&mut self) -> Result<()> {
        let Some(path) = &self.path else {
            return Err(IndexError::Unsupported {
                backend: Self::NAME,
                operation: "load",
            });
        };
        self.postings = ChunkPostingStore::open(path)?;
        if !self.postings.is_initialized()? {
            return Err(IndexError::NotFitted(Self::NAME));
        }
        info!(backend = Self::NAME, samples = self.postings.count()?, "load");
        Ok(())
    }

    fn len(&self) -> Result<usize> {
        if self.postings.is_initialized()? {
            self.postings.count()
        } else {
            Ok(0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ann::nearest_k;
    use crate::sample::FeatureValue;

    fn with_digest(tag: &str, digest: &str) -> Sample {
        Sample::from_content(tag.as_bytes())
            .with(CTPH_DIGEST_FEATURE, FeatureValue::Text(digest.into()))
    }

    fn query(index: &CtphIndex, s: &Sample, k: usize) -> Vec<Candidate> {
        let raw = index.query_candidates(s, k, &QueryOptions::default()).unwrap();
        nearest_k(s.id(), raw, k)
    }

    #[test]
    fn query_before_fit_is_not_fitted() {
        let index = CtphIndex::in_memory().unwrap();
        let s = with_digest("a", "3:ABCDEFGHIJ:ABCDEFGH");
        assert!(matches!(
            index.query_candidates(&s, 5, &QueryOptions::default()),
            Err(IndexError::NotFitted("ctph"))
        ));
        assert_eq!(index.len().unwrap(), 0);
    }

    #[test]
    fn both_halves_must_share_a_chunk() {
        let mut index = CtphIndex::in_memory().unwrap();
        let q = with_digest("q", "48:ABCDEFGHIJKL:abcdefghijkl");
        let both = with_digest("both", "48:ABCDEFGHIJKM:abcdefghijkm");
        let first_only = with_digest("first", "48:ABCDEFGHIJKL:zyxwvutsrqpo");
        let second_only = with_digest("second", "48:ZYXWVUTSRQPO:abcdefghijkl");
        index
            .fit(&[q.clone(), both.clone(), first_only, second_only])
            .unwrap();

        let got = query(&index, &q, 10);
        assert_eq!(got.len(), 1);
        assert_eq!(&got[0].id, both.id());
        assert!(got[0].similarity > 0.0);
    }

    #[test]
    fn query_excludes_own_identity() {
        let mut index = CtphIndex::in_memory().unwrap();
        let a = with_digest("a", "48:ABCDEFGHIJKL:abcdefghijkl");
        index.fit(&[a.clone()]).unwrap();
        let raw = index
            .query_candidates(&a, 10, &QueryOptions::default())
            .unwrap();
        assert!(raw.is_empty());
    }

    #[test]
    fn fit_discards_previous_state() {
        let mut index = CtphIndex::in_memory().unwrap();
        index
            .fit(&[with_digest("a", "48:ABCDEFGHIJ:abcdefghij")])
            .unwrap();
        index
            .fit(&[with_digest("b", "48:ABCDEFGHIJ:abcdefghij")])
            .unwrap();
        assert_eq!(index.len().unwrap(), 1);

        index
            .partial_fit(&[with_digest("c", "48:ABCDEFGHIJ:abcdefghij")])
            .unwrap();
        assert_eq!(index.len().unwrap(), 2);
    }

    #[test]
    fn missing_or_malformed_digest_propagates() {
        let mut index = CtphIndex::in_memory().unwrap();
        let bare = Sample::from_content(b"bare");
        assert!(matches!(
            index.fit(&[bare]),
            Err(IndexError::MissingFeature { .. })
        ));
        let bad = with_digest("bad", "48:ABC");
        assert!(matches!(
            index.partial_fit(&[bad]),
            Err(IndexError::MalformedDigest { .. })
        ));
    }

    #[test]
    fn load_without_file_is_unsupported() {
        let mut index = CtphIndex::in_memory().unwrap();
        assert!(matches!(index.load(), Err(IndexError::Unsupported { .. })));
    }
}
