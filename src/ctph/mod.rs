//! Context-triggered piecewise hashing (CTPH) index.
//!
//! A CTPH digest (`block_size:sig1:sig2`) summarizes a file as a sequence of
//! characters, one per content-defined piece. Two files that share long runs
//! of content share runs of signature characters, so their digests can be
//! compared with an edit distance.
//!
//! ## Candidate generation
//!
//! Comparing a query against every stored digest is linear in the corpus.
//! Instead, every 7-character window of each (canonicalized) signature half
//! is decoded to an integer "chunk" and stored as a posting keyed by block
//! size. Any two digests that [`compare`] would score above zero share a
//! 7-character substring, hence a chunk, so postings give a cheap superset
//! of the matches:
//!
//! ```text
//! A = samples posting any sig1 chunk at block_size
//! B = samples posting any sig2 chunk at block_size
//! candidates = A ∩ B, each scored with compare()
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use kindred::ctph::{annotate, CtphIndex};
//! use kindred::{IndexConfig, NeighborIndex, QueryOptions, Sample};
//!
//! # fn main() -> kindred::Result<()> {
//! let content = std::fs::read("sample.exe")?;
//! let mut sample = Sample::from_content(&content);
//! annotate(&mut sample, &content[..])?;
//!
//! let mut index = CtphIndex::new(&IndexConfig::from_env())?;
//! index.partial_fit(&[sample.clone()])?;
//! let candidates = index.query_candidates(&sample, 10, &QueryOptions::default())?;
//! # Ok(())
//! # }
//! ```
//!
//! ## References
//!
//! - Kornblum (2006). "Identifying almost identical files using context
//!   triggered piecewise hashing"
//! - Wallace (2015). "Optimizing ssDeep for use at scale"

mod compare;
mod digest;
mod hasher;
mod index;
mod postings;

pub use compare::{compare, compare_digests, MAX_SCORE};
pub use digest::{canonicalize, chunk_set, decode_window, Digest, CHUNK_WINDOW};
pub use hasher::{FuzzyHasher, BLOCK_READ_SIZE};
pub use index::CtphIndex;
pub use postings::ChunkPostingStore;

use crate::error::Result;
use crate::sample::{FeatureValue, Sample, CTPH_DIGEST_FEATURE};
use std::io::Read;

/// Hash `content` and store the digest on `sample` as `ctph.digest`.
pub fn annotate<R: Read>(sample: &mut Sample, content: R) -> Result<Digest> {
    let digest = FuzzyHasher::digest_reader(content)?;
    sample.add(CTPH_DIGEST_FEATURE, FeatureValue::Text(digest.to_string()));
    Ok(digest)
}
