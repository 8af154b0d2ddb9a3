//! kindred: nearest-neighbor indexes for malware sample similarity.
//!
//! Given a corpus of samples, each an identity (content hash) plus named
//! features, kindred answers "which indexed samples are most similar to this
//! one?" through a single contract with five backends:
//!
//! - `ctph/`: fuzzy-hash chunk index. Samples carry an ssdeep-style
//!   context-triggered piecewise hash; candidates must share a 7-character
//!   chunk with both halves of the query digest and are scored 0..=100 with
//!   the standard fuzzy comparison.
//! - `pdci/`: Prioritized Dynamic Continuous Indexing over a numeric feature
//!   vector. Random projections kept sorted in SQLite are walked outward from
//!   the query; results are ranked by Euclidean distance.
//! - `nn/`: exact Euclidean neighbors through a ball tree or a linear scan.
//! - `hnsw/`: Hierarchical Navigable Small World graph over cosine distance.
//! - `lsh_forest/`: random-hyperplane hash prefixes, re-ranked by cosine
//!   distance.
//!
//! All implement [`NeighborIndex`]; [`ann::Searcher`] pairs a backend with a
//! [`SampleStore`] to hydrate neighbor identities into samples.
//!
//! # Similarity scale
//!
//! Similarities are "higher is more similar" but backend-specific: CTPH
//! reports the raw 0..=100 match score, PDCI reports `1 / (1 + distance)`,
//! the other vector backends report `1 - distance` capped at 1 (Euclidean
//! for `nn`, cosine for `hnsw` and `lsh_forest`). Do not compare values
//! across backends.
//!
//! # Storage
//!
//! Everything lives under one index directory (see [`IndexConfig`]). Index
//! state is derived from sample features, so recovery from a damaged file
//! is a refit.

pub mod ann;
pub mod benchmark;
pub mod config;
pub mod distance;
pub mod error;
pub mod lid;
pub mod persistence;
pub mod sample;
pub mod vectorize;

#[cfg(feature = "ctph")]
pub mod ctph;

#[cfg(feature = "pdci")]
pub mod pdci;

#[cfg(feature = "nn")]
pub mod nn;

#[cfg(feature = "hnsw")]
pub mod hnsw;

#[cfg(feature = "lsh_forest")]
pub mod lsh_forest;

#[cfg(any(feature = "pdci", feature = "lsh_forest"))]
pub mod projection;

pub use ann::{index_factory, Candidate, NeighborIndex, QueryOptions, Searcher};
pub use config::{HnswParams, IndexConfig, LshForestParams, NnParams, PdciParams};
pub use error::{IndexError, Result};
pub use sample::{FeatureValue, Sample, SampleId, SampleStore, SqliteSampleStore};
pub use vectorize::{FeatureVectorizer, RowMatrix, Vectorizer};
