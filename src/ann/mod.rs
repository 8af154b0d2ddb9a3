//! The index contract shared by every backend.
//!
//! - [`NeighborIndex`]: lifecycle (`fit`, `partial_fit`, `query_candidates`,
//!   `save`, `load`) each backend implements.
//! - [`nearest_k`]: contract-level filtering of raw candidates.
//! - [`Searcher`]: pairs a backend with a [`SampleStore`](crate::SampleStore)
//!   and hydrates results, including the one-hop `query_samples` expansion.
//! - [`index_factory`]: builds a backend from its identifier.
//! - [`IndexedRows`]: rows plus identities for the in-memory vector backends.
//!
//! ```rust,no_run
//! use kindred::ann::{index_factory, QueryOptions, Searcher};
//! use kindred::{IndexConfig, SqliteSampleStore};
//!
//! # fn main() -> kindred::Result<()> {
//! # let samples: Vec<kindred::Sample> = Vec::new();
//! let config = IndexConfig::from_env();
//! let store = SqliteSampleStore::open_in(&config)?;
//! let mut searcher = Searcher::new(index_factory("ctph", &config)?, store);
//!
//! searcher.fit(&samples)?;
//! let result = searcher.query(&samples[0], 10, &QueryOptions::default())?;
//! for n in &result.neighbors {
//!     println!("{} {}", n.sample.id(), n.similarity);
//! }
//! # Ok(())
//! # }
//! ```

pub mod factory;
pub mod indexed;
pub mod searcher;
pub mod traits;

pub use factory::{index_factory, open_index, BackendKind};
pub use indexed::IndexedRows;
pub use searcher::{Neighbor, QueryResult, Searcher};
pub use traits::{nearest_k, Candidate, IndexStats, NeighborIndex, QueryOptions};
