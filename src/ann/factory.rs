//! Backend registry: maps a backend identifier to its constructor.
//!
//! The set of backends is closed and known at compile time; each variant is
//! present only when its cargo feature is enabled.
//!
//! ```rust,no_run
//! use kindred::ann::{index_factory, BackendKind};
//! use kindred::IndexConfig;
//!
//! # fn main() -> kindred::Result<()> {
//! let config = IndexConfig::new("/tmp/kindred-index");
//! let index = index_factory("ctph", &config)?;
//! assert_eq!(index.name(), BackendKind::Ctph.name());
//! # Ok(())
//! # }
//! ```

use super::traits::NeighborIndex;
use crate::config::IndexConfig;
use crate::error::{IndexError, Result};
use std::fmt;
use std::str::FromStr;

/// Identifier of a registered backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Fuzzy-hash chunk index.
    #[cfg(feature = "ctph")]
    Ctph,
    /// Prioritized Dynamic Continuous Indexing.
    #[cfg(feature = "pdci")]
    Pdci,
    /// Exact Euclidean neighbors.
    #[cfg(feature = "nn")]
    Nn,
    /// Hierarchical Navigable Small World graph.
    #[cfg(feature = "hnsw")]
    Hnsw,
    /// Random-hyperplane LSH forest.
    #[cfg(feature = "lsh_forest")]
    LshForest,
}

impl BackendKind {
    pub fn name(self) -> &'static str {
        match self {
            #[cfg(feature = "ctph")]
            BackendKind::Ctph => crate::ctph::CtphIndex::NAME,
            #[cfg(feature = "pdci")]
            BackendKind::Pdci => crate::pdci::PdciIndex::NAME,
            #[cfg(feature = "nn")]
            BackendKind::Nn => crate::nn::NnIndex::NAME,
            #[cfg(feature = "hnsw")]
            BackendKind::Hnsw => crate::hnsw::HnswIndex::NAME,
            #[cfg(feature = "lsh_forest")]
            BackendKind::LshForest => crate::lsh_forest::LshForestIndex::NAME,
        }
    }

    /// Every backend compiled into this build.
    pub fn all() -> Vec<BackendKind> {
        let mut kinds = Vec::new();
        #[cfg(feature = "ctph")]
        kinds.push(BackendKind::Ctph);
        #[cfg(feature = "pdci")]
        kinds.push(BackendKind::Pdci);
        #[cfg(feature = "nn")]
        kinds.push(BackendKind::Nn);
        #[cfg(feature = "hnsw")]
        kinds.push(BackendKind::Hnsw);
        #[cfg(feature = "lsh_forest")]
        kinds.push(BackendKind::LshForest);
        kinds
    }

    /// Names accepted by [`BackendKind::from_str`].
    pub fn available() -> Vec<&'static str> {
        Self::all().into_iter().map(BackendKind::name).collect()
    }

    /// Construct the backend over `config`'s index directory.
    pub fn open(self, config: &IndexConfig) -> Result<Box<dyn NeighborIndex>> {
        match self {
            #[cfg(feature = "ctph")]
            BackendKind::Ctph => Ok(Box::new(crate::ctph::CtphIndex::new(config)?)),
            #[cfg(feature = "pdci")]
            BackendKind::Pdci => Ok(Box::new(crate::pdci::PdciIndex::new(config)?)),
            #[cfg(feature = "nn")]
            BackendKind::Nn => Ok(Box::new(crate::nn::NnIndex::new(config)?)),
            #[cfg(feature = "hnsw")]
            BackendKind::Hnsw => Ok(Box::new(crate::hnsw::HnswIndex::new(config)?)),
            #[cfg(feature = "lsh_forest")]
            BackendKind::LshForest => Ok(Box::new(crate::lsh_forest::LshForestIndex::new(config)?)),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BackendKind {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::all()
            .into_iter()
            .find(|k| k.name() == wanted)
            .ok_or_else(|| IndexError::UnknownBackend(s.to_string()))
    }
}

/// Create a backend of a known kind.
pub fn open_index(kind: BackendKind, config: &IndexConfig) -> Result<Box<dyn NeighborIndex>> {
    tracing::debug!(backend = kind.name(), dir = %config.index_dir.display(), "opening index");
    kind.open(config)
}

/// Create a backend from its identifier.
pub fn index_factory(name: &str, config: &IndexConfig) -> Result<Box<dyn NeighborIndex>> {
    open_index(name.parse()?, config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_backend_is_rejected() {
        let err = "annoy".parse::<BackendKind>().unwrap_err();
        assert!(matches!(err, IndexError::UnknownBackend(name) if name == "annoy"));

        let config = IndexConfig::new(std::env::temp_dir());
        assert!(matches!(
            index_factory("faiss", &config),
            Err(IndexError::UnknownBackend(_))
        ));
    }

    #[test]
    fn names_round_trip() {
        for kind in BackendKind::all() {
            assert_eq!(kind.name().parse::<BackendKind>().unwrap(), kind);
            assert_eq!(kind.to_string().to_uppercase().parse::<BackendKind>().unwrap(), kind);
        }
    }

    #[cfg(all(
        feature = "ctph",
        feature = "pdci",
        feature = "nn",
        feature = "hnsw",
        feature = "lsh_forest"
    ))]
    #[test]
    fn default_build_registers_every_backend() {
        assert_eq!(
            BackendKind::available(),
            vec!["ctph", "pdci", "nn", "hnsw", "lsh_forest"]
        );
    }

    #[cfg(all(feature = "nn", feature = "hnsw", feature = "lsh_forest"))]
    #[test]
    fn vector_backends_open_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let config = IndexConfig::new(dir.path());
        for name in ["nn", "hnsw", "lsh_forest"] {
            let index = index_factory(name, &config).unwrap();
            assert_eq!(index.name(), name);
            assert_eq!(index.len().unwrap(), 0);
        }
    }

    #[cfg(feature = "ctph")]
    #[test]
    fn factory_opens_named_backend() {
        let dir = tempfile::tempdir().unwrap();
        let config = IndexConfig::new(dir.path());
        let index = index_factory("ctph", &config).unwrap();
        assert_eq!(index.name(), "ctph");
    }
}
