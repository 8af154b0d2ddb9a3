//! Index configuration.
//!
//! Every index constructor takes an explicit [`IndexConfig`]; there is no
//! process-wide settings table. A config can come from [`Default`], from the
//! environment, or from a TOML file:
//!
//! ```toml
//! index_dir = "/var/lib/kindred"
//! vector_feature = "pe.vector"
//!
//! [pdci]
//! simple_indices = 10
//! composite_indices = 2
//! seed = 42
//!
//! [hnsw]
//! m = 16
//! ef = 100
//!
//! [nn]
//! algorithm = "brute"
//! ```

use crate::error::{IndexError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable overriding the index directory.
pub const INDEX_DIR_ENV: &str = "KINDRED_INDEX_DIR";

/// Default feature name read by the vector backends.
pub const DEFAULT_VECTOR_FEATURE: &str = "vector";

/// Location and parameters shared by every backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Directory holding every backend's files, keyed by backend name.
    pub index_dir: PathBuf,
    /// Sample feature holding the numeric vector the vector backends index.
    pub vector_feature: String,
    /// PDCI parameters.
    pub pdci: PdciParams,
    /// Exact search parameters.
    pub nn: NnParams,
    /// HNSW graph parameters.
    pub hnsw: HnswParams,
    /// LSH forest parameters.
    pub lsh_forest: LshForestParams,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            index_dir: PathBuf::from("index"),
            vector_feature: DEFAULT_VECTOR_FEATURE.to_string(),
            pdci: PdciParams::default(),
            nn: NnParams::default(),
            hnsw: HnswParams::default(),
            lsh_forest: LshForestParams::default(),
        }
    }
}

impl IndexConfig {
    /// Config rooted at `index_dir` with default parameters.
    pub fn new(index_dir: impl Into<PathBuf>) -> Self {
        Self {
            index_dir: index_dir.into(),
            ..Self::default()
        }
    }

    /// Defaults, with the index directory taken from `KINDRED_INDEX_DIR` if set.
    pub fn from_env() -> Self {
        match std::env::var_os(INDEX_DIR_ENV) {
            Some(dir) => Self::new(dir),
            None => Self::default(),
        }
    }

    /// Parse a TOML document. Missing keys fall back to defaults.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every backend's parameters.
    pub fn validate(&self) -> Result<()> {
        self.pdci.validate()?;
        self.nn.validate()?;
        self.hnsw.validate()?;
        self.lsh_forest.validate()
    }

    /// Read and parse a TOML config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| IndexError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Path of a file under the index directory.
    pub fn index_path(&self, name: &str) -> PathBuf {
        self.index_dir.join(name)
    }

    /// Create the index directory if it does not exist yet.
    pub fn ensure_index_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.index_dir)?;
        Ok(())
    }
}

/// PDCI parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PdciParams {
    /// Simple indices per composite group (m).
    pub simple_indices: usize,
    /// Number of composite groups (L).
    pub composite_indices: usize,
    /// Seed for the projection basis. `None` draws one from the thread RNG.
    pub seed: Option<u64>,
    /// Intrinsic dimensionality used by the default query budgets.
    /// `None` uses the fit-time estimate if enabled, else
    /// `n / composite_indices`, n being the indexed row count.
    pub intrinsic_dim: Option<f64>,
    /// Estimate intrinsic dimensionality from the rows at `fit` (LID MLE).
    pub estimate_intrinsic_dim: bool,
}

impl Default for PdciParams {
    fn default() -> Self {
        Self {
            simple_indices: 10,
            composite_indices: 2,
            seed: None,
            intrinsic_dim: None,
            estimate_intrinsic_dim: false,
        }
    }
}

impl PdciParams {
    pub fn new(simple_indices: usize, composite_indices: usize) -> Self {
        Self {
            simple_indices,
            composite_indices,
            ..Self::default()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Total number of projections, `m * L`.
    pub fn num_projections(&self) -> usize {
        self.simple_indices * self.composite_indices
    }

    pub fn validate(&self) -> Result<()> {
        if self.simple_indices == 0 || self.composite_indices == 0 {
            return Err(IndexError::InvalidParameter(format!(
                "simple_indices and composite_indices must be positive (got {} and {})",
                self.simple_indices, self.composite_indices
            )));
        }
        if let Some(d) = self.intrinsic_dim {
            if !(d.is_finite() && d > 0.0) {
                return Err(IndexError::InvalidParameter(format!(
                    "intrinsic_dim must be positive and finite, got {d}"
                )));
            }
        }
        Ok(())
    }
}

/// How the exact `nn` backend searches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NnAlgorithm {
    /// Ball tree once the corpus outgrows a single leaf, else brute force.
    #[default]
    Auto,
    BallTree,
    Brute,
}

/// Exact nearest-neighbor parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NnParams {
    pub algorithm: NnAlgorithm,
    /// Most rows a ball tree leaf holds.
    pub leaf_size: usize,
}

impl Default for NnParams {
    fn default() -> Self {
        Self {
            algorithm: NnAlgorithm::Auto,
            leaf_size: 30,
        }
    }
}

impl NnParams {
    pub fn validate(&self) -> Result<()> {
        if self.leaf_size == 0 {
            return Err(IndexError::InvalidParameter(
                "nn leaf_size must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// HNSW parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HnswParams {
    /// Links per node on the upper layers; layer 0 allows `2 * m`.
    pub m: usize,
    /// Beam width while inserting.
    pub ef_construction: usize,
    /// Beam width while querying, raised to `k + 1` when smaller.
    pub ef: usize,
    /// Seed for layer assignment. `None` draws one at `fit`.
    pub seed: Option<u64>,
}

impl Default for HnswParams {
    fn default() -> Self {
        Self {
            m: 12,
            ef_construction: 400,
            ef: 200,
            seed: None,
        }
    }
}

impl HnswParams {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.m < 2 || self.ef_construction == 0 || self.ef == 0 {
            return Err(IndexError::InvalidParameter(format!(
                "hnsw needs m >= 2 and positive beam widths (got m={}, ef_construction={}, ef={})",
                self.m, self.ef_construction, self.ef
            )));
        }
        Ok(())
    }
}

/// LSH forest parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LshForestParams {
    /// Number of trees, each hashing with its own 32 random hyperplanes.
    pub n_estimators: usize,
    /// Candidates gathered across trees before exact ranking.
    pub n_candidates: usize,
    /// Shortest hash prefix a candidate may share with the query.
    pub min_hash_match: u32,
    /// Seed for the hyperplanes. `None` draws one at `fit`.
    pub seed: Option<u64>,
}

impl Default for LshForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 20,
            n_candidates: 50,
            min_hash_match: 4,
            seed: None,
        }
    }
}

impl LshForestParams {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.n_estimators == 0 || self.min_hash_match > 32 {
            return Err(IndexError::InvalidParameter(format!(
                "lsh_forest needs n_estimators > 0 and min_hash_match <= 32 (got {} and {})",
                self.n_estimators, self.min_hash_match
            )));
        }
        Ok(())
    }
}
