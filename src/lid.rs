//! Local Intrinsic Dimensionality (LID) estimation.
//!
//! PDCI's default query budgets depend on the intrinsic dimensionality `d`
//! of the indexed data. When `PdciParams::estimate_intrinsic_dim` is set,
//! `d` is estimated at fit time from the rows themselves instead of falling
//! back to `n / composite_indices`.
//!
//! The MLE estimator (Amsaleg et al., 2015) uses the distances to the `k`
//! nearest neighbors of a point:
//!
//! ```text
//! LID_MLE(x) = -k / Σᵢ log(dᵢ / dₖ)
//! ```
//!
//! Per-point estimates are combined by averaging their inverses
//! (MacKay & Ghahramani), which keeps a few outliers with huge local
//! estimates from dominating.
//!
//! # References
//!
//! - Amsaleg et al. (2015) "Estimating Local Intrinsic Dimensionality"
//! - Levina & Bickel (2004) "Maximum Likelihood Estimation of Intrinsic Dimension"

use crate::distance::k_nearest;
use crate::vectorize::RowMatrix;
use serde::{Deserialize, Serialize};

/// Result of LID estimation for a single point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LidEstimate {
    /// Estimated local intrinsic dimensionality.
    pub lid: f32,
    /// Number of neighbors used in estimation.
    pub k: usize,
    /// Distance to the k-th neighbor.
    pub max_dist: f32,
}

/// LID estimation configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LidConfig {
    /// Neighbors per point.
    pub k: usize,
    /// Relative floor on distances, avoiding `log(0)` on duplicates.
    pub epsilon: f32,
    /// At most this many rows are used as query points.
    pub max_points: usize,
}

impl Default for LidConfig {
    fn default() -> Self {
        Self {
            k: 20,
            epsilon: 1e-10,
            max_points: 256,
        }
    }
}

/// MLE estimate from ascending neighbor distances.
///
/// Fewer than two distances give `NaN`; all-equal distances give infinity.
#[must_use]
pub fn estimate_lid_mle(sorted_distances: &[f32], config: &LidConfig) -> LidEstimate {
    let k = sorted_distances.len().min(config.k);
    if k < 2 {
        return LidEstimate {
            lid: f32::NAN,
            k,
            max_dist: sorted_distances.first().copied().unwrap_or(0.0),
        };
    }

    let d_k = sorted_distances[k - 1];
    let abs_epsilon = d_k * config.epsilon;
    let d_k = d_k.max(abs_epsilon);

    let mut sum_log = 0.0f32;
    let mut valid_count = 0;
    for &d_i in &sorted_distances[..k] {
        let ratio = d_i.max(abs_epsilon) / d_k;
        if ratio > 0.0 && ratio < 1.0 {
            sum_log += ratio.ln();
            valid_count += 1;
        }
    }

    let lid = if valid_count > 0 && sum_log.abs() > abs_epsilon {
        -(valid_count as f32) / sum_log
    } else {
        f32::INFINITY
    };

    LidEstimate {
        lid,
        k,
        max_dist: d_k,
    }
}

/// Dataset-level intrinsic dimensionality of `rows` under Euclidean distance.
///
/// Query points are spread evenly over the rows, up to
/// `config.max_points`. Returns `None` when no point yields a finite
/// positive estimate (too few rows, or every row identical).
pub fn estimate_intrinsic_dim(rows: &RowMatrix, config: &LidConfig) -> Option<f64> {
    let n = rows.num_rows();
    if n < 3 || config.k < 2 {
        return None;
    }
    let points = config.max_points.clamp(1, n);
    let step = n / points;

    let mut inverse_sum = 0.0f64;
    let mut used = 0usize;
    for i in (0..n).step_by(step.max(1)).take(points) {
        let distances: Vec<f32> = k_nearest(rows.row(i), rows, config.k + 1)
            .into_iter()
            .filter(|&(_, offset)| offset != i)
            .map(|(d, _)| d)
            .collect();
        let estimate = estimate_lid_mle(&distances, config);
        if estimate.lid.is_finite() && estimate.lid > 0.0 {
            inverse_sum += 1.0 / f64::from(estimate.lid);
            used += 1;
        }
    }
    (used > 0 && inverse_sum > 0.0).then(|| used as f64 / inverse_sum)
}
