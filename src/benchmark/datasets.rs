//! Synthetic datasets and brute-force ground truth.

use crate::distance::k_nearest;
use crate::error::Result;
use crate::sample::{FeatureValue, Sample};
use crate::vectorize::RowMatrix;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Rows to index plus held-out query rows.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub train: RowMatrix,
    pub test: RowMatrix,
}

impl Dataset {
    pub fn dimension(&self) -> usize {
        self.train.dimension()
    }

    /// Exact k-NN of every test row against the train rows.
    pub fn ground_truth(&self, k: usize) -> Vec<Vec<usize>> {
        self.test
            .rows()
            .map(|q| compute_ground_truth(q, &self.train, k))
            .collect()
    }
}

fn gaussian(rng: &mut StdRng) -> f32 {
    // Box-Muller; 1 - u keeps the log argument in (0, 1]
    let u1: f32 = 1.0 - rng.random::<f32>();
    let u2: f32 = rng.random();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f32::consts::PI * u2).cos()
}

/// Uniform rows in `[0, 1]^d`.
pub fn create_uniform_dataset(
    n_train: usize,
    n_test: usize,
    dimension: usize,
    seed: u64,
) -> Result<Dataset> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut draw = |n: usize| -> Result<RowMatrix> {
        let mut m = RowMatrix::new(dimension);
        let mut row = vec![0.0f32; dimension];
        for _ in 0..n {
            row.iter_mut().for_each(|x| *x = rng.random());
            m.push_row(&row)?;
        }
        Ok(m)
    };
    let train = draw(n_train)?;
    let test = draw(n_test)?;
    Ok(Dataset { train, test })
}

/// Gaussian blobs around `n_clusters` uniform centers.
///
/// Clustered data has low intrinsic dimensionality relative to `dimension`,
/// which is where PDCI's budgets pay off.
pub fn create_clustered_dataset(
    n_train: usize,
    n_test: usize,
    dimension: usize,
    n_clusters: usize,
    cluster_std: f32,
    seed: u64,
) -> Result<Dataset> {
    let mut rng = StdRng::seed_from_u64(seed);
    let n_clusters = n_clusters.max(1);
    let centers: Vec<Vec<f32>> = (0..n_clusters)
        .map(|_| (0..dimension).map(|_| rng.random::<f32>()).collect())
        .collect();

    let mut draw = |n: usize| -> Result<RowMatrix> {
        let mut m = RowMatrix::new(dimension);
        for _ in 0..n {
            let center = &centers[rng.random_range(0..n_clusters)];
            let row: Vec<f32> = center
                .iter()
                .map(|&c| c + gaussian(&mut rng) * cluster_std)
                .collect();
            m.push_row(&row)?;
        }
        Ok(m)
    };
    let train = draw(n_train)?;
    let test = draw(n_test)?;
    Ok(Dataset { train, test })
}

/// Offsets of the `k` rows of `database` nearest to `query`, ties by offset.
pub fn compute_ground_truth(query: &[f32], database: &RowMatrix, k: usize) -> Vec<usize> {
    k_nearest(query, database, k)
        .into_iter()
        .map(|(_, i)| i)
        .collect()
}

/// Wrap each row as a sample carrying it under `feature`.
///
/// Identities are content hashes of `"{prefix}-{offset}"`.
pub fn rows_to_samples(rows: &RowMatrix, feature: &str, prefix: &str) -> Vec<Sample> {
    rows.rows()
        .enumerate()
        .map(|(i, row)| {
            Sample::from_content(format!("{prefix}-{i}").as_bytes())
                .with(feature, FeatureValue::Vector(row.to_vec()))
        })
        .collect()
}
