//! Random unit projection basis.
//!
//! PDCI walks rows sorted along each direction; the LSH forest keeps only
//! the sign of each coordinate.

use crate::distance::{dot, norm, normalize_in_place};
use crate::error::{IndexError, Result};
use crate::vectorize::RowMatrix;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};

/// `n` unit vectors in `d` dimensions, drawn once and then frozen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomProjection {
    basis: RowMatrix,
}

impl RandomProjection {
    /// Draw `n` directions uniformly on the unit sphere in `d` dimensions.
    ///
    /// Each direction is a standard normal vector scaled to unit length.
    pub fn gaussian(n: usize, d: usize, seed: u64) -> Result<Self> {
        if n == 0 || d == 0 {
            return Err(IndexError::InvalidParameter(format!(
                "projection basis needs n > 0 and d > 0 (got n={n}, d={d})"
            )));
        }
        let mut rng = StdRng::seed_from_u64(seed);
        let mut basis = RowMatrix::new(d);
        let mut direction = vec![0.0f32; d];
        for _ in 0..n {
            // redraw the (practically impossible) zero vector
            loop {
                for x in direction.iter_mut() {
                    *x = StandardNormal.sample(&mut rng);
                }
                if norm(&direction) > 0.0 {
                    break;
                }
            }
            normalize_in_place(&mut direction);
            basis.push_row(&direction)?;
        }
        Ok(Self { basis })
    }

    /// Use the rows of `basis` as directions, unchanged.
    pub fn from_directions(basis: RowMatrix) -> Result<Self> {
        if basis.is_empty() {
            return Err(IndexError::InvalidParameter(
                "projection basis has no directions".into(),
            ));
        }
        Ok(Self { basis })
    }

    pub fn num_projections(&self) -> usize {
        self.basis.num_rows()
    }

    /// Input dimensionality.
    pub fn dimension(&self) -> usize {
        self.basis.dimension()
    }

    pub fn direction(&self, j: usize) -> &[f32] {
        self.basis.row(j)
    }

    /// Coordinates of `x` along every direction.
    pub fn project(&self, x: &[f32]) -> Result<Vec<f64>> {
        if x.len() != self.dimension() {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension(),
                actual: x.len(),
            });
        }
        Ok(self.basis.rows().map(|u| f64::from(dot(u, x))).collect())
    }

    /// Sign bits of `x` against the first 32 directions starting at
    /// `offset`, first direction in the most significant bit. Zero counts as
    /// positive.
    pub fn sign_hash(&self, x: &[f32], offset: usize) -> Result<u32> {
        if x.len() != self.dimension() {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension(),
                actual: x.len(),
            });
        }
        if offset + 32 > self.num_projections() {
            return Err(IndexError::InvalidParameter(format!(
                "hash needs directions {offset}..{} but the basis has {}",
                offset + 32,
                self.num_projections()
            )));
        }
        Ok((0..32).fold(0u32, |hash, bit| {
            let positive = dot(self.direction(offset + bit), x) >= 0.0;
            (hash << 1) | u32::from(positive)
        }))
    }

    /// Project every row of `xs`.
    pub fn project_matrix(&self, xs: &RowMatrix) -> Result<Vec<Vec<f64>>> {
        if !xs.is_empty() && xs.dimension() != self.dimension() {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension(),
                actual: xs.dimension(),
            });
        }
        xs.rows().map(|row| self.project(row)).collect()
    }
}
