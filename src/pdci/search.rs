//! The PDCI algorithm over a dense row matrix.

use crate::projection::RandomProjection;
use super::sorted::{ProjectionScan, SortedProjectionStore};
use crate::ann::QueryOptions;
use crate::config::PdciParams;
use crate::distance::l2_distance;
use crate::error::{IndexError, Result};
use crate::lid::{estimate_intrinsic_dim, LidConfig};
use crate::vectorize::RowMatrix;
use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeSet, BinaryHeap, HashMap};
use tracing::{debug, info};

/// Per-group priority queue entry: a row seen by one simple index.
#[derive(Debug, Clone, Copy)]
struct QueueEntry {
    dist: f64,
    simple: usize,
    row: usize,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.dist
            .total_cmp(&other.dist)
            .then(self.simple.cmp(&other.simple))
            .then(self.row.cmp(&other.row))
    }
}

/// Default `(k_retrieve, k_visit)` for a corpus of `n` rows.
///
/// ```text
/// k_retrieve = ceil( k * max( ln(n/k), (n/k)^(1 - m/d) ) )
/// k_visit    = ceil( m * k * max( ln(n/k), (n/k)^(1 - 1/d) ) )
/// ```
///
/// clamped below by `k` and `m * k`.
pub fn default_budgets(n: usize, k: usize, m: usize, d: f64) -> (usize, usize) {
    if k == 0 {
        return (0, 0);
    }
    let ratio = n as f64 / k as f64;
    let kf = k as f64;
    let mf = m as f64;
    let retrieve = (kf * ratio.ln().max(ratio.powf(1.0 - mf / d))).ceil();
    let visit = (mf * kf * ratio.ln().max(ratio.powf(1.0 - 1.0 / d))).ceil();
    // float-to-int casts saturate, and NaN maps to 0
    ((retrieve as usize).max(k), (visit as usize).max(m * k))
}

/// Prioritized Dynamic Continuous Indexing.
///
/// `m * L` random unit directions are split into `L` composite groups of
/// `m` simple indices. A query walks every simple index outward from its own
/// projection; a row becomes a candidate for a group once every simple index
/// of that group has reached it. Candidates from all groups are ranked by
/// exact Euclidean distance.
pub struct Pdci {
    params: PdciParams,
    projection: Option<RandomProjection>,
    rows: RowMatrix,
    store: SortedProjectionStore,
    estimated_dim: Option<f64>,
}

impl Pdci {
    pub fn new(params: PdciParams, store: SortedProjectionStore) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            params,
            projection: None,
            rows: RowMatrix::new(0),
            store,
            estimated_dim: None,
        })
    }

    /// Reassemble a fitted index from saved state.
    ///
    /// `store` must already hold exactly the projections of `rows`.
    pub fn from_parts(
        params: PdciParams,
        projection: RandomProjection,
        rows: RowMatrix,
        mut store: SortedProjectionStore,
    ) -> Result<Self> {
        params.validate()?;
        if projection.num_projections() != params.num_projections() {
            return Err(IndexError::InvalidParameter(format!(
                "basis has {} directions, parameters need {}",
                projection.num_projections(),
                params.num_projections()
            )));
        }
        if !rows.is_empty() && rows.dimension() != projection.dimension() {
            return Err(IndexError::DimensionMismatch {
                expected: projection.dimension(),
                actual: rows.dimension(),
            });
        }
        store.attach(projection.num_projections())?;
        let stored = store.len()?;
        if stored != rows.num_rows() {
            return Err(IndexError::Serialization(format!(
                "sorted-projection store has {stored} rows, saved matrix has {}",
                rows.num_rows()
            )));
        }
        Ok(Self {
            params,
            projection: Some(projection),
            rows,
            store,
            estimated_dim: None,
        })
    }

    /// Restore a fit-time intrinsic dimensionality estimate.
    pub fn with_estimated_dim(mut self, estimated_dim: Option<f64>) -> Self {
        self.estimated_dim = estimated_dim.filter(|d| d.is_finite() && *d > 0.0);
        self
    }

    /// Intrinsic dimensionality estimated at the last `fit`, if enabled.
    pub fn estimated_dim(&self) -> Option<f64> {
        self.estimated_dim
    }

    pub fn params(&self) -> &PdciParams {
        &self.params
    }

    pub fn projection(&self) -> Option<&RandomProjection> {
        self.projection.as_ref()
    }

    pub fn rows(&self) -> &RowMatrix {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.num_rows()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn fitted(&self) -> Result<&RandomProjection> {
        self.projection.as_ref().ok_or(IndexError::NotFitted("pdci"))
    }

    /// Draw a fresh basis and index `xs`, discarding previous state.
    pub fn fit(&mut self, xs: &RowMatrix) -> Result<()> {
        if xs.is_empty() {
            return Err(IndexError::InvalidParameter(
                "cannot fit PDCI on an empty batch".into(),
            ));
        }
        // checked before init drops the previous tables
        xs.ensure_finite()?;
        let n = self.params.num_projections();
        let seed = self.params.seed.unwrap_or_else(rand::random);
        let projection = RandomProjection::gaussian(n, xs.dimension(), seed)?;
        self.store.init(n)?;
        self.projection = Some(projection);
        self.rows = RowMatrix::new(xs.dimension());
        self.partial_fit(xs)?;
        self.estimated_dim = if self.params.estimate_intrinsic_dim {
            estimate_intrinsic_dim(xs, &LidConfig::default())
        } else {
            None
        };
        info!(
            rows = xs.num_rows(),
            dim = xs.dimension(),
            projections = n,
            seed,
            estimated_dim = ?self.estimated_dim,
            "pdci fit"
        );
        Ok(())
    }

    /// Append `xs` using the frozen basis.
    pub fn partial_fit(&mut self, xs: &RowMatrix) -> Result<()> {
        let projection = self.fitted()?;
        if xs.is_empty() {
            return Ok(());
        }
        xs.ensure_finite()?;
        let projected = projection.project_matrix(xs)?;
        self.store.insert(self.rows.num_rows(), &projected)?;
        self.rows.extend(xs)?;
        Ok(())
    }

    /// Budgets for a `k`-NN query, honoring explicit overrides.
    ///
    /// `d` is the configured `intrinsic_dim`, else the fit-time estimate,
    /// else `n / composite_indices`.
    pub fn budgets(&self, k: usize, options: &QueryOptions) -> Result<(usize, usize)> {
        self.fitted()?;
        let d = self
            .params
            .intrinsic_dim
            .or(self.estimated_dim)
            .unwrap_or(self.len() as f64 / self.params.composite_indices as f64);
        let (retrieve, visit) = default_budgets(self.len(), k, self.params.simple_indices, d);
        Ok((
            options.k_retrieve.unwrap_or(retrieve),
            options.k_visit.unwrap_or(visit),
        ))
    }

    /// Approximate `k` nearest rows to `x` as `(distance, row offset)`,
    /// ascending by distance, ties by offset.
    pub fn query(&self, x: &[f32], k: usize, options: &QueryOptions) -> Result<Vec<(f32, usize)>> {
        let projection = self.fitted()?;
        let coords = projection.project(x)?;
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }
        let (k_retrieve, k_visit) = self.budgets(k, options)?;
        let m = self.params.simple_indices;

        let mut scans = coords
            .iter()
            .enumerate()
            .map(|(j, &pivot)| self.store.scan(j, pivot))
            .collect::<Result<Vec<_>>>()?;

        let mut union = BTreeSet::new();
        let mut visited = 0;
        for l in 0..self.params.composite_indices {
            let (candidates, visits) = collect_group(&mut scans, l * m..(l + 1) * m, k_retrieve, k_visit)?;
            visited += visits;
            union.extend(candidates);
        }

        let mut ranked: Vec<(f32, usize)> = union
            .into_iter()
            .map(|row| (l2_distance(x, self.rows.row(row)), row))
            .collect();
        ranked.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        ranked.truncate(k);

        debug!(k, k_retrieve, k_visit, visited, returned = ranked.len(), "pdci query");
        Ok(ranked)
    }
}

/// Run one composite group: pop up to `k_visit` entries, admitting a row
/// once all of the group's simple indices have produced it.
fn collect_group(
    scans: &mut [ProjectionScan<'_>],
    group: std::ops::Range<usize>,
    k_retrieve: usize,
    k_visit: usize,
) -> Result<(BTreeSet<usize>, usize)> {
    let m = group.len();
    let mut queue = BinaryHeap::with_capacity(m);
    for j in group {
        if let Some((dist, row)) = scans[j].next_nearest()? {
            queue.push(Reverse(QueueEntry { dist, simple: j, row }));
        }
    }

    let mut observations: HashMap<usize, usize> = HashMap::new();
    let mut candidates = BTreeSet::new();
    let mut visits = 0;
    while visits < k_visit && candidates.len() < k_retrieve {
        let Some(Reverse(entry)) = queue.pop() else {
            break;
        };
        visits += 1;
        if let Some((dist, row)) = scans[entry.simple].next_nearest()? {
            queue.push(Reverse(QueueEntry {
                dist,
                simple: entry.simple,
                row,
            }));
        }
        let seen = observations.entry(entry.row).or_insert(0);
        *seen += 1;
        if *seen == m {
            candidates.insert(entry.row);
        }
    }
    Ok((candidates, visits))
}
