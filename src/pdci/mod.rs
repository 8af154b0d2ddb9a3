//! Prioritized Dynamic Continuous Indexing (PDCI).
//!
//! Exact k-NN in high dimensions degrades to a linear scan. PDCI avoids
//! space partitioning altogether and instead indexes *projections*:
//!
//! 1. Draw `m * L` random unit directions `u_j` once, at `fit`.
//! 2. For every direction keep the rows sorted by `<u_j, x>` (a "simple
//!    index").
//! 3. At query time, walk each simple index outward from `<u_j, q>`. Rows
//!    close to `q` are close along every direction, so they are reached early
//!    in all of them.
//! 4. Simple indices are grouped into `L` composite indices of `m`. Within a
//!    group a priority queue always advances the simple index whose frontier
//!    is nearest; a row becomes a candidate once all `m` have reached it.
//! 5. Candidates of all groups are re-ranked by true Euclidean distance.
//!
//! Work per query is bounded by `k_visit` pops and `k_retrieve` candidates
//! per group (see [`default_budgets`]) and depends on the intrinsic
//! dimensionality of the data rather than the ambient one.
//!
//! [`Pdci`] is the algorithm over a [`RowMatrix`](crate::RowMatrix);
//! [`PdciIndex`] is the [`NeighborIndex`](crate::NeighborIndex) backend
//! that vectorizes samples and persists its state.
//!
//! ## References
//!
//! - Li & Malik (2017). "Fast k-Nearest Neighbour Search via Prioritized DCI"

mod index;
mod search;
mod sorted;

pub use crate::config::PdciParams;
pub use index::PdciIndex;
pub use crate::projection::RandomProjection;
pub use search::{default_budgets, Pdci};
pub use sorted::{ProjectionScan, SortedProjectionStore};
