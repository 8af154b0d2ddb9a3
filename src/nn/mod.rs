//! Exact nearest-neighbor search.
//!
//! The reference backend: every query returns the true Euclidean neighbors.
//! Small corpora are scanned linearly; larger ones go through a
//! [`BallTree`], which prunes whole balls whose closest possible point is
//! already farther than the current k-th best.
//!
//! Similarity is `1 - distance`, capped at 1. Unlike PDCI's `1 / (1 + d)` it
//! goes negative for distant rows; only its order is meaningful.
//!
//! Useful as ground truth for the approximate backends and as the backend
//! of choice when the corpus is small enough that exactness is free.

mod balltree;
mod index;

pub use balltree::BallTree;
pub use index::{nn_similarity, NnIndex};
