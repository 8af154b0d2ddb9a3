//! Recall checks for approximate backends.
//!
//! Synthetic datasets, exact brute-force neighbors and recall@k, shared by
//! the PDCI tests and the criterion bench so both measure against the same
//! Euclidean ground truth.

pub mod datasets;
pub mod metrics;

pub use datasets::{
    compute_ground_truth, create_clustered_dataset, create_uniform_dataset, rows_to_samples,
    Dataset,
};
pub use metrics::{mean_recall, recall_at_k};
