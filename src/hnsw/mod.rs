//! Hierarchical Navigable Small World graphs.
//!
//! Approximate cosine neighbors. Vectors are normalized on insertion, so
//! distance is `1 - dot` and similarity is `1 - distance`, the cosine
//! itself.
//!
//! | Parameter | Default | Effect |
//! |-----------|---------|--------|
//! | `m` | 12 | links per node; layer 0 allows `2m` |
//! | `ef_construction` | 400 | insertion beam width |
//! | `ef` | 200 | query beam width |
//!
//! The graph grows one node at a time, so `partial_fit` inserts without a
//! rebuild. Layer assignment is seeded per node, which makes a graph a pure
//! function of its seed and insertion order.

mod graph;
mod index;
mod search;

pub use graph::HnswGraph;
pub use index::HnswIndex;
