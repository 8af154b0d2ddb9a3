//! LSH forest: cosine neighbors through random-hyperplane hash prefixes.
//!
//! Cheap to build and to extend: a new row costs one hash per tree and a
//! sorted insert. Results are re-ranked by exact cosine distance, so
//! similarity is `1 - distance`, capped at 1.
//!
//! Defaults mirror the classic LSH forest setup: 20 trees, 50 candidates,
//! prefixes no shorter than 4 bits.

mod forest;
mod index;

pub use forest::{LshForest, HASH_BITS};
pub use index::{lsh_similarity, LshForestIndex};
