//! Disk persistence for kindred indexes.
//!
//! Each backend keeps its state under the configured index directory, keyed
//! by backend name:
//!
//! ```text
//! <index_dir>/
//! ├── metadata.db     # sample store
//! ├── ctph.db         # sample, digest and chunk_posting tables
//! ├── pdci.db         # one index_i table per projection
//! ├── pdci.basis      # postcard blobs written on save()
//! ├── pdci.rows
//! ├── pdci.ids
//! ├── pdci.lid        # only with estimate_intrinsic_dim
//! ├── pdci.params     # written last
//! ├── nn.rows, nn.ids, nn.tree, nn.params
//! ├── hnsw.graph, hnsw.ids, hnsw.params
//! └── lsh_forest.rows, lsh_forest.ids, lsh_forest.forest, lsh_forest.params
//! ```
//!
//! Every blob-backed `save()` deletes its `*.params` blob first and writes it
//! last, and `load()` treats a missing `*.params` as "never saved". An
//! interrupted save therefore reads back as unfitted, never as a mix of old
//! and new blobs.
//!
//! Index state is rebuildable from source features, so there is no WAL or
//! repair path: a corrupt or missing file surfaces as an error and the
//! caller refits.

pub mod blob_store;
pub mod sqlite;

pub use blob_store::{BlobStore, FileBlobStore};
