//! Blob storage for index state that does not live in SQLite.
//!
//! PDCI keeps its projection basis, raw rows, row identities and parameters
//! as opaque blobs next to its sorted-projection database. Blobs are keyed by
//! `"<backend>.<part>"` under the configured index directory.

use crate::error::{IndexError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Trait for blob storage backends.
///
/// Blobs are arbitrary byte sequences stored by name.
pub trait BlobStore {
    /// Store a blob, replacing any previous blob with the same name.
    fn put(&self, name: &str, blob: &[u8]) -> Result<()>;

    /// Retrieve a blob. `Ok(None)` if it was never written.
    fn get(&self, name: &str) -> Result<Option<Vec<u8>>>;

    /// Delete a blob. Deleting a missing blob is not an error.
    fn delete(&self, name: &str) -> Result<()>;

    fn exists(&self, name: &str) -> Result<bool> {
        self.get(name).map(|opt| opt.is_some())
    }
}

/// Serialize `value` with postcard and store it.
pub fn put_value<B: BlobStore + ?Sized, T: Serialize>(store: &B, name: &str, value: &T) -> Result<()> {
    let bytes = postcard::to_allocvec(value)?;
    store.put(name, &bytes)
}

/// Load and deserialize a blob, failing with `NotFound`-style I/O error if absent.
pub fn get_value<B: BlobStore + ?Sized, T: DeserializeOwned>(store: &B, name: &str) -> Result<T> {
    let bytes = store.get(name)?.ok_or_else(|| {
        IndexError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("index blob {name} not found"),
        ))
    })?;
    Ok(postcard::from_bytes(&bytes)?)
}

/// File-based blob storage: one file per blob, flat in the index directory.
#[derive(Debug, Clone)]
pub struct FileBlobStore {
    base_path: PathBuf,
}

impl FileBlobStore {
    /// Create the store, creating `base_path` if needed.
    pub fn new<P: AsRef<Path>>(base_path: P) -> Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_path)?;
        Ok(Self { base_path })
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.base_path.join(name)
    }
}

impl BlobStore for FileBlobStore {
    fn put(&self, name: &str, blob: &[u8]) -> Result<()> {
        let path = self.path(name);

        // Write to a sibling temp file, then rename over the target
        let temp_path = self.path(&format!("{name}.tmp"));
        std::fs::write(&temp_path, blob)?;
        std::fs::rename(&temp_path, &path)?;

        Ok(())
    }

    fn get(&self, name: &str) -> Result<Option<Vec<u8>>> {
        match std::fs::read(self.path(name)) {
            Ok(blob) => Ok(Some(blob)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(IndexError::Io(e)),
        }
    }

    fn delete(&self, name: &str) -> Result<()> {
        match std::fs::remove_file(self.path(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()), // Already deleted
            Err(e) => Err(IndexError::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn put_get_delete() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileBlobStore::new(temp_dir.path()).unwrap();

        store.put("pdci.ids", b"blob content").unwrap();
        assert_eq!(store.get("pdci.ids").unwrap().unwrap(), b"blob content");
        assert!(store.exists("pdci.ids").unwrap());
        assert!(!store.path("pdci.ids.tmp").exists());

        store.delete("pdci.ids").unwrap();
        assert!(!store.exists("pdci.ids").unwrap());
        store.delete("pdci.ids").unwrap();
    }

    #[test]
    fn typed_values_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileBlobStore::new(temp_dir.path()).unwrap();

        let rows: Vec<f32> = vec![0.25, -1.0, 3.5];
        put_value(&store, "pdci.rows", &rows).unwrap();
        let back: Vec<f32> = get_value(&store, "pdci.rows").unwrap();
        assert_eq!(back, rows);
    }

    #[test]
    fn missing_value_is_io_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileBlobStore::new(temp_dir.path()).unwrap();
        let err = get_value::<_, Vec<u8>>(&store, "pdci.basis").unwrap_err();
        match err {
            IndexError::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
            other => panic!("unexpected error: {other}"),
        }
    }
}
