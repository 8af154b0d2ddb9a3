//! Sample/feature store.
//!
//! The index contract hydrates neighbor identities into full samples through
//! a [`SampleStore`]. [`SqliteSampleStore`] is the embedded reference
//! implementation (`metadata.db` in the index directory).

use super::{Sample, SampleId};
use crate::config::IndexConfig;
use crate::error::{IndexError, Result};
use crate::persistence::sqlite;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS sample (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  identity TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS sample_feature (
  id INTEGER PRIMARY KEY REFERENCES sample(id),
  features BLOB NOT NULL
);
";

/// File name of the sample store under the index directory.
pub const SAMPLE_STORE_FILE: &str = "metadata.db";

/// Persistent store of serialized sample features keyed by identity.
pub trait SampleStore {
    /// Load one sample, `None` if its features were never inserted.
    fn load_sample(&self, id: &SampleId) -> Result<Option<Sample>>;

    /// Load many samples, in input order, silently skipping absent ones.
    fn load_samples(&self, ids: &[SampleId]) -> Result<Vec<Sample>> {
        let mut samples = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(sample) = self.load_sample(id)? {
                samples.push(sample);
            }
        }
        Ok(samples)
    }

    /// Insert or replace the serialized features of a sample.
    fn insert_sample_features(&mut self, id: &SampleId, features: &[u8]) -> Result<()>;

    fn sample_features_exists(&self, id: &SampleId) -> Result<bool>;

    /// Number of known sample identities.
    fn count(&self) -> Result<usize>;

    /// Serialize and insert a sample.
    fn insert_sample(&mut self, sample: &Sample) -> Result<()> {
        let bytes = sample.serialize()?;
        self.insert_sample_features(sample.id(), &bytes)
    }
}

/// SQLite-backed [`SampleStore`].
pub struct SqliteSampleStore {
    conn: Connection,
}

impl SqliteSampleStore {
    /// Open or create the store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = sqlite::open(path.as_ref())?;
        Self::with_connection(conn)
    }

    /// Open `metadata.db` under the configured index directory.
    pub fn open_in(config: &IndexConfig) -> Result<Self> {
        Self::open(config.index_path(SAMPLE_STORE_FILE))
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(sqlite::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self { conn })
    }

    fn lookup_row(&self, id: &SampleId) -> Result<Option<i64>> {
        self.conn
            .query_row(
                "SELECT id FROM sample WHERE identity = ?1",
                params![id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(IndexError::from)
    }

    fn feature_blob(&self, id: &SampleId) -> Result<Option<Vec<u8>>> {
        self.conn
            .query_row(
                "SELECT f.features FROM sample_feature AS f
                 JOIN sample AS s ON s.id = f.id
                 WHERE s.identity = ?1",
                params![id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(IndexError::from)
    }
}

impl SampleStore for SqliteSampleStore {
    fn load_sample(&self, id: &SampleId) -> Result<Option<Sample>> {
        match self.feature_blob(id)? {
            Some(bytes) => Ok(Some(Sample::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn insert_sample_features(&mut self, id: &SampleId, features: &[u8]) -> Result<()> {
        sqlite::with_transaction(&mut self.conn, |tx| {
            tx.execute(
                "INSERT OR IGNORE INTO sample (identity) VALUES (?1)",
                params![id.as_str()],
            )?;
            let row: i64 = tx.query_row(
                "SELECT id FROM sample WHERE identity = ?1",
                params![id.as_str()],
                |row| row.get(0),
            )?;
            tx.execute(
                "INSERT OR REPLACE INTO sample_feature (id, features) VALUES (?1, ?2)",
                params![row, features],
            )?;
            Ok(())
        })
    }

    fn sample_features_exists(&self, id: &SampleId) -> Result<bool> {
        let Some(row) = self.lookup_row(id)? else {
            return Ok(false);
        };
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sample_feature WHERE id = ?1",
            params![row],
            |r| r.get(0),
        )?;
        Ok(n > 0)
    }

    fn count(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(id) FROM sample", [], |row| row.get(0))?;
        Ok(n as usize)
    }
}
