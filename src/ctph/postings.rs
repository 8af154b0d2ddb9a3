//! Chunk posting store: `(block_size, chunk) -> sample` lookups in SQLite.

use super::digest::Digest;
use crate::error::Result;
use crate::persistence::sqlite;
use crate::sample::SampleId;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::collections::BTreeSet;
use std::path::Path;

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS sample (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  identity TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS digest (
  id INTEGER PRIMARY KEY REFERENCES sample(id),
  hash TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS chunk_posting (
  id INTEGER NOT NULL REFERENCES sample(id),
  block_size INTEGER NOT NULL,
  chunk INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS chunk_size_idx ON chunk_posting(block_size);
CREATE INDEX IF NOT EXISTS chunk_idx ON chunk_posting(chunk);
";

const DROP_SQL: &str = "
DROP INDEX IF EXISTS chunk_idx;
DROP INDEX IF EXISTS chunk_size_idx;
DROP TABLE IF EXISTS chunk_posting;
DROP TABLE IF EXISTS digest;
DROP TABLE IF EXISTS sample;
";

/// Rows per `IN (...)` list, well under SQLite's bound-parameter limit.
const MAX_IN_PARAMS: usize = 500;

fn placeholders(n: usize, first: usize) -> String {
    (first..first + n)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Postings and digests of every indexed sample.
pub struct ChunkPostingStore {
    conn: Connection,
}

impl ChunkPostingStore {
    /// Open the database file without touching its schema.
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            conn: sqlite::open(path)?,
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            conn: sqlite::open_in_memory()?,
        })
    }

    /// Whether the tables have been created.
    pub fn is_initialized(&self) -> Result<bool> {
        sqlite::table_exists(&self.conn, "chunk_posting")
    }

    /// Create the tables and indices if missing.
    pub fn initialize(&self) -> Result<()> {
        self.conn.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    /// Drop everything and recreate an empty schema.
    pub fn reset(&mut self) -> Result<()> {
        sqlite::with_transaction(&mut self.conn, |tx| {
            tx.execute_batch(DROP_SQL)?;
            tx.execute_batch(SCHEMA_SQL)?;
            Ok(())
        })
    }

    /// Index one digest under `id`, in a single transaction.
    ///
    /// Returns `false` without writing if `id` already has a digest: the
    /// identity is a content hash, so its digest cannot have changed.
    pub fn add(&mut self, id: &SampleId, digest: &Digest) -> Result<bool> {
        let (block_chunks, double_chunks) = digest.chunks();
        let block_size = digest.block_size() as i64;
        let hash = digest.to_string();

        sqlite::with_transaction(&mut self.conn, |tx| {
            tx.execute(
                "INSERT OR IGNORE INTO sample (identity) VALUES (?1)",
                params![id.as_str()],
            )?;
            let row: i64 = tx.query_row(
                "SELECT id FROM sample WHERE identity = ?1",
                params![id.as_str()],
                |r| r.get(0),
            )?;
            let existing: Option<i64> = tx
                .query_row("SELECT id FROM digest WHERE id = ?1", params![row], |r| r.get(0))
                .optional()?;
            if existing.is_some() {
                return Ok(false);
            }

            tx.execute(
                "INSERT INTO digest (id, hash) VALUES (?1, ?2)",
                params![row, hash],
            )?;
            let mut insert = tx.prepare_cached(
                "INSERT INTO chunk_posting (id, block_size, chunk) VALUES (?1, ?2, ?3)",
            )?;
            for chunk in block_chunks.iter().chain(double_chunks.iter()) {
                insert.execute(params![row, block_size, *chunk as i64])?;
            }
            Ok(true)
        })
    }

    /// Row ids with a posting at `block_size` for any of `chunks`.
    pub fn lookup(&self, block_size: u64, chunks: &BTreeSet<u64>) -> Result<BTreeSet<i64>> {
        let mut rows = BTreeSet::new();
        let chunks: Vec<i64> = chunks.iter().map(|&c| c as i64).collect();
        for batch in chunks.chunks(MAX_IN_PARAMS) {
            let sql = format!(
                "SELECT DISTINCT id FROM chunk_posting WHERE block_size = ?1 AND chunk IN ({})",
                placeholders(batch.len(), 2)
            );
            let mut stmt = self.conn.prepare(&sql)?;
            let values = std::iter::once(block_size as i64).chain(batch.iter().copied());
            let ids = stmt.query_map(params_from_iter(values), |r| r.get::<_, i64>(0))?;
            for id in ids {
                rows.insert(id?);
            }
        }
        Ok(rows)
    }

    /// Identity and digest string of each row, ascending by row id,
    /// skipping `exclude`.
    pub fn digests_for(
        &self,
        rows: &BTreeSet<i64>,
        exclude: &SampleId,
    ) -> Result<Vec<(SampleId, String)>> {
        let rows: Vec<i64> = rows.iter().copied().collect();
        let mut out = Vec::with_capacity(rows.len());
        for batch in rows.chunks(MAX_IN_PARAMS) {
            let sql = format!(
                "SELECT s.identity, d.hash FROM digest AS d
                 JOIN sample AS s ON s.id = d.id
                 WHERE s.identity != ?1 AND d.id IN ({})
                 ORDER BY d.id",
                placeholders(batch.len(), 2)
            );
            let mut stmt = self.conn.prepare(&sql)?;
            let exclude_param: rusqlite::types::Value = exclude.as_str().to_string().into();
            let values = std::iter::once(exclude_param)
                .chain(batch.iter().map(|&r| rusqlite::types::Value::Integer(r)));
            let found = stmt.query_map(params_from_iter(values), |r| {
                Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
            })?;
            for item in found {
                let (identity, hash) = item?;
                out.push((SampleId::new(identity)?, hash));
            }
        }
        Ok(out)
    }

    /// Number of samples with a digest.
    pub fn count(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM digest", [], |r| r.get(0))?;
        Ok(n as usize)
    }

    /// Number of postings, for diagnostics.
    pub fn posting_count(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM chunk_posting", [], |r| r.get(0))?;
        Ok(n as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ChunkPostingStore {
        let store = ChunkPostingStore::open_in_memory().unwrap();
        store.initialize().unwrap();
        store
    }

    fn id(tag: &str) -> SampleId {
        SampleId::of_content(tag.as_bytes())
    }

    #[test]
    fn add_writes_one_posting_per_distinct_chunk() {
        let mut s = store();
        let d = Digest::parse("48:ABCDEFGHI:ABCDEFGH").unwrap();
        assert!(s.add(&id("a"), &d).unwrap());
        // 3 windows in the first half, 2 in the second
        assert_eq!(s.posting_count().unwrap(), 5);
        assert_eq!(s.count().unwrap(), 1);
    }

    #[test]
    fn re_adding_an_identity_is_a_no_op() {
        let mut s = store();
        let d = Digest::parse("48:ABCDEFGHI:ABCDEFGH").unwrap();
        assert!(s.add(&id("a"), &d).unwrap());
        assert!(!s.add(&id("a"), &d).unwrap());
        assert_eq!(s.posting_count().unwrap(), 5);
    }

    #[test]
    fn lookup_returns_every_matching_row() {
        let mut s = store();
        let shared = Digest::parse("48:ABCDEFGHIJ:").unwrap();
        s.add(&id("a"), &shared).unwrap();
        s.add(&id("b"), &shared).unwrap();
        s.add(&id("c"), &Digest::parse("48:zyxwvutsrq:").unwrap()).unwrap();
        // same chunks, other block size
        s.add(&id("d"), &Digest::parse("96:ABCDEFGHIJ:").unwrap()).unwrap();

        let (chunks, _) = shared.chunks();
        let rows = s.lookup(48, &chunks).unwrap();
        assert_eq!(rows.len(), 2);

        let found = s.digests_for(&rows, &id("a")).unwrap();
        assert_eq!(found, vec![(id("b"), "48:ABCDEFGHIJ:".to_string())]);
    }

    #[test]
    fn lookup_of_nothing_is_empty() {
        let s = store();
        assert!(s.lookup(3, &BTreeSet::new()).unwrap().is_empty());
        assert!(s.digests_for(&BTreeSet::new(), &id("x")).unwrap().is_empty());
    }

    #[test]
    fn reset_clears_postings() {
        let mut s = store();
        s.add(&id("a"), &Digest::parse("48:ABCDEFGHIJ:").unwrap()).unwrap();
        s.reset().unwrap();
        assert_eq!(s.count().unwrap(), 0);
        assert_eq!(s.posting_count().unwrap(), 0);
        assert!(s.is_initialized().unwrap());
    }
}
