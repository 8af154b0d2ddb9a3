//! Sorted-projection store: one SQLite table per projection direction.
//!
//! `index_j(key TEXT, value REAL)` holds `(row offset, projected value)` for
//! direction `j`, indexed on `value`. A [`ProjectionScan`] walks outward from
//! a pivot in both directions at once, always yielding the entry nearest the
//! pivot next.

use crate::error::{IndexError, Result};
use crate::persistence::sqlite;
use rusqlite::{params, Connection};
use std::collections::VecDeque;
use std::path::Path;

/// Rows fetched per cursor page.
const PAGE_SIZE: i64 = 64;

fn table(j: usize) -> String {
    format!("index_{j}")
}

/// Per-direction sorted `(value, row offset)` entries.
pub struct SortedProjectionStore {
    conn: Connection,
    num_indices: usize,
}

impl SortedProjectionStore {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            conn: sqlite::open(path)?,
            num_indices: 0,
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            conn: sqlite::open_in_memory()?,
            num_indices: 0,
        })
    }

    pub fn num_indices(&self) -> usize {
        self.num_indices
    }

    /// Drop every existing direction table and create `n` empty ones.
    pub fn init(&mut self, n: usize) -> Result<()> {
        let stale: Vec<String> = {
            let mut stmt = self.conn.prepare(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name LIKE 'index\\_%' ESCAPE '\\'",
            )?;
            let names = stmt.query_map([], |r| r.get(0))?;
            names.collect::<rusqlite::Result<_>>()?
        };
        sqlite::with_transaction(&mut self.conn, |tx| {
            for name in &stale {
                tx.execute_batch(&format!("DROP TABLE IF EXISTS {name};"))?;
            }
            for j in 0..n {
                let t = table(j);
                tx.execute_batch(&format!(
                    "CREATE TABLE {t} (key TEXT NOT NULL, value REAL NOT NULL);
                     CREATE INDEX value_idx_{j} ON {t} (value);"
                ))?;
            }
            Ok(())
        })?;
        self.num_indices = n;
        Ok(())
    }

    /// Reattach to `n` existing direction tables.
    pub fn attach(&mut self, n: usize) -> Result<()> {
        for j in 0..n {
            if !sqlite::table_exists(&self.conn, &table(j))? {
                return Err(IndexError::NotFitted("pdci"));
            }
        }
        self.num_indices = n;
        Ok(())
    }

    /// Insert projected rows; `projected[i][j]` is row `offset + i` along
    /// direction `j`. One transaction for the whole batch.
    pub fn insert(&mut self, offset: usize, projected: &[Vec<f64>]) -> Result<()> {
        let n = self.num_indices;
        if let Some(bad) = projected.iter().find(|p| p.len() != n) {
            return Err(IndexError::DimensionMismatch {
                expected: n,
                actual: bad.len(),
            });
        }
        sqlite::with_transaction(&mut self.conn, |tx| {
            for j in 0..n {
                let mut stmt = tx.prepare_cached(&format!(
                    "INSERT INTO {} (key, value) VALUES (?1, ?2)",
                    table(j)
                ))?;
                for (i, coords) in projected.iter().enumerate() {
                    stmt.execute(params![(offset + i).to_string(), coords[j]])?;
                }
            }
            Ok(())
        })
    }

    /// Number of rows indexed.
    pub fn len(&self) -> Result<usize> {
        if self.num_indices == 0 {
            return Ok(0);
        }
        let n: i64 = self.conn.query_row(
            &format!("SELECT COUNT(value) FROM {}", table(0)),
            [],
            |r| r.get(0),
        )?;
        Ok(n as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Scan direction `j` outward from `pivot`.
    pub fn scan(&self, j: usize, pivot: f64) -> Result<ProjectionScan<'_>> {
        if j >= self.num_indices {
            return Err(IndexError::InvalidParameter(format!(
                "simple index {j} out of range ({} indices)",
                self.num_indices
            )));
        }
        Ok(ProjectionScan {
            conn: &self.conn,
            table: table(j),
            pivot,
            up: Cursor::new(Direction::Ascending),
            down: Cursor::new(Direction::Descending),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    /// `value >= pivot`, increasing.
    Ascending,
    /// `value < pivot`, decreasing.
    Descending,
}

fn entry(r: &rusqlite::Row<'_>) -> rusqlite::Result<(f64, i64, String)> {
    Ok((r.get(0)?, r.get(1)?, r.get(2)?))
}

/// One side of a scan, paged by `(value, rowid)` keyset.
struct Cursor {
    direction: Direction,
    buf: VecDeque<(f64, i64, String)>,
    last: Option<(f64, i64)>,
    exhausted: bool,
}

impl Cursor {
    fn new(direction: Direction) -> Self {
        Self {
            direction,
            buf: VecDeque::new(),
            last: None,
            exhausted: false,
        }
    }

    fn fill(&mut self, conn: &Connection, table: &str, pivot: f64) -> Result<()> {
        if !self.buf.is_empty() || self.exhausted {
            return Ok(());
        }
        let (cmp, order, keyset) = match self.direction {
            Direction::Ascending => (">=", "ASC", ">"),
            Direction::Descending => ("<", "DESC", "<"),
        };
        let mut rows = Vec::new();
        match self.last {
            None => {
                let mut stmt = conn.prepare_cached(&format!(
                    "SELECT value, rowid, key FROM {table} WHERE value {cmp} ?1
                     ORDER BY value {order}, rowid {order} LIMIT ?2"
                ))?;
                for row in stmt.query_map(params![pivot, PAGE_SIZE], entry)? {
                    rows.push(row?);
                }
            }
            Some((value, rowid)) => {
                let mut stmt = conn.prepare_cached(&format!(
                    "SELECT value, rowid, key FROM {table}
                     WHERE value {cmp} ?1 AND (value, rowid) {keyset} (?2, ?3)
                     ORDER BY value {order}, rowid {order} LIMIT ?4"
                ))?;
                for row in stmt.query_map(params![pivot, value, rowid, PAGE_SIZE], entry)? {
                    rows.push(row?);
                }
            }
        }
        if (rows.len() as i64) < PAGE_SIZE {
            self.exhausted = true;
        }
        if let Some((value, rowid, _)) = rows.last() {
            self.last = Some((*value, *rowid));
        }
        self.buf.extend(rows);
        Ok(())
    }
}

/// Bidirectional scan of one simple index, nearest entries first.
pub struct ProjectionScan<'a> {
    conn: &'a Connection,
    table: String,
    pivot: f64,
    up: Cursor,
    down: Cursor,
}

impl ProjectionScan<'_> {
    /// Next `(|value - pivot|, row offset)`, or `None` once both sides are
    /// exhausted. The ascending side wins only when strictly closer.
    pub fn next_nearest(&mut self) -> Result<Option<(f64, usize)>> {
        self.up.fill(self.conn, &self.table, self.pivot)?;
        self.down.fill(self.conn, &self.table, self.pivot)?;

        let up = self.up.buf.front().map(|(v, _, _)| (v - self.pivot).abs());
        let down = self.down.buf.front().map(|(v, _, _)| (v - self.pivot).abs());
        let side = match (up, down) {
            (None, None) => return Ok(None),
            (Some(_), None) => &mut self.up,
            (None, Some(_)) => &mut self.down,
            (Some(a), Some(b)) if a < b => &mut self.up,
            (Some(_), Some(_)) => &mut self.down,
        };
        let Some((value, _, key)) = side.buf.pop_front() else {
            return Ok(None);
        };
        let offset = key.parse::<usize>().map_err(|_| {
            IndexError::Serialization(format!("bad row key {key:?} in {}", self.table))
        })?;
        Ok(Some(((value - self.pivot).abs(), offset)))
    }
}
