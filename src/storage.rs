use anyhow::{anyhow, Result};
use rusqlite::{params, Connection, Row};
use std::collections::BTreeMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::occupancy::{OccupancyLevel, OccupancySnapshot};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Destination for published snapshots.
///
/// `upsert_current` keeps one row per session (last write wins);
/// `append_history` adds an immutable record per emission. The two channels
/// are written independently.
pub trait OccupancySink {
    fn upsert_current(&mut self, snapshot: &OccupancySnapshot) -> Result<()>;

    fn append_history(&mut self, snapshot: &OccupancySnapshot) -> Result<()>;

    fn current(&mut self, session_id: &str) -> Result<Option<OccupancySnapshot>>;

    /// Current snapshot of every session, ordered by session id.
    fn current_all(&mut self) -> Result<Vec<OccupancySnapshot>>;

    /// Up to `limit` historical records of a session, ordered by frame index.
    fn history(&mut self, session_id: &str, limit: usize) -> Result<Vec<OccupancySnapshot>>;

    /// Deletes history for one session, or for every session when `None`.
    fn clear_history(&mut self, session_id: Option<&str>) -> Result<usize>;
}

pub struct SqliteOccupancySink {
    conn: Connection,
}

impl SqliteOccupancySink {
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path)
            .map_err(|e| anyhow!("failed to open occupancy db {}: {}", db_path, e))?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let mut sink = Self { conn };
        sink.ensure_schema()?;
        Ok(sink)
    }

    fn ensure_schema(&mut self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;

            CREATE TABLE IF NOT EXISTS occupancy_current (
              session_id TEXT PRIMARY KEY,
              count INTEGER NOT NULL,
              capacity INTEGER NOT NULL,
              fullness_percent REAL NOT NULL,
              level TEXT NOT NULL,
              frame_index INTEGER NOT NULL,
              at REAL NOT NULL,
              updated_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS occupancy_history (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              session_id TEXT NOT NULL,
              count INTEGER NOT NULL,
              capacity INTEGER NOT NULL,
              fullness_percent REAL NOT NULL,
              level TEXT NOT NULL,
              frame_index INTEGER NOT NULL,
              at REAL NOT NULL,
              created_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_history_session
              ON occupancy_history(session_id, frame_index);
            "#,
        )?;
        Ok(())
    }
}

impl OccupancySink for SqliteOccupancySink {
    fn upsert_current(&mut self, snapshot: &OccupancySnapshot) -> Result<()> {
        let (count, frame_index) = integer_columns(snapshot)?;
        self.conn.execute(
            r#"
            INSERT INTO occupancy_current(
              session_id, count, capacity, fullness_percent, level, frame_index, at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(session_id) DO UPDATE SET
              count = excluded.count,
              capacity = excluded.capacity,
              fullness_percent = excluded.fullness_percent,
              level = excluded.level,
              frame_index = excluded.frame_index,
              at = excluded.at,
              updated_at = excluded.updated_at
            "#,
            params![
                snapshot.session_id,
                count,
                snapshot.capacity,
                snapshot.fullness_percent,
                snapshot.level.as_str(),
                frame_index,
                snapshot.at,
                now_s()? as i64
            ],
        )?;
        Ok(())
    }

    fn append_history(&mut self, snapshot: &OccupancySnapshot) -> Result<()> {
        let (count, frame_index) = integer_columns(snapshot)?;
        self.conn.execute(
            r#"
            INSERT INTO occupancy_history(
              session_id, count, capacity, fullness_percent, level, frame_index, at, created_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                snapshot.session_id,
                count,
                snapshot.capacity,
                snapshot.fullness_percent,
                snapshot.level.as_str(),
                frame_index,
                snapshot.at,
                now_s()? as i64
            ],
        )?;
        Ok(())
    }

    fn current(&mut self, session_id: &str) -> Result<Option<OccupancySnapshot>> {
        let mut stmt = self.conn.prepare(
            "SELECT session_id, count, capacity, fullness_percent, frame_index, at \
             FROM occupancy_current WHERE session_id = ?1",
        )?;
        let mut rows = stmt.query(params![session_id])?;
        match rows.next()? {
            Some(row) => Ok(Some(snapshot_from_row(row)?)),
            None => Ok(None),
        }
    }

    fn current_all(&mut self) -> Result<Vec<OccupancySnapshot>> {
        let mut stmt = self.conn.prepare(
            "SELECT session_id, count, capacity, fullness_percent, frame_index, at \
             FROM occupancy_current ORDER BY session_id ASC",
        )?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(snapshot_from_row(row)?);
        }
        Ok(out)
    }

    fn history(&mut self, session_id: &str, limit: usize) -> Result<Vec<OccupancySnapshot>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut stmt = self.conn.prepare(
            "SELECT session_id, count, capacity, fullness_percent, frame_index, at \
             FROM occupancy_history WHERE session_id = ?1 \
             ORDER BY frame_index ASC, id ASC LIMIT ?2",
        )?;
        let mut rows = stmt.query(params![session_id, limit])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(snapshot_from_row(row)?);
        }
        Ok(out)
    }

    fn clear_history(&mut self, session_id: Option<&str>) -> Result<usize> {
        let deleted = match session_id {
            Some(id) => self.conn.execute(
                "DELETE FROM occupancy_history WHERE session_id = ?1",
                params![id],
            )?,
            None => self.conn.execute("DELETE FROM occupancy_history", [])?,
        };
        Ok(deleted)
    }
}

fn integer_columns(snapshot: &OccupancySnapshot) -> Result<(i64, i64)> {
    let count =
        i64::try_from(snapshot.count).map_err(|_| anyhow!("occupancy count exceeds i64 range"))?;
    let frame_index = i64::try_from(snapshot.frame_index)
        .map_err(|_| anyhow!("frame index exceeds i64 range"))?;
    Ok((count, frame_index))
}

fn snapshot_from_row(row: &Row<'_>) -> Result<OccupancySnapshot> {
    let count: i64 = row.get(1)?;
    let capacity: i64 = row.get(2)?;
    let fullness_percent: f64 = row.get(3)?;
    let frame_index: i64 = row.get(4)?;
    Ok(OccupancySnapshot {
        session_id: row.get(0)?,
        count: u64::try_from(count).map_err(|_| anyhow!("corrupt occupancy row: count"))?,
        capacity: u32::try_from(capacity)
            .map_err(|_| anyhow!("corrupt occupancy row: capacity"))?,
        fullness_percent,
        level: OccupancyLevel::from_percent(fullness_percent),
        frame_index: u64::try_from(frame_index)
            .map_err(|_| anyhow!("corrupt occupancy row: frame_index"))?,
        at: row.get(5)?,
    })
}

fn now_s() -> Result<u64> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs())
}

/// Sink kept in process memory, for tests and the demo.
///
/// `set_available(false)` makes every write fail, simulating an outage.
#[derive(Clone, Debug)]
pub struct InMemoryOccupancySink {
    current: BTreeMap<String, OccupancySnapshot>,
    history: Vec<OccupancySnapshot>,
    available: bool,
}

impl Default for InMemoryOccupancySink {
    fn default() -> Self {
        Self {
            current: BTreeMap::new(),
            history: Vec::new(),
            available: true,
        }
    }
}

impl InMemoryOccupancySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_available(&mut self, available: bool) {
        self.available = available;
    }

    fn ensure_available(&self) -> Result<()> {
        if self.available {
            Ok(())
        } else {
            Err(anyhow!("occupancy sink unavailable"))
        }
    }
}

impl OccupancySink for InMemoryOccupancySink {
    fn upsert_current(&mut self, snapshot: &OccupancySnapshot) -> Result<()> {
        self.ensure_available()?;
        self.current
            .insert(snapshot.session_id.clone(), snapshot.clone());
        Ok(())
    }

    fn append_history(&mut self, snapshot: &OccupancySnapshot) -> Result<()> {
        self.ensure_available()?;
        self.history.push(snapshot.clone());
        Ok(())
    }

    fn current(&mut self, session_id: &str) -> Result<Option<OccupancySnapshot>> {
        Ok(self.current.get(session_id).cloned())
    }

    fn current_all(&mut self) -> Result<Vec<OccupancySnapshot>> {
        Ok(self.current.values().cloned().collect())
    }

    fn history(&mut self, session_id: &str, limit: usize) -> Result<Vec<OccupancySnapshot>> {
        let mut out: Vec<OccupancySnapshot> = self
            .history
            .iter()
            .filter(|snap| snap.session_id == session_id)
            .cloned()
            .collect();
        out.sort_by_key(|snap| snap.frame_index);
        out.truncate(limit);
        Ok(out)
    }

    fn clear_history(&mut self, session_id: Option<&str>) -> Result<usize> {
        let before = self.history.len();
        match session_id {
            Some(id) => self.history.retain(|snap| snap.session_id != id),
            None => self.history.clear(),
        }
        Ok(before - self.history.len())
    }
}
