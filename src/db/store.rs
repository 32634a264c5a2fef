//! SQLite database store implementation.

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, Connection, Result as SqlResult};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

use super::models::*;

/// Format every timestamp is written in. Fixed width, always UTC, so that
/// lexical comparison in SQL matches chronological order.
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.9f";
const TIME_LEN: usize = 29;

/// Matches exactly the text [`TIME_FORMAT`] produces.
const TIME_GLOB: &str = "[0-9][0-9][0-9][0-9]-[0-9][0-9]-[0-9][0-9] [0-9][0-9]:[0-9][0-9]:[0-9][0-9].[0-9][0-9][0-9][0-9][0-9][0-9][0-9][0-9][0-9]";

/// Database error types.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Migration error: {0}")]
    Migration(String),
    #[error("Not found")]
    NotFound,
    #[error("malformed heartbeat for monitor {monitor_id}: {reason}")]
    MalformedHeartbeat { monitor_id: i64, reason: String },
    #[error("database lock poisoned")]
    Poisoned,
}

/// Thread-safe database store.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Create a new store with the given database path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init()?;
        Ok(store)
    }

    /// Initialize the database with migrations.
    fn init(&self) -> Result<(), DbError> {
        let conn = self.conn()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(include_str!("../../migrations/000001_init.up.sql"))
            .map_err(|e| DbError::Migration(format!("Migration 1 failed: {}", e)))?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, DbError> {
        self.conn.lock().map_err(|_| DbError::Poisoned)
    }

    // --- Monitors ---

    /// Add a new monitor and return its ID.
    pub fn add_monitor(&self, monitor: &mut Monitor) -> Result<i64, DbError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO monitors (name, url) VALUES (?1, ?2)",
            params![monitor.name, monitor.url],
        )?;
        let id = conn.last_insert_rowid();
        monitor.id = id;
        Ok(id)
    }

    /// Get all monitors, ordered by ID.
    pub fn get_monitors(&self) -> Result<Vec<Monitor>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id, name, url FROM monitors ORDER BY id ASC")?;

        let monitors = stmt
            .query_map([], |row| {
                Ok(Monitor {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    url: row.get(2)?,
                })
            })?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(monitors)
    }

    /// Get a monitor by ID.
    pub fn get_monitor(&self, id: i64) -> Result<Monitor, DbError> {
        let conn = self.conn()?;
        let result = conn.query_row(
            "SELECT id, name, url FROM monitors WHERE id = ?1",
            params![id],
            |row| {
                Ok(Monitor {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    url: row.get(2)?,
                })
            },
        );

        match result {
            Ok(monitor) => Ok(monitor),
            Err(rusqlite::Error::QueryReturnedNoRows) => Err(DbError::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete a monitor. Its heartbeats go with it through the
    /// `ON DELETE CASCADE` foreign key.
    pub fn delete_monitor(&self, id: i64) -> Result<(), DbError> {
        let conn = self.conn()?;
        let removed = conn.execute("DELETE FROM monitors WHERE id = ?1", params![id])?;
        if removed == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    // --- Heartbeats ---

    /// Record a single heartbeat.
    pub fn add_heartbeat(&self, heartbeat: &Heartbeat) -> Result<(), DbError> {
        self.add_heartbeats(std::slice::from_ref(heartbeat))
    }

    /// Record heartbeats in batch.
    pub fn add_heartbeats(&self, heartbeats: &[Heartbeat]) -> Result<(), DbError> {
        if heartbeats.is_empty() {
            return Ok(());
        }

        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO heartbeats (monitor_id, time, status) VALUES (?1, ?2, ?3)",
            )?;

            for hb in heartbeats {
                stmt.execute(params![
                    hb.monitor_id,
                    format_db_time(hb.time),
                    i64::from(hb.is_up),
                ])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// Get heartbeats for a monitor with `start <= time <= end`, oldest first.
    ///
    /// Rows whose time or status cannot be decoded are rejected with
    /// [`DbError::MalformedHeartbeat`] rather than skipped. A row whose time
    /// is not in canonical form cannot be placed in or out of the range, so
    /// any such row for the monitor fails the read.
    pub fn get_heartbeats(
        &self,
        monitor_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Heartbeat>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT time, status FROM heartbeats
             WHERE monitor_id = ?1
               AND ((time >= ?2 AND time <= ?3) OR time IS NULL OR time NOT GLOB ?4)
             ORDER BY time ASC, id ASC",
        )?;

        let rows = stmt
            .query_map(
                params![monitor_id, format_db_time(start), format_db_time(end), TIME_GLOB],
                |row| {
                    let time: Option<String> = row.get(0)?;
                    let status: Option<i64> = row.get(1)?;
                    Ok((time, status))
                },
            )?
            .collect::<SqlResult<Vec<_>>>()?;

        rows.into_iter()
            .map(|(time, status)| decode_heartbeat(monitor_id, time, status))
            .collect()
    }

    /// Delete heartbeats older than a cutoff across all monitors.
    /// Returns the number of rows removed.
    pub fn delete_heartbeats_before(&self, cutoff: DateTime<Utc>) -> Result<usize, DbError> {
        let conn = self.conn()?;
        let removed = conn.execute(
            "DELETE FROM heartbeats WHERE time < ?1",
            params![format_db_time(cutoff)],
        )?;
        Ok(removed)
    }
}

fn decode_heartbeat(
    monitor_id: i64,
    time: Option<String>,
    status: Option<i64>,
) -> Result<Heartbeat, DbError> {
    let malformed = |reason: String| DbError::MalformedHeartbeat { monitor_id, reason };

    let time = time.ok_or_else(|| malformed("missing time".to_string()))?;
    let time = parse_db_time(&time).ok_or_else(|| malformed(format!("unparseable time {:?}", time)))?;

    let is_up = match status {
        Some(1) => true,
        Some(0) => false,
        Some(other) => return Err(malformed(format!("unknown status {}", other))),
        None => return Err(malformed("missing status".to_string())),
    };

    Ok(Heartbeat { monitor_id, time, is_up })
}

fn format_db_time(dt: DateTime<Utc>) -> String {
    dt.format(TIME_FORMAT).to_string()
}

/// Parse a datetime string from the database. Only the exact form
/// [`format_db_time`] writes is accepted: range filters compare the text
/// lexically, so any other spelling would sort wrongly.
fn parse_db_time(s: &str) -> Option<DateTime<Utc>> {
    if s.len() != TIME_LEN {
        return None;
    }
    NaiveDateTime::parse_from_str(s, TIME_FORMAT)
        .ok()
        .map(|dt| DateTime::from_naive_utc_and_offset(dt, Utc))
}
