//! Append-only log of block events (SQLite)

use chrono::{DateTime, Local, NaiveDate, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

use crate::error::{GuardianError, Result};
use crate::persist::lock_recover;

/// One termination of a blocked app
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockEvent {
    pub id: i64,
    pub app: String,
    pub timestamp: DateTime<Utc>,
}

/// Per-day totals
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailySummary {
    pub day: Option<NaiveDate>,
    pub total: u64,
    pub per_app: BTreeMap<String, u64>,
    pub most_blocked: Option<String>,
}

pub struct EventRecorder {
    path: PathBuf,
    conn: Mutex<Connection>,
}

impl EventRecorder {
    /// Open or create the event log
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| GuardianError::from_io(path, e))?;
        }
        let conn = Connection::open(path).map_err(|e| db_err(path, e))?;
        let recorder = Self {
            path: path.to_path_buf(),
            conn: Mutex::new(conn),
        };
        recorder.initialize()?;
        Ok(recorder)
    }

    /// In-memory log (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let path = PathBuf::from(":memory:");
        let conn = Connection::open_in_memory().map_err(|e| db_err(&path, e))?;
        let recorder = Self {
            path,
            conn: Mutex::new(conn),
        };
        recorder.initialize()?;
        Ok(recorder)
    }

    fn initialize(&self) -> Result<()> {
        lock_recover(&self.conn)
            .execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS block_events (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    app TEXT NOT NULL,
                    timestamp TEXT NOT NULL,
                    day TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_block_events_day ON block_events(day);
                "#,
            )
            .map_err(|e| db_err(&self.path, e))?;

        debug!("Event log ready at {:?}", self.path);
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record that `app` was terminated at `at`.
    pub fn append(&self, app: &str, at: DateTime<Utc>) -> Result<()> {
        let day = at.with_timezone(&Local).date_naive();
        lock_recover(&self.conn)
            .execute(
                "INSERT INTO block_events (app, timestamp, day) VALUES (?1, ?2, ?3)",
                params![app, at.to_rfc3339(), day.format("%Y-%m-%d").to_string()],
            )
            .map_err(|e| db_err(&self.path, e))?;

        info!("Block event recorded: {}", app);
        Ok(())
    }

    /// Most recent events first
    pub fn recent(&self, limit: usize) -> Result<Vec<BlockEvent>> {
        let conn = lock_recover(&self.conn);
        let mut stmt = conn
            .prepare(
                r#"
                SELECT id, app, timestamp
                FROM block_events
                ORDER BY id DESC
                LIMIT ?1
                "#,
            )
            .map_err(|e| db_err(&self.path, e))?;

        let rows = stmt
            .query_map([limit as i64], |row| {
                let ts: String = row.get(2)?;
                Ok(BlockEvent {
                    id: row.get(0)?,
                    app: row.get(1)?,
                    timestamp: DateTime::parse_from_rfc3339(&ts)
                        .map(|t| t.with_timezone(&Utc))
                        .unwrap_or_default(),
                })
            })
            .map_err(|e| db_err(&self.path, e))?;

        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| db_err(&self.path, e))
    }

    /// Totals for a local calendar day
    pub fn summary_for_day(&self, day: NaiveDate) -> Result<DailySummary> {
        let conn = lock_recover(&self.conn);
        let mut stmt = conn
            .prepare(
                r#"
                SELECT app, COUNT(*)
                FROM block_events
                WHERE day = ?1
                GROUP BY app
                ORDER BY COUNT(*) DESC, app ASC
                "#,
            )
            .map_err(|e| db_err(&self.path, e))?;

        let rows = stmt
            .query_map([day.format("%Y-%m-%d").to_string()], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })
            .map_err(|e| db_err(&self.path, e))?;

        let mut summary = DailySummary {
            day: Some(day),
            ..Default::default()
        };
        for row in rows {
            let (app, count) = row.map_err(|e| db_err(&self.path, e))?;
            let count = count.max(0) as u64;
            if summary.most_blocked.is_none() {
                summary.most_blocked = Some(app.clone());
            }
            summary.total += count;
            summary.per_app.insert(app, count);
        }
        Ok(summary)
    }

    /// Total number of recorded events
    pub fn count(&self) -> Result<u64> {
        let count: i64 = lock_recover(&self.conn)
            .query_row("SELECT COUNT(*) FROM block_events", [], |row| row.get(0))
            .map_err(|e| db_err(&self.path, e))?;
        Ok(count.max(0) as u64)
    }
}

fn db_err(path: &Path, e: rusqlite::Error) -> GuardianError {
    GuardianError::Persistence {
        path: path.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::Other, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_append_and_recent() {
        let recorder = EventRecorder::open_in_memory().unwrap();
        let at = Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap();
        recorder.append("Steam.exe", at).unwrap();
        recorder.append("Discord.exe", at).unwrap();

        let events = recorder.recent(10).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].app, "Discord.exe");
        assert_eq!(events[1].timestamp, at);
        assert_eq!(recorder.count().unwrap(), 2);
    }

    #[test]
    fn test_daily_summary() {
        let recorder = EventRecorder::open_in_memory().unwrap();
        let at = Utc::now();
        recorder.append("Steam.exe", at).unwrap();
        recorder.append("Discord.exe", at).unwrap();
        recorder.append("Steam.exe", at).unwrap();

        let summary = recorder
            .summary_for_day(at.with_timezone(&Local).date_naive())
            .unwrap();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.per_app["Steam.exe"], 2);
        assert_eq!(summary.most_blocked.as_deref(), Some("Steam.exe"));
    }

    #[test]
    fn test_events_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.db");
        EventRecorder::open(&path)
            .unwrap()
            .append("Steam.exe", Utc::now())
            .unwrap();

        assert_eq!(EventRecorder::open(&path).unwrap().count().unwrap(), 1);
    }
}
