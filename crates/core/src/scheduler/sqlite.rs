//! SQLite-backed scheduled-job store implementation.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use super::store::{ScheduleError, ScheduledJobStore};
use super::types::{ScheduledJob, ScheduledJobType, SeedJob};

const COLUMNS: &str =
    "id, name, job_type, schedule, enabled, payload, last_run, last_run_job_id, next_run";

/// SQLite-backed scheduled-job store.
pub struct SqliteScheduledJobStore {
    conn: Mutex<Connection>,
}

impl SqliteScheduledJobStore {
    /// Open (and initialize) the store at the given database path.
    pub fn new(path: &Path) -> Result<Self, ScheduleError> {
        let conn = Connection::open(path).map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, ScheduleError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), ScheduleError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS scheduled_jobs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                job_type TEXT NOT NULL,
                schedule TEXT NOT NULL,
                enabled INTEGER NOT NULL DEFAULT 1,
                payload TEXT NOT NULL DEFAULT '{}',
                last_run TEXT,
                last_run_job_id TEXT,
                next_run TEXT
            );
            "#,
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<ScheduledJob> {
        let job_type: String = row.get(2)?;
        let payload_json: String = row.get(5)?;

        Ok(ScheduledJob {
            id: row.get(0)?,
            name: row.get(1)?,
            job_type: ScheduledJobType::parse(&job_type)
                .unwrap_or(ScheduledJobType::RetryMissingTorrents),
            schedule: row.get(3)?,
            enabled: row.get::<_, i64>(4)? != 0,
            payload: serde_json::from_str(&payload_json).unwrap_or(serde_json::Value::Null),
            last_run: row.get::<_, Option<String>>(6)?.map(parse_ts),
            last_run_job_id: row.get(7)?,
            next_run: row.get::<_, Option<String>>(8)?.map(parse_ts),
        })
    }

    fn query_list(&self, sql: &str) -> Result<Vec<ScheduledJob>, ScheduleError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(sql).map_err(db_err)?;
        let rows = stmt.query_map([], Self::row_to_job).map_err(db_err)?;

        let mut jobs = Vec::new();
        for row in rows {
            jobs.push(row.map_err(db_err)?);
        }
        Ok(jobs)
    }
}

fn db_err(e: impl std::fmt::Display) -> ScheduleError {
    ScheduleError::Database(e.to_string())
}

fn parse_ts(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

impl ScheduledJobStore for SqliteScheduledJobStore {
    fn seed(&self, seed: &SeedJob) -> Result<bool, ScheduleError> {
        let conn = self.conn.lock().unwrap();
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO scheduled_jobs (name, job_type, schedule, enabled, payload) \
                 VALUES (?, ?, ?, ?, '{}')",
                params![
                    seed.name,
                    seed.job_type.as_str(),
                    seed.schedule,
                    seed.enabled as i64,
                ],
            )
            .map_err(db_err)?;
        Ok(inserted > 0)
    }

    fn get(&self, id: i64) -> Result<Option<ScheduledJob>, ScheduleError> {
        let conn = self.conn.lock().unwrap();
        let sql = format!("SELECT {COLUMNS} FROM scheduled_jobs WHERE id = ?");
        match conn.query_row(&sql, params![id], Self::row_to_job) {
            Ok(job) => Ok(Some(job)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(db_err(e)),
        }
    }

    fn get_by_name(&self, name: &str) -> Result<Option<ScheduledJob>, ScheduleError> {
        let conn = self.conn.lock().unwrap();
        let sql = format!("SELECT {COLUMNS} FROM scheduled_jobs WHERE name = ?");
        match conn.query_row(&sql, params![name], Self::row_to_job) {
            Ok(job) => Ok(Some(job)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(db_err(e)),
        }
    }

    fn list(&self) -> Result<Vec<ScheduledJob>, ScheduleError> {
        self.query_list(&format!(
            "SELECT {COLUMNS} FROM scheduled_jobs ORDER BY id ASC"
        ))
    }

    fn list_enabled(&self) -> Result<Vec<ScheduledJob>, ScheduleError> {
        self.query_list(&format!(
            "SELECT {COLUMNS} FROM scheduled_jobs WHERE enabled = 1 ORDER BY id ASC"
        ))
    }

    fn set_enabled(&self, id: i64, enabled: bool) -> Result<(), ScheduleError> {
        let conn = self.conn.lock().unwrap();
        let changed = conn
            .execute(
                "UPDATE scheduled_jobs SET enabled = ? WHERE id = ?",
                params![enabled as i64, id],
            )
            .map_err(db_err)?;
        if changed == 0 {
            return Err(ScheduleError::NotFound(id));
        }
        Ok(())
    }

    fn update_schedule(&self, id: i64, schedule: &str) -> Result<(), ScheduleError> {
        let conn = self.conn.lock().unwrap();
        let changed = conn
            .execute(
                "UPDATE scheduled_jobs SET schedule = ? WHERE id = ?",
                params![schedule, id],
            )
            .map_err(db_err)?;
        if changed == 0 {
            return Err(ScheduleError::NotFound(id));
        }
        Ok(())
    }

    fn record_run(&self, id: i64, broker_id: &str) -> Result<(), ScheduleError> {
        let conn = self.conn.lock().unwrap();
        let changed = conn
            .execute(
                "UPDATE scheduled_jobs SET last_run = ?, last_run_job_id = ? WHERE id = ?",
                params![Utc::now().to_rfc3339(), broker_id, id],
            )
            .map_err(db_err)?;
        if changed == 0 {
            return Err(ScheduleError::NotFound(id));
        }
        Ok(())
    }

    fn set_last_run(&self, id: i64, at: DateTime<Utc>) -> Result<(), ScheduleError> {
        let conn = self.conn.lock().unwrap();
        let changed = conn
            .execute(
                "UPDATE scheduled_jobs SET last_run = ? WHERE id = ?",
                params![at.to_rfc3339(), id],
            )
            .map_err(db_err)?;
        if changed == 0 {
            return Err(ScheduleError::NotFound(id));
        }
        Ok(())
    }

    fn set_next_run(&self, id: i64, at: Option<DateTime<Utc>>) -> Result<(), ScheduleError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE scheduled_jobs SET next_run = ? WHERE id = ?",
            params![at.map(|t| t.to_rfc3339()), id],
        )
        .map_err(db_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::types::default_jobs;

    #[test]
    fn test_seed_is_idempotent() {
        let store = SqliteScheduledJobStore::in_memory().unwrap();
        let seed = &default_jobs()[0];
        assert!(store.seed(seed).unwrap());
        assert!(!store.seed(seed).unwrap());
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn test_seed_all_defaults() {
        let store = SqliteScheduledJobStore::in_memory().unwrap();
        for seed in default_jobs() {
            store.seed(&seed).unwrap();
        }
        let all = store.list().unwrap();
        assert_eq!(all.len(), 8);
        let enabled = store.list_enabled().unwrap();
        assert_eq!(enabled.len(), 6);
    }

    #[test]
    fn test_record_run_stamps_both_fields() {
        let store = SqliteScheduledJobStore::in_memory().unwrap();
        store.seed(&default_jobs()[3]).unwrap();
        let job = store.get_by_name("Retry Missing Search").unwrap().unwrap();
        assert!(job.last_run.is_none());

        store.record_run(job.id, "broker-1").unwrap();
        let job = store.get(job.id).unwrap().unwrap();
        assert!(job.last_run.is_some());
        assert_eq!(job.last_run_job_id.as_deref(), Some("broker-1"));
    }

    #[test]
    fn test_enable_disable() {
        let store = SqliteScheduledJobStore::in_memory().unwrap();
        store.seed(&default_jobs()[0]).unwrap();
        let job = store.get_by_name("Library Scan").unwrap().unwrap();
        assert!(!job.enabled);

        store.set_enabled(job.id, true).unwrap();
        assert!(store.get(job.id).unwrap().unwrap().enabled);
        assert!(matches!(
            store.set_enabled(9999, true),
            Err(ScheduleError::NotFound(_))
        ));
    }
}
