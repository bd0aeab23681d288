//! SQLite-backed job store implementation.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use super::store::{JobError, JobPatch, JobStore, NewJob};
use super::types::{Job, JobPayload, JobStatus, JobType};

const JOB_COLUMNS: &str = "id, broker_id, request_id, job_type, status, priority, attempts, \
     max_attempts, payload, result, error_message, error_detail, created_at, started_at, \
     completed_at, updated_at";

/// SQLite-backed job store.
pub struct SqliteJobStore {
    conn: Mutex<Connection>,
}

impl SqliteJobStore {
    /// Open (and initialize) the store at the given database path.
    pub fn new(path: &Path) -> Result<Self, JobError> {
        let conn = Connection::open(path).map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, JobError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), JobError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                broker_id TEXT NOT NULL UNIQUE,
                request_id TEXT,
                job_type TEXT NOT NULL,
                status TEXT NOT NULL,
                priority INTEGER NOT NULL DEFAULT 0,
                attempts INTEGER NOT NULL DEFAULT 0,
                max_attempts INTEGER NOT NULL DEFAULT 3,
                payload TEXT NOT NULL,
                result TEXT,
                error_message TEXT,
                error_detail TEXT,
                created_at TEXT NOT NULL,
                started_at TEXT,
                completed_at TEXT,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_jobs_request ON jobs(request_id);
            CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);
            "#,
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<Job> {
        let job_type: String = row.get(3)?;
        let status: String = row.get(4)?;
        let payload_json: String = row.get(8)?;
        let result_json: Option<String> = row.get(9)?;

        let payload: JobPayload = serde_json::from_str(&payload_json).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, Box::new(e))
        })?;

        Ok(Job {
            id: row.get(0)?,
            broker_id: row.get(1)?,
            request_id: row.get(2)?,
            job_type: JobType::parse(&job_type).unwrap_or_else(|| payload.job_type()),
            status: JobStatus::parse(&status).unwrap_or(JobStatus::Pending),
            priority: row.get(5)?,
            attempts: row.get::<_, i64>(6)?.max(0) as u32,
            max_attempts: row.get::<_, i64>(7)?.max(0) as u32,
            payload,
            result: result_json.and_then(|json| serde_json::from_str(&json).ok()),
            error_message: row.get(10)?,
            error_detail: row.get(11)?,
            created_at: parse_ts(row.get::<_, String>(12)?),
            started_at: row.get::<_, Option<String>>(13)?.map(parse_ts),
            completed_at: row.get::<_, Option<String>>(14)?.map(parse_ts),
            updated_at: parse_ts(row.get::<_, String>(15)?),
        })
    }
}

fn db_err(e: impl std::fmt::Display) -> JobError {
    JobError::Database(e.to_string())
}

fn parse_ts(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

impl JobStore for SqliteJobStore {
    fn create(&self, job: NewJob) -> Result<Job, JobError> {
        let conn = self.conn.lock().unwrap();

        let payload_json =
            serde_json::to_string(&job.payload).map_err(|e| JobError::Serialization(e.to_string()))?;
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO jobs (broker_id, request_id, job_type, status, priority, attempts, \
             max_attempts, payload, created_at, updated_at) VALUES (?, ?, ?, ?, ?, 0, ?, ?, ?, ?)",
            params![
                job.broker_id,
                job.payload.request_id(),
                job.payload.job_type().as_str(),
                JobStatus::Pending.as_str(),
                job.priority,
                job.max_attempts,
                payload_json,
                now,
                now,
            ],
        )
        .map_err(db_err)?;

        let id = conn.last_insert_rowid();
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?");
        conn.query_row(&sql, params![id], Self::row_to_job)
            .map_err(db_err)
    }

    fn update_by_broker_id(&self, broker_id: &str, patch: &JobPatch) -> Result<(), JobError> {
        let conn = self.conn.lock().unwrap();

        let mut sets = vec!["updated_at = ?".to_string()];
        let mut values: Vec<Box<dyn rusqlite::ToSql>> =
            vec![Box::new(Utc::now().to_rfc3339())];

        if let Some(status) = patch.status {
            sets.push("status = ?".to_string());
            values.push(Box::new(status.as_str().to_string()));
        }
        if let Some(attempts) = patch.attempts {
            sets.push("attempts = ?".to_string());
            values.push(Box::new(attempts as i64));
        }
        if let Some(ref result) = patch.result {
            let json =
                serde_json::to_string(result).map_err(|e| JobError::Serialization(e.to_string()))?;
            sets.push("result = ?".to_string());
            values.push(Box::new(json));
        }
        if let Some(ref message) = patch.error_message {
            sets.push("error_message = ?".to_string());
            values.push(Box::new(message.clone()));
        }
        if let Some(ref detail) = patch.error_detail {
            sets.push("error_detail = ?".to_string());
            values.push(Box::new(detail.clone()));
        }
        if patch.clear_errors {
            sets.push("error_message = NULL".to_string());
            sets.push("error_detail = NULL".to_string());
        }
        if let Some(started_at) = patch.started_at {
            sets.push("started_at = ?".to_string());
            values.push(Box::new(started_at.to_rfc3339()));
        }
        if let Some(completed_at) = patch.completed_at {
            sets.push("completed_at = ?".to_string());
            values.push(Box::new(completed_at.to_rfc3339()));
        }

        let sql = format!("UPDATE jobs SET {} WHERE broker_id = ?", sets.join(", "));
        values.push(Box::new(broker_id.to_string()));
        let param_refs: Vec<&dyn rusqlite::ToSql> = values.iter().map(|v| v.as_ref()).collect();

        let changed = conn.execute(&sql, param_refs.as_slice()).map_err(db_err)?;
        if changed == 0 {
            return Err(JobError::NotFound(broker_id.to_string()));
        }
        Ok(())
    }

    fn find_by_id(&self, id: i64) -> Result<Option<Job>, JobError> {
        let conn = self.conn.lock().unwrap();
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?");
        match conn.query_row(&sql, params![id], Self::row_to_job) {
            Ok(job) => Ok(Some(job)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(db_err(e)),
        }
    }

    fn find_by_broker_id(&self, broker_id: &str) -> Result<Option<Job>, JobError> {
        let conn = self.conn.lock().unwrap();
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE broker_id = ?");
        match conn.query_row(&sql, params![broker_id], Self::row_to_job) {
            Ok(job) => Ok(Some(job)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(db_err(e)),
        }
    }

    fn find_by_request(&self, request_id: &str) -> Result<Vec<Job>, JobError> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE request_id = ? ORDER BY id DESC"
        );
        let mut stmt = conn.prepare(&sql).map_err(db_err)?;
        let rows = stmt
            .query_map(params![request_id], Self::row_to_job)
            .map_err(db_err)?;

        let mut jobs = Vec::new();
        for row in rows {
            jobs.push(row.map_err(db_err)?);
        }
        Ok(jobs)
    }

    fn find_failed(&self, limit: i64) -> Result<Vec<Job>, JobError> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE status = 'failed' ORDER BY updated_at DESC \
             LIMIT ?"
        );
        let mut stmt = conn.prepare(&sql).map_err(db_err)?;
        let rows = stmt
            .query_map(params![limit], Self::row_to_job)
            .map_err(db_err)?;

        let mut jobs = Vec::new();
        for row in rows {
            jobs.push(row.map_err(db_err)?);
        }
        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::types::AudiobookRef;

    fn search_payload(request_id: &str) -> JobPayload {
        JobPayload::SearchIndexers {
            request_id: request_id.to_string(),
            audiobook: AudiobookRef {
                id: "a1".to_string(),
                title: "Mistborn".to_string(),
                author: "Brandon Sanderson".to_string(),
                asin: None,
            },
        }
    }

    fn new_job(broker_id: &str) -> NewJob {
        NewJob {
            broker_id: broker_id.to_string(),
            payload: search_payload("r1"),
            priority: 0,
            max_attempts: 3,
        }
    }

    #[test]
    fn test_create_links_request_and_type() {
        let store = SqliteJobStore::in_memory().unwrap();
        let job = store.create(new_job("b1")).unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.job_type, JobType::SearchIndexers);
        assert_eq!(job.request_id.as_deref(), Some("r1"));
        assert_eq!(job.attempts, 0);
    }

    #[test]
    fn test_lifecycle_patches() {
        let store = SqliteJobStore::in_memory().unwrap();
        store.create(new_job("b1")).unwrap();

        store.update_by_broker_id("b1", &JobPatch::active(1)).unwrap();
        let job = store.find_by_broker_id("b1").unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Active);
        assert_eq!(job.attempts, 1);
        assert!(job.started_at.is_some());

        let result = serde_json::json!({"success": true});
        store
            .update_by_broker_id("b1", &JobPatch::completed(result.clone()))
            .unwrap();
        let job = store.find_by_broker_id("b1").unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.result, Some(result));
        assert!(job.completed_at.is_some());
    }

    #[test]
    fn test_terminal_patch_is_idempotent() {
        let store = SqliteJobStore::in_memory().unwrap();
        store.create(new_job("b1")).unwrap();

        let result = serde_json::json!({"moved": 3});
        store.update_by_broker_id("b1", &JobPatch::active(1)).unwrap();
        store
            .update_by_broker_id("b1", &JobPatch::completed(result.clone()))
            .unwrap();
        let first = store.find_by_broker_id("b1").unwrap().unwrap();

        store
            .update_by_broker_id("b1", &JobPatch::completed(result))
            .unwrap();
        let second = store.find_by_broker_id("b1").unwrap().unwrap();

        assert_eq!(first.status, second.status);
        assert_eq!(first.result, second.result);
        assert_eq!(first.attempts, second.attempts);
    }

    #[test]
    fn test_retry_resets_row() {
        let store = SqliteJobStore::in_memory().unwrap();
        store.create(new_job("b1")).unwrap();
        store.update_by_broker_id("b1", &JobPatch::active(3)).unwrap();
        store
            .update_by_broker_id("b1", &JobPatch::failed("boom", Some("stack".to_string())))
            .unwrap();

        store.update_by_broker_id("b1", &JobPatch::retried()).unwrap();
        let job = store.find_by_broker_id("b1").unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.attempts, 0);
        assert!(job.error_message.is_none());
        assert!(job.error_detail.is_none());
    }

    #[test]
    fn test_find_failed_and_by_request() {
        let store = SqliteJobStore::in_memory().unwrap();
        store.create(new_job("b1")).unwrap();
        store.create(new_job("b2")).unwrap();
        store
            .update_by_broker_id("b2", &JobPatch::failed("no candidates", None))
            .unwrap();

        let failed = store.find_failed(10).unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].broker_id, "b2");

        let for_request = store.find_by_request("r1").unwrap();
        assert_eq!(for_request.len(), 2);
    }

    #[test]
    fn test_update_unknown_broker_id_errors() {
        let store = SqliteJobStore::in_memory().unwrap();
        let result = store.update_by_broker_id("nope", &JobPatch::active(1));
        assert!(matches!(result, Err(JobError::NotFound(_))));
    }
}
