//! SQLite-backed request store implementation.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use crate::clients::DownloadClientKind;

use super::history::{DownloadHistory, DownloadStatus, NewDownloadHistory};
use super::machine::can_transition;
use super::store::{NewRequest, RequestError, RequestFilter, RequestStore};
use super::types::{Audiobook, NewAudiobook, Request, RequestStatus, RequestType};

const REQUEST_COLUMNS: &str = "id, user_id, request_type, audiobook_id, status, progress, \
     download_attempts, import_attempts, max_import_retries, error_message, \
     created_at, updated_at, completed_at, last_import_at, deleted_at";

const AUDIOBOOK_COLUMNS: &str = "id, title, author, narrator, asin, series, series_part, year, \
     cover_art_url, file_path, library_guid, library_rating_key, created_at, updated_at";

const HISTORY_COLUMNS: &str = "id, request_id, selected, download_client, download_client_id, \
     torrent_hash, nzb_id, torrent_name, download_path, indexer_name, torrent_url, \
     download_status, download_error, started_at, completed_at";

/// SQLite-backed request store.
pub struct SqliteRequestStore {
    conn: Mutex<Connection>,
}

impl SqliteRequestStore {
    /// Open (and initialize) the store at the given database path.
    pub fn new(path: &Path) -> Result<Self, RequestError> {
        let conn = Connection::open(path).map_err(db_err)?;
        Self::initialize(conn)
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, RequestError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::initialize(conn)
    }

    fn initialize(conn: Connection) -> Result<Self, RequestError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), RequestError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS audiobooks (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                author TEXT NOT NULL,
                narrator TEXT,
                asin TEXT,
                series TEXT,
                series_part TEXT,
                year INTEGER,
                cover_art_url TEXT,
                file_path TEXT,
                library_guid TEXT,
                library_rating_key TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS requests (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                request_type TEXT NOT NULL,
                audiobook_id TEXT NOT NULL REFERENCES audiobooks(id),
                status TEXT NOT NULL,
                progress INTEGER NOT NULL DEFAULT 0,
                download_attempts INTEGER NOT NULL DEFAULT 0,
                import_attempts INTEGER NOT NULL DEFAULT 0,
                max_import_retries INTEGER NOT NULL DEFAULT 3,
                error_message TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                completed_at TEXT,
                last_import_at TEXT,
                deleted_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_requests_status ON requests(status);
            CREATE INDEX IF NOT EXISTS idx_requests_user ON requests(user_id);

            CREATE TABLE IF NOT EXISTS download_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                request_id TEXT NOT NULL REFERENCES requests(id) ON DELETE CASCADE,
                selected INTEGER NOT NULL DEFAULT 0,
                download_client TEXT NOT NULL,
                download_client_id TEXT,
                torrent_hash TEXT,
                nzb_id TEXT,
                torrent_name TEXT,
                download_path TEXT,
                indexer_name TEXT,
                torrent_url TEXT,
                download_status TEXT NOT NULL,
                download_error TEXT,
                started_at TEXT NOT NULL,
                completed_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_history_request ON download_history(request_id);
            "#,
        )
        .map_err(db_err)?;

        Ok(())
    }

    fn row_to_request(row: &rusqlite::Row) -> rusqlite::Result<Request> {
        let request_type: String = row.get(2)?;
        let status: String = row.get(4)?;

        Ok(Request {
            id: row.get(0)?,
            user_id: row.get(1)?,
            request_type: RequestType::parse(&request_type).unwrap_or(RequestType::Audiobook),
            audiobook_id: row.get(3)?,
            status: RequestStatus::parse(&status).unwrap_or(RequestStatus::Failed),
            progress: row.get::<_, i64>(5)?.clamp(0, 100) as u8,
            download_attempts: row.get::<_, i64>(6)?.max(0) as u32,
            import_attempts: row.get::<_, i64>(7)?.max(0) as u32,
            max_import_retries: row.get::<_, i64>(8)?.max(0) as u32,
            error_message: row.get(9)?,
            created_at: parse_ts(row.get::<_, String>(10)?),
            updated_at: parse_ts(row.get::<_, String>(11)?),
            completed_at: row.get::<_, Option<String>>(12)?.map(parse_ts),
            last_import_at: row.get::<_, Option<String>>(13)?.map(parse_ts),
            deleted_at: row.get::<_, Option<String>>(14)?.map(parse_ts),
        })
    }

    fn row_to_audiobook(row: &rusqlite::Row) -> rusqlite::Result<Audiobook> {
        Ok(Audiobook {
            id: row.get(0)?,
            title: row.get(1)?,
            author: row.get(2)?,
            narrator: row.get(3)?,
            asin: row.get(4)?,
            series: row.get(5)?,
            series_part: row.get(6)?,
            year: row.get(7)?,
            cover_art_url: row.get(8)?,
            file_path: row.get(9)?,
            library_guid: row.get(10)?,
            library_rating_key: row.get(11)?,
            created_at: parse_ts(row.get::<_, String>(12)?),
            updated_at: parse_ts(row.get::<_, String>(13)?),
        })
    }

    fn row_to_history(row: &rusqlite::Row) -> rusqlite::Result<DownloadHistory> {
        let client: String = row.get(3)?;
        let status: String = row.get(11)?;

        Ok(DownloadHistory {
            id: row.get(0)?,
            request_id: row.get(1)?,
            selected: row.get::<_, i64>(2)? != 0,
            download_client: DownloadClientKind::parse(&client)
                .unwrap_or(DownloadClientKind::Qbittorrent),
            download_client_id: row.get(4)?,
            torrent_hash: row.get(5)?,
            nzb_id: row.get(6)?,
            torrent_name: row.get(7)?,
            download_path: row.get(8)?,
            indexer_name: row.get(9)?,
            torrent_url: row.get(10)?,
            download_status: DownloadStatus::parse(&status).unwrap_or(DownloadStatus::Pending),
            download_error: row.get(12)?,
            started_at: parse_ts(row.get::<_, String>(13)?),
            completed_at: row.get::<_, Option<String>>(14)?.map(parse_ts),
        })
    }

    fn query_request(conn: &Connection, id: &str) -> Result<Option<Request>, RequestError> {
        let sql = format!("SELECT {REQUEST_COLUMNS} FROM requests WHERE id = ?");
        match conn.query_row(&sql, params![id], Self::row_to_request) {
            Ok(request) => Ok(Some(request)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(db_err(e)),
        }
    }

    fn build_where_clause(filter: &RequestFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = vec!["deleted_at IS NULL".to_string()];
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(status) = filter.status {
            conditions.push("status = ?".to_string());
            params.push(Box::new(status.as_str().to_string()));
        }

        if let Some(request_type) = filter.request_type {
            conditions.push("request_type = ?".to_string());
            params.push(Box::new(request_type.as_str().to_string()));
        }

        (format!("WHERE {}", conditions.join(" AND ")), params)
    }
}

fn db_err(e: impl std::fmt::Display) -> RequestError {
    RequestError::Database(e.to_string())
}

fn parse_ts(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

impl RequestStore for SqliteRequestStore {
    fn create_request(&self, request: NewRequest) -> Result<Request, RequestError> {
        let conn = self.conn.lock().unwrap();

        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        let max_retries = request.max_import_retries.unwrap_or(3);

        conn.execute(
            "INSERT INTO requests (id, user_id, request_type, audiobook_id, status, progress, \
             download_attempts, import_attempts, max_import_retries, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, 0, 0, 0, ?, ?, ?)",
            params![
                id,
                request.user_id,
                request.request_type.as_str(),
                request.audiobook_id,
                RequestStatus::AwaitingSearch.as_str(),
                max_retries,
                now.to_rfc3339(),
                now.to_rfc3339(),
            ],
        )
        .map_err(db_err)?;

        Self::query_request(&conn, &id)?.ok_or_else(|| RequestError::NotFound(id))
    }

    fn get_request(&self, id: &str) -> Result<Option<Request>, RequestError> {
        let conn = self.conn.lock().unwrap();
        Self::query_request(&conn, id)
    }

    fn list_requests(&self, filter: &RequestFilter) -> Result<Vec<Request>, RequestError> {
        let conn = self.conn.lock().unwrap();

        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!(
            "SELECT {REQUEST_COLUMNS} FROM requests {where_clause} \
             ORDER BY created_at ASC LIMIT ? OFFSET ?"
        );

        let mut stmt = conn.prepare(&sql).map_err(db_err)?;

        let mut all_params: Vec<Box<dyn rusqlite::ToSql>> = params;
        all_params.push(Box::new(filter.limit));
        all_params.push(Box::new(filter.offset));
        let param_refs: Vec<&dyn rusqlite::ToSql> = all_params.iter().map(|p| p.as_ref()).collect();

        let rows = stmt
            .query_map(param_refs.as_slice(), Self::row_to_request)
            .map_err(db_err)?;

        let mut requests = Vec::new();
        for row in rows {
            requests.push(row.map_err(db_err)?);
        }
        Ok(requests)
    }

    fn count_requests(&self, filter: &RequestFilter) -> Result<i64, RequestError> {
        let conn = self.conn.lock().unwrap();

        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM requests {where_clause}");
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))
            .map_err(db_err)
    }

    fn transition(
        &self,
        id: &str,
        from: &[RequestStatus],
        to: RequestStatus,
    ) -> Result<Option<Request>, RequestError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(db_err)?;

        let current = match Self::query_request(&tx, id)? {
            Some(request) => request,
            None => return Err(RequestError::NotFound(id.to_string())),
        };

        if current.deleted_at.is_some()
            || !from.contains(&current.status)
            || !can_transition(current.status, to)
        {
            return Ok(None);
        }

        let now = Utc::now().to_rfc3339();

        // Leaving warn manually gives the import budget back.
        if current.status == RequestStatus::Warn {
            tx.execute(
                "UPDATE requests SET import_attempts = 0, error_message = NULL WHERE id = ?",
                params![id],
            )
            .map_err(db_err)?;
        }

        if to == RequestStatus::Completed {
            tx.execute(
                "UPDATE requests SET status = ?, updated_at = ?, completed_at = ? WHERE id = ?",
                params![to.as_str(), now, now, id],
            )
            .map_err(db_err)?;
        } else {
            tx.execute(
                "UPDATE requests SET status = ?, updated_at = ? WHERE id = ?",
                params![to.as_str(), now, id],
            )
            .map_err(db_err)?;
        }

        let updated = Self::query_request(&tx, id)?;
        tx.commit().map_err(db_err)?;
        Ok(updated)
    }

    fn set_progress(&self, id: &str, progress: u8) -> Result<(), RequestError> {
        let conn = self.conn.lock().unwrap();
        let progress = progress.min(100) as i64;

        conn.execute(
            "UPDATE requests SET progress = ?1, updated_at = ?2 \
             WHERE id = ?3 AND deleted_at IS NULL AND progress < ?1 \
             AND status NOT IN ('completed', 'failed', 'cancelled')",
            params![progress, Utc::now().to_rfc3339(), id],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn set_error_message(&self, id: &str, message: Option<&str>) -> Result<(), RequestError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE requests SET error_message = ?, updated_at = ? WHERE id = ?",
            params![message, Utc::now().to_rfc3339(), id],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn bump_download_attempts(&self, id: &str) -> Result<u32, RequestError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE requests SET download_attempts = download_attempts + 1, updated_at = ? \
             WHERE id = ? AND deleted_at IS NULL",
            params![Utc::now().to_rfc3339(), id],
        )
        .map_err(db_err)?;

        conn.query_row(
            "SELECT download_attempts FROM requests WHERE id = ?",
            params![id],
            |row| row.get::<_, i64>(0),
        )
        .map(|n| n.max(0) as u32)
        .map_err(db_err)
    }

    fn bump_import_attempts(&self, id: &str) -> Result<u32, RequestError> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE requests SET import_attempts = import_attempts + 1, last_import_at = ?, \
             updated_at = ? WHERE id = ? AND deleted_at IS NULL",
            params![now, now, id],
        )
        .map_err(db_err)?;

        conn.query_row(
            "SELECT import_attempts FROM requests WHERE id = ?",
            params![id],
            |row| row.get::<_, i64>(0),
        )
        .map(|n| n.max(0) as u32)
        .map_err(db_err)
    }

    fn soft_delete(&self, id: &str) -> Result<(), RequestError> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE requests SET deleted_at = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
            params![now, now, id],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn hard_delete(&self, id: &str) -> Result<(), RequestError> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM requests WHERE id = ?", params![id])
            .map_err(db_err)?;
        Ok(())
    }

    fn create_audiobook(&self, audiobook: NewAudiobook) -> Result<Audiobook, RequestError> {
        let conn = self.conn.lock().unwrap();

        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();

        conn.execute(
            "INSERT INTO audiobooks (id, title, author, narrator, asin, series, series_part, \
             year, cover_art_url, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                id,
                audiobook.title,
                audiobook.author,
                audiobook.narrator,
                audiobook.asin,
                audiobook.series,
                audiobook.series_part,
                audiobook.year,
                audiobook.cover_art_url,
                now.to_rfc3339(),
                now.to_rfc3339(),
            ],
        )
        .map_err(db_err)?;

        let sql = format!("SELECT {AUDIOBOOK_COLUMNS} FROM audiobooks WHERE id = ?");
        conn.query_row(&sql, params![id], Self::row_to_audiobook)
            .map_err(db_err)
    }

    fn get_audiobook(&self, id: &str) -> Result<Option<Audiobook>, RequestError> {
        let conn = self.conn.lock().unwrap();
        let sql = format!("SELECT {AUDIOBOOK_COLUMNS} FROM audiobooks WHERE id = ?");
        match conn.query_row(&sql, params![id], Self::row_to_audiobook) {
            Ok(audiobook) => Ok(Some(audiobook)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(db_err(e)),
        }
    }

    fn set_audiobook_year(&self, id: &str, year: i32) -> Result<(), RequestError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE audiobooks SET year = ?, updated_at = ? WHERE id = ?",
            params![year, Utc::now().to_rfc3339(), id],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn set_audiobook_file_path(&self, id: &str, path: &str) -> Result<(), RequestError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE audiobooks SET file_path = ?, updated_at = ? WHERE id = ?",
            params![path, Utc::now().to_rfc3339(), id],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn set_audiobook_library_match(
        &self,
        id: &str,
        guid: &str,
        rating_key: &str,
    ) -> Result<(), RequestError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE audiobooks SET library_guid = ?, library_rating_key = ?, updated_at = ? \
             WHERE id = ?",
            params![guid, rating_key, Utc::now().to_rfc3339(), id],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn insert_history(&self, row: NewDownloadHistory) -> Result<DownloadHistory, RequestError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(db_err)?;

        tx.execute(
            "UPDATE download_history SET selected = 0 WHERE request_id = ?",
            params![row.request_id],
        )
        .map_err(db_err)?;

        let now = Utc::now().to_rfc3339();
        tx.execute(
            "INSERT INTO download_history (request_id, selected, download_client, \
             download_client_id, torrent_hash, nzb_id, torrent_name, indexer_name, torrent_url, \
             download_status, started_at) VALUES (?, 1, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                row.request_id,
                row.download_client.as_str(),
                row.download_client_id,
                row.torrent_hash,
                row.nzb_id,
                row.torrent_name,
                row.indexer_name,
                row.torrent_url,
                DownloadStatus::Pending.as_str(),
                now,
            ],
        )
        .map_err(db_err)?;

        let id = tx.last_insert_rowid();
        let sql = format!("SELECT {HISTORY_COLUMNS} FROM download_history WHERE id = ?");
        let history = tx
            .query_row(&sql, params![id], Self::row_to_history)
            .map_err(db_err)?;
        tx.commit().map_err(db_err)?;
        Ok(history)
    }

    fn get_history(&self, id: i64) -> Result<Option<DownloadHistory>, RequestError> {
        let conn = self.conn.lock().unwrap();
        let sql = format!("SELECT {HISTORY_COLUMNS} FROM download_history WHERE id = ?");
        match conn.query_row(&sql, params![id], Self::row_to_history) {
            Ok(history) => Ok(Some(history)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(db_err(e)),
        }
    }

    fn latest_selected_history(
        &self,
        request_id: &str,
    ) -> Result<Option<DownloadHistory>, RequestError> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT {HISTORY_COLUMNS} FROM download_history \
             WHERE request_id = ? AND selected = 1 ORDER BY id DESC LIMIT 1"
        );
        match conn.query_row(&sql, params![request_id], Self::row_to_history) {
            Ok(history) => Ok(Some(history)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(db_err(e)),
        }
    }

    fn update_history_status(
        &self,
        id: i64,
        status: DownloadStatus,
        error: Option<&str>,
    ) -> Result<(), RequestError> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();

        if status == DownloadStatus::Completed {
            conn.execute(
                "UPDATE download_history SET download_status = ?, download_error = ?, \
                 completed_at = ? WHERE id = ?",
                params![status.as_str(), error, now, id],
            )
            .map_err(db_err)?;
        } else {
            conn.execute(
                "UPDATE download_history SET download_status = ?, download_error = ? WHERE id = ?",
                params![status.as_str(), error, id],
            )
            .map_err(db_err)?;
        }
        Ok(())
    }

    fn set_history_client(
        &self,
        id: i64,
        client_id: &str,
        torrent_hash: Option<&str>,
        nzb_id: Option<&str>,
    ) -> Result<(), RequestError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE download_history SET download_client_id = ?, \
             torrent_hash = COALESCE(?, torrent_hash), nzb_id = COALESCE(?, nzb_id) WHERE id = ?",
            params![client_id, torrent_hash, nzb_id, id],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn set_history_download_path(
        &self,
        id: i64,
        path: &str,
        name: Option<&str>,
    ) -> Result<(), RequestError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE download_history SET download_path = ?, \
             torrent_name = COALESCE(?, torrent_name) WHERE id = ?",
            params![path, name, id],
        )
        .map_err(db_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_request() -> (SqliteRequestStore, Request) {
        let store = SqliteRequestStore::in_memory().unwrap();
        let audiobook = store
            .create_audiobook(NewAudiobook {
                title: "The Name of the Wind".to_string(),
                author: "Patrick Rothfuss".to_string(),
                asin: Some("B0036I54I6".to_string()),
                ..Default::default()
            })
            .unwrap();
        let request = store
            .create_request(NewRequest {
                user_id: "user-1".to_string(),
                request_type: RequestType::Audiobook,
                audiobook_id: audiobook.id,
                max_import_retries: None,
            })
            .unwrap();
        (store, request)
    }

    #[test]
    fn test_create_request_starts_awaiting_search() {
        let (_, request) = store_with_request();
        assert_eq!(request.status, RequestStatus::AwaitingSearch);
        assert_eq!(request.progress, 0);
        assert_eq!(request.max_import_retries, 3);
        assert!(request.deleted_at.is_none());
    }

    #[test]
    fn test_transition_happy_edge() {
        let (store, request) = store_with_request();
        let updated = store
            .transition(
                &request.id,
                &[RequestStatus::AwaitingSearch],
                RequestStatus::AwaitingDownload,
            )
            .unwrap()
            .unwrap();
        assert_eq!(updated.status, RequestStatus::AwaitingDownload);
    }

    #[test]
    fn test_transition_refuses_wrong_expectation() {
        let (store, request) = store_with_request();
        let refused = store
            .transition(
                &request.id,
                &[RequestStatus::Downloading],
                RequestStatus::AwaitingImport,
            )
            .unwrap();
        assert!(refused.is_none());
        let current = store.get_request(&request.id).unwrap().unwrap();
        assert_eq!(current.status, RequestStatus::AwaitingSearch);
    }

    #[test]
    fn test_transition_refuses_illegal_edge() {
        let (store, request) = store_with_request();
        let refused = store
            .transition(
                &request.id,
                &[RequestStatus::AwaitingSearch],
                RequestStatus::Downloaded,
            )
            .unwrap();
        assert!(refused.is_none());
    }

    #[test]
    fn test_transition_refuses_soft_deleted() {
        let (store, request) = store_with_request();
        store.soft_delete(&request.id).unwrap();
        let refused = store
            .transition(
                &request.id,
                &[RequestStatus::AwaitingSearch],
                RequestStatus::AwaitingDownload,
            )
            .unwrap();
        assert!(refused.is_none());
    }

    #[test]
    fn test_completed_sets_completed_at() {
        let (store, request) = store_with_request();
        for (from, to) in [
            (RequestStatus::AwaitingSearch, RequestStatus::AwaitingDownload),
            (RequestStatus::AwaitingDownload, RequestStatus::Downloading),
            (RequestStatus::Downloading, RequestStatus::AwaitingImport),
            (RequestStatus::AwaitingImport, RequestStatus::Processing),
            (RequestStatus::Processing, RequestStatus::Downloaded),
            (RequestStatus::Downloaded, RequestStatus::Completed),
        ] {
            store.transition(&request.id, &[from], to).unwrap().unwrap();
        }
        let current = store.get_request(&request.id).unwrap().unwrap();
        assert_eq!(current.status, RequestStatus::Completed);
        assert!(current.completed_at.is_some());
    }

    #[test]
    fn test_progress_is_monotone() {
        let (store, request) = store_with_request();
        store.set_progress(&request.id, 40).unwrap();
        store.set_progress(&request.id, 25).unwrap();
        let current = store.get_request(&request.id).unwrap().unwrap();
        assert_eq!(current.progress, 40);

        store.set_progress(&request.id, 99).unwrap();
        let current = store.get_request(&request.id).unwrap().unwrap();
        assert_eq!(current.progress, 99);
    }

    #[test]
    fn test_bump_import_attempts_stamps_last_import() {
        let (store, request) = store_with_request();
        assert_eq!(store.bump_import_attempts(&request.id).unwrap(), 1);
        assert_eq!(store.bump_import_attempts(&request.id).unwrap(), 2);
        let current = store.get_request(&request.id).unwrap().unwrap();
        assert!(current.last_import_at.is_some());
    }

    #[test]
    fn test_leaving_warn_resets_import_budget() {
        let (store, request) = store_with_request();
        for (from, to) in [
            (RequestStatus::AwaitingSearch, RequestStatus::AwaitingDownload),
            (RequestStatus::AwaitingDownload, RequestStatus::Downloading),
            (RequestStatus::Downloading, RequestStatus::AwaitingImport),
        ] {
            store.transition(&request.id, &[from], to).unwrap().unwrap();
        }
        for _ in 0..3 {
            store.bump_import_attempts(&request.id).unwrap();
        }
        store
            .transition(&request.id, &[RequestStatus::AwaitingImport], RequestStatus::Warn)
            .unwrap()
            .unwrap();

        let restarted = store
            .transition(&request.id, &[RequestStatus::Warn], RequestStatus::AwaitingImport)
            .unwrap()
            .unwrap();
        assert_eq!(restarted.import_attempts, 0);
        assert!(restarted.error_message.is_none());
    }

    #[test]
    fn test_list_excludes_soft_deleted() {
        let (store, request) = store_with_request();
        let filter = RequestFilter::new().with_status(RequestStatus::AwaitingSearch);
        assert_eq!(store.list_requests(&filter).unwrap().len(), 1);

        store.soft_delete(&request.id).unwrap();
        assert_eq!(store.list_requests(&filter).unwrap().len(), 0);
        assert_eq!(store.count_requests(&filter).unwrap(), 0);
    }

    #[test]
    fn test_insert_history_keeps_single_selected() {
        let (store, request) = store_with_request();
        let first = store
            .insert_history(NewDownloadHistory {
                request_id: request.id.clone(),
                download_client: DownloadClientKind::Qbittorrent,
                download_client_id: None,
                torrent_hash: Some("aaa".to_string()),
                nzb_id: None,
                torrent_name: Some("Release A".to_string()),
                indexer_name: Some("indexer-a".to_string()),
                torrent_url: Some("http://a/torrent".to_string()),
            })
            .unwrap();
        assert!(first.selected);

        let second = store
            .insert_history(NewDownloadHistory {
                request_id: request.id.clone(),
                download_client: DownloadClientKind::Qbittorrent,
                download_client_id: None,
                torrent_hash: Some("bbb".to_string()),
                nzb_id: None,
                torrent_name: Some("Release B".to_string()),
                indexer_name: Some("indexer-b".to_string()),
                torrent_url: Some("http://b/torrent".to_string()),
            })
            .unwrap();
        assert!(second.selected);

        let latest = store.latest_selected_history(&request.id).unwrap().unwrap();
        assert_eq!(latest.id, second.id);

        let first_again = store.get_history(first.id).unwrap().unwrap();
        assert!(!first_again.selected);
    }

    #[test]
    fn test_hard_delete_cascades_history() {
        let (store, request) = store_with_request();
        store
            .insert_history(NewDownloadHistory {
                request_id: request.id.clone(),
                download_client: DownloadClientKind::Qbittorrent,
                download_client_id: None,
                torrent_hash: Some("abc".to_string()),
                nzb_id: None,
                torrent_name: None,
                indexer_name: None,
                torrent_url: None,
            })
            .unwrap();

        store.hard_delete(&request.id).unwrap();
        assert!(store.get_request(&request.id).unwrap().is_none());
        assert!(store.latest_selected_history(&request.id).unwrap().is_none());
    }

    #[test]
    fn test_history_download_path_capture() {
        let (store, request) = store_with_request();
        let history = store
            .insert_history(NewDownloadHistory {
                request_id: request.id.clone(),
                download_client: DownloadClientKind::Qbittorrent,
                download_client_id: Some("TORR-1".to_string()),
                torrent_hash: Some("abc".to_string()),
                nzb_id: None,
                torrent_name: None,
                indexer_name: None,
                torrent_url: None,
            })
            .unwrap();

        store
            .set_history_download_path(history.id, "/downloads/Release A", Some("Release A"))
            .unwrap();
        store
            .update_history_status(history.id, DownloadStatus::Completed, None)
            .unwrap();

        let updated = store.get_history(history.id).unwrap().unwrap();
        assert_eq!(updated.download_path.as_deref(), Some("/downloads/Release A"));
        assert_eq!(updated.torrent_name.as_deref(), Some("Release A"));
        assert_eq!(updated.download_status, DownloadStatus::Completed);
        assert!(updated.completed_at.is_some());
    }
}
