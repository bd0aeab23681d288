//! SQLite-backed metadata cache implementation.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use crate::clients::CatalogEntry;

use super::{CacheError, CachedItem, MetadataCacheStore};

const COLUMNS: &str = "id, asin, title, author, narrator, year, cover_url, thumbnail_path, \
     is_popular, is_new_release, updated_at";

/// SQLite-backed metadata cache.
pub struct SqliteMetadataCache {
    conn: Mutex<Connection>,
}

impl SqliteMetadataCache {
    /// Open (and initialize) the cache at the given database path.
    pub fn new(path: &Path) -> Result<Self, CacheError> {
        let conn = Connection::open(path).map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory cache (useful for testing).
    pub fn in_memory() -> Result<Self, CacheError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), CacheError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS metadata_cache (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                asin TEXT NOT NULL UNIQUE,
                title TEXT NOT NULL,
                author TEXT NOT NULL,
                narrator TEXT,
                year INTEGER,
                cover_url TEXT,
                thumbnail_path TEXT,
                is_popular INTEGER NOT NULL DEFAULT 0,
                is_new_release INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn row_to_item(row: &rusqlite::Row) -> rusqlite::Result<CachedItem> {
        Ok(CachedItem {
            id: row.get(0)?,
            asin: row.get(1)?,
            title: row.get(2)?,
            author: row.get(3)?,
            narrator: row.get(4)?,
            year: row.get(5)?,
            cover_url: row.get(6)?,
            thumbnail_path: row.get(7)?,
            is_popular: row.get::<_, i64>(8)? != 0,
            is_new_release: row.get::<_, i64>(9)? != 0,
            updated_at: parse_ts(row.get::<_, String>(10)?),
        })
    }
}

fn db_err(e: impl std::fmt::Display) -> CacheError {
    CacheError::Database(e.to_string())
}

fn parse_ts(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

impl MetadataCacheStore for SqliteMetadataCache {
    fn upsert(
        &self,
        entry: &CatalogEntry,
        popular: bool,
        new_release: bool,
    ) -> Result<CachedItem, CacheError> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO metadata_cache \
             (asin, title, author, narrator, year, cover_url, is_popular, is_new_release, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9) \
             ON CONFLICT(asin) DO UPDATE SET \
             title = ?2, author = ?3, narrator = ?4, year = ?5, cover_url = ?6, \
             is_popular = is_popular OR ?7, is_new_release = is_new_release OR ?8, updated_at = ?9",
            params![
                entry.asin,
                entry.title,
                entry.author,
                entry.narrator,
                entry.year,
                entry.cover_url,
                popular as i64,
                new_release as i64,
                now,
            ],
        )
        .map_err(db_err)?;

        let sql = format!("SELECT {COLUMNS} FROM metadata_cache WHERE asin = ?");
        conn.query_row(&sql, params![entry.asin], Self::row_to_item)
            .map_err(db_err)
    }

    fn clear_flags(&self) -> Result<(), CacheError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE metadata_cache SET is_popular = 0, is_new_release = 0",
            [],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn get_by_asin(&self, asin: &str) -> Result<Option<CachedItem>, CacheError> {
        let conn = self.conn.lock().unwrap();
        let sql = format!("SELECT {COLUMNS} FROM metadata_cache WHERE asin = ?");
        match conn.query_row(&sql, params![asin], Self::row_to_item) {
            Ok(item) => Ok(Some(item)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(db_err(e)),
        }
    }

    fn set_thumbnail(&self, asin: &str, path: &str) -> Result<(), CacheError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE metadata_cache SET thumbnail_path = ? WHERE asin = ?",
            params![path, asin],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn referenced_thumbnails(&self) -> Result<Vec<String>, CacheError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT thumbnail_path FROM metadata_cache WHERE thumbnail_path IS NOT NULL")
            .map_err(db_err)?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(db_err)?;

        let mut paths = Vec::new();
        for row in rows {
            paths.push(row.map_err(db_err)?);
        }
        Ok(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(asin: &str, title: &str) -> CatalogEntry {
        CatalogEntry {
            asin: asin.to_string(),
            title: title.to_string(),
            author: "Author".to_string(),
            narrator: None,
            year: Some(2007),
            cover_url: Some(format!("http://covers/{asin}.jpg")),
            series: None,
            series_part: None,
        }
    }

    #[test]
    fn test_upsert_sets_flags() {
        let cache = SqliteMetadataCache::in_memory().unwrap();
        let item = cache.upsert(&entry("B001", "Book"), true, false).unwrap();
        assert!(item.is_popular);
        assert!(!item.is_new_release);

        // Upserting again with the other flag keeps both.
        let item = cache.upsert(&entry("B001", "Book"), false, true).unwrap();
        assert!(item.is_popular);
        assert!(item.is_new_release);
    }

    #[test]
    fn test_clear_flags_keeps_rows() {
        let cache = SqliteMetadataCache::in_memory().unwrap();
        cache.upsert(&entry("B001", "Book"), true, true).unwrap();
        cache.clear_flags().unwrap();

        let item = cache.get_by_asin("B001").unwrap().unwrap();
        assert!(!item.is_popular);
        assert!(!item.is_new_release);
        assert_eq!(item.year, Some(2007));
    }

    #[test]
    fn test_thumbnail_reference_tracking() {
        let cache = SqliteMetadataCache::in_memory().unwrap();
        cache.upsert(&entry("B001", "Book"), true, false).unwrap();
        cache.upsert(&entry("B002", "Other"), true, false).unwrap();
        cache.set_thumbnail("B001", "/thumbs/B001.jpg").unwrap();

        let referenced = cache.referenced_thumbnails().unwrap();
        assert_eq!(referenced, vec!["/thumbs/B001.jpg".to_string()]);
    }
}
