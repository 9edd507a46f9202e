//! Article persistence.
//!
//! [`ArticleStore`] is the only resource shared between concurrent crawl
//! tasks. Implementations must enforce uniqueness of `article_id` so that
//! concurrent inserts of the same article have exactly one winner; the
//! losers observe [`InsertOutcome::Duplicate`] rather than an error.
//!
//! [`SqliteStore`] keeps each record as JSON next to the indexed columns the
//! crawler queries on (`category`, `published_at`). Timestamps are written in
//! one fixed RFC 3339 shape (UTC, millisecond precision), so SQL string
//! ordering matches chronological ordering.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, instrument};

use crate::error::StoreError;
use crate::models::ArticleRecord;
use crate::utils::parse_timestamp;

/// Result of an insert attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// A record with the same `article_id` already existed; nothing changed.
    Duplicate,
}

/// Storage operations the crawler relies on. Each call is atomic on its own;
/// nothing spans more than one call.
pub trait ArticleStore {
    async fn insert(&self, record: &ArticleRecord) -> Result<InsertOutcome, StoreError>;

    async fn exists(&self, article_id: &str) -> Result<bool, StoreError>;

    /// Watermark for `category`: the newest stored `published_at`.
    async fn latest_published_at(&self, category: &str)
    -> Result<Option<DateTime<Utc>>, StoreError>;

    /// Records published at or after `since` that have body content,
    /// newest first.
    async fn find_recent(&self, since: DateTime<Utc>) -> Result<Vec<ArticleRecord>, StoreError>;
}

/// SQLite-backed [`ArticleStore`].
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

fn ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path`. `:memory:` opens a
    /// private in-memory database.
    #[instrument(level = "info", skip_all, fields(path = %path))]
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = if path == ":memory:" {
            Connection::open_in_memory()?
        } else {
            if let Some(parent) = Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            let conn = Connection::open(path)?;
            conn.busy_timeout(std::time::Duration::from_secs(30))?;
            conn
        };

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init()?;
        info!("Article store ready");
        Ok(store)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::open(":memory:")
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    fn init(&self) -> Result<(), StoreError> {
        self.lock()?.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS articles (
                article_id   TEXT PRIMARY KEY NOT NULL,
                section      TEXT NOT NULL,
                category     TEXT NOT NULL,
                published_at TEXT,
                scraped_at   TEXT NOT NULL,
                has_content  INTEGER NOT NULL,
                record       TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_articles_category_published
                ON articles (category, published_at);
            CREATE INDEX IF NOT EXISTS idx_articles_published
                ON articles (published_at);
            "#,
        )?;
        Ok(())
    }

    #[cfg(test)]
    pub fn count(&self) -> Result<usize, StoreError> {
        let n: i64 = self
            .lock()?
            .query_row("SELECT COUNT(*) FROM articles", [], |row| row.get(0))?;
        Ok(n as usize)
    }
}

// Queries are short and run inline on the calling task, as in a synchronous
// rusqlite setup; the Mutex is never held across an await.
impl ArticleStore for SqliteStore {
    async fn insert(&self, record: &ArticleRecord) -> Result<InsertOutcome, StoreError> {
        let json = serde_json::to_string(record)?;
        let changed = self.lock()?.execute(
            "INSERT OR IGNORE INTO articles
                (article_id, section, category, published_at, scraped_at, has_content, record)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.article_id,
                record.section,
                record.category,
                record.published_at.as_ref().map(ts),
                ts(&record.scraped_at),
                !record.content.is_empty(),
                json,
            ],
        )?;

        if changed == 0 {
            debug!(article_id = %record.article_id, "Article already stored; insert skipped");
            Ok(InsertOutcome::Duplicate)
        } else {
            Ok(InsertOutcome::Inserted)
        }
    }

    async fn exists(&self, article_id: &str) -> Result<bool, StoreError> {
        let found = self
            .lock()?
            .query_row(
                "SELECT 1 FROM articles WHERE article_id = ?1",
                params![article_id],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    async fn latest_published_at(
        &self,
        category: &str,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        let latest: Option<String> = self.lock()?.query_row(
            "SELECT MAX(published_at) FROM articles WHERE category = ?1",
            params![category],
            |row| row.get(0),
        )?;
        Ok(latest.as_deref().and_then(parse_timestamp))
    }

    async fn find_recent(&self, since: DateTime<Utc>) -> Result<Vec<ArticleRecord>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT record FROM articles
             WHERE published_at >= ?1 AND has_content = 1
             ORDER BY published_at DESC",
        )?;
        let rows = stmt.query_map(params![ts(&since)], |row| row.get::<_, String>(0))?;

        let mut records = Vec::new();
        for row in rows {
            records.push(serde_json::from_str(&row?)?);
        }
        Ok(records)
    }
}
