//! SQLite-backed history store.
//!
//! One table, `interviews`, holding every exchange. The creation-time index
//! is optional: when it is absent, [`HistoryStore::query_recent`] reports
//! [`StoreError::MissingIndex`] instead of silently scanning, so callers
//! exercise the same recovery path a hosted store would force on them.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, ErrorCode, OpenFlags, params};
use uuid::Uuid;

use super::{Exchange, HistoryStore, StoreError};

/// Name of the creation-time index.
pub const CREATED_AT_INDEX: &str = "idx_interviews_created_at";

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS interviews (
    id            TEXT PRIMARY KEY,
    job_context   TEXT NOT NULL,
    transcript    TEXT NOT NULL,
    answer        TEXT NOT NULL,
    created_at    TEXT NOT NULL,      -- RFC 3339
    created_at_ms INTEGER NOT NULL
);
"#;

const INDEX_SQL: &str =
    "CREATE INDEX IF NOT EXISTS idx_interviews_created_at ON interviews(created_at_ms)";

const SELECT_COLUMNS: &str = "SELECT id, job_context, transcript, answer, created_at, created_at_ms FROM interviews";

/// SQLite history store guarded by a connection mutex.
pub struct SqliteHistoryStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteHistoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteHistoryStore").finish_non_exhaustive()
    }
}

impl SqliteHistoryStore {
    /// Open (or create) the database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or the schema applied.
    pub fn open(path: &Path, create_index: bool) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Backend(format!("cannot create {}: {e}", parent.display())))?;
        }
        let conn = Connection::open(path).map_err(map_sqlite_error)?;
        Self::with_connection(conn, create_index)
    }

    /// Open an existing database without write access.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn open_read_only(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(map_sqlite_error)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be applied.
    pub fn open_in_memory(create_index: bool) -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(map_sqlite_error)?;
        Self::with_connection(conn, create_index)
    }

    fn with_connection(conn: Connection, create_index: bool) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA_SQL).map_err(map_sqlite_error)?;
        if create_index {
            conn.execute(INDEX_SQL, []).map_err(map_sqlite_error)?;
        }
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Whether the creation-time index exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be queried.
    pub fn has_index(&self) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        index_exists(&conn)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Backend(format!("lock poisoned: {e}")))
    }
}

#[async_trait]
impl HistoryStore for SqliteHistoryStore {
    async fn append(&self, exchange: Exchange) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO interviews (id, job_context, transcript, answer, created_at, created_at_ms) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id,
                exchange.job_context,
                exchange.transcript,
                exchange.answer,
                exchange.created_at.to_rfc3339(),
                exchange.created_at.timestamp_millis(),
            ],
        )
        .map_err(map_sqlite_error)?;
        Ok(id)
    }

    async fn query_recent(&self, limit: usize) -> Result<Vec<Exchange>, StoreError> {
        let conn = self.lock()?;
        if !index_exists(&conn)? {
            return Err(StoreError::MissingIndex(format!(
                "{CREATED_AT_INDEX} is not defined on interviews"
            )));
        }
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let sql = format!("{SELECT_COLUMNS} ORDER BY created_at_ms DESC LIMIT ?1");
        let mut stmt = conn.prepare(&sql).map_err(map_sqlite_error)?;
        let rows = stmt
            .query_map(params![limit], row_to_exchange)
            .map_err(map_sqlite_error)?;
        collect_rows(rows)
    }

    async fn fetch_all(&self) -> Result<Vec<Exchange>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(SELECT_COLUMNS).map_err(map_sqlite_error)?;
        let rows = stmt
            .query_map([], row_to_exchange)
            .map_err(map_sqlite_error)?;
        collect_rows(rows)
    }
}

fn index_exists(conn: &Connection) -> Result<bool, StoreError> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name = ?1",
            params![CREATED_AT_INDEX],
            |row| row.get(0),
        )
        .map_err(map_sqlite_error)?;
    Ok(count > 0)
}

fn collect_rows(
    rows: impl Iterator<Item = rusqlite::Result<Exchange>>,
) -> Result<Vec<Exchange>, StoreError> {
    let mut out = Vec::new();
    for r in rows {
        out.push(r.map_err(map_sqlite_error)?);
    }
    Ok(out)
}

fn row_to_exchange(row: &rusqlite::Row<'_>) -> rusqlite::Result<Exchange> {
    let created_at_text: String = row.get(4)?;
    let created_at_ms: i64 = row.get(5)?;
    let created_at = DateTime::parse_from_rfc3339(&created_at_text)
        .map(|d| d.with_timezone(&Utc))
        .ok()
        .or_else(|| DateTime::<Utc>::from_timestamp_millis(created_at_ms))
        .unwrap_or_default();

    Ok(Exchange {
        id: Some(row.get(0)?),
        job_context: row.get(1)?,
        transcript: row.get(2)?,
        answer: row.get(3)?,
        created_at,
    })
}

fn map_sqlite_error(e: rusqlite::Error) -> StoreError {
    match e.sqlite_error_code() {
        Some(ErrorCode::ReadOnly)
        | Some(ErrorCode::PermissionDenied)
        | Some(ErrorCode::AuthorizationForStatementDenied) => {
            StoreError::PermissionDenied(e.to_string())
        }
        _ => StoreError::Backend(format!("SQLite error: {e}")),
    }
}
