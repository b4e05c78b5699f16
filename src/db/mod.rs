//! Database layer for the gallery.
//!
//! The images, folders and file_paths tables are written by the external
//! scoring pipeline; this layer only reads them, except for the few
//! user-editable image fields and the derived stack_cache table.

mod schema;
pub mod filter;
pub mod images;
pub mod stacks;

use rusqlite::types::Value;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use filter::{ColorLabel, ImageFilter, ListQuery, SortColumn, SortOrder};
pub use images::{Folder, ImageDetail, ImageRow};
pub use schema::{MIGRATIONS, SCHEMA};
pub use stacks::{StackCacheManager, StackItem};

/// Tag of the platform-specific path override preferred for display.
pub const DEFAULT_PATH_TYPE: &str = "WIN";

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("database task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type DbResult<T> = Result<T, DbError>;

/// Handle to the gallery database.
///
/// Holds only the database path: every operation opens a fresh connection,
/// runs one unit of work on it, and drops it. No pooling, no shared
/// connection state between requests.
#[derive(Debug, Clone)]
pub struct Database {
    path: PathBuf,
    path_type: String,
}

impl Database {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            path_type: DEFAULT_PATH_TYPE.to_string(),
        }
    }

    pub fn with_path_type(path: impl Into<PathBuf>, path_type: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            path_type: path_type.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn path_type(&self) -> &str {
        &self.path_type
    }

    /// Create the base schema and run additive migrations. The scoring
    /// pipeline normally owns table creation; this exists for fresh
    /// databases and tests.
    pub async fn initialize(&self) -> DbResult<()> {
        self.with_conn(|conn| {
            conn.execute_batch(SCHEMA)?;
            for migration in MIGRATIONS {
                // Additive ALTERs fail harmlessly when the column exists
                let _ = conn.execute(migration, []);
            }
            Ok(())
        })
        .await
    }

    /// Run one unit of blocking database work on its own connection. The
    /// connection is dropped when the closure returns, success or failure.
    pub(crate) async fn with_conn<T, F>(&self, f: F) -> DbResult<T>
    where
        F: FnOnce(&Connection) -> Result<T, rusqlite::Error> + Send + 'static,
        T: Send + 'static,
    {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || -> DbResult<T> {
            let conn = Connection::open(&path)?;
            // SQLite's LIKE is case-insensitive by default; the keyword
            // filter is a case-sensitive substring test.
            conn.pragma_update(None, "case_sensitive_like", true)?;
            Ok(f(&conn)?)
        })
        .await?
    }
}

/// Decode a TEXT or BLOB column tolerantly. The pipeline has stored the
/// free-text columns both ways over time.
pub(crate) fn text_value(value: Value) -> Option<String> {
    match value {
        Value::Text(s) => Some(s),
        Value::Blob(b) => Some(String::from_utf8_lossy(&b).into_owned()),
        Value::Integer(i) => Some(i.to_string()),
        Value::Real(f) => Some(f.to_string()),
        Value::Null => None,
    }
}

/// Normalize a stored timestamp to ISO-8601. SQLite's CURRENT_TIMESTAMP
/// writes `YYYY-MM-DD HH:MM:SS`; RFC 3339 input passes through unchanged.
pub(crate) fn iso8601(raw: &str) -> String {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(raw) {
        return dt.to_rfc3339();
    }
    if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f") {
        return dt.and_utc().to_rfc3339();
    }
    raw.to_string()
}

/// Numeric sort key for a stored timestamp, in epoch seconds.
pub(crate) fn timestamp_key(raw: &str) -> f64 {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(raw) {
        return dt.timestamp() as f64;
    }
    if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f") {
        return dt.and_utc().timestamp() as f64;
    }
    0.0
}
