//! Database Connection Management
//!
//! This module provides the database connection, schema initialization and
//! transaction helpers used by every store module.
//!
//! # Architecture
//!
//! - **Path-agnostic**: Accepts any valid PathBuf
//! - **WAL mode**: Write-Ahead Logging for concurrent readers
//! - **Foreign keys**: Enabled on every connection (SQLite scopes the pragma per connection)
//! - **Separate variant rows**: `blocks` holds shared fields, `text_blocks` the text variant
//!
//! # Database Connection Patterns
//!
//! **ALWAYS use `connect_with_timeout()` in async functions.** It sets a busy
//! timeout so concurrent writers wait instead of failing with `SQLITE_BUSY`,
//! and turns on foreign key enforcement for the connection.
//!
//! Multi-row mutations are wrapped with [`begin_transaction`] and
//! [`finish_transaction`]; the latter commits on `Ok` and rolls back on `Err`.
//!
//! ```no_run
//! # use pagetree_core::db::DatabaseService;
//! # use std::path::PathBuf;
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let db_service = DatabaseService::new(PathBuf::from("./data/pagetree.db")).await?;
//! let conn = db_service.connect_with_timeout().await?;
//! # Ok(())
//! # }
//! ```

use crate::db::error::DatabaseError;
use chrono::{DateTime, NaiveDateTime, Utc};
use libsql::{Builder, Connection, Database};
use std::path::PathBuf;
use std::sync::Arc;

/// Storage format for every timestamp column (UTC, lexicographically ordered)
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Busy timeout applied to every connection, in milliseconds
const BUSY_TIMEOUT_MS: u32 = 5000;

/// Tables created at startup, in dependency order
const SCHEMA: &[(&str, &str)] = &[
    (
        "pages",
        "CREATE TABLE IF NOT EXISTS pages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            uuid TEXT NOT NULL UNIQUE,
            -- Pages with children cannot be deleted
            parent_id INTEGER REFERENCES pages(id),
            title TEXT NOT NULL,
            slug TEXT NOT NULL,
            denormalised_path TEXT NOT NULL DEFAULT '',
            denormalised_titles TEXT NOT NULL DEFAULT '',
            UNIQUE (denormalised_path, slug)
        )",
    ),
    (
        "blocks",
        "CREATE TABLE IF NOT EXISTS blocks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            page_id INTEGER NOT NULL REFERENCES pages(id) ON DELETE CASCADE,
            block_type TEXT NOT NULL DEFAULT 'block',
            position INTEGER NOT NULL,
            published INTEGER NOT NULL DEFAULT 0,
            created TEXT NOT NULL,
            UNIQUE (page_id, position)
        )",
    ),
    (
        "text_blocks",
        "CREATE TABLE IF NOT EXISTS text_blocks (
            block_id INTEGER PRIMARY KEY REFERENCES blocks(id) ON DELETE CASCADE,
            content TEXT NOT NULL DEFAULT ''
        )",
    ),
    (
        "block_references",
        "CREATE TABLE IF NOT EXISTS block_references (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            containing_block_id INTEGER NOT NULL REFERENCES blocks(id) ON DELETE CASCADE,
            -- Targets are protected: deleting a referenced row fails while the reference exists
            referenced_page_id INTEGER REFERENCES pages(id),
            referenced_block_id INTEGER REFERENCES blocks(id),
            CHECK ((referenced_page_id IS NULL) <> (referenced_block_id IS NULL))
        )",
    ),
    (
        "unsaved_work",
        "CREATE TABLE IF NOT EXISTS unsaved_work (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL,
            path TEXT NOT NULL,
            work TEXT NOT NULL,
            updated TEXT NOT NULL,
            UNIQUE (user_id, path)
        )",
    ),
];

const INDEXES: &[(&str, &str)] = &[
    (
        "idx_pages_parent",
        "CREATE INDEX IF NOT EXISTS idx_pages_parent ON pages(parent_id)",
    ),
    (
        "idx_blocks_unpublished",
        "CREATE INDEX IF NOT EXISTS idx_blocks_unpublished ON blocks(published, created)",
    ),
    (
        "idx_references_containing",
        "CREATE INDEX IF NOT EXISTS idx_references_containing ON block_references(containing_block_id)",
    ),
    (
        "idx_references_page",
        "CREATE INDEX IF NOT EXISTS idx_references_page ON block_references(referenced_page_id)",
    ),
    (
        "idx_references_block",
        "CREATE INDEX IF NOT EXISTS idx_references_block ON block_references(referenced_block_id)",
    ),
    (
        "idx_unsaved_work_updated",
        "CREATE INDEX IF NOT EXISTS idx_unsaved_work_updated ON unsaved_work(updated)",
    ),
];

/// Database service for managing the libsql connection and schema
#[derive(Debug, Clone)]
pub struct DatabaseService {
    /// libsql database handle (wrapped in Arc for sharing)
    pub db: Arc<Database>,

    /// Path to the database file
    pub db_path: PathBuf,
}

impl DatabaseService {
    /// Open (or create) the database at `db_path` and initialize the schema
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if:
    /// - Parent directory cannot be created
    /// - Database connection fails
    /// - Schema initialization fails
    pub async fn new(db_path: PathBuf) -> Result<Self, DatabaseError> {
        let is_new_database = !db_path.exists();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    if e.kind() == std::io::ErrorKind::PermissionDenied {
                        DatabaseError::permission_denied(db_path.clone())
                    } else {
                        DatabaseError::DirectoryCreationFailed(e)
                    }
                })?;
            }
        }

        let db = Builder::new_local(&db_path)
            .build()
            .await
            .map_err(|e| DatabaseError::connection_failed(db_path.clone(), e))?;

        let service = Self {
            db: Arc::new(db),
            db_path,
        };

        service.initialize_schema(is_new_database).await?;
        tracing::debug!("Opened database at {}", service.db_path.display());

        Ok(service)
    }

    /// Execute a PRAGMA statement
    ///
    /// PRAGMA statements return rows, so we must use query() instead of execute().
    async fn execute_pragma(&self, conn: &Connection, pragma: &str) -> Result<(), DatabaseError> {
        let mut stmt = conn.prepare(pragma).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        let _ = stmt.query(()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        Ok(())
    }

    /// Create tables and indexes (idempotent)
    async fn initialize_schema(&self, is_new_database: bool) -> Result<(), DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        self.execute_pragma(&conn, "PRAGMA journal_mode = WAL")
            .await?;

        for (table, ddl) in SCHEMA {
            conn.execute(ddl, ()).await.map_err(|e| {
                DatabaseError::initialization_failed(format!(
                    "Failed to create {} table: {}",
                    table, e
                ))
            })?;
        }

        for (index, ddl) in INDEXES {
            conn.execute(ddl, ()).await.map_err(|e| {
                DatabaseError::initialization_failed(format!(
                    "Failed to create index '{}': {}",
                    index, e
                ))
            })?;
        }

        // Flush the fresh schema so other connections see it immediately
        if is_new_database {
            self.execute_pragma(&conn, "PRAGMA wal_checkpoint(TRUNCATE)")
                .await?;
        }

        Ok(())
    }

    /// Get a bare connection
    ///
    /// Foreign keys and the busy timeout are NOT configured; prefer
    /// `connect_with_timeout()`.
    pub fn connect(&self) -> Result<Connection, DatabaseError> {
        self.db.connect().map_err(DatabaseError::LibsqlError)
    }

    /// Get a connection with busy timeout and foreign key enforcement
    pub async fn connect_with_timeout(&self) -> Result<Connection, DatabaseError> {
        let conn = self.connect()?;

        self.execute_pragma(&conn, &format!("PRAGMA busy_timeout = {}", BUSY_TIMEOUT_MS))
            .await?;
        self.execute_pragma(&conn, "PRAGMA foreign_keys = ON")
            .await?;

        Ok(conn)
    }
}

/// Start a write transaction, taking the write lock up front
pub async fn begin_transaction(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute("BEGIN IMMEDIATE", ())
        .await
        .map_err(|e| DatabaseError::sql_execution(format!("Failed to begin transaction: {}", e)))?;
    Ok(())
}

/// Commit if `result` is `Ok`, roll back otherwise
///
/// Every transaction opened with [`begin_transaction`] must be closed here so
/// that no exit path leaves it open.
pub async fn finish_transaction<T, E>(conn: &Connection, result: Result<T, E>) -> Result<T, E>
where
    E: From<DatabaseError>,
{
    match result {
        Ok(value) => {
            if let Err(e) = conn.execute("COMMIT", ()).await {
                let _rollback = conn.execute("ROLLBACK", ()).await;
                return Err(DatabaseError::sql_execution(format!(
                    "Failed to commit transaction: {}",
                    e
                ))
                .into());
            }
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_err) = conn.execute("ROLLBACK", ()).await {
                tracing::warn!("Failed to roll back transaction: {}", rollback_err);
            }
            Err(e)
        }
    }
}

/// Format a timestamp for storage
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a stored timestamp - handles both the storage format and RFC3339
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, DatabaseError> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT) {
        return Ok(naive.and_utc());
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    Err(DatabaseError::row_conversion(format!(
        "Unable to parse timestamp '{}'",
        s
    )))
}
