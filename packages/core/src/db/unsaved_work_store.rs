//! SQL for the `unsaved_work` table

use crate::db::database::{format_timestamp, parse_timestamp};
use crate::db::error::DatabaseError;
use crate::models::UnsavedWork;
use chrono::{DateTime, Utc};
use libsql::Connection;

/// Insert or replace the snapshot for (`user`, `path`)
pub async fn db_upsert_unsaved_work(
    conn: &Connection,
    user: &str,
    path: &str,
    work: &str,
    updated: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO unsaved_work (user_id, path, work, updated) VALUES (?, ?, ?, ?)
         ON CONFLICT (user_id, path) DO UPDATE SET work = excluded.work, updated = excluded.updated",
        (user, path, work, format_timestamp(updated)),
    )
    .await
    .map_err(|e| DatabaseError::statement("Failed to save unsaved work", e))?;
    Ok(())
}

pub async fn db_get_unsaved_work(
    conn: &Connection,
    user: &str,
    path: &str,
) -> Result<Option<UnsavedWork>, DatabaseError> {
    let mut rows = conn
        .query(
            "SELECT id, user_id, path, work, updated FROM unsaved_work WHERE user_id = ? AND path = ?",
            (user, path),
        )
        .await
        .map_err(|e| DatabaseError::statement("Failed to query unsaved work", e))?;

    let Some(row) = rows.next().await? else {
        return Ok(None);
    };

    let updated: String = row.get(4)?;
    Ok(Some(UnsavedWork {
        id: row.get(0)?,
        user: row.get(1)?,
        path: row.get(2)?,
        work: row.get(3)?,
        updated: parse_timestamp(&updated)?,
    }))
}

pub async fn db_delete_unsaved_work(
    conn: &Connection,
    user: &str,
    path: &str,
) -> Result<u64, DatabaseError> {
    conn.execute(
        "DELETE FROM unsaved_work WHERE user_id = ? AND path = ?",
        (user, path),
    )
    .await
    .map_err(|e| DatabaseError::statement("Failed to discard unsaved work", e))
}

/// Delete every snapshot last updated before `cutoff`
pub async fn db_delete_unsaved_work_before(
    conn: &Connection,
    cutoff: DateTime<Utc>,
) -> Result<u64, DatabaseError> {
    conn.execute(
        "DELETE FROM unsaved_work WHERE updated < ?",
        [format_timestamp(cutoff)],
    )
    .await
    .map_err(|e| DatabaseError::statement("Failed to purge unsaved work", e))
}
