//! SQL for the `block_references` table

use crate::db::error::DatabaseError;
use crate::models::{BlockId, PageId, Reference, ReferenceId, ReferenceTarget};
use libsql::{Connection, Row};

const REFERENCE_COLUMNS: &str =
    "r.id, r.containing_block_id, r.referenced_page_id, r.referenced_block_id";

/// References that point at a page or at any block on it
const TARGETS_PAGE: &str = "(referenced_page_id = ?1
      OR referenced_block_id IN (SELECT id FROM blocks WHERE page_id = ?1))";

fn row_to_reference(row: &Row) -> Result<Reference, DatabaseError> {
    let id: i64 = row.get(0)?;
    let containing_block: i64 = row.get(1)?;
    let referenced_page: Option<i64> = row.get(2)?;
    let referenced_block: Option<i64> = row.get(3)?;

    let target = ReferenceTarget::from_parts(referenced_page, referenced_block)
        .map_err(|e| DatabaseError::row_conversion(format!("Reference {}: {}", id, e)))?;

    Ok(Reference {
        id,
        containing_block,
        target,
    })
}

async fn query_references(
    conn: &Connection,
    sql: &str,
    params: impl libsql::params::IntoParams,
) -> Result<Vec<Reference>, DatabaseError> {
    let mut rows = conn
        .query(sql, params)
        .await
        .map_err(|e| DatabaseError::statement("Failed to query references", e))?;

    let mut references = Vec::new();
    while let Some(row) = rows.next().await? {
        references.push(row_to_reference(&row)?);
    }
    Ok(references)
}

pub async fn db_insert_reference(
    conn: &Connection,
    containing_block: BlockId,
    target: ReferenceTarget,
) -> Result<ReferenceId, DatabaseError> {
    conn.execute(
        "INSERT INTO block_references (containing_block_id, referenced_page_id, referenced_block_id)
         VALUES (?, ?, ?)",
        (containing_block, target.page_id(), target.block_id()),
    )
    .await
    .map_err(|e| DatabaseError::statement("Failed to insert reference", e))?;

    Ok(conn.last_insert_rowid())
}

pub async fn db_get_reference(
    conn: &Connection,
    id: ReferenceId,
) -> Result<Option<Reference>, DatabaseError> {
    let sql = format!(
        "SELECT {} FROM block_references r WHERE r.id = ?",
        REFERENCE_COLUMNS
    );
    Ok(query_references(conn, &sql, [id]).await?.into_iter().next())
}

/// References contained in a block, ordered by id
pub async fn db_get_references_for_block(
    conn: &Connection,
    block_id: BlockId,
) -> Result<Vec<Reference>, DatabaseError> {
    let sql = format!(
        "SELECT {} FROM block_references r WHERE r.containing_block_id = ? ORDER BY r.id",
        REFERENCE_COLUMNS
    );
    query_references(conn, &sql, [block_id]).await
}

pub async fn db_delete_reference(conn: &Connection, id: ReferenceId) -> Result<u64, DatabaseError> {
    conn.execute("DELETE FROM block_references WHERE id = ?", [id])
        .await
        .map_err(|e| DatabaseError::statement("Failed to delete reference", e))
}

/// Drop references to `block_id` held by unpublished blocks
pub async fn db_release_unpublished_references_to_block(
    conn: &Connection,
    block_id: BlockId,
) -> Result<u64, DatabaseError> {
    conn.execute(
        "DELETE FROM block_references
         WHERE referenced_block_id = ?1
           AND containing_block_id IN (SELECT id FROM blocks WHERE published = 0)",
        [block_id],
    )
    .await
    .map_err(|e| DatabaseError::statement("Failed to release block references", e))
}

/// References to `block_id` held by published blocks other than itself
pub async fn db_published_references_to_block(
    conn: &Connection,
    block_id: BlockId,
) -> Result<Vec<Reference>, DatabaseError> {
    let sql = format!(
        "SELECT {} FROM block_references r
         JOIN blocks c ON c.id = r.containing_block_id
         WHERE r.referenced_block_id = ?1 AND c.published = 1 AND c.id != ?1
         ORDER BY r.id",
        REFERENCE_COLUMNS
    );
    query_references(conn, &sql, [block_id]).await
}

/// Drop references to a page (or its blocks) held by unpublished blocks
pub async fn db_release_unpublished_references_to_page(
    conn: &Connection,
    page_id: PageId,
) -> Result<u64, DatabaseError> {
    let sql = format!(
        "DELETE FROM block_references
         WHERE {}
           AND containing_block_id IN (SELECT id FROM blocks WHERE published = 0)",
        TARGETS_PAGE
    );
    conn.execute(&sql, [page_id])
        .await
        .map_err(|e| DatabaseError::statement("Failed to release page references", e))
}

/// References to a page (or its blocks) held by published blocks on other pages
///
/// References from the page's own blocks disappear with the page and never block
/// its deletion.
pub async fn db_published_references_to_page(
    conn: &Connection,
    page_id: PageId,
) -> Result<Vec<Reference>, DatabaseError> {
    let sql = format!(
        "SELECT {} FROM block_references r
         JOIN blocks c ON c.id = r.containing_block_id
         WHERE {} AND c.published = 1 AND c.page_id != ?1
         ORDER BY r.id",
        REFERENCE_COLUMNS, TARGETS_PAGE
    );
    query_references(conn, &sql, [page_id]).await
}
