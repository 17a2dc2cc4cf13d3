//! SQL for the `blocks` base table and its variant tables
//!
//! Blocks are read with a LEFT JOIN onto every variant table; the
//! `block_type` discriminator decides which joined columns are meaningful.

use crate::db::database::{format_timestamp, parse_timestamp};
use crate::db::error::DatabaseError;
use crate::models::{Block, BlockId, BlockKind, BlockType, PageId, TextBlock};
use chrono::{DateTime, Utc};
use libsql::{Connection, Row};

const BLOCK_SELECT: &str = "SELECT b.id, b.page_id, b.block_type, b.position, b.published, b.created, t.content
     FROM blocks b
     LEFT JOIN text_blocks t ON t.block_id = b.id";

fn row_to_block(row: &Row) -> Result<Block, DatabaseError> {
    let id: i64 = row.get(0)?;
    let page_id: i64 = row.get(1)?;
    let block_type: String = row.get(2)?;
    let position: i64 = row.get(3)?;
    let published: i64 = row.get(4)?;
    let created: String = row.get(5)?;
    let content: Option<String> = row.get(6)?;

    let block_type: BlockType = block_type
        .parse()
        .map_err(|e| DatabaseError::row_conversion(format!("Block {}: {}", id, e)))?;

    let kind = match block_type {
        BlockType::Block => BlockKind::Generic,
        BlockType::Text => BlockKind::Text(TextBlock {
            content: content.ok_or_else(|| {
                DatabaseError::row_conversion(format!("Text block {} has no text row", id))
            })?,
        }),
    };

    let position = i32::try_from(position).map_err(|_| {
        DatabaseError::row_conversion(format!("Block {} position {} out of range", id, position))
    })?;

    Ok(Block {
        id,
        page_id,
        position,
        published: published != 0,
        created: parse_timestamp(&created)?,
        kind,
    })
}

async fn query_blocks(
    conn: &Connection,
    sql: &str,
    params: impl libsql::params::IntoParams,
) -> Result<Vec<Block>, DatabaseError> {
    let mut rows = conn
        .query(sql, params)
        .await
        .map_err(|e| DatabaseError::statement("Failed to query blocks", e))?;

    let mut blocks = Vec::new();
    while let Some(row) = rows.next().await? {
        blocks.push(row_to_block(&row)?);
    }
    Ok(blocks)
}

pub async fn db_get_block(conn: &Connection, id: BlockId) -> Result<Option<Block>, DatabaseError> {
    let sql = format!("{} WHERE b.id = ?", BLOCK_SELECT);
    Ok(query_blocks(conn, &sql, [id]).await?.into_iter().next())
}

/// Blocks of a page in position order
pub async fn db_get_blocks_for_page(
    conn: &Connection,
    page_id: PageId,
) -> Result<Vec<Block>, DatabaseError> {
    let sql = format!("{} WHERE b.page_id = ? ORDER BY b.position", BLOCK_SELECT);
    query_blocks(conn, &sql, [page_id]).await
}

/// (id, position) of every block on a page, ascending by position
pub async fn db_get_positions(
    conn: &Connection,
    page_id: PageId,
) -> Result<Vec<(BlockId, i32)>, DatabaseError> {
    let mut rows = conn
        .query(
            "SELECT id, position FROM blocks WHERE page_id = ? ORDER BY position",
            [page_id],
        )
        .await
        .map_err(|e| DatabaseError::statement("Failed to query positions", e))?;

    let mut positions = Vec::new();
    while let Some(row) = rows.next().await? {
        let id: i64 = row.get(0)?;
        let position: i64 = row.get(1)?;
        positions.push((id, position as i32));
    }
    Ok(positions)
}

/// Page that owns `id`, if the block exists
pub async fn db_get_block_page(
    conn: &Connection,
    id: BlockId,
) -> Result<Option<PageId>, DatabaseError> {
    let mut rows = conn
        .query("SELECT page_id FROM blocks WHERE id = ?", [id])
        .await
        .map_err(|e| DatabaseError::statement("Failed to query block page", e))?;

    match rows.next().await? {
        Some(row) => Ok(Some(row.get::<i64>(0)?)),
        None => Ok(None),
    }
}

/// Insert the base row and the variant row, returning the new id
///
/// Fails with `DatabaseError::UniqueViolation` when `position` is taken.
pub async fn db_insert_block(
    conn: &Connection,
    page_id: PageId,
    position: i32,
    published: bool,
    created: DateTime<Utc>,
    kind: &BlockKind,
) -> Result<BlockId, DatabaseError> {
    conn.execute(
        "INSERT INTO blocks (page_id, block_type, position, published, created) VALUES (?, ?, ?, ?, ?)",
        (
            page_id,
            kind.block_type().as_str(),
            position,
            published as i64,
            format_timestamp(created),
        ),
    )
    .await
    .map_err(|e| DatabaseError::statement("Failed to insert block", e))?;

    let id = conn.last_insert_rowid();
    db_insert_variant_row(conn, id, kind).await?;
    Ok(id)
}

/// Insert the derived-table row for `kind` (nothing for the generic type)
pub async fn db_insert_variant_row(
    conn: &Connection,
    id: BlockId,
    kind: &BlockKind,
) -> Result<(), DatabaseError> {
    match kind {
        BlockKind::Generic => Ok(()),
        BlockKind::Text(text) => {
            conn.execute(
                "INSERT INTO text_blocks (block_id, content) VALUES (?, ?)",
                (id, text.content.as_str()),
            )
            .await
            .map_err(|e| DatabaseError::statement("Failed to insert text block", e))?;
            Ok(())
        }
    }
}

pub async fn db_set_block_type(
    conn: &Connection,
    id: BlockId,
    block_type: BlockType,
) -> Result<u64, DatabaseError> {
    conn.execute(
        "UPDATE blocks SET block_type = ? WHERE id = ?",
        (block_type.as_str(), id),
    )
    .await
    .map_err(|e| DatabaseError::statement("Failed to set block type", e))
}

pub async fn db_set_position(
    conn: &Connection,
    id: BlockId,
    position: i32,
) -> Result<u64, DatabaseError> {
    conn.execute(
        "UPDATE blocks SET position = ? WHERE id = ?",
        (position, id),
    )
    .await
    .map_err(|e| DatabaseError::statement("Failed to set block position", e))
}

/// Re-home a block onto another page at `position`
pub async fn db_move_block(
    conn: &Connection,
    id: BlockId,
    page_id: PageId,
    position: i32,
) -> Result<u64, DatabaseError> {
    conn.execute(
        "UPDATE blocks SET page_id = ?, position = ? WHERE id = ?",
        (page_id, position, id),
    )
    .await
    .map_err(|e| DatabaseError::statement("Failed to move block", e))
}

pub async fn db_set_published(
    conn: &Connection,
    id: BlockId,
    published: bool,
) -> Result<u64, DatabaseError> {
    conn.execute(
        "UPDATE blocks SET published = ? WHERE id = ?",
        (published as i64, id),
    )
    .await
    .map_err(|e| DatabaseError::statement("Failed to publish block", e))
}

pub async fn db_update_text_content(
    conn: &Connection,
    id: BlockId,
    content: &str,
) -> Result<u64, DatabaseError> {
    conn.execute(
        "UPDATE text_blocks SET content = ? WHERE block_id = ?",
        (content, id),
    )
    .await
    .map_err(|e| DatabaseError::statement("Failed to update block content", e))
}

pub async fn db_delete_block(conn: &Connection, id: BlockId) -> Result<u64, DatabaseError> {
    conn.execute("DELETE FROM blocks WHERE id = ?", [id])
        .await
        .map_err(|e| DatabaseError::statement("Failed to delete block", e))
}

/// Unpublished blocks created before `cutoff`
pub async fn db_get_unpublished_before(
    conn: &Connection,
    cutoff: DateTime<Utc>,
) -> Result<Vec<BlockId>, DatabaseError> {
    let mut rows = conn
        .query(
            "SELECT id FROM blocks WHERE published = 0 AND created < ? ORDER BY id",
            [format_timestamp(cutoff)],
        )
        .await
        .map_err(|e| DatabaseError::statement("Failed to query stale blocks", e))?;

    let mut ids = Vec::new();
    while let Some(row) = rows.next().await? {
        ids.push(row.get::<i64>(0)?);
    }
    Ok(ids)
}
