//! SQL for the `pages` table
//!
//! Every function takes the connection to run on so callers can compose them
//! inside a single transaction.

use crate::db::error::DatabaseError;
use crate::models::{Page, PageId};
use libsql::{Connection, Row};
use uuid::Uuid;

const PAGE_COLUMNS: &str =
    "id, uuid, parent_id, title, slug, denormalised_path, denormalised_titles";

/// Convert a row selected with `PAGE_COLUMNS` into a Page
fn row_to_page(row: &Row) -> Result<Page, DatabaseError> {
    let id: i64 = row.get(0)?;
    let uuid_str: String = row.get(1)?;
    let parent_id: Option<i64> = row.get(2)?;
    let title: String = row.get(3)?;
    let slug: String = row.get(4)?;
    let denormalised_path: String = row.get(5)?;
    let denormalised_titles: String = row.get(6)?;

    let uuid = Uuid::parse_str(&uuid_str).map_err(|e| {
        DatabaseError::row_conversion(format!("Invalid uuid '{}' on page {}: {}", uuid_str, id, e))
    })?;

    Ok(Page::from_stored(
        id,
        uuid,
        parent_id,
        title,
        slug,
        denormalised_path,
        denormalised_titles,
    ))
}

async fn query_pages(
    conn: &Connection,
    sql: &str,
    params: impl libsql::params::IntoParams,
) -> Result<Vec<Page>, DatabaseError> {
    let mut rows = conn
        .query(sql, params)
        .await
        .map_err(|e| DatabaseError::statement("Failed to query pages", e))?;

    let mut pages = Vec::new();
    while let Some(row) = rows.next().await? {
        pages.push(row_to_page(&row)?);
    }
    Ok(pages)
}

pub async fn db_get_page(conn: &Connection, id: PageId) -> Result<Option<Page>, DatabaseError> {
    let sql = format!("SELECT {} FROM pages WHERE id = ?", PAGE_COLUMNS);
    Ok(query_pages(conn, &sql, [id]).await?.into_iter().next())
}

pub async fn db_get_page_by_uuid(
    conn: &Connection,
    uuid: &Uuid,
) -> Result<Option<Page>, DatabaseError> {
    let sql = format!("SELECT {} FROM pages WHERE uuid = ?", PAGE_COLUMNS);
    Ok(query_pages(conn, &sql, [uuid.to_string()])
        .await?
        .into_iter()
        .next())
}

pub async fn db_get_page_by_path(
    conn: &Connection,
    path: &str,
    slug: &str,
) -> Result<Option<Page>, DatabaseError> {
    let sql = format!(
        "SELECT {} FROM pages WHERE denormalised_path = ? AND slug = ?",
        PAGE_COLUMNS
    );
    Ok(query_pages(conn, &sql, (path, slug))
        .await?
        .into_iter()
        .next())
}

/// Children of `parent` (top-level pages for `None`), ordered by title then id
pub async fn db_get_children(
    conn: &Connection,
    parent: Option<PageId>,
) -> Result<Vec<Page>, DatabaseError> {
    let sql = format!(
        "SELECT {} FROM pages WHERE parent_id IS ? ORDER BY title, id",
        PAGE_COLUMNS
    );
    query_pages(conn, &sql, [parent]).await
}

/// The parent of `id`: `None` if the page doesn't exist, `Some(None)` at top level
pub async fn db_get_parent_id(
    conn: &Connection,
    id: PageId,
) -> Result<Option<Option<PageId>>, DatabaseError> {
    let mut rows = conn
        .query("SELECT parent_id FROM pages WHERE id = ?", [id])
        .await
        .map_err(|e| DatabaseError::statement("Failed to query parent", e))?;

    match rows.next().await? {
        Some(row) => Ok(Some(row.get::<Option<i64>>(0)?)),
        None => Ok(None),
    }
}

/// Whether another page already occupies (`path`, `slug`)
pub async fn db_path_taken(
    conn: &Connection,
    path: &str,
    slug: &str,
    exclude: PageId,
) -> Result<bool, DatabaseError> {
    let mut rows = conn
        .query(
            "SELECT 1 FROM pages WHERE denormalised_path = ? AND slug = ? AND id != ? LIMIT 1",
            (path, slug, exclude),
        )
        .await
        .map_err(|e| DatabaseError::statement("Failed to check path", e))?;

    Ok(rows.next().await?.is_some())
}

/// Insert a new page and return its id
pub async fn db_insert_page(conn: &Connection, page: &Page) -> Result<PageId, DatabaseError> {
    conn.execute(
        "INSERT INTO pages (uuid, parent_id, title, slug, denormalised_path, denormalised_titles)
         VALUES (?, ?, ?, ?, ?, ?)",
        (
            page.uuid.to_string(),
            page.parent_id,
            page.title.as_str(),
            page.slug.as_str(),
            page.denormalised_path.as_str(),
            page.denormalised_titles.as_str(),
        ),
    )
    .await
    .map_err(|e| DatabaseError::statement("Failed to insert page", e))?;

    Ok(conn.last_insert_rowid())
}

pub async fn db_update_page(conn: &Connection, page: &Page) -> Result<u64, DatabaseError> {
    conn.execute(
        "UPDATE pages SET parent_id = ?, title = ?, slug = ?, denormalised_path = ?, denormalised_titles = ?
         WHERE id = ?",
        (
            page.parent_id,
            page.title.as_str(),
            page.slug.as_str(),
            page.denormalised_path.as_str(),
            page.denormalised_titles.as_str(),
            page.id,
        ),
    )
    .await
    .map_err(|e| DatabaseError::statement("Failed to update page", e))
}

/// Overwrite only the cached ancestor path and titles of a page
pub async fn db_update_page_cache(
    conn: &Connection,
    id: PageId,
    path: &str,
    titles: &str,
) -> Result<u64, DatabaseError> {
    conn.execute(
        "UPDATE pages SET denormalised_path = ?, denormalised_titles = ? WHERE id = ?",
        (path, titles, id),
    )
    .await
    .map_err(|e| DatabaseError::statement("Failed to update page path", e))
}

pub async fn db_delete_page(conn: &Connection, id: PageId) -> Result<u64, DatabaseError> {
    conn.execute("DELETE FROM pages WHERE id = ?", [id])
        .await
        .map_err(|e| DatabaseError::statement("Failed to delete page", e))
}
