//! Cycle checks for page re-parenting

use crate::db::page_store::db_get_parent_id;
use crate::models::{Page, PageId};
use crate::services::error::CmsError;
use libsql::Connection;
use std::collections::HashSet;

/// Reject a parent assignment that would make `page` its own ancestor
///
/// No walk is needed when the page is new (nothing can point at it yet), when
/// its parent is unchanged since it was loaded, or when it is moving to the
/// top level. Otherwise the new parent chain is followed up to the root.
pub async fn validate_reparent(conn: &Connection, page: &Page) -> Result<(), CmsError> {
    if page.is_new() || !page.parent_changed() {
        return Ok(());
    }
    let Some(mut current) = page.parent_id else {
        return Ok(());
    };

    let mut visited: HashSet<PageId> = HashSet::new();
    loop {
        if current == page.id {
            return Err(CmsError::CycleDetected { page_id: page.id });
        }
        if !visited.insert(current) {
            // The stored tree already loops without passing through `page`
            tracing::warn!("Stored hierarchy contains a cycle at page {}", current);
            return Err(CmsError::CycleDetected { page_id: current });
        }

        match db_get_parent_id(conn, current).await? {
            None => return Err(CmsError::page_not_found(current)),
            Some(None) => return Ok(()),
            Some(Some(parent)) => current = parent,
        }
    }
}
