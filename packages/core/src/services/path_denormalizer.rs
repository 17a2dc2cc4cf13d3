//! Persisting pages while keeping cached ancestor paths consistent
//!
//! A save recomputes `denormalised_path` / `denormalised_titles` only when the
//! page's position in the tree or its slug moved (see
//! [`Page::needs_path_recompute`]). When the prefix this page hands down to its
//! children changes, every descendant is rewritten breadth-first, one sibling
//! list at a time, so neither the call stack nor memory grows with the subtree.
//!
//! Callers own the transaction; nothing here commits.

use crate::db::page_store::{
    db_get_children, db_get_page, db_insert_page, db_path_taken, db_update_page,
    db_update_page_cache,
};
use crate::models::{join_segment, Page, PageId, ValidationError, PATH_SEPARATOR, TITLE_SEPARATOR};
use crate::services::error::CmsError;
use crate::services::hierarchy::validate_reparent;
use libsql::Connection;
use std::collections::VecDeque;

/// Outcome of [`save_page`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveOutcome {
    /// The page's own cached path or titles were rewritten
    pub recomputed: bool,

    /// Number of descendants whose caches were rewritten
    pub descendants_updated: usize,
}

/// Validate and persist `page`, cascading cache changes to its descendants
///
/// `force` recomputes the cached path even when no trigger fired. On success
/// `page.id` is set (for new pages) and the loaded state is refreshed.
pub async fn save_page(
    conn: &Connection,
    page: &mut Page,
    force: bool,
) -> Result<SaveOutcome, CmsError> {
    validate_reparent(conn, page).await?;
    page.validate()?;

    // Prefixes the children currently carry, before anything is recomputed
    let previous_prefix = page.loaded_state().map(|loaded| {
        (
            join_segment(&page.denormalised_path, &loaded.slug, PATH_SEPARATOR),
            join_segment(&page.denormalised_titles, &loaded.title, TITLE_SEPARATOR),
        )
    });

    let mut recomputed = false;
    if page.needs_path_recompute(force) {
        let parent = match page.parent_id {
            Some(parent_id) => Some(
                db_get_page(conn, parent_id)
                    .await?
                    .ok_or_else(|| CmsError::page_not_found(parent_id))?,
            ),
            None => None,
        };
        recomputed = page.recompute_path(parent.as_ref());
    }

    if db_path_taken(conn, &page.denormalised_path, &page.slug, page.id).await? {
        return Err(path_conflict(page));
    }

    if page.is_new() {
        page.id = db_insert_page(conn, page)
            .await
            .map_err(|e| conflict_or(e, page))?;
    } else {
        db_update_page(conn, page)
            .await
            .map_err(|e| conflict_or(e, page))?;
    }

    let mut descendants_updated = 0;
    if let Some((old_path, old_titles)) = previous_prefix {
        let new_path = page.child_path();
        let new_titles = page.child_titles();
        if old_path != new_path || old_titles != new_titles {
            descendants_updated = cascade_descendants(conn, page.id, new_path, new_titles).await?;
        }
    }

    page.mark_saved();

    if descendants_updated > 0 {
        tracing::debug!(
            "Page {} saved, rewrote cached paths of {} descendants",
            page.id,
            descendants_updated
        );
    }

    Ok(SaveOutcome {
        recomputed,
        descendants_updated,
    })
}

/// Rewrite the cached path and titles of every descendant of `root`
///
/// `child_path` / `child_titles` are the values `root`'s direct children must
/// carry. Returns the number of pages rewritten.
pub async fn cascade_descendants(
    conn: &Connection,
    root: PageId,
    child_path: String,
    child_titles: String,
) -> Result<usize, CmsError> {
    let mut queue = VecDeque::from([(root, child_path, child_titles)]);
    let mut updated = 0;

    while let Some((parent_id, path, titles)) = queue.pop_front() {
        for mut child in db_get_children(conn, Some(parent_id)).await? {
            child.denormalised_path = path.clone();
            child.denormalised_titles = titles.clone();
            db_update_page_cache(conn, child.id, &path, &titles)
                .await
                .map_err(|e| conflict_or(e, &child))?;
            updated += 1;

            queue.push_back((child.id, child.child_path(), child.child_titles()));
        }
    }

    Ok(updated)
}

fn path_conflict(page: &Page) -> CmsError {
    ValidationError::PathConflict {
        path: page.denormalised_path.clone(),
        slug: page.slug.clone(),
    }
    .into()
}

/// A concurrent writer may claim the same (path, slug) between check and write
fn conflict_or(error: crate::db::DatabaseError, page: &Page) -> CmsError {
    if error.is_unique_violation() {
        path_conflict(page)
    } else {
        error.into()
    }
}
