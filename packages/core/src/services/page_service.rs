//! Page Service - Hierarchy Operations
//!
//! This module provides the business logic for pages:
//!
//! - Creating, renaming and re-parenting pages (validated by the hierarchy
//!   check, then persisted through the path denormalizer)
//! - Guarded deletion that reports everything still depending on a page
//! - Lookup by id, stable UUID, or cached path + slug
//! - Navigation: children, breadcrumbs and the sidebar tree
//!
//! Every mutation runs in one `BEGIN IMMEDIATE` transaction, so a cascade over
//! a large subtree is either fully visible or not at all.

use crate::db::page_store::{
    db_delete_page, db_get_children, db_get_page, db_get_page_by_path, db_get_page_by_uuid,
};
use crate::db::reference_store::{
    db_published_references_to_page, db_release_unpublished_references_to_page,
};
use crate::db::{begin_transaction, finish_transaction, DatabaseService};
use crate::models::{
    assemble_sidebar, slugify, split_url_path, Breadcrumb, Page, PageId, SidebarLevel, SidebarLink,
};
use crate::services::error::{CmsError, ProtectedBy};
use crate::services::path_denormalizer::save_page;
use libsql::Connection;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Parameters for creating a page
///
/// # Examples
///
/// ```no_run
/// # use pagetree_core::services::CreatePageParams;
/// let params = CreatePageParams {
///     title: "Release Notes".to_string(),
///     slug: None, // derived: "release-notes"
///     parent_id: Some(3),
/// };
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePageParams {
    pub title: String,

    /// Derived from the title when absent or blank
    #[serde(default)]
    pub slug: Option<String>,

    #[serde(default)]
    pub parent_id: Option<PageId>,
}

/// Partial update of a page
///
/// `parent` distinguishes "leave as is" (`None`) from "move to top level"
/// (`Some(None)`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageUpdate {
    #[serde(default)]
    pub title: Option<String>,

    /// A blank slug is re-derived from the (new) title
    #[serde(default)]
    pub slug: Option<String>,

    #[serde(default)]
    pub parent: Option<Option<PageId>>,
}

impl PageUpdate {
    pub fn move_to(parent: Option<PageId>) -> Self {
        Self {
            parent: Some(parent),
            ..Self::default()
        }
    }
}

pub struct PageService {
    db: Arc<DatabaseService>,
}

impl PageService {
    pub fn new(db: Arc<DatabaseService>) -> Self {
        Self { db }
    }

    /// Create a page, deriving its slug and cached path
    ///
    /// # Errors
    ///
    /// - `CmsError::Validation` for an empty/multi-line title, an unusable slug
    ///   or a `(path, slug)` already in use
    /// - `CmsError::PageNotFound` if `parent_id` does not exist
    pub async fn create_page(&self, params: CreatePageParams) -> Result<Page, CmsError> {
        let mut page = Page::draft(params.title, params.slug, params.parent_id)?;

        let conn = self.db.connect_with_timeout().await?;
        begin_transaction(&conn).await?;
        let result = save_page(&conn, &mut page, false).await;
        finish_transaction(&conn, result).await?;

        tracing::debug!("Created page {} at {}", page.id, page.get_absolute_url());
        Ok(page)
    }

    /// Apply a partial update, cascading cache changes to all descendants
    pub async fn update_page(&self, id: PageId, update: PageUpdate) -> Result<Page, CmsError> {
        let conn = self.db.connect_with_timeout().await?;
        begin_transaction(&conn).await?;
        let result = Self::update_in(&conn, id, update).await;
        finish_transaction(&conn, result).await
    }

    /// Re-parent a page (`None` moves it to the top level)
    ///
    /// Fails with `CmsError::CycleDetected` if `new_parent` is the page itself
    /// or one of its descendants.
    pub async fn move_page(
        &self,
        id: PageId,
        new_parent: Option<PageId>,
    ) -> Result<Page, CmsError> {
        self.update_page(id, PageUpdate::move_to(new_parent)).await
    }

    async fn update_in(conn: &Connection, id: PageId, update: PageUpdate) -> Result<Page, CmsError> {
        let mut page = db_get_page(conn, id)
            .await?
            .ok_or_else(|| CmsError::page_not_found(id))?;

        if let Some(title) = update.title {
            page.title = title;
        }
        if let Some(slug) = update.slug {
            page.slug = if slug.trim().is_empty() {
                slugify(&page.title)
            } else {
                slug
            };
        }
        if let Some(parent) = update.parent {
            page.parent_id = parent;
        }

        let outcome = save_page(conn, &mut page, false).await?;
        if outcome.descendants_updated > 0 {
            tracing::info!(
                "Page {} changed, updated {} descendant paths",
                id,
                outcome.descendants_updated
            );
        }
        Ok(page)
    }

    /// Delete a page together with its blocks
    ///
    /// References to the page (or its blocks) held by unpublished blocks are
    /// dropped first. The deletion is refused, with nothing removed, while the
    /// page has child pages or is referenced from published blocks on other
    /// pages.
    pub async fn delete_page(&self, id: PageId) -> Result<(), CmsError> {
        let conn = self.db.connect_with_timeout().await?;
        begin_transaction(&conn).await?;
        let result = Self::delete_in(&conn, id).await;
        finish_transaction(&conn, result).await
    }

    async fn delete_in(conn: &Connection, id: PageId) -> Result<(), CmsError> {
        if db_get_page(conn, id).await?.is_none() {
            return Err(CmsError::page_not_found(id));
        }

        let mut blocking: Vec<ProtectedBy> = db_get_children(conn, Some(id))
            .await?
            .into_iter()
            .map(|child| ProtectedBy::ChildPage {
                id: child.id,
                title: child.title,
            })
            .collect();

        let released = db_release_unpublished_references_to_page(conn, id).await?;

        blocking.extend(
            db_published_references_to_page(conn, id)
                .await?
                .into_iter()
                .map(|reference| ProtectedBy::Reference {
                    id: reference.id,
                    containing_block: reference.containing_block,
                }),
        );

        if !blocking.is_empty() {
            tracing::debug!("Refusing to delete page {}: {} blockers", id, blocking.len());
            return Err(CmsError::ProtectedDeletion { blocking });
        }

        db_delete_page(conn, id).await?;
        tracing::info!(
            "Deleted page {} (released {} unpublished references)",
            id,
            released
        );
        Ok(())
    }

    pub async fn get_page(&self, id: PageId) -> Result<Option<Page>, CmsError> {
        let conn = self.db.connect_with_timeout().await?;
        Ok(db_get_page(&conn, id).await?)
    }

    pub async fn get_page_by_uuid(&self, uuid: &Uuid) -> Result<Option<Page>, CmsError> {
        let conn = self.db.connect_with_timeout().await?;
        Ok(db_get_page_by_uuid(&conn, uuid).await?)
    }

    /// Look a page up by cached ancestor path and slug
    pub async fn get_page_by_path(&self, path: &str, slug: &str) -> Result<Option<Page>, CmsError> {
        let conn = self.db.connect_with_timeout().await?;
        Ok(db_get_page_by_path(&conn, path, slug).await?)
    }

    /// Resolve a URL path such as `/a/b/c/` to page `c` under `a/b`
    pub async fn resolve_url(&self, url_path: &str) -> Result<Option<Page>, CmsError> {
        match split_url_path(url_path) {
            Some((path, slug)) => self.get_page_by_path(&path, &slug).await,
            None => Ok(None),
        }
    }

    /// Direct children of a page, ordered by title
    pub async fn children(&self, id: PageId) -> Result<Vec<Page>, CmsError> {
        let conn = self.db.connect_with_timeout().await?;
        Ok(db_get_children(&conn, Some(id)).await?)
    }

    pub async fn top_level_pages(&self) -> Result<Vec<Page>, CmsError> {
        let conn = self.db.connect_with_timeout().await?;
        Ok(db_get_children(&conn, None).await?)
    }

    /// Breadcrumb trail from the page up to its top-level ancestor
    pub async fn breadcrumbs(&self, id: PageId) -> Result<Vec<Breadcrumb>, CmsError> {
        let page = self
            .get_page(id)
            .await?
            .ok_or_else(|| CmsError::page_not_found(id))?;
        Ok(page.breadcrumbs())
    }

    /// Sidebar tree for a page
    ///
    /// Contains every top-level page, each ancestor's full sibling list, and
    /// the page's own children. Children of siblings are left collapsed.
    pub async fn sidebar_links(&self, id: PageId) -> Result<Vec<SidebarLink>, CmsError> {
        let conn = self.db.connect_with_timeout().await?;
        let mut current = db_get_page(&conn, id)
            .await?
            .ok_or_else(|| CmsError::page_not_found(id))?;

        let children = links_for(db_get_children(&conn, Some(current.id)).await?);

        let mut levels = Vec::new();
        loop {
            levels.push(SidebarLevel {
                siblings: links_for(db_get_children(&conn, current.parent_id).await?),
                focus: current.id,
            });

            let Some(parent_id) = current.parent_id else {
                break;
            };
            current = db_get_page(&conn, parent_id)
                .await?
                .ok_or_else(|| CmsError::page_not_found(parent_id))?;
        }

        Ok(assemble_sidebar(children, levels))
    }
}

fn links_for(pages: Vec<Page>) -> Vec<SidebarLink> {
    pages
        .into_iter()
        .map(|page| {
            let url = page.get_absolute_url();
            SidebarLink::new(page.id, page.title, url)
        })
        .collect()
}

#[cfg(test)]
#[path = "page_service_test.rs"]
mod page_service_test;
