//! Reference Service - Inline Cross-References
//!
//! Block content embeds hooks such as `!ref(12)`; each hook must be backed by
//! a `block_references` row owned by the same block. This service creates and
//! removes those rows, checks content against them, and rewrites hooks into
//! URLs at render time.

use crate::db::block_store::db_get_block;
use crate::db::page_store::db_get_page;
use crate::db::reference_store::{
    db_delete_reference, db_get_reference, db_get_references_for_block, db_insert_reference,
};
use crate::db::DatabaseService;
use crate::models::{
    find_references, find_unresolvable_hooks, BlockId, PageId, Reference, ReferenceId,
    ReferenceTarget, ValidationError,
};
use crate::services::block_service::load_block;
use crate::services::error::CmsError;
use libsql::Connection;
use std::collections::BTreeSet;
use std::sync::Arc;

pub struct ReferenceService {
    db: Arc<DatabaseService>,
}

impl ReferenceService {
    pub fn new(db: Arc<DatabaseService>) -> Self {
        Self { db }
    }

    /// Record that `containing_block` refers to exactly one page or block
    ///
    /// # Errors
    ///
    /// - `ValidationError::MalformedReference` if both or neither targets are given
    /// - `CmsError::BlockNotFound` / `CmsError::PageNotFound` for unknown ids
    pub async fn create_reference(
        &self,
        containing_block: BlockId,
        referenced_page: Option<PageId>,
        referenced_block: Option<BlockId>,
    ) -> Result<Reference, CmsError> {
        let target = ReferenceTarget::from_parts(referenced_page, referenced_block)?;

        let conn = self.db.connect_with_timeout().await?;
        load_block(&conn, containing_block).await?;
        match target {
            ReferenceTarget::Page(id) => {
                db_get_page(&conn, id)
                    .await?
                    .ok_or_else(|| CmsError::page_not_found(id))?;
            }
            ReferenceTarget::Block(id) => {
                load_block(&conn, id).await?;
            }
        }

        let id = db_insert_reference(&conn, containing_block, target).await?;
        tracing::debug!("Block {} now references {:?} as {}", containing_block, target, id);

        Ok(Reference {
            id,
            containing_block,
            target,
        })
    }

    pub async fn delete_reference(&self, id: ReferenceId) -> Result<(), CmsError> {
        let conn = self.db.connect_with_timeout().await?;
        if db_delete_reference(&conn, id).await? == 0 {
            return Err(CmsError::reference_not_found(id));
        }
        Ok(())
    }

    pub async fn get_reference(&self, id: ReferenceId) -> Result<Option<Reference>, CmsError> {
        let conn = self.db.connect_with_timeout().await?;
        Ok(db_get_reference(&conn, id).await?)
    }

    /// References owned by a block, ordered by id
    pub async fn references_for_block(&self, block_id: BlockId) -> Result<Vec<Reference>, CmsError> {
        let conn = self.db.connect_with_timeout().await?;
        Ok(db_get_references_for_block(&conn, block_id).await?)
    }

    /// Check that every hook in `content` is backed by a reference of the block
    ///
    /// When `content` is `None` the block's stored content is checked. Blocks
    /// without content always pass.
    pub async fn validate_references(
        &self,
        block_id: BlockId,
        content: Option<&str>,
    ) -> Result<(), CmsError> {
        let conn = self.db.connect_with_timeout().await?;
        let block = load_block(&conn, block_id).await?;

        match content.or(block.content()) {
            Some(text) => check_references(&conn, block_id, text).await,
            None => Ok(()),
        }
    }

    /// The block's content with every backed hook replaced by its target's URL
    ///
    /// Hooks without a backing reference and escaped hooks are left as written.
    pub async fn render_block_content(&self, block_id: BlockId) -> Result<String, CmsError> {
        let conn = self.db.connect_with_timeout().await?;
        let block = load_block(&conn, block_id).await?;

        let mut content = block.content().unwrap_or_default().to_string();
        for reference in db_get_references_for_block(&conn, block_id).await? {
            let url = target_url(&conn, reference.target).await?;
            content = reference.update_references(&content, &url);
        }
        Ok(content)
    }
}

/// Fail with the ids of any hooks in `content` that the block does not own
///
/// Hooks whose id is out of range fail first, with
/// `ValidationError::UnresolvableHooks`.
pub(crate) async fn check_references(
    conn: &Connection,
    block_id: BlockId,
    content: &str,
) -> Result<(), CmsError> {
    let unresolvable = find_unresolvable_hooks(content);
    if !unresolvable.is_empty() {
        return Err(ValidationError::UnresolvableHooks(unresolvable).into());
    }

    let hooked = find_references(content);
    if hooked.is_empty() {
        return Ok(());
    }

    let owned: BTreeSet<ReferenceId> = db_get_references_for_block(conn, block_id)
        .await?
        .into_iter()
        .map(|reference| reference.id)
        .collect();

    let missing: BTreeSet<ReferenceId> = hooked.difference(&owned).copied().collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::MissingReferences(missing).into())
    }
}

/// Absolute URL of a reference target
async fn target_url(conn: &Connection, target: ReferenceTarget) -> Result<String, CmsError> {
    match target {
        ReferenceTarget::Page(id) => Ok(db_get_page(conn, id)
            .await?
            .ok_or_else(|| CmsError::page_not_found(id))?
            .get_absolute_url()),
        ReferenceTarget::Block(id) => {
            let block = db_get_block(conn, id)
                .await?
                .ok_or_else(|| CmsError::block_not_found(id))?;
            let page = db_get_page(conn, block.page_id)
                .await?
                .ok_or_else(|| CmsError::page_not_found(block.page_id))?;
            Ok(block.url_within(&page.get_absolute_url()))
        }
    }
}

#[cfg(test)]
#[path = "reference_service_test.rs"]
mod reference_service_test;
