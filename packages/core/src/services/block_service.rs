//! Block Service - Ordered Content Operations
//!
//! This module provides the business logic for blocks:
//!
//! - Position allocation: pick a free sort key after an anchor, redistributing
//!   the page once when no integer is free (see [`PositionAllocator`])
//! - Insert / move / publish / delete, each in a single transaction
//! - Explicit redistribution with usage checks on the block set
//!
//! # Concurrency
//!
//! Two writers can compute the same free position. The loser hits the
//! `(page_id, position)` UNIQUE constraint; `insert_block` treats that as a
//! conflict and retries the whole allocation a bounded number of times.

use crate::db::block_store::{
    db_delete_block, db_get_block, db_get_block_page, db_get_blocks_for_page, db_get_positions,
    db_insert_block, db_move_block, db_set_position, db_set_published, db_update_text_content,
};
use crate::db::page_store::db_get_page;
use crate::db::reference_store::{
    db_published_references_to_block, db_release_unpublished_references_to_block,
};
use crate::db::{begin_transaction, finish_transaction, Allocation, DatabaseService, PositionAllocator};
use crate::models::{Block, BlockId, BlockKind, BlockType, PageId};
use crate::services::error::{CmsError, ProtectedBy};
use crate::services::reference_service::check_references;
use chrono::Utc;
use libsql::Connection;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Attempts made by `insert_block` before a position conflict is reported
const MAX_INSERT_ATTEMPTS: usize = 3;

pub struct BlockService {
    db: Arc<DatabaseService>,
}

impl BlockService {
    pub fn new(db: Arc<DatabaseService>) -> Self {
        Self { db }
    }

    /// Create an unpublished block on `page_id` directly after `after`
    /// (or before every other block when `after` is `None`)
    ///
    /// # Errors
    ///
    /// - `CmsError::PageNotFound` / `CmsError::BlockNotFound`
    /// - `CmsError::CrossPageAfterMismatch` if `after` is on another page
    /// - `CmsError::Database` with a unique violation if concurrent writers kept
    ///   claiming the chosen position
    pub async fn insert_block(
        &self,
        page_id: PageId,
        after: Option<BlockId>,
        kind: BlockKind,
    ) -> Result<Block, CmsError> {
        let mut attempt = 0;
        loop {
            attempt += 1;

            let conn = self.db.connect_with_timeout().await?;
            begin_transaction(&conn).await?;
            let result = Self::insert_in(&conn, page_id, after, &kind).await;

            match finish_transaction(&conn, result).await {
                Err(CmsError::Database(e)) if e.is_unique_violation() && attempt < MAX_INSERT_ATTEMPTS => {
                    tracing::warn!(
                        "Position conflict inserting into page {} (attempt {}), retrying",
                        page_id,
                        attempt
                    );
                }
                other => return other,
            }
        }
    }

    async fn insert_in(
        conn: &Connection,
        page_id: PageId,
        after: Option<BlockId>,
        kind: &BlockKind,
    ) -> Result<Block, CmsError> {
        ensure_page(conn, page_id).await?;
        let position = allocate_position(conn, page_id, after, None).await?;
        let created = Utc::now();

        let id = db_insert_block(conn, page_id, position, false, created, kind).await?;
        tracing::debug!("Inserted {} block {} at position {}", kind.block_type(), id, position);

        load_block(conn, id).await
    }

    /// A free position after `after` on `page_id`, redistributing if needed
    ///
    /// The page's blocks may be renumbered (atomically) as a side effect.
    pub async fn get_position_after(
        &self,
        page_id: PageId,
        after: Option<BlockId>,
    ) -> Result<i32, CmsError> {
        let conn = self.db.connect_with_timeout().await?;
        begin_transaction(&conn).await?;
        let result: Result<i32, CmsError> = async {
            ensure_page(&conn, page_id).await?;
            allocate_position(&conn, page_id, after, None).await
        }
        .await;
        finish_transaction(&conn, result).await
    }

    /// Move a block to `new_page_id`, directly after `after`
    ///
    /// Fails with `CmsError::CrossPageAfterMismatch` if `after` is not on
    /// `new_page_id`.
    pub async fn move_block(
        &self,
        block_id: BlockId,
        new_page_id: PageId,
        after: Option<BlockId>,
    ) -> Result<Block, CmsError> {
        let conn = self.db.connect_with_timeout().await?;
        begin_transaction(&conn).await?;
        let result = Self::move_in(&conn, block_id, new_page_id, after).await;
        finish_transaction(&conn, result).await
    }

    async fn move_in(
        conn: &Connection,
        block_id: BlockId,
        new_page_id: PageId,
        after: Option<BlockId>,
    ) -> Result<Block, CmsError> {
        let block = load_block(conn, block_id).await?;
        ensure_page(conn, new_page_id).await?;

        if after == Some(block_id) && block.page_id == new_page_id {
            // Already directly after itself
            return Ok(block);
        }

        let position = allocate_position(conn, new_page_id, after, Some(block_id)).await?;

        if block.page_id == new_page_id {
            db_set_position(conn, block_id, position).await?;
        } else {
            db_move_block(conn, block_id, new_page_id, position).await?;
        }

        load_block(conn, block_id).await
    }

    /// Spread all blocks of a page evenly over the position range
    pub async fn redistribute_positions(&self, page_id: PageId) -> Result<Vec<Block>, CmsError> {
        let conn = self.db.connect_with_timeout().await?;
        begin_transaction(&conn).await?;
        let result: Result<Vec<Block>, CmsError> = async {
            ensure_page(&conn, page_id).await?;
            redistribute_page(&conn, page_id).await?;
            Ok(db_get_blocks_for_page(&conn, page_id).await?)
        }
        .await;
        finish_transaction(&conn, result).await
    }

    /// Redistribute the page that `block_ids` make up
    ///
    /// # Errors
    ///
    /// - `CmsError::MultiPageSet` if the blocks belong to more than one page
    /// - `CmsError::IncompletePageSet` unless the set is every block of its page
    pub async fn redistribute_block_set(
        &self,
        block_ids: &[BlockId],
    ) -> Result<Vec<Block>, CmsError> {
        let conn = self.db.connect_with_timeout().await?;
        begin_transaction(&conn).await?;
        let result = Self::redistribute_set_in(&conn, block_ids).await;
        finish_transaction(&conn, result).await
    }

    async fn redistribute_set_in(
        conn: &Connection,
        block_ids: &[BlockId],
    ) -> Result<Vec<Block>, CmsError> {
        let requested: BTreeSet<BlockId> = block_ids.iter().copied().collect();

        let mut pages = BTreeSet::new();
        for id in &requested {
            let page_id = db_get_block_page(conn, *id)
                .await?
                .ok_or_else(|| CmsError::block_not_found(*id))?;
            pages.insert(page_id);
        }

        if pages.len() > 1 {
            return Err(CmsError::MultiPageSet { page_ids: pages });
        }
        let Some(&page_id) = pages.first() else {
            return Ok(Vec::new());
        };

        let on_page: BTreeSet<BlockId> = db_get_positions(conn, page_id)
            .await?
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        if on_page != requested {
            return Err(CmsError::IncompletePageSet {
                page_id,
                expected: on_page.len(),
                given: requested.len(),
            });
        }

        redistribute_page(conn, page_id).await?;
        Ok(db_get_blocks_for_page(conn, page_id).await?)
    }

    /// Publish a block once every hook in its content has a backing reference
    ///
    /// Fails with `ValidationError::MissingReferences` naming the unknown ids.
    pub async fn publish_block(&self, block_id: BlockId) -> Result<Block, CmsError> {
        let conn = self.db.connect_with_timeout().await?;
        begin_transaction(&conn).await?;
        let result: Result<Block, CmsError> = async {
            let block = load_block(&conn, block_id).await?;
            if let Some(content) = block.content() {
                check_references(&conn, block_id, content).await?;
            }
            db_set_published(&conn, block_id, true).await?;
            load_block(&conn, block_id).await
        }
        .await;
        finish_transaction(&conn, result).await
    }

    /// Replace the content of a text block
    pub async fn update_block_content(
        &self,
        block_id: BlockId,
        content: &str,
    ) -> Result<Block, CmsError> {
        let conn = self.db.connect_with_timeout().await?;
        begin_transaction(&conn).await?;
        let result: Result<Block, CmsError> = async {
            let block = load_block(&conn, block_id).await?;
            if block.block_type() != BlockType::Text {
                return Err(CmsError::NotTextBlock {
                    block_id,
                    block_type: block.block_type(),
                });
            }
            if block.published {
                check_references(&conn, block_id, content).await?;
            }
            db_update_text_content(&conn, block_id, content).await?;
            load_block(&conn, block_id).await
        }
        .await;
        finish_transaction(&conn, result).await
    }

    /// Delete a block and the references it contains
    ///
    /// References to it from unpublished blocks are dropped; references from
    /// published blocks refuse the deletion.
    pub async fn delete_block(&self, block_id: BlockId) -> Result<(), CmsError> {
        let conn = self.db.connect_with_timeout().await?;
        begin_transaction(&conn).await?;
        let result = delete_block_in(&conn, block_id).await;
        finish_transaction(&conn, result).await
    }

    pub async fn get_block(&self, block_id: BlockId) -> Result<Option<Block>, CmsError> {
        let conn = self.db.connect_with_timeout().await?;
        Ok(db_get_block(&conn, block_id).await?)
    }

    /// Blocks of a page in display order
    pub async fn blocks_for_page(&self, page_id: PageId) -> Result<Vec<Block>, CmsError> {
        let conn = self.db.connect_with_timeout().await?;
        Ok(db_get_blocks_for_page(&conn, page_id).await?)
    }
}

async fn ensure_page(conn: &Connection, page_id: PageId) -> Result<(), CmsError> {
    match db_get_page(conn, page_id).await? {
        Some(_) => Ok(()),
        None => Err(CmsError::page_not_found(page_id)),
    }
}

pub(crate) async fn load_block(conn: &Connection, block_id: BlockId) -> Result<Block, CmsError> {
    db_get_block(conn, block_id)
        .await?
        .ok_or_else(|| CmsError::block_not_found(block_id))
}

/// Delete a block unless a published block elsewhere still references it
pub(crate) async fn delete_block_in(conn: &Connection, block_id: BlockId) -> Result<(), CmsError> {
    load_block(conn, block_id).await?;

    let released = db_release_unpublished_references_to_block(conn, block_id).await?;
    let blocking: Vec<ProtectedBy> = db_published_references_to_block(conn, block_id)
        .await?
        .into_iter()
        .map(|reference| ProtectedBy::Reference {
            id: reference.id,
            containing_block: reference.containing_block,
        })
        .collect();

    if !blocking.is_empty() {
        return Err(CmsError::ProtectedDeletion { blocking });
    }

    db_delete_block(conn, block_id).await?;
    if released > 0 {
        tracing::debug!(
            "Deleted block {}, released {} unpublished references",
            block_id,
            released
        );
    }
    Ok(())
}

/// Choose a position after `after` on `page_id`
///
/// `moving` is left out of the sibling set so a block can be placed relative
/// to its own neighbours. Redistributes the page at most once.
async fn allocate_position(
    conn: &Connection,
    page_id: PageId,
    after: Option<BlockId>,
    moving: Option<BlockId>,
) -> Result<i32, CmsError> {
    let mut redistributed = false;
    loop {
        let siblings: Vec<(BlockId, i32)> = db_get_positions(conn, page_id)
            .await?
            .into_iter()
            .filter(|(id, _)| Some(*id) != moving)
            .collect();

        let anchor = match after {
            None => None,
            Some(after_id) => match siblings.iter().position(|(id, _)| *id == after_id) {
                Some(index) => Some(index),
                None => {
                    return match db_get_block_page(conn, after_id).await? {
                        None => Err(CmsError::block_not_found(after_id)),
                        Some(_) => Err(CmsError::CrossPageAfterMismatch {
                            block_id: after_id,
                            page_id,
                        }),
                    }
                }
            },
        };

        let positions: Vec<i32> = siblings.iter().map(|(_, position)| *position).collect();
        match PositionAllocator::position_after(&positions, anchor) {
            Allocation::At(position) => return Ok(position),
            Allocation::Redistribute if !redistributed => {
                redistribute_page(conn, page_id).await?;
                redistributed = true;
            }
            Allocation::Redistribute => {
                return Err(CmsError::PositionSpaceExhausted { page_id });
            }
        }
    }
}

/// Renumber every block of a page, preserving order
///
/// Runs inside the caller's transaction. Positions are first parked on
/// negative values so no intermediate write collides on `(page_id, position)`.
/// Fails with `PositionSpaceExhausted`, before writing, when the page holds
/// more blocks than the range has distinct positions.
async fn redistribute_page(conn: &Connection, page_id: PageId) -> Result<usize, CmsError> {
    let blocks = db_get_positions(conn, page_id).await?;
    if !PositionAllocator::can_redistribute(blocks.len()) {
        tracing::warn!(
            "Page {} holds {} blocks, too many to redistribute",
            page_id,
            blocks.len()
        );
        return Err(CmsError::PositionSpaceExhausted { page_id });
    }

    let targets = PositionAllocator::redistributed(blocks.len());

    for (index, (id, _)) in blocks.iter().enumerate() {
        db_set_position(conn, *id, -(index as i32) - 1).await?;
    }
    for ((id, _), position) in blocks.iter().zip(&targets) {
        db_set_position(conn, *id, *position).await?;
    }

    tracing::info!(
        "Redistributed {} blocks on page {} (gap {})",
        blocks.len(),
        page_id,
        PositionAllocator::redistribution_gap(blocks.len())
    );
    Ok(blocks.len())
}

#[cfg(test)]
#[path = "block_service_test.rs"]
mod block_service_test;
