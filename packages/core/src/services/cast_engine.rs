//! Promoting generic blocks to concrete variants
//!
//! A block keeps its base row (id, page, position, publication state) when it
//! is cast. The variant row is created alongside it, keyed by the same id, so
//! references pointing at the block stay valid.

use crate::db::block_store::{db_insert_variant_row, db_set_block_type};
use crate::db::{begin_transaction, finish_transaction, DatabaseService};
use crate::models::{Block, BlockId, BlockKind, BlockType};
use crate::services::block_service::load_block;
use crate::services::error::CmsError;
use libsql::Connection;
use serde_json::Value;
use std::sync::Arc;

pub struct CastEngine {
    db: Arc<DatabaseService>,
}

impl CastEngine {
    pub fn new(db: Arc<DatabaseService>) -> Self {
        Self { db }
    }

    /// Cast a block to `target`, applying target-specific `extra_fields`
    ///
    /// # Errors
    ///
    /// - `CmsError::InvalidSubtype` unless `target` specialises the block's
    ///   current type
    /// - `ValidationError::InvalidProperties` for fields `target` does not have
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use pagetree_core::services::CastEngine;
    /// # use pagetree_core::models::BlockType;
    /// # use serde_json::json;
    /// # async fn example(engine: CastEngine, block_id: i64) -> Result<(), Box<dyn std::error::Error>> {
    /// let text = engine
    ///     .cast_block(block_id, BlockType::Text, json!({"content": "Hello"}))
    ///     .await?;
    /// assert_eq!(text.id, block_id);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn cast_block(
        &self,
        block_id: BlockId,
        target: BlockType,
        extra_fields: Value,
    ) -> Result<Block, CmsError> {
        let conn = self.db.connect_with_timeout().await?;
        begin_transaction(&conn).await?;
        let result = cast_in(&conn, block_id, target, &extra_fields).await;
        finish_transaction(&conn, result).await
    }
}

async fn cast_in(
    conn: &Connection,
    block_id: BlockId,
    target: BlockType,
    extra_fields: &Value,
) -> Result<Block, CmsError> {
    let source = load_block(conn, block_id).await?;
    let from = source.block_type();

    if !target.is_specialization_of(from) {
        return Err(CmsError::InvalidSubtype { from, to: target });
    }

    let kind = BlockKind::from_fields(target, extra_fields)?;
    db_insert_variant_row(conn, block_id, &kind).await?;
    db_set_block_type(conn, block_id, target).await?;

    tracing::debug!("Cast block {} from {} to {}", block_id, from, target);
    load_block(conn, block_id).await
}
