//! Block Service Tests
//!
//! Position allocation, moves, redistribution, publishing and casting against
//! a real database file.

#[cfg(test)]
mod tests {
    use crate::db::block_store::db_insert_block;
    use crate::db::{DatabaseService, MAX_POSITION};
    use crate::models::{BlockId, BlockKind, BlockType, PageId, ValidationError};
    use crate::services::{
        BlockService, CastEngine, CmsError, CreatePageParams, PageService, ProtectedBy,
        ReferenceService,
    };
    use chrono::Utc;
    use serde_json::json;
    use std::collections::BTreeSet;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct Fixture {
        db: Arc<DatabaseService>,
        pages: PageService,
        blocks: BlockService,
        references: ReferenceService,
        casts: CastEngine,
        _temp: TempDir,
    }

    async fn fixture() -> Fixture {
        let temp_dir = TempDir::new().unwrap();
        let db = Arc::new(
            DatabaseService::new(temp_dir.path().join("test.db"))
                .await
                .unwrap(),
        );
        Fixture {
            pages: PageService::new(db.clone()),
            blocks: BlockService::new(db.clone()),
            references: ReferenceService::new(db.clone()),
            casts: CastEngine::new(db.clone()),
            db,
            _temp: temp_dir,
        }
    }

    impl Fixture {
        async fn page(&self, title: &str) -> PageId {
            self.pages
                .create_page(CreatePageParams {
                    title: title.to_string(),
                    ..CreatePageParams::default()
                })
                .await
                .unwrap()
                .id
        }

        /// Insert a generic block at an exact position, bypassing allocation
        async fn block_at(&self, page_id: PageId, position: i32) -> BlockId {
            let conn = self.db.connect_with_timeout().await.unwrap();
            db_insert_block(&conn, page_id, position, false, Utc::now(), &BlockKind::Generic)
                .await
                .unwrap()
        }

        /// Fill a page with `count` generic blocks at positions `1..=count`
        async fn fill(&self, page_id: PageId, count: i64) {
            let conn = self.db.connect_with_timeout().await.unwrap();
            conn.execute(
                "WITH RECURSIVE n(i) AS (SELECT 1 UNION ALL SELECT i + 1 FROM n WHERE i < ?2)
                 INSERT INTO blocks (page_id, block_type, position, published, created)
                 SELECT ?1, 'block', i, 0, '2024-01-01 00:00:00' FROM n",
                (page_id, count),
            )
            .await
            .unwrap();
        }

        async fn position(&self, block_id: BlockId) -> i32 {
            self.blocks
                .get_block(block_id)
                .await
                .unwrap()
                .unwrap()
                .position
        }
    }

    #[tokio::test]
    async fn test_insert_into_empty_page_uses_default_position() {
        let f = fixture().await;
        let page = f.page("A").await;

        let block = f
            .blocks
            .insert_block(page, None, BlockKind::text("first"))
            .await
            .unwrap();

        assert_eq!(block.position, 100);
        assert!(!block.published);
        assert_eq!(block.content(), Some("first"));
    }

    #[tokio::test]
    async fn test_insert_orders_blocks() {
        let f = fixture().await;
        let page = f.page("A").await;

        let first = f.blocks.insert_block(page, None, BlockKind::text("1")).await.unwrap();
        let third = f
            .blocks
            .insert_block(page, Some(first.id), BlockKind::text("3"))
            .await
            .unwrap();
        let second = f
            .blocks
            .insert_block(page, Some(first.id), BlockKind::text("2"))
            .await
            .unwrap();
        let zeroth = f.blocks.insert_block(page, None, BlockKind::text("0")).await.unwrap();

        assert_eq!(third.position, 200);
        assert_eq!(second.position, 150);
        assert_eq!(zeroth.position, 50);

        let contents: Vec<String> = f
            .blocks
            .blocks_for_page(page)
            .await
            .unwrap()
            .iter()
            .filter_map(|b| b.content().map(str::to_string))
            .collect();
        assert_eq!(contents, vec!["0", "1", "2", "3"]);
    }

    #[tokio::test]
    async fn test_position_before_lone_block_at_zero_redistributes() {
        let f = fixture().await;
        let page = f.page("A").await;
        let block = f.block_at(page, 0).await;

        let position = f.blocks.get_position_after(page, None).await.unwrap();

        let moved = f.position(block).await;
        assert!(moved > 0);
        assert!(position < moved);
    }

    #[tokio::test]
    async fn test_position_between_adjacent_blocks_redistributes() {
        let f = fixture().await;
        let page = f.page("A").await;
        let first = f.block_at(page, 0).await;
        let second = f.block_at(page, 1).await;

        let position = f.blocks.get_position_after(page, Some(first)).await.unwrap();

        assert!(position > f.position(first).await);
        assert!(position < f.position(second).await);
    }

    #[tokio::test]
    async fn test_position_after_block_at_maximum() {
        let f = fixture().await;
        let page = f.page("A").await;
        let block = f.block_at(page, MAX_POSITION).await;

        let position = f.blocks.get_position_after(page, Some(block)).await.unwrap();

        assert!(position > f.position(block).await);
        assert!(position <= MAX_POSITION);
    }

    #[tokio::test]
    async fn test_position_after_block_on_other_page_is_rejected() {
        let f = fixture().await;
        let a = f.page("A").await;
        let b = f.page("B").await;
        let on_b = f.block_at(b, 10).await;

        let err = f.blocks.get_position_after(a, Some(on_b)).await.unwrap_err();
        assert!(matches!(
            err,
            CmsError::CrossPageAfterMismatch { block_id, page_id } if block_id == on_b && page_id == a
        ));
    }

    #[tokio::test]
    async fn test_move_block_between_pages() {
        let f = fixture().await;
        let a = f.page("A").await;
        let b = f.page("B").await;
        let moving = f.blocks.insert_block(a, None, BlockKind::text("m")).await.unwrap();
        let anchor = f.blocks.insert_block(b, None, BlockKind::text("x")).await.unwrap();

        let moved = f.blocks.move_block(moving.id, b, Some(anchor.id)).await.unwrap();

        assert_eq!(moved.id, moving.id);
        assert_eq!(moved.page_id, b);
        assert!(moved.position > anchor.position);
        assert!(f.blocks.blocks_for_page(a).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_move_block_with_foreign_anchor_is_rejected() {
        let f = fixture().await;
        let a = f.page("A").await;
        let b = f.page("B").await;
        let moving = f.block_at(a, 10).await;
        let foreign = f.block_at(a, 20).await;

        let err = f.blocks.move_block(moving, b, Some(foreign)).await.unwrap_err();
        assert!(matches!(err, CmsError::CrossPageAfterMismatch { .. }));
        assert_eq!(f.position(moving).await, 10);
    }

    #[tokio::test]
    async fn test_move_block_within_page() {
        let f = fixture().await;
        let page = f.page("A").await;
        let first = f.block_at(page, 10).await;
        let second = f.block_at(page, 20).await;
        let third = f.block_at(page, 30).await;

        f.blocks.move_block(first, page, Some(third)).await.unwrap();

        let order: Vec<BlockId> = f
            .blocks
            .blocks_for_page(page)
            .await
            .unwrap()
            .iter()
            .map(|b| b.id)
            .collect();
        assert_eq!(order, vec![second, third, first]);
    }

    #[tokio::test]
    async fn test_redistribute_positions_spreads_blocks() {
        let f = fixture().await;
        let page = f.page("A").await;
        let c = f.block_at(page, 2).await;
        let b = f.block_at(page, 1).await;
        let a = f.block_at(page, 0).await;

        let blocks = f.blocks.redistribute_positions(page).await.unwrap();

        let ids: Vec<BlockId> = blocks.iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![a, b, c]);
        assert!(blocks.iter().all(|b| b.position > 0));
        assert!(blocks[1].position - blocks[0].position > 1);
        assert!(blocks[2].position - blocks[1].position > 1);
    }

    #[tokio::test]
    async fn test_redistribute_block_set_usage_errors() {
        let f = fixture().await;
        let a = f.page("A").await;
        let b = f.page("B").await;
        let a0 = f.block_at(a, 0).await;
        let a1 = f.block_at(a, 1).await;
        let b0 = f.block_at(b, 0).await;

        let err = f.blocks.redistribute_block_set(&[a0, a1, b0]).await.unwrap_err();
        assert!(matches!(err, CmsError::MultiPageSet { ref page_ids } if page_ids.len() == 2));

        let err = f.blocks.redistribute_block_set(&[a1]).await.unwrap_err();
        assert!(matches!(
            err,
            CmsError::IncompletePageSet { expected: 2, given: 1, .. }
        ));

        // Positions untouched by the failed calls
        assert_eq!(f.position(a0).await, 0);

        let blocks = f.blocks.redistribute_block_set(&[a1, a0]).await.unwrap();
        assert_eq!(blocks.len(), 2);
        assert!(blocks[0].position > 0);
    }

    #[tokio::test]
    async fn test_overfull_page_cannot_be_redistributed() {
        let f = fixture().await;
        let page = f.page("A").await;
        f.fill(page, 27_000).await;

        let err = f.blocks.redistribute_positions(page).await.unwrap_err();
        assert!(matches!(err, CmsError::PositionSpaceExhausted { page_id } if page_id == page));

        // Nothing was renumbered
        let first = f.blocks.blocks_for_page(page).await.unwrap()[0].id;
        assert_eq!(f.position(first).await, 1);

        // No gap after the first block, and no room to make one
        let err = f
            .blocks
            .insert_block(page, Some(first), BlockKind::text("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, CmsError::PositionSpaceExhausted { .. }));
        assert_eq!(f.blocks.blocks_for_page(page).await.unwrap().len(), 27_000);
    }

    #[tokio::test]
    async fn test_publish_requires_backing_references() {
        let f = fixture().await;
        let a = f.page("A").await;
        let b = f.page("B").await;
        let block = f.blocks.insert_block(a, None, BlockKind::text("")).await.unwrap();

        let reference = f
            .references
            .create_reference(block.id, Some(b), None)
            .await
            .unwrap();
        let content = format!("see {} and !ref(9998) and !ref(9999)", reference.hook());
        f.blocks.update_block_content(block.id, &content).await.unwrap();

        let err = f.blocks.publish_block(block.id).await.unwrap_err();
        assert_eq!(
            err.missing_references(),
            Some(&BTreeSet::from([9998, 9999]))
        );
        assert!(!f.blocks.get_block(block.id).await.unwrap().unwrap().published);

        f.blocks
            .update_block_content(block.id, &format!("see {} and \\!ref(9999)", reference.hook()))
            .await
            .unwrap();
        let published = f.blocks.publish_block(block.id).await.unwrap();
        assert!(published.published);
    }

    #[tokio::test]
    async fn test_update_content_of_generic_block_fails() {
        let f = fixture().await;
        let page = f.page("A").await;
        let block = f.block_at(page, 5).await;

        let err = f.blocks.update_block_content(block, "hi").await.unwrap_err();
        assert!(matches!(
            err,
            CmsError::NotTextBlock {
                block_type: BlockType::Block,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_delete_block_protected_by_published_reference() {
        let f = fixture().await;
        let a = f.page("A").await;
        let b = f.page("B").await;
        let target = f.blocks.insert_block(b, None, BlockKind::text("target")).await.unwrap();

        let referrer = f.blocks.insert_block(a, None, BlockKind::text("")).await.unwrap();
        let reference = f
            .references
            .create_reference(referrer.id, None, Some(target.id))
            .await
            .unwrap();
        f.blocks
            .update_block_content(referrer.id, &reference.hook())
            .await
            .unwrap();
        f.blocks.publish_block(referrer.id).await.unwrap();

        let err = f.blocks.delete_block(target.id).await.unwrap_err();
        match err {
            CmsError::ProtectedDeletion { blocking } => assert_eq!(
                blocking,
                vec![ProtectedBy::Reference {
                    id: reference.id,
                    containing_block: referrer.id
                }]
            ),
            other => panic!("unexpected error: {other}"),
        }
        assert!(f.blocks.get_block(target.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_block_releases_unpublished_references() {
        let f = fixture().await;
        let page = f.page("A").await;
        let target = f.block_at(page, 10).await;
        let draft = f.blocks.insert_block(page, None, BlockKind::text("")).await.unwrap();
        let reference = f
            .references
            .create_reference(draft.id, None, Some(target))
            .await
            .unwrap();

        tokio_test::assert_ok!(f.blocks.delete_block(target).await);

        assert!(f.references.get_reference(reference.id).await.unwrap().is_none());
        assert!(f.blocks.get_block(draft.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_cast_generic_block_to_text_keeps_identity() {
        let f = fixture().await;
        let a = f.page("A").await;
        let block = f.block_at(a, 40).await;
        let holder = f.blocks.insert_block(a, None, BlockKind::text("")).await.unwrap();
        let reference = f
            .references
            .create_reference(holder.id, None, Some(block))
            .await
            .unwrap();

        let cast = f
            .casts
            .cast_block(block, BlockType::Text, json!({"content": "now text"}))
            .await
            .unwrap();

        assert_eq!(cast.id, block);
        assert_eq!(cast.position, 40);
        assert_eq!(cast.block_type(), BlockType::Text);
        assert_eq!(cast.content(), Some("now text"));

        let reloaded = f.blocks.get_block(block).await.unwrap().unwrap();
        assert_eq!(reloaded, cast);
        assert!(f.references.get_reference(reference.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_cast_rejects_non_specialisation_and_unknown_fields() {
        let f = fixture().await;
        let a = f.page("A").await;
        let text = f.blocks.insert_block(a, None, BlockKind::text("t")).await.unwrap();
        let generic = f.block_at(a, 500).await;

        let err = f
            .casts
            .cast_block(text.id, BlockType::Text, json!({}))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CmsError::InvalidSubtype {
                from: BlockType::Text,
                to: BlockType::Text
            }
        ));

        let err = f
            .casts
            .cast_block(generic, BlockType::Text, json!({"colour": "red"}))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CmsError::Validation(ValidationError::InvalidProperties(_))
        ));

        // Failed cast left the block generic
        let reloaded = f.blocks.get_block(generic).await.unwrap().unwrap();
        assert_eq!(reloaded.block_type(), BlockType::Block);
    }
}
