//! Integration tests for references across page and block deletion
//!
//! Tests cover:
//! - Draft content losing its references when the target page goes away
//! - Published content protecting its targets
//! - Rendering hooks to target URLs

use anyhow::Result;
use pagetree_core::{
    db::DatabaseService,
    models::{BlockKind, PageId},
    services::{
        BlockService, CmsError, CreatePageParams, PageService, ProtectedBy, ReferenceService,
    },
};
use std::collections::BTreeSet;
use std::sync::Arc;
use tempfile::TempDir;

struct TestEnv {
    pages: PageService,
    blocks: BlockService,
    references: ReferenceService,
    _temp_dir: TempDir,
}

/// Test helper: Create a test environment
async fn create_test_env() -> Result<TestEnv> {
    let temp_dir = TempDir::new()?;
    let db = Arc::new(DatabaseService::new(temp_dir.path().join("test.db")).await?);
    Ok(TestEnv {
        pages: PageService::new(db.clone()),
        blocks: BlockService::new(db.clone()),
        references: ReferenceService::new(db),
        _temp_dir: temp_dir,
    })
}

async fn create_page(env: &TestEnv, title: &str) -> Result<PageId> {
    let page = env
        .pages
        .create_page(CreatePageParams {
            title: title.to_string(),
            ..CreatePageParams::default()
        })
        .await?;
    Ok(page.id)
}

// =========================================================================
// Draft References
// =========================================================================

#[tokio::test]
async fn test_deleting_page_drops_references_from_unpublished_blocks() -> Result<()> {
    let env = create_test_env().await?;
    let a = create_page(&env, "A").await?;
    let b = create_page(&env, "B").await?;

    let target = env.blocks.insert_block(b, None, BlockKind::text("on b")).await?;
    let draft = env.blocks.insert_block(a, None, BlockKind::text("")).await?;

    let to_page = env.references.create_reference(draft.id, Some(b), None).await?;
    let to_block = env
        .references
        .create_reference(draft.id, None, Some(target.id))
        .await?;

    let content = format!("see {} and {}", to_page.hook(), to_block.hook());
    env.blocks.update_block_content(draft.id, &content).await?;
    env.references.validate_references(draft.id, None).await?;

    env.pages.delete_page(b).await?;

    assert!(env.pages.get_page(b).await?.is_none());
    assert!(env.blocks.get_block(target.id).await?.is_none());
    assert!(env.references.references_for_block(draft.id).await?.is_empty());

    // The draft survives, but its hooks are now dangling
    let err = env
        .references
        .validate_references(draft.id, None)
        .await
        .unwrap_err();
    let expected: BTreeSet<i64> = [to_page.id, to_block.id].into_iter().collect();
    assert_eq!(err.missing_references(), Some(&expected));

    let err = env.blocks.publish_block(draft.id).await.unwrap_err();
    assert!(err.missing_references().is_some());
    Ok(())
}

// =========================================================================
// Published References
// =========================================================================

#[tokio::test]
async fn test_published_reference_protects_target_page() -> Result<()> {
    let env = create_test_env().await?;
    let a = create_page(&env, "A").await?;
    let b = create_page(&env, "B").await?;

    let target = env.blocks.insert_block(b, None, BlockKind::text("on b")).await?;
    let block = env.blocks.insert_block(a, None, BlockKind::text("")).await?;
    let reference = env
        .references
        .create_reference(block.id, None, Some(target.id))
        .await?;
    env.blocks
        .update_block_content(block.id, &reference.hook())
        .await?;
    env.blocks.publish_block(block.id).await?;

    match env.pages.delete_page(b).await {
        Err(CmsError::ProtectedDeletion { blocking }) => {
            assert_eq!(
                blocking,
                vec![ProtectedBy::Reference {
                    id: reference.id,
                    containing_block: block.id,
                }]
            );
        }
        other => panic!("expected ProtectedDeletion, got {:?}", other),
    }

    // Nothing was removed
    assert!(env.pages.get_page(b).await?.is_some());
    assert!(env.blocks.get_block(target.id).await?.is_some());
    assert!(env.references.get_reference(reference.id).await?.is_some());

    // Once the reference is gone the page can be deleted
    env.blocks.delete_block(block.id).await?;
    env.pages.delete_page(b).await?;
    Ok(())
}

#[tokio::test]
async fn test_page_referencing_itself_can_be_deleted() -> Result<()> {
    let env = create_test_env().await?;
    let a = create_page(&env, "A").await?;

    let block = env.blocks.insert_block(a, None, BlockKind::text("")).await?;
    let reference = env.references.create_reference(block.id, Some(a), None).await?;
    env.blocks
        .update_block_content(block.id, &format!("top: {}", reference.hook()))
        .await?;
    env.blocks.publish_block(block.id).await?;

    env.pages.delete_page(a).await?;

    assert!(env.blocks.get_block(block.id).await?.is_none());
    assert!(env.references.get_reference(reference.id).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn test_published_content_renders_target_urls() -> Result<()> {
    let env = create_test_env().await?;
    let docs = create_page(&env, "Docs").await?;
    let guide = env
        .pages
        .create_page(CreatePageParams {
            title: "Getting Started".to_string(),
            slug: None,
            parent_id: Some(docs),
        })
        .await?;

    let block = env.blocks.insert_block(docs, None, BlockKind::text("")).await?;
    let reference = env
        .references
        .create_reference(block.id, Some(guide.id), None)
        .await?;
    env.blocks
        .update_block_content(block.id, &format!("Read [the guide]({})", reference.hook()))
        .await?;
    env.blocks.publish_block(block.id).await?;

    assert_eq!(
        env.references.render_block_content(block.id).await?,
        "Read [the guide](/docs/getting-started/)"
    );
    Ok(())
}
