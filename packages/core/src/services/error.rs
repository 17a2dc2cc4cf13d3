//! Service Layer Error Types
//!
//! This module defines error types for service-layer operations, providing
//! detailed error handling for business logic failures.

use crate::config::ConfigError;
use crate::db::DatabaseError;
use crate::models::{BlockId, BlockType, PageId, ReferenceId, ValidationError};
use serde::Serialize;
use std::collections::BTreeSet;
use thiserror::Error;

/// Something that prevents a page or block from being deleted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProtectedBy {
    /// A child page; children are never deleted implicitly
    ChildPage { id: PageId, title: String },

    /// A reference held by a published block
    Reference {
        id: ReferenceId,
        containing_block: BlockId,
    },
}

/// Service operation errors
///
/// Validation failures and usage errors are surfaced as-is; the only retry the
/// services perform internally is the single re-allocation after a position
/// redistribution.
#[derive(Error, Debug)]
pub enum CmsError {
    #[error("Page not found: {id}")]
    PageNotFound { id: String },

    #[error("Block not found: {id}")]
    BlockNotFound { id: BlockId },

    #[error("Reference not found: {id}")]
    ReferenceNotFound { id: ReferenceId },

    /// A model invariant was violated
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Database operation failed: {0}")]
    Database(#[from] DatabaseError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Re-parenting would make a page its own ancestor
    #[error("Page {page_id} cannot become a descendant of itself")]
    CycleDetected { page_id: PageId },

    /// The `after` anchor of a block move lives on a different page
    #[error("Block {block_id} does not belong to page {page_id}")]
    CrossPageAfterMismatch { block_id: BlockId, page_id: PageId },

    /// Redistribution was asked to renumber blocks of several pages at once
    #[error("Cannot redistribute blocks spanning several pages: {page_ids:?}")]
    MultiPageSet { page_ids: BTreeSet<PageId> },

    /// Redistribution was given only part of a page's blocks
    #[error("Redistribution of page {page_id} needs all {expected} blocks, got {given}")]
    IncompletePageSet {
        page_id: PageId,
        expected: usize,
        given: usize,
    },

    /// A cast target is not a specialisation of the block's current type
    #[error("Cannot cast {from} block into {to}")]
    InvalidSubtype { from: BlockType, to: BlockType },

    /// Deletion refused; nothing was removed
    #[error("Deletion refused, still in use by {} item(s)", blocking.len())]
    ProtectedDeletion { blocking: Vec<ProtectedBy> },

    /// No free position even after redistribution (page holds too many blocks)
    #[error("No free block position on page {page_id}")]
    PositionSpaceExhausted { page_id: PageId },

    /// The operation only applies to text blocks
    #[error("Block {block_id} is a {block_type} block and has no content")]
    NotTextBlock {
        block_id: BlockId,
        block_type: BlockType,
    },
}

impl CmsError {
    pub fn page_not_found(id: impl ToString) -> Self {
        Self::PageNotFound { id: id.to_string() }
    }

    pub fn block_not_found(id: BlockId) -> Self {
        Self::BlockNotFound { id }
    }

    pub fn reference_not_found(id: ReferenceId) -> Self {
        Self::ReferenceNotFound { id }
    }

    /// Whether this error reports a cyclic hierarchy, however it was detected
    pub fn is_cycle(&self) -> bool {
        matches!(
            self,
            Self::CycleDetected { .. } | Self::Validation(ValidationError::CyclicHierarchy { .. })
        )
    }

    /// The reference ids a publish was missing, if that is what failed
    pub fn missing_references(&self) -> Option<&BTreeSet<ReferenceId>> {
        match self {
            Self::Validation(ValidationError::MissingReferences(ids)) => Some(ids),
            _ => None,
        }
    }
}
