//! Business Services
//!
//! This module contains the core business logic services:
//!
//! - `PageService` - Page hierarchy: create, move, rename, delete, navigation
//! - `BlockService` - Block ordering, publishing and deletion
//! - `ReferenceService` - Inline references, their validation and rendering
//! - `CastEngine` - Promotion of generic blocks to concrete variants
//! - `UnsavedWorkService` - Disposable editor snapshots
//! - `GarbageCollector` - TTL sweeps over unpublished blocks and unsaved work
//!
//! Services coordinate between the database layer and application logic,
//! implementing business rules and orchestrating multi-row operations inside
//! a single transaction.

pub mod block_service;
pub mod cast_engine;
pub mod error;
pub mod garbage_collector;
pub mod hierarchy;
pub mod page_service;
pub mod path_denormalizer;
pub mod reference_service;
pub mod unsaved_work_service;

pub use block_service::BlockService;
pub use cast_engine::CastEngine;
pub use error::{CmsError, ProtectedBy};
pub use garbage_collector::{
    GarbageCollector, GarbageReport, StaleBlockSweeper, SweepOutcome, SweepReport, Sweeper,
    UnsavedWorkSweeper, STALE_BLOCKS, UNSAVED_WORK,
};
pub use page_service::{CreatePageParams, PageService, PageUpdate};
pub use path_denormalizer::{cascade_descendants, save_page, SaveOutcome};
pub use reference_service::ReferenceService;
pub use unsaved_work_service::UnsavedWorkService;
