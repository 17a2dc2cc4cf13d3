//! Pagetree Core Business Logic Layer
//!
//! This crate provides the data management and service orchestration for a
//! hierarchical content store: a tree of pages, ordered content blocks on each
//! page, and inline cross-references between them.
//!
//! # Architecture
//!
//! - **Materialised paths**: every page caches its ancestors' slugs and titles,
//!   kept consistent on every move or rename by a breadth-first cascade
//! - **Sparse ordering**: block positions leave gaps so inserts never renumber
//!   siblings; a page is redistributed only when a gap closes
//! - **Separate variant rows**: a block's base row and its typed row share an
//!   id, so casting keeps identity and foreign keys
//! - **libsql**: Embedded SQLite-compatible database
//!
//! # Modules
//!
//! - [`models`] - Data structures (Page, Block, Reference, ...)
//! - [`services`] - Business services (PageService, BlockService, ...)
//! - [`db`] - Database layer with libsql integration
//! - [`config`] - Runtime configuration (database path, TTLs)

pub mod config;
pub mod db;
pub mod models;
pub mod services;

// Re-export commonly used types
pub use config::{CmsConfig, ConfigError};
pub use models::*;
pub use services::*;
