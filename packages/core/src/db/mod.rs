//! Database Layer
//!
//! This module handles all database interactions using libsql:
//!
//! - Database initialization and connection management
//! - Transaction helpers that commit or roll back on every exit path
//! - One store module per table family, each a set of free functions over a
//!   borrowed `libsql::Connection`
//! - Pure position arithmetic for block ordering
//!
//! # Architecture
//!
//! The services open one connection per operation with
//! [`DatabaseService::connect_with_timeout`] and pass it down to the store
//! functions, so a multi-table change runs on a single connection inside a
//! single transaction.

mod database;
mod error;
pub mod block_store;
pub mod page_store;
pub mod position_allocator;
pub mod reference_store;
pub mod unsaved_work_store;

pub use database::{
    begin_transaction, finish_transaction, format_timestamp, parse_timestamp, DatabaseService,
    TIMESTAMP_FORMAT,
};
pub use error::DatabaseError;
pub use position_allocator::{
    Allocation, PositionAllocator, DEFAULT_POSITION, MAX_POSITION, MIN_POSITION, POSITION_STEP,
};
