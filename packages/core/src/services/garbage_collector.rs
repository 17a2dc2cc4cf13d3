//! Garbage Collection of Disposable State
//!
//! Unpublished blocks and unsaved-work snapshots are scratch data. A sweep
//! removes whatever is older than its configured time-to-live. Expired state
//! is reclaimed silently; only genuine failures are reported as errors.
//!
//! The collector runs a list of [`Sweeper`]s, each owning one kind of state
//! and choosing its own TTL from the [`CmsConfig`] it is handed.

use crate::config::{CmsConfig, ConfigError};
use crate::db::block_store::db_get_unpublished_before;
use crate::db::unsaved_work_store::db_delete_unsaved_work_before;
use crate::db::{begin_transaction, finish_transaction, DatabaseService};
use crate::services::block_service::delete_block_in;
use crate::services::error::CmsError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::Connection;
use serde::Serialize;
use std::sync::Arc;

/// What one sweeper did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepOutcome {
    pub removed: u64,

    /// Expired but still in use, left in place
    pub kept: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub sweeper: &'static str,
    pub cutoff: DateTime<Utc>,
    #[serde(flatten)]
    pub outcome: SweepOutcome,
}

/// Result of a full collection pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GarbageReport {
    pub sweeps: Vec<SweepReport>,
}

impl GarbageReport {
    /// Outcome of the named sweeper, if it ran
    pub fn outcome(&self, sweeper: &str) -> Option<SweepOutcome> {
        self.sweeps
            .iter()
            .find(|report| report.sweeper == sweeper)
            .map(|report| report.outcome)
    }

    pub fn total_removed(&self) -> u64 {
        self.sweeps.iter().map(|report| report.outcome.removed).sum()
    }
}

/// One kind of expirable state
#[async_trait]
pub trait Sweeper: Send + Sync {
    fn name(&self) -> &'static str;

    /// How long state of this kind lives under `config`
    fn ttl(&self, config: &CmsConfig) -> Result<chrono::Duration, ConfigError>;

    /// Remove everything that expired before `cutoff`
    async fn sweep_before(
        &self,
        conn: &Connection,
        cutoff: DateTime<Utc>,
    ) -> Result<SweepOutcome, CmsError>;
}

/// Removes unpublished blocks older than the block TTL
///
/// Each block is deleted in its own transaction with the usual reference
/// policy: references from other unpublished blocks are dropped, and a block
/// still referenced from published content is kept.
pub struct StaleBlockSweeper;

pub const STALE_BLOCKS: &str = "stale_blocks";
pub const UNSAVED_WORK: &str = "unsaved_work";

#[async_trait]
impl Sweeper for StaleBlockSweeper {
    fn name(&self) -> &'static str {
        STALE_BLOCKS
    }

    fn ttl(&self, config: &CmsConfig) -> Result<chrono::Duration, ConfigError> {
        config.block_ttl()
    }

    async fn sweep_before(
        &self,
        conn: &Connection,
        cutoff: DateTime<Utc>,
    ) -> Result<SweepOutcome, CmsError> {
        let mut outcome = SweepOutcome::default();

        for block_id in db_get_unpublished_before(conn, cutoff).await? {
            begin_transaction(conn).await?;
            let result = delete_block_in(conn, block_id).await;

            match finish_transaction(conn, result).await {
                Ok(()) => outcome.removed += 1,
                Err(CmsError::ProtectedDeletion { .. }) => {
                    tracing::debug!("Keeping stale block {}: referenced by published content", block_id);
                    outcome.kept += 1;
                }
                // Already removed along with its page
                Err(CmsError::BlockNotFound { .. }) => {}
                Err(e) => return Err(e),
            }
        }

        Ok(outcome)
    }
}

/// Removes unsaved-work snapshots older than the unsaved-work TTL
pub struct UnsavedWorkSweeper;

#[async_trait]
impl Sweeper for UnsavedWorkSweeper {
    fn name(&self) -> &'static str {
        UNSAVED_WORK
    }

    fn ttl(&self, config: &CmsConfig) -> Result<chrono::Duration, ConfigError> {
        config.work_ttl()
    }

    async fn sweep_before(
        &self,
        conn: &Connection,
        cutoff: DateTime<Utc>,
    ) -> Result<SweepOutcome, CmsError> {
        let removed = db_delete_unsaved_work_before(conn, cutoff).await?;
        Ok(SweepOutcome { removed, kept: 0 })
    }
}

pub struct GarbageCollector {
    db: Arc<DatabaseService>,
    sweepers: Vec<Box<dyn Sweeper>>,
}

impl GarbageCollector {
    /// Collector with the stale-block and unsaved-work sweepers
    pub fn new(db: Arc<DatabaseService>) -> Self {
        Self::with_sweepers(
            db,
            vec![Box::new(StaleBlockSweeper), Box::new(UnsavedWorkSweeper)],
        )
    }

    pub fn with_sweepers(db: Arc<DatabaseService>, sweepers: Vec<Box<dyn Sweeper>>) -> Self {
        Self { db, sweepers }
    }

    /// Run every sweeper with the TTLs from `config`
    pub async fn collect_garbage(&self, config: &CmsConfig) -> Result<GarbageReport, CmsError> {
        self.collect_garbage_at(Utc::now(), config).await
    }

    /// Run every sweeper as if the current time were `now`
    pub async fn collect_garbage_at(
        &self,
        now: DateTime<Utc>,
        config: &CmsConfig,
    ) -> Result<GarbageReport, CmsError> {
        let conn = self.db.connect_with_timeout().await?;
        let mut report = GarbageReport::default();

        for sweeper in &self.sweepers {
            let cutoff = now - sweeper.ttl(config)?;
            let outcome = sweeper.sweep_before(&conn, cutoff).await?;

            tracing::info!(
                "Sweeper {} removed {} (kept {}) older than {}",
                sweeper.name(),
                outcome.removed,
                outcome.kept,
                cutoff
            );
            report.sweeps.push(SweepReport {
                sweeper: sweeper.name(),
                cutoff,
                outcome,
            });
        }

        Ok(report)
    }

    /// Remove unpublished blocks created before `cutoff`
    pub async fn remove_stale_blocks_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<SweepOutcome, CmsError> {
        let conn = self.db.connect_with_timeout().await?;
        StaleBlockSweeper.sweep_before(&conn, cutoff).await
    }

    /// Remove unsaved work last updated before `cutoff`
    pub async fn remove_unsaved_work_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<SweepOutcome, CmsError> {
        let conn = self.db.connect_with_timeout().await?;
        UnsavedWorkSweeper.sweep_before(&conn, cutoff).await
    }
}
