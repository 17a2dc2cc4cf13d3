//! Pagetree Sweep
//!
//! Runs one garbage-collection pass over the configured database: unpublished
//! blocks older than `PAGETREE_UNPUBLISHED_BLOCK_TTL_SECS` and unsaved work
//! older than `PAGETREE_UNSAVED_WORK_TTL_SECS` are removed.
//!
//! Intended to be scheduled externally (cron, systemd timer).

use std::sync::Arc;

use pagetree_core::db::DatabaseService;
use pagetree_core::{CmsConfig, GarbageCollector};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = CmsConfig::from_env()?;
    tracing::info!("Database: {}", config.database_path.display());

    let db = Arc::new(DatabaseService::new(config.database_path.clone()).await?);
    let collector = GarbageCollector::new(db);

    let report = collector.collect_garbage(&config).await?;
    for sweep in &report.sweeps {
        tracing::info!(
            "{}: removed {}, kept {} (cutoff {})",
            sweep.sweeper,
            sweep.outcome.removed,
            sweep.outcome.kept,
            sweep.cutoff
        );
    }
    tracing::info!("Sweep complete, {} items removed", report.total_removed());

    Ok(())
}
