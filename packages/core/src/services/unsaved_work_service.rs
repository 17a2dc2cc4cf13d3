//! Unsaved-work snapshots keyed by (user, path)

use crate::config::CmsConfig;
use crate::db::unsaved_work_store::{
    db_delete_unsaved_work, db_get_unsaved_work, db_upsert_unsaved_work,
};
use crate::db::DatabaseService;
use crate::models::UnsavedWork;
use crate::services::error::CmsError;
use chrono::{Duration, Utc};
use std::sync::Arc;

pub struct UnsavedWorkService {
    db: Arc<DatabaseService>,
    ttl: Duration,
}

impl UnsavedWorkService {
    /// Service whose snapshots expire after `config.unsaved_work_ttl`
    pub fn new(db: Arc<DatabaseService>, config: &CmsConfig) -> Result<Self, CmsError> {
        Ok(Self {
            db,
            ttl: config.work_ttl()?,
        })
    }

    /// Store `work` for (`user`, `path`), replacing any earlier snapshot
    pub async fn save_unsaved_work(
        &self,
        user: &str,
        path: &str,
        work: &str,
    ) -> Result<UnsavedWork, CmsError> {
        let conn = self.db.connect_with_timeout().await?;
        db_upsert_unsaved_work(&conn, user, path, work, Utc::now()).await?;

        db_get_unsaved_work(&conn, user, path).await?.ok_or_else(|| {
            crate::db::DatabaseError::sql_execution(format!(
                "Unsaved work for {} at {} vanished after save",
                user, path
            ))
            .into()
        })
    }

    /// The live snapshot for (`user`, `path`)
    ///
    /// An expired snapshot is deleted and reported as absent.
    pub async fn get_unsaved_work(
        &self,
        user: &str,
        path: &str,
    ) -> Result<Option<UnsavedWork>, CmsError> {
        let conn = self.db.connect_with_timeout().await?;
        let Some(work) = db_get_unsaved_work(&conn, user, path).await? else {
            return Ok(None);
        };

        if work.is_expired(Utc::now(), self.ttl) {
            db_delete_unsaved_work(&conn, user, path).await?;
            tracing::debug!("Reclaimed expired unsaved work for {} at {}", user, path);
            return Ok(None);
        }
        Ok(Some(work))
    }

    /// Drop the snapshot; returns whether one existed
    pub async fn discard_unsaved_work(&self, user: &str, path: &str) -> Result<bool, CmsError> {
        let conn = self.db.connect_with_timeout().await?;
        Ok(db_delete_unsaved_work(&conn, user, path).await? > 0)
    }
}
