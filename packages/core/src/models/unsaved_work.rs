//! Unsaved Work Snapshots
//!
//! Editors periodically stash in-progress text per `(user, path)` so that work
//! survives a closed tab. Snapshots are disposable and expire after a TTL.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsavedWork {
    pub id: i64,

    /// Opaque user identifier supplied by the application layer
    pub user: String,

    /// Editor location the work belongs to (usually a URL path)
    pub path: String,

    pub work: String,

    pub updated: DateTime<Utc>,
}

impl UnsavedWork {
    /// Whether this snapshot is older than `ttl` at `now`
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        self.updated < now - ttl
    }
}
