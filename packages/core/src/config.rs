//! Runtime Configuration
//!
//! Time-to-live values for disposable state and the database location. Nothing
//! in the crate reads these ambiently: callers pass a `CmsConfig` (or an
//! explicit cutoff) into the operations that need it.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const DATABASE_PATH_ENV: &str = "PAGETREE_DATABASE_PATH";
pub const UNPUBLISHED_BLOCK_TTL_ENV: &str = "PAGETREE_UNPUBLISHED_BLOCK_TTL_SECS";
pub const UNSAVED_WORK_TTL_ENV: &str = "PAGETREE_UNSAVED_WORK_TTL_SECS";

/// One day
const DEFAULT_UNPUBLISHED_BLOCK_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// One week
const DEFAULT_UNSAVED_WORK_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Environment variable {name} is not a whole number of seconds: '{value}'")]
    InvalidSeconds { name: &'static str, value: String },

    #[error("{name} must be greater than zero")]
    ZeroTtl { name: &'static str },

    #[error("{name} is too large to represent as a timestamp offset")]
    TtlOutOfRange { name: &'static str },

    #[error("Database path cannot be empty")]
    EmptyDatabasePath,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CmsConfig {
    pub database_path: PathBuf,

    /// Age after which an unpublished block is swept
    pub unpublished_block_ttl: Duration,

    /// Age after which an unsaved-work snapshot is swept
    pub unsaved_work_ttl: Duration,
}

impl Default for CmsConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("./data/pagetree.db"),
            unpublished_block_ttl: DEFAULT_UNPUBLISHED_BLOCK_TTL,
            unsaved_work_ttl: DEFAULT_UNSAVED_WORK_TTL,
        }
    }
}

impl CmsConfig {
    /// Defaults overridden by any `PAGETREE_*` variables that are set
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = lookup(DATABASE_PATH_ENV) {
            config.database_path = PathBuf::from(path);
        }
        if let Some(secs) = lookup(UNPUBLISHED_BLOCK_TTL_ENV) {
            config.unpublished_block_ttl = parse_seconds(UNPUBLISHED_BLOCK_TTL_ENV, &secs)?;
        }
        if let Some(secs) = lookup(UNSAVED_WORK_TTL_ENV) {
            config.unsaved_work_ttl = parse_seconds(UNSAVED_WORK_TTL_ENV, &secs)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database_path.as_os_str().is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }
        self.block_ttl()?;
        self.work_ttl()?;
        Ok(())
    }

    /// Unpublished-block TTL as a chrono offset
    pub fn block_ttl(&self) -> Result<chrono::Duration, ConfigError> {
        to_chrono("unpublished_block_ttl", self.unpublished_block_ttl)
    }

    /// Unsaved-work TTL as a chrono offset
    pub fn work_ttl(&self) -> Result<chrono::Duration, ConfigError> {
        to_chrono("unsaved_work_ttl", self.unsaved_work_ttl)
    }
}

fn parse_seconds(name: &'static str, value: &str) -> Result<Duration, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|_| ConfigError::InvalidSeconds {
            name,
            value: value.to_string(),
        })
}

fn to_chrono(name: &'static str, ttl: Duration) -> Result<chrono::Duration, ConfigError> {
    if ttl.is_zero() {
        return Err(ConfigError::ZeroTtl { name });
    }
    chrono::Duration::from_std(ttl).map_err(|_| ConfigError::TtlOutOfRange { name })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = CmsConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.block_ttl().unwrap(), chrono::Duration::days(1));
        assert_eq!(config.work_ttl().unwrap(), chrono::Duration::days(7));
    }

    #[test]
    fn test_lookup_overrides() {
        let config = CmsConfig::from_lookup(lookup_from(&[
            (DATABASE_PATH_ENV, "/tmp/cms.db"),
            (UNPUBLISHED_BLOCK_TTL_ENV, "60"),
            (UNSAVED_WORK_TTL_ENV, " 120 "),
        ]))
        .unwrap();

        assert_eq!(config.database_path, PathBuf::from("/tmp/cms.db"));
        assert_eq!(config.unpublished_block_ttl, Duration::from_secs(60));
        assert_eq!(config.unsaved_work_ttl, Duration::from_secs(120));
    }

    #[test]
    fn test_rejects_bad_values() {
        let err = CmsConfig::from_lookup(lookup_from(&[(UNSAVED_WORK_TTL_ENV, "soon")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSeconds { .. }));

        let err = CmsConfig::from_lookup(lookup_from(&[(UNPUBLISHED_BLOCK_TTL_ENV, "0")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::ZeroTtl {
                name: "unpublished_block_ttl"
            }
        );

        let err = CmsConfig::from_lookup(lookup_from(&[(DATABASE_PATH_ENV, "")])).unwrap_err();
        assert_eq!(err, ConfigError::EmptyDatabasePath);
    }

    #[test]
    fn test_huge_ttl_is_out_of_range() {
        let config = CmsConfig {
            unsaved_work_ttl: Duration::from_secs(u64::MAX),
            ..CmsConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::TtlOutOfRange { .. })
        ));
    }
}
