//! Runtime configuration for survey core hosts.
//!
//! # Responsibility
//! - Resolve database and logging settings from explicit overrides, then
//!   environment variables, then defaults.
//!
//! # Invariants
//! - Resolved log level is one of `trace|debug|info|warn|error`.
//! - Resolved log directory, when present, is absolute.

use crate::db::{open_db, open_db_in_memory, DbResult};
use crate::logging::{
    default_log_level, init_logging, normalize_level, normalize_log_dir, LoggingError,
};
use rusqlite::Connection;
use std::path::PathBuf;

pub const ENV_DB_PATH: &str = "SURVEY_DB_PATH";
pub const ENV_LOG_LEVEL: &str = "SURVEY_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "SURVEY_LOG_DIR";

/// Values supplied explicitly by the host (for example CLI flags).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub db_path: Option<PathBuf>,
    pub log_level: Option<String>,
    pub log_dir: Option<PathBuf>,
}

/// Resolved core settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    /// `None` selects an in-memory database.
    pub db_path: Option<PathBuf>,
    pub log_level: &'static str,
    /// `None` leaves logging uninitialized.
    pub log_dir: Option<PathBuf>,
}

impl CoreConfig {
    /// Resolves settings against the process environment.
    pub fn resolve(overrides: ConfigOverrides) -> Result<Self, LoggingError> {
        Self::resolve_with(overrides, |key| std::env::var(key).ok())
    }

    /// Resolves settings against an arbitrary variable lookup.
    ///
    /// Blank environment values count as unset.
    pub fn resolve_with(
        overrides: ConfigOverrides,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, LoggingError> {
        let env = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let db_path = overrides
            .db_path
            .or_else(|| env(ENV_DB_PATH).map(PathBuf::from));
        let log_level = match overrides.log_level.or_else(|| env(ENV_LOG_LEVEL)) {
            Some(raw) => normalize_level(&raw)?,
            None => default_log_level(),
        };
        let log_dir = overrides
            .log_dir
            .or_else(|| env(ENV_LOG_DIR).map(PathBuf::from))
            .map(|dir| normalize_log_dir(&dir))
            .transpose()?;

        Ok(Self {
            db_path,
            log_level,
            log_dir,
        })
    }

    /// Opens the configured database with migrations applied.
    pub fn open_database(&self) -> DbResult<Connection> {
        match &self.db_path {
            Some(path) => open_db(path),
            None => open_db_in_memory(),
        }
    }

    /// Starts file logging when a directory is configured.
    ///
    /// Returns `true` when logging is active after the call.
    pub fn init_logging(&self) -> Result<bool, LoggingError> {
        match &self.log_dir {
            Some(dir) => init_logging(self.log_level, dir).map(|()| true),
            None => Ok(false),
        }
    }
}
