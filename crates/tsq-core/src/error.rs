use std::path::PathBuf;

use thiserror::Error;

use crate::domain::{IllegalTransition, JobId};
use crate::impls::MigrationError;

/// Errors surfaced by `TaskQueue` to its callers.
///
/// Task failures never show up here: a runner error becomes a `FAILURE` job.
#[derive(Debug, Error)]
pub enum TsqError {
    #[error("unknown task: {0}")]
    UnknownTask(String),

    #[error("job {0} not found")]
    NotFound(JobId),

    #[error("store failure: {0}")]
    Store(StoreError),

    #[error("migration failure: {0}")]
    Migration(MigrationError),

    #[error("task queue is already running")]
    AlreadyRunning,

    #[error("task queue is closed")]
    Closed,

    #[error("timed out waiting for job {0}")]
    WaitTimeout(JobId),
}

impl From<StoreError> for TsqError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Migration(err) => TsqError::Migration(err),
            other => TsqError::Store(other),
        }
    }
}

/// Backend errors, propagated verbatim (no retry anywhere).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("job store is not started")]
    NotStarted,

    #[error("job {0} already exists")]
    Duplicate(JobId),

    #[error("job {0} does not exist")]
    Missing(JobId),

    #[error("job {id}: {source}")]
    IllegalTransition {
        id: JobId,
        #[source]
        source: IllegalTransition,
    },

    #[error("corrupt row for job {id}: {reason}")]
    Corrupt { id: String, reason: String },

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error("json codec: {0}")]
    Codec(#[from] serde_json::Error),

    #[error(transparent)]
    Migration(#[from] MigrationError),

    #[error("blocking store call failed: {0}")]
    Blocking(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}
