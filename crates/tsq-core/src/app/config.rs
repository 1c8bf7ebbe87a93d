//! Queue configuration.
//!
//! - [`QueueConfig`]: the wiring a `TaskQueue` is built from. `Default` gives the
//!   stock setup; nothing here is global.
//! - [`Settings`]: the serializable subset, loaded from TOML by the CLI.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::app::{BuildError, QueueBuilder};
use crate::error::ConfigError;
use crate::impls::{MemoryStore, SqliteStore, TimeBasedStrategy, DEFAULT_SQLITE_PATH};
use crate::ports::{CleanStrategy, Clock, IdGenerator, JobStore, SystemClock, UlidGenerator};

pub const DEFAULT_QUEUE_LENGTH: usize = 10;
pub const DEFAULT_CLEAN_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

pub struct QueueConfig {
    /// Capacity of the submit channel; `submit` waits once it is full.
    pub queue_length: usize,
    pub store: Arc<dyn JobStore>,
    pub clean_interval: Duration,
    pub clean_strategy: Arc<dyn CleanStrategy>,
    pub clock: Arc<dyn Clock>,
    pub id_generator: Arc<dyn IdGenerator>,
}

impl QueueConfig {
    /// Reject values the runtime cannot honor.
    pub fn validate(&self) -> Result<(), BuildError> {
        if self.queue_length == 0 {
            return Err(BuildError::ZeroQueueLength);
        }
        if self.clean_interval.is_zero() {
            return Err(BuildError::ZeroCleanInterval);
        }
        Ok(())
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        Self {
            queue_length: DEFAULT_QUEUE_LENGTH,
            store: Arc::new(MemoryStore::new()),
            clean_interval: DEFAULT_CLEAN_INTERVAL,
            clean_strategy: Arc::new(TimeBasedStrategy::with_clock(
                DEFAULT_MAX_AGE,
                Arc::clone(&clock),
            )),
            id_generator: Arc::new(UlidGenerator::new(Arc::clone(&clock))),
            clock,
        }
    }
}

impl fmt::Debug for QueueConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueConfig")
            .field("queue_length", &self.queue_length)
            .field("clean_interval", &self.clean_interval)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    Memory,
    Sqlite,
}

impl FromStr for StoreKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(StoreKind::Memory),
            "sqlite" => Ok(StoreKind::Sqlite),
            other => Err(format!("unknown store kind: {other}")),
        }
    }
}

/// File-level settings.
///
/// ```toml
/// queue_length = 10
/// store = "sqlite"
/// sqlite_path = "./tsq.sqlite3"
/// clean_interval_secs = 86400
/// max_age_secs = 604800
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub queue_length: usize,
    pub store: StoreKind,
    pub sqlite_path: PathBuf,
    pub clean_interval_secs: u64,
    pub max_age_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            queue_length: DEFAULT_QUEUE_LENGTH,
            store: StoreKind::Memory,
            sqlite_path: PathBuf::from(DEFAULT_SQLITE_PATH),
            clean_interval_secs: DEFAULT_CLEAN_INTERVAL.as_secs(),
            max_age_secs: DEFAULT_MAX_AGE.as_secs(),
        }
    }
}

impl Settings {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// A fresh, not yet started store of the configured kind.
    pub fn open_store(&self) -> Arc<dyn JobStore> {
        match self.store {
            StoreKind::Memory => Arc::new(MemoryStore::new()),
            StoreKind::Sqlite => Arc::new(SqliteStore::new(&self.sqlite_path)),
        }
    }

    /// A builder pre-loaded with these settings; runners still need defining.
    pub fn builder(&self) -> QueueBuilder {
        QueueBuilder::new()
            .queue_length(self.queue_length)
            .store(self.open_store())
            .clean_interval(Duration::from_secs(self.clean_interval_secs))
            .max_age(Duration::from_secs(self.max_age_secs))
    }
}
