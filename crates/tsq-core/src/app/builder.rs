//! QueueBuilder - TaskQueue の構築とワイヤリング
//!
//! # 起動時検証（Fail-fast 設計）
//! - expect_tasks() で期待される task 名を登録
//! - build() 時に「期待集合 ⊆ 定義済み集合」をチェック
//! - queue_length = 0 / clean_interval = 0 も build() で弾く

use std::sync::Arc;
use std::time::Duration;

use crate::app::config::{DEFAULT_CLEAN_INTERVAL, DEFAULT_MAX_AGE, DEFAULT_QUEUE_LENGTH};
use crate::app::{QueueConfig, RunnerRegistry, TaskQueue};
use crate::impls::{MemoryStore, TimeBasedStrategy};
use crate::ports::{CleanStrategy, Clock, IdGenerator, JobStore, Runner, SystemClock, UlidGenerator};

/// QueueBuilder は TaskQueue を構築
///
/// # 使用例
/// ```ignore
/// let queue = QueueBuilder::new()
///     .define("ping", PingRunner)
///     .expect_tasks(&["ping"])
///     .store(Arc::new(SqliteStore::new("./tsq.sqlite3")))
///     .max_age(Duration::from_secs(3600))
///     .build()?;
/// ```
///
/// 未指定の項目は [`QueueConfig::default`] と同じ値になります。
/// clean_strategy / id_generator を指定しない場合、既定の実装は clock() で渡した時計を使います。
pub struct QueueBuilder {
    registry: RunnerRegistry,
    expected_tasks: Option<Vec<String>>,
    queue_length: usize,
    store: Option<Arc<dyn JobStore>>,
    clean_interval: Duration,
    max_age: Duration,
    clean_strategy: Option<Arc<dyn CleanStrategy>>,
    clock: Option<Arc<dyn Clock>>,
    id_generator: Option<Arc<dyn IdGenerator>>,
}

/// BuildError は TaskQueue 構築時のエラー
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error("Missing tasks: {0:?}. These tasks were expected but not defined.")]
    MissingTasks(Vec<String>),

    #[error("queue_length must be at least 1")]
    ZeroQueueLength,

    #[error("clean_interval must be greater than zero")]
    ZeroCleanInterval,
}

impl QueueBuilder {
    pub fn new() -> Self {
        Self {
            registry: RunnerRegistry::new(),
            expected_tasks: None,
            queue_length: DEFAULT_QUEUE_LENGTH,
            store: None,
            clean_interval: DEFAULT_CLEAN_INTERVAL,
            max_age: DEFAULT_MAX_AGE,
            clean_strategy: None,
            clock: None,
            id_generator: None,
        }
    }

    /// Runner を定義（同名は後勝ち）
    pub fn define<R: Runner + 'static>(mut self, name: impl Into<String>, runner: R) -> Self {
        self.registry.define(name, Arc::new(runner));
        self
    }

    /// 期待される task 名のリストを設定
    pub fn expect_tasks(mut self, names: &[&str]) -> Self {
        self.expected_tasks = Some(names.iter().map(|name| name.to_string()).collect());
        self
    }

    pub fn queue_length(mut self, queue_length: usize) -> Self {
        self.queue_length = queue_length;
        self
    }

    pub fn store(mut self, store: Arc<dyn JobStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn clean_interval(mut self, interval: Duration) -> Self {
        self.clean_interval = interval;
        self
    }

    /// Max age for the default time-based strategy. Ignored when
    /// `clean_strategy` is set explicitly.
    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn clean_strategy(mut self, strategy: Arc<dyn CleanStrategy>) -> Self {
        self.clean_strategy = Some(strategy);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn id_generator(mut self, id_generator: Arc<dyn IdGenerator>) -> Self {
        self.id_generator = Some(id_generator);
        self
    }

    /// QueueBuilder を検証して TaskQueue を生成
    ///
    /// # 検証
    /// - expect_tasks() で設定された task が全て定義されているか
    /// - queue_length / clean_interval が 0 でないか
    pub fn build(self) -> Result<TaskQueue, BuildError> {
        if let Some(expected_tasks) = &self.expected_tasks {
            let missing_tasks: Vec<String> = expected_tasks
                .iter()
                .filter(|name| !self.registry.contains(name))
                .cloned()
                .collect();
            if !missing_tasks.is_empty() {
                return Err(BuildError::MissingTasks(missing_tasks));
            }
        }

        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);
        let clean_strategy = self.clean_strategy.unwrap_or_else(|| {
            Arc::new(TimeBasedStrategy::with_clock(self.max_age, Arc::clone(&clock)))
        });
        let id_generator = self
            .id_generator
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(Arc::clone(&clock))));
        let config = QueueConfig {
            queue_length: self.queue_length,
            store: self
                .store
                .unwrap_or_else(|| Arc::new(MemoryStore::new())),
            clean_interval: self.clean_interval,
            clean_strategy,
            clock,
            id_generator,
        };

        TaskQueue::with_registry(config, self.registry)
    }
}

impl Default for QueueBuilder {
    fn default() -> Self {
        Self::new()
    }
}
