//! tsq-core
//!
//! In-process asynchronous job queue: named runners, a bounded submit queue
//! drained by a single worker, pluggable job stores and periodic cleanup.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（JobId, Job, JobStatus）
//! - **ports**: 抽象化レイヤー（JobStore, Runner, CleanStrategy, Clock, IdGenerator）
//! - **impls**: 実装（MemoryStore, SqliteStore, Migrations, TimeBasedStrategy）
//! - **app**: アプリケーションロジック（TaskQueue, QueueBuilder, WorkerLoop, Cleaner）
//! - **error**: エラー型
//! - **observability**: 集計ビュー（JobCounts）

pub mod app;
pub mod domain;
pub mod error;
pub mod impls;
pub mod observability;
pub mod ports;

pub use app::{BuildError, QueueBuilder, QueueConfig, Settings, StoreKind, TaskQueue};
pub use domain::{Job, JobId, JobStatus};
pub use error::{ConfigError, StoreError, TsqError};
pub use observability::JobCounts;
pub use ports::{CleanStrategy, FnRunner, JobStore, Runner, TaskFailure};
