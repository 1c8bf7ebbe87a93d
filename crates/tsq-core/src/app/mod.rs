//! App - アプリケーション層
//!
//! ports を組み合わせてキューの振る舞いを実装します。
//!
//! # 主要コンポーネント
//! - **TaskQueue**: 公開 API（define / submit / get_job / get_jobs / start / stop）
//! - **QueueBuilder**: TaskQueue の構築と起動時検証
//! - **QueueConfig / Settings**: 構成（コード / TOML）
//! - **RunnerRegistry**: 名前 → Runner
//! - **WorkerLoop**: 単一 worker の実行ループ
//! - **Cleaner**: 完了済み job の定期削除

pub mod builder;
pub mod cleaner;
pub mod config;
pub mod registry;
pub mod task_queue;
pub mod worker_loop;

// 主要な型を再エクスポート
pub use self::builder::{BuildError, QueueBuilder};
pub use self::cleaner::{Cleaner, CleanerHandle};
pub use self::config::{QueueConfig, Settings, StoreKind};
pub use self::registry::RunnerRegistry;
pub use self::task_queue::TaskQueue;
pub use self::worker_loop::{WorkerLoop, WorkerSignal};
