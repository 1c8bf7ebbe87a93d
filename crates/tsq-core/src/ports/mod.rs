//! Ports - 抽象化レイヤー
//!
//! このモジュールは Hexagonal Architecture の「ポート」を定義します。
//! 各 trait は外部（ストレージ、タスク実装、時刻、ID 生成）へのインターフェースを提供し、
//! 実装の詳細を隠蔽します。

pub mod clean_strategy;
pub mod clock;
pub mod id_generator;
pub mod job_store;
pub mod runner;

// 主要な trait を再エクスポート
pub use self::clean_strategy::CleanStrategy;
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::job_store::JobStore;
pub use self::runner::{FnRunner, Runner, TaskFailure};
