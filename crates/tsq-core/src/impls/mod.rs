//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **MemoryStore**: プロセス内の JobStore（デフォルト）
//! - **SqliteStore**: SQLite による永続 JobStore
//! - **Migrations**: SqliteStore が start 時に流す名前付きマイグレーション
//! - **TimeBasedStrategy**: デフォルトの CleanStrategy

pub mod memory_store;
pub mod migrations;
pub mod sqlite_store;
pub mod time_based;

// 主要な型を再エクスポート
pub use self::memory_store::MemoryStore;
pub use self::migrations::{Migration, MigrationError, MigrationFn, Migrations};
pub use self::sqlite_store::{job_migrations, SqliteStore, DEFAULT_SQLITE_PATH};
pub use self::time_based::TimeBasedStrategy;
