//! JobStore port - job の正本（source of truth）
//!
//! JobStore は job のコレクションを排他的に所有します。
//! TaskQueue は job を保持せず、状態の読み書きはすべてここを通ります。
//!
//! # 実装
//! - **MemoryStore**: プロセス内（揮発）
//! - **SqliteStore**: SQLite（永続、マイグレーション付き）

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::domain::{Job, JobId, JobStatus};
use crate::error::StoreError;
use crate::ports::CleanStrategy;

/// JobStore は job の永続化を担当
///
/// # 設計原則
/// - 変更操作（store / set_status / set_result / clean）は store 自身のロックで直列化
/// - 読み取りも同じロックを取る（書きかけの job を見せない）
/// - set_status は状態遷移の規則（PENDING → RUNNING → SUCCESS|FAILURE）を強制
/// - clean は未完了の job を決して削除しない
///
/// # 並び順
/// get_jobs の順序は実装ごとに異なる（MemoryStore は挿入順、SqliteStore は created の降順）。
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Lifecycle hook run by `TaskQueue::start` (open connections, migrate).
    async fn start(&self) -> Result<(), StoreError> {
        Ok(())
    }

    /// Lifecycle hook run by `TaskQueue::stop`.
    async fn stop(&self) -> Result<(), StoreError> {
        Ok(())
    }

    /// Persist a new job. Fails with `Duplicate` if the id is already present.
    async fn store(&self, job: &Job) -> Result<(), StoreError>;

    async fn get_job(&self, id: &JobId) -> Result<Option<Job>, StoreError>;

    async fn get_jobs(&self) -> Result<Vec<Job>, StoreError>;

    async fn set_status(
        &self,
        id: &JobId,
        status: JobStatus,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn set_result(&self, id: &JobId, result: &Value) -> Result<(), StoreError>;

    /// Drop every finished job the strategy does not keep. Returns how many were removed.
    async fn clean(&self, strategy: &dyn CleanStrategy) -> Result<usize, StoreError>;
}
