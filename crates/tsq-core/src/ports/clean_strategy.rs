//! CleanStrategy port - 保持ポリシーの抽象化
//!
//! # 実装
//! - **TimeBasedStrategy**: updated が max_age 以内の job を残す（デフォルト）
//!
//! 未完了の job（PENDING / RUNNING）は strategy の判定に関係なく store が残します。
//! strategy が見るのは完了済みの job だけだと考えてよい。

use crate::domain::Job;

/// CleanStrategy は job を残すかどうかを判定
pub trait CleanStrategy: Send + Sync {
    fn should_keep(&self, job: &Job) -> bool;
}

impl<F> CleanStrategy for F
where
    F: Fn(&Job) -> bool + Send + Sync,
{
    fn should_keep(&self, job: &Job) -> bool {
        self(job)
    }
}
