//! WorkerLoop - 単一 worker による job 実行ループ
//!
//! # フロー
//! 1. 有界チャネルから JobId を取り出す（FIFO）
//! 2. JobStore::set_status(RUNNING)
//! 3. Runner 実行（panic は FAILURE として捕捉）
//! 4. JobStore::set_result → set_status(SUCCESS | FAILURE)
//!
//! # 不変条件
//! - worker は 1 つだけ。次の job は前の job が終端状態になってから取り出す
//! - result は終端状態より先に書く
//! - result の書き込みに失敗しても終端状態には進める（その job は result なしで終わる）
//! - store エラーはログに残すだけで、リトライしない
//!
//! # 停止
//! - [`WorkerSignal::Stop`]: 実行中の job を終えたら止まる。残りの id はチャネルに残る
//! - [`WorkerSignal::Drain`]: チャネルが空になるまで実行してから止まる

use std::any::Any;
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, warn};

use crate::app::RunnerRegistry;
use crate::domain::{JobId, JobStatus};
use crate::ports::{Clock, JobStore, TaskFailure};

/// Value of the worker's control channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerSignal {
    Run,
    Stop,
    Drain,
}

pub struct WorkerLoop {
    store: Arc<dyn JobStore>,
    registry: Arc<RwLock<RunnerRegistry>>,
    clock: Arc<dyn Clock>,
}

impl WorkerLoop {
    pub fn new(
        store: Arc<dyn JobStore>,
        registry: Arc<RwLock<RunnerRegistry>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            registry,
            clock,
        }
    }

    /// Consume ids until told to stop, then hand the receiver back so the
    /// queue can be restarted without losing pending ids.
    ///
    /// Signals are only observed between jobs; an in-flight job always runs
    /// to completion.
    pub async fn run(
        self,
        mut jobs: mpsc::Receiver<JobId>,
        mut signal: watch::Receiver<WorkerSignal>,
    ) -> mpsc::Receiver<JobId> {
        loop {
            let current = *signal.borrow_and_update();
            let id = match current {
                WorkerSignal::Stop => break,
                WorkerSignal::Drain => match jobs.try_recv() {
                    Ok(id) => id,
                    Err(_) => break,
                },
                WorkerSignal::Run => tokio::select! {
                    biased;
                    changed = signal.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        continue;
                    }
                    id = jobs.recv() => match id {
                        Some(id) => id,
                        // every sender is gone: the queue itself was dropped
                        None => break,
                    },
                },
            };

            self.execute(&id).await;
        }
        jobs
    }

    /// Run one job through its whole lifecycle.
    pub async fn execute(&self, id: &JobId) {
        let job = match self.store.get_job(id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                warn!(job_id = %id, "dequeued job is no longer in the store");
                return;
            }
            Err(e) => {
                error!(job_id = %id, error = %e, "failed to load dequeued job");
                return;
            }
        };

        if let Err(e) = self
            .store
            .set_status(id, JobStatus::Running, self.clock.now())
            .await
        {
            error!(job_id = %id, error = %e, "failed to mark job running");
            return;
        }
        debug!(job_id = %id, task = %job.name, "job running");

        let runner = self
            .registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&job.name);

        let outcome = match runner {
            Some(runner) => {
                let arguments = job.arguments;
                // 別タスクで実行して panic を JoinError として受け取る
                let handle = tokio::spawn(async move { runner.run(arguments).await });
                match handle.await {
                    Ok(outcome) => outcome,
                    Err(e) if e.is_panic() => Err(TaskFailure::new(format!(
                        "task panicked: {}",
                        panic_message(e.into_panic())
                    ))),
                    Err(e) => Err(TaskFailure::new(format!("task aborted: {e}"))),
                }
            }
            None => Err(TaskFailure::new(format!("unknown task: {}", job.name))),
        };

        let (status, result) = match outcome {
            Ok(value) => (JobStatus::Success, value),
            Err(failure) => {
                debug!(job_id = %id, error = %failure, "task failed");
                (JobStatus::Failure, failure.into_result())
            }
        };

        if let Err(e) = self.store.set_result(id, &result).await {
            error!(job_id = %id, error = %e, "failed to store job result; finishing without it");
        }
        if let Err(e) = self.store.set_status(id, status, self.clock.now()).await {
            error!(job_id = %id, error = %e, "failed to finish job");
            return;
        }
        debug!(job_id = %id, status = %status, "job finished");
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
