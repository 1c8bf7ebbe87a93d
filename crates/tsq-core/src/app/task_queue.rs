//! TaskQueue - 公開 API
//!
//! # 構成
//! - submit → JobStore::store(PENDING) → 有界チャネルに JobId を送る
//! - WorkerLoop（1 つだけ）がチャネルから取り出して実行
//! - Cleaner が定期的に完了済み job を削除
//!
//! TaskQueue 自身は job を保持しません。状態はすべて JobStore にあります。

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::app::{
    BuildError, Cleaner, CleanerHandle, QueueConfig, RunnerRegistry, WorkerLoop, WorkerSignal,
};
use crate::domain::{Job, JobId};
use crate::error::TsqError;
use crate::observability::JobCounts;
use crate::ports::{Clock, IdGenerator, JobStore, Runner};

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

enum Lifecycle {
    /// Not running; the receiver waits for the next `start`.
    Idle(mpsc::Receiver<JobId>),
    Running(Running),
    /// The worker died and took the receiver with it.
    Closed,
}

struct Running {
    signal_tx: watch::Sender<WorkerSignal>,
    worker: JoinHandle<mpsc::Receiver<JobId>>,
    cleaner: CleanerHandle,
}

/// TaskQueue はタスク定義・投入・参照の入口
///
/// # 使用例
/// ```ignore
/// let queue = QueueBuilder::new().define("ping", PingRunner).build()?;
/// queue.start().await?;
/// let job = queue.submit("ping", Value::Null).await?;
/// let job = queue.wait_for_job(&job.id, Duration::from_secs(5)).await?;
/// queue.stop().await?;
/// ```
///
/// # 並行性
/// - submit / get_job / get_jobs は複数の呼び出し元から同時に呼べる
/// - job の実行は常に 1 件ずつ（submit 順）
/// - チャネルが満杯のとき submit は空きが出るまで待つ（タイムアウトなし）
pub struct TaskQueue {
    store: Arc<dyn JobStore>,
    registry: Arc<RwLock<RunnerRegistry>>,
    clock: Arc<dyn Clock>,
    id_generator: Arc<dyn IdGenerator>,
    cleaner: Cleaner,
    sender: mpsc::Sender<JobId>,
    lifecycle: Mutex<Lifecycle>,
}

impl TaskQueue {
    pub fn new(config: QueueConfig) -> Result<Self, BuildError> {
        Self::with_registry(config, RunnerRegistry::new())
    }

    pub fn with_registry(config: QueueConfig, registry: RunnerRegistry) -> Result<Self, BuildError> {
        config.validate()?;
        let (sender, receiver) = mpsc::channel(config.queue_length);
        Ok(Self {
            cleaner: Cleaner::new(
                Arc::clone(&config.store),
                config.clean_strategy,
                config.clean_interval,
            ),
            store: config.store,
            registry: Arc::new(RwLock::new(registry)),
            clock: config.clock,
            id_generator: config.id_generator,
            sender,
            lifecycle: Mutex::new(Lifecycle::Idle(receiver)),
        })
    }

    fn runners(&self) -> RwLockReadGuard<'_, RunnerRegistry> {
        self.registry.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bind `name` to `runner`. Redefining a name replaces the previous runner;
    /// jobs already queued under that name run with the new one.
    pub fn define<R: Runner + 'static>(&self, name: impl Into<String>, runner: R) {
        let name = name.into();
        debug!(task = %name, "task defined");
        self.registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .define(name, Arc::new(runner));
    }

    /// Sorted names of every defined task.
    pub fn defined_tasks(&self) -> Vec<String> {
        self.runners().names()
    }

    /// Create a PENDING job and enqueue it.
    ///
    /// The returned job is a snapshot; use [`get_job`](Self::get_job) to observe progress.
    /// Waits for a free slot when the queue is full.
    pub async fn submit(&self, name: &str, arguments: Value) -> Result<Job, TsqError> {
        let defined = self.runners().contains(name);
        if !defined {
            return Err(TsqError::UnknownTask(name.to_string()));
        }
        if self.sender.is_closed() {
            return Err(TsqError::Closed);
        }

        let job = Job::new(
            self.id_generator.generate_job_id(),
            name,
            arguments,
            self.clock.now(),
        );
        self.store.store(&job).await?;
        self.sender
            .send(job.id.clone())
            .await
            .map_err(|_| TsqError::Closed)?;
        debug!(job_id = %job.id, task = name, "job submitted");
        Ok(job)
    }

    pub async fn get_job(&self, id: &JobId) -> Result<Job, TsqError> {
        self.store
            .get_job(id)
            .await?
            .ok_or_else(|| TsqError::NotFound(id.clone()))
    }

    /// Every stored job, in the store's own order.
    pub async fn get_jobs(&self) -> Result<Vec<Job>, TsqError> {
        Ok(self.store.get_jobs().await?)
    }

    /// Poll until the job is finished or `timeout` elapses.
    pub async fn wait_for_job(&self, id: &JobId, timeout: Duration) -> Result<Job, TsqError> {
        let deadline = Instant::now() + timeout;
        loop {
            let job = self.get_job(id).await?;
            if job.has_finished() {
                return Ok(job);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(TsqError::WaitTimeout(id.clone()));
            }
            tokio::time::sleep(WAIT_POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    pub async fn counts(&self) -> Result<JobCounts, TsqError> {
        Ok(JobCounts::from_jobs(&self.get_jobs().await?))
    }

    /// Run one retention sweep now. Returns how many jobs were removed.
    pub async fn clean_now(&self) -> Result<usize, TsqError> {
        Ok(self.cleaner.sweep().await?)
    }

    pub async fn is_running(&self) -> bool {
        matches!(*self.lifecycle.lock().await, Lifecycle::Running(_))
    }

    /// Start the store, the worker and the cleaner.
    ///
    /// Fails with `AlreadyRunning` instead of spawning a second worker.
    pub async fn start(&self) -> Result<(), TsqError> {
        let mut lifecycle = self.lifecycle.lock().await;
        let jobs = match std::mem::replace(&mut *lifecycle, Lifecycle::Closed) {
            Lifecycle::Idle(jobs) => jobs,
            running @ Lifecycle::Running(_) => {
                *lifecycle = running;
                return Err(TsqError::AlreadyRunning);
            }
            Lifecycle::Closed => return Err(TsqError::Closed),
        };

        if let Err(e) = self.store.start().await {
            *lifecycle = Lifecycle::Idle(jobs);
            return Err(e.into());
        }

        let (signal_tx, signal_rx) = watch::channel(WorkerSignal::Run);
        let worker = WorkerLoop::new(
            Arc::clone(&self.store),
            Arc::clone(&self.registry),
            Arc::clone(&self.clock),
        );
        let worker = tokio::spawn(worker.run(jobs, signal_rx));
        let cleaner = self.cleaner.start();

        *lifecycle = Lifecycle::Running(Running {
            signal_tx,
            worker,
            cleaner,
        });
        info!(
            clean_interval_secs = self.cleaner.interval().as_secs(),
            "task queue started"
        );
        Ok(())
    }

    /// Stop the worker and the cleaner, then the store.
    ///
    /// A job already running is allowed to finish; queued ids stay queued for
    /// the next `start`. No-op when not running.
    pub async fn stop(&self) -> Result<(), TsqError> {
        self.shutdown(WorkerSignal::Stop).await
    }

    /// Like [`stop`](Self::stop), but every job already queued runs first.
    ///
    /// Use this before dropping a queue whose store outlives the process, so
    /// submitted jobs are not left `PENDING` with nothing to pick them up.
    pub async fn drain(&self) -> Result<(), TsqError> {
        self.shutdown(WorkerSignal::Drain).await
    }

    async fn shutdown(&self, signal: WorkerSignal) -> Result<(), TsqError> {
        let mut lifecycle = self.lifecycle.lock().await;
        let running = match std::mem::replace(&mut *lifecycle, Lifecycle::Closed) {
            Lifecycle::Running(running) => running,
            other => {
                *lifecycle = other;
                return Ok(());
            }
        };

        // ignore send error: the worker may already be gone
        let _ = running.signal_tx.send(signal);
        running.cleaner.stop().await;
        match running.worker.await {
            Ok(jobs) => *lifecycle = Lifecycle::Idle(jobs),
            Err(e) => error!(error = %e, "worker task ended abnormally"),
        }

        self.store.stop().await?;
        info!(?signal, "task queue stopped");
        Ok(())
    }
}
