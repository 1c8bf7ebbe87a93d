//! Cleaner - 完了済み job の定期削除
//!
//! # フロー
//! 1. interval ごとに JobStore::clean(strategy) を呼ぶ（最初の sweep は start から 1 interval 後）
//! 2. 削除件数をログに残す
//!
//! worker とは独立に止められます（CleanerHandle::stop）。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::ports::{CleanStrategy, JobStore};

#[derive(Clone)]
pub struct Cleaner {
    store: Arc<dyn JobStore>,
    strategy: Arc<dyn CleanStrategy>,
    interval: Duration,
}

/// Handle to a running sweep loop.
/// - dropping it also stops the loop (the shutdown channel closes)
/// - `stop()` waits for a sweep in progress to finish
pub struct CleanerHandle {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl CleanerHandle {
    pub async fn stop(self) {
        // ignore send error: the loop may already be gone
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.join.await {
            warn!(error = %e, "cleaner task ended abnormally");
        }
    }
}

impl Cleaner {
    pub fn new(
        store: Arc<dyn JobStore>,
        strategy: Arc<dyn CleanStrategy>,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            strategy,
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// One retention pass. Returns how many jobs were removed.
    pub async fn sweep(&self) -> Result<usize, StoreError> {
        let removed = self.store.clean(self.strategy.as_ref()).await?;
        if removed > 0 {
            info!(removed, "cleaned finished jobs");
        } else {
            debug!("clean sweep removed nothing");
        }
        Ok(removed)
    }

    pub fn start(&self) -> CleanerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let cleaner = self.clone();
        let join = tokio::spawn(async move { cleaner.run(shutdown_rx).await });
        CleanerHandle { shutdown_tx, join }
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        // interval(0) は panic するので 1ms に切り上げる
        let period = self.interval.max(Duration::from_millis(1));
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep().await {
                        warn!(error = %e, "clean sweep failed");
                    }
                }
            }
        }
        debug!("cleaner stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Job, JobId, JobStatus};
    use crate::impls::MemoryStore;
    use chrono::Utc;
    use serde_json::Value;

    async fn finished_job(store: &MemoryStore, id: &str) {
        let id = JobId::new(id);
        store
            .store(&Job::new(id.clone(), "test", Value::Null, Utc::now()))
            .await
            .unwrap();
        store.set_status(&id, JobStatus::Running, Utc::now()).await.unwrap();
        store.set_status(&id, JobStatus::Success, Utc::now()).await.unwrap();
    }

    fn drop_all_finished(store: Arc<MemoryStore>, interval: Duration) -> Cleaner {
        Cleaner::new(store, Arc::new(|_: &Job| false), interval)
    }

    #[tokio::test]
    async fn sweep_reports_removed_count() {
        let store = Arc::new(MemoryStore::new());
        finished_job(&store, "a").await;
        finished_job(&store, "b").await;

        let cleaner = drop_all_finished(store.clone(), Duration::from_secs(60));

        assert_eq!(cleaner.sweep().await.unwrap(), 2);
        assert_eq!(cleaner.sweep().await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn first_sweep_happens_one_interval_after_start() {
        let store = Arc::new(MemoryStore::new());
        finished_job(&store, "a").await;

        let handle = drop_all_finished(store.clone(), Duration::from_secs(3600)).start();

        time::sleep(Duration::from_secs(1800)).await;
        assert_eq!(store.len().await, 1);

        time::sleep(Duration::from_secs(1860)).await;
        assert!(store.is_empty().await);

        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_cleaner_no_longer_sweeps() {
        let store = Arc::new(MemoryStore::new());
        let handle = drop_all_finished(store.clone(), Duration::from_secs(60)).start();
        handle.stop().await;

        finished_job(&store, "a").await;
        time::sleep(Duration::from_secs(600)).await;

        assert_eq!(store.len().await, 1);
    }
}
