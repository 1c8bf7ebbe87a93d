//! In-memory job store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::domain::{Job, JobId, JobStatus};
use crate::error::StoreError;
use crate::ports::{CleanStrategy, JobStore};

/// In-memory store: an insertion-ordered `Vec<Job>` behind one lock.
///
/// Design:
/// - Every operation, reads included, takes the same lock, so a reader never
///   observes a half-updated job.
/// - Lookups are linear scans; the collection is bounded by the cleaner.
/// - Handed-out jobs are clones (copy-on-read), re-fetch to observe progress.
#[derive(Default)]
pub struct MemoryStore {
    jobs: Mutex<Vec<Job>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(Vec::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.jobs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.lock().await.is_empty()
    }
}

fn find_mut<'a>(jobs: &'a mut [Job], id: &JobId) -> Result<&'a mut Job, StoreError> {
    jobs.iter_mut()
        .find(|job| &job.id == id)
        .ok_or_else(|| StoreError::Missing(id.clone()))
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn store(&self, job: &Job) -> Result<(), StoreError> {
        let mut jobs = self.jobs.lock().await;
        if jobs.iter().any(|existing| existing.id == job.id) {
            return Err(StoreError::Duplicate(job.id.clone()));
        }
        jobs.push(job.clone());
        Ok(())
    }

    async fn get_job(&self, id: &JobId) -> Result<Option<Job>, StoreError> {
        let jobs = self.jobs.lock().await;
        Ok(jobs.iter().find(|job| &job.id == id).cloned())
    }

    async fn get_jobs(&self) -> Result<Vec<Job>, StoreError> {
        Ok(self.jobs.lock().await.clone())
    }

    async fn set_status(
        &self,
        id: &JobId,
        status: JobStatus,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut jobs = self.jobs.lock().await;
        let job = find_mut(&mut jobs, id)?;
        job.transition(status, at)
            .map_err(|source| StoreError::IllegalTransition {
                id: id.clone(),
                source,
            })
    }

    async fn set_result(&self, id: &JobId, result: &Value) -> Result<(), StoreError> {
        let mut jobs = self.jobs.lock().await;
        let job = find_mut(&mut jobs, id)?;
        job.result = Some(result.clone());
        Ok(())
    }

    async fn clean(&self, strategy: &dyn CleanStrategy) -> Result<usize, StoreError> {
        let mut jobs = self.jobs.lock().await;
        let before = jobs.len();
        jobs.retain(|job| !job.has_finished() || strategy.should_keep(job));
        Ok(before - jobs.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::TimeBasedStrategy;
    use crate::ports::FixedClock;
    use chrono::{Duration, TimeZone};
    use serde_json::json;
    use std::time::Duration as StdDuration;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn job(id: &str, at: DateTime<Utc>) -> Job {
        Job::new(JobId::new(id), "test", json!({"id": id}), at)
    }

    async fn finish(store: &MemoryStore, id: &str, status: JobStatus, at: DateTime<Utc>) {
        let id = JobId::new(id);
        store.set_status(&id, JobStatus::Running, at).await.unwrap();
        store.set_status(&id, status, at).await.unwrap();
    }

    #[tokio::test]
    async fn store_and_get_roundtrip() {
        let store = MemoryStore::new();
        let j = job("a", t0());
        store.store(&j).await.unwrap();

        assert_eq!(store.get_job(&JobId::new("a")).await.unwrap(), Some(j));
        assert_eq!(store.get_job(&JobId::new("zzz")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn duplicate_ids_are_rejected() {
        let store = MemoryStore::new();
        store.store(&job("a", t0())).await.unwrap();

        let err = store.store(&job("a", t0())).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(id) if id.as_str() == "a"));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn get_jobs_keeps_insertion_order() {
        let store = MemoryStore::new();
        store.store(&job("b", t0())).await.unwrap();
        store.store(&job("a", t0() - Duration::hours(1))).await.unwrap();
        store.store(&job("c", t0() + Duration::hours(1))).await.unwrap();

        let ids: Vec<String> = store
            .get_jobs()
            .await
            .unwrap()
            .into_iter()
            .map(|j| j.id.into_string())
            .collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[tokio::test]
    async fn set_status_enforces_lifecycle() {
        let store = MemoryStore::new();
        store.store(&job("a", t0())).await.unwrap();
        let id = JobId::new("a");

        let err = store
            .set_status(&id, JobStatus::Success, t0())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::IllegalTransition { .. }));

        let later = t0() + Duration::seconds(3);
        store.set_status(&id, JobStatus::Running, later).await.unwrap();
        let stored = store.get_job(&id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Running);
        assert_eq!(stored.updated, later);
        assert_eq!(stored.created, t0());
    }

    #[tokio::test]
    async fn updates_on_missing_job_fail() {
        let store = MemoryStore::new();
        let id = JobId::new("ghost");

        assert!(matches!(
            store.set_status(&id, JobStatus::Running, t0()).await,
            Err(StoreError::Missing(_))
        ));
        assert!(matches!(
            store.set_result(&id, &json!("x")).await,
            Err(StoreError::Missing(_))
        ));
    }

    #[tokio::test]
    async fn clean_with_zero_max_age_keeps_only_unfinished_jobs() {
        let store = MemoryStore::new();
        for id in ["done", "failed", "running", "pending"] {
            store.store(&job(id, t0())).await.unwrap();
        }
        finish(&store, "done", JobStatus::Success, t0()).await;
        finish(&store, "failed", JobStatus::Failure, t0()).await;
        store
            .set_status(&JobId::new("running"), JobStatus::Running, t0())
            .await
            .unwrap();

        let clock = FixedClock::new(t0() + Duration::seconds(1));
        let strategy = TimeBasedStrategy::with_clock(StdDuration::ZERO, clock);
        let removed = store.clean(&strategy).await.unwrap();

        assert_eq!(removed, 2);
        let left: Vec<String> = store
            .get_jobs()
            .await
            .unwrap()
            .into_iter()
            .map(|j| j.id.into_string())
            .collect();
        assert_eq!(left, vec!["running", "pending"]);
    }

    #[tokio::test]
    async fn clean_with_one_hour_max_age() {
        let now = t0();
        let store = MemoryStore::new();
        store.store(&job("fresh", now - Duration::hours(3))).await.unwrap();
        store.store(&job("stale", now - Duration::hours(3))).await.unwrap();
        finish(&store, "fresh", JobStatus::Success, now - Duration::minutes(30)).await;
        finish(&store, "stale", JobStatus::Success, now - Duration::hours(2)).await;

        let strategy =
            TimeBasedStrategy::with_clock(StdDuration::from_secs(3600), FixedClock::new(now));
        assert_eq!(store.clean(&strategy).await.unwrap(), 1);

        assert!(store.get_job(&JobId::new("fresh")).await.unwrap().is_some());
        assert!(store.get_job(&JobId::new("stale")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn strategy_is_not_consulted_for_unfinished_jobs() {
        let store = MemoryStore::new();
        store.store(&job("old-pending", t0() - Duration::days(30))).await.unwrap();

        let removed = store.clean(&|_: &Job| false).await.unwrap();

        assert_eq!(removed, 0);
        assert_eq!(store.len().await, 1);
    }
}
