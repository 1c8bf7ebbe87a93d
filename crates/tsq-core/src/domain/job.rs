//! Job record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::JobId;
use super::state::JobStatus;

/// A status change the lifecycle does not allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal status transition {from} -> {to}")]
pub struct IllegalTransition {
    pub from: JobStatus,
    pub to: JobStatus,
}

/// One submitted task invocation and its lifecycle.
///
/// Design:
/// - The JobStore owns the collection; a `Job` handed out by the queue is a snapshot.
/// - `arguments` / `result` are opaque JSON whose shape belongs to the task.
/// - `created` never changes; `updated` follows the latest status transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    #[serde(rename = "uuid")]
    pub id: JobId,
    pub name: String,
    pub status: JobStatus,
    pub arguments: serde_json::Value,
    pub result: Option<serde_json::Value>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl Job {
    /// Create a new pending job. Both timestamps are `now`.
    pub fn new(
        id: JobId,
        name: impl Into<String>,
        arguments: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            status: JobStatus::Pending,
            arguments,
            result: None,
            created: now,
            updated: now,
        }
    }

    pub fn has_finished(&self) -> bool {
        self.status.is_finished()
    }

    /// Move to `next`, stamping `updated`.
    pub fn transition(&mut self, next: JobStatus, at: DateTime<Utc>) -> Result<(), IllegalTransition> {
        if !self.status.can_transition_to(next) {
            return Err(IllegalTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated = at;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn new_job_is_pending_with_equal_timestamps() {
        let job = Job::new(JobId::new("a"), "test", json!({"n": 1}), t0());
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.created, t0());
        assert_eq!(job.updated, t0());
        assert!(job.result.is_none());
        assert!(!job.has_finished());
    }

    #[test]
    fn transition_stamps_updated_only() {
        let mut job = Job::new(JobId::new("a"), "test", json!(null), t0());
        let later = t0() + Duration::seconds(5);

        job.transition(JobStatus::Running, later).unwrap();

        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.updated, later);
        assert_eq!(job.created, t0());
    }

    #[test]
    fn finished_job_refuses_further_transitions() {
        let mut job = Job::new(JobId::new("a"), "test", json!(null), t0());
        job.transition(JobStatus::Running, t0()).unwrap();
        job.transition(JobStatus::Success, t0()).unwrap();
        assert!(job.has_finished());

        let err = job.transition(JobStatus::Failure, t0()).unwrap_err();
        assert_eq!(err.from, JobStatus::Success);
        assert_eq!(err.to, JobStatus::Failure);
        assert_eq!(job.status, JobStatus::Success);
    }

    #[test]
    fn cannot_skip_running() {
        let mut job = Job::new(JobId::new("a"), "test", json!(null), t0());
        assert!(job.transition(JobStatus::Success, t0()).is_err());
        assert_eq!(job.status, JobStatus::Pending);
    }

    #[test]
    fn serializes_with_uuid_field() {
        let job = Job::new(JobId::new("abc"), "test", json!({"k": "v"}), t0());
        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["uuid"], "abc");
        assert_eq!(value["status"], "PENDING");
        assert_eq!(value["result"], serde_json::Value::Null);
    }
}
