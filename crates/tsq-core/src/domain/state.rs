//! Job status state machine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Job status.
///
/// State transitions:
/// - Pending -> Running -> Success
/// - Pending -> Running -> Failure
///
/// There is no retry edge and no way back to Pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Submitted and waiting in the queue.
    Pending,

    /// Currently being executed by the worker.
    Running,

    /// Runner returned a value.
    Success,

    /// Runner returned an error (or panicked).
    Failure,
}

impl JobStatus {
    /// Is this a terminal state (no further transitions)?
    pub fn is_finished(self) -> bool {
        matches!(self, JobStatus::Success | JobStatus::Failure)
    }

    /// Is `next` a legal successor of `self`?
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Running)
                | (JobStatus::Running, JobStatus::Success)
                | (JobStatus::Running, JobStatus::Failure)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Running => "RUNNING",
            JobStatus::Success => "SUCCESS",
            JobStatus::Failure => "FAILURE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PENDING" => Some(JobStatus::Pending),
            "RUNNING" => Some(JobStatus::Running),
            "SUCCESS" => Some(JobStatus::Success),
            "FAILURE" => Some(JobStatus::Failure),
            _ => None,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(JobStatus::Pending, JobStatus::Running, true)]
    #[case(JobStatus::Running, JobStatus::Success, true)]
    #[case(JobStatus::Running, JobStatus::Failure, true)]
    #[case(JobStatus::Pending, JobStatus::Success, false)]
    #[case(JobStatus::Pending, JobStatus::Failure, false)]
    #[case(JobStatus::Running, JobStatus::Pending, false)]
    #[case(JobStatus::Running, JobStatus::Running, false)]
    #[case(JobStatus::Success, JobStatus::Failure, false)]
    #[case(JobStatus::Failure, JobStatus::Running, false)]
    #[case(JobStatus::Success, JobStatus::Pending, false)]
    fn transitions(#[case] from: JobStatus, #[case] to: JobStatus, #[case] allowed: bool) {
        assert_eq!(from.can_transition_to(to), allowed);
    }

    #[test]
    fn only_success_and_failure_are_finished() {
        assert!(!JobStatus::Pending.is_finished());
        assert!(!JobStatus::Running.is_finished());
        assert!(JobStatus::Success.is_finished());
        assert!(JobStatus::Failure.is_finished());
    }

    #[rstest]
    #[case(JobStatus::Pending)]
    #[case(JobStatus::Running)]
    #[case(JobStatus::Success)]
    #[case(JobStatus::Failure)]
    fn text_form_matches_serde(#[case] status: JobStatus) {
        let json = serde_json::to_string(&status).unwrap();
        assert_eq!(json, format!("\"{}\"", status.as_str()));
        assert_eq!(JobStatus::parse(status.as_str()), Some(status));
    }

    #[test]
    fn parse_rejects_unknown_text() {
        assert_eq!(JobStatus::parse("DONE"), None);
        assert_eq!(JobStatus::parse("pending"), None);
    }
}
