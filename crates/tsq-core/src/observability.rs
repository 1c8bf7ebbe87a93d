use serde::{Deserialize, Serialize};

use crate::domain::{Job, JobStatus};

/// Per-status job counts over a store snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounts {
    pub pending: usize,
    pub running: usize,
    pub success: usize,
    pub failure: usize,
}

impl JobCounts {
    pub fn from_jobs(jobs: &[Job]) -> Self {
        jobs.iter().fold(Self::default(), |mut counts, job| {
            match job.status {
                JobStatus::Pending => counts.pending += 1,
                JobStatus::Running => counts.running += 1,
                JobStatus::Success => counts.success += 1,
                JobStatus::Failure => counts.failure += 1,
            }
            counts
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::JobId;
    use chrono::Utc;
    use serde_json::Value;

    fn job(status: JobStatus) -> Job {
        let mut job = Job::new(JobId::new("j"), "test", Value::Null, Utc::now());
        job.status = status;
        job
    }

    #[test]
    fn counts_each_status() {
        let jobs = vec![
            job(JobStatus::Pending),
            job(JobStatus::Pending),
            job(JobStatus::Running),
            job(JobStatus::Failure),
        ];
        let counts = JobCounts::from_jobs(&jobs);

        assert_eq!(
            counts,
            JobCounts {
                pending: 2,
                running: 1,
                success: 0,
                failure: 1,
            }
        );
    }
}
