//! TimeBasedStrategy - updated からの経過時間で保持を判定
//!
//! デフォルトの CleanStrategy。`updated > now - max_age` の job を残します。

use std::time::Duration;

use chrono::TimeDelta;

use crate::domain::Job;
use crate::ports::{CleanStrategy, Clock, SystemClock};

#[derive(Debug, Clone)]
pub struct TimeBasedStrategy<C = SystemClock> {
    max_age: Duration,
    clock: C,
}

impl TimeBasedStrategy {
    pub fn new(max_age: Duration) -> Self {
        Self {
            max_age,
            clock: SystemClock,
        }
    }
}

impl<C: Clock> TimeBasedStrategy<C> {
    pub fn with_clock(max_age: Duration, clock: C) -> Self {
        Self { max_age, clock }
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }
}

impl<C: Clock> CleanStrategy for TimeBasedStrategy<C> {
    fn should_keep(&self, job: &Job) -> bool {
        // max_age が chrono の範囲を超える場合は「無期限」扱い
        let Ok(max_age) = TimeDelta::from_std(self.max_age) else {
            return true;
        };
        match self.clock.now().checked_sub_signed(max_age) {
            Some(limit) => job.updated > limit,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::JobId;
    use crate::ports::FixedClock;
    use chrono::{DateTime, TimeZone, Utc};
    use rstest::rstest;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    fn updated_minutes_ago(minutes: i64) -> Job {
        let at = now() - TimeDelta::minutes(minutes);
        Job::new(JobId::new("j"), "test", json!(null), at)
    }

    #[rstest]
    #[case::fresh(30, 3600, true)]
    #[case::stale(120, 3600, false)]
    #[case::exactly_at_limit(60, 3600, false)]
    #[case::zero_age_drops_everything_past(1, 0, false)]
    #[case::week(60 * 24 * 6, 7 * 24 * 3600, true)]
    fn keeps_recently_updated_jobs(
        #[case] age_minutes: i64,
        #[case] max_age_secs: u64,
        #[case] keep: bool,
    ) {
        let strategy =
            TimeBasedStrategy::with_clock(Duration::from_secs(max_age_secs), FixedClock::new(now()));
        assert_eq!(strategy.should_keep(&updated_minutes_ago(age_minutes)), keep);
    }

    #[test]
    fn out_of_range_max_age_keeps_everything() {
        let strategy = TimeBasedStrategy::with_clock(Duration::MAX, FixedClock::new(now()));
        assert!(strategy.should_keep(&updated_minutes_ago(60 * 24 * 365 * 100)));
    }
}
