//! Result counters
//!
//! `RunSummary` rides on every `*Finished` message; `ExecutionSummary` is
//! the per-assembly total the aggregator hands to the final reporter.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::AddAssign;
use std::time::Duration;

/// Counters for one entity and everything below it
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: u32,
    pub failed: u32,
    pub skipped: u32,
    pub not_run: u32,
    pub time: Duration,
}

impl RunSummary {
    pub fn passed(&self) -> u32 {
        self.total
            .saturating_sub(self.failed)
            .saturating_sub(self.skipped)
            .saturating_sub(self.not_run)
    }

    pub fn single_passed(time: Duration) -> Self {
        Self {
            total: 1,
            time,
            ..Self::default()
        }
    }

    pub fn single_failed(time: Duration) -> Self {
        Self {
            total: 1,
            failed: 1,
            time,
            ..Self::default()
        }
    }

    pub fn single_skipped() -> Self {
        Self {
            total: 1,
            skipped: 1,
            ..Self::default()
        }
    }

    pub fn single_not_run() -> Self {
        Self {
            total: 1,
            not_run: 1,
            ..Self::default()
        }
    }

    pub fn aggregate(&mut self, other: RunSummary) {
        self.total += other.total;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.not_run += other.not_run;
        self.time += other.time;
    }

    /// Reclassify skipped tests as failed (fail-skips policy)
    pub fn fail_skips(mut self) -> Self {
        self.failed += self.skipped;
        self.skipped = 0;
        self
    }
}

impl AddAssign for RunSummary {
    fn add_assign(&mut self, other: RunSummary) {
        self.aggregate(other);
    }
}

/// Final per-assembly counters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub total: u32,
    pub failed: u32,
    pub skipped: u32,
    pub not_run: u32,
    /// Error and cleanup-failure messages seen during the run
    pub errors: u32,
    pub time: Duration,
}

impl ExecutionSummary {
    pub fn from_run(summary: RunSummary, errors: u32) -> Self {
        Self {
            total: summary.total,
            failed: summary.failed,
            skipped: summary.skipped,
            not_run: summary.not_run,
            errors,
            time: summary.time,
        }
    }

    pub fn passed(&self) -> u32 {
        self.total
            .saturating_sub(self.failed)
            .saturating_sub(self.skipped)
            .saturating_sub(self.not_run)
    }

    pub fn pass_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.passed() as f64 / self.total as f64) * 100.0
        }
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.errors == 0
    }
}

impl fmt::Display for ExecutionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Total: {} | Pass: {} | Fail: {} | Skip: {} | Not run: {} | Errors: {} | Time: {:.3}s",
            self.total,
            self.passed(),
            self.failed,
            self.skipped,
            self.not_run,
            self.errors,
            self.time.as_secs_f64()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passed_is_derived() {
        let mut summary = RunSummary::single_passed(Duration::from_millis(5));
        summary += RunSummary::single_failed(Duration::from_millis(10));
        summary += RunSummary::single_skipped();
        summary += RunSummary::single_not_run();

        assert_eq!(summary.total, 4);
        assert_eq!(summary.passed(), 1);
        assert_eq!(summary.time, Duration::from_millis(15));
    }

    #[test]
    fn test_fail_skips_is_idempotent() {
        let summary = RunSummary {
            total: 5,
            failed: 1,
            skipped: 2,
            not_run: 0,
            time: Duration::ZERO,
        };

        let once = summary.fail_skips();
        assert_eq!(once.failed, 3);
        assert_eq!(once.skipped, 0);
        assert_eq!(once.fail_skips(), once);
    }

    #[test]
    fn test_execution_summary() {
        let run = RunSummary {
            total: 4,
            failed: 2,
            skipped: 0,
            not_run: 0,
            time: Duration::from_secs(1),
        };
        let summary = ExecutionSummary::from_run(run, 1);
        assert_eq!(summary.passed(), 2);
        assert_eq!(summary.pass_rate(), 50.0);
        assert!(!summary.is_success());
    }
}
