use std::fmt::{Display, Formatter};
use std::time::Duration;

use squall_core::prelude::{RunStateSnapshot, StopReason};

/// Final totals of a run, returned by [crate::run::run].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub name: String,
    pub run_id: String,
    pub ok: u64,
    pub failed: u64,
    /// Set when sizing mode found the failure tolerance exceeded.
    pub limit_reached: bool,
    /// Failure ratio at the moment the limit was reached, in hundredths of a percent.
    pub reached_ratio: u64,
    pub stop_reason: Option<StopReason>,
    /// Workers still running when the summary was taken. Zero once every worker has returned.
    pub active_workers: usize,
    pub elapsed: Duration,
}

impl RunSummary {
    pub(crate) fn new(
        name: &str,
        run_id: &str,
        snapshot: RunStateSnapshot,
        elapsed: Duration,
    ) -> Self {
        Self {
            name: name.to_string(),
            run_id: run_id.to_string(),
            ok: snapshot.ok_total,
            failed: snapshot.failed_total,
            limit_reached: snapshot.limit_reached,
            reached_ratio: snapshot.reached_ratio,
            stop_reason: snapshot.stop_reason,
            active_workers: snapshot.active_workers,
            elapsed,
        }
    }

    /// Total number of steps that ran to a verdict.
    pub fn total(&self) -> u64 {
        self.ok + self.failed
    }

    /// The recorded failure ratio as a percentage, if the sizing limit was reached.
    pub fn reached_percent(&self) -> Option<f64> {
        self.limit_reached
            .then(|| self.reached_ratio as f64 / 100.0)
    }
}

impl Display for RunSummary {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Run {} of [{}]: {} succeeded, {} failed in {:.1}s",
            self.run_id,
            self.name,
            self.ok,
            self.failed,
            self.elapsed.as_secs_f64()
        )?;

        if let Some(reason) = &self.stop_reason {
            write!(f, ", stopped because {reason}")?;
        }

        if let Some(percent) = self.reached_percent() {
            if self.reached_ratio == u64::MAX {
                write!(f, ", sizing limit reached with no successes")?;
            } else {
                write!(f, ", sizing limit reached at {percent:.2}% failures")?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary() -> RunSummary {
        RunSummary {
            name: "checkout".to_string(),
            run_id: "abc".to_string(),
            ok: 60,
            failed: 45,
            limit_reached: true,
            reached_ratio: 7500,
            stop_reason: Some(StopReason::SizingLimitReached),
            active_workers: 0,
            elapsed: Duration::from_millis(12_340),
        }
    }

    #[test]
    fn reached_percent_only_when_limit_reached() {
        let mut summary = summary();
        assert_eq!(Some(75.0), summary.reached_percent());
        assert_eq!(105, summary.total());

        summary.limit_reached = false;
        assert_eq!(None, summary.reached_percent());
    }

    #[test]
    fn display_includes_sizing_verdict() {
        let display = summary().to_string();

        assert!(display.starts_with("Run abc of [checkout]: 60 succeeded, 45 failed in 12.3s"));
        assert!(display.ends_with("sizing limit reached at 75.00% failures"));
    }
}
