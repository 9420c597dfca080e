use std::time::Duration;

use squall_core::prelude::RunState;
use tokio::time::Instant;

use crate::config::RunConfig;

/// Length of the rolling window that sizing mode counts failures over.
pub const SIZING_WINDOW: Duration = Duration::from_secs(60);

/// Minimum number of steps in the window before a verdict is given.
pub const SIZING_MIN_SAMPLES: u64 = 100;

/// Capacity detection for sizing mode.
///
/// Once the failures within the current window exceed `tolerance` percent of the successes, the
/// limit is recorded in the [RunState] and the run should stop.
#[derive(Debug, Clone, Copy)]
pub struct SizingBreaker {
    enabled: bool,
    tolerance: f64,
}

impl SizingBreaker {
    pub fn new(enabled: bool, tolerance: f64) -> Self {
        Self { enabled, tolerance }
    }

    pub fn from_config(config: &RunConfig) -> Self {
        Self::new(config.sizing, config.sizing_tolerance)
    }

    /// Check the window as of `now`. Returns true if the limit has been reached.
    pub fn evaluate(&self, state: &RunState, now: Instant) -> bool {
        if !self.enabled {
            return false;
        }

        if now.saturating_duration_since(state.window_start()) > SIZING_WINDOW {
            state.reset_window(now);
            return false;
        }

        let (ok, failed) = state.window_counts();
        if ok + failed < SIZING_MIN_SAMPLES {
            return false;
        }

        // No successes at all gives an infinite ratio, which saturates when recorded.
        let ratio = failed as f64 / ok as f64 * 100.0;
        if ratio <= self.tolerance {
            return false;
        }

        if state.mark_limit_reached((ratio * 100.0) as u64) {
            log::warn!(
                "Sizing tolerance reached: {ratio:.2}% failures against {:.2}% tolerated",
                self.tolerance
            );
        }

        true
    }
}
