use std::sync::Arc;
use std::time::Duration;

use squall_core::prelude::{CancellableSleep, RunState, StopReason};
use squall_instruments::WorkerId;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::session::ConnectionHandle;

/// How often the watchdog checks the worker's elapsed time.
pub const WATCHDOG_INTERVAL: Duration = Duration::from_millis(500);

/// How the watchdog finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogExit {
    /// The worker's loop ended first.
    LoopEnded,
    /// The run was stopped by something else and the loop ended within the duration.
    Stopped,
    /// The duration was exceeded, so the connection was closed and the run stopped.
    Fired,
}

/// Enforces the duration limit on a worker whose step may be blocked on I/O.
///
/// Runs beside the worker's loop. If the loop is still going once `duration` has passed since
/// `started`, the watchdog closes the worker's connection, which fails the step in flight, and
/// stops the run.
///
/// Once the run is stopped by something else the watchdog stops polling. A step in flight is left
/// to finish and the connection is only closed if the loop is still going when the duration runs
/// out.
pub(crate) struct DurationWatchdog {
    worker_id: WorkerId,
    started: Instant,
    duration: Duration,
    connection: ConnectionHandle,
    state: Arc<RunState>,
    sleeper: Arc<CancellableSleep>,
    loop_done: CancellationToken,
}

impl DurationWatchdog {
    pub(crate) fn new(
        worker_id: WorkerId,
        started: Instant,
        duration: Duration,
        connection: ConnectionHandle,
        state: Arc<RunState>,
        sleeper: Arc<CancellableSleep>,
        loop_done: CancellationToken,
    ) -> Self {
        Self {
            worker_id,
            started,
            duration,
            connection,
            state,
            sleeper,
            loop_done,
        }
    }

    pub(crate) async fn run(self) -> WatchdogExit {
        loop {
            if self.loop_done.is_cancelled() {
                return WatchdogExit::LoopEnded;
            }
            if self.started.elapsed() > self.duration {
                return self.fire();
            }
            if self.state.is_stopped() || self.state.limit_reached() {
                return self.wait_for_loop().await;
            }

            tokio::select! {
                _ = self.sleeper.sleep(WATCHDOG_INTERVAL) => {}
                _ = self.loop_done.cancelled() => {}
            }
        }
    }

    fn fire(&self) -> WatchdogExit {
        log::warn!(
            "Worker {} exceeded the run duration, closing its session",
            self.worker_id
        );
        self.connection.close();
        self.state.request_stop(StopReason::DurationExceeded);
        WatchdogExit::Fired
    }

    async fn wait_for_loop(&self) -> WatchdogExit {
        // Not the shared sleeper, it returns at once after a stop.
        tokio::select! {
            _ = self.loop_done.cancelled() => WatchdogExit::Stopped,
            _ = tokio::time::sleep_until(self.started + self.duration) => {
                if self.loop_done.is_cancelled() {
                    WatchdogExit::Stopped
                } else {
                    self.fire()
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use squall_core::prelude::ShutdownHandle;

    use super::*;

    fn watchdog(
        duration: Duration,
        state: &Arc<RunState>,
    ) -> (DurationWatchdog, ConnectionHandle, CancellationToken) {
        let connection = ConnectionHandle::new();
        let loop_done = CancellationToken::new();
        let sleeper = Arc::new(CancellableSleep::new(state.shutdown_handle()));
        (
            DurationWatchdog::new(
                0,
                Instant::now(),
                duration,
                connection.clone(),
                state.clone(),
                sleeper,
                loop_done.clone(),
            ),
            connection,
            loop_done,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn fires_on_blocked_step() {
        let state = Arc::new(RunState::new(ShutdownHandle::new()));
        let (watchdog, connection, _loop_done) = watchdog(Duration::from_secs(2), &state);

        let blocked_step = connection.guard(std::future::pending::<anyhow::Result<()>>());
        let (step, exit) = tokio::join!(blocked_step, watchdog.run());

        assert_eq!(WatchdogExit::Fired, exit);
        assert!(step.is_err());
        assert!(connection.is_closed());
        assert_eq!(Some(StopReason::DurationExceeded), state.stop_reason());
    }

    #[tokio::test(start_paused = true)]
    async fn exits_when_loop_ends() {
        let state = Arc::new(RunState::new(ShutdownHandle::new()));
        let (watchdog, connection, loop_done) = watchdog(Duration::from_secs(60), &state);

        let task = tokio::spawn(watchdog.run());
        tokio::time::sleep(Duration::from_secs(1)).await;
        loop_done.cancel();

        assert_eq!(WatchdogExit::LoopEnded, task.await.unwrap());
        assert!(!connection.is_closed());
        assert!(!state.is_stopped());
    }

    #[tokio::test(start_paused = true)]
    async fn exits_when_run_stopped() {
        let state = Arc::new(RunState::new(ShutdownHandle::new()));
        let (watchdog, connection, loop_done) = watchdog(Duration::from_secs(60), &state);

        let task = tokio::spawn(watchdog.run());
        state.request_stop(StopReason::External);
        tokio::time::sleep(WATCHDOG_INTERVAL / 2).await;
        loop_done.cancel();

        assert_eq!(WatchdogExit::Stopped, task.await.unwrap());
        assert!(!connection.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn step_in_flight_finishes_after_stop() {
        let state = Arc::new(RunState::new(ShutdownHandle::new()));
        let (watchdog, connection, loop_done) = watchdog(Duration::from_secs(60), &state);
        state.request_stop(StopReason::External);

        let step = async {
            let result = connection
                .guard(async {
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    Ok(())
                })
                .await;
            loop_done.cancel();
            result
        };
        let (step, exit) = tokio::join!(step, watchdog.run());

        assert_eq!(WatchdogExit::Stopped, exit);
        assert!(step.is_ok());
        assert!(!connection.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn closes_blocked_step_at_duration_after_stop() {
        let state = Arc::new(RunState::new(ShutdownHandle::new()));
        let (watchdog, connection, _loop_done) = watchdog(Duration::from_secs(2), &state);
        state.request_stop(StopReason::FirstFailure);

        let started = Instant::now();
        let blocked_step = connection.guard(std::future::pending::<anyhow::Result<()>>());
        let (step, exit) = tokio::join!(blocked_step, watchdog.run());

        assert_eq!(WatchdogExit::Fired, exit);
        assert!(step.is_err());
        assert!(started.elapsed() >= Duration::from_secs(2));
        assert!(started.elapsed() < Duration::from_secs(3));
        // The first reason is kept
        assert_eq!(Some(StopReason::FirstFailure), state.stop_reason());
    }
}
