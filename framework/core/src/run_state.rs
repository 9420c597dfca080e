use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::shutdown::{ShutdownHandle, StopReason};

/// Counters and flags shared by every worker of a run.
///
/// Each field is updated on its own. Readers may see a value that is one step stale, which is
/// fine because every worker re-checks at each iteration.
#[derive(Debug)]
pub struct RunState {
    active_workers: AtomicUsize,
    ok_total: AtomicU64,
    failed_total: AtomicU64,
    minute_ok: AtomicU64,
    minute_failed: AtomicU64,
    limit_reached: AtomicBool,
    reached_ratio: AtomicU64,
    window_start: Mutex<Instant>,
    shutdown_handle: ShutdownHandle,
}

impl Default for RunState {
    fn default() -> Self {
        Self::new(ShutdownHandle::new())
    }
}

impl RunState {
    pub fn new(shutdown_handle: ShutdownHandle) -> Self {
        Self {
            active_workers: AtomicUsize::new(0),
            ok_total: AtomicU64::new(0),
            failed_total: AtomicU64::new(0),
            minute_ok: AtomicU64::new(0),
            minute_failed: AtomicU64::new(0),
            limit_reached: AtomicBool::new(false),
            reached_ratio: AtomicU64::new(0),
            window_start: Mutex::new(Instant::now()),
            shutdown_handle,
        }
    }

    pub fn shutdown_handle(&self) -> &ShutdownHandle {
        &self.shutdown_handle
    }

    pub fn request_stop(&self, reason: StopReason) -> bool {
        self.shutdown_handle.shutdown(reason)
    }

    pub fn is_stopped(&self) -> bool {
        self.shutdown_handle.is_shutdown()
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.shutdown_handle.reason()
    }

    pub fn worker_started(&self) {
        self.active_workers.fetch_add(1, Ordering::SeqCst);
    }

    pub fn worker_finished(&self) {
        // Never drops below zero, even if finish is reported without a matching start.
        let _ = self
            .active_workers
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    pub fn active_workers(&self) -> usize {
        self.active_workers.load(Ordering::SeqCst)
    }

    pub fn record_success(&self) {
        self.ok_total.fetch_add(1, Ordering::Relaxed);
        self.minute_ok.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failed_total.fetch_add(1, Ordering::Relaxed);
        self.minute_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn ok_total(&self) -> u64 {
        self.ok_total.load(Ordering::Relaxed)
    }

    pub fn failed_total(&self) -> u64 {
        self.failed_total.load(Ordering::Relaxed)
    }

    /// Successes and failures recorded since the rolling window last restarted.
    pub fn window_counts(&self) -> (u64, u64) {
        (
            self.minute_ok.load(Ordering::Relaxed),
            self.minute_failed.load(Ordering::Relaxed),
        )
    }

    pub fn window_start(&self) -> Instant {
        *self.window_start.lock()
    }

    /// Restart the rolling window at `now`, clearing its counters.
    pub fn reset_window(&self, now: Instant) {
        *self.window_start.lock() = now;
        self.minute_ok.store(0, Ordering::Relaxed);
        self.minute_failed.store(0, Ordering::Relaxed);
    }

    /// Record that the failure tolerance was exceeded. Only the first call takes effect, the
    /// flag is never cleared. `ratio` is the failure percentage times 100.
    pub fn mark_limit_reached(&self, ratio: u64) -> bool {
        let first = self
            .limit_reached
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if first {
            self.reached_ratio.store(ratio, Ordering::SeqCst);
        }

        first
    }

    pub fn limit_reached(&self) -> bool {
        self.limit_reached.load(Ordering::SeqCst)
    }

    pub fn reached_ratio(&self) -> u64 {
        self.reached_ratio.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> RunStateSnapshot {
        let (minute_ok, minute_failed) = self.window_counts();
        RunStateSnapshot {
            active_workers: self.active_workers(),
            ok_total: self.ok_total(),
            failed_total: self.failed_total(),
            minute_ok,
            minute_failed,
            limit_reached: self.limit_reached(),
            reached_ratio: self.reached_ratio(),
            stop_requested: self.is_stopped(),
            stop_reason: self.stop_reason(),
        }
    }

    #[doc(hidden)]
    pub fn set_window_counts(&self, ok: u64, failed: u64) {
        self.minute_ok.store(ok, Ordering::Relaxed);
        self.minute_failed.store(failed, Ordering::Relaxed);
    }
}

/// A point in time copy of [RunState].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunStateSnapshot {
    pub active_workers: usize,
    pub ok_total: u64,
    pub failed_total: u64,
    pub minute_ok: u64,
    pub minute_failed: u64,
    pub limit_reached: bool,
    pub reached_ratio: u64,
    pub stop_requested: bool,
    pub stop_reason: Option<StopReason>,
}
