use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::shutdown::{DelegatedShutdownListener, ShutdownHandle};

/// How a cancellable sleep ended. None of these are errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepOutcome {
    Elapsed,
    Cancelled,
    Shutdown,
}

/// Identifies one pending sleep so that it can be cancelled on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SleepId(u64);

/// Interruptible delays shared by every worker and watchdog of a run.
///
/// A pending sleep returns early when the run's stop flag is set, when it is cancelled by id or
/// when [CancellableSleep::cancel_all] is called while it is waiting.
#[derive(Debug)]
pub struct CancellableSleep {
    shutdown_listener: DelegatedShutdownListener,
    pending: Mutex<HashMap<SleepId, CancellationToken>>,
    next_id: AtomicU64,
}

impl CancellableSleep {
    pub fn new(shutdown_handle: &ShutdownHandle) -> Self {
        Self {
            shutdown_listener: shutdown_handle.new_listener(),
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Sleep for up to `duration`.
    ///
    /// A zero duration still yields to the scheduler once.
    pub async fn sleep(&self, duration: Duration) -> SleepOutcome {
        let id = self.register();
        self.wait(id, duration).await
    }

    /// Register a sleep without starting to wait on it yet. The returned id can be passed to
    /// [CancellableSleep::cancel] from anywhere, and the sleep is awaited with
    /// [CancellableSleep::wait].
    pub fn register(&self) -> SleepId {
        let id = SleepId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.pending.lock().insert(id, CancellationToken::new());
        id
    }

    pub async fn wait(&self, id: SleepId, duration: Duration) -> SleepOutcome {
        let Some(token) = self.pending.lock().get(&id).cloned() else {
            // Cancelled between registering and waiting.
            return SleepOutcome::Cancelled;
        };
        let _registration = Registration { sleep: self, id };

        if self.shutdown_listener.should_shutdown() {
            return SleepOutcome::Shutdown;
        }

        if duration.is_zero() {
            tokio::task::yield_now().await;
            return if token.is_cancelled() {
                SleepOutcome::Cancelled
            } else {
                SleepOutcome::Elapsed
            };
        }

        tokio::select! {
            _ = tokio::time::sleep(duration) => SleepOutcome::Elapsed,
            _ = token.cancelled() => SleepOutcome::Cancelled,
            _ = self.shutdown_listener.wait_for_shutdown() => SleepOutcome::Shutdown,
        }
    }

    /// Wake one pending sleep. Returns false if it had already finished.
    pub fn cancel(&self, id: SleepId) -> bool {
        match self.pending.lock().remove(&id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Wake every sleep that is pending right now. Sleeps started afterwards are unaffected.
    ///
    /// Returns the number of sleeps that were woken, which is zero when nothing was pending.
    pub fn cancel_all(&self) -> usize {
        let drained = std::mem::take(&mut *self.pending.lock());
        for token in drained.values() {
            token.cancel();
        }

        log::trace!("Cancelled {} pending sleeps", drained.len());
        drained.len()
    }

    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }
}

/// Removes a sleep from the pending set however its future ends, including being dropped.
struct Registration<'a> {
    sleep: &'a CancellableSleep,
    id: SleepId,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.sleep.pending.lock().remove(&self.id);
    }
}
