use std::sync::{Arc, OnceLock};

use tokio_util::sync::CancellationToken;

/// Why a run was asked to stop. Only the first request is recorded.
#[derive(derive_more::Display, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    #[display("external stop request")]
    External,
    #[display("duration exceeded")]
    DurationExceeded,
    #[display("sizing tolerance reached")]
    SizingLimitReached,
    #[display("stop on first failure")]
    FirstFailure,
    #[display("setup fixture failed")]
    SetupFailed,
    #[display("session setup fixture failed")]
    SessionSetupFailed,
    #[display("all workers finished")]
    Complete,
}

/// The global stop flag for a run.
///
/// Once [ShutdownHandle::shutdown] has been called the flag stays set for the rest of the run.
/// Clones share the same flag.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    token: CancellationToken,
    reason: Arc<OnceLock<StopReason>>,
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownHandle {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            reason: Arc::new(OnceLock::new()),
        }
    }

    /// Set the stop flag. Returns true if this call was the one that stopped the run.
    pub fn shutdown(&self, reason: StopReason) -> bool {
        let first = self.reason.set(reason).is_ok();
        if first {
            log::info!("Stopping run: {reason}");
        }
        self.token.cancel();

        first
    }

    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The reason recorded by the first call to [ShutdownHandle::shutdown].
    pub fn reason(&self) -> Option<StopReason> {
        self.reason.get().copied()
    }

    pub fn new_listener(&self) -> DelegatedShutdownListener {
        DelegatedShutdownListener {
            token: self.token.clone(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct DelegatedShutdownListener {
    token: CancellationToken,
}

impl DelegatedShutdownListener {
    /// Point in time check if the stop flag has been set.
    pub fn should_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wait for the stop flag to be set. It is safe to race this with another future so that the
    /// stop flag can be used to cancel other work in progress.
    pub async fn wait_for_shutdown(&self) {
        self.token.cancelled().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_reason_wins() {
        let handle = ShutdownHandle::new();
        assert!(!handle.is_shutdown());
        assert_eq!(None, handle.reason());

        assert!(handle.shutdown(StopReason::FirstFailure));
        assert!(!handle.clone().shutdown(StopReason::External));

        assert!(handle.is_shutdown());
        assert_eq!(Some(StopReason::FirstFailure), handle.reason());
    }

    #[tokio::test]
    async fn listener_observes_shutdown() {
        let handle = ShutdownHandle::new();
        let listener = handle.new_listener();
        assert!(!listener.should_shutdown());

        let waiter = tokio::spawn(async move { listener.wait_for_shutdown().await });
        handle.shutdown(StopReason::External);

        waiter.await.unwrap();
        assert!(handle.new_listener().should_shutdown());
    }
}
