use std::sync::Arc;

use squall_core::prelude::{RunState, StopReason};
use tokio::signal;
use tokio::task::JoinHandle;

/// Stop the run when Ctrl-C is received. The returned task should be aborted once the run is over.
pub(crate) fn start_shutdown_listener(state: Arc<RunState>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let stop_listener = state.shutdown_handle().new_listener();
        tokio::select! {
            result = signal::ctrl_c() => {
                if let Err(e) = result {
                    log::error!("Failed to listen for Ctrl-C: {e:?}");
                    return;
                }
                if state.request_stop(StopReason::External) {
                    println!("Received shutdown signal, shutting down...");
                }
            }
            _ = stop_listener.wait_for_shutdown() => {
                log::trace!("Run stopped, no longer listening for Ctrl-C");
            }
        }
    })
}
