mod run_state;
mod shutdown;
mod sleep;

pub mod prelude {
    pub use crate::run_state::{RunState, RunStateSnapshot};
    pub use crate::shutdown::{DelegatedShutdownListener, ShutdownHandle, StopReason};
    pub use crate::sleep::{CancellableSleep, SleepId, SleepOutcome};
}
