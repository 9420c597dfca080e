mod breaker;
mod cli;
mod config;
mod context;
mod definition;
mod fixture;
mod init;
mod progress;
mod run;
mod scenario;
mod session;
mod shutdown;
mod step;
mod summary;
mod types;
mod watchdog;
mod worker;

pub mod prelude {
    pub use crate::breaker::{SizingBreaker, SIZING_MIN_SAMPLES, SIZING_WINDOW};
    pub use crate::cli::SquallCli;
    pub use crate::config::{RunConfig, DEFAULT_DURATION_S};
    pub use crate::context::RunContext;
    pub use crate::definition::{ScenarioDefinition, ScenarioDefinitionBuilder};
    pub use crate::fixture::{Fixtures, HookResult, SetupResult};
    pub use crate::init::init;
    pub use crate::run::run;
    pub use crate::scenario::{
        Scenario, ScenarioArgs, ScenarioRegistry, ScenarioResult, ScenarioSelector,
        UnknownScenarioError,
    };
    pub use crate::session::{
        BasicSession, ConnectionClosedError, ConnectionHandle, Session, SessionContext,
        SessionOptions,
    };
    pub use crate::step::{ScenarioPanicError, StepOutcome};
    pub use crate::summary::RunSummary;
    pub use crate::types::SquallResult;
    pub use crate::worker::{InvalidSetupReturnError, Worker, WorkerExit};

    pub use squall_core::prelude::{RunState, StopReason};
    pub use squall_instruments::prelude::*;
}
