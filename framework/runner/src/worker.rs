use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use futures::FutureExt;
use squall_core::prelude::{RunState, StopReason};
use squall_instruments::WorkerId;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::breaker::SizingBreaker;
use crate::config::RunConfig;
use crate::context::RunContext;
use crate::scenario::{Scenario, UnknownScenarioError};
use crate::session::{Session, SessionGuard, SessionOptions};
use crate::step::{panic_message, StepExecutor, StepOutcome};
use crate::watchdog::DurationWatchdog;

/// The setup fixture returned something other than nothing or an object of session options.
#[derive(derive_more::Error, derive_more::Display, Debug)]
pub struct InvalidSetupReturnError {
    msg: String,
}

impl InvalidSetupReturnError {
    fn new(value: &serde_json::Value) -> Self {
        Self {
            msg: format!("The setup function needs to return an object or nothing, got: {value}"),
        }
    }
}

/// How a worker's run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// The run was stopped before this worker got to start.
    NotStarted,
    /// The loop ran until a stop condition was met.
    Completed { steps: u64 },
    /// The setup fixture failed, or no session could be opened.
    SetupFailed,
    SessionSetupFailed,
    /// A fixture panicked. The panic is reported and teardown still runs.
    Panicked,
}

/// Keeps the active worker count up to date, even if the worker unwinds.
struct ActiveWorker {
    state: Arc<RunState>,
}

impl ActiveWorker {
    fn start(state: Arc<RunState>) -> Self {
        state.worker_started();
        Self { state }
    }
}

impl Drop for ActiveWorker {
    fn drop(&mut self) {
        self.state.worker_finished();
    }
}

/// One virtual user. Opens its own session and runs steps against it until the run stops.
pub struct Worker<S: Session> {
    id: WorkerId,
    delay: Duration,
    count: u64,
    started: Instant,
    context: Arc<RunContext<S>>,
    executor: StepExecutor<S>,
    breaker: SizingBreaker,
}

impl<S: Session> Worker<S> {
    pub fn new(id: WorkerId, delay: Duration, context: Arc<RunContext<S>>) -> Self {
        Self {
            id,
            delay,
            count: 0,
            started: Instant::now(),
            executor: StepExecutor::new(id, context.clone()),
            breaker: SizingBreaker::from_config(context.config()),
            context,
        }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub async fn run(mut self) -> WorkerExit {
        if !self.delay.is_zero() {
            self.context.sleeper().sleep(self.delay).await;
        }
        if self.context.state().is_stopped() {
            log::debug!("Worker {} not started, the run is stopping", self.id);
            return WorkerExit::NotStarted;
        }

        log::debug!("Starting worker {}", self.id);
        let active = ActiveWorker::start(self.context.state().clone());

        let exit = match AssertUnwindSafe(self.run_inner()).catch_unwind().await {
            Ok(exit) => exit,
            Err(payload) => {
                self.context.diagnostics().report_error(&anyhow::anyhow!(
                    "Worker {} panicked: {}",
                    self.id,
                    panic_message(payload.as_ref())
                ));
                WorkerExit::Panicked
            }
        };

        self.done();
        drop(active);

        log::debug!("Stopped worker {}: {exit:?}", self.id);
        exit
    }

    async fn run_inner(&mut self) -> WorkerExit {
        let config = self.context.config().clone();
        let state = self.context.state().clone();

        let single = match &config.single_mode {
            Some(name) => match self.context.selector().get(name) {
                Some(scenario) => Some(scenario),
                None => {
                    self.context
                        .diagnostics()
                        .report_error(&anyhow::Error::new(UnknownScenarioError::new(name)));
                    state.request_stop(StopReason::SetupFailed);
                    return WorkerExit::SetupFailed;
                }
            },
            None => None,
        };

        self.started = Instant::now();
        self.count = 1;

        let options = match self.setup(&config).await {
            Ok(options) => options,
            Err(e) => {
                self.context.diagnostics().report_error(&e);
                state.request_stop(StopReason::SetupFailed);
                return WorkerExit::SetupFailed;
            }
        };

        let session = match S::open(options).await {
            Ok(session) => session,
            Err(e) => {
                self.context.diagnostics().report_error(
                    &e.context(format!("Failed to open a session for worker {}", self.id)),
                );
                state.request_stop(StopReason::SetupFailed);
                return WorkerExit::SetupFailed;
            }
        };

        let mut session = SessionGuard::new(session);
        {
            let session_context = session.context_mut();
            session_context.worker_id = self.id;
            session_context.config = Some(config.clone());
        }

        let exit = self.run_session(&mut session, single).await;

        session.release(self.context.diagnostics().as_ref()).await;

        exit
    }

    /// Run the setup fixture, if there is one, to get the options for this worker's session.
    async fn setup(&self, config: &Arc<RunConfig>) -> anyhow::Result<SessionOptions> {
        let Some(setup) = self.context.fixtures().setup.clone() else {
            return Ok(SessionOptions::new());
        };

        let value = setup(self.id, config.clone())
            .await
            .with_context(|| format!("Setup failed for worker {}", self.id))?;

        match value {
            None => Ok(SessionOptions::new()),
            Some(serde_json::Value::Object(options)) => Ok(options),
            Some(other) => Err(InvalidSetupReturnError::new(&other).into()),
        }
    }

    async fn run_session(&mut self, session: &mut S, single: Option<Arc<Scenario<S>>>) -> WorkerExit {
        let fixtures = self.context.fixtures().clone();

        if let Some(setup_session) = fixtures.setup_session {
            if let Err(e) = setup_session(self.id, session).await {
                self.context.diagnostics().report_error(
                    &e.context(format!("Session setup failed for worker {}", self.id)),
                );
                self.context
                    .state()
                    .request_stop(StopReason::SessionSetupFailed);
                return WorkerExit::SessionSetupFailed;
            }
        }

        let loop_done = CancellationToken::new();
        let watchdog = DurationWatchdog::new(
            self.id,
            self.started,
            self.context.config().duration,
            session.connection().clone(),
            self.context.state().clone(),
            self.context.sleeper().clone(),
            loop_done.clone(),
        );

        let main_loop = async {
            let steps = self.main_loop(session, single.as_ref()).await;
            loop_done.cancel();
            steps
        };
        let (steps, watchdog_exit) = tokio::join!(main_loop, watchdog.run());
        log::trace!("Watchdog for worker {} finished: {watchdog_exit:?}", self.id);

        if let Some(teardown_session) = fixtures.teardown_session {
            if let Err(e) = teardown_session(self.id, session).await {
                // The teardown carries on regardless.
                self.context.diagnostics().report_error(
                    &e.context(format!("Session teardown failed for worker {}", self.id)),
                );
            }
        }

        WorkerExit::Completed { steps }
    }

    async fn main_loop(&mut self, session: &mut S, single: Option<&Arc<Scenario<S>>>) -> u64 {
        let config = self.context.config().clone();
        let state = self.context.state().clone();
        let sleeper = self.context.sleeper().clone();

        let mut steps = 0;
        while self.may_run() {
            let step_start = Instant::now();
            session.context_mut().step = self.count;

            match self.executor.step(self.count, session, single).await {
                StepOutcome::Success => state.record_success(),
                StepOutcome::Failure => {
                    state.record_failure();
                    if config.exception {
                        state.request_stop(StopReason::FirstFailure);
                    }
                }
                StepOutcome::Abort => break,
            }
            steps += 1;

            if !state.is_stopped() && self.breaker.evaluate(&state, step_start) {
                state.request_stop(StopReason::SizingLimitReached);
                sleeper.cancel_all();
                break;
            }

            self.count += 1;

            // A zero delay still yields so that other workers get to run.
            sleeper.sleep(config.delay).await;
        }

        steps
    }

    fn may_run(&self) -> bool {
        let state = self.context.state();
        if state.is_stopped() {
            return false;
        }

        let config = self.context.config();
        if config.max_runs.is_some_and(|max_runs| self.count > max_runs) {
            return false;
        }

        if self.started.elapsed() > config.duration {
            return false;
        }

        !state.limit_reached()
    }

    /// Run the teardown fixture. Errors are reported and never stop the teardown.
    fn done(&self) {
        if let Some(teardown) = &self.context.fixtures().teardown {
            if let Err(e) = teardown(self.id) {
                self.context
                    .diagnostics()
                    .report_error(&e.context(format!("Teardown failed for worker {}", self.id)));
            }
        }
    }
}
