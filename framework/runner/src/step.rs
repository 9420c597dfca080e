use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use squall_instruments::{ScenarioEvent, WorkerId};

use crate::context::RunContext;
use crate::scenario::Scenario;
use crate::session::Session;

/// How a single step ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Success,
    Failure,
    /// The step did not run because the run should not continue.
    Abort,
}

/// A scenario panicked instead of returning an error.
#[derive(derive_more::Error, derive_more::Display, Debug)]
pub struct ScenarioPanicError {
    msg: String,
}

impl ScenarioPanicError {
    fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        Self {
            msg: format!("Scenario panicked: {}", panic_message(payload.as_ref())),
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Runs single steps for one worker, turning every scenario error into a [StepOutcome].
pub(crate) struct StepExecutor<S: Session> {
    worker_id: WorkerId,
    context: Arc<RunContext<S>>,
}

impl<S: Session> StepExecutor<S> {
    pub(crate) fn new(worker_id: WorkerId, context: Arc<RunContext<S>>) -> Self {
        Self { worker_id, context }
    }

    /// Run one step. If `scenario` is `None` then one is requested from the selector.
    pub(crate) async fn step(
        &self,
        step: u64,
        session: &mut S,
        scenario: Option<&Arc<Scenario<S>>>,
    ) -> StepOutcome {
        if self.context.state().is_stopped() {
            return StepOutcome::Abort;
        }

        let scenario = match scenario {
            Some(scenario) => scenario.clone(),
            None => match self.context.selector().select(self.worker_id, step) {
                Some(scenario) => scenario,
                None => {
                    log::warn!(
                        "No scenario available for worker {} at step {step}",
                        self.worker_id
                    );
                    return StepOutcome::Abort;
                }
            },
        };

        let notifier = self.context.notifier();
        notifier
            .notify(&ScenarioEvent::Start {
                worker_id: self.worker_id,
                scenario: scenario.name().to_string(),
            })
            .await;

        // Closing the connection drops the scenario future, wherever it is blocked.
        let connection = session.connection().clone();
        let result = connection
            .guard(
                AssertUnwindSafe(scenario.call(session))
                    .catch_unwind()
                    .map(|result| match result {
                        Ok(result) => result,
                        Err(payload) => Err(ScenarioPanicError::from_panic(payload).into()),
                    }),
            )
            .await;

        match result {
            Ok(()) => {
                notifier
                    .notify(&ScenarioEvent::Success {
                        worker_id: self.worker_id,
                        scenario: scenario.name().to_string(),
                    })
                    .await;

                if !scenario.delay().is_zero() {
                    self.context.sleeper().sleep(scenario.delay()).await;
                }

                StepOutcome::Success
            }
            Err(e) => {
                let error = Arc::new(e);
                notifier
                    .notify(&ScenarioEvent::Failure {
                        worker_id: self.worker_id,
                        scenario: scenario.name().to_string(),
                        error: error.clone(),
                    })
                    .await;

                if self.context.config().verbose > 0 {
                    self.context.diagnostics().report_error(&error);
                }

                StepOutcome::Failure
            }
        }
    }
}
