use std::sync::Arc;

use squall_core::prelude::{CancellableSleep, RunState, ShutdownHandle};
use squall_instruments::{DiagnosticsSink, LogDiagnostics, LogNotificationSink, NotificationSink};

use crate::config::RunConfig;
use crate::fixture::Fixtures;
use crate::scenario::ScenarioSelector;

/// Everything the workers of one run share.
///
/// Built once by the launcher and handed to each worker behind an [Arc]. The shutdown handle
/// inside the [RunState] is the run's global stop flag, and the [CancellableSleep] is where every
/// worker and watchdog waits.
pub struct RunContext<S> {
    config: Arc<RunConfig>,
    state: Arc<RunState>,
    sleeper: Arc<CancellableSleep>,
    selector: Arc<dyn ScenarioSelector<S>>,
    fixtures: Fixtures<S>,
    notifier: Arc<dyn NotificationSink>,
    diagnostics: Arc<dyn DiagnosticsSink>,
}

impl<S> std::fmt::Debug for RunContext<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("fixtures", &self.fixtures)
            .finish_non_exhaustive()
    }
}

impl<S> RunContext<S> {
    pub fn new(config: RunConfig, selector: Arc<dyn ScenarioSelector<S>>) -> Self {
        let shutdown_handle = ShutdownHandle::new();
        let sleeper = Arc::new(CancellableSleep::new(&shutdown_handle));

        Self {
            config: Arc::new(config),
            state: Arc::new(RunState::new(shutdown_handle)),
            sleeper,
            selector,
            fixtures: Fixtures::default(),
            notifier: Arc::new(LogNotificationSink),
            diagnostics: Arc::new(LogDiagnostics),
        }
    }

    pub fn with_fixtures(mut self, fixtures: Fixtures<S>) -> Self {
        self.fixtures = fixtures;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn DiagnosticsSink>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn config(&self) -> &Arc<RunConfig> {
        &self.config
    }

    pub fn state(&self) -> &Arc<RunState> {
        &self.state
    }

    pub fn shutdown_handle(&self) -> &ShutdownHandle {
        self.state.shutdown_handle()
    }

    pub fn sleeper(&self) -> &Arc<CancellableSleep> {
        &self.sleeper
    }

    pub fn selector(&self) -> &Arc<dyn ScenarioSelector<S>> {
        &self.selector
    }

    pub fn fixtures(&self) -> &Fixtures<S> {
        &self.fixtures
    }

    pub fn notifier(&self) -> &Arc<dyn NotificationSink> {
        &self.notifier
    }

    pub fn diagnostics(&self) -> &Arc<dyn DiagnosticsSink> {
        &self.diagnostics
    }
}
