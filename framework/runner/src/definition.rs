use std::sync::Arc;

use futures::future::BoxFuture;
use squall_instruments::{DiagnosticsSink, NotificationSink, WorkerId};

use crate::cli::SquallCli;
use crate::config::RunConfig;
use crate::fixture::{Fixtures, HookResult, SetupResult};
use crate::scenario::{
    Scenario, ScenarioArgs, ScenarioRegistry, ScenarioResult, ScenarioSelector,
    UnknownScenarioError,
};
use crate::session::Session;

/// The builder for a load test definition.
///
/// This must be used at the start of a test to define the scenarios that workers will run and
/// the fixtures around them.
pub struct ScenarioDefinitionBuilder<S: Session> {
    /// The name of the load test.
    ///
    /// Recommended value is `env!("CARGO_PKG_NAME")`.
    name: String,
    /// This value is initialised for you and you cannot change it.
    #[doc(hidden)]
    cli: SquallCli,
    /// Duration to use if none is given on the command line.
    default_duration_s: Option<u64>,
    fixtures: Fixtures<S>,
    registry: ScenarioRegistry<S>,
    /// Replaces the registry for scenario selection. The registry is still used for single mode.
    selector: Option<Arc<dyn ScenarioSelector<S>>>,
    notifiers: Vec<Arc<dyn NotificationSink>>,
    diagnostics: Option<Arc<dyn DiagnosticsSink>>,
    /// Registration errors are kept until [ScenarioDefinitionBuilder::build] so that the builder
    /// can be chained.
    errors: Vec<anyhow::Error>,
}

/// A validated definition, ready to be run.
pub struct ScenarioDefinition<S: Session> {
    pub name: String,
    pub config: RunConfig,
    pub fixtures: Fixtures<S>,
    pub selector: Arc<dyn ScenarioSelector<S>>,
    pub notifiers: Vec<Arc<dyn NotificationSink>>,
    pub diagnostics: Option<Arc<dyn DiagnosticsSink>>,
}

impl<S: Session> ScenarioDefinitionBuilder<S> {
    /// Initialise a new definition from the test name and parsed command line arguments.
    pub fn new(name: &str, cli: SquallCli) -> Self {
        Self {
            name: name.to_string(),
            cli,
            default_duration_s: None,
            fixtures: Fixtures::new(),
            registry: ScenarioRegistry::new(),
            selector: None,
            notifiers: Vec::new(),
            diagnostics: None,
            errors: Vec::new(),
        }
    }

    /// Initialise logging, parse the command line and create a new definition.
    pub fn new_with_init(name: &str) -> Self {
        Self::new(name, crate::init::init())
    }

    /// Duration in seconds to run for when `--duration` is not given.
    pub fn with_default_duration_s(mut self, duration: u64) -> Self {
        self.default_duration_s = Some(duration);
        self
    }

    /// Set the setup fixture, run once per worker before its session is opened.
    pub fn use_setup<F>(mut self, setup: F) -> Self
    where
        F: Fn(WorkerId, Arc<RunConfig>) -> BoxFuture<'static, SetupResult> + Send + Sync + 'static,
    {
        self.fixtures = self.fixtures.with_setup(setup);
        self
    }

    /// Set the session setup fixture, run once the worker's session is open.
    pub fn use_session_setup<F>(mut self, setup_session: F) -> Self
    where
        F: for<'a> Fn(WorkerId, &'a mut S) -> BoxFuture<'a, HookResult> + Send + Sync + 'static,
    {
        self.fixtures = self.fixtures.with_setup_session(setup_session);
        self
    }

    /// Set the session teardown fixture, run after the worker's last step. Errors are reported
    /// and do not fail the run.
    pub fn use_session_teardown<F>(mut self, teardown_session: F) -> Self
    where
        F: for<'a> Fn(WorkerId, &'a mut S) -> BoxFuture<'a, HookResult> + Send + Sync + 'static,
    {
        self.fixtures = self.fixtures.with_teardown_session(teardown_session);
        self
    }

    /// Set the teardown fixture, run once for every worker that started, however it ended.
    pub fn use_teardown<F>(mut self, teardown: F) -> Self
    where
        F: Fn(WorkerId) -> HookResult + Send + Sync + 'static,
    {
        self.fixtures = self.fixtures.with_teardown(teardown);
        self
    }

    /// Register a scenario with a weight of 1.
    pub fn use_scenario<F>(self, name: &str, func: F) -> Self
    where
        F: for<'a> Fn(&'a mut S, &'a ScenarioArgs) -> BoxFuture<'a, ScenarioResult>
            + Send
            + Sync
            + 'static,
    {
        self.add_scenario(Scenario::new(name, func))
    }

    /// Register a scenario with its weight, delay and arguments already set.
    pub fn add_scenario(mut self, scenario: Scenario<S>) -> Self {
        if let Err(e) = self.registry.register(scenario) {
            self.errors.push(e);
        }
        self
    }

    /// Choose scenarios with a custom selector instead of at random by weight.
    pub fn use_selector(mut self, selector: Arc<dyn ScenarioSelector<S>>) -> Self {
        self.selector = Some(selector);
        self
    }

    /// Send scenario events to this sink as well as to the log and the summary.
    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifiers.push(notifier);
        self
    }

    /// Replace the default sink that logs fixture errors and verbose failures.
    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn DiagnosticsSink>) -> Self {
        self.diagnostics = Some(diagnostics);
        self
    }

    pub(crate) fn build(mut self) -> anyhow::Result<ScenarioDefinition<S>> {
        if let Some(e) = self.errors.pop() {
            return Err(e);
        }

        if self.cli.duration.is_none() {
            self.cli.duration = self.default_duration_s;
        }
        let config = RunConfig::try_from(self.cli)?;

        let selector = match self.selector {
            Some(selector) => Arc::new(SingleModeLookup {
                selector,
                registry: self.registry,
            }) as Arc<dyn ScenarioSelector<S>>,
            None => {
                if self.registry.is_empty() {
                    anyhow::bail!("No scenarios registered for [{}]", self.name);
                }
                Arc::new(self.registry)
            }
        };

        if let Some(name) = &config.single_mode {
            if selector.get(name).is_none() {
                return Err(UnknownScenarioError::new(name).into());
            }
        }

        Ok(ScenarioDefinition {
            name: self.name,
            config,
            fixtures: self.fixtures,
            selector,
            notifiers: self.notifiers,
            diagnostics: self.diagnostics,
        })
    }
}

/// A custom selector that still finds registered scenarios by name.
struct SingleModeLookup<S> {
    selector: Arc<dyn ScenarioSelector<S>>,
    registry: ScenarioRegistry<S>,
}

impl<S> ScenarioSelector<S> for SingleModeLookup<S> {
    fn select(&self, worker_id: WorkerId, step: u64) -> Option<Arc<Scenario<S>>> {
        self.selector.select(worker_id, step)
    }

    fn get(&self, name: &str) -> Option<Arc<Scenario<S>>> {
        self.registry
            .get(name)
            .or_else(|| self.selector.get(name))
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;
    use crate::session::BasicSession;

    fn cli(args: &[&str]) -> SquallCli {
        SquallCli::parse_from(std::iter::once("squall").chain(args.iter().copied()))
    }

    fn builder(args: &[&str]) -> ScenarioDefinitionBuilder<BasicSession> {
        ScenarioDefinitionBuilder::new("definition_test", cli(args))
    }

    #[test]
    fn default_duration_applies_without_flag() {
        let definition = builder(&[])
            .with_default_duration_s(30)
            .use_scenario("ok", |_, _| Box::pin(async { Ok(()) }))
            .build()
            .unwrap();

        assert_eq!(30, definition.config.duration.as_secs());

        let definition = builder(&["--duration", "5"])
            .with_default_duration_s(30)
            .use_scenario("ok", |_, _| Box::pin(async { Ok(()) }))
            .build()
            .unwrap();

        assert_eq!(5, definition.config.duration.as_secs());
    }

    #[test]
    fn duplicate_scenario_fails_build() {
        let result = builder(&[])
            .use_scenario("ok", |_, _| Box::pin(async { Ok(()) }))
            .use_scenario("ok", |_, _| Box::pin(async { Ok(()) }))
            .build();

        assert_eq!(
            "Scenario [ok] is already defined",
            result.err().unwrap().to_string()
        );
    }

    #[test]
    fn unknown_single_mode_fails_build() {
        let result = builder(&["-s", "missing"])
            .use_scenario("ok", |_, _| Box::pin(async { Ok(()) }))
            .build();

        let err = result.err().unwrap();
        assert!(err.is::<UnknownScenarioError>());
    }

    #[test]
    fn no_scenarios_fails_build() {
        assert!(builder(&[]).build().is_err());
    }

    #[test]
    fn custom_selector_keeps_single_mode_lookup() {
        struct Never;

        impl ScenarioSelector<BasicSession> for Never {
            fn select(&self, _: WorkerId, _: u64) -> Option<Arc<Scenario<BasicSession>>> {
                None
            }

            fn get(&self, _: &str) -> Option<Arc<Scenario<BasicSession>>> {
                None
            }
        }

        let definition = builder(&["-s", "registered"])
            .add_scenario(
                Scenario::new("registered", |_, _| Box::pin(async { Ok(()) })).with_weight(0),
            )
            .use_selector(Arc::new(Never))
            .build()
            .unwrap();

        assert!(definition.selector.select(0, 1).is_none());
        assert_eq!(
            "registered",
            definition.selector.get("registered").unwrap().name()
        );
    }
}
