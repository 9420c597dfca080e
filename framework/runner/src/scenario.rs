use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use rand::distributions::{Distribution, WeightedIndex};
use squall_instruments::WorkerId;

pub type ScenarioResult = anyhow::Result<()>;

pub type ScenarioFn<S> =
    Arc<dyn for<'a> Fn(&'a mut S, &'a ScenarioArgs) -> BoxFuture<'a, ScenarioResult> + Send + Sync>;

/// Arguments recorded with a scenario and passed to it on every step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScenarioArgs {
    pub args: Vec<serde_json::Value>,
    pub kwargs: serde_json::Map<String, serde_json::Value>,
}

/// One unit of work that a worker runs against its session.
pub struct Scenario<S> {
    name: String,
    func: ScenarioFn<S>,
    args: ScenarioArgs,
    weight: u32,
    delay: Duration,
}

impl<S> std::fmt::Debug for Scenario<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scenario")
            .field("name", &self.name)
            .field("args", &self.args)
            .field("weight", &self.weight)
            .field("delay", &self.delay)
            .finish()
    }
}

impl<S> Scenario<S> {
    pub fn new<F>(name: &str, func: F) -> Self
    where
        F: for<'a> Fn(&'a mut S, &'a ScenarioArgs) -> BoxFuture<'a, ScenarioResult>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.to_string(),
            func: Arc::new(func),
            args: ScenarioArgs::default(),
            weight: 1,
            delay: Duration::ZERO,
        }
    }

    /// Relative weight when scenarios are selected at random. A weight of 0 means the scenario
    /// is only run in single mode.
    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    /// How long the worker waits after a successful run of this scenario.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_args(mut self, args: ScenarioArgs) -> Self {
        self.args = args;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &ScenarioArgs {
        &self.args
    }

    pub fn weight(&self) -> u32 {
        self.weight
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub(crate) fn call<'a>(&'a self, session: &'a mut S) -> BoxFuture<'a, ScenarioResult> {
        (self.func)(session, &self.args)
    }
}

/// Chooses the scenario for each step of a worker.
pub trait ScenarioSelector<S>: Send + Sync {
    /// The scenario for `step` of `worker_id`, or `None` if there is nothing to run.
    fn select(&self, worker_id: WorkerId, step: u64) -> Option<Arc<Scenario<S>>>;

    /// Look up a scenario by name, for single mode.
    fn get(&self, name: &str) -> Option<Arc<Scenario<S>>>;
}

#[derive(derive_more::Error, derive_more::Display, Debug)]
pub struct UnknownScenarioError {
    msg: String,
}

impl UnknownScenarioError {
    pub fn new(name: &str) -> Self {
        Self {
            msg: format!("Scenario [{name}] is not registered"),
        }
    }
}

/// Scenarios registered for a run, selected at random in proportion to their weights.
pub struct ScenarioRegistry<S> {
    scenarios: Vec<Arc<Scenario<S>>>,
    by_name: HashMap<String, usize>,
    weights: Option<WeightedIndex<u32>>,
}

impl<S> Default for ScenarioRegistry<S> {
    fn default() -> Self {
        Self {
            scenarios: Vec::new(),
            by_name: HashMap::new(),
            weights: None,
        }
    }
}

impl<S> std::fmt::Debug for ScenarioRegistry<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.scenarios.iter()).finish()
    }
}

impl<S> ScenarioRegistry<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, scenario: Scenario<S>) -> anyhow::Result<()> {
        if self.by_name.contains_key(scenario.name()) {
            anyhow::bail!("Scenario [{}] is already defined", scenario.name());
        }

        self.by_name
            .insert(scenario.name().to_string(), self.scenarios.len());
        self.scenarios.push(Arc::new(scenario));
        // Fails when every weight is zero, in which case only single mode can run anything.
        self.weights = WeightedIndex::new(self.scenarios.iter().map(|s| s.weight())).ok();

        Ok(())
    }

    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.scenarios.iter().map(|s| s.name())
    }
}

impl<S> ScenarioSelector<S> for ScenarioRegistry<S> {
    fn select(&self, _worker_id: WorkerId, _step: u64) -> Option<Arc<Scenario<S>>> {
        let weights = self.weights.as_ref()?;
        let index = weights.sample(&mut rand::thread_rng());
        self.scenarios.get(index).cloned()
    }

    fn get(&self, name: &str) -> Option<Arc<Scenario<S>>> {
        self.by_name
            .get(name)
            .and_then(|index| self.scenarios.get(*index))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use crate::session::{BasicSession, Session};

    use super::*;

    fn noop(name: &str) -> Scenario<BasicSession> {
        Scenario::new(name, |_session, _args| Box::pin(async { Ok(()) }))
    }

    #[test]
    fn register_rejects_duplicates() {
        let mut registry = ScenarioRegistry::new();
        registry.register(noop("login")).unwrap();

        assert!(registry.register(noop("login")).is_err());
        assert_eq!(1, registry.len());
    }

    #[test]
    fn select_follows_weights() {
        let mut registry = ScenarioRegistry::new();
        registry.register(noop("never").with_weight(0)).unwrap();
        registry.register(noop("always").with_weight(3)).unwrap();

        for step in 1..100 {
            let scenario = registry.select(0, step).unwrap();
            assert_eq!("always", scenario.name());
        }

        // Weight zero is still reachable by name
        assert_eq!("never", registry.get("never").unwrap().name());
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn select_with_nothing_to_pick() {
        let mut registry = ScenarioRegistry::<BasicSession>::new();
        assert!(registry.select(0, 1).is_none());

        registry.register(noop("single_only").with_weight(0)).unwrap();
        assert!(registry.select(0, 1).is_none());
    }

    #[tokio::test]
    async fn call_passes_recorded_args() {
        let mut kwargs = serde_json::Map::new();
        kwargs.insert("path".to_string(), "/health".into());
        let scenario = Scenario::<BasicSession>::new("args", |session, args| {
            Box::pin(async move {
                session.context_mut().step = args.args.len() as u64;
                anyhow::ensure!(
                    args.kwargs.get("path") == Some(&serde_json::Value::from("/health"))
                );
                Ok(())
            })
        })
        .with_args(ScenarioArgs {
            args: vec![1.into(), 2.into()],
            kwargs,
        });

        let mut session = BasicSession::default();
        scenario.call(&mut session).await.unwrap();
        assert_eq!(2, session.context().step);
    }
}
