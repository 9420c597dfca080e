use std::sync::Arc;

use futures::future::BoxFuture;
use squall_instruments::WorkerId;

use crate::config::RunConfig;

pub type HookResult = anyhow::Result<()>;

/// Result of the setup fixture. `None` or a JSON object are accepted; the object becomes the
/// options used to open the worker's session. Any other value is a fatal setup error.
pub type SetupResult = anyhow::Result<Option<serde_json::Value>>;

pub type SetupHook = Arc<dyn Fn(WorkerId, Arc<RunConfig>) -> BoxFuture<'static, SetupResult> + Send + Sync>;
pub type SessionHook<S> =
    Arc<dyn for<'a> Fn(WorkerId, &'a mut S) -> BoxFuture<'a, HookResult> + Send + Sync>;
pub type TeardownHook = Arc<dyn Fn(WorkerId) -> HookResult + Send + Sync>;

/// The optional hooks that run around each worker's loop.
///
/// - `setup` runs once per worker before its session is opened.
/// - `setup_session` runs once the session is open, before the first step.
/// - `teardown_session` runs after the last step, before the session is released.
/// - `teardown` runs once per worker after everything else, even if the worker failed.
pub struct Fixtures<S> {
    pub(crate) setup: Option<SetupHook>,
    pub(crate) setup_session: Option<SessionHook<S>>,
    pub(crate) teardown_session: Option<SessionHook<S>>,
    pub(crate) teardown: Option<TeardownHook>,
}

impl<S> Default for Fixtures<S> {
    fn default() -> Self {
        Self {
            setup: None,
            setup_session: None,
            teardown_session: None,
            teardown: None,
        }
    }
}

impl<S> Clone for Fixtures<S> {
    fn clone(&self) -> Self {
        Self {
            setup: self.setup.clone(),
            setup_session: self.setup_session.clone(),
            teardown_session: self.teardown_session.clone(),
            teardown: self.teardown.clone(),
        }
    }
}

impl<S> std::fmt::Debug for Fixtures<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fixtures")
            .field("setup", &self.setup.is_some())
            .field("setup_session", &self.setup_session.is_some())
            .field("teardown_session", &self.teardown_session.is_some())
            .field("teardown", &self.teardown.is_some())
            .finish()
    }
}

impl<S> Fixtures<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_setup<F>(mut self, setup: F) -> Self
    where
        F: Fn(WorkerId, Arc<RunConfig>) -> BoxFuture<'static, SetupResult> + Send + Sync + 'static,
    {
        self.setup = Some(Arc::new(setup));
        self
    }

    pub fn with_setup_session<F>(mut self, setup_session: F) -> Self
    where
        F: for<'a> Fn(WorkerId, &'a mut S) -> BoxFuture<'a, HookResult> + Send + Sync + 'static,
    {
        self.setup_session = Some(Arc::new(setup_session));
        self
    }

    pub fn with_teardown_session<F>(mut self, teardown_session: F) -> Self
    where
        F: for<'a> Fn(WorkerId, &'a mut S) -> BoxFuture<'a, HookResult> + Send + Sync + 'static,
    {
        self.teardown_session = Some(Arc::new(teardown_session));
        self
    }

    pub fn with_teardown<F>(mut self, teardown: F) -> Self
    where
        F: Fn(WorkerId) -> HookResult + Send + Sync + 'static,
    {
        self.teardown = Some(Arc::new(teardown));
        self
    }
}
