use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use async_trait::async_trait;
use squall_instruments::{DiagnosticsSink, WorkerId};
use tokio_util::sync::CancellationToken;

use crate::config::RunConfig;

/// Options returned by the setup fixture and used to open each worker's session.
pub type SessionOptions = serde_json::Map<String, serde_json::Value>;

/// Values a worker attaches to its session so that fixtures and scenarios can observe them.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    pub worker_id: WorkerId,
    /// The step currently being run, starting at 1.
    pub step: u64,
    pub config: Option<Arc<RunConfig>>,
}

/// A worker's connection to the system under test.
///
/// A session is owned by exactly one worker. Its [ConnectionHandle] may be closed from outside
/// that worker by the duration watchdog, so any I/O that could block for a long time should be
/// run through [ConnectionHandle::guard].
#[async_trait]
pub trait Session: Send + Sized + 'static {
    async fn open(options: SessionOptions) -> anyhow::Result<Self>;

    fn connection(&self) -> &ConnectionHandle;

    fn context(&self) -> &SessionContext;

    fn context_mut(&mut self) -> &mut SessionContext;

    /// Release the session. Called once per session by the worker.
    async fn close(&mut self) -> anyhow::Result<()> {
        self.connection().close();
        Ok(())
    }
}

/// Returned by guarded operations when the connection was closed while they were running.
#[derive(derive_more::Error, derive_more::Display, Debug)]
pub struct ConnectionClosedError {
    msg: String,
}

impl Default for ConnectionClosedError {
    fn default() -> Self {
        Self {
            msg: "Connection closed".to_string(),
        }
    }
}

/// The closable part of a session. Clones refer to the same connection and closing is
/// idempotent, so it is safe to close while an operation is in flight on another task.
#[derive(Debug, Clone, Default)]
pub struct ConnectionHandle {
    token: CancellationToken,
}

impl ConnectionHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn close(&self) {
        self.token.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wait until the connection is closed.
    pub async fn closed(&self) {
        self.token.cancelled().await
    }

    /// Run an operation on this connection. If the connection is closed before the operation
    /// completes then the operation is dropped and a [ConnectionClosedError] is returned.
    pub async fn guard<T, F>(&self, fut: F) -> anyhow::Result<T>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(ConnectionClosedError::default().into()),
            result = fut => result,
        }
    }
}

/// A session with no transport of its own. It keeps the options it was opened with, which is
/// enough for scenarios that bring their own client or for testing.
#[derive(Debug, Default)]
pub struct BasicSession {
    options: SessionOptions,
    connection: ConnectionHandle,
    context: SessionContext,
}

impl BasicSession {
    pub fn options(&self) -> &SessionOptions {
        &self.options
    }
}

#[async_trait]
impl Session for BasicSession {
    async fn open(options: SessionOptions) -> anyhow::Result<Self> {
        Ok(Self {
            options,
            ..Default::default()
        })
    }

    fn connection(&self) -> &ConnectionHandle {
        &self.connection
    }

    fn context(&self) -> &SessionContext {
        &self.context
    }

    fn context_mut(&mut self) -> &mut SessionContext {
        &mut self.context
    }
}

/// Holds an open session until it is released.
///
/// [SessionGuard::release] closes the session and consumes the guard, so a session is released
/// at most once. If the guard is dropped without being released, for example because the
/// worker's future was cancelled, the connection is still closed.
pub(crate) struct SessionGuard<S: Session> {
    session: Option<S>,
}

impl<S: Session> SessionGuard<S> {
    pub(crate) fn new(session: S) -> Self {
        Self {
            session: Some(session),
        }
    }

    pub(crate) async fn release(mut self, diagnostics: &dyn DiagnosticsSink) {
        if let Some(mut session) = self.session.take() {
            let worker_id = session.context().worker_id;
            if let Err(e) = session.close().await {
                diagnostics.report_error(&e.context(format!(
                    "Failed to close session for worker {worker_id}"
                )));
            }
            // Whatever close did, the connection must not outlive the release.
            session.connection().close();
        }
    }
}

impl<S: Session> Deref for SessionGuard<S> {
    type Target = S;

    fn deref(&self) -> &S {
        // Only `release` takes the session and it consumes the guard.
        self.session.as_ref().unwrap_or_else(|| unreachable!())
    }
}

impl<S: Session> DerefMut for SessionGuard<S> {
    fn deref_mut(&mut self) -> &mut S {
        self.session.as_mut().unwrap_or_else(|| unreachable!())
    }
}

impl<S: Session> Drop for SessionGuard<S> {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            log::warn!(
                "Session for worker {} dropped without being released",
                session.context().worker_id
            );
            session.connection().close();
        }
    }
}
