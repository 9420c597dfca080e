use std::sync::Arc;

use async_trait::async_trait;

use crate::event::ScenarioEvent;

/// Receives lifecycle events from workers. Implementations must tolerate being called
/// concurrently from every worker of the run.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, event: &ScenarioEvent);
}

/// Receives errors that should be shown to the user, such as fixture failures and, when
/// verbose reporting is on, scenario failures.
pub trait DiagnosticsSink: Send + Sync {
    fn report_error(&self, error: &anyhow::Error);
}

/// Logs each event at trace level, and failures at debug level.
#[derive(Debug, Default)]
pub struct LogNotificationSink;

#[async_trait]
impl NotificationSink for LogNotificationSink {
    async fn notify(&self, event: &ScenarioEvent) {
        match event.error() {
            Some(error) => log::debug!(
                "{} worker={} scenario={}: {error:#}",
                event.name(),
                event.worker_id(),
                event.scenario()
            ),
            None => log::trace!(
                "{} worker={} scenario={}",
                event.name(),
                event.worker_id(),
                event.scenario()
            ),
        }
    }
}

#[derive(Debug, Default)]
pub struct NoopNotificationSink;

#[async_trait]
impl NotificationSink for NoopNotificationSink {
    async fn notify(&self, _event: &ScenarioEvent) {
        // no-op
    }
}

/// Forwards every event to each of its sinks in order.
#[derive(Default, Clone)]
pub struct EventSender {
    sinks: Vec<Arc<dyn NotificationSink>>,
}

impl EventSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

#[async_trait]
impl NotificationSink for EventSender {
    async fn notify(&self, event: &ScenarioEvent) {
        for sink in &self.sinks {
            sink.notify(event).await;
        }
    }
}

/// Reports errors through the `log` crate at error level.
#[derive(Debug, Default)]
pub struct LogDiagnostics;

impl DiagnosticsSink for LogDiagnostics {
    fn report_error(&self, error: &anyhow::Error) {
        log::error!("{error:?}");
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        names: Mutex<Vec<&'static str>>,
    }

    #[async_trait]
    impl NotificationSink for Recorder {
        async fn notify(&self, event: &ScenarioEvent) {
            self.names.lock().push(event.name());
        }
    }

    #[tokio::test]
    async fn event_sender_forwards_to_every_sink() {
        let first = Arc::new(Recorder::default());
        let second = Arc::new(Recorder::default());
        let sender = EventSender::new()
            .with_sink(first.clone())
            .with_sink(Arc::new(LogNotificationSink))
            .with_sink(second.clone());

        sender
            .notify(&ScenarioEvent::Start {
                worker_id: 1,
                scenario: "login".to_string(),
            })
            .await;
        sender
            .notify(&ScenarioEvent::Failure {
                worker_id: 1,
                scenario: "login".to_string(),
                error: Arc::new(anyhow::anyhow!("boom")),
            })
            .await;

        assert_eq!(
            vec!["scenario_start", "scenario_failure"],
            *first.names.lock()
        );
        assert_eq!(*first.names.lock(), *second.names.lock());
    }
}
