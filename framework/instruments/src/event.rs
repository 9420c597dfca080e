use std::sync::Arc;

/// Index of a worker within a run, starting at 0.
pub type WorkerId = usize;

/// Lifecycle notification for a single step of a worker.
#[derive(Debug, Clone)]
pub enum ScenarioEvent {
    Start {
        worker_id: WorkerId,
        scenario: String,
    },
    Success {
        worker_id: WorkerId,
        scenario: String,
    },
    Failure {
        worker_id: WorkerId,
        scenario: String,
        error: Arc<anyhow::Error>,
    },
}

impl ScenarioEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioEvent::Start { .. } => "scenario_start",
            ScenarioEvent::Success { .. } => "scenario_success",
            ScenarioEvent::Failure { .. } => "scenario_failure",
        }
    }

    pub fn worker_id(&self) -> WorkerId {
        match self {
            ScenarioEvent::Start { worker_id, .. }
            | ScenarioEvent::Success { worker_id, .. }
            | ScenarioEvent::Failure { worker_id, .. } => *worker_id,
        }
    }

    pub fn scenario(&self) -> &str {
        match self {
            ScenarioEvent::Start { scenario, .. }
            | ScenarioEvent::Success { scenario, .. }
            | ScenarioEvent::Failure { scenario, .. } => scenario,
        }
    }

    pub fn error(&self) -> Option<&anyhow::Error> {
        match self {
            ScenarioEvent::Failure { error, .. } => Some(error.as_ref()),
            _ => None,
        }
    }
}
