mod event;
mod report;
mod sink;

pub use event::{ScenarioEvent, WorkerId};
pub use report::{InMemoryReporter, OperationRow};
pub use sink::{
    DiagnosticsSink, EventSender, LogDiagnostics, LogNotificationSink, NoopNotificationSink,
    NotificationSink,
};

pub mod prelude {
    pub use crate::{
        DiagnosticsSink, EventSender, InMemoryReporter, LogDiagnostics, LogNotificationSink,
        NoopNotificationSink, NotificationSink, ScenarioEvent, WorkerId,
    };
}
