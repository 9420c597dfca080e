use std::sync::Arc;

use anyhow::Context;
use squall_core::prelude::StopReason;
use squall_instruments::{EventSender, InMemoryReporter, LogNotificationSink};
use tokio::time::Instant;

use crate::context::RunContext;
use crate::definition::{ScenarioDefinition, ScenarioDefinitionBuilder};
use crate::progress::start_progress;
use crate::session::Session;
use crate::shutdown::start_shutdown_listener;
use crate::summary::RunSummary;
use crate::worker::{Worker, WorkerExit};

/// Run a load test to completion and return its totals.
///
/// Workers are started on a Tokio runtime created for the run, spread over the ramp up period.
/// The run ends when every worker has stopped, which happens once a stop condition is met.
pub fn run<S: Session>(definition: ScenarioDefinitionBuilder<S>) -> anyhow::Result<RunSummary> {
    let definition = definition.build()?;

    log::info!("Running scenario: {}", definition.name);

    let runtime = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;
    runtime.block_on(run_definition(definition))
}

async fn run_definition<S: Session>(definition: ScenarioDefinition<S>) -> anyhow::Result<RunSummary> {
    let reporter = Arc::new(InMemoryReporter::new());
    let notifier = definition.notifiers.into_iter().fold(
        EventSender::new()
            .with_sink(Arc::new(LogNotificationSink))
            .with_sink(reporter.clone()),
        |sender, sink| sender.with_sink(sink),
    );

    let mut context = RunContext::new(definition.config, definition.selector)
        .with_fixtures(definition.fixtures)
        .with_notifier(Arc::new(notifier));
    if let Some(diagnostics) = definition.diagnostics {
        context = context.with_diagnostics(diagnostics);
    }
    let context = Arc::new(context);
    let config = context.config().clone();
    let state = context.state().clone();

    log::debug!("Run id: {}", config.run_id);

    let shutdown_listener = start_shutdown_listener(state.clone());
    let progress = if config.no_progress {
        None
    } else {
        Some(start_progress(
            config.duration,
            state.clone(),
            context.shutdown_handle().new_listener(),
        )?)
    };

    let started = Instant::now();
    let handles = (0..config.workers)
        .map(|worker_id| {
            let worker = Worker::new(worker_id, config.start_delay(worker_id), context.clone());
            tokio::spawn(worker.run())
        })
        .collect::<Vec<_>>();

    let mut steps = 0;
    for (worker_id, handle) in handles.into_iter().enumerate() {
        match handle.await {
            Ok(WorkerExit::Completed { steps: worker_steps }) => steps += worker_steps,
            Ok(exit) => log::debug!("Worker {worker_id} ended with {exit:?}"),
            Err(e) => context
                .diagnostics()
                .report_error(&anyhow::anyhow!("Worker {worker_id} task failed: {e}")),
        }
    }
    let elapsed = started.elapsed();

    state.request_stop(StopReason::Complete);
    shutdown_listener.abort();

    if let Some(progress) = progress {
        if let Ok(Err(_)) = tokio::task::spawn_blocking(move || progress.join()).await {
            log::warn!("Progress thread panicked");
        }
    }

    log::debug!("Workers ran {steps} steps");
    reporter.finalize();

    let summary = RunSummary::new(&definition.name, &config.run_id, state.snapshot(), elapsed);
    log::info!("{summary}");

    Ok(summary)
}
