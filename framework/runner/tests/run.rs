use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use squall_runner::prelude::{
    run, BasicSession, NotificationSink, Scenario, ScenarioDefinitionBuilder, ScenarioEvent,
    Session, SquallCli, StopReason,
};

fn sample_cli_cfg() -> SquallCli {
    SquallCli {
        workers: 4,
        duration: Some(2),
        max_runs: None,
        delay: 0.0,
        ramp_up: 0.0,
        verbose: 0,
        exception: false,
        sizing: false,
        sizing_tolerance: 5.0,
        single_mode: None,
        no_progress: true,
        run_id: Some("integration".to_string()),
    }
}

#[derive(Default)]
struct CountFailures(AtomicUsize);

#[async_trait]
impl NotificationSink for CountFailures {
    async fn notify(&self, event: &ScenarioEvent) {
        if let ScenarioEvent::Failure { .. } = event {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[test]
fn run_for_duration_with_single_scenario() {
    let mut cli = sample_cli_cfg();
    cli.single_mode = Some("always_ok".to_string());
    let scenario = ScenarioDefinitionBuilder::<BasicSession>::new(
        "run_for_duration_with_single_scenario",
        cli,
    )
    .use_scenario("always_ok", |_, _| Box::pin(async { Ok(()) }))
    .add_scenario(
        Scenario::new("never_selected", |_, _| {
            Box::pin(async { Err(anyhow::anyhow!("Should not run in single mode")) })
        }),
    );

    let started = Instant::now();
    let summary = run(scenario).unwrap();
    let elapsed = started.elapsed();

    assert!(summary.ok > 0);
    assert_eq!(0, summary.failed);
    assert!(!summary.limit_reached);
    assert_eq!(0, summary.active_workers);
    assert_eq!("integration", summary.run_id);
    assert!(elapsed >= Duration::from_secs(2), "finished after {elapsed:?}");
    assert!(elapsed < Duration::from_secs(4), "finished after {elapsed:?}");
}

#[test]
fn max_runs_bounds_every_worker() {
    let mut cli = sample_cli_cfg();
    cli.workers = 3;
    cli.max_runs = Some(7);
    cli.duration = Some(30);
    let scenario = ScenarioDefinitionBuilder::<BasicSession>::new("max_runs_bounds_every_worker", cli)
        .use_scenario("ok", |_, _| Box::pin(async { Ok(()) }));

    let summary = run(scenario).unwrap();

    assert_eq!(21, summary.ok);
    assert_eq!(Some(StopReason::Complete), summary.stop_reason);
}

#[test]
fn stop_on_first_failure() {
    let failures = Arc::new(CountFailures::default());
    let mut cli = sample_cli_cfg();
    cli.exception = true;
    cli.duration = Some(30);
    cli.delay = 0.01;
    let scenario = ScenarioDefinitionBuilder::<BasicSession>::new("stop_on_first_failure", cli)
        .use_scenario("fails_on_third_step", |session, _| {
            Box::pin(async move {
                let context = session.context();
                anyhow::ensure!(
                    !(context.worker_id == 0 && context.step == 3),
                    "Failed on step 3"
                );
                Ok(())
            })
        })
        .with_notifier(failures.clone());

    let started = Instant::now();
    let summary = run(scenario).unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(Some(StopReason::FirstFailure), summary.stop_reason);
    assert_eq!(1, summary.failed);
    assert_eq!(1, failures.0.load(Ordering::SeqCst));
}

#[test]
fn sizing_limit_stops_the_run() {
    let mut cli = sample_cli_cfg();
    cli.sizing = true;
    cli.sizing_tolerance = 10.0;
    cli.duration = Some(30);
    let scenario = ScenarioDefinitionBuilder::<BasicSession>::new("sizing_limit_stops_the_run", cli)
        .use_scenario("half_fail", |session, _| {
            Box::pin(async move {
                anyhow::ensure!(session.context().step % 2 == 0, "Overloaded");
                Ok(())
            })
        });

    let started = Instant::now();
    let summary = run(scenario).unwrap();

    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(summary.limit_reached);
    assert_eq!(Some(StopReason::SizingLimitReached), summary.stop_reason);
    assert!(summary.total() >= 100);
    assert!(summary.reached_percent().unwrap() > 10.0);
}

#[test]
fn watchdog_ends_blocked_steps() {
    let mut cli = sample_cli_cfg();
    cli.workers = 2;
    cli.duration = Some(1);
    let scenario = ScenarioDefinitionBuilder::<BasicSession>::new("watchdog_ends_blocked_steps", cli)
        .use_scenario("hangs", |session, _| {
            Box::pin(async move {
                session
                    .connection()
                    .guard(std::future::pending::<anyhow::Result<()>>())
                    .await
            })
        });

    let started = Instant::now();
    let summary = run(scenario).unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(Some(StopReason::DurationExceeded), summary.stop_reason);
    assert_eq!(0, summary.ok);
    assert_eq!(2, summary.failed);
    assert_eq!(0, summary.active_workers);
}

#[test]
fn ramp_up_spreads_worker_starts() {
    let starts = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let starts_hook = starts.clone();

    let mut cli = sample_cli_cfg();
    cli.workers = 2;
    cli.ramp_up = 1.0;
    cli.max_runs = Some(1);
    let scenario = ScenarioDefinitionBuilder::<BasicSession>::new("ramp_up_spreads_worker_starts", cli)
        .use_setup(move |worker_id, _| {
            starts_hook.lock().push((worker_id, Instant::now()));
            Box::pin(async { Ok(None) })
        })
        .use_scenario("ok", |_, _| Box::pin(async { Ok(()) }));

    let summary = run(scenario).unwrap();
    assert_eq!(2, summary.ok);

    let mut starts = starts.lock().clone();
    starts.sort_by_key(|(worker_id, _)| *worker_id);
    let gap = starts[1].1.duration_since(starts[0].1);
    assert!(gap >= Duration::from_millis(450), "workers started {gap:?} apart");
}
