mod operations_table;

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tabled::settings::Style;
use tabled::Table;
use tokio::time::Instant;

use crate::event::{ScenarioEvent, WorkerId};
use crate::sink::NotificationSink;

pub use operations_table::OperationRow;

/// Timings of one scenario's completed steps.
#[derive(Debug, Default, Clone, Copy)]
struct ScenarioStats {
    succeeded: usize,
    failed: usize,
    /// Only successful steps are timed.
    total_time: Duration,
    min_time: Option<Duration>,
    max_time: Duration,
}

impl ScenarioStats {
    fn record(&mut self, elapsed: Duration, is_error: bool) {
        if is_error {
            self.failed += 1;
            return;
        }

        self.succeeded += 1;
        self.total_time += elapsed;
        self.min_time = Some(self.min_time.map_or(elapsed, |min| min.min(elapsed)));
        self.max_time = self.max_time.max(elapsed);
    }
}

/// A very basic reporter that is useful while developing scenarios. It keeps running totals of
/// the completed steps for each scenario and prints a summary of them at the end of the run.
#[derive(Debug, Default)]
pub struct InMemoryReporter {
    in_flight: Mutex<HashMap<WorkerId, Instant>>,
    by_scenario: Mutex<BTreeMap<String, ScenarioStats>>,
}

impl InMemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of steps that completed, successfully or not.
    pub fn operation_count(&self) -> usize {
        self.by_scenario
            .lock()
            .values()
            .map(|stats| stats.succeeded + stats.failed)
            .sum()
    }

    /// One row per scenario, ordered by scenario name.
    pub fn rows(&self) -> Vec<OperationRow> {
        self.by_scenario
            .lock()
            .iter()
            .map(|(scenario, stats)| OperationRow {
                operation_id: scenario.clone(),
                succeeded: stats.succeeded,
                failed: stats.failed,
                avg_time_ms: if stats.succeeded == 0 {
                    0.0
                } else {
                    as_ms(stats.total_time) / stats.succeeded as f64
                },
                min_time_ms: stats.min_time.map(as_ms).unwrap_or(0.0),
                max_time_ms: as_ms(stats.max_time),
            })
            .collect()
    }

    pub fn finalize(&self) {
        let rows = self.rows();
        if rows.is_empty() {
            println!("\nNo scenarios were run");
            return;
        }

        println!("\nSummary of scenarios");
        let mut table = Table::new(rows);
        table.with(Style::modern());

        println!("{table}");
    }

    fn complete(&self, worker_id: WorkerId, scenario: &str, is_error: bool) {
        let Some(started) = self.in_flight.lock().remove(&worker_id) else {
            log::warn!("Scenario {scenario} completed for worker {worker_id} without a start");
            return;
        };
        let elapsed = started.elapsed();

        let mut by_scenario = self.by_scenario.lock();
        match by_scenario.get_mut(scenario) {
            Some(stats) => stats.record(elapsed, is_error),
            None => {
                let mut stats = ScenarioStats::default();
                stats.record(elapsed, is_error);
                by_scenario.insert(scenario.to_string(), stats);
            }
        }
    }
}

#[async_trait]
impl NotificationSink for InMemoryReporter {
    async fn notify(&self, event: &ScenarioEvent) {
        match event {
            ScenarioEvent::Start { worker_id, .. } => {
                self.in_flight.lock().insert(*worker_id, Instant::now());
            }
            ScenarioEvent::Success {
                worker_id,
                scenario,
            } => self.complete(*worker_id, scenario, false),
            ScenarioEvent::Failure {
                worker_id,
                scenario,
                ..
            } => self.complete(*worker_id, scenario, true),
        }
    }
}

fn as_ms(duration: Duration) -> f64 {
    duration.as_micros() as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    async fn step(reporter: &InMemoryReporter, worker_id: WorkerId, scenario: &str, ok: bool) {
        reporter
            .notify(&ScenarioEvent::Start {
                worker_id,
                scenario: scenario.to_string(),
            })
            .await;
        tokio::time::advance(Duration::from_millis(10)).await;
        let event = if ok {
            ScenarioEvent::Success {
                worker_id,
                scenario: scenario.to_string(),
            }
        } else {
            ScenarioEvent::Failure {
                worker_id,
                scenario: scenario.to_string(),
                error: Arc::new(anyhow::anyhow!("failed")),
            }
        };
        reporter.notify(&event).await;
    }

    #[tokio::test(start_paused = true)]
    async fn summarises_per_scenario() {
        let reporter = InMemoryReporter::new();
        step(&reporter, 0, "login", true).await;
        step(&reporter, 1, "login", false).await;
        step(&reporter, 0, "search", true).await;

        let rows = reporter.rows();
        assert_eq!(2, rows.len());

        assert_eq!("login", rows[0].operation_id);
        assert_eq!(1, rows[0].succeeded);
        assert_eq!(1, rows[0].failed);
        assert!(rows[0].avg_time_ms >= 10.0);

        assert_eq!("search", rows[1].operation_id);
        assert_eq!(1, rows[1].succeeded);
        assert_eq!(0, rows[1].failed);
        assert_eq!(3, reporter.operation_count());

        reporter.finalize();
    }

    #[tokio::test]
    async fn completion_without_start_is_ignored() {
        let reporter = InMemoryReporter::new();
        reporter
            .notify(&ScenarioEvent::Success {
                worker_id: 3,
                scenario: "orphan".to_string(),
            })
            .await;

        assert_eq!(0, reporter.operation_count());
        reporter.finalize();
    }
}
