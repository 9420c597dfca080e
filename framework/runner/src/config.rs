use std::time::Duration;

use anyhow::bail;

use crate::cli::SquallCli;

/// Duration of a run when neither the command line nor the scenario sets one.
pub const DEFAULT_DURATION_S: u64 = 86400;

/// Read-only settings for a run, shared by every worker.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub run_id: String,
    pub workers: usize,
    pub duration: Duration,
    pub max_runs: Option<u64>,
    pub delay: Duration,
    pub ramp_up: Duration,
    pub verbose: u8,
    /// Stop the run on the first failed step.
    pub exception: bool,
    pub sizing: bool,
    /// Percentage of failures relative to successes that sizing mode tolerates.
    pub sizing_tolerance: f64,
    pub single_mode: Option<String>,
    pub no_progress: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            run_id: nanoid::nanoid!(),
            workers: 1,
            duration: Duration::from_secs(DEFAULT_DURATION_S),
            max_runs: None,
            delay: Duration::ZERO,
            ramp_up: Duration::ZERO,
            verbose: 0,
            exception: false,
            sizing: false,
            sizing_tolerance: 5.0,
            single_mode: None,
            no_progress: true,
        }
    }
}

impl RunConfig {
    /// Start delay for a worker so that worker starts are spread evenly over `ramp_up`.
    pub fn start_delay(&self, worker_index: usize) -> Duration {
        if self.ramp_up.is_zero() || self.workers == 0 {
            return Duration::ZERO;
        }

        self.ramp_up.mul_f64(worker_index as f64 / self.workers as f64)
    }
}

impl TryFrom<SquallCli> for RunConfig {
    type Error = anyhow::Error;

    fn try_from(cli: SquallCli) -> anyhow::Result<Self> {
        if cli.workers == 0 {
            bail!("At least one worker is required");
        }
        let delay = seconds("Delay", cli.delay)?;
        let ramp_up = seconds("Ramp up", cli.ramp_up)?;
        if !cli.sizing_tolerance.is_finite() || cli.sizing_tolerance < 0.0 {
            bail!("Sizing tolerance must be a non-negative percentage, got {}", cli.sizing_tolerance);
        }

        Ok(Self {
            run_id: cli.run_id.unwrap_or_else(|| nanoid::nanoid!()),
            workers: cli.workers,
            duration: Duration::from_secs(cli.duration.unwrap_or(DEFAULT_DURATION_S)),
            max_runs: cli.max_runs,
            delay,
            ramp_up,
            verbose: cli.verbose,
            exception: cli.exception,
            sizing: cli.sizing,
            sizing_tolerance: cli.sizing_tolerance,
            single_mode: cli.single_mode,
            no_progress: cli.no_progress,
        })
    }
}

/// Convert a number of seconds from the command line, rejecting values a [Duration] cannot hold.
fn seconds(name: &str, value: f64) -> anyhow::Result<Duration> {
    match Duration::try_from_secs_f64(value) {
        Ok(duration) => Ok(duration),
        Err(_) => bail!("{name} must be a non-negative number of seconds, got {value}"),
    }
}
