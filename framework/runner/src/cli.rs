use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(about, long_about = None)]
pub struct SquallCli {
    /// The number of workers to run concurrently
    #[clap(short, long, default_value = "1")]
    pub workers: usize,

    /// The maximum number of seconds to run for. Defaults to the scenario's own default, or one day.
    #[clap(short, long)]
    pub duration: Option<u64>,

    /// The maximum number of steps each worker runs
    #[clap(short = 'n', long)]
    pub max_runs: Option<u64>,

    /// Seconds to wait between two steps of a worker
    #[clap(long, default_value = "0")]
    pub delay: f64,

    /// Spread the start of the workers over this many seconds
    #[clap(short, long, default_value = "0")]
    pub ramp_up: f64,

    /// Verbosity level. Use it more than once to report every scenario failure.
    #[clap(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Stop the whole run on the first scenario failure
    #[clap(short = 'x', long, default_value = "false")]
    pub exception: bool,

    /// Sizing mode. Stop the run once failures exceed the tolerance within a one minute window.
    #[clap(long, default_value = "false")]
    pub sizing: bool,

    /// Failure tolerance for sizing mode, as a percentage of failures relative to successes
    #[clap(long, default_value = "5.0")]
    pub sizing_tolerance: f64,

    /// Run a single named scenario on every step instead of a weighted selection
    #[clap(short = 's', long)]
    pub single_mode: Option<String>,

    /// Do not show a progress bar on the CLI.
    ///
    /// This is recommended for CI/CD environments where the progress bar isn't being looked at by anyone and is just adding noise to the logs.
    #[clap(long, default_value = "false")]
    pub no_progress: bool,

    /// An identifier for this run. A random one is generated if it is not set.
    #[clap(long)]
    pub run_id: Option<String>,
}
