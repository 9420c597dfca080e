use crate::cli::SquallCli;
use clap::Parser;

/// Initialise the CLI and logging for the squall runner.
pub fn init() -> SquallCli {
    env_logger::init();

    SquallCli::parse()
}
