use std::cmp::min;
use std::fmt::Write;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::Context;
use indicatif::{ProgressBar, ProgressState, ProgressStyle};
use squall_core::prelude::{DelegatedShutdownListener, RunState};

const REFRESH_INTERVAL: Duration = Duration::from_millis(250);

/// Displays a progress bar while the run is going to show the user how long is left and how
/// many steps have succeeded or failed so far.
pub(crate) fn start_progress(
    planned_runtime: Duration,
    state: Arc<RunState>,
    shutdown_listener: DelegatedShutdownListener,
) -> anyhow::Result<JoinHandle<()>> {
    let hours = planned_runtime.as_secs() / 3600;
    let minutes = (planned_runtime.as_secs() % 3600) / 60;
    let seconds = planned_runtime.as_secs() % 60;

    let style = ProgressStyle::with_template(
        "{spinner:.green} [{wide_bar:.cyan/blue}] [{elapsed_precise} / {planned_runtime}] {msg}",
    )
    .context("Invalid progress template")?
    .with_key(
        "planned_runtime",
        move |_state: &ProgressState, w: &mut dyn Write| {
            let _ = write!(w, "{hours:02}:{minutes:02}:{seconds:02}");
        },
    )
    .progress_chars("#>-");

    std::thread::Builder::new()
        .name("progress".to_string())
        .spawn(move || {
            let start_time = Instant::now();
            let pb = ProgressBar::new(planned_runtime.as_secs());
            pb.set_style(style);

            loop {
                if shutdown_listener.should_shutdown() {
                    log::trace!("Progress thread shutting down");
                    pb.finish_and_clear();
                    break;
                }

                pb.set_position(min(
                    start_time.elapsed().as_secs(),
                    planned_runtime.as_secs(),
                ));
                pb.set_message(format!(
                    "workers: {} | ok: {} | failed: {}",
                    state.active_workers(),
                    state.ok_total(),
                    state.failed_total()
                ));
                std::thread::sleep(REFRESH_INTERVAL);
            }
        })
        .context("Failed to start progress thread")
}
