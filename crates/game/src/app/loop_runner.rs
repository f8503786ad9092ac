use std::process::ExitCode;

use engine::{run_headless_with_metrics, MetricsHandle};
use tracing::{error, info};

use super::bootstrap::AppWiring;
use super::gameplay;

pub(crate) fn run(app: AppWiring) -> ExitCode {
    let loop_config = app.config.run.clone();
    let mut sim = gameplay::build_skirmish(app.config);
    let metrics = MetricsHandle::default();

    match run_headless_with_metrics(&loop_config, &mut sim, &metrics) {
        Ok(report) => {
            let snapshot = metrics.snapshot();
            info!(
                ticks = report.ticks,
                simulated_seconds = report.simulated_seconds,
                decided = report.finished_early,
                winner = ?sim.winner(),
                tps = snapshot.tps,
                tick_time_ms = snapshot.tick_time_ms,
                "run_complete"
            );
            sim.log_summary();
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = %err, "run_failed");
            ExitCode::FAILURE
        }
    }
}
