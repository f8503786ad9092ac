use std::env;
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use super::metrics::MetricsAccumulator;
use super::MetricsHandle;

pub const SLOW_TICK_ENV_VAR: &str = "SKIRMISH_SLOW_TICK_MS";

/// One fixed-timestep simulation driven by the loop runner.
pub trait SimulationStep {
    fn step(&mut self, fixed_dt_seconds: f32);

    fn entity_count(&self) -> usize;

    /// Stops the loop early, e.g. once a player has won.
    fn is_finished(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    pub target_tps: u32,
    /// Hard stop after this many ticks. Required when not running in real time.
    pub max_ticks: Option<u64>,
    /// Pace ticks against the wall clock instead of running flat out.
    pub realtime: bool,
    #[serde(with = "duration_millis")]
    pub max_frame_delta: Duration,
    pub max_ticks_per_frame: u32,
    #[serde(with = "duration_millis")]
    pub metrics_log_interval: Duration,
    pub simulated_slow_tick_ms: u64,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            target_tps: 30,
            max_ticks: Some(30 * 60 * 5),
            realtime: false,
            max_frame_delta: Duration::from_millis(250),
            max_ticks_per_frame: 5,
            metrics_log_interval: Duration::from_secs(1),
            simulated_slow_tick_ms: 0,
        }
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[derive(Debug, Error)]
pub enum LoopError {
    #[error("a loop that is not paced in real time needs max_ticks to terminate")]
    Unbounded,
    #[error("max_ticks must be greater than zero")]
    ZeroTickBudget,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopReport {
    pub ticks: u64,
    pub simulated_seconds: f64,
    pub finished_early: bool,
    pub dropped_backlog: Duration,
}

pub fn run_headless<S: SimulationStep>(
    config: &LoopConfig,
    sim: &mut S,
) -> Result<LoopReport, LoopError> {
    run_headless_with_metrics(config, sim, &MetricsHandle::default())
}

pub fn run_headless_with_metrics<S: SimulationStep>(
    config: &LoopConfig,
    sim: &mut S,
    metrics_handle: &MetricsHandle,
) -> Result<LoopReport, LoopError> {
    match config.max_ticks {
        Some(0) => return Err(LoopError::ZeroTickBudget),
        None if !config.realtime => return Err(LoopError::Unbounded),
        _ => {}
    }

    let target_tps = config.target_tps.max(1);
    let max_frame_delta =
        normalize_non_zero_duration(config.max_frame_delta, Duration::from_millis(250));
    let max_ticks_per_frame = config.max_ticks_per_frame.max(1);
    let metrics_log_interval =
        normalize_non_zero_duration(config.metrics_log_interval, Duration::from_secs(1));
    let fixed_dt = Duration::from_secs_f64(1.0 / target_tps as f64);
    let fixed_dt_seconds = fixed_dt.as_secs_f32();
    let slow_tick_delay = resolve_slow_tick_delay(config.simulated_slow_tick_ms);

    info!(
        target_tps,
        max_ticks = ?config.max_ticks,
        realtime = config.realtime,
        max_frame_delta_ms = max_frame_delta.as_millis() as u64,
        max_ticks_per_frame,
        metrics_log_interval_ms = metrics_log_interval.as_millis() as u64,
        slow_tick_delay_ms = slow_tick_delay.as_millis() as u64,
        "loop_config"
    );

    let mut metrics_accumulator = MetricsAccumulator::new(metrics_log_interval);
    let mut report = LoopReport {
        ticks: 0,
        simulated_seconds: 0.0,
        finished_early: false,
        dropped_backlog: Duration::ZERO,
    };
    let budget_left = |report: &LoopReport| config.max_ticks.map_or(true, |max| report.ticks < max);

    let mut run_tick = |sim: &mut S, report: &mut LoopReport| {
        if slow_tick_delay > Duration::ZERO {
            // Explicit debug perturbation only.
            thread::sleep(slow_tick_delay);
        }
        let started = Instant::now();
        sim.step(fixed_dt_seconds);
        metrics_accumulator.record_tick(started.elapsed());
        report.ticks += 1;
        report.simulated_seconds += fixed_dt.as_secs_f64();

        let now = Instant::now();
        if let Some(snapshot) = metrics_accumulator.maybe_snapshot(now) {
            metrics_handle.publish(snapshot);
            info!(
                tps = snapshot.tps,
                tick_time_ms = snapshot.tick_time_ms,
                total_ticks = snapshot.total_ticks,
                entity_count = sim.entity_count(),
                "loop_metrics"
            );
        }
    };

    if config.realtime {
        let mut accumulator = Duration::ZERO;
        let mut last_frame_instant = Instant::now();
        while budget_left(&report) && !sim.is_finished() {
            let now = Instant::now();
            let raw_frame_dt = now.saturating_duration_since(last_frame_instant);
            last_frame_instant = now;
            let frame_dt = clamp_frame_delta(raw_frame_dt, max_frame_delta);
            accumulator = accumulator.saturating_add(frame_dt);

            let step_plan = plan_sim_steps(accumulator, fixed_dt, max_ticks_per_frame);
            for _ in 0..step_plan.ticks_to_run {
                if !budget_left(&report) || sim.is_finished() {
                    break;
                }
                run_tick(sim, &mut report);
            }
            accumulator = step_plan.remaining_accumulator;

            if step_plan.dropped_backlog > Duration::ZERO {
                let dropped = step_plan.dropped_backlog;
                report.dropped_backlog = report.dropped_backlog.saturating_add(dropped);
                warn!(
                    dropped_backlog_ms = step_plan.dropped_backlog.as_millis() as u64,
                    max_ticks_per_frame, "sim_clamp_triggered"
                );
            }

            let until_next_tick = fixed_dt.saturating_sub(accumulator);
            if until_next_tick > Duration::ZERO {
                thread::sleep(until_next_tick);
            }
        }
    } else {
        while budget_left(&report) && !sim.is_finished() {
            run_tick(sim, &mut report);
        }
    }

    report.finished_early = sim.is_finished();
    let final_snapshot = metrics_accumulator.take_snapshot(Instant::now());
    metrics_handle.publish(final_snapshot);
    info!(
        ticks = report.ticks,
        simulated_seconds = report.simulated_seconds,
        finished_early = report.finished_early,
        entity_count = sim.entity_count(),
        "loop_finished"
    );
    Ok(report)
}

#[derive(Debug, Clone, Copy)]
struct StepPlan {
    ticks_to_run: u32,
    remaining_accumulator: Duration,
    dropped_backlog: Duration,
}

fn plan_sim_steps(
    mut accumulator: Duration,
    fixed_dt: Duration,
    max_ticks_per_frame: u32,
) -> StepPlan {
    let mut ticks_to_run = 0u32;

    while accumulator >= fixed_dt && ticks_to_run < max_ticks_per_frame {
        accumulator = accumulator.saturating_sub(fixed_dt);
        ticks_to_run = ticks_to_run.saturating_add(1);
    }

    if accumulator >= fixed_dt {
        StepPlan {
            ticks_to_run,
            remaining_accumulator: Duration::ZERO,
            dropped_backlog: accumulator,
        }
    } else {
        StepPlan {
            ticks_to_run,
            remaining_accumulator: accumulator,
            dropped_backlog: Duration::ZERO,
        }
    }
}

fn clamp_frame_delta(frame_dt: Duration, max_frame_delta: Duration) -> Duration {
    frame_dt.min(max_frame_delta)
}

fn normalize_non_zero_duration(value: Duration, fallback: Duration) -> Duration {
    if value.is_zero() {
        fallback
    } else {
        value
    }
}

fn resolve_slow_tick_delay(config_slow_tick_ms: u64) -> Duration {
    match env::var(SLOW_TICK_ENV_VAR) {
        Ok(value) => match value.parse::<u64>() {
            Ok(ms) => Duration::from_millis(ms),
            Err(_) => {
                warn!(
                    env_var = SLOW_TICK_ENV_VAR,
                    value = value.as_str(),
                    "invalid slow-tick env var value; falling back to config"
                );
                Duration::from_millis(config_slow_tick_ms)
            }
        },
        Err(env::VarError::NotPresent) => Duration::from_millis(config_slow_tick_ms),
        Err(err) => {
            warn!(
                env_var = SLOW_TICK_ENV_VAR,
                error = %err,
                "unable to read slow-tick env var; falling back to config"
            );
            Duration::from_millis(config_slow_tick_ms)
        }
    }
}
