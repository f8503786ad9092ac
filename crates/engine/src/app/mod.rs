mod loop_runner;
mod metrics;

pub use loop_runner::{
    run_headless, run_headless_with_metrics, LoopConfig, LoopError, LoopReport, SimulationStep,
    SLOW_TICK_ENV_VAR,
};
pub use metrics::{LoopMetricsSnapshot, MetricsHandle};
