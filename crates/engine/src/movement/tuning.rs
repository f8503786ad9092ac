use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MovementTuning {
    /// Seek failures and unresolvable queries tolerated before a move fails.
    pub max_retry_times: u32,
    /// Extra blocked-wait patience added per retry, in seconds.
    pub retry_wait_step_seconds: f32,
    /// Mean randomized wait before a blocked seek gives up, in seconds.
    pub blocked_wait_seconds: f32,
    pub follow_distance: f32,
    /// How far a followed target may drift before a new route is requested.
    pub target_sensor_distance: f32,
    pub reactivation_cooldown_seconds: f32,
    /// Routes a follower may finish short of a target that stayed put before
    /// the follow fails.
    pub max_stalled_reroutes: u32,
}

impl Default for MovementTuning {
    fn default() -> Self {
        Self {
            max_retry_times: 20,
            retry_wait_step_seconds: 0.1,
            blocked_wait_seconds: 0.5,
            follow_distance: 30.0,
            target_sensor_distance: 10.0,
            reactivation_cooldown_seconds: 2.0,
            max_stalled_reroutes: 3,
        }
    }
}
