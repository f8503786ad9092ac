use crate::geometry::Vec2;
use crate::state::{State, StateResult};

use super::{MoveContext, MovementTuning};

/// Drives the mover in a straight line to a fixed point.
///
/// When the next step lands on an occupied spot the mover stands still for a
/// randomized while instead of giving up at once; transient congestion usually
/// clears before the wait runs out. The owner lengthens that patience through
/// [`SeekToPosition::with_wait_time`].
#[derive(Debug, Clone)]
pub struct SeekToPosition {
    result: StateResult,
    target: Vec2,
    wait_time: f32,
    blocked_wait_seconds: f32,
    blocked_wait_duration: Option<f32>,
    blocked_elapsed: f32,
}

impl SeekToPosition {
    pub fn new(target: Vec2, tuning: &MovementTuning) -> Self {
        Self {
            result: StateResult::Inactive,
            target,
            wait_time: 0.0,
            blocked_wait_seconds: tuning.blocked_wait_seconds,
            blocked_wait_duration: None,
            blocked_elapsed: 0.0,
        }
    }

    pub fn with_wait_time(mut self, wait_time: f32) -> Self {
        self.wait_time = wait_time.max(0.0);
        self
    }

    pub fn target(&self) -> Vec2 {
        self.target
    }

    pub fn wait_time(&self) -> f32 {
        self.wait_time
    }

    pub fn is_blocked(&self) -> bool {
        self.blocked_wait_duration.is_some()
    }

    fn clear_blockage(&mut self) {
        self.blocked_wait_duration = None;
        self.blocked_elapsed = 0.0;
    }
}

impl<'a> State<MoveContext<'a>> for SeekToPosition {
    fn result(&self) -> StateResult {
        self.result
    }

    fn set_result(&mut self, result: StateResult) {
        self.result = result;
    }

    fn activate(&mut self, _ctx: &mut MoveContext<'a>) {
        self.clear_blockage();
    }

    fn update(&mut self, ctx: &mut MoveContext<'a>, dt: f32) -> StateResult {
        self.activate_if_inactive(ctx);

        let position = ctx.mover.position();
        let Some(direction) = (self.target - position).normalized() else {
            self.result = StateResult::Completed;
            return self.result;
        };
        ctx.mover.set_facing(direction);

        let step = ctx.mover.speed().max(0.0) * dt.max(0.0);
        let remaining = position.distance(self.target);
        let (candidate, arrives) = if step >= remaining {
            (self.target, true)
        } else {
            (position + direction * step, false)
        };

        if ctx.paths.can_be_placed_at(candidate, &*ctx.mover) {
            ctx.mover.set_position(candidate);
            ctx.paths.update_movable(&mut *ctx.mover);
            self.clear_blockage();
            self.result = if arrives {
                StateResult::Completed
            } else {
                StateResult::Active
            };
            return self.result;
        }

        let duration = match self.blocked_wait_duration {
            Some(duration) => duration,
            None => {
                let duration =
                    self.blocked_wait_seconds * ctx.rng.range_f32(0.5, 1.5) + self.wait_time;
                self.blocked_wait_duration = Some(duration);
                duration
            }
        };
        self.blocked_elapsed += dt.max(0.0);
        self.result = if self.blocked_elapsed > duration {
            StateResult::Failed
        } else {
            StateResult::Active
        };
        self.result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::movement::test_support::{ScriptedPaths, TestMover};
    use crate::rng::SimRng;

    fn seek_to(x: f32, y: f32) -> SeekToPosition {
        SeekToPosition::new(Vec2::new(x, y), &MovementTuning::default())
    }

    #[test]
    fn already_at_target_completes_without_moving() {
        let mut mover = TestMover::at(Vec2::new(5.0, 5.0), 10.0);
        let mut paths = ScriptedPaths::open();
        let mut rng = SimRng::seed_from_u64(1);
        let mut seek = seek_to(5.0, 5.0);

        let mut ctx = MoveContext::new(&mut mover, &mut paths, &mut rng);
        assert_eq!(seek.update(&mut ctx, 0.1), StateResult::Completed);
        assert_eq!(seek.update(&mut ctx, 0.1), StateResult::Completed);
        assert_eq!(mover.position, Vec2::new(5.0, 5.0));
        assert_eq!(paths.update_movable_calls, 0);
    }

    #[test]
    fn steps_at_speed_times_dt_and_faces_target() {
        let mut mover = TestMover::at(Vec2::new(0.0, 0.0), 10.0);
        let mut paths = ScriptedPaths::open();
        let mut rng = SimRng::seed_from_u64(1);
        let mut seek = seek_to(100.0, 0.0);

        let mut ctx = MoveContext::new(&mut mover, &mut paths, &mut rng);
        assert_eq!(seek.update(&mut ctx, 0.5), StateResult::Active);
        assert!((mover.position.x - 5.0).abs() < 1e-4);
        assert_eq!(mover.facing, Vec2::new(1.0, 0.0));
        assert_eq!(paths.update_movable_calls, 1);
    }

    #[test]
    fn overshoot_is_clamped_to_target_and_completes() {
        let mut mover = TestMover::at(Vec2::new(0.0, 0.0), 50.0);
        let mut paths = ScriptedPaths::open();
        let mut rng = SimRng::seed_from_u64(1);
        let mut seek = seek_to(3.0, 4.0);

        let mut ctx = MoveContext::new(&mut mover, &mut paths, &mut rng);
        assert_eq!(seek.update(&mut ctx, 1.0), StateResult::Completed);
        assert_eq!(mover.position, Vec2::new(3.0, 4.0));
    }

    #[test]
    fn blocked_step_waits_then_fails_without_moving() {
        let mut mover = TestMover::at(Vec2::new(0.0, 0.0), 10.0);
        let mut paths = ScriptedPaths::open();
        paths.placement_blocked = true;
        let mut rng = SimRng::seed_from_u64(3);
        let mut seek = seek_to(100.0, 0.0);

        let mut ctx = MoveContext::new(&mut mover, &mut paths, &mut rng);
        assert_eq!(seek.update(&mut ctx, 0.1), StateResult::Active);
        assert!(seek.is_blocked());
        let mut ticks = 1;
        let mut result = StateResult::Active;
        while result == StateResult::Active && ticks < 100 {
            result = seek.update(&mut ctx, 0.1);
            ticks += 1;
        }
        assert_eq!(result, StateResult::Failed);
        // Base wait is 0.5s scaled into [0.25, 0.75).
        assert!((3..=8).contains(&ticks), "ticks {ticks}");
        assert_eq!(mover.position, Vec2::new(0.0, 0.0));
        assert_eq!(paths.update_movable_calls, 0);
    }

    #[test]
    fn wait_time_bias_extends_patience() {
        let mut mover = TestMover::at(Vec2::new(0.0, 0.0), 10.0);
        let mut paths = ScriptedPaths::open();
        paths.placement_blocked = true;
        let mut rng = SimRng::seed_from_u64(3);
        let mut seek = seek_to(100.0, 0.0).with_wait_time(2.0);

        let mut ctx = MoveContext::new(&mut mover, &mut paths, &mut rng);
        for _ in 0..20 {
            assert_eq!(seek.update(&mut ctx, 0.1), StateResult::Active);
        }
    }

    #[test]
    fn blockage_clears_once_the_spot_frees_up() {
        let mut mover = TestMover::at(Vec2::new(0.0, 0.0), 10.0);
        let mut paths = ScriptedPaths::open();
        paths.placement_blocked = true;
        let mut rng = SimRng::seed_from_u64(3);
        let mut seek = seek_to(100.0, 0.0);

        {
            let mut ctx = MoveContext::new(&mut mover, &mut paths, &mut rng);
            assert_eq!(seek.update(&mut ctx, 0.1), StateResult::Active);
        }
        paths.placement_blocked = false;
        let mut ctx = MoveContext::new(&mut mover, &mut paths, &mut rng);
        assert_eq!(seek.update(&mut ctx, 0.1), StateResult::Active);
        assert!(!seek.is_blocked());
        assert!(mover.position.x > 0.0);
    }
}
