use tracing::debug;

use crate::geometry::Vec2;
use crate::path::PathPriority;
use crate::state::{EventResult, State, StateEvent, StateResult};

use super::{MoveContext, MoveToPosition, MovementTuning};

/// What the follower can see of its target this tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FollowTarget {
    pub position: Vec2,
    pub radius: f32,
    /// Movable targets are never considered arrived at; the follower keeps
    /// shadowing them.
    pub movable: bool,
}

/// Movement context plus the owner's fresh sample of the followed entity.
/// `target` is `None` once the entity is gone.
pub struct FollowContext<'a> {
    pub movement: MoveContext<'a>,
    pub target: Option<FollowTarget>,
}

impl<'a> FollowContext<'a> {
    pub fn new(movement: MoveContext<'a>, target: Option<FollowTarget>) -> Self {
        Self { movement, target }
    }
}

#[derive(Debug, Clone)]
pub struct MoveToTarget {
    result: StateResult,
    tuning: MovementTuning,
    priority: PathPriority,
    follow_distance: f32,
    snapshot: Option<Vec2>,
    since_activation: f32,
    inner: Option<MoveToPosition>,
    activations: u32,
    stalled_reroutes: u32,
}

impl MoveToTarget {
    pub fn new(tuning: &MovementTuning) -> Self {
        Self {
            result: StateResult::Inactive,
            tuning: *tuning,
            priority: PathPriority::Normal,
            follow_distance: tuning.follow_distance,
            snapshot: None,
            // The first activation is never held back by the cooldown.
            since_activation: tuning.reactivation_cooldown_seconds,
            inner: None,
            activations: 0,
            stalled_reroutes: 0,
        }
    }

    pub fn with_follow_distance(mut self, follow_distance: f32) -> Self {
        self.follow_distance = follow_distance.max(0.0);
        self
    }

    pub fn with_priority(mut self, priority: PathPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn follow_distance(&self) -> f32 {
        self.follow_distance
    }

    pub fn snapshot(&self) -> Option<Vec2> {
        self.snapshot
    }

    pub fn activations(&self) -> u32 {
        self.activations
    }

    pub fn has_inner_move(&self) -> bool {
        self.inner.is_some()
    }

    fn cooldown_elapsed(&self) -> bool {
        self.since_activation >= self.tuning.reactivation_cooldown_seconds
    }

    fn gap_to(&self, ctx: &FollowContext<'_>, target: &FollowTarget) -> f32 {
        let center = ctx.movement.mover.position().distance(target.position);
        (center - target.radius - ctx.movement.mover.brush().radius).max(0.0)
    }

    fn drop_inner(&mut self, ctx: &mut FollowContext<'_>) {
        if let Some(mut inner) = self.inner.take() {
            inner.terminate(&mut ctx.movement);
        }
    }

    fn restart_inner(&mut self, ctx: &mut FollowContext<'_>, target: FollowTarget) {
        self.drop_inner(ctx);
        self.snapshot = Some(target.position);
        self.since_activation = 0.0;
        self.activations = self.activations.saturating_add(1);
        self.inner =
            Some(MoveToPosition::new(target.position, &self.tuning).with_priority(self.priority));
        debug!(
            mover = ctx.movement.mover.id().0,
            target_x = target.position.x,
            target_y = target.position.y,
            activations = self.activations,
            "follow_move_started"
        );
    }

    fn fail(&mut self, ctx: &mut FollowContext<'_>) -> StateResult {
        self.drop_inner(ctx);
        self.result = StateResult::Failed;
        self.result
    }
}

impl<'a> State<FollowContext<'a>> for MoveToTarget {
    fn result(&self) -> StateResult {
        self.result
    }

    fn set_result(&mut self, result: StateResult) {
        self.result = result;
    }

    fn activate(&mut self, ctx: &mut FollowContext<'a>) {
        let Some(target) = ctx.target else {
            self.result = StateResult::Failed;
            return;
        };
        if self.cooldown_elapsed() {
            self.restart_inner(ctx, target);
        }
    }

    fn update(&mut self, ctx: &mut FollowContext<'a>, dt: f32) -> StateResult {
        self.since_activation += dt.max(0.0);
        self.activate_if_inactive(ctx);
        if self.result.is_terminal() {
            return self.result;
        }

        let Some(target) = ctx.target else {
            return self.fail(ctx);
        };

        let gap = self.gap_to(ctx, &target);
        let arrived = gap <= self.follow_distance;
        let target_drifted = self
            .snapshot
            .map_or(true, |snapshot| {
                snapshot.distance(target.position) > self.tuning.target_sensor_distance
            });

        if arrived {
            self.stalled_reroutes = 0;
            self.drop_inner(ctx);
            ctx.movement.mover.face_toward(target.position);
            if !target.movable {
                self.result = StateResult::Completed;
                return self.result;
            }
            return StateResult::Active;
        }

        if (target_drifted || self.inner.is_none()) && self.cooldown_elapsed() {
            self.restart_inner(ctx, target);
        }

        let Some(inner) = self.inner.as_mut() else {
            ctx.movement.mover.face_toward(target.position);
            return StateResult::Active;
        };

        match inner.update(&mut ctx.movement, dt) {
            StateResult::Failed => {
                self.inner = None;
                self.result = StateResult::Failed;
                StateResult::Failed
            }
            StateResult::Completed => {
                // Reached the snapshot without arriving. A target that kept going
                // gets another route after the cooldown; one that stayed put is
                // out of reach after a few tries.
                self.inner = None;
                let target_held_still = self.snapshot.is_some_and(|snapshot| {
                    snapshot.distance(target.position) <= self.tuning.target_sensor_distance
                });
                if target_held_still {
                    self.stalled_reroutes = self.stalled_reroutes.saturating_add(1);
                    if self.stalled_reroutes > self.tuning.max_stalled_reroutes {
                        debug!(
                            mover = ctx.movement.mover.id().0,
                            gap, reroutes = self.stalled_reroutes, "follow_stalled_short_of_target"
                        );
                        self.result = StateResult::Failed;
                        return StateResult::Failed;
                    }
                }
                StateResult::Active
            }
            StateResult::Active | StateResult::Inactive => StateResult::Active,
        }
    }

    fn terminate(&mut self, ctx: &mut FollowContext<'a>) {
        self.drop_inner(ctx);
    }

    fn handle_event(&mut self, ctx: &mut FollowContext<'a>, event: &StateEvent) -> EventResult {
        match self.inner.as_mut() {
            Some(inner) => inner.handle_event(&mut ctx.movement, event),
            None => EventResult::Unhandled,
        }
    }
}
