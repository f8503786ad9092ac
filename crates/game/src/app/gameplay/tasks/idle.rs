use std::f32::consts::TAU;

use engine::{Movable, State, StateResult, Vec2};
use tracing::debug;

use super::{TaskContext, UnitCommand};

/// Default task. Soldiers keep an eye out and hand over to an attack when an
/// enemy comes into sight; everyone fidgets now and then.
#[derive(Debug)]
pub(crate) struct IdleTask {
    result: StateResult,
    scan_timer: f32,
    followup: Option<UnitCommand>,
}

impl IdleTask {
    pub(crate) fn new() -> Self {
        Self {
            result: StateResult::Inactive,
            scan_timer: 0.0,
            followup: None,
        }
    }

    pub(crate) fn take_followup(&mut self) -> Option<UnitCommand> {
        self.followup.take()
    }
}

impl<'a> State<TaskContext<'a>> for IdleTask {
    fn result(&self) -> StateResult {
        self.result
    }

    fn set_result(&mut self, result: StateResult) {
        self.result = result;
    }

    fn activate(&mut self, _ctx: &mut TaskContext<'a>) {
        self.scan_timer = 0.0;
        self.followup = None;
    }

    fn update(&mut self, ctx: &mut TaskContext<'a>, dt: f32) -> StateResult {
        self.activate_if_inactive(ctx);
        let Some(kind) = ctx.world.unit(ctx.unit).map(|unit| unit.kind) else {
            self.result = StateResult::Failed;
            return self.result;
        };

        if !kind.is_worker() {
            self.scan_timer -= dt;
            if self.scan_timer <= 0.0 {
                self.scan_timer = ctx.world.config.combat.idle_scan_seconds;
                if let Some(enemy) = ctx.world.visible_enemy(ctx.unit) {
                    debug!(unit = %ctx.unit, enemy = %enemy, "idle_enemy_spotted");
                    self.followup = Some(UnitCommand::Attack {
                        target: Some(enemy),
                        destination: None,
                    });
                    self.result = StateResult::Completed;
                    return self.result;
                }
            }
        }

        let turn_chance = ctx.world.config.combat.idle_turn_chance;
        if ctx.world.rng.chance(turn_chance) {
            let angle = ctx.world.rng.range_f32(0.0, TAU);
            if let Some(unit) = ctx.world.unit_mut(ctx.unit) {
                unit.set_facing(Vec2::new(angle.cos(), angle.sin()));
            }
        }
        self.result
    }
}
