use engine::{
    EntityId, EventResult, MoveToPosition, MoveToTarget, State, StateEvent, StateResult, Vec2,
};
use tracing::debug;

use super::{
    drive_follow, drive_move, end_follow, end_move, forward_follow_event, forward_move_event,
    move_to, AttackSpell, TaskContext, UnitCommand,
};

#[derive(Debug)]
enum Phase {
    SeekTarget,
    /// Marching toward the attack destination with no target in sight.
    MoveToPosition(MoveToPosition),
    MoveToTarget {
        target: EntityId,
        follow: MoveToTarget,
    },
    Attack { target: EntityId },
}

/// Fights a given target, or marches to a destination and fights whatever it
/// meets on the way. Ends once nothing hostile is in sight and the
/// destination, if any, has been reached.
#[derive(Debug)]
pub(crate) struct AttackTask {
    result: StateResult,
    target: Option<EntityId>,
    destination: Option<Vec2>,
    phase: Phase,
    spell: Option<AttackSpell>,
    rescan_timer: f32,
    kills: u32,
}

impl AttackTask {
    pub(crate) fn new(target: Option<EntityId>, destination: Option<Vec2>) -> Self {
        Self {
            result: StateResult::Inactive,
            target,
            destination,
            phase: Phase::SeekTarget,
            spell: None,
            rescan_timer: 0.0,
            kills: 0,
        }
    }

    pub(crate) fn current_target(&self) -> Option<EntityId> {
        match self.phase {
            Phase::MoveToTarget { target, .. } | Phase::Attack { target } => Some(target),
            Phase::SeekTarget | Phase::MoveToPosition(_) => None,
        }
    }

    #[cfg(test)]
    pub(crate) fn kills(&self) -> u32 {
        self.kills
    }

    pub(crate) fn resume_command(&self) -> Option<UnitCommand> {
        let target = self.current_target().or(self.target);
        if target.is_none() && self.destination.is_none() {
            return None;
        }
        Some(UnitCommand::Attack {
            target,
            destination: self.destination,
        })
    }

    fn chase(&self, ctx: &TaskContext<'_>, target: EntityId) -> Phase {
        Phase::MoveToTarget {
            target,
            follow: MoveToTarget::new(&ctx.world.config.movement).with_follow_distance(0.0),
        }
    }

    fn in_range(&self, ctx: &TaskContext<'_>, target: EntityId, slack: f32) -> bool {
        let range = self.spell.as_ref().map_or(0.0, AttackSpell::range);
        ctx.world
            .gap_between(ctx.unit, target)
            .is_some_and(|gap| gap <= range + slack)
    }

    fn target_is_building(ctx: &TaskContext<'_>, target: EntityId) -> bool {
        ctx.world.building(target).is_some()
    }

    /// A hostile unit in sight, for attackers busy with a building.
    fn rescan_for_units(&mut self, ctx: &TaskContext<'_>, dt: f32) -> Option<EntityId> {
        self.rescan_timer -= dt;
        if self.rescan_timer > 0.0 {
            return None;
        }
        self.rescan_timer = ctx.world.config.combat.target_rescan_seconds;
        ctx.world
            .visible_enemy(ctx.unit)
            .filter(|enemy| ctx.world.unit(*enemy).is_some())
    }

    fn step(&mut self, ctx: &mut TaskContext<'_>, phase: Phase, dt: f32) -> Phase {
        match phase {
            Phase::SeekTarget => {
                if let Some(enemy) = ctx.world.visible_enemy(ctx.unit) {
                    return self.chase(ctx, enemy);
                }
                let Some(destination) = self.destination else {
                    self.result = StateResult::Completed;
                    return Phase::SeekTarget;
                };
                let reach = ctx.world.config.world.cell_size;
                let arrived = ctx
                    .world
                    .unit(ctx.unit)
                    .map_or(true, |unit| unit.position.distance(destination) <= reach);
                if arrived {
                    self.destination = None;
                    self.result = StateResult::Completed;
                    return Phase::SeekTarget;
                }
                Phase::MoveToPosition(move_to(ctx.world, destination))
            }
            Phase::MoveToPosition(mut movement) => {
                if let Some(enemy) = self.rescan_for_units(ctx, dt) {
                    end_move(ctx, &mut movement);
                    return self.chase(ctx, enemy);
                }
                match drive_move(ctx, &mut movement, dt) {
                    StateResult::Completed => {
                        end_move(ctx, &mut movement);
                        self.destination = None;
                        Phase::SeekTarget
                    }
                    StateResult::Failed => {
                        end_move(ctx, &mut movement);
                        debug!(unit = %ctx.unit, "attack_march_failed");
                        self.result = StateResult::Failed;
                        Phase::SeekTarget
                    }
                    _ => Phase::MoveToPosition(movement),
                }
            }
            Phase::MoveToTarget { target, mut follow } => {
                if !ctx.world.is_alive(target) {
                    end_follow(ctx, &mut follow, target);
                    return Phase::SeekTarget;
                }
                if self.in_range(ctx, target, 0.0) {
                    end_follow(ctx, &mut follow, target);
                    return Phase::Attack { target };
                }
                match drive_follow(ctx, &mut follow, target, dt) {
                    StateResult::Failed => {
                        end_follow(ctx, &mut follow, target);
                        debug!(unit = %ctx.unit, target = %target, "attack_chase_failed");
                        self.result = StateResult::Failed;
                        Phase::SeekTarget
                    }
                    StateResult::Completed => {
                        end_follow(ctx, &mut follow, target);
                        Phase::Attack { target }
                    }
                    _ => Phase::MoveToTarget { target, follow },
                }
            }
            Phase::Attack { target } => {
                if !ctx.world.is_alive(target) {
                    debug!(unit = %ctx.unit, target = %target, "attack_target_lost");
                    return Phase::SeekTarget;
                }
                let slack = ctx.world.config.combat.range_slack;
                if !self.in_range(ctx, target, slack) {
                    return self.chase(ctx, target);
                }
                if Self::target_is_building(ctx, target) {
                    if let Some(enemy) = self.rescan_for_units(ctx, dt) {
                        return self.chase(ctx, enemy);
                    }
                }
                ctx.world.face_entity(ctx.unit, target);
                if let Some(raw) = self.spell.as_mut().and_then(AttackSpell::try_fire) {
                    ctx.world.apply_attack(ctx.unit, target, raw);
                    if !ctx.world.is_alive(target) {
                        self.kills += 1;
                        debug!(
                            unit = %ctx.unit,
                            target = %target,
                            kills = self.kills,
                            "attack_target_down"
                        );
                        return Phase::SeekTarget;
                    }
                }
                Phase::Attack { target }
            }
        }
    }
}

impl<'a> State<TaskContext<'a>> for AttackTask {
    fn result(&self) -> StateResult {
        self.result
    }

    fn set_result(&mut self, result: StateResult) {
        self.result = result;
    }

    fn activate(&mut self, ctx: &mut TaskContext<'a>) {
        let Some(unit) = ctx.world.unit(ctx.unit) else {
            self.result = StateResult::Failed;
            return;
        };
        let weapons = ctx
            .world
            .player(unit.owner)
            .map_or(0, |player| player.weapons_level);
        let bonus = weapons as f32 * ctx.world.config.combat.upgrade_step;
        self.spell = Some(AttackSpell::new(ctx.world.config.units.stats(unit.kind), bonus));
        self.rescan_timer = 0.0;
        self.phase = match self.target.filter(|target| ctx.world.is_alive(*target)) {
            Some(target) => self.chase(ctx, target),
            None => Phase::SeekTarget,
        };
    }

    fn update(&mut self, ctx: &mut TaskContext<'a>, dt: f32) -> StateResult {
        self.activate_if_inactive(ctx);
        if self.result.is_terminal() {
            return self.result;
        }
        if let Some(spell) = self.spell.as_mut() {
            spell.tick(dt);
        }
        let phase = std::mem::replace(&mut self.phase, Phase::SeekTarget);
        self.phase = self.step(ctx, phase, dt);
        self.result
    }

    fn terminate(&mut self, ctx: &mut TaskContext<'a>) {
        match std::mem::replace(&mut self.phase, Phase::SeekTarget) {
            Phase::MoveToPosition(mut movement) => end_move(ctx, &mut movement),
            Phase::MoveToTarget { target, mut follow } => {
                end_follow(ctx, &mut follow, target);
                self.target = Some(target);
            }
            Phase::Attack { target } => self.target = Some(target),
            Phase::SeekTarget => {}
        }
    }

    fn handle_event(&mut self, ctx: &mut TaskContext<'a>, event: &StateEvent) -> EventResult {
        match &mut self.phase {
            Phase::MoveToPosition(movement) => forward_move_event(ctx, movement, event),
            Phase::MoveToTarget { target, follow } => {
                let target = *target;
                forward_follow_event(ctx, follow, target, event)
            }
            _ => EventResult::Unhandled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::gameplay::types::{BuildingKind, UnitKind};
    use crate::app::gameplay::world::test_support::{world, ENEMY, HOME};
    use crate::app::gameplay::world::World;

    fn drive(task: &mut AttackTask, world: &mut World, unit: EntityId, ticks: u32) -> StateResult {
        let mut result = StateResult::Active;
        for _ in 0..ticks {
            world.paths.process_queries();
            let mut ctx = TaskContext::new(world, unit);
            result = task.update(&mut ctx, 0.1);
            if result.is_terminal() {
                break;
            }
        }
        result
    }

    #[test]
    fn footman_closes_in_and_kills_a_peasant() {
        let mut world = world();
        let footman = world.spawn_unit(HOME, UnitKind::Footman, Vec2::new(100.0, 100.0));
        let victim = world.spawn_unit(ENEMY, UnitKind::Peasant, Vec2::new(160.0, 100.0));
        let mut task = AttackTask::new(Some(victim), None);

        let result = drive(&mut task, &mut world, footman, 400);
        assert_eq!(result, StateResult::Completed);
        assert_eq!(task.kills(), 1);
        assert!(!world.is_alive(victim));
    }

    #[test]
    fn a_target_finished_off_by_someone_else_is_not_a_kill() {
        let mut world = world();
        let footman = world.spawn_unit(HOME, UnitKind::Footman, Vec2::new(100.0, 100.0));
        let victim = world.spawn_unit(ENEMY, UnitKind::Peasant, Vec2::new(110.0, 100.0));
        let mut task = AttackTask::new(Some(victim), None);
        drive(&mut task, &mut world, footman, 2);
        assert_eq!(task.current_target(), Some(victim));

        world.damage(victim, 1000.0);
        let result = drive(&mut task, &mut world, footman, 5);
        assert_eq!(result, StateResult::Completed);
        assert_eq!(task.kills(), 0);
    }

    #[test]
    fn attacker_drops_a_building_for_a_unit_in_sight() {
        let mut world = world();
        let footman = world.spawn_unit(HOME, UnitKind::Footman, Vec2::new(204.0, 180.0));
        let farm = world.spawn_building(ENEMY, BuildingKind::Farm, Vec2::new(204.0, 204.0), true);
        let mut task = AttackTask::new(Some(farm), None);
        drive(&mut task, &mut world, footman, 30);
        assert_eq!(task.current_target(), Some(farm));

        let defender = world.spawn_unit(ENEMY, UnitKind::Peasant, Vec2::new(236.0, 180.0));
        drive(&mut task, &mut world, footman, 15);
        assert_eq!(task.current_target(), Some(defender));
    }

    #[test]
    fn attack_move_completes_at_an_empty_destination() {
        let mut world = world();
        let footman = world.spawn_unit(HOME, UnitKind::Footman, Vec2::new(100.0, 100.0));
        let mut task = AttackTask::new(None, Some(Vec2::new(140.0, 100.0)));
        let result = drive(&mut task, &mut world, footman, 100);
        assert_eq!(result, StateResult::Completed);
        let position = world.unit(footman).expect("footman").position;
        assert!(position.distance(Vec2::new(140.0, 100.0)) <= world.config.world.cell_size);
        assert_eq!(task.resume_command(), None);
    }

    #[test]
    fn interrupted_attack_resumes_against_the_same_target() {
        let mut world = world();
        let footman = world.spawn_unit(HOME, UnitKind::Footman, Vec2::new(100.0, 100.0));
        let victim = world.spawn_unit(ENEMY, UnitKind::Footman, Vec2::new(300.0, 100.0));
        let mut task = AttackTask::new(Some(victim), None);
        drive(&mut task, &mut world, footman, 3);
        let mut ctx = TaskContext::new(&mut world, footman);
        task.terminate(&mut ctx);
        assert_eq!(
            task.resume_command(),
            Some(UnitCommand::Attack {
                target: Some(victim),
                destination: None,
            })
        );
    }
}
