use engine::{EntityId, EventResult, MoveToPosition, SlotClaim, State, StateEvent, StateResult};
use tracing::debug;

use super::{drive_move, end_move, forward_move_event, move_to, TaskContext};
use crate::app::gameplay::world::RepairOutcome;

#[derive(Debug)]
enum Phase {
    MoveToSite(MoveToPosition),
    Repair { claim: SlotClaim, elapsed: f32 },
    Done,
}

/// Restores a finished building's health, paying a share of its price per
/// work cycle. Stops once the building is whole or the owner runs dry.
#[derive(Debug)]
pub(crate) struct RepairTask {
    result: StateResult,
    building: EntityId,
    phase: Phase,
    cycles: u32,
}

impl RepairTask {
    pub(crate) fn new(building: EntityId) -> Self {
        Self {
            result: StateResult::Inactive,
            building,
            phase: Phase::Done,
            cycles: 0,
        }
    }

    pub(crate) fn building(&self) -> EntityId {
        self.building
    }

    #[cfg(test)]
    pub(crate) fn cycles(&self) -> u32 {
        self.cycles
    }

    fn finish(&mut self, ctx: &mut TaskContext<'_>, phase: Phase, result: StateResult) -> Phase {
        if let Phase::MoveToSite(mut movement) = phase {
            end_move(ctx, &mut movement);
        }
        self.result = result;
        Phase::Done
    }

    fn step(&mut self, ctx: &mut TaskContext<'_>, phase: Phase, dt: f32) -> Phase {
        let damaged = match ctx.world.building(self.building) {
            Some(site) => site.is_damaged(),
            None => return self.finish(ctx, phase, StateResult::Failed),
        };
        if !damaged {
            return self.finish(ctx, phase, StateResult::Completed);
        }
        let tolerance = ctx.world.config.harvest.reach_tolerance;

        match phase {
            Phase::MoveToSite(mut movement) => {
                if !ctx.world.reaches(ctx.unit, self.building, tolerance) {
                    let moved = drive_move(ctx, &mut movement, dt);
                    if !moved.is_terminal() {
                        return Phase::MoveToSite(movement);
                    }
                    if !ctx.world.reaches(ctx.unit, self.building, tolerance) {
                        debug!(
                            unit = %ctx.unit,
                            building = %self.building,
                            "repair_site_unreachable"
                        );
                        return self.finish(ctx, Phase::MoveToSite(movement), StateResult::Failed);
                    }
                }
                end_move(ctx, &mut movement);
                match ctx
                    .world
                    .building(self.building)
                    .and_then(|site| site.builders.try_claim())
                {
                    Some(claim) => Phase::Repair {
                        claim,
                        elapsed: 0.0,
                    },
                    None => self.finish(ctx, Phase::Done, StateResult::Failed),
                }
            }
            Phase::Repair { claim, elapsed } => {
                ctx.world.face_entity(ctx.unit, self.building);
                let cycle = ctx.world.config.buildings.work_cycle_seconds;
                let mut elapsed = elapsed + dt;
                if elapsed < cycle {
                    return Phase::Repair { claim, elapsed };
                }
                elapsed -= cycle;
                self.cycles += 1;
                match ctx.world.repair_building(self.building, cycle) {
                    RepairOutcome::Repaired { whole: false } => Phase::Repair { claim, elapsed },
                    RepairOutcome::Repaired { whole: true } => {
                        self.finish(ctx, Phase::Done, StateResult::Completed)
                    }
                    RepairOutcome::Unaffordable => {
                        debug!(unit = %ctx.unit, building = %self.building, "repair_unaffordable");
                        self.finish(ctx, Phase::Done, StateResult::Failed)
                    }
                    RepairOutcome::Missing => self.finish(ctx, Phase::Done, StateResult::Failed),
                }
            }
            Phase::Done => Phase::Done,
        }
    }
}

impl<'a> State<TaskContext<'a>> for RepairTask {
    fn result(&self) -> StateResult {
        self.result
    }

    fn set_result(&mut self, result: StateResult) {
        self.result = result;
    }

    fn activate(&mut self, ctx: &mut TaskContext<'a>) {
        match ctx.world.building(self.building).map(|site| site.position) {
            Some(position) => self.phase = Phase::MoveToSite(move_to(ctx.world, position)),
            None => self.result = StateResult::Failed,
        }
    }

    fn update(&mut self, ctx: &mut TaskContext<'a>, dt: f32) -> StateResult {
        self.activate_if_inactive(ctx);
        if self.result.is_terminal() {
            return self.result;
        }
        let phase = std::mem::replace(&mut self.phase, Phase::Done);
        self.phase = self.step(ctx, phase, dt);
        self.result
    }

    fn terminate(&mut self, ctx: &mut TaskContext<'a>) {
        if let Phase::MoveToSite(mut movement) = std::mem::replace(&mut self.phase, Phase::Done) {
            end_move(ctx, &mut movement);
        }
    }

    fn handle_event(&mut self, ctx: &mut TaskContext<'a>, event: &StateEvent) -> EventResult {
        match &mut self.phase {
            Phase::MoveToSite(movement) => forward_move_event(ctx, movement, event),
            _ => EventResult::Unhandled,
        }
    }
}

#[cfg(test)]
mod tests {
    use engine::Vec2;

    use super::*;
    use crate::app::gameplay::types::{BuildingKind, Stockpile, UnitKind};
    use crate::app::gameplay::world::test_support::{world, HOME};

    fn run(
        task: &mut RepairTask,
        world: &mut crate::app::gameplay::world::World,
        unit: EntityId,
    ) -> StateResult {
        for _ in 0..500 {
            world.paths.process_queries();
            let mut ctx = TaskContext::new(world, unit);
            let result = task.update(&mut ctx, 0.1);
            if result.is_terminal() {
                let mut ctx = TaskContext::new(world, unit);
                task.terminate(&mut ctx);
                return result;
            }
        }
        StateResult::Active
    }

    #[test]
    fn repair_restores_full_health_and_costs_resources() {
        let mut world = world();
        let farm = world.spawn_building(HOME, BuildingKind::Farm, Vec2::new(204.0, 204.0), true);
        world.damage(farm, 100.0);
        let peasant = world.spawn_unit(HOME, UnitKind::Peasant, Vec2::new(204.0, 220.0));
        let before = world.player(HOME).expect("home").stock;

        let mut task = RepairTask::new(farm);
        assert_eq!(run(&mut task, &mut world, peasant), StateResult::Completed);

        let site = world.building(farm).expect("farm");
        assert_eq!(site.health, site.max_health);
        assert_eq!(site.builders.claimed(), 0);
        let after = world.player(HOME).expect("home").stock;
        assert!(after.gold < before.gold);
        assert!(task.cycles() > 0);
    }

    #[test]
    fn repair_stops_when_the_owner_is_broke() {
        let mut world = world();
        let farm = world.spawn_building(HOME, BuildingKind::Farm, Vec2::new(204.0, 204.0), true);
        world.damage(farm, 200.0);
        world.player_mut(HOME).expect("home").stock = Stockpile::new(0, 0);
        let peasant = world.spawn_unit(HOME, UnitKind::Peasant, Vec2::new(204.0, 220.0));

        let mut task = RepairTask::new(farm);
        assert_eq!(run(&mut task, &mut world, peasant), StateResult::Failed);
        let site = world.building(farm).expect("farm");
        assert!(site.health < site.max_health);
        assert_eq!(site.builders.claimed(), 0);
    }
}
