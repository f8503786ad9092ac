use engine::{EntityId, EventResult, MoveToPosition, SlotClaim, State, StateEvent, StateResult};
use tracing::debug;

use super::{drive_move, end_move, forward_move_event, move_to, TaskContext};

#[derive(Debug)]
enum Phase {
    MoveToSite(MoveToPosition),
    Build { claim: SlotClaim, elapsed: f32 },
    Done,
}

/// Walks to an unfinished building and works on it until it stands. Builders
/// hold a slot on the building only while they are actually working.
#[derive(Debug)]
pub(crate) struct ConstructTask {
    result: StateResult,
    building: EntityId,
    phase: Phase,
}

impl ConstructTask {
    pub(crate) fn new(building: EntityId) -> Self {
        Self {
            result: StateResult::Inactive,
            building,
            phase: Phase::Done,
        }
    }

    pub(crate) fn building(&self) -> EntityId {
        self.building
    }

    #[cfg(test)]
    pub(crate) fn is_building(&self) -> bool {
        matches!(self.phase, Phase::Build { .. })
    }

    fn finish(&mut self, result: StateResult) -> Phase {
        self.result = result;
        Phase::Done
    }

    fn step(&mut self, ctx: &mut TaskContext<'_>, phase: Phase, dt: f32) -> Phase {
        let outcome = match ctx.world.building(self.building) {
            None => Some(StateResult::Failed),
            Some(site) if site.is_complete() => Some(StateResult::Completed),
            Some(_) => None,
        };
        if let Some(outcome) = outcome {
            if let Phase::MoveToSite(mut movement) = phase {
                end_move(ctx, &mut movement);
            }
            return self.finish(outcome);
        }
        let tolerance = ctx.world.config.harvest.reach_tolerance;

        match phase {
            Phase::MoveToSite(mut movement) => {
                let mut arrived = ctx.world.reaches(ctx.unit, self.building, tolerance);
                if !arrived {
                    match drive_move(ctx, &mut movement, dt) {
                        StateResult::Completed | StateResult::Failed => {
                            arrived = ctx.world.reaches(ctx.unit, self.building, tolerance);
                            if !arrived {
                                end_move(ctx, &mut movement);
                                debug!(
                                    unit = %ctx.unit,
                                    building = %self.building,
                                    "construct_site_unreachable"
                                );
                                return self.finish(StateResult::Failed);
                            }
                        }
                        _ => return Phase::MoveToSite(movement),
                    }
                }
                end_move(ctx, &mut movement);
                let claim = ctx
                    .world
                    .building(self.building)
                    .and_then(|site| site.builders.try_claim());
                match claim {
                    Some(claim) => Phase::Build {
                        claim,
                        elapsed: 0.0,
                    },
                    None => {
                        debug!(
                            unit = %ctx.unit,
                            building = %self.building,
                            "construct_site_crowded"
                        );
                        self.finish(StateResult::Failed)
                    }
                }
            }
            Phase::Build { claim, elapsed } => {
                ctx.world.face_entity(ctx.unit, self.building);
                let cycle = ctx.world.config.buildings.work_cycle_seconds;
                let mut elapsed = elapsed + dt;
                if elapsed < cycle {
                    return Phase::Build { claim, elapsed };
                }
                elapsed -= cycle;
                if ctx.world.advance_construction(self.building, cycle) {
                    drop(claim);
                    return self.finish(StateResult::Completed);
                }
                Phase::Build { claim, elapsed }
            }
            Phase::Done => self.finish(self.result),
        }
    }
}

impl<'a> State<TaskContext<'a>> for ConstructTask {
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
    use crate::app::gameplay::types::{BuildingKind, UnitKind};
    use crate::app::gameplay::world::test_support::{world, HOME};

    #[test]
    fn builders_finish_the_site_and_release_their_slot() {
        let mut world = world();
        world.config.buildings.farm.build_seconds = 3.0;
        let site = world.spawn_building(HOME, BuildingKind::Farm, Vec2::new(204.0, 204.0), false);
        let peasant = world.spawn_unit(HOME, UnitKind::Peasant, Vec2::new(204.0, 220.0));
        let mut task = ConstructTask::new(site);

        let mut saw_claim = false;
        let mut result = StateResult::Active;
        for _ in 0..100 {
            world.paths.process_queries();
            let mut ctx = TaskContext::new(&mut world, peasant);
            result = task.update(&mut ctx, 0.1);
            saw_claim |= task.is_building();
            if result.is_terminal() {
                break;
            }
        }
        let mut ctx = TaskContext::new(&mut world, peasant);
        task.terminate(&mut ctx);

        assert_eq!(result, StateResult::Completed);
        assert!(saw_claim);
        let farm = world.building(site).expect("farm");
        assert!(farm.is_complete());
        assert_eq!(farm.health, farm.max_health);
        assert_eq!(farm.builders.claimed(), 0);
    }

    #[test]
    fn terminating_mid_build_gives_the_slot_back() {
        let mut world = world();
        let spot = Vec2::new(204.0, 204.0);
        let site = world.spawn_building(HOME, BuildingKind::Barracks, spot, false);
        let peasant = world.spawn_unit(HOME, UnitKind::Peasant, Vec2::new(204.0, 228.0));
        let mut task = ConstructTask::new(site);
        for _ in 0..10 {
            let mut ctx = TaskContext::new(&mut world, peasant);
            task.update(&mut ctx, 0.1);
        }
        assert!(task.is_building());
        assert_eq!(world.building(site).expect("site").builders.claimed(), 1);

        let mut ctx = TaskContext::new(&mut world, peasant);
        task.terminate(&mut ctx);
        assert_eq!(world.building(site).expect("site").builders.claimed(), 0);
    }

    #[test]
    fn vanished_site_fails_the_task() {
        let mut world = world();
        let site = world.spawn_building(HOME, BuildingKind::Farm, Vec2::new(204.0, 204.0), false);
        let peasant = world.spawn_unit(HOME, UnitKind::Peasant, Vec2::new(100.0, 100.0));
        let mut task = ConstructTask::new(site);
        let mut ctx = TaskContext::new(&mut world, peasant);
        task.update(&mut ctx, 0.1);
        world.destroy_building(site);
        let mut ctx = TaskContext::new(&mut world, peasant);
        assert_eq!(task.update(&mut ctx, 0.1), StateResult::Failed);
    }
}
