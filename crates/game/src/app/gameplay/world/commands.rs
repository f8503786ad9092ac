use engine::{EntityId, EventResult, Movable, PathPoll, State, StateEvent, StateResult};
use tracing::{debug, info, trace, warn};

use super::super::tasks::{TaskContext, TaskKind, TaskState, UnitCommand};
use super::{CommandError, World};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CommandMode {
    /// Drop the current task and everything queued.
    Replace,
    /// Run after whatever is already queued; replaces an idle task at once.
    Queue,
}

impl World {
    /// Runs every unit's task for one tick, in id order.
    pub(crate) fn update_units(&mut self, dt: f32) {
        let ids: Vec<EntityId> = self.units.keys().copied().collect();
        for id in ids {
            self.update_unit(id, dt);
        }
    }

    fn update_unit(&mut self, id: EntityId, dt: f32) {
        let Some(mut task) = self.take_task(id) else {
            return;
        };
        let result = {
            let mut ctx = TaskContext::new(self, id);
            task.update(&mut ctx, dt)
        };
        if !result.is_terminal() {
            self.put_task(id, task);
            return;
        }

        let followup = task.take_followup();
        let finished_dying = task.kind() == TaskKind::Die;
        {
            let mut ctx = TaskContext::new(self, id);
            task.terminate(&mut ctx);
        }
        if finished_dying {
            self.remove_unit(id);
            return;
        }
        if result == StateResult::Failed {
            debug!(unit = %id, task = ?task.kind(), "task_failed");
        }
        self.start_next_task(id, followup);
    }

    fn take_task(&mut self, id: EntityId) -> Option<TaskState> {
        let unit = self.units.get_mut(&id)?;
        Some(unit.task.take().unwrap_or_else(TaskState::idle))
    }

    fn put_task(&mut self, id: EntityId, task: TaskState) {
        if let Some(unit) = self.units.get_mut(&id) {
            unit.task = Some(task);
        }
    }

    /// Terminates the unit's current task, if any.
    fn end_current_task(&mut self, id: EntityId) -> Option<TaskState> {
        let mut task = self.units.get_mut(&id)?.task.take()?;
        let mut ctx = TaskContext::new(self, id);
        task.terminate(&mut ctx);
        Some(task)
    }

    /// Picks the next task: the finished task's follow-up, then interrupted
    /// work, then queued commands, then idling. Commands that are no longer
    /// valid are skipped.
    fn start_next_task(&mut self, id: EntityId, mut followup: Option<UnitCommand>) {
        loop {
            let next = match followup.take() {
                Some(command) => Some(command),
                None => self.units.get_mut(&id).and_then(|unit| {
                    unit.resume
                        .pop_front()
                        .or_else(|| unit.commands.pop_front())
                }),
            };
            let Some(command) = next else {
                self.put_task(id, TaskState::idle());
                return;
            };
            match TaskState::from_command(self, id, &command) {
                Ok(task) => {
                    self.put_task(id, task);
                    return;
                }
                Err(error) => {
                    warn!(unit = %id, command = ?command, error = %error, "queued_command_dropped");
                }
            }
        }
    }

    pub(crate) fn issue_command(
        &mut self,
        id: EntityId,
        command: UnitCommand,
        mode: CommandMode,
    ) -> Result<(), CommandError> {
        let Some(unit) = self.units.get(&id).filter(|unit| unit.is_alive()) else {
            return Err(CommandError::UnknownUnit(id));
        };
        let idle = unit.task_kind().map_or(true, |k| k == TaskKind::Idle);
        let task = TaskState::from_command(self, id, &command)?;

        if mode == CommandMode::Queue && !idle {
            if let Some(unit) = self.units.get_mut(&id) {
                unit.commands.push_back(command);
            }
            return Ok(());
        }

        self.end_current_task(id);
        if let Some(unit) = self.units.get_mut(&id) {
            if mode == CommandMode::Replace {
                unit.commands.clear();
                unit.resume.clear();
            }
            unit.task = Some(task);
        }
        debug!(unit = %id, command = ?command, mode = ?mode, "command_issued");
        Ok(())
    }

    /// Runs `command` now and resumes the current task afterwards.
    pub(crate) fn interrupt_with(
        &mut self,
        id: EntityId,
        command: UnitCommand,
    ) -> Result<(), CommandError> {
        if !self.units.get(&id).is_some_and(|unit| unit.is_alive()) {
            return Err(CommandError::UnknownUnit(id));
        }
        let task = TaskState::from_command(self, id, &command)?;
        if let Some(previous) = self.end_current_task(id) {
            let resume = previous.resume_command();
            if let (Some(resume), Some(unit)) = (resume, self.units.get_mut(&id)) {
                unit.resume.push_front(resume);
            }
        }
        self.put_task(id, task);
        debug!(unit = %id, command = ?command, "command_interrupts");
        Ok(())
    }

    /// Hands `event` to the unit's current task.
    pub(crate) fn notify_unit(&mut self, id: EntityId, event: &StateEvent) -> EventResult {
        let Some(mut task) = self.units.get_mut(&id).and_then(|unit| unit.task.take()) else {
            return EventResult::Unhandled;
        };
        let handled = {
            let mut ctx = TaskContext::new(self, id);
            task.handle_event(&mut ctx, event)
        };
        self.put_task(id, task);
        handled
    }

    /// Delivers every path query the service resolved this tick to the unit
    /// that asked for it. Results nobody claims any more are dropped.
    pub(crate) fn deliver_path_results(&mut self) -> usize {
        let mut delivered = 0;
        for (requester, ticket, poll) in self.paths.take_resolved() {
            let event = match poll {
                PathPoll::Found(path) => StateEvent::PathFound { ticket, path },
                PathPoll::NotFound => StateEvent::PathNotFound { ticket },
                PathPoll::Pending | PathPoll::Unknown => continue,
            };
            match self.notify_unit(requester, &event) {
                EventResult::Handled => delivered += 1,
                EventResult::Unhandled => {
                    trace!(unit = %requester, ticket = ticket.0, "path_result_unclaimed");
                }
            }
        }
        delivered
    }

    /// Switches every unit that has run out of health to its dying task.
    pub(crate) fn process_deaths(&mut self) {
        let fallen: Vec<EntityId> = self
            .units
            .values()
            .filter(|unit| !unit.dying && unit.health <= 0.0)
            .map(|unit| unit.id)
            .collect();
        for id in fallen {
            self.end_current_task(id);
            let mut task = TaskState::die();
            {
                let mut ctx = TaskContext::new(self, id);
                task.activate_if_inactive(&mut ctx);
            }
            self.put_task(id, task);
        }
    }

    /// Takes a dead unit off the grid and drops its orders and cargo.
    pub(crate) fn begin_dying(&mut self, id: EntityId) {
        let Some(unit) = self.units.get_mut(&id) else {
            return;
        };
        unit.dying = true;
        unit.health = 0.0;
        unit.commands.clear();
        unit.resume.clear();
        unit.cargo.take();
        self.paths.remove_movable(unit);
        info!(unit = %id, owner = %unit.owner, kind = ?unit.kind, "unit_died");
    }

    pub(crate) fn face_entity(&mut self, unit: EntityId, target: EntityId) {
        let Some(point) = self.position_of(target) else {
            return;
        };
        if let Some(unit) = self.units.get_mut(&unit) {
            unit.face_toward(point);
        }
    }
}

#[cfg(test)]
mod tests {
    use engine::Vec2;

    use super::super::test_support::{order, run, world, HOME};
    use super::*;
    use crate::app::gameplay::types::{BuildingKind, ResourceKind, UnitKind};

    #[test]
    fn queued_command_replaces_an_idle_task_immediately() {
        let mut world = world();
        let peasant = world.spawn_unit(HOME, UnitKind::Peasant, Vec2::new(100.0, 100.0));
        let command = UnitCommand::HarvestGold { mine: None };
        world
            .issue_command(peasant, command, CommandMode::Queue)
            .expect("queue");
        let unit = world.unit(peasant).expect("peasant");
        assert_eq!(unit.task_kind(), Some(TaskKind::HarvestGold));
        assert!(unit.commands.is_empty());
    }

    #[test]
    fn queued_commands_run_in_order_after_the_current_task() {
        let mut world = world();
        let footman = world.spawn_unit(HOME, UnitKind::Footman, Vec2::new(100.0, 100.0));
        let march = |x: f32, y: f32| UnitCommand::Attack {
            target: None,
            destination: Some(Vec2::new(x, y)),
        };
        order(&mut world, footman, march(124.0, 100.0));
        world
            .issue_command(footman, march(124.0, 140.0), CommandMode::Queue)
            .expect("second leg");
        assert_eq!(world.unit(footman).expect("footman").commands.len(), 1);

        run(&mut world, 100, 0.1);
        let unit = world.unit(footman).expect("footman");
        assert!(unit.position.distance(Vec2::new(124.0, 140.0)) <= world.config.world.cell_size);
        assert!(unit.commands.is_empty());
        assert_eq!(unit.task_kind(), Some(TaskKind::Idle));
    }

    #[test]
    fn invalid_commands_are_rejected_up_front() {
        let mut world = world();
        let footman = world.spawn_unit(HOME, UnitKind::Footman, Vec2::new(100.0, 100.0));
        let lumber = UnitCommand::HarvestLumber { tree: None };
        let error = world
            .issue_command(footman, lumber, CommandMode::Replace)
            .expect_err("not a worker");
        assert!(matches!(error, CommandError::Task(_)));
        let gold = UnitCommand::HarvestGold { mine: None };
        assert!(matches!(
            world.issue_command(EntityId(999), gold, CommandMode::Replace),
            Err(CommandError::UnknownUnit(_))
        ));
    }

    #[test]
    fn interrupted_work_is_resumed_after_the_interruption() {
        let mut world = world();
        let mine = world.spawn_resource(ResourceKind::Gold, Vec2::new(204.0, 204.0), 500);
        world.spawn_building(HOME, BuildingKind::TownHall, Vec2::new(204.0, 284.0), true);
        let peasant = world.spawn_unit(HOME, UnitKind::Peasant, Vec2::new(204.0, 220.0));
        let harvest = UnitCommand::HarvestGold { mine: Some(mine) };
        order(&mut world, peasant, harvest);
        run(&mut world, 5, 0.1);

        world
            .interrupt_with(
                peasant,
                UnitCommand::Attack {
                    target: None,
                    destination: Some(Vec2::new(204.0, 236.0)),
                },
            )
            .expect("interrupt");
        let unit = world.unit(peasant).expect("peasant");
        assert_eq!(unit.task_kind(), Some(TaskKind::Attack));
        assert_eq!(
            unit.resume.front(),
            Some(&UnitCommand::HarvestGold { mine: Some(mine) })
        );
        assert_eq!(world.resource(mine).expect("mine").harvesters.claimed(), 0);

        run(&mut world, 50, 0.1);
        let unit = world.unit(peasant).expect("peasant");
        assert_eq!(unit.task_kind(), Some(TaskKind::HarvestGold));
        assert!(unit.resume.is_empty());
    }

    #[test]
    fn events_for_someone_elses_query_are_left_alone() {
        let mut world = world();
        world.spawn_resource(ResourceKind::Gold, Vec2::new(404.0, 404.0), 500);
        world.spawn_building(HOME, BuildingKind::TownHall, Vec2::new(100.0, 100.0), true);
        let peasant = world.spawn_unit(HOME, UnitKind::Peasant, Vec2::new(140.0, 140.0));
        order(&mut world, peasant, UnitCommand::HarvestGold { mine: None });
        run(&mut world, 2, 0.1);

        let stray = StateEvent::PathNotFound {
            ticket: engine::PathTicket(u64::MAX),
        };
        assert_eq!(world.notify_unit(peasant, &stray), EventResult::Unhandled);
        let missing = EntityId(999);
        assert_eq!(world.notify_unit(missing, &stray), EventResult::Unhandled);
        let unit = world.unit(peasant).expect("peasant");
        assert_eq!(unit.task_kind(), Some(TaskKind::HarvestGold));
    }

    #[test]
    fn resolved_routes_reach_the_unit_that_asked() {
        let mut world = world();
        world.spawn_building(HOME, BuildingKind::Barracks, Vec2::new(140.0, 100.0), true);
        let footman = world.spawn_unit(HOME, UnitKind::Footman, Vec2::new(100.0, 100.0));
        let destination = Vec2::new(180.0, 100.0);
        let march = UnitCommand::Attack {
            target: None,
            destination: Some(destination),
        };
        order(&mut world, footman, march);

        // Blocked straight line: the march asks for a route.
        world.update_units(0.1);
        world.update_units(0.1);
        assert_eq!(world.paths.pending_count(), 1);

        world.paths.process_queries();
        assert_eq!(world.deliver_path_results(), 1);
        assert_eq!(world.deliver_path_results(), 0);

        run(&mut world, 150, 0.1);
        let unit = world.unit(footman).expect("footman");
        assert!(unit.position.distance(destination) <= world.config.world.cell_size);
        assert_eq!(unit.task_kind(), Some(TaskKind::Idle));
    }

    #[test]
    fn routes_for_a_dead_requester_are_dropped() {
        let mut world = world();
        world.spawn_building(HOME, BuildingKind::Barracks, Vec2::new(140.0, 100.0), true);
        let footman = world.spawn_unit(HOME, UnitKind::Footman, Vec2::new(100.0, 100.0));
        let march = UnitCommand::Attack {
            target: None,
            destination: Some(Vec2::new(180.0, 100.0)),
        };
        order(&mut world, footman, march);
        world.update_units(0.1);
        world.update_units(0.1);

        world.remove_unit(footman);
        world.paths.process_queries();
        assert_eq!(world.deliver_path_results(), 0);
        assert!(world.paths.take_resolved().is_empty());
    }

    #[test]
    fn dead_units_release_claims_then_disappear() {
        let mut world = world();
        let mine = world.spawn_resource(ResourceKind::Gold, Vec2::new(204.0, 204.0), 500);
        world.spawn_building(HOME, BuildingKind::TownHall, Vec2::new(204.0, 284.0), true);
        let peasant = world.spawn_unit(HOME, UnitKind::Peasant, Vec2::new(204.0, 220.0));
        let harvest = UnitCommand::HarvestGold { mine: Some(mine) };
        order(&mut world, peasant, harvest);
        run(&mut world, 3, 0.1);
        assert_eq!(world.resource(mine).expect("mine").harvesters.claimed(), 1);

        world.damage(peasant, 1000.0);
        run(&mut world, 1, 0.1);
        assert_eq!(world.resource(mine).expect("mine").harvesters.claimed(), 0);
        let unit = world.unit(peasant).expect("corpse");
        assert_eq!(unit.task_kind(), Some(TaskKind::Die));
        assert!(unit.tag.0.is_none());
        assert!(!world.is_alive(peasant));

        let corpse_ticks = (world.config.world.corpse_seconds / 0.1).ceil() as u32 + 2;
        run(&mut world, corpse_ticks, 0.1);
        assert!(world.unit(peasant).is_none());
    }
}
