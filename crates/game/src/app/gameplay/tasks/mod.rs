//! Per-unit task states. A unit runs exactly one task at a time; the world
//! takes it out of the unit for the duration of each call and hands it a
//! [`TaskContext`] borrowing the whole world.

mod attack;
mod combat;
mod construct;
mod die;
mod harvest;
mod idle;
mod repair;

use engine::{
    EntityId, EventResult, FollowTarget, MoveToPosition, MoveToTarget, State, StateEvent,
    StateResult, Vec2,
};
use thiserror::Error;

use super::types::{ResourceKind, UnitKind};
use super::world::World;

pub(crate) use attack::AttackTask;
pub(crate) use combat::{mitigated_damage, AttackSpell};
pub(crate) use construct::ConstructTask;
pub(crate) use die::DieTask;
pub(crate) use harvest::HarvestTask;
pub(crate) use idle::IdleTask;
pub(crate) use repair::RepairTask;

/// What a unit can be told to do. `None` targets mean "pick one yourself".
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum UnitCommand {
    HarvestGold { mine: Option<EntityId> },
    HarvestLumber { tree: Option<EntityId> },
    Construct { building: EntityId },
    Repair { building: EntityId },
    Attack {
        target: Option<EntityId>,
        destination: Option<Vec2>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TaskKind {
    Idle,
    HarvestGold,
    HarvestLumber,
    Construct,
    Repair,
    Attack,
    Die,
}

#[derive(Debug, Error, PartialEq)]
pub(crate) enum TaskError {
    #[error("unit {0} does not exist or is dying")]
    UnknownUnit(EntityId),
    #[error("unit {unit} is a {kind:?} and cannot do worker tasks")]
    NotAWorker { unit: EntityId, kind: UnitKind },
    #[error("building {0} does not exist")]
    UnknownBuilding(EntityId),
    #[error("building {0} belongs to another player")]
    ForeignBuilding(EntityId),
    #[error("building {0} is not under construction")]
    NotUnderConstruction(EntityId),
    #[error("building {0} is still under construction")]
    StillUnderConstruction(EntityId),
    #[error("resource {resource} is not a {expected:?} node")]
    WrongResource {
        resource: EntityId,
        expected: ResourceKind,
    },
    #[error("attack target {0} does not exist")]
    UnknownTarget(EntityId),
    #[error("unit {unit} cannot attack {target} of its own side")]
    FriendlyTarget { unit: EntityId, target: EntityId },
    #[error("attack needs a target or a destination")]
    NoAttackGoal,
}

pub(crate) struct TaskContext<'a> {
    pub world: &'a mut World,
    pub unit: EntityId,
}

impl<'a> TaskContext<'a> {
    pub(crate) fn new(world: &'a mut World, unit: EntityId) -> Self {
        Self { world, unit }
    }
}

#[derive(Debug)]
pub(crate) enum TaskState {
    Idle(IdleTask),
    HarvestGold(HarvestTask),
    HarvestLumber(HarvestTask),
    Construct(ConstructTask),
    Repair(RepairTask),
    Attack(AttackTask),
    Die(DieTask),
}

impl TaskState {
    pub(crate) fn idle() -> Self {
        TaskState::Idle(IdleTask::new())
    }

    pub(crate) fn die() -> Self {
        TaskState::Die(DieTask::new())
    }

    /// Validates `command` for `unit` and builds the matching task.
    pub(crate) fn from_command(
        world: &World,
        unit: EntityId,
        command: &UnitCommand,
    ) -> Result<Self, TaskError> {
        let actor = world
            .unit(unit)
            .filter(|actor| actor.is_alive())
            .ok_or(TaskError::UnknownUnit(unit))?;
        let require_worker = || {
            if actor.kind.is_worker() {
                Ok(())
            } else {
                Err(TaskError::NotAWorker {
                    unit,
                    kind: actor.kind,
                })
            }
        };

        match *command {
            UnitCommand::HarvestGold { mine } => {
                require_worker()?;
                let mine = checked_node(world, mine, ResourceKind::Gold)?;
                Ok(TaskState::HarvestGold(HarvestTask::new(ResourceKind::Gold, mine)))
            }
            UnitCommand::HarvestLumber { tree } => {
                require_worker()?;
                let tree = checked_node(world, tree, ResourceKind::Lumber)?;
                Ok(TaskState::HarvestLumber(HarvestTask::new(ResourceKind::Lumber, tree)))
            }
            UnitCommand::Construct { building } => {
                require_worker()?;
                let site = world
                    .building(building)
                    .ok_or(TaskError::UnknownBuilding(building))?;
                if site.owner != actor.owner {
                    return Err(TaskError::ForeignBuilding(building));
                }
                if site.is_complete() {
                    return Err(TaskError::NotUnderConstruction(building));
                }
                Ok(TaskState::Construct(ConstructTask::new(building)))
            }
            UnitCommand::Repair { building } => {
                require_worker()?;
                let site = world
                    .building(building)
                    .ok_or(TaskError::UnknownBuilding(building))?;
                if site.owner != actor.owner {
                    return Err(TaskError::ForeignBuilding(building));
                }
                if !site.is_complete() {
                    return Err(TaskError::StillUnderConstruction(building));
                }
                Ok(TaskState::Repair(RepairTask::new(building)))
            }
            UnitCommand::Attack {
                target,
                destination,
            } => {
                if let Some(target) = target {
                    if !world.is_alive(target) {
                        return Err(TaskError::UnknownTarget(target));
                    }
                    if world.owner_of(target) == Some(actor.owner) {
                        return Err(TaskError::FriendlyTarget { unit, target });
                    }
                } else if destination.is_none() {
                    return Err(TaskError::NoAttackGoal);
                }
                Ok(TaskState::Attack(AttackTask::new(target, destination)))
            }
        }
    }

    pub(crate) fn kind(&self) -> TaskKind {
        match self {
            TaskState::Idle(_) => TaskKind::Idle,
            TaskState::HarvestGold(_) => TaskKind::HarvestGold,
            TaskState::HarvestLumber(_) => TaskKind::HarvestLumber,
            TaskState::Construct(_) => TaskKind::Construct,
            TaskState::Repair(_) => TaskKind::Repair,
            TaskState::Attack(_) => TaskKind::Attack,
            TaskState::Die(_) => TaskKind::Die,
        }
    }

    /// Command the finished task wants to run next, if any.
    pub(crate) fn take_followup(&mut self) -> Option<UnitCommand> {
        match self {
            TaskState::Idle(idle) => idle.take_followup(),
            _ => None,
        }
    }

    /// Command that picks this task up again after an interruption.
    pub(crate) fn resume_command(&self) -> Option<UnitCommand> {
        match self {
            TaskState::HarvestGold(task) => Some(UnitCommand::HarvestGold { mine: task.node() }),
            TaskState::HarvestLumber(task) => {
                Some(UnitCommand::HarvestLumber { tree: task.node() })
            }
            TaskState::Construct(task) => Some(UnitCommand::Construct {
                building: task.building(),
            }),
            TaskState::Repair(task) => Some(UnitCommand::Repair {
                building: task.building(),
            }),
            TaskState::Attack(task) => task.resume_command(),
            TaskState::Idle(_) | TaskState::Die(_) => None,
        }
    }

    pub(crate) fn construct_target(&self) -> Option<EntityId> {
        match self {
            TaskState::Construct(task) => Some(task.building()),
            _ => None,
        }
    }

    #[cfg(test)]
    pub(crate) fn harvest(&self) -> Option<&HarvestTask> {
        match self {
            TaskState::HarvestGold(task) | TaskState::HarvestLumber(task) => Some(task),
            _ => None,
        }
    }
}

fn checked_node(
    world: &World,
    node: Option<EntityId>,
    expected: ResourceKind,
) -> Result<Option<EntityId>, TaskError> {
    let Some(id) = node else {
        return Ok(None);
    };
    match world.resource(id) {
        Some(found) if found.kind != expected => Err(TaskError::WrongResource {
            resource: id,
            expected,
        }),
        Some(_) => Ok(Some(id)),
        // Gone since the command was issued; the task searches again.
        None => Ok(None),
    }
}

macro_rules! dispatch {
    ($self:expr, $task:ident => $body:expr) => {
        match $self {
            TaskState::Idle($task) => $body,
            TaskState::HarvestGold($task) => $body,
            TaskState::HarvestLumber($task) => $body,
            TaskState::Construct($task) => $body,
            TaskState::Repair($task) => $body,
            TaskState::Attack($task) => $body,
            TaskState::Die($task) => $body,
        }
    };
}

impl<'a> State<TaskContext<'a>> for TaskState {
    fn result(&self) -> StateResult {
        dispatch!(self, task => task.result())
    }

    fn set_result(&mut self, result: StateResult) {
        dispatch!(self, task => task.set_result(result))
    }

    fn activate(&mut self, ctx: &mut TaskContext<'a>) {
        dispatch!(self, task => task.activate(ctx))
    }

    fn update(&mut self, ctx: &mut TaskContext<'a>, dt: f32) -> StateResult {
        dispatch!(self, task => task.update(ctx, dt))
    }

    fn terminate(&mut self, ctx: &mut TaskContext<'a>) {
        dispatch!(self, task => task.terminate(ctx))
    }

    fn handle_event(&mut self, ctx: &mut TaskContext<'a>, event: &StateEvent) -> EventResult {
        dispatch!(self, task => task.handle_event(ctx, event))
    }
}

/// Route to `destination` using the configured movement tuning.
pub(super) fn move_to(world: &World, destination: Vec2) -> MoveToPosition {
    MoveToPosition::new(destination, &world.config.movement)
}

/// Runs one tick of `movement` for the context's unit. A unit that vanished
/// mid-move counts as a failed move.
pub(super) fn drive_move(
    ctx: &mut TaskContext<'_>,
    movement: &mut MoveToPosition,
    dt: f32,
) -> StateResult {
    ctx.world
        .with_move_context(ctx.unit, |move_ctx| movement.update(move_ctx, dt))
        .unwrap_or(StateResult::Failed)
}

pub(super) fn end_move(ctx: &mut TaskContext<'_>, movement: &mut MoveToPosition) {
    ctx.world
        .with_move_context(ctx.unit, |move_ctx| movement.terminate(move_ctx));
}

pub(super) fn forward_move_event(
    ctx: &mut TaskContext<'_>,
    movement: &mut MoveToPosition,
    event: &StateEvent,
) -> EventResult {
    ctx.world
        .with_move_context(ctx.unit, |move_ctx| movement.handle_event(move_ctx, event))
        .unwrap_or(EventResult::Unhandled)
}

pub(super) fn drive_follow(
    ctx: &mut TaskContext<'_>,
    follow: &mut MoveToTarget,
    target: EntityId,
    dt: f32,
) -> StateResult {
    let sample: Option<FollowTarget> = ctx.world.follow_target(target);
    ctx.world
        .with_follow_context(ctx.unit, sample, |follow_ctx| follow.update(follow_ctx, dt))
        .unwrap_or(StateResult::Failed)
}

pub(super) fn end_follow(ctx: &mut TaskContext<'_>, follow: &mut MoveToTarget, target: EntityId) {
    let sample = ctx.world.follow_target(target);
    ctx.world
        .with_follow_context(ctx.unit, sample, |follow_ctx| follow.terminate(follow_ctx));
}

pub(super) fn forward_follow_event(
    ctx: &mut TaskContext<'_>,
    follow: &mut MoveToTarget,
    target: EntityId,
    event: &StateEvent,
) -> EventResult {
    let sample = ctx.world.follow_target(target);
    ctx.world
        .with_follow_context(ctx.unit, sample, |follow_ctx| {
            follow.handle_event(follow_ctx, event)
        })
        .unwrap_or(EventResult::Unhandled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::gameplay::types::BuildingKind;
    use crate::app::gameplay::world::test_support::{world, ENEMY, HOME};

    #[test]
    fn worker_tasks_reject_soldiers() {
        let mut world = world();
        let footman = world.spawn_unit(HOME, UnitKind::Footman, Vec2::new(100.0, 100.0));
        let command = UnitCommand::HarvestGold { mine: None };
        let error = TaskState::from_command(&world, footman, &command)
            .expect_err("soldiers do not mine");
        assert_eq!(
            error,
            TaskError::NotAWorker {
                unit: footman,
                kind: UnitKind::Footman,
            }
        );
    }

    #[test]
    fn construction_targets_must_be_own_unfinished_buildings() {
        let mut world = world();
        let peasant = world.spawn_unit(HOME, UnitKind::Peasant, Vec2::new(100.0, 100.0));
        let farm = BuildingKind::Farm;
        let finished = world.spawn_building(HOME, farm, Vec2::new(200.0, 100.0), true);
        let foreign = world.spawn_building(ENEMY, farm, Vec2::new(300.0, 100.0), false);
        let site = world.spawn_building(HOME, farm, Vec2::new(200.0, 200.0), false);

        let build = |building| UnitCommand::Construct { building };
        assert_eq!(
            TaskState::from_command(&world, peasant, &build(finished)).expect_err("finished"),
            TaskError::NotUnderConstruction(finished)
        );
        assert_eq!(
            TaskState::from_command(&world, peasant, &build(foreign)).expect_err("foreign"),
            TaskError::ForeignBuilding(foreign)
        );
        let task = TaskState::from_command(&world, peasant, &build(site)).expect("own site");
        assert_eq!(task.kind(), TaskKind::Construct);
        assert_eq!(task.construct_target(), Some(site));

        assert_eq!(
            TaskState::from_command(&world, peasant, &UnitCommand::Repair { building: site })
                .expect_err("unfinished"),
            TaskError::StillUnderConstruction(site)
        );
    }

    #[test]
    fn harvest_commands_check_the_node_kind() {
        let mut world = world();
        let peasant = world.spawn_unit(HOME, UnitKind::Peasant, Vec2::new(100.0, 100.0));
        let tree = world.spawn_resource(ResourceKind::Lumber, Vec2::new(140.0, 140.0), 50);
        let command = UnitCommand::HarvestGold { mine: Some(tree) };
        assert_eq!(
            TaskState::from_command(&world, peasant, &command).expect_err("tree is no mine"),
            TaskError::WrongResource {
                resource: tree,
                expected: ResourceKind::Gold,
            }
        );
        world.deplete_resource(tree);
        let task = TaskState::from_command(
            &world,
            peasant,
            &UnitCommand::HarvestLumber { tree: Some(tree) },
        )
        .expect("vanished node falls back to a search");
        assert_eq!(task.harvest().and_then(HarvestTask::node), None);
    }

    #[test]
    fn attacks_need_a_hostile_target_or_a_destination() {
        let mut world = world();
        let footman = world.spawn_unit(HOME, UnitKind::Footman, Vec2::new(100.0, 100.0));
        let friend = world.spawn_unit(HOME, UnitKind::Peasant, Vec2::new(120.0, 100.0));
        let attack = |target, destination| UnitCommand::Attack {
            target,
            destination,
        };
        assert_eq!(
            TaskState::from_command(&world, footman, &attack(None, None)).expect_err("no goal"),
            TaskError::NoAttackGoal
        );
        assert_eq!(
            TaskState::from_command(&world, footman, &attack(Some(friend), None))
                .expect_err("friendly"),
            TaskError::FriendlyTarget {
                unit: footman,
                target: friend,
            }
        );
        let march = TaskState::from_command(
            &world,
            footman,
            &attack(None, Some(Vec2::new(400.0, 400.0))),
        )
        .expect("attack-move");
        assert_eq!(march.kind(), TaskKind::Attack);
    }
}
