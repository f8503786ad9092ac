use std::collections::BTreeMap;

use engine::{EntityId, SimRng, State, StateResult, Vec2};
use tracing::{debug, info};

use super::{ArbitrationTimer, GoalContext};
use crate::app::config::AiConfig;
use crate::app::gameplay::tasks::{TaskKind, UnitCommand};
use crate::app::gameplay::types::{BuildingKind, PlayerId, UnitKind, Upgrade};
use crate::app::gameplay::world::{CommandError, CommandMode, World};

const FACTOR_MIN: f32 = 0.5;
const FACTOR_MAX: f32 = 1.5;

/// Something the economy can spend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum RequestKind {
    Train(UnitKind),
    Build(BuildingKind),
    Research(Upgrade),
}

impl RequestKind {
    pub(crate) const ALL: [RequestKind; 8] = [
        RequestKind::Train(UnitKind::Peasant),
        RequestKind::Train(UnitKind::Footman),
        RequestKind::Train(UnitKind::Archer),
        RequestKind::Build(BuildingKind::Farm),
        RequestKind::Build(BuildingKind::Barracks),
        RequestKind::Build(BuildingKind::LumberMill),
        RequestKind::Research(Upgrade::Weapons),
        RequestKind::Research(Upgrade::Armor),
    ];

    fn coefficient(self) -> f32 {
        match self {
            RequestKind::Train(UnitKind::Peasant) => 1.0,
            RequestKind::Train(UnitKind::Footman) => 0.8,
            RequestKind::Train(UnitKind::Archer) => 0.7,
            RequestKind::Build(BuildingKind::Farm) => 1.2,
            RequestKind::Build(BuildingKind::Barracks) => 0.9,
            RequestKind::Build(BuildingKind::LumberMill) => 0.6,
            RequestKind::Build(BuildingKind::TownHall) => 0.0,
            RequestKind::Research(_) => 0.4,
        }
    }
}

/// A player's workers grouped by what they are doing right now.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct WorkerRoles {
    pub mining: Vec<EntityId>,
    pub harvesting: Vec<EntityId>,
    pub building: Vec<EntityId>,
    pub idle: Vec<EntityId>,
}

impl WorkerRoles {
    pub(crate) fn total(&self) -> usize {
        self.mining.len() + self.harvesting.len() + self.building.len() + self.idle.len()
    }
}

pub(crate) fn classify_workers(world: &World, player: PlayerId) -> WorkerRoles {
    let mut roles = WorkerRoles::default();
    for unit in world.living_units_of(player).filter(|u| u.kind.is_worker()) {
        match unit.task_kind() {
            Some(TaskKind::HarvestGold) => roles.mining.push(unit.id),
            Some(TaskKind::HarvestLumber) => roles.harvesting.push(unit.id),
            Some(TaskKind::Construct | TaskKind::Repair) => roles.building.push(unit.id),
            Some(TaskKind::Idle) | None => roles.idle.push(unit.id),
            Some(TaskKind::Attack | TaskKind::Die) => {}
        }
    }
    roles
}

/// Grows the economy: keeps workers busy, staffs construction sites and
/// spends on whichever request currently weighs the most.
#[derive(Debug)]
pub(crate) struct GoalDevelop {
    result: StateResult,
    timer: ArbitrationTimer,
    factors: BTreeMap<RequestKind, f32>,
    arbitrations: u32,
    last_choice: Option<RequestKind>,
}

impl GoalDevelop {
    pub(crate) fn new(ai: &AiConfig) -> Self {
        Self {
            result: StateResult::Inactive,
            timer: ArbitrationTimer::new(ai.develop_interval),
            factors: BTreeMap::new(),
            arbitrations: 0,
            last_choice: None,
        }
    }

    pub(crate) fn arbitrations(&self) -> u32 {
        self.arbitrations
    }

    pub(crate) fn last_choice(&self) -> Option<RequestKind> {
        self.last_choice
    }

    fn refresh_factors(&mut self, rng: &mut SimRng) {
        for request in RequestKind::ALL {
            self.factors
                .insert(request, rng.range_f32(FACTOR_MIN, FACTOR_MAX));
        }
    }

    pub(crate) fn arbitrate(&mut self, ctx: &mut GoalContext<'_>) {
        self.arbitrations += 1;
        let refresh_every = ctx.world.config.ai.factor_refresh_arbitrations.max(1);
        if self.arbitrations % refresh_every == 0 {
            self.refresh_factors(ctx.rng);
        }

        staff_unbuilt(ctx.world, ctx.player);

        let best = RequestKind::ALL
            .into_iter()
            .filter(|request| request_is_valid(ctx.world, ctx.player, *request))
            .map(|request| (request, self.weight(ctx.world, ctx.player, request)))
            .filter(|(_, weight)| *weight > 0.0)
            .fold(None::<(RequestKind, f32)>, |best, candidate| match best {
                Some(current) if current.1 >= candidate.1 => Some(current),
                _ => Some(candidate),
            });
        if let Some((request, weight)) = best {
            match execute(ctx.world, ctx.player, request) {
                Ok(()) => {
                    info!(player = %ctx.player, request = ?request, weight, "develop_request");
                    self.last_choice = Some(request);
                }
                Err(error) => {
                    debug!(
                        player = %ctx.player,
                        request = ?request,
                        error = %error,
                        "develop_request_failed"
                    );
                }
            }
        }

        assign_idle_workers(ctx.world, ctx.player);
    }

    fn weight(&self, world: &World, player: PlayerId, request: RequestKind) -> f32 {
        let factor = self.factors.get(&request).copied().unwrap_or(1.0);
        request.coefficient() * factor * need(world, player, request)
    }
}

impl<'a> State<GoalContext<'a>> for GoalDevelop {
    fn result(&self) -> StateResult {
        self.result
    }

    fn set_result(&mut self, result: StateResult) {
        self.result = result;
    }

    fn activate(&mut self, ctx: &mut GoalContext<'a>) {
        self.timer.rearm(ctx.rng);
        self.refresh_factors(ctx.rng);
    }

    fn update(&mut self, ctx: &mut GoalContext<'a>, dt: f32) -> StateResult {
        self.activate_if_inactive(ctx);
        if self.timer.tick(dt, ctx.rng) {
            self.arbitrate(ctx);
        }
        self.result
    }
}

/// How much the player lacks what `request` provides, in `0.0..=1.0`.
fn need(world: &World, player: PlayerId, request: RequestKind) -> f32 {
    let ai = &world.config.ai;
    match request {
        RequestKind::Train(UnitKind::Peasant) => {
            let desired = ai.desired_workers.max(1) as f32;
            let workers = world
                .living_units_of(player)
                .filter(|unit| unit.kind.is_worker())
                .count() as f32;
            ((desired - workers) / desired).clamp(0.0, 1.0)
        }
        RequestKind::Train(_) => {
            let desired = ai.desired_army.max(1) as f32;
            let army = world
                .living_units_of(player)
                .filter(|unit| !unit.kind.is_worker())
                .count() as f32;
            (1.0 - army / desired).clamp(0.0, 1.0)
        }
        RequestKind::Build(BuildingKind::Farm) => {
            let headroom = world
                .food_cap(player)
                .saturating_sub(world.food_used(player));
            let farm_pending = world.buildings.values().any(|b| {
                b.owner == player && b.kind == BuildingKind::Farm && !b.is_complete()
            });
            if headroom <= 2 && !farm_pending {
                1.0
            } else {
                0.0
            }
        }
        RequestKind::Build(BuildingKind::Barracks) => {
            if world.count_buildings(player, BuildingKind::Barracks) == 0 {
                1.0
            } else {
                0.0
            }
        }
        RequestKind::Build(BuildingKind::LumberMill) => {
            let missing = world.count_buildings(player, BuildingKind::LumberMill) == 0;
            if missing && world.has_finished(player, BuildingKind::Barracks) {
                0.8
            } else {
                0.0
            }
        }
        RequestKind::Build(BuildingKind::TownHall) => 0.0,
        RequestKind::Research(upgrade) => {
            let level = world
                .player(player)
                .map_or(u32::MAX, |found| found.upgrade_level(upgrade));
            if level < world.config.buildings.max_upgrade_level {
                0.3
            } else {
                0.0
            }
        }
    }
}

fn request_is_valid(world: &World, player: PlayerId, request: RequestKind) -> bool {
    match request {
        RequestKind::Train(kind) => world.check_train(player, kind).is_ok(),
        RequestKind::Build(kind) => {
            if world.check_build(player, kind).is_err() {
                return false;
            }
            let Some(builder) = pick_builder(world, player) else {
                return false;
            };
            let fallback = world.unit(builder).map_or(Vec2::ZERO, |unit| unit.position);
            world.find_building_site(player, kind, fallback).is_some()
        }
        RequestKind::Research(upgrade) => world.check_research(player, upgrade).is_ok(),
    }
}

fn execute(world: &mut World, player: PlayerId, request: RequestKind) -> Result<(), CommandError> {
    match request {
        RequestKind::Train(kind) => world.train_unit(player, kind).map(|_| ()),
        RequestKind::Build(kind) => {
            let builder = pick_builder(world, player).ok_or(CommandError::NoProducer(kind))?;
            world.place_building(player, kind, builder).map(|_| ())
        }
        RequestKind::Research(upgrade) => world.research(player, upgrade).map(|_| ()),
    }
}

/// Idle workers first, then lumberjacks, then miners.
fn pick_builder(world: &World, player: PlayerId) -> Option<EntityId> {
    let roles = classify_workers(world, player);
    roles
        .idle
        .first()
        .or_else(|| roles.harvesting.first())
        .or_else(|| roles.mining.first())
        .copied()
}

fn has_builder(world: &World, player: PlayerId, building: EntityId) -> bool {
    world
        .living_units_of(player)
        .filter_map(|unit| unit.task.as_ref())
        .any(|task| task.construct_target() == Some(building))
}

/// Sends a worker to every unfinished building nobody is working on.
fn staff_unbuilt(world: &mut World, player: PlayerId) {
    let unstaffed: Vec<EntityId> = world
        .buildings
        .values()
        .filter(|b| b.owner == player && !b.is_complete() && b.builders.claimed() == 0)
        .filter(|b| !has_builder(world, player, b.id))
        .map(|b| b.id)
        .collect();
    for building in unstaffed {
        let Some(builder) = pick_builder(world, player) else {
            return;
        };
        let command = UnitCommand::Construct { building };
        match world.issue_command(builder, command, CommandMode::Replace) {
            Ok(()) => debug!(
                player = %player,
                unit = %builder,
                building = %building,
                "builder_assigned"
            ),
            Err(error) => debug!(
                player = %player,
                building = %building,
                error = %error,
                "builder_assignment_failed"
            ),
        }
    }
}

/// Puts idle workers on gold or lumber, keeping the configured miner share.
fn assign_idle_workers(world: &mut World, player: PlayerId) {
    let roles = classify_workers(world, player);
    let share = world.config.ai.miner_share;
    let mut mining = roles.mining.len() as f32;
    let mut harvesting = roles.harvesting.len() as f32;
    for worker in roles.idle {
        let gatherers = mining + harvesting;
        let to_gold = gatherers == 0.0 || mining / gatherers < share;
        let command = if to_gold {
            UnitCommand::HarvestGold { mine: None }
        } else {
            UnitCommand::HarvestLumber { tree: None }
        };
        match world.issue_command(worker, command, CommandMode::Replace) {
            Ok(()) => {
                if to_gold {
                    mining += 1.0;
                } else {
                    harvesting += 1.0;
                }
            }
            Err(error) => debug!(
                player = %player,
                unit = %worker,
                error = %error,
                "worker_assignment_failed"
            ),
        }
    }
}
