use engine::{EntityId, State, StateResult, Vec2};
use tracing::{debug, info};

use super::{ArbitrationTimer, GoalContext};
use crate::app::config::AiConfig;
use crate::app::gameplay::tasks::{TaskKind, UnitCommand};
use crate::app::gameplay::types::PlayerId;
use crate::app::gameplay::world::{CommandMode, World};

/// Guards the town hall: soldiers near home engage intruders, and when they
/// are outnumbered workers drop their work to help, picking it up again
/// once the fight is over.
#[derive(Debug)]
pub(crate) struct GoalDefend {
    result: StateResult,
    timer: ArbitrationTimer,
    arbitrations: u32,
    workers_pulled: u32,
}

impl GoalDefend {
    pub(crate) fn new(ai: &AiConfig) -> Self {
        Self {
            result: StateResult::Inactive,
            timer: ArbitrationTimer::new(ai.defend_interval),
            arbitrations: 0,
            workers_pulled: 0,
        }
    }

    pub(crate) fn arbitrations(&self) -> u32 {
        self.arbitrations
    }

    pub(crate) fn workers_pulled(&self) -> u32 {
        self.workers_pulled
    }

    pub(crate) fn arbitrate(&mut self, ctx: &mut GoalContext<'_>) {
        self.arbitrations += 1;
        let world = &mut *ctx.world;
        let player = ctx.player;
        let Some(home) = world.town_hall_of(player).map(|hall| hall.position) else {
            return;
        };
        let radius = world.config.ai.defend_radius;
        let enemies = world.enemy_units_near(player, home, radius);
        let Some(&nearest) = enemies.first() else {
            return;
        };

        let (soldiers, fighting_workers) = defenders(world, player, home, radius);
        for soldier in &soldiers {
            let idle = world.unit(*soldier).is_some_and(|unit| unit.is_idle());
            if !idle {
                continue;
            }
            let command = UnitCommand::Attack {
                target: Some(nearest),
                destination: None,
            };
            if let Err(error) = world.issue_command(*soldier, command, CommandMode::Replace) {
                debug!(unit = %soldier, error = %error, "defender_order_rejected");
            }
        }

        let defending = soldiers.len() + fighting_workers;
        if defending >= enemies.len() {
            return;
        }
        let wanted = (enemies.len() - defending) * world.config.ai.worker_pull_factor as usize;
        let mut pulled = 0u32;
        let candidates = workers_to_pull(world, player, home);
        for worker in candidates.into_iter().take(wanted) {
            let command = UnitCommand::Attack {
                target: Some(nearest),
                destination: None,
            };
            match world.interrupt_with(worker, command) {
                Ok(()) => pulled += 1,
                Err(error) => debug!(unit = %worker, error = %error, "worker_pull_rejected"),
            }
        }
        self.workers_pulled += pulled;
        info!(
            player = %player,
            enemies = enemies.len(),
            defenders = defending,
            pulled,
            "workers_pulled_to_defend"
        );
    }
}

/// Soldiers within `radius` of home, and how many workers already fight.
fn defenders(world: &World, player: PlayerId, home: Vec2, radius: f32) -> (Vec<EntityId>, usize) {
    let mut soldiers = Vec::new();
    let mut workers = 0;
    for unit in world.living_units_of(player) {
        if unit.kind.is_worker() {
            if unit.task_kind() == Some(TaskKind::Attack) {
                workers += 1;
            }
        } else if unit.position.distance(home) <= radius {
            soldiers.push(unit.id);
        }
    }
    (soldiers, workers)
}

/// Workers not yet fighting, nearest to home first.
fn workers_to_pull(world: &World, player: PlayerId, home: Vec2) -> Vec<EntityId> {
    let mut workers: Vec<(f32, EntityId)> = world
        .living_units_of(player)
        .filter(|unit| unit.kind.is_worker())
        .filter(|unit| !matches!(unit.task_kind(), Some(TaskKind::Attack | TaskKind::Die)))
        .map(|unit| (unit.position.distance_squared(home), unit.id))
        .collect();
    workers.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    workers.into_iter().map(|(_, id)| id).collect()
}

impl<'a> State<GoalContext<'a>> for GoalDefend {
    fn result(&self) -> StateResult {
        self.result
    }

    fn set_result(&mut self, result: StateResult) {
        self.result = result;
    }

    fn activate(&mut self, ctx: &mut GoalContext<'a>) {
        self.timer.rearm(ctx.rng);
    }

    fn update(&mut self, ctx: &mut GoalContext<'a>, dt: f32) -> StateResult {
        self.activate_if_inactive(ctx);
        if self.timer.tick(dt, ctx.rng) {
            self.arbitrate(ctx);
        }
        self.result
    }
}
