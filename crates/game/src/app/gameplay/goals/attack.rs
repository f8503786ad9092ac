use engine::{EntityId, State, StateResult, Vec2};
use tracing::{debug, info};

use super::{ArbitrationTimer, GoalContext};
use crate::app::config::{AiConfig, UnitStats};
use crate::app::gameplay::tasks::{TaskKind, UnitCommand};
use crate::app::gameplay::types::PlayerId;
use crate::app::gameplay::world::{CommandMode, World};

/// Saturating threat of one unit: grows with attack and defense but never
/// past 1. Workers count for a fraction of a soldier.
pub(crate) fn unit_threat(stats: &UnitStats, is_worker: bool, ai: &AiConfig) -> f32 {
    let strength = stats.attack * (1.0 + stats.defense);
    let threat = strength / (strength + ai.threat_half_saturation);
    if is_worker {
        threat * ai.worker_threat_weight
    } else {
        threat
    }
}

/// Summed threat of every living unit `player` owns.
pub(crate) fn army_threat(world: &World, player: PlayerId) -> f32 {
    let (ai, units) = (&world.config.ai, &world.config.units);
    world
        .living_units_of(player)
        .map(|unit| unit_threat(units.stats(unit.kind), unit.kind.is_worker(), ai))
        .sum()
}

/// Closer enemies are more tempting; the bonus fades with distance.
pub(crate) fn distance_bonus(distance: f32, ai: &AiConfig) -> f32 {
    if !distance.is_finite() {
        return 0.0;
    }
    ai.distance_bonus_weight / (1.0 + distance.max(0.0) / ai.distance_bonus_scale)
}

/// Normalized balance of power in `-1.0..=1.0`, plus the distance bonus.
pub(crate) fn compute_military_advantage(
    ours: f32,
    enemy: f32,
    distance: f32,
    ai: &AiConfig,
) -> f32 {
    let total = ours + enemy;
    let balance = if total.abs() <= f32::EPSILON {
        0.0
    } else {
        (ours - enemy) / total
    };
    balance + distance_bonus(distance, ai)
}

/// Watches the balance of power and sends a squad out once it has stayed in
/// the player's favour for long enough. Each launch raises the bar for the
/// next one.
#[derive(Debug)]
pub(crate) struct GoalAttack {
    result: StateResult,
    timer: ArbitrationTimer,
    smoothed: f32,
    positive_streak: u32,
    squad_size: u32,
    attacks_launched: u32,
    arbitrations: u32,
}

impl GoalAttack {
    pub(crate) fn new(ai: &AiConfig) -> Self {
        Self {
            result: StateResult::Inactive,
            timer: ArbitrationTimer::new(ai.attack_interval),
            smoothed: 0.0,
            positive_streak: 0,
            squad_size: ai.initial_squad_size,
            attacks_launched: 0,
            arbitrations: 0,
        }
    }

    pub(crate) fn arbitrations(&self) -> u32 {
        self.arbitrations
    }

    pub(crate) fn smoothed_advantage(&self) -> f32 {
        self.smoothed
    }

    pub(crate) fn squad_size(&self) -> u32 {
        self.squad_size
    }

    pub(crate) fn attacks_launched(&self) -> u32 {
        self.attacks_launched
    }

    pub(crate) fn arbitrate(&mut self, ctx: &mut GoalContext<'_>) {
        self.arbitrations += 1;
        let world = &mut *ctx.world;
        let player = ctx.player;
        let Some(home) = world.town_hall_of(player).map(|hall| hall.position) else {
            self.positive_streak = 0;
            return;
        };

        let ours = army_threat(world, player);
        let enemy = enemy_threat(world, player);
        let nearest = nearest_enemy_building(world, player, home);
        let distance = nearest.map_or(f32::INFINITY, |(_, d)| d);
        let ai = &world.config.ai;
        let advantage = compute_military_advantage(ours, enemy, distance, ai);
        let alpha = ai.advantage_smoothing;
        self.smoothed = alpha * advantage + (1.0 - alpha) * self.smoothed;
        if self.smoothed > 0.0 {
            self.positive_streak += 1;
        } else {
            self.positive_streak = 0;
        }
        debug!(
            player = %player,
            ours,
            enemy,
            advantage,
            smoothed = self.smoothed,
            streak = self.positive_streak,
            "attack_arbitration"
        );

        if self.positive_streak < ai.required_positive_streak {
            return;
        }
        let squad: Vec<EntityId> = world
            .living_units_of(player)
            .filter(|unit| !unit.kind.is_worker())
            .filter(|unit| !matches!(unit.task_kind(), Some(TaskKind::Attack | TaskKind::Die)))
            .map(|unit| unit.id)
            .collect();
        if (squad.len() as u32) < self.squad_size {
            return;
        }
        let Some((target, position)) = pick_target(world, player, home) else {
            return;
        };

        let mut sent = 0u32;
        for unit in &squad {
            let command = UnitCommand::Attack {
                target: Some(target),
                destination: Some(position),
            };
            match world.issue_command(*unit, command, CommandMode::Replace) {
                Ok(()) => sent += 1,
                Err(error) => debug!(unit = %unit, error = %error, "attack_order_rejected"),
            }
        }
        self.squad_size += world.config.ai.squad_growth;
        self.positive_streak = 0;
        self.attacks_launched += 1;
        info!(
            player = %player,
            target = %target,
            sent,
            next_squad = self.squad_size,
            "attack_launched"
        );
    }
}

fn enemy_threat(world: &World, player: PlayerId) -> f32 {
    world
        .players
        .values()
        .filter(|other| other.id != player && !other.defeated)
        .map(|other| army_threat(world, other.id))
        .sum()
}

fn nearest_enemy_building(world: &World, player: PlayerId, from: Vec2) -> Option<(EntityId, f32)> {
    world
        .buildings
        .values()
        .filter(|b| b.owner != player)
        .map(|b| (b.id, b.position.distance(from)))
        .min_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)))
}

/// Enemy with the lowest priority value: distance from `home`, with
/// buildings pulled forward by a fixed offset.
fn pick_target(world: &World, player: PlayerId, home: Vec2) -> Option<(EntityId, Vec2)> {
    let offset = world.config.ai.building_priority_offset;
    let units = world
        .units
        .values()
        .filter(|unit| unit.owner != player && unit.is_alive())
        .map(|unit| (unit.position.distance(home), unit.id, unit.position));
    let buildings = world
        .buildings
        .values()
        .filter(|b| b.owner != player)
        .map(|b| (b.position.distance(home) - offset, b.id, b.position));
    units
        .chain(buildings)
        .min_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)))
        .map(|(_, id, position)| (id, position))
}

impl<'a> State<GoalContext<'a>> for GoalAttack {
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

#[cfg(test)]
mod tests {
    use engine::SimRng;

    use super::*;
    use crate::app::gameplay::types::{BuildingKind, UnitKind};
    use crate::app::gameplay::world::test_support::{world, ENEMY, HOME};

    #[test]
    fn advantage_is_antisymmetric_apart_from_the_distance_bonus() {
        let ai = AiConfig::default();
        for (ours, enemy) in [(3.0, 1.0), (0.5, 2.5), (1.0, 1.0), (0.0, 4.0)] {
            let forward = compute_military_advantage(ours, enemy, f32::INFINITY, &ai);
            let backward = compute_military_advantage(enemy, ours, f32::INFINITY, &ai);
            assert!((forward + backward).abs() < 1e-6, "{ours} vs {enemy}");

            let bonus = distance_bonus(300.0, &ai);
            let forward = compute_military_advantage(ours, enemy, 300.0, &ai);
            let backward = compute_military_advantage(enemy, ours, 300.0, &ai);
            assert!((forward + backward - 2.0 * bonus).abs() < 1e-6);
        }
        assert_eq!(
            compute_military_advantage(0.0, 0.0, f32::INFINITY, &ai),
            0.0
        );
    }

    #[test]
    fn threat_saturates_and_discounts_workers() {
        let ai = AiConfig::default();
        let footman = unit_threat(&UnitStats::footman(), false, &ai);
        let peasant = unit_threat(&UnitStats::peasant(), true, &ai);
        assert!(footman > 0.0 && footman < 1.0);
        assert!(peasant < footman * ai.worker_threat_weight + 1e-6);
        let mut brute = UnitStats::footman();
        brute.attack = 10_000.0;
        assert!(unit_threat(&brute, false, &ai) < 1.0);
    }

    #[test]
    fn nearer_targets_earn_a_larger_bonus() {
        let ai = AiConfig::default();
        assert!(distance_bonus(100.0, &ai) > distance_bonus(400.0, &ai));
        assert_eq!(distance_bonus(0.0, &ai), ai.distance_bonus_weight);
    }

    #[test]
    fn squad_launches_after_a_positive_streak_and_the_bar_rises() {
        let mut world = world();
        world.spawn_building(HOME, BuildingKind::TownHall, Vec2::new(60.0, 60.0), true);
        world.spawn_building(ENEMY, BuildingKind::TownHall, Vec2::new(420.0, 420.0), true);
        let squad: Vec<EntityId> = (0..4)
            .map(|i| Vec2::new(100.0 + i as f32 * 8.0, 100.0))
            .map(|at| world.spawn_unit(HOME, UnitKind::Footman, at))
            .collect();

        let ai = world.config.ai.clone();
        let mut goal = GoalAttack::new(&ai);
        let mut rng = SimRng::seed_from_u64(1);
        let mut ctx = GoalContext {
            world: &mut world,
            player: HOME,
            rng: &mut rng,
        };
        for _ in 0..ai.required_positive_streak - 1 {
            goal.arbitrate(&mut ctx);
        }
        assert_eq!(goal.attacks_launched(), 0);
        assert!(goal.smoothed_advantage() > 0.0);
        goal.arbitrate(&mut ctx);
        assert_eq!(goal.attacks_launched(), 1);
        assert_eq!(goal.squad_size(), ai.initial_squad_size + ai.squad_growth);

        for unit in squad {
            let unit = world.unit(unit).expect("footman");
            assert_eq!(unit.task_kind(), Some(TaskKind::Attack));
        }
    }

    #[test]
    fn buildings_win_over_slightly_closer_units() {
        let mut world = world();
        let home = Vec2::new(60.0, 60.0);
        let target = |world: &World| pick_target(world, HOME, home).map(|(id, _)| id);
        world.spawn_unit(ENEMY, UnitKind::Peasant, Vec2::new(260.0, 60.0));
        let farm = world.spawn_building(ENEMY, BuildingKind::Farm, Vec2::new(300.0, 60.0), true);
        assert_eq!(target(&world), Some(farm));

        let near = world.spawn_unit(ENEMY, UnitKind::Peasant, Vec2::new(100.0, 60.0));
        assert_eq!(target(&world), Some(near));
    }
}
