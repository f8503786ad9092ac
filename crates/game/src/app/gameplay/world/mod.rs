//! Simulation state: players, units, buildings and resource nodes, plus the
//! grid path service and the shared random source.
//!
//! Entity maps are ordered so every per-tick sweep visits entities in id order
//! and a run replays exactly from its seed.

mod commands;
mod economy;
mod entities;

use std::collections::{BTreeMap, VecDeque};

use engine::{
    Brush, EntityId, EntityIdAllocator, FollowContext, FollowTarget, MoveContext, PathService,
    PathTag, SimRng, SlotCounter, Vec2,
};
use thiserror::Error;
use tracing::{debug, info};

use super::nav::GridPathService;
use super::tasks::{TaskError, TaskState};
use super::types::{BuildingKind, Cargo, PlayerId, ResourceKind, Stockpile, UnitKind, Upgrade};
use crate::app::config::GameConfig;

pub(crate) use commands::CommandMode;
pub(crate) use economy::RepairOutcome;
pub(crate) use entities::{
    Building, BuildingStatus, Player, Production, ProductionItem, ResourceNode, Unit,
};

pub(crate) const GOLDMINE_RADIUS: f32 = 12.0;
pub(crate) const TREE_RADIUS: f32 = 3.0;

#[derive(Debug, Error)]
pub(crate) enum CommandError {
    #[error("unit {0} does not exist or is dying")]
    UnknownUnit(EntityId),
    #[error("player {0} does not exist")]
    UnknownPlayer(PlayerId),
    #[error("player {player} cannot afford {what}")]
    Unaffordable { player: PlayerId, what: String },
    #[error("{what} requires a finished {missing:?}")]
    MissingPrerequisite { what: String, missing: BuildingKind },
    #[error("no idle {0:?} available")]
    NoProducer(BuildingKind),
    #[error("not enough food to train a {0:?}")]
    NoFood(UnitKind),
    #[error("no free site for a {0:?}")]
    NoSite(BuildingKind),
    #[error("{0:?} is already at its maximum level")]
    MaxLevel(Upgrade),
    #[error("{0:?} is already being researched")]
    AlreadyResearching(Upgrade),
    #[error(transparent)]
    Task(#[from] TaskError),
}

pub(crate) struct World {
    pub(crate) config: GameConfig,
    ids: EntityIdAllocator,
    pub(crate) players: BTreeMap<PlayerId, Player>,
    pub(crate) units: BTreeMap<EntityId, Unit>,
    pub(crate) buildings: BTreeMap<EntityId, Building>,
    pub(crate) resources: BTreeMap<EntityId, ResourceNode>,
    pub(crate) paths: GridPathService,
    pub(crate) rng: SimRng,
    elapsed_seconds: f64,
    tick: u64,
}

impl World {
    pub(crate) fn new(config: GameConfig) -> Self {
        let paths = GridPathService::new(
            config.world.width_cells,
            config.world.height_cells,
            config.world.cell_size,
            config.world.queries_per_tick,
        );
        let rng = SimRng::seed_from_u64(config.seed);
        Self {
            config,
            ids: EntityIdAllocator::default(),
            players: BTreeMap::new(),
            units: BTreeMap::new(),
            buildings: BTreeMap::new(),
            resources: BTreeMap::new(),
            paths,
            rng,
            elapsed_seconds: 0.0,
            tick: 0,
        }
    }

    pub(crate) fn advance_clock(&mut self, dt: f32) {
        self.tick += 1;
        self.elapsed_seconds += f64::from(dt);
    }

    pub(crate) fn tick(&self) -> u64 {
        self.tick
    }

    pub(crate) fn elapsed_seconds(&self) -> f64 {
        self.elapsed_seconds
    }

    pub(crate) fn add_player(&mut self, id: PlayerId, stock: Stockpile, computer: bool) {
        self.players.insert(id, Player::new(id, stock, computer));
    }

    pub(crate) fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(&id)
    }

    pub(crate) fn player_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.players.get_mut(&id)
    }

    pub(crate) fn unit(&self, id: EntityId) -> Option<&Unit> {
        self.units.get(&id)
    }

    pub(crate) fn unit_mut(&mut self, id: EntityId) -> Option<&mut Unit> {
        self.units.get_mut(&id)
    }

    pub(crate) fn building(&self, id: EntityId) -> Option<&Building> {
        self.buildings.get(&id)
    }

    pub(crate) fn resource(&self, id: EntityId) -> Option<&ResourceNode> {
        self.resources.get(&id)
    }

    /// Places a unit on the nearest free cell to `near` and leaves it idle.
    pub(crate) fn spawn_unit(&mut self, owner: PlayerId, kind: UnitKind, near: Vec2) -> EntityId {
        let stats = self.config.units.stats(kind).clone();
        let id = self.ids.allocate();
        let mut unit = Unit {
            id,
            owner,
            kind,
            position: near,
            facing: Vec2::new(1.0, 0.0),
            brush: Brush::new(stats.radius),
            speed: stats.speed,
            tag: PathTag::default(),
            health: stats.max_health,
            cargo: Cargo::default(),
            dying: false,
            task: Some(TaskState::idle()),
            commands: VecDeque::new(),
            resume: VecDeque::new(),
        };
        unit.position = self.paths.find_next_valid_position(near, near, None, &unit);
        self.paths.update_movable(&mut unit);
        debug!(
            unit = %id,
            owner = %owner,
            kind = ?kind,
            x = unit.position.x,
            y = unit.position.y,
            "unit_spawned"
        );
        self.units.insert(id, unit);
        id
    }

    pub(crate) fn spawn_building(
        &mut self,
        owner: PlayerId,
        kind: BuildingKind,
        position: Vec2,
        complete: bool,
    ) -> EntityId {
        let stats = self.config.buildings.stats(kind).clone();
        let id = self.ids.allocate();
        let (status, health) = if complete {
            (BuildingStatus::Complete, stats.max_health)
        } else {
            (
                BuildingStatus::UnderConstruction { progress: 0.0 },
                stats.max_health * economy::CONSTRUCTION_START_HEALTH,
            )
        };
        self.paths.block_footprint(position, stats.radius);
        self.buildings.insert(
            id,
            Building {
                id,
                owner,
                kind,
                position,
                radius: stats.radius,
                health,
                max_health: stats.max_health,
                status,
                builders: SlotCounter::new(stats.max_builders),
                production: None,
            },
        );
        debug!(building = %id, owner = %owner, kind = ?kind, complete, "building_placed");
        id
    }

    pub(crate) fn spawn_resource(
        &mut self,
        kind: ResourceKind,
        position: Vec2,
        amount: u32,
    ) -> EntityId {
        let (radius, slots) = match kind {
            ResourceKind::Gold => (GOLDMINE_RADIUS, self.config.harvest.goldmine_slots),
            ResourceKind::Lumber => (TREE_RADIUS, self.config.harvest.tree_slots),
        };
        let id = self.ids.allocate();
        self.paths.block_footprint(position, radius);
        self.resources.insert(
            id,
            ResourceNode {
                id,
                kind,
                position,
                radius,
                amount,
                harvesters: SlotCounter::new(slots),
            },
        );
        id
    }

    /// Removes an exhausted node and frees its footprint.
    pub(crate) fn deplete_resource(&mut self, id: EntityId) {
        if let Some(node) = self.resources.remove(&id) {
            self.paths.unblock_footprint(node.position, node.radius);
            info!(resource = %id, kind = ?node.kind, "resource_depleted");
        }
    }

    pub(crate) fn destroy_building(&mut self, id: EntityId) {
        if let Some(building) = self.buildings.remove(&id) {
            self.paths
                .unblock_footprint(building.position, building.radius);
            info!(
                building = %id,
                owner = %building.owner,
                kind = ?building.kind,
                "building_destroyed"
            );
        }
    }

    pub(crate) fn remove_unit(&mut self, id: EntityId) {
        if let Some(mut unit) = self.units.remove(&id) {
            self.paths.remove_movable(&mut unit);
        }
    }

    /// Living unit or standing building.
    pub(crate) fn is_alive(&self, id: EntityId) -> bool {
        if let Some(unit) = self.units.get(&id) {
            return unit.is_alive();
        }
        self.buildings.contains_key(&id)
    }

    pub(crate) fn owner_of(&self, id: EntityId) -> Option<PlayerId> {
        self.units
            .get(&id)
            .map(|unit| unit.owner)
            .or_else(|| self.buildings.get(&id).map(|building| building.owner))
    }

    pub(crate) fn position_of(&self, id: EntityId) -> Option<Vec2> {
        if let Some(unit) = self.units.get(&id) {
            return Some(unit.position);
        }
        if let Some(building) = self.buildings.get(&id) {
            return Some(building.position);
        }
        self.resources.get(&id).map(|node| node.position)
    }

    pub(crate) fn radius_of(&self, id: EntityId) -> Option<f32> {
        if let Some(unit) = self.units.get(&id) {
            return Some(unit.brush.radius);
        }
        if let Some(building) = self.buildings.get(&id) {
            return Some(building.radius);
        }
        self.resources.get(&id).map(|node| node.radius)
    }

    /// Fresh sample of a followed entity, `None` once it is gone or dead.
    pub(crate) fn follow_target(&self, id: EntityId) -> Option<FollowTarget> {
        if !self.is_alive(id) {
            return None;
        }
        Some(FollowTarget {
            position: self.position_of(id)?,
            radius: self.radius_of(id)?,
            movable: self.units.contains_key(&id),
        })
    }

    /// True when the unit's brush touches `target`'s footprint within `slack`.
    pub(crate) fn reaches(&self, unit: EntityId, target: EntityId, slack: f32) -> bool {
        let Some(unit) = self.units.get(&unit) else {
            return false;
        };
        match (self.position_of(target), self.radius_of(target)) {
            (Some(position), Some(radius)) => {
                unit.brush.reaches(unit.position, position, radius, slack)
            }
            _ => false,
        }
    }

    /// Edge-to-edge distance between a unit and another entity.
    pub(crate) fn gap_between(&self, unit: EntityId, target: EntityId) -> Option<f32> {
        let unit = self.units.get(&unit)?;
        let position = self.position_of(target)?;
        let radius = self.radius_of(target)?;
        Some(unit.position.distance(position) - unit.brush.radius - radius)
    }

    pub(crate) fn with_move_context<R>(
        &mut self,
        unit: EntityId,
        f: impl FnOnce(&mut MoveContext<'_>) -> R,
    ) -> Option<R> {
        let Self {
            units, paths, rng, ..
        } = self;
        let unit = units.get_mut(&unit)?;
        let mut ctx = MoveContext::new(unit, paths, rng);
        Some(f(&mut ctx))
    }

    pub(crate) fn with_follow_context<R>(
        &mut self,
        unit: EntityId,
        target: Option<FollowTarget>,
        f: impl FnOnce(&mut FollowContext<'_>) -> R,
    ) -> Option<R> {
        let Self {
            units, paths, rng, ..
        } = self;
        let unit = units.get_mut(&unit)?;
        let mut ctx = FollowContext::new(MoveContext::new(unit, paths, rng), target);
        Some(f(&mut ctx))
    }

    /// Closest node of `kind` with something left in it, skipping `exclude`.
    pub(crate) fn nearest_resource(
        &self,
        kind: ResourceKind,
        from: Vec2,
        exclude: &[EntityId],
    ) -> Option<EntityId> {
        self.resources
            .values()
            .filter(|node| node.kind == kind && node.amount > 0 && !exclude.contains(&node.id))
            .min_by(|a, b| {
                a.position
                    .distance_squared(from)
                    .total_cmp(&b.position.distance_squared(from))
            })
            .map(|node| node.id)
    }

    /// Closest finished building of `owner` that accepts `kind`.
    pub(crate) fn nearest_deposit(
        &self,
        owner: PlayerId,
        kind: ResourceKind,
        from: Vec2,
    ) -> Option<EntityId> {
        self.buildings
            .values()
            .filter(|b| b.owner == owner && b.is_complete() && b.kind.accepts(kind))
            .min_by(|a, b| {
                a.position
                    .distance_squared(from)
                    .total_cmp(&b.position.distance_squared(from))
            })
            .map(|building| building.id)
    }

    pub(crate) fn town_hall_of(&self, owner: PlayerId) -> Option<&Building> {
        self.buildings
            .values()
            .find(|b| b.owner == owner && b.kind == BuildingKind::TownHall)
    }

    pub(crate) fn has_finished(&self, owner: PlayerId, kind: BuildingKind) -> bool {
        self.buildings
            .values()
            .any(|b| b.owner == owner && b.kind == kind && b.is_complete())
    }

    pub(crate) fn count_buildings(&self, owner: PlayerId, kind: BuildingKind) -> usize {
        self.buildings
            .values()
            .filter(|b| b.owner == owner && b.kind == kind)
            .count()
    }

    pub(crate) fn living_units_of(&self, owner: PlayerId) -> impl Iterator<Item = &Unit> + '_ {
        self.units
            .values()
            .filter(move |unit| unit.owner == owner && unit.is_alive())
    }

    /// Living enemy units within `radius` of `center`, nearest first.
    pub(crate) fn enemy_units_near(
        &self,
        owner: PlayerId,
        center: Vec2,
        radius: f32,
    ) -> Vec<EntityId> {
        let mut found: Vec<(f32, EntityId)> = self
            .units
            .values()
            .filter(|unit| unit.owner != owner && unit.is_alive())
            .map(|unit| (unit.position.distance_squared(center), unit.id))
            .filter(|(distance_sq, _)| *distance_sq <= radius * radius)
            .collect();
        found.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        found.into_iter().map(|(_, id)| id).collect()
    }

    /// Nearest enemy within the unit's sight: units first, then buildings.
    pub(crate) fn visible_enemy(&self, unit: EntityId) -> Option<EntityId> {
        let unit = self.units.get(&unit)?;
        let sight = self.config.units.stats(unit.kind).sight_range;
        if let Some(enemy) = self
            .enemy_units_near(unit.owner, unit.position, sight)
            .into_iter()
            .next()
        {
            return Some(enemy);
        }
        self.buildings
            .values()
            .filter(|b| b.owner != unit.owner)
            .map(|b| (b.position.distance(unit.position) - b.radius, b.id))
            .filter(|(gap, _)| *gap <= sight)
            .min_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)))
            .map(|(_, id)| id)
    }

    /// Applies `raw` damage from `attacker` after the target's defense.
    pub(crate) fn apply_attack(&mut self, attacker: EntityId, target: EntityId, raw: f32) -> f32 {
        let combat = &self.config.combat;
        let defense = if let Some(unit) = self.units.get(&target) {
            let armor = self
                .players
                .get(&unit.owner)
                .map_or(0, |player| player.armor_level);
            self.config.units.stats(unit.kind).defense + armor as f32 * combat.upgrade_step
        } else if let Some(building) = self.buildings.get(&target) {
            self.config.buildings.stats(building.kind).defense
        } else {
            return 0.0;
        };
        let damage = super::tasks::mitigated_damage(raw, defense, combat.min_damage);
        self.damage(target, damage);
        debug!(attacker = %attacker, target = %target, damage, "attack_hit");
        damage
    }

    /// Lowers the target's health. Units at zero are picked up by
    /// [`World::process_deaths`]; buildings at zero are destroyed at once.
    pub(crate) fn damage(&mut self, target: EntityId, amount: f32) {
        if let Some(unit) = self.units.get_mut(&target) {
            if unit.is_alive() {
                unit.health = (unit.health - amount).max(0.0);
            }
            return;
        }
        let destroyed = match self.buildings.get_mut(&target) {
            Some(building) => {
                building.health = (building.health - amount).max(0.0);
                building.health <= 0.0
            }
            None => false,
        };
        if destroyed {
            self.destroy_building(target);
        }
    }

    /// Marks players with nothing left standing as defeated.
    pub(crate) fn update_defeats(&mut self) {
        let mut newly_defeated = Vec::new();
        for player in self.players.values() {
            if player.defeated {
                continue;
            }
            let has_building = self.buildings.values().any(|b| b.owner == player.id);
            let has_unit = self
                .units
                .values()
                .any(|unit| unit.owner == player.id && unit.is_alive());
            if !has_building && !has_unit {
                newly_defeated.push(player.id);
            }
        }
        for id in newly_defeated {
            if let Some(player) = self.players.get_mut(&id) {
                player.defeated = true;
                info!(player = %id, tick = self.tick, "player_defeated");
            }
        }
    }

    pub(crate) fn remaining_players(&self) -> usize {
        self.players.values().filter(|p| !p.defeated).count()
    }
}
