use engine::{EntityId, Vec2};
use tracing::{debug, info};

use super::super::tasks::UnitCommand;
use super::super::types::{BuildingKind, PlayerId, Stockpile, UnitKind, Upgrade};
use super::{BuildingStatus, CommandError, CommandMode, Production, ProductionItem, World};

/// Share of full health a freshly placed construction site starts with.
pub(super) const CONSTRUCTION_START_HEALTH: f32 = 0.1;

const SITE_SEARCH_RINGS: i32 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RepairOutcome {
    Repaired { whole: bool },
    Unaffordable,
    Missing,
}

impl World {
    pub(crate) fn unit_cost(&self, kind: UnitKind) -> Stockpile {
        let stats = self.config.units.stats(kind);
        Stockpile::new(stats.gold_cost, stats.lumber_cost)
    }

    pub(crate) fn building_cost(&self, kind: BuildingKind) -> Stockpile {
        let stats = self.config.buildings.stats(kind);
        Stockpile::new(stats.gold_cost, stats.lumber_cost)
    }

    /// Price of researching the level after `level`.
    pub(crate) fn upgrade_cost(&self, level: u32) -> Stockpile {
        let buildings = &self.config.buildings;
        let factor = level + 1;
        Stockpile::new(
            buildings.upgrade_gold_cost * factor,
            buildings.upgrade_lumber_cost * factor,
        )
    }

    pub(crate) fn can_afford(&self, player: PlayerId, cost: Stockpile) -> bool {
        self.player(player)
            .is_some_and(|found| found.stock.covers(cost))
    }

    /// Food taken by living units plus units in training.
    pub(crate) fn food_used(&self, player: PlayerId) -> u32 {
        let living: u32 = self
            .living_units_of(player)
            .map(|unit| self.config.units.stats(unit.kind).food)
            .sum();
        let training: u32 = self
            .buildings
            .values()
            .filter(|b| b.owner == player)
            .filter_map(|b| match b.production {
                Some(Production {
                    item: ProductionItem::Unit(kind),
                    ..
                }) => Some(self.config.units.stats(kind).food),
                _ => None,
            })
            .sum();
        living + training
    }

    pub(crate) fn food_cap(&self, player: PlayerId) -> u32 {
        self.buildings
            .values()
            .filter(|b| b.owner == player && b.is_complete())
            .map(|b| self.config.buildings.stats(b.kind).food_supply)
            .sum()
    }

    fn idle_building(&self, player: PlayerId, kind: BuildingKind) -> Option<EntityId> {
        self.buildings
            .values()
            .find(|b| b.owner == player && b.kind == kind && b.is_idle())
            .map(|b| b.id)
    }

    fn spend(
        &mut self,
        player: PlayerId,
        cost: Stockpile,
        what: String,
    ) -> Result<(), CommandError> {
        let found = self
            .player_mut(player)
            .ok_or(CommandError::UnknownPlayer(player))?;
        if found.stock.spend(cost) {
            Ok(())
        } else {
            Err(CommandError::Unaffordable { player, what })
        }
    }

    /// Checks everything [`World::train_unit`] checks, without spending.
    pub(crate) fn check_train(
        &self,
        player: PlayerId,
        kind: UnitKind,
    ) -> Result<EntityId, CommandError> {
        if self.player(player).is_none() {
            return Err(CommandError::UnknownPlayer(player));
        }
        if let Some(missing) = kind.requires() {
            if !self.has_finished(player, missing) {
                return Err(CommandError::MissingPrerequisite {
                    what: format!("{kind:?}"),
                    missing,
                });
            }
        }
        let producer = self
            .idle_building(player, kind.trained_at())
            .ok_or(CommandError::NoProducer(kind.trained_at()))?;
        let food = self.config.units.stats(kind).food;
        if self.food_used(player) + food > self.food_cap(player) {
            return Err(CommandError::NoFood(kind));
        }
        if !self.can_afford(player, self.unit_cost(kind)) {
            return Err(CommandError::Unaffordable {
                player,
                what: format!("{kind:?}"),
            });
        }
        Ok(producer)
    }

    /// Starts training `kind` in an idle producer. Returns the producer.
    pub(crate) fn train_unit(
        &mut self,
        player: PlayerId,
        kind: UnitKind,
    ) -> Result<EntityId, CommandError> {
        let producer = self.check_train(player, kind)?;
        self.spend(player, self.unit_cost(kind), format!("{kind:?}"))?;
        let seconds = self.config.units.stats(kind).train_seconds;
        if let Some(building) = self.buildings.get_mut(&producer) {
            building.production = Some(Production {
                item: ProductionItem::Unit(kind),
                remaining: seconds,
            });
        }
        debug!(player = %player, building = %producer, kind = ?kind, "training_started");
        Ok(producer)
    }

    pub(crate) fn check_research(
        &self,
        player: PlayerId,
        upgrade: Upgrade,
    ) -> Result<EntityId, CommandError> {
        let found = self
            .player(player)
            .ok_or(CommandError::UnknownPlayer(player))?;
        let level = found.upgrade_level(upgrade);
        let item = ProductionItem::Upgrade(upgrade);
        let researching = self
            .buildings
            .values()
            .any(|b| b.owner == player && b.production.is_some_and(|p| p.item == item));
        if researching {
            return Err(CommandError::AlreadyResearching(upgrade));
        }
        if level >= self.config.buildings.max_upgrade_level {
            return Err(CommandError::MaxLevel(upgrade));
        }
        let producer = self
            .idle_building(player, upgrade.researched_at())
            .ok_or(CommandError::NoProducer(upgrade.researched_at()))?;
        if !found.stock.covers(self.upgrade_cost(level)) {
            return Err(CommandError::Unaffordable {
                player,
                what: format!("{upgrade:?} level {}", level + 1),
            });
        }
        Ok(producer)
    }

    pub(crate) fn research(
        &mut self,
        player: PlayerId,
        upgrade: Upgrade,
    ) -> Result<EntityId, CommandError> {
        let producer = self.check_research(player, upgrade)?;
        let level = self
            .player(player)
            .map_or(0, |found| found.upgrade_level(upgrade));
        self.spend(player, self.upgrade_cost(level), format!("{upgrade:?}"))?;
        let seconds = self.config.buildings.upgrade_seconds;
        if let Some(building) = self.buildings.get_mut(&producer) {
            building.production = Some(Production {
                item: ProductionItem::Upgrade(upgrade),
                remaining: seconds,
            });
        }
        debug!(player = %player, building = %producer, upgrade = ?upgrade, "research_started");
        Ok(producer)
    }

    /// Free site for `kind`, searched in rings around the player's town hall
    /// (or `fallback` without one). Sites keep a walkable margin around them.
    pub(crate) fn find_building_site(
        &self,
        player: PlayerId,
        kind: BuildingKind,
        fallback: Vec2,
    ) -> Option<Vec2> {
        let radius = self.config.buildings.stats(kind).radius;
        let cell = self.config.world.cell_size;
        let (origin, inner) = match self.town_hall_of(player) {
            Some(hall) => (hall.position, hall.radius + radius + cell * 2.0),
            None => (fallback, 0.0),
        };
        let extent = self.paths.extent();
        let margin = radius + cell;
        let step = cell * 2.0;
        for ring in 0..SITE_SEARCH_RINGS {
            let distance = inner + ring as f32 * step;
            let samples = ((distance * std::f32::consts::TAU / step).ceil() as i32).max(1);
            for sample in 0..samples {
                let angle = sample as f32 / samples as f32 * std::f32::consts::TAU;
                let raw = origin + Vec2::new(angle.cos(), angle.sin()) * distance;
                // Snap to a cell center so footprints stay symmetric.
                let center = Vec2::new(
                    ((raw.x / cell).floor() + 0.5) * cell,
                    ((raw.y / cell).floor() + 0.5) * cell,
                );
                let inside = center.x - margin >= 0.0
                    && center.y - margin >= 0.0
                    && center.x + margin <= extent.x
                    && center.y + margin <= extent.y;
                if !inside || !self.paths.is_footprint_clear(center, margin) {
                    continue;
                }
                let clear_of_resources = self.resources.values().all(|node| {
                    node.position.distance(center) > node.radius + margin + cell
                });
                if clear_of_resources {
                    return Some(center);
                }
            }
        }
        None
    }

    pub(crate) fn check_build(
        &self,
        player: PlayerId,
        kind: BuildingKind,
    ) -> Result<(), CommandError> {
        if self.player(player).is_none() {
            return Err(CommandError::UnknownPlayer(player));
        }
        if let Some(missing) = kind.requires() {
            if !self.has_finished(player, missing) {
                return Err(CommandError::MissingPrerequisite {
                    what: format!("{kind:?}"),
                    missing,
                });
            }
        }
        if !self.can_afford(player, self.building_cost(kind)) {
            return Err(CommandError::Unaffordable {
                player,
                what: format!("{kind:?}"),
            });
        }
        Ok(())
    }

    /// Pays for a new `kind`, lays out its site and sends `builder` to it.
    pub(crate) fn place_building(
        &mut self,
        player: PlayerId,
        kind: BuildingKind,
        builder: EntityId,
    ) -> Result<EntityId, CommandError> {
        let builder_position = match self.unit(builder) {
            Some(unit) if unit.is_alive() && unit.owner == player => unit.position,
            _ => return Err(CommandError::UnknownUnit(builder)),
        };
        self.check_build(player, kind)?;
        let site = self
            .find_building_site(player, kind, builder_position)
            .ok_or(CommandError::NoSite(kind))?;
        self.spend(player, self.building_cost(kind), format!("{kind:?}"))?;
        let building = self.spawn_building(player, kind, site, false);
        let command = UnitCommand::Construct { building };
        if let Err(error) = self.issue_command(builder, command, CommandMode::Replace) {
            // The site stays; another worker can be sent to it.
            debug!(player = %player, building = %building, error = %error, "builder_not_assigned");
        }
        info!(
            player = %player,
            building = %building,
            kind = ?kind,
            x = site.x,
            y = site.y,
            "construction_started"
        );
        Ok(building)
    }

    /// Adds `seconds` of work to a construction site. True once it stands.
    pub(crate) fn advance_construction(&mut self, id: EntityId, seconds: f32) -> bool {
        let Some(building) = self.buildings.get_mut(&id) else {
            return false;
        };
        let BuildingStatus::UnderConstruction { progress } = building.status else {
            return true;
        };
        let stats = self.config.buildings.stats(building.kind);
        let build_seconds = stats.build_seconds.max(f32::EPSILON);
        let share = seconds / build_seconds;
        let progress = progress + share;
        let gain = building.max_health * (1.0 - CONSTRUCTION_START_HEALTH) * share;
        building.health = (building.health + gain).min(building.max_health);
        if progress + 1e-4 < 1.0 {
            building.status = BuildingStatus::UnderConstruction { progress };
            return false;
        }
        building.status = BuildingStatus::Complete;
        building.health = building.max_health;
        info!(building = %id, owner = %building.owner, kind = ?building.kind, "building_completed");
        true
    }

    /// One repair cycle of `seconds`, paid from the owner's stock.
    pub(crate) fn repair_building(&mut self, id: EntityId, seconds: f32) -> RepairOutcome {
        let Some(building) = self.buildings.get(&id) else {
            return RepairOutcome::Missing;
        };
        let stats = self.config.buildings.stats(building.kind);
        let heal = (building.max_health * seconds / stats.build_seconds.max(f32::EPSILON))
            .min(building.max_health - building.health);
        let share = heal / building.max_health * self.config.buildings.repair_cost_ratio;
        let cost = Stockpile::new(
            (stats.gold_cost as f32 * share).ceil() as u32,
            (stats.lumber_cost as f32 * share).ceil() as u32,
        );
        let owner = building.owner;
        let paid = self
            .player_mut(owner)
            .is_some_and(|player| player.stock.spend(cost));
        if !paid {
            return RepairOutcome::Unaffordable;
        }
        let Some(building) = self.buildings.get_mut(&id) else {
            return RepairOutcome::Missing;
        };
        building.health = (building.health + heal).min(building.max_health);
        RepairOutcome::Repaired {
            whole: !building.is_damaged(),
        }
    }

    /// Advances training and research queues; finished units appear next to
    /// their building.
    pub(crate) fn update_production(&mut self, dt: f32) {
        let mut finished = Vec::new();
        for building in self.buildings.values_mut() {
            let Some(production) = building.production.as_mut() else {
                continue;
            };
            production.remaining -= dt;
            if production.remaining <= 0.0 {
                finished.push((
                    building.id,
                    building.owner,
                    building.position,
                    building.radius,
                    production.item,
                ));
                building.production = None;
            }
        }
        for (building, owner, position, radius, item) in finished {
            match item {
                ProductionItem::Unit(kind) => {
                    let door = position + Vec2::new(0.0, radius + self.config.world.cell_size);
                    let unit = self.spawn_unit(owner, kind, door);
                    info!(
                        player = %owner,
                        building = %building,
                        unit = %unit,
                        kind = ?kind,
                        "unit_trained"
                    );
                }
                ProductionItem::Upgrade(upgrade) => {
                    if let Some(player) = self.player_mut(owner) {
                        match upgrade {
                            Upgrade::Weapons => player.weapons_level += 1,
                            Upgrade::Armor => player.armor_level += 1,
                        }
                        info!(
                            player = %owner,
                            upgrade = ?upgrade,
                            level = player.upgrade_level(upgrade),
                            "upgrade_researched"
                        );
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{run, world, HOME};
    use super::*;
    use crate::app::gameplay::tasks::TaskKind;

    #[test]
    fn training_needs_food_money_and_an_idle_producer() {
        let mut world = world();
        world.spawn_building(HOME, BuildingKind::TownHall, Vec2::new(100.0, 100.0), true);
        assert_eq!(world.food_cap(HOME), 4);

        let before = world.player(HOME).expect("home").stock;
        world.train_unit(HOME, UnitKind::Peasant).expect("peasant");
        assert_eq!(
            world.player(HOME).expect("home").stock.gold,
            before.gold - world.config.units.peasant.gold_cost
        );
        assert!(matches!(
            world.train_unit(HOME, UnitKind::Peasant),
            Err(CommandError::NoProducer(BuildingKind::TownHall))
        ));
        assert!(matches!(
            world.train_unit(HOME, UnitKind::Footman),
            Err(CommandError::NoProducer(BuildingKind::Barracks))
        ));
        assert!(matches!(
            world.train_unit(HOME, UnitKind::Archer),
            Err(CommandError::MissingPrerequisite { missing, .. })
                if missing == BuildingKind::LumberMill
        ));

        let seconds = world.config.units.peasant.train_seconds;
        run(&mut world, (seconds / 0.1).ceil() as u32 + 1, 0.1);
        assert_eq!(world.living_units_of(HOME).count(), 1);
        assert_eq!(world.food_used(HOME), 1);
    }

    #[test]
    fn food_cap_limits_training() {
        let mut world = world();
        world.spawn_building(HOME, BuildingKind::TownHall, Vec2::new(100.0, 100.0), true);
        for offset in 0..4 {
            let spot = Vec2::new(200.0 + offset as f32 * 8.0, 200.0);
            world.spawn_unit(HOME, UnitKind::Peasant, spot);
        }
        assert!(matches!(
            world.train_unit(HOME, UnitKind::Peasant),
            Err(CommandError::NoFood(UnitKind::Peasant))
        ));
    }

    #[test]
    fn placing_a_building_pays_and_dispatches_the_builder() {
        let mut world = world();
        world.spawn_building(HOME, BuildingKind::TownHall, Vec2::new(204.0, 204.0), true);
        let peasant = world.spawn_unit(HOME, UnitKind::Peasant, Vec2::new(204.0, 240.0));
        let before = world.player(HOME).expect("home").stock;

        let farm = world
            .place_building(HOME, BuildingKind::Farm, peasant)
            .expect("farm placed");
        let site = world.building(farm).expect("site");
        assert!(!site.is_complete());
        assert!(!world.paths.is_walkable(site.position));
        assert_eq!(
            world.player(HOME).expect("home").stock,
            Stockpile::new(before.gold - 80, before.lumber - 20)
        );
        assert_eq!(
            world.unit(peasant).expect("peasant").task_kind(),
            Some(TaskKind::Construct)
        );

        let build_seconds = world.config.buildings.farm.build_seconds;
        run(&mut world, (build_seconds / 0.1) as u32 + 200, 0.1);
        assert!(world.building(farm).expect("farm").is_complete());
        assert_eq!(world.food_cap(HOME), 8);
        assert_eq!(
            world.unit(peasant).expect("peasant").task_kind(),
            Some(TaskKind::Idle)
        );
    }

    #[test]
    fn barracks_need_a_finished_town_hall() {
        let mut world = world();
        let peasant = world.spawn_unit(HOME, UnitKind::Peasant, Vec2::new(204.0, 240.0));
        assert!(matches!(
            world.place_building(HOME, BuildingKind::Barracks, peasant),
            Err(CommandError::MissingPrerequisite { missing, .. })
                if missing == BuildingKind::TownHall
        ));
    }

    #[test]
    fn research_raises_the_upgrade_level() {
        let mut world = world();
        let mill_at = Vec2::new(100.0, 100.0);
        world.spawn_building(HOME, BuildingKind::LumberMill, mill_at, true);
        world.research(HOME, Upgrade::Weapons).expect("research");
        assert!(matches!(
            world.research(HOME, Upgrade::Weapons),
            Err(CommandError::AlreadyResearching(Upgrade::Weapons))
        ));
        let seconds = world.config.buildings.upgrade_seconds;
        run(&mut world, (seconds / 0.1).ceil() as u32 + 1, 0.1);
        assert_eq!(world.player(HOME).expect("home").weapons_level, 1);
        assert_eq!(
            world.upgrade_cost(1),
            Stockpile::new(200, 100)
        );
    }
}
