use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use engine::{LoopConfig, MovementTuning};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use super::gameplay::{BuildingKind, UnitKind};

#[derive(Debug, Error)]
pub(crate) enum ConfigError {
    #[error("failed to read config '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config json at {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid config at {path}: {message}")]
    Invalid { path: &'static str, message: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub(crate) struct GameConfig {
    pub seed: u64,
    pub world: WorldConfig,
    pub units: UnitsConfig,
    pub buildings: BuildingsConfig,
    pub harvest: HarvestConfig,
    pub combat: CombatConfig,
    pub movement: MovementTuning,
    pub ai: AiConfig,
    pub scenario: ScenarioConfig,
    #[serde(rename = "loop")]
    pub run: LoopConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub(crate) struct WorldConfig {
    pub width_cells: u32,
    pub height_cells: u32,
    pub cell_size: f32,
    /// Path queries resolved per tick; the rest wait in priority order.
    pub queries_per_tick: usize,
    pub corpse_seconds: f32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            width_cells: 64,
            height_cells: 64,
            cell_size: 8.0,
            queries_per_tick: 8,
            corpse_seconds: 5.0,
        }
    }
}

/// Overrides layered on a preset: every field left out of the JSON keeps
/// the preset's value.
macro_rules! stat_overrides {
    ($patch:ident for $stats:ident { $($field:ident: $ty:ty),* $(,)? }) => {
        #[derive(Debug, Default, Deserialize)]
        #[serde(default)]
        struct $patch {
            $($field: Option<$ty>,)*
        }

        impl $patch {
            fn apply(self, mut base: $stats) -> $stats {
                $(
                    if let Some(value) = self.$field {
                        base.$field = value;
                    }
                )*
                base
            }
        }
    };
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub(crate) struct UnitStats {
    pub max_health: f32,
    pub speed: f32,
    pub radius: f32,
    pub attack: f32,
    pub defense: f32,
    pub attack_range: f32,
    pub attack_cooldown_seconds: f32,
    pub sight_range: f32,
    pub gold_cost: u32,
    pub lumber_cost: u32,
    pub food: u32,
    pub train_seconds: f32,
}

stat_overrides!(UnitStatsPatch for UnitStats {
    max_health: f32,
    speed: f32,
    radius: f32,
    attack: f32,
    defense: f32,
    attack_range: f32,
    attack_cooldown_seconds: f32,
    sight_range: f32,
    gold_cost: u32,
    lumber_cost: u32,
    food: u32,
    train_seconds: f32,
});

impl UnitStats {
    pub(crate) fn peasant() -> Self {
        Self {
            max_health: 30.0,
            speed: 40.0,
            radius: 3.0,
            attack: 3.0,
            defense: 0.0,
            attack_range: 2.0,
            attack_cooldown_seconds: 1.0,
            sight_range: 80.0,
            gold_cost: 50,
            lumber_cost: 0,
            food: 1,
            train_seconds: 8.0,
        }
    }

    pub(crate) fn footman() -> Self {
        Self {
            max_health: 60.0,
            speed: 35.0,
            attack: 8.0,
            defense: 2.0,
            sight_range: 100.0,
            gold_cost: 60,
            lumber_cost: 10,
            train_seconds: 12.0,
            ..Self::peasant()
        }
    }

    pub(crate) fn archer() -> Self {
        Self {
            max_health: 40.0,
            attack: 6.0,
            attack_range: 60.0,
            attack_cooldown_seconds: 1.2,
            sight_range: 120.0,
            gold_cost: 50,
            lumber_cost: 20,
            train_seconds: 12.0,
            ..Self::peasant()
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub(crate) struct UnitsConfig {
    pub peasant: UnitStats,
    pub footman: UnitStats,
    pub archer: UnitStats,
}

impl Default for UnitsConfig {
    fn default() -> Self {
        Self {
            peasant: UnitStats::peasant(),
            footman: UnitStats::footman(),
            archer: UnitStats::archer(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct UnitsPatch {
    peasant: UnitStatsPatch,
    footman: UnitStatsPatch,
    archer: UnitStatsPatch,
}

impl<'de> Deserialize<'de> for UnitsConfig {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let patch = UnitsPatch::deserialize(deserializer)?;
        Ok(Self {
            peasant: patch.peasant.apply(UnitStats::peasant()),
            footman: patch.footman.apply(UnitStats::footman()),
            archer: patch.archer.apply(UnitStats::archer()),
        })
    }
}

impl UnitsConfig {
    pub(crate) fn stats(&self, kind: UnitKind) -> &UnitStats {
        match kind {
            UnitKind::Peasant => &self.peasant,
            UnitKind::Footman => &self.footman,
            UnitKind::Archer => &self.archer,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub(crate) struct BuildingStats {
    pub max_health: f32,
    pub radius: f32,
    pub defense: f32,
    pub gold_cost: u32,
    pub lumber_cost: u32,
    pub build_seconds: f32,
    pub food_supply: u32,
    pub max_builders: u32,
}

stat_overrides!(BuildingStatsPatch for BuildingStats {
    max_health: f32,
    radius: f32,
    defense: f32,
    gold_cost: u32,
    lumber_cost: u32,
    build_seconds: f32,
    food_supply: u32,
    max_builders: u32,
});

impl BuildingStats {
    pub(crate) fn town_hall() -> Self {
        Self {
            max_health: 1200.0,
            radius: 14.0,
            defense: 5.0,
            gold_cost: 400,
            lumber_cost: 200,
            build_seconds: 60.0,
            food_supply: 4,
            max_builders: 4,
        }
    }

    pub(crate) fn farm() -> Self {
        Self {
            max_health: 300.0,
            radius: 8.0,
            defense: 2.0,
            gold_cost: 80,
            lumber_cost: 20,
            build_seconds: 15.0,
            food_supply: 4,
            max_builders: 2,
        }
    }

    pub(crate) fn barracks() -> Self {
        Self {
            max_health: 600.0,
            radius: 12.0,
            defense: 3.0,
            gold_cost: 160,
            lumber_cost: 60,
            build_seconds: 30.0,
            food_supply: 0,
            max_builders: 3,
        }
    }

    pub(crate) fn lumber_mill() -> Self {
        Self {
            max_health: 400.0,
            radius: 10.0,
            defense: 2.0,
            gold_cost: 120,
            lumber_cost: 80,
            build_seconds: 25.0,
            food_supply: 0,
            max_builders: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub(crate) struct BuildingsConfig {
    pub town_hall: BuildingStats,
    pub farm: BuildingStats,
    pub barracks: BuildingStats,
    pub lumber_mill: BuildingStats,
    /// Seconds between discrete construction or repair steps.
    pub work_cycle_seconds: f32,
    /// Share of the building's cost charged for repairing it from zero to full.
    pub repair_cost_ratio: f32,
    pub upgrade_gold_cost: u32,
    pub upgrade_lumber_cost: u32,
    pub upgrade_seconds: f32,
    pub max_upgrade_level: u32,
}

impl Default for BuildingsConfig {
    fn default() -> Self {
        Self {
            town_hall: BuildingStats::town_hall(),
            farm: BuildingStats::farm(),
            barracks: BuildingStats::barracks(),
            lumber_mill: BuildingStats::lumber_mill(),
            work_cycle_seconds: 1.0,
            repair_cost_ratio: 0.3,
            upgrade_gold_cost: 100,
            upgrade_lumber_cost: 50,
            upgrade_seconds: 20.0,
            max_upgrade_level: 3,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct BuildingsPatch {
    town_hall: BuildingStatsPatch,
    farm: BuildingStatsPatch,
    barracks: BuildingStatsPatch,
    lumber_mill: BuildingStatsPatch,
    work_cycle_seconds: Option<f32>,
    repair_cost_ratio: Option<f32>,
    upgrade_gold_cost: Option<u32>,
    upgrade_lumber_cost: Option<u32>,
    upgrade_seconds: Option<f32>,
    max_upgrade_level: Option<u32>,
}

impl<'de> Deserialize<'de> for BuildingsConfig {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let patch = BuildingsPatch::deserialize(deserializer)?;
        let base = Self::default();
        Ok(Self {
            town_hall: patch.town_hall.apply(base.town_hall),
            farm: patch.farm.apply(base.farm),
            barracks: patch.barracks.apply(base.barracks),
            lumber_mill: patch.lumber_mill.apply(base.lumber_mill),
            work_cycle_seconds: patch.work_cycle_seconds.unwrap_or(base.work_cycle_seconds),
            repair_cost_ratio: patch.repair_cost_ratio.unwrap_or(base.repair_cost_ratio),
            upgrade_gold_cost: patch.upgrade_gold_cost.unwrap_or(base.upgrade_gold_cost),
            upgrade_lumber_cost: patch
                .upgrade_lumber_cost
                .unwrap_or(base.upgrade_lumber_cost),
            upgrade_seconds: patch.upgrade_seconds.unwrap_or(base.upgrade_seconds),
            max_upgrade_level: patch.max_upgrade_level.unwrap_or(base.max_upgrade_level),
        })
    }
}

impl BuildingsConfig {
    pub(crate) fn stats(&self, kind: BuildingKind) -> &BuildingStats {
        match kind {
            BuildingKind::TownHall => &self.town_hall,
            BuildingKind::Farm => &self.farm,
            BuildingKind::Barracks => &self.barracks,
            BuildingKind::LumberMill => &self.lumber_mill,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub(crate) struct HarvestConfig {
    pub gold_capacity: u32,
    pub lumber_capacity: u32,
    pub gold_per_second: f32,
    pub lumber_per_second: f32,
    pub cycle_seconds: f32,
    pub goldmine_slots: u32,
    pub tree_slots: u32,
    /// How long a worker waits at a full resource before looking elsewhere.
    pub full_wait_seconds: f32,
    /// Slack added to the footprint reach test.
    pub reach_tolerance: f32,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            gold_capacity: 10,
            lumber_capacity: 10,
            gold_per_second: 10.0,
            lumber_per_second: 5.0,
            cycle_seconds: 0.5,
            goldmine_slots: 5,
            tree_slots: 1,
            full_wait_seconds: 1.0,
            reach_tolerance: 8.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub(crate) struct CombatConfig {
    pub idle_scan_seconds: f32,
    pub target_rescan_seconds: f32,
    /// Extra distance a chase may open up before the attacker gives chase again.
    pub range_slack: f32,
    pub min_damage: f32,
    /// Added per weapons or armor upgrade level.
    pub upgrade_step: f32,
    pub idle_turn_chance: f32,
}

impl Default for CombatConfig {
    fn default() -> Self {
        Self {
            idle_scan_seconds: 0.5,
            target_rescan_seconds: 1.0,
            range_slack: 4.0,
            min_damage: 1.0,
            upgrade_step: 1.0,
            idle_turn_chance: 0.02,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub(crate) struct IntervalRange {
    pub min: f32,
    pub max: f32,
}

impl IntervalRange {
    pub(crate) const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub(crate) struct AiConfig {
    pub develop_interval: IntervalRange,
    pub attack_interval: IntervalRange,
    pub defend_interval: IntervalRange,
    /// Arbitrations between re-rolls of the per-request weight factors.
    pub factor_refresh_arbitrations: u32,
    pub desired_workers: u32,
    pub desired_army: u32,
    /// Fraction of gathering workers sent to gold; the rest cut lumber.
    pub miner_share: f32,
    pub advantage_smoothing: f32,
    pub required_positive_streak: u32,
    pub initial_squad_size: u32,
    pub squad_growth: u32,
    pub worker_threat_weight: f32,
    pub threat_half_saturation: f32,
    pub distance_bonus_weight: f32,
    pub distance_bonus_scale: f32,
    /// Buildings subtract this from their attack priority so they are preferred.
    pub building_priority_offset: f32,
    pub defend_radius: f32,
    pub worker_pull_factor: u32,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            develop_interval: IntervalRange::new(2.0, 4.0),
            attack_interval: IntervalRange::new(4.0, 6.0),
            defend_interval: IntervalRange::new(1.0, 2.0),
            factor_refresh_arbitrations: 10,
            desired_workers: 8,
            desired_army: 12,
            miner_share: 0.6,
            advantage_smoothing: 0.5,
            required_positive_streak: 5,
            initial_squad_size: 4,
            squad_growth: 2,
            worker_threat_weight: 0.2,
            threat_half_saturation: 10.0,
            distance_bonus_weight: 0.1,
            distance_bonus_scale: 200.0,
            building_priority_offset: 100.0,
            defend_radius: 200.0,
            worker_pull_factor: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub(crate) struct ScenarioConfig {
    pub players: u32,
    pub starting_gold: u32,
    pub starting_lumber: u32,
    pub starting_workers: u32,
    pub gold_per_mine: u32,
    pub lumber_per_tree: u32,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            players: 2,
            starting_gold: 500,
            starting_lumber: 200,
            starting_workers: 4,
            gold_per_mine: 5000,
            lumber_per_tree: 100,
        }
    }
}

impl GameConfig {
    pub(crate) fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub(crate) fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let mut deserializer = serde_json::Deserializer::from_str(raw);
        let config: GameConfig = serde_path_to_error::deserialize(&mut deserializer).map_err(
            |error| {
                let path = error.path().to_string();
                ConfigError::Parse {
                    path: if path.is_empty() { ".".to_string() } else { path },
                    source: error.into_inner(),
                }
            },
        )?;
        config.validate()?;
        Ok(config)
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(path: &'static str, message: impl Into<String>) -> ConfigError {
            ConfigError::Invalid {
                path,
                message: message.into(),
            }
        }

        if self.world.width_cells < 8 || self.world.height_cells < 8 {
            return Err(invalid("world", "map must be at least 8x8 cells"));
        }
        if !(self.world.cell_size > 0.0) {
            return Err(invalid("world.cell_size", "must be positive"));
        }
        if self.world.queries_per_tick == 0 {
            return Err(invalid("world.queries_per_tick", "must be at least 1"));
        }
        if !(self.harvest.cycle_seconds > 0.0) {
            return Err(invalid("harvest.cycle_seconds", "must be positive"));
        }
        if self.harvest.gold_capacity == 0 || self.harvest.lumber_capacity == 0 {
            return Err(invalid("harvest", "carry capacities must be positive"));
        }
        if self.harvest.goldmine_slots == 0 || self.harvest.tree_slots == 0 {
            return Err(invalid("harvest", "resource slots must be positive"));
        }
        if !(self.buildings.work_cycle_seconds > 0.0) {
            return Err(invalid("buildings.work_cycle_seconds", "must be positive"));
        }
        for (path, interval) in [
            ("ai.develop_interval", self.ai.develop_interval),
            ("ai.attack_interval", self.ai.attack_interval),
            ("ai.defend_interval", self.ai.defend_interval),
        ] {
            let (min, max) = (interval.min, interval.max);
            if !(min > 0.0) || max < min {
                return Err(invalid(path, format!("expected 0 < min <= max, got {min}..{max}")));
            }
        }
        if !(0.0..=1.0).contains(&self.ai.advantage_smoothing) {
            return Err(invalid("ai.advantage_smoothing", "must lie in [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.ai.miner_share) {
            return Err(invalid("ai.miner_share", "must lie in [0, 1]"));
        }
        if self.scenario.players == 0 || self.scenario.players > 4 {
            return Err(invalid("scenario.players", "expected 1 to 4 players"));
        }
        Ok(())
    }
}
