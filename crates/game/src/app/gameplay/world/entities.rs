use std::collections::VecDeque;

use engine::{Brush, EntityId, Movable, PathTag, SlotCounter, Vec2};

use super::super::tasks::{TaskKind, TaskState, UnitCommand};
use super::super::types::{
    BuildingKind, Cargo, PlayerId, ResourceKind, Stockpile, UnitKind, Upgrade,
};

#[derive(Debug, Clone)]
pub(crate) struct Player {
    pub id: PlayerId,
    pub stock: Stockpile,
    pub weapons_level: u32,
    pub armor_level: u32,
    pub computer: bool,
    pub defeated: bool,
}

impl Player {
    pub(crate) fn new(id: PlayerId, stock: Stockpile, computer: bool) -> Self {
        Self {
            id,
            stock,
            weapons_level: 0,
            armor_level: 0,
            computer,
            defeated: false,
        }
    }

    pub(crate) fn upgrade_level(&self, upgrade: Upgrade) -> u32 {
        match upgrade {
            Upgrade::Weapons => self.weapons_level,
            Upgrade::Armor => self.armor_level,
        }
    }
}

#[derive(Debug)]
pub(crate) struct Unit {
    pub id: EntityId,
    pub owner: PlayerId,
    pub kind: UnitKind,
    pub position: Vec2,
    pub facing: Vec2,
    pub brush: Brush,
    pub speed: f32,
    pub tag: PathTag,
    pub health: f32,
    pub cargo: Cargo,
    pub dying: bool,
    /// Taken out while the task runs, so it is `None` only mid-update.
    pub(crate) task: Option<TaskState>,
    pub(crate) commands: VecDeque<UnitCommand>,
    /// Tasks interrupted by a higher-priority order; consumed before `commands`.
    pub(crate) resume: VecDeque<UnitCommand>,
}

impl Unit {
    pub(crate) fn is_alive(&self) -> bool {
        !self.dying && self.health > 0.0
    }

    pub(crate) fn task_kind(&self) -> Option<TaskKind> {
        self.task.as_ref().map(TaskState::kind)
    }

    /// Idle with nothing queued.
    pub(crate) fn is_idle(&self) -> bool {
        self.task_kind().map_or(true, |kind| kind == TaskKind::Idle)
            && self.commands.is_empty()
            && self.resume.is_empty()
    }
}

impl Movable for Unit {
    fn id(&self) -> EntityId {
        self.id
    }

    fn position(&self) -> Vec2 {
        self.position
    }

    fn set_position(&mut self, position: Vec2) {
        self.position = position;
    }

    fn facing(&self) -> Vec2 {
        self.facing
    }

    fn set_facing(&mut self, facing: Vec2) {
        self.facing = facing;
    }

    fn brush(&self) -> Brush {
        self.brush
    }

    fn speed(&self) -> f32 {
        self.speed
    }

    fn ignore_dynamic_obstacles(&self) -> bool {
        false
    }

    fn path_tag(&self) -> PathTag {
        self.tag
    }

    fn set_path_tag(&mut self, tag: PathTag) {
        self.tag = tag;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum BuildingStatus {
    UnderConstruction { progress: f32 },
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum ProductionItem {
    Unit(UnitKind),
    Upgrade(Upgrade),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Production {
    pub item: ProductionItem,
    pub remaining: f32,
}

#[derive(Debug, Clone)]
pub(crate) struct Building {
    pub id: EntityId,
    pub owner: PlayerId,
    pub kind: BuildingKind,
    pub position: Vec2,
    pub radius: f32,
    pub health: f32,
    pub max_health: f32,
    pub status: BuildingStatus,
    pub builders: SlotCounter,
    pub production: Option<Production>,
}

impl Building {
    pub(crate) fn is_complete(&self) -> bool {
        self.status == BuildingStatus::Complete
    }

    pub(crate) fn is_damaged(&self) -> bool {
        self.health < self.max_health
    }

    pub(crate) fn is_idle(&self) -> bool {
        self.is_complete() && self.production.is_none()
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ResourceNode {
    pub id: EntityId,
    pub kind: ResourceKind,
    pub position: Vec2,
    pub radius: f32,
    pub amount: u32,
    pub harvesters: SlotCounter,
}
