use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub(crate) struct PlayerId(pub u8);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub(crate) enum UnitKind {
    Peasant,
    Footman,
    Archer,
}

impl UnitKind {
    pub(crate) fn is_worker(self) -> bool {
        matches!(self, UnitKind::Peasant)
    }

    pub(crate) fn trained_at(self) -> BuildingKind {
        match self {
            UnitKind::Peasant => BuildingKind::TownHall,
            UnitKind::Footman | UnitKind::Archer => BuildingKind::Barracks,
        }
    }

    /// Extra building that must be standing before this unit can be trained.
    pub(crate) fn requires(self) -> Option<BuildingKind> {
        match self {
            UnitKind::Archer => Some(BuildingKind::LumberMill),
            UnitKind::Peasant | UnitKind::Footman => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub(crate) enum BuildingKind {
    TownHall,
    Farm,
    Barracks,
    LumberMill,
}

impl BuildingKind {
    pub(crate) fn requires(self) -> Option<BuildingKind> {
        match self {
            BuildingKind::TownHall | BuildingKind::Farm => None,
            BuildingKind::Barracks | BuildingKind::LumberMill => Some(BuildingKind::TownHall),
        }
    }

    pub(crate) fn accepts(self, resource: ResourceKind) -> bool {
        match self {
            BuildingKind::TownHall => true,
            BuildingKind::LumberMill => resource == ResourceKind::Lumber,
            BuildingKind::Farm | BuildingKind::Barracks => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub(crate) enum ResourceKind {
    /// Goldmines.
    Gold,
    /// Trees.
    Lumber,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub(crate) enum Upgrade {
    Weapons,
    Armor,
}

impl Upgrade {
    pub(crate) fn researched_at(self) -> BuildingKind {
        match self {
            Upgrade::Weapons => BuildingKind::LumberMill,
            Upgrade::Armor => BuildingKind::Barracks,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Cargo {
    pub kind: Option<ResourceKind>,
    pub amount: u32,
}

impl Cargo {
    pub(crate) fn is_empty(&self) -> bool {
        self.amount == 0
    }

    pub(crate) fn amount_of(&self, kind: ResourceKind) -> u32 {
        if self.kind == Some(kind) {
            self.amount
        } else {
            0
        }
    }

    /// Loads `amount` of `kind`, dropping whatever else was carried.
    pub(crate) fn load(&mut self, kind: ResourceKind, amount: u32) {
        if self.kind != Some(kind) {
            self.kind = Some(kind);
            self.amount = 0;
        }
        self.amount = self.amount.saturating_add(amount);
    }

    pub(crate) fn take(&mut self) -> Option<(ResourceKind, u32)> {
        let kind = self.kind.take()?;
        let amount = std::mem::take(&mut self.amount);
        (amount > 0).then_some((kind, amount))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct Stockpile {
    pub gold: u32,
    pub lumber: u32,
}

impl Stockpile {
    pub(crate) const fn new(gold: u32, lumber: u32) -> Self {
        Self { gold, lumber }
    }

    pub(crate) fn covers(&self, cost: Stockpile) -> bool {
        self.gold >= cost.gold && self.lumber >= cost.lumber
    }

    pub(crate) fn add(&mut self, kind: ResourceKind, amount: u32) {
        match kind {
            ResourceKind::Gold => self.gold = self.gold.saturating_add(amount),
            ResourceKind::Lumber => self.lumber = self.lumber.saturating_add(amount),
        }
    }

    /// Deducts `cost` if it is covered; leaves the stockpile untouched otherwise.
    pub(crate) fn spend(&mut self, cost: Stockpile) -> bool {
        if !self.covers(cost) {
            return false;
        }
        self.gold -= cost.gold;
        self.lumber -= cost.lumber;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cargo_switching_kinds_drops_previous_load() {
        let mut cargo = Cargo::default();
        cargo.load(ResourceKind::Gold, 5);
        cargo.load(ResourceKind::Gold, 5);
        assert_eq!(cargo.amount_of(ResourceKind::Gold), 10);
        cargo.load(ResourceKind::Lumber, 3);
        assert_eq!(cargo.amount_of(ResourceKind::Gold), 0);
        assert_eq!(cargo.take(), Some((ResourceKind::Lumber, 3)));
        assert!(cargo.is_empty());
        assert_eq!(cargo.take(), None);
    }

    #[test]
    fn spend_is_all_or_nothing() {
        let mut stock = Stockpile::new(100, 10);
        assert!(!stock.spend(Stockpile::new(50, 20)));
        assert_eq!(stock, Stockpile::new(100, 10));
        assert!(stock.spend(Stockpile::new(50, 10)));
        assert_eq!(stock, Stockpile::new(50, 0));
    }
}
