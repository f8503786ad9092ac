use engine::{EntityId, EventResult, MoveToPosition, SlotClaim, State, StateEvent, StateResult};
use tracing::debug;

use super::{drive_move, end_move, forward_move_event, move_to, TaskContext};
use crate::app::gameplay::types::ResourceKind;
use crate::app::gameplay::world::World;

#[derive(Debug)]
enum Phase {
    FindResource,
    MoveToResource {
        node: EntityId,
        movement: MoveToPosition,
    },
    /// The node was full on arrival; try again once before looking elsewhere.
    Wait { node: EntityId, remaining: f32 },
    Work {
        node: EntityId,
        claim: SlotClaim,
        elapsed: f32,
    },
    BackToDeposit {
        deposit: EntityId,
        movement: MoveToPosition,
    },
}

/// Gather loop shared by gold and lumber: find a node, walk there, take a
/// harvester slot, fill up, carry the load to the nearest deposit, repeat.
#[derive(Debug)]
pub(crate) struct HarvestTask {
    result: StateResult,
    kind: ResourceKind,
    phase: Phase,
    /// Node to return to after a delivery.
    preferred: Option<EntityId>,
    /// Nodes that could not be reached or joined since the last delivery.
    rejected: Vec<EntityId>,
    delivered: u32,
}

impl HarvestTask {
    pub(crate) fn new(kind: ResourceKind, node: Option<EntityId>) -> Self {
        Self {
            result: StateResult::Inactive,
            kind,
            phase: Phase::FindResource,
            preferred: node,
            rejected: Vec::new(),
            delivered: 0,
        }
    }

    /// Node currently worked or walked to, else the one the unit returns to.
    pub(crate) fn node(&self) -> Option<EntityId> {
        match self.phase {
            Phase::MoveToResource { node, .. }
            | Phase::Wait { node, .. }
            | Phase::Work { node, .. } => Some(node),
            Phase::FindResource | Phase::BackToDeposit { .. } => self.preferred,
        }
    }

    #[cfg(test)]
    pub(crate) fn delivered(&self) -> u32 {
        self.delivered
    }

    #[cfg(test)]
    pub(crate) fn is_working(&self) -> bool {
        matches!(self.phase, Phase::Work { .. })
    }

    #[cfg(test)]
    pub(crate) fn is_returning(&self) -> bool {
        matches!(self.phase, Phase::BackToDeposit { .. })
    }

    fn capacity(&self, world: &World) -> u32 {
        match self.kind {
            ResourceKind::Gold => world.config.harvest.gold_capacity,
            ResourceKind::Lumber => world.config.harvest.lumber_capacity,
        }
    }

    fn per_cycle(&self, world: &World) -> u32 {
        let harvest = &world.config.harvest;
        let rate = match self.kind {
            ResourceKind::Gold => harvest.gold_per_second,
            ResourceKind::Lumber => harvest.lumber_per_second,
        };
        ((rate * harvest.cycle_seconds).round() as u32).max(1)
    }

    fn node_available(&self, world: &World, node: EntityId) -> bool {
        world
            .resource(node)
            .is_some_and(|found| found.kind == self.kind && found.amount > 0)
    }

    fn fail(&mut self, reason: &'static str, ctx: &TaskContext<'_>) -> Phase {
        debug!(unit = %ctx.unit, kind = ?self.kind, reason, "harvest_failed");
        self.result = StateResult::Failed;
        Phase::FindResource
    }

    fn find_resource(&mut self, ctx: &mut TaskContext<'_>) -> Phase {
        let Some(unit) = ctx.world.unit(ctx.unit) else {
            return self.fail("unit_missing", ctx);
        };
        let (position, carrying) = (unit.position, !unit.cargo.is_empty());
        let world = &*ctx.world;
        let node = self
            .preferred
            .filter(|id| !self.rejected.contains(id) && self.node_available(world, *id))
            .or_else(|| world.nearest_resource(self.kind, position, &self.rejected));
        match node.and_then(|id| world.resource(id).map(|found| (id, found.position))) {
            Some((node, destination)) => Phase::MoveToResource {
                node,
                movement: move_to(ctx.world, destination),
            },
            None if carrying => self.head_to_deposit(ctx),
            None => self.fail("no_resource", ctx),
        }
    }

    fn claim_or_wait(&mut self, ctx: &mut TaskContext<'_>, node: EntityId) -> Phase {
        self.preferred = Some(node);
        match ctx
            .world
            .resource(node)
            .and_then(|found| found.harvesters.try_claim())
        {
            Some(claim) => Phase::Work {
                node,
                claim,
                elapsed: 0.0,
            },
            None => Phase::Wait {
                node,
                remaining: ctx.world.config.harvest.full_wait_seconds,
            },
        }
    }

    fn head_to_deposit(&mut self, ctx: &mut TaskContext<'_>) -> Phase {
        let Some(unit) = ctx.world.unit(ctx.unit) else {
            return self.fail("unit_missing", ctx);
        };
        let kind = unit.cargo.kind.unwrap_or(self.kind);
        let deposit = ctx
            .world
            .nearest_deposit(unit.owner, kind, unit.position)
            .and_then(|id| ctx.world.building(id).map(|found| (id, found.position)));
        match deposit {
            Some((deposit, destination)) => Phase::BackToDeposit {
                deposit,
                movement: move_to(ctx.world, destination),
            },
            None => self.fail("no_deposit", ctx),
        }
    }

    fn deliver(&mut self, ctx: &mut TaskContext<'_>, deposit: EntityId) {
        let Some(unit) = ctx.world.unit_mut(ctx.unit) else {
            return;
        };
        let owner = unit.owner;
        let Some((kind, amount)) = unit.cargo.take() else {
            return;
        };
        if let Some(player) = ctx.world.player_mut(owner) {
            player.stock.add(kind, amount);
        }
        self.delivered = self.delivered.saturating_add(amount);
        self.rejected.clear();
        debug!(unit = %ctx.unit, deposit = %deposit, kind = ?kind, amount, "resource_delivered");
    }

    fn step(&mut self, ctx: &mut TaskContext<'_>, phase: Phase, dt: f32) -> Phase {
        let tolerance = ctx.world.config.harvest.reach_tolerance;
        match phase {
            Phase::FindResource => self.find_resource(ctx),
            Phase::MoveToResource { node, mut movement } => {
                if !self.node_available(ctx.world, node) {
                    end_move(ctx, &mut movement);
                    self.preferred = None;
                    return Phase::FindResource;
                }
                if !ctx.world.reaches(ctx.unit, node, tolerance) {
                    let moved = drive_move(ctx, &mut movement, dt);
                    if !moved.is_terminal() {
                        return Phase::MoveToResource { node, movement };
                    }
                    if !ctx.world.reaches(ctx.unit, node, tolerance) {
                        end_move(ctx, &mut movement);
                        debug!(unit = %ctx.unit, node = %node, "harvest_node_unreachable");
                        self.rejected.push(node);
                        return Phase::FindResource;
                    }
                }
                end_move(ctx, &mut movement);
                self.claim_or_wait(ctx, node)
            }
            Phase::Wait { node, remaining } => {
                if !self.node_available(ctx.world, node) {
                    self.preferred = None;
                    return Phase::FindResource;
                }
                let remaining = remaining - dt;
                if remaining > 0.0 {
                    return Phase::Wait { node, remaining };
                }
                match self.claim_or_wait(ctx, node) {
                    Phase::Wait { .. } => {
                        debug!(unit = %ctx.unit, node = %node, "harvest_node_full");
                        self.rejected.push(node);
                        self.preferred = None;
                        Phase::FindResource
                    }
                    working => working,
                }
            }
            Phase::Work {
                node,
                claim,
                elapsed,
            } => self.work(ctx, node, claim, elapsed + dt),
            Phase::BackToDeposit {
                deposit,
                mut movement,
            } => {
                let standing = ctx
                    .world
                    .building(deposit)
                    .is_some_and(|found| found.is_complete());
                if !standing {
                    end_move(ctx, &mut movement);
                    return self.head_to_deposit(ctx);
                }
                if !ctx.world.reaches(ctx.unit, deposit, tolerance) {
                    let moved = drive_move(ctx, &mut movement, dt);
                    if !moved.is_terminal() {
                        return Phase::BackToDeposit { deposit, movement };
                    }
                    if !ctx.world.reaches(ctx.unit, deposit, tolerance) {
                        end_move(ctx, &mut movement);
                        return self.fail("deposit_unreachable", ctx);
                    }
                }
                end_move(ctx, &mut movement);
                self.deliver(ctx, deposit);
                Phase::FindResource
            }
        }
    }

    fn work(
        &mut self,
        ctx: &mut TaskContext<'_>,
        node: EntityId,
        claim: SlotClaim,
        elapsed: f32,
    ) -> Phase {
        if !self.node_available(ctx.world, node) {
            drop(claim);
            self.preferred = None;
            return self.after_work(ctx);
        }
        ctx.world.face_entity(ctx.unit, node);
        let cycle = ctx.world.config.harvest.cycle_seconds;
        if elapsed < cycle {
            return Phase::Work {
                node,
                claim,
                elapsed,
            };
        }

        let capacity = self.capacity(ctx.world);
        let per_cycle = self.per_cycle(ctx.world);
        let carried = ctx
            .world
            .unit(ctx.unit)
            .map_or(0, |unit| unit.cargo.amount_of(self.kind));
        let mut left = 0;
        let mut taken = 0;
        if let Some(found) = ctx.world.resources.get_mut(&node) {
            taken = per_cycle
                .min(capacity.saturating_sub(carried))
                .min(found.amount);
            found.amount -= taken;
            left = found.amount;
        }
        if let Some(unit) = ctx.world.unit_mut(ctx.unit) {
            unit.cargo.load(self.kind, taken);
        }

        if left == 0 {
            drop(claim);
            ctx.world.deplete_resource(node);
            self.preferred = None;
            return self.after_work(ctx);
        }
        if carried + taken >= capacity {
            drop(claim);
            return self.head_to_deposit(ctx);
        }
        Phase::Work {
            node,
            claim,
            elapsed: elapsed - cycle,
        }
    }

    fn after_work(&mut self, ctx: &mut TaskContext<'_>) -> Phase {
        let carrying = ctx
            .world
            .unit(ctx.unit)
            .is_some_and(|unit| !unit.cargo.is_empty());
        if carrying {
            self.head_to_deposit(ctx)
        } else {
            Phase::FindResource
        }
    }
}

impl<'a> State<TaskContext<'a>> for HarvestTask {
    fn result(&self) -> StateResult {
        self.result
    }

    fn set_result(&mut self, result: StateResult) {
        self.result = result;
    }

    fn activate(&mut self, ctx: &mut TaskContext<'a>) {
        self.rejected.clear();
        let Some(cargo) = ctx.world.unit(ctx.unit).map(|unit| unit.cargo) else {
            self.result = StateResult::Failed;
            return;
        };
        let full = cargo.amount_of(self.kind) >= self.capacity(ctx.world);
        let foreign = cargo.kind.is_some_and(|kind| kind != self.kind) && !cargo.is_empty();
        self.phase = if full || foreign {
            self.head_to_deposit(ctx)
        } else {
            Phase::FindResource
        };
    }

    fn update(&mut self, ctx: &mut TaskContext<'a>, dt: f32) -> StateResult {
        self.activate_if_inactive(ctx);
        if self.result.is_terminal() {
            return self.result;
        }
        let phase = std::mem::replace(&mut self.phase, Phase::FindResource);
        self.phase = self.step(ctx, phase, dt);
        self.result
    }

    fn terminate(&mut self, ctx: &mut TaskContext<'a>) {
        match std::mem::replace(&mut self.phase, Phase::FindResource) {
            Phase::MoveToResource { node, mut movement } => {
                end_move(ctx, &mut movement);
                self.preferred = Some(node);
            }
            Phase::BackToDeposit { mut movement, .. } => end_move(ctx, &mut movement),
            Phase::Work { node, .. } | Phase::Wait { node, .. } => self.preferred = Some(node),
            Phase::FindResource => {}
        }
    }

    fn handle_event(&mut self, ctx: &mut TaskContext<'a>, event: &StateEvent) -> EventResult {
        match &mut self.phase {
            Phase::MoveToResource { movement, .. } | Phase::BackToDeposit { movement, .. } => {
                forward_move_event(ctx, movement, event)
            }
            _ => EventResult::Unhandled,
        }
    }
}

#[cfg(test)]
mod tests {
    use engine::{SlotCounter, Vec2};

    use super::*;
    use crate::app::gameplay::types::{BuildingKind, UnitKind};
    use crate::app::gameplay::world::test_support::{world, HOME};

    struct Camp {
        world: World,
        mine: EntityId,
        peasant: EntityId,
    }

    /// Mine with 25 gold right next to the peasant, town hall a short walk away.
    fn camp() -> Camp {
        let mut world = world();
        let mine = world.spawn_resource(ResourceKind::Gold, Vec2::new(204.0, 204.0), 25);
        world.spawn_building(HOME, BuildingKind::TownHall, Vec2::new(204.0, 284.0), true);
        let peasant = world.spawn_unit(HOME, UnitKind::Peasant, Vec2::new(204.0, 220.0));
        Camp {
            world,
            mine,
            peasant,
        }
    }

    fn mine_slots(camp: &Camp) -> &SlotCounter {
        &camp.world.resource(camp.mine).expect("mine").harvesters
    }

    fn tick(task: &mut HarvestTask, camp: &mut Camp) -> StateResult {
        camp.world.paths.process_queries();
        let mut ctx = TaskContext::new(&mut camp.world, camp.peasant);
        task.update(&mut ctx, 0.1)
    }

    #[test]
    fn full_load_is_carried_back_after_two_cycles() {
        let mut camp = camp();
        let mut task = HarvestTask::new(ResourceKind::Gold, Some(camp.mine));

        let mut ticks = 0;
        while !task.is_returning() {
            assert_eq!(tick(&mut task, &mut camp), StateResult::Active);
            ticks += 1;
            assert!(ticks < 50, "never headed back");
        }

        let peasant = camp.world.unit(camp.peasant).expect("peasant");
        assert_eq!(peasant.cargo.amount_of(ResourceKind::Gold), 10);
        let mine = camp.world.resource(camp.mine).expect("mine");
        assert_eq!(mine.amount, 15);
        assert_eq!(mine.harvesters.claimed(), 0);
    }

    #[test]
    fn exhausting_the_mine_delivers_everything_and_leaks_no_slot() {
        let mut camp = camp();
        let before = camp.world.player(HOME).expect("home").stock.gold;
        let mut task = HarvestTask::new(ResourceKind::Gold, None);

        let mut result = StateResult::Active;
        for _ in 0..2000 {
            result = tick(&mut task, &mut camp);
            if result.is_terminal() {
                break;
            }
        }
        let mut ctx = TaskContext::new(&mut camp.world, camp.peasant);
        task.terminate(&mut ctx);

        // Nothing left to mine and nothing carried: the loop gives up.
        assert_eq!(result, StateResult::Failed);
        assert_eq!(task.delivered(), 25);
        assert!(camp.world.resource(camp.mine).is_none());
        let after = camp.world.player(HOME).expect("home").stock.gold;
        assert_eq!(after - before, 25);
    }

    #[test]
    fn losing_the_deposit_on_the_way_back_reroutes_to_another() {
        let mut camp = camp();
        let far_hall =
            camp.world
                .spawn_building(HOME, BuildingKind::TownHall, Vec2::new(204.0, 124.0), true);
        let before = camp.world.player(HOME).expect("home").stock.gold;
        let mut task = HarvestTask::new(ResourceKind::Gold, Some(camp.mine));

        let mut ticks = 0;
        while !task.is_returning() {
            tick(&mut task, &mut camp);
            ticks += 1;
            assert!(ticks < 50, "never headed back");
        }
        let Phase::BackToDeposit { deposit, .. } = task.phase else {
            panic!("expected to be carrying gold back");
        };
        assert_ne!(deposit, far_hall);

        camp.world.destroy_building(deposit);
        tick(&mut task, &mut camp);
        assert!(matches!(
            task.phase,
            Phase::BackToDeposit { deposit: next, .. } if next == far_hall
        ));

        for _ in 0..600 {
            assert_eq!(tick(&mut task, &mut camp), StateResult::Active);
            if task.delivered() > 0 {
                break;
            }
        }
        assert_eq!(task.delivered(), 10);
        let after = camp.world.player(HOME).expect("home").stock.gold;
        assert_eq!(after - before, 10);
    }

    #[test]
    fn full_node_makes_the_worker_wait_then_move_on() {
        let mut camp = camp();
        camp.world.config.harvest.full_wait_seconds = 0.3;
        let slots = mine_slots(&camp).clone();
        let held: Vec<SlotClaim> = (0..slots.capacity())
            .filter_map(|_| slots.try_claim())
            .collect();
        let mut task = HarvestTask::new(ResourceKind::Gold, Some(camp.mine));

        assert_eq!(tick(&mut task, &mut camp), StateResult::Active);
        assert!(matches!(task.phase, Phase::FindResource | Phase::MoveToResource { .. }));
        tick(&mut task, &mut camp);
        assert!(matches!(task.phase, Phase::Wait { .. }));

        // Still full after the wait and no other mine: nothing to do.
        let mut result = StateResult::Active;
        for _ in 0..10 {
            result = tick(&mut task, &mut camp);
            if result.is_terminal() {
                break;
            }
        }
        assert_eq!(result, StateResult::Failed);
        assert_eq!(slots.claimed(), slots.capacity());
        drop(held);
        assert_eq!(slots.claimed(), 0);
    }

    #[test]
    fn terminating_while_working_releases_the_slot() {
        let mut camp = camp();
        let mut task = HarvestTask::new(ResourceKind::Gold, Some(camp.mine));
        while !task.is_working() {
            tick(&mut task, &mut camp);
        }
        assert_eq!(mine_slots(&camp).claimed(), 1);
        let mut ctx = TaskContext::new(&mut camp.world, camp.peasant);
        task.terminate(&mut ctx);
        assert_eq!(mine_slots(&camp).claimed(), 0);
        assert_eq!(task.node(), Some(camp.mine));
    }
}
