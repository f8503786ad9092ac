use engine::Vec2;
use tracing::info;

use super::goals::ComputerPlayer;
use super::sim::Simulation;
use super::types::{BuildingKind, PlayerId, ResourceKind, Stockpile, UnitKind};
use super::world::World;
use crate::app::config::GameConfig;

const MAX_PLAYERS: u32 = 4;
/// Distance from a start corner to each map edge.
const CORNER_INSET: f32 = 64.0;
const MINE_DISTANCE: f32 = 70.0;
const GROVE_DISTANCE: f32 = 72.0;
const GROVE_SIZE: usize = 6;
/// Mixes the world seed into each computer player's own seed.
const COMPUTER_SEED_SALT: u64 = 0x9e37_79b9_7f4a_7c15;

/// Lays out a skirmish: every player starts in a corner with a town hall,
/// a few workers, a goldmine and a grove of trees, all run by computers.
pub(crate) fn build_skirmish(config: GameConfig) -> Simulation {
    let players = config.scenario.players.clamp(1, MAX_PLAYERS);
    let mut world = World::new(config);
    let extent = world.paths.extent();
    let center = extent * 0.5;
    let corners = [
        Vec2::new(CORNER_INSET, CORNER_INSET),
        Vec2::new(extent.x - CORNER_INSET, extent.y - CORNER_INSET),
        Vec2::new(extent.x - CORNER_INSET, CORNER_INSET),
        Vec2::new(CORNER_INSET, extent.y - CORNER_INSET),
    ];

    let mut computers = Vec::new();
    for (index, start) in corners.into_iter().take(players as usize).enumerate() {
        let id = PlayerId(index as u8);
        let scenario = world.config.scenario.clone();
        world.add_player(
            id,
            Stockpile::new(scenario.starting_gold, scenario.starting_lumber),
            true,
        );
        world.spawn_building(id, BuildingKind::TownHall, start, true);

        let inward = (center - start).normalized().unwrap_or(Vec2::new(1.0, 0.0));
        let across = Vec2::new(-inward.y, inward.x);
        let mine_at = start + rotate(inward, across, 0.6) * MINE_DISTANCE;
        world.spawn_resource(ResourceKind::Gold, mine_at, scenario.gold_per_mine);
        let grove_at = start + rotate(inward, across, -0.6) * GROVE_DISTANCE;
        for tree in 0..GROVE_SIZE {
            let (column, row) = ((tree % 3) as f32 - 1.0, (tree / 3) as f32);
            let offset = (across * column + inward * row) * 8.0;
            let amount = scenario.lumber_per_tree;
            world.spawn_resource(ResourceKind::Lumber, grove_at + offset, amount);
        }

        let muster = start + inward * 28.0;
        for _ in 0..scenario.starting_workers {
            world.spawn_unit(id, UnitKind::Peasant, muster);
        }

        let seed = world.config.seed ^ COMPUTER_SEED_SALT.wrapping_mul(index as u64 + 1);
        let computer = ComputerPlayer::new(id, seed, &world.config.ai);
        info!(player = %computer.player(), x = start.x, y = start.y, seed, "computer_player_ready");
        computers.push(computer);
    }
    info!(
        players,
        seed = world.config.seed,
        units = world.units.len(),
        resources = world.resources.len(),
        "skirmish_built"
    );
    Simulation::new(world, computers)
}

/// `forward` turned toward `side` by `amount` (a blend, not an exact angle).
fn rotate(forward: Vec2, side: Vec2, amount: f32) -> Vec2 {
    (forward + side * amount).normalized().unwrap_or(forward)
}
