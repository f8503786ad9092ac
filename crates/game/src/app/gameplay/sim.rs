use engine::SimulationStep;
use tracing::info;

use super::goals::ComputerPlayer;
use super::types::PlayerId;
use super::world::World;

/// A running skirmish: the world plus the computer players steering it.
pub(crate) struct Simulation {
    world: World,
    computers: Vec<ComputerPlayer>,
    decided: bool,
}

impl Simulation {
    pub(crate) fn new(world: World, computers: Vec<ComputerPlayer>) -> Self {
        Self {
            world,
            computers,
            decided: false,
        }
    }

    #[cfg(test)]
    pub(crate) fn world(&self) -> &World {
        &self.world
    }

    /// The last player standing, once everybody else is defeated.
    pub(crate) fn winner(&self) -> Option<PlayerId> {
        if self.world.players.len() < 2 || self.world.remaining_players() != 1 {
            return None;
        }
        self.world
            .players
            .values()
            .find(|player| !player.defeated)
            .map(|player| player.id)
    }

    pub(crate) fn log_summary(&self) {
        for player in self.world.players.values() {
            let units = self.world.living_units_of(player.id).count();
            let buildings = self
                .world
                .buildings
                .values()
                .filter(|b| b.owner == player.id)
                .count();
            info!(
                player = %player.id,
                computer = player.computer,
                defeated = player.defeated,
                gold = player.stock.gold,
                lumber = player.stock.lumber,
                units,
                buildings,
                weapons = player.weapons_level,
                armor = player.armor_level,
                "player_summary"
            );
        }
        for computer in &self.computers {
            computer.log_summary(&self.world);
        }
    }
}

impl SimulationStep for Simulation {
    fn step(&mut self, fixed_dt_seconds: f32) {
        let dt = fixed_dt_seconds;
        self.world.advance_clock(dt);
        self.world.paths.process_queries();
        self.world.deliver_path_results();
        for computer in &mut self.computers {
            computer.update(&mut self.world, dt);
        }
        self.world.update_units(dt);
        self.world.update_production(dt);
        self.world.process_deaths();
        self.world.update_defeats();

        if !self.decided && self.is_finished() {
            self.decided = true;
            info!(
                winner = ?self.winner(),
                tick = self.world.tick(),
                seconds = self.world.elapsed_seconds(),
                "skirmish_decided"
            );
        }
    }

    fn entity_count(&self) -> usize {
        self.world.units.len() + self.world.buildings.len() + self.world.resources.len()
    }

    fn is_finished(&self) -> bool {
        self.world.players.len() > 1 && self.world.remaining_players() <= 1
    }
}
