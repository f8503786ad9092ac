//! Computer-player goals. Each goal wakes up on its own randomized timer,
//! looks at the world from its player's side and issues commands to units.
//! Goals never finish on their own; they keep arbitrating for as long as the
//! player is in the game.

mod attack;
mod defend;
mod develop;

use engine::{EventResult, SimRng, State, StateEvent, StateResult};
use tracing::{debug, info};

use super::types::PlayerId;
use super::world::World;
use crate::app::config::{AiConfig, IntervalRange};

pub(crate) use attack::GoalAttack;
pub(crate) use defend::GoalDefend;
pub(crate) use develop::GoalDevelop;

pub(crate) struct GoalContext<'a> {
    pub world: &'a mut World,
    pub player: PlayerId,
    pub rng: &'a mut SimRng,
}

/// Countdown to the next arbitration, re-armed with a fresh random interval
/// every time it fires.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ArbitrationTimer {
    interval: IntervalRange,
    remaining: f32,
}

impl ArbitrationTimer {
    pub(crate) fn new(interval: IntervalRange) -> Self {
        Self {
            interval,
            remaining: interval.min,
        }
    }

    #[cfg(test)]
    pub(crate) fn remaining(&self) -> f32 {
        self.remaining
    }

    pub(crate) fn rearm(&mut self, rng: &mut SimRng) {
        self.remaining = rng.range_f32(self.interval.min, self.interval.max);
    }

    /// True when the countdown ran out during this tick.
    pub(crate) fn tick(&mut self, dt: f32, rng: &mut SimRng) -> bool {
        self.remaining -= dt;
        if self.remaining > 0.0 {
            return false;
        }
        self.rearm(rng);
        true
    }
}

#[derive(Debug)]
pub(crate) enum Goal {
    Develop(GoalDevelop),
    Attack(GoalAttack),
    Defend(GoalDefend),
}

macro_rules! dispatch {
    ($self:expr, $goal:ident => $body:expr) => {
        match $self {
            Goal::Develop($goal) => $body,
            Goal::Attack($goal) => $body,
            Goal::Defend($goal) => $body,
        }
    };
}

impl Goal {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Goal::Develop(_) => "develop",
            Goal::Attack(_) => "attack",
            Goal::Defend(_) => "defend",
        }
    }
}

impl<'a> State<GoalContext<'a>> for Goal {
    fn result(&self) -> StateResult {
        dispatch!(self, goal => goal.result())
    }

    fn set_result(&mut self, result: StateResult) {
        dispatch!(self, goal => goal.set_result(result))
    }

    fn activate(&mut self, ctx: &mut GoalContext<'a>) {
        dispatch!(self, goal => goal.activate(ctx))
    }

    fn update(&mut self, ctx: &mut GoalContext<'a>, dt: f32) -> StateResult {
        dispatch!(self, goal => goal.update(ctx, dt))
    }

    fn terminate(&mut self, ctx: &mut GoalContext<'a>) {
        dispatch!(self, goal => goal.terminate(ctx))
    }

    fn handle_event(&mut self, ctx: &mut GoalContext<'a>, event: &StateEvent) -> EventResult {
        dispatch!(self, goal => goal.handle_event(ctx, event))
    }
}

/// Goal-driven opponent. Owns a private random source so its decisions do
/// not shift the world's random sequence.
#[derive(Debug)]
pub(crate) struct ComputerPlayer {
    player: PlayerId,
    rng: SimRng,
    goals: Vec<Goal>,
}

impl ComputerPlayer {
    pub(crate) fn new(player: PlayerId, seed: u64, ai: &AiConfig) -> Self {
        Self {
            player,
            rng: SimRng::seed_from_u64(seed),
            goals: vec![
                Goal::Develop(GoalDevelop::new(ai)),
                Goal::Attack(GoalAttack::new(ai)),
                Goal::Defend(GoalDefend::new(ai)),
            ],
        }
    }

    pub(crate) fn player(&self) -> PlayerId {
        self.player
    }

    #[cfg(test)]
    pub(crate) fn goals(&self) -> &[Goal] {
        &self.goals
    }

    pub(crate) fn log_summary(&self, world: &World) {
        for goal in &self.goals {
            match goal {
                Goal::Develop(state) => info!(
                    player = %self.player,
                    goal = goal.name(),
                    arbitrations = state.arbitrations(),
                    last_choice = ?state.last_choice(),
                    workers = develop::classify_workers(world, self.player).total(),
                    "goal_summary"
                ),
                Goal::Attack(state) => info!(
                    player = %self.player,
                    goal = goal.name(),
                    arbitrations = state.arbitrations(),
                    attacks = state.attacks_launched(),
                    squad_size = state.squad_size(),
                    advantage = state.smoothed_advantage(),
                    "goal_summary"
                ),
                Goal::Defend(state) => info!(
                    player = %self.player,
                    goal = goal.name(),
                    arbitrations = state.arbitrations(),
                    workers_pulled = state.workers_pulled(),
                    "goal_summary"
                ),
            }
        }
    }

    pub(crate) fn update(&mut self, world: &mut World, dt: f32) {
        if world.player(self.player).map_or(true, |p| p.defeated) {
            return;
        }
        let mut ctx = GoalContext {
            world,
            player: self.player,
            rng: &mut self.rng,
        };
        for goal in &mut self.goals {
            let result = goal.update(&mut ctx, dt);
            if result.is_terminal() {
                debug!(player = %self.player, goal = goal.name(), result = ?result, "goal_rearmed");
                goal.terminate(&mut ctx);
                goal.set_result(StateResult::Inactive);
            }
        }
    }
}
