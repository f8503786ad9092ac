//! Cooperative state contract shared by movement, task and goal states.
//!
//! A state is driven by its owner once per tick. The owner activates it through
//! [`State::activate_if_inactive`], reads the [`StateResult`] returned by
//! [`State::update`], and calls [`State::terminate`] exactly once before
//! dropping it, whether or not it finished on its own. A terminated state is
//! never updated again.
//!
//! `C` is the context the state needs for one call: the moving entity, the path
//! service, the world, a random source. Owners build it per call, so no state
//! holds a reference to its collaborators between ticks.

use crate::path::{GraphPath, PathTicket};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StateResult {
    Active,
    #[default]
    Inactive,
    Completed,
    Failed,
}

impl StateResult {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventResult {
    Handled,
    Unhandled,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StateEvent {
    PathFound {
        ticket: PathTicket,
        path: GraphPath,
    },
    PathNotFound { ticket: PathTicket },
}

pub trait State<C> {
    fn result(&self) -> StateResult;

    fn set_result(&mut self, result: StateResult);

    fn activate(&mut self, ctx: &mut C);

    fn update(&mut self, _ctx: &mut C, _dt: f32) -> StateResult {
        StateResult::Completed
    }

    fn terminate(&mut self, _ctx: &mut C) {}

    fn handle_event(&mut self, _ctx: &mut C, _event: &StateEvent) -> EventResult {
        EventResult::Unhandled
    }

    /// Runs `activate` when the state is armed (Inactive). The result is set to
    /// Active first so `activate` may still override it with a terminal result.
    fn activate_if_inactive(&mut self, ctx: &mut C) {
        if self.result() == StateResult::Inactive {
            self.set_result(StateResult::Active);
            self.activate(ctx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct CountingState {
        result: StateResult,
        activations: u32,
    }

    impl State<()> for CountingState {
        fn result(&self) -> StateResult {
            self.result
        }

        fn set_result(&mut self, result: StateResult) {
            self.result = result;
        }

        fn activate(&mut self, _ctx: &mut ()) {
            self.activations += 1;
        }
    }

    #[test]
    fn activate_if_inactive_runs_once_per_arm() {
        let mut state = CountingState::default();
        state.activate_if_inactive(&mut ());
        state.activate_if_inactive(&mut ());
        assert_eq!(state.activations, 1);
        assert_eq!(state.result(), StateResult::Active);

        state.set_result(StateResult::Inactive);
        state.activate_if_inactive(&mut ());
        assert_eq!(state.activations, 2);
    }

    #[test]
    fn default_update_completes_and_events_are_unhandled() {
        let mut state = CountingState::default();
        assert_eq!(state.update(&mut (), 0.1), StateResult::Completed);
        let event = StateEvent::PathNotFound {
            ticket: PathTicket(7),
        };
        assert_eq!(state.handle_event(&mut (), &event), EventResult::Unhandled);
    }
}
