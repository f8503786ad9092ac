use engine::{State, StateResult};

use super::TaskContext;

/// Last task of every unit: leave the grid, then linger as a corpse until the
/// world removes it.
#[derive(Debug)]
pub(crate) struct DieTask {
    result: StateResult,
    elapsed: f32,
}

impl DieTask {
    pub(crate) fn new() -> Self {
        Self {
            result: StateResult::Inactive,
            elapsed: 0.0,
        }
    }
}

impl<'a> State<TaskContext<'a>> for DieTask {
    fn result(&self) -> StateResult {
        self.result
    }

    fn set_result(&mut self, result: StateResult) {
        self.result = result;
    }

    fn activate(&mut self, ctx: &mut TaskContext<'a>) {
        self.elapsed = 0.0;
        ctx.world.begin_dying(ctx.unit);
    }

    fn update(&mut self, ctx: &mut TaskContext<'a>, dt: f32) -> StateResult {
        self.activate_if_inactive(ctx);
        self.elapsed += dt;
        if self.elapsed >= ctx.world.config.world.corpse_seconds {
            self.result = StateResult::Completed;
        }
        self.result
    }
}
