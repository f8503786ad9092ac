use tracing::debug;

use crate::geometry::Vec2;
use crate::path::{GraphPath, PathPoll, PathPriority, PathTicket};
use crate::state::{EventResult, State, StateEvent, StateResult};

use super::{MoveContext, MovementTuning, SeekToPosition};

/// Moves the mover to a destination, walking straight when the line is clear
/// and following a queried route otherwise.
///
/// Every activation re-evaluates the leg from the mover's current position.
/// The first activation ignores other units in the direct-walk test; later
/// ones include them. Failed seeks and unresolvable queries count as retries;
/// the move fails once more than `max_retry_times` pile up without a path edge
/// being completed in between.
#[derive(Debug, Clone)]
pub struct MoveToPosition {
    result: StateResult,
    tuning: MovementTuning,
    priority: PathPriority,
    destination: Vec2,
    adjusted_destination: Vec2,
    previous_adjusted: Option<Vec2>,
    seek: Option<SeekToPosition>,
    path: Option<GraphPath>,
    path_cursor: usize,
    pending_query: Option<PathTicket>,
    include_dynamic_obstacles: bool,
    retry_counter: u32,
    activation_count: u32,
    queries_issued: u32,
}

impl MoveToPosition {
    pub fn new(destination: Vec2, tuning: &MovementTuning) -> Self {
        Self {
            result: StateResult::Inactive,
            tuning: *tuning,
            priority: PathPriority::Normal,
            destination,
            adjusted_destination: destination,
            previous_adjusted: None,
            seek: None,
            path: None,
            path_cursor: 0,
            pending_query: None,
            include_dynamic_obstacles: false,
            retry_counter: 0,
            activation_count: 0,
            queries_issued: 0,
        }
    }

    pub fn with_priority(mut self, priority: PathPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn destination(&self) -> Vec2 {
        self.destination
    }

    pub fn adjusted_destination(&self) -> Vec2 {
        self.adjusted_destination
    }

    pub fn path(&self) -> Option<&GraphPath> {
        self.path.as_ref()
    }

    pub fn path_cursor(&self) -> usize {
        self.path_cursor
    }

    pub fn pending_query(&self) -> Option<PathTicket> {
        self.pending_query
    }

    pub fn retry_counter(&self) -> u32 {
        self.retry_counter
    }

    pub fn activation_count(&self) -> u32 {
        self.activation_count
    }

    pub fn queries_issued(&self) -> u32 {
        self.queries_issued
    }

    pub fn current_waypoint(&self) -> Option<Vec2> {
        self.seek.as_ref().map(SeekToPosition::target)
    }

    fn new_seek(&self, target: Vec2) -> SeekToPosition {
        let wait = self.tuning.retry_wait_step_seconds * self.retry_counter as f32;
        SeekToPosition::new(target, &self.tuning).with_wait_time(wait)
    }

    fn drop_seek(&mut self, ctx: &mut MoveContext<'_>) {
        if let Some(mut seek) = self.seek.take() {
            seek.terminate(ctx);
        }
    }

    /// Counts a local failure and either gives up or re-arms for another
    /// activation on the next tick.
    fn register_retry(&mut self, ctx: &MoveContext<'_>) -> StateResult {
        self.retry_counter = self.retry_counter.saturating_add(1);
        if self.retry_counter > self.tuning.max_retry_times {
            debug!(
                mover = ctx.mover.id().0,
                retries = self.retry_counter,
                destination_x = self.destination.x,
                destination_y = self.destination.y,
                "move_retry_budget_exhausted"
            );
            self.result = StateResult::Failed;
            return StateResult::Failed;
        }
        self.result = StateResult::Inactive;
        StateResult::Active
    }

    fn on_path_found(&mut self, ctx: &mut MoveContext<'_>, path: GraphPath) {
        self.pending_query = None;
        self.drop_seek(ctx);
        self.path_cursor = 0;
        let first_waypoint = path
            .edge(0)
            .map(|edge| edge.to)
            .unwrap_or(self.adjusted_destination);
        self.path = Some(path);
        self.seek = Some(self.new_seek(first_waypoint));
    }

    fn on_path_not_found(&mut self, ctx: &mut MoveContext<'_>) -> StateResult {
        self.pending_query = None;
        self.register_retry(ctx)
    }

    fn visible_result(&self) -> StateResult {
        match self.result {
            StateResult::Inactive => StateResult::Active,
            other => other,
        }
    }
}

impl<'a> State<MoveContext<'a>> for MoveToPosition {
    fn result(&self) -> StateResult {
        self.result
    }

    fn set_result(&mut self, result: StateResult) {
        self.result = result;
    }

    fn activate(&mut self, ctx: &mut MoveContext<'a>) {
        self.activation_count = self.activation_count.saturating_add(1);
        let current = ctx.mover.position();
        let adjusted = ctx.paths.find_next_valid_position(
            self.destination,
            current,
            self.previous_adjusted,
            &*ctx.mover,
        );
        self.adjusted_destination = adjusted;
        self.previous_adjusted = Some(adjusted);
        self.drop_seek(ctx);
        self.path = None;
        self.path_cursor = 0;

        if ctx.paths.can_move_between(
            current,
            adjusted,
            &*ctx.mover,
            self.include_dynamic_obstacles,
        ) {
            if let Some(ticket) = self.pending_query.take() {
                ctx.paths.cancel_query(ticket);
            }
            self.seek = Some(self.new_seek(adjusted));
        } else if self.pending_query.is_none() {
            let ticket = ctx
                .paths
                .query_path(current, adjusted, self.priority, &*ctx.mover);
            self.pending_query = Some(ticket);
            self.queries_issued = self.queries_issued.saturating_add(1);
            debug!(
                mover = ctx.mover.id().0,
                ticket = ticket.0, retries = self.retry_counter, "path_query_issued"
            );
        }

        self.include_dynamic_obstacles = true;
    }

    fn update(&mut self, ctx: &mut MoveContext<'a>, dt: f32) -> StateResult {
        self.activate_if_inactive(ctx);
        if self.result.is_terminal() {
            return self.result;
        }

        if let Some(ticket) = self.pending_query {
            match ctx.paths.poll_query(ticket) {
                PathPoll::Pending => {}
                PathPoll::Found(path) => self.on_path_found(ctx, path),
                PathPoll::NotFound => {
                    self.on_path_not_found(ctx);
                }
                PathPoll::Unknown => {
                    // The service dropped the query; ask again on the next activation.
                    self.pending_query = None;
                    if self.seek.is_none() {
                        self.result = StateResult::Inactive;
                    }
                }
            }
            if self.result != StateResult::Active {
                return self.visible_result();
            }
        }

        let Some(seek) = self.seek.as_mut() else {
            return StateResult::Active;
        };

        match seek.update(ctx, dt) {
            StateResult::Active | StateResult::Inactive => StateResult::Active,
            StateResult::Failed => {
                self.drop_seek(ctx);
                self.register_retry(ctx)
            }
            StateResult::Completed => {
                self.drop_seek(ctx);
                let next_cursor = self.path_cursor + 1;
                let next_waypoint = self
                    .path
                    .as_ref()
                    .and_then(|path| path.edge(next_cursor))
                    .map(|edge| edge.to);
                if let Some(waypoint) = next_waypoint {
                    self.path_cursor = next_cursor;
                    self.retry_counter = 0;
                    self.seek = Some(self.new_seek(waypoint));
                    return StateResult::Active;
                }
                self.result = StateResult::Completed;
                StateResult::Completed
            }
        }
    }

    fn terminate(&mut self, ctx: &mut MoveContext<'a>) {
        self.drop_seek(ctx);
        if !ctx.mover.position().is_coincident(self.destination) {
            ctx.mover.face_toward(self.destination);
        }
        if let Some(ticket) = self.pending_query.take() {
            ctx.paths.cancel_query(ticket);
        }
    }

    fn handle_event(&mut self, ctx: &mut MoveContext<'a>, event: &StateEvent) -> EventResult {
        match event {
            StateEvent::PathFound { ticket, path } if self.pending_query == Some(*ticket) => {
                self.on_path_found(ctx, path.clone());
                EventResult::Handled
            }
            StateEvent::PathNotFound { ticket } if self.pending_query == Some(*ticket) => {
                self.on_path_not_found(ctx);
                EventResult::Handled
            }
            _ => EventResult::Unhandled,
        }
    }
}
