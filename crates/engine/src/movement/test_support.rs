use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use crate::entity::EntityId;
use crate::geometry::{Brush, Vec2};
use crate::movable::{Movable, PathTag};
use crate::path::{PathPoll, PathPriority, PathService, PathTicket};

#[derive(Debug, Clone)]
pub(crate) struct TestMover {
    pub(crate) id: EntityId,
    pub(crate) position: Vec2,
    pub(crate) facing: Vec2,
    pub(crate) brush: Brush,
    pub(crate) speed: f32,
    pub(crate) tag: PathTag,
}

impl TestMover {
    pub(crate) fn at(position: Vec2, speed: f32) -> Self {
        Self {
            id: EntityId(1),
            position,
            facing: Vec2::new(0.0, 1.0),
            brush: Brush::new(0.0),
            speed,
            tag: PathTag::default(),
        }
    }
}

impl Movable for TestMover {
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
pub(crate) struct IssuedQuery {
    pub(crate) ticket: PathTicket,
    pub(crate) start: Vec2,
    pub(crate) end: Vec2,
    pub(crate) priority: PathPriority,
}

/// Path service double whose answers are set directly by the test.
#[derive(Debug, Default)]
pub(crate) struct ScriptedPaths {
    pub(crate) placement_blocked: bool,
    pub(crate) direct_walk_blocked: bool,
    pub(crate) adjust_to: Option<Vec2>,
    pub(crate) find_next_valid_calls: Cell<u32>,
    pub(crate) include_dynamic_flags: RefCell<Vec<bool>>,
    pub(crate) queries: Vec<IssuedQuery>,
    pub(crate) cancelled: Vec<PathTicket>,
    pub(crate) update_movable_calls: u32,
    resolved: HashMap<PathTicket, PathPoll>,
    next_ticket: u64,
}

impl ScriptedPaths {
    pub(crate) fn open() -> Self {
        Self::default()
    }

    pub(crate) fn walls() -> Self {
        Self {
            direct_walk_blocked: true,
            ..Self::default()
        }
    }

    pub(crate) fn resolve(&mut self, ticket: PathTicket, poll: PathPoll) {
        self.resolved.insert(ticket, poll);
    }

    pub(crate) fn last_ticket(&self) -> Option<PathTicket> {
        self.queries.last().map(|query| query.ticket)
    }
}

impl PathService for ScriptedPaths {
    fn find_next_valid_position(
        &self,
        original: Vec2,
        _current: Vec2,
        _previous: Option<Vec2>,
        _mover: &dyn Movable,
    ) -> Vec2 {
        self.find_next_valid_calls
            .set(self.find_next_valid_calls.get() + 1);
        self.adjust_to.unwrap_or(original)
    }

    fn can_move_between(
        &self,
        _start: Vec2,
        _end: Vec2,
        _mover: &dyn Movable,
        include_dynamic_obstacles: bool,
    ) -> bool {
        self.include_dynamic_flags
            .borrow_mut()
            .push(include_dynamic_obstacles);
        !self.direct_walk_blocked
    }

    fn query_path(
        &mut self,
        start: Vec2,
        end: Vec2,
        priority: PathPriority,
        _mover: &dyn Movable,
    ) -> PathTicket {
        let ticket = PathTicket(self.next_ticket);
        self.next_ticket += 1;
        self.queries.push(IssuedQuery {
            ticket,
            start,
            end,
            priority,
        });
        ticket
    }

    fn poll_query(&mut self, ticket: PathTicket) -> PathPoll {
        if self.cancelled.contains(&ticket) {
            return PathPoll::Unknown;
        }
        match self.resolved.remove(&ticket) {
            Some(poll) => poll,
            None if self.queries.iter().any(|query| query.ticket == ticket) => PathPoll::Pending,
            None => PathPoll::Unknown,
        }
    }

    fn cancel_query(&mut self, ticket: PathTicket) {
        self.resolved.remove(&ticket);
        self.cancelled.push(ticket);
    }

    fn can_be_placed_at(&self, _position: Vec2, _mover: &dyn Movable) -> bool {
        !self.placement_blocked
    }

    fn update_movable(&mut self, _mover: &mut dyn Movable) {
        self.update_movable_calls += 1;
    }
}
