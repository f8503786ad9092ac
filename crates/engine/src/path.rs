//! Contract between movement states and whatever owns the navigation data.
//!
//! Path queries are asynchronous: `query_path` hands back a [`PathTicket`] and
//! the service resolves it during its own per-tick processing. The requester
//! polls its ticket; only the holder of a ticket can observe its result, and a
//! cancelled ticket never resolves.

use serde::{Deserialize, Serialize};

use crate::geometry::Vec2;
use crate::movable::Movable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PathTicket(pub u64);

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum PathPriority {
    Low,
    #[default]
    Normal,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GraphPathEdge {
    pub from: Vec2,
    pub to: Vec2,
}

/// Waypoint route returned by a successful query. Immutable once received.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphPath {
    edges: Vec<GraphPathEdge>,
}

impl GraphPath {
    pub fn new(edges: Vec<GraphPathEdge>) -> Self {
        Self { edges }
    }

    /// Builds edges between consecutive waypoints, starting at `start`.
    pub fn from_waypoints(start: Vec2, waypoints: &[Vec2]) -> Self {
        let mut edges = Vec::with_capacity(waypoints.len());
        let mut from = start;
        for waypoint in waypoints {
            edges.push(GraphPathEdge {
                from,
                to: *waypoint,
            });
            from = *waypoint;
        }
        Self { edges }
    }

    pub fn edge(&self, index: usize) -> Option<&GraphPathEdge> {
        self.edges.get(index)
    }

    pub fn edges(&self) -> &[GraphPathEdge] {
        &self.edges
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PathPoll {
    Pending,
    Found(GraphPath),
    NotFound,
    /// The ticket was never issued, was cancelled, or was already collected.
    Unknown,
}

pub trait PathService {
    /// Nudges `original` to a position the mover can actually stand on.
    /// `previous` is the last adjustment made for the same leg, if any.
    fn find_next_valid_position(
        &self,
        original: Vec2,
        current: Vec2,
        previous: Option<Vec2>,
        mover: &dyn Movable,
    ) -> Vec2;

    fn can_move_between(
        &self,
        start: Vec2,
        end: Vec2,
        mover: &dyn Movable,
        include_dynamic_obstacles: bool,
    ) -> bool;

    fn query_path(
        &mut self,
        start: Vec2,
        end: Vec2,
        priority: PathPriority,
        mover: &dyn Movable,
    ) -> PathTicket;

    /// Collects the result of `ticket`. A resolved result is handed out once.
    fn poll_query(&mut self, ticket: PathTicket) -> PathPoll;

    /// Drops a pending or resolved query. Unknown tickets are ignored.
    fn cancel_query(&mut self, ticket: PathTicket);

    fn can_be_placed_at(&self, position: Vec2, mover: &dyn Movable) -> bool;

    /// Re-registers the mover after its position changed.
    fn update_movable(&mut self, mover: &mut dyn Movable);
}
