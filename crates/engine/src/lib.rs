//! Simulation scaffolding shared by every skirmish front end: geometry, the
//! cooperative state contract, the path service contract, movement states,
//! slot claims, seeded randomness and the headless loop runner.

pub mod app;
pub mod entity;
pub mod geometry;
pub mod movable;
pub mod movement;
pub mod path;
pub mod rng;
pub mod slot;
pub mod state;

pub use app::{
    run_headless, run_headless_with_metrics, LoopConfig, LoopError, LoopMetricsSnapshot,
    LoopReport, MetricsHandle, SimulationStep, SLOW_TICK_ENV_VAR,
};
pub use entity::{EntityId, EntityIdAllocator};
pub use geometry::{Brush, Vec2};
pub use movable::{Movable, PathTag};
pub use movement::{
    FollowContext, FollowTarget, MoveContext, MoveToPosition, MoveToTarget, MovementTuning,
    SeekToPosition,
};
pub use path::{GraphPath, GraphPathEdge, PathPoll, PathPriority, PathService, PathTicket};
pub use rng::SimRng;
pub use slot::{SlotClaim, SlotCounter};
pub use state::{EventResult, State, StateEvent, StateResult};
