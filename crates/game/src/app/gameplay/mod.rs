//! The skirmish itself: the world model, the grid path service, unit tasks,
//! computer-player goals and the scenario that wires them together.

mod goals;
mod nav;
mod scenario;
mod sim;
mod tasks;
mod types;
mod world;

pub(crate) use scenario::build_skirmish;
pub(crate) use types::{BuildingKind, UnitKind};
