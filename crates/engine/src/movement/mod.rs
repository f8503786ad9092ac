//! Movement primitives: straight-line seeks, routed moves and target following.
//!
//! All three states run against a [`MoveContext`] that borrows the mover, the
//! path service and a random source for the duration of one call.

mod move_to_position;
mod move_to_target;
mod seek;
#[cfg(test)]
pub(crate) mod test_support;
mod tuning;

pub use move_to_position::MoveToPosition;
pub use move_to_target::{FollowContext, FollowTarget, MoveToTarget};
pub use seek::SeekToPosition;
pub use tuning::MovementTuning;

use crate::movable::Movable;
use crate::path::PathService;
use crate::rng::SimRng;

pub struct MoveContext<'a> {
    pub mover: &'a mut dyn Movable,
    pub paths: &'a mut dyn PathService,
    pub rng: &'a mut SimRng,
}

impl<'a> MoveContext<'a> {
    pub fn new(
        mover: &'a mut dyn Movable,
        paths: &'a mut dyn PathService,
        rng: &'a mut SimRng,
    ) -> Self {
        Self { mover, paths, rng }
    }
}
