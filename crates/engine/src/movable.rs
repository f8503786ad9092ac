use crate::entity::EntityId;
use crate::geometry::{Brush, Vec2};

/// Scratch value owned by the path service. Movers store it and hand it back
/// untouched; the service uses it to remember where it registered the mover.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PathTag(pub Option<u64>);

/// Anything the movement states can drive.
pub trait Movable {
    fn id(&self) -> EntityId;
    fn position(&self) -> Vec2;
    fn set_position(&mut self, position: Vec2);
    fn facing(&self) -> Vec2;
    fn set_facing(&mut self, facing: Vec2);
    fn brush(&self) -> Brush;
    /// World units per second.
    fn speed(&self) -> f32;
    fn ignore_dynamic_obstacles(&self) -> bool;
    fn path_tag(&self) -> PathTag;
    fn set_path_tag(&mut self, tag: PathTag);

    /// Turns toward `point`; leaves facing untouched when already there.
    fn face_toward(&mut self, point: Vec2) {
        if let Some(direction) = (point - self.position()).normalized() {
            self.set_facing(direction);
        }
    }
}
