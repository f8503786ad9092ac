use std::ops::{Add, AddAssign, Mul, Sub};

use serde::{Deserialize, Serialize};

const COINCIDENT_EPSILON: f32 = 1e-4;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn length_squared(self) -> f32 {
        self.x * self.x + self.y * self.y
    }

    pub fn length(self) -> f32 {
        self.length_squared().sqrt()
    }

    pub fn distance(self, other: Vec2) -> f32 {
        (other - self).length()
    }

    pub fn distance_squared(self, other: Vec2) -> f32 {
        (other - self).length_squared()
    }

    /// Unit vector in the same direction, or `None` for a (near) zero vector.
    pub fn normalized(self) -> Option<Vec2> {
        let length = self.length();
        if length <= COINCIDENT_EPSILON || !length.is_finite() {
            return None;
        }
        Some(Vec2 {
            x: self.x / length,
            y: self.y / length,
        })
    }

    pub fn is_coincident(self, other: Vec2) -> bool {
        self.distance_squared(other) <= COINCIDENT_EPSILON * COINCIDENT_EPSILON
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl Add for Vec2 {
    type Output = Vec2;

    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2 {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
        }
    }
}

impl AddAssign for Vec2 {
    fn add_assign(&mut self, rhs: Vec2) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Sub for Vec2 {
    type Output = Vec2;

    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2 {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
        }
    }
}

impl Mul<f32> for Vec2 {
    type Output = Vec2;

    fn mul(self, rhs: f32) -> Vec2 {
        Vec2 {
            x: self.x * rhs,
            y: self.y * rhs,
        }
    }
}

/// Circular collision footprint used for occupancy and reach tests.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Brush {
    pub radius: f32,
}

impl Default for Brush {
    fn default() -> Self {
        Self { radius: 4.0 }
    }
}

impl Brush {
    pub const fn new(radius: f32) -> Self {
        Self { radius }
    }

    /// True when a body with this brush at `position` touches a footprint of
    /// `target_radius` centered at `target`, allowing `tolerance` slack.
    pub fn reaches(
        &self,
        position: Vec2,
        target: Vec2,
        target_radius: f32,
        tolerance: f32,
    ) -> bool {
        let reach = self.radius + target_radius + tolerance;
        position.distance_squared(target) <= reach * reach
    }
}
