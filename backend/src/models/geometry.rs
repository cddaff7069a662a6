//! Planar geometry used by formations, poses and bid scoring.
//!
//! All coordinates are f64 in world units. Headings and bearings are radians,
//! counter-clockwise from +x.

use serde::{Deserialize, Serialize};

/// 2D vector / point
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector {
    pub x: f64,
    pub y: f64,
}

impl Vector {
    pub const ZERO: Vector = Vector { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn length(&self) -> f64 {
        self.x.hypot(self.y)
    }

    /// Angle of the vector from +x, in (-π, π]
    pub fn bearing(&self) -> f64 {
        self.y.atan2(self.x)
    }

    pub fn add(&self, other: Vector) -> Vector {
        Vector::new(self.x + other.x, self.y + other.y)
    }

    pub fn sub(&self, other: Vector) -> Vector {
        Vector::new(self.x - other.x, self.y - other.y)
    }

    pub fn scale(&self, k: f64) -> Vector {
        Vector::new(self.x * k, self.y * k)
    }

    /// Rotate counter-clockwise by `angle` radians
    pub fn rotate(&self, angle: f64) -> Vector {
        let (sin, cos) = angle.sin_cos();
        Vector::new(self.x * cos - self.y * sin, self.x * sin + self.y * cos)
    }

    pub fn distance_to(&self, other: Vector) -> f64 {
        self.sub(other).length()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Robot pose. `z` is carried for callers that place robots in 3D scenes;
/// the coordination core works in the xy-plane.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub heading: f64,
}

impl Pose {
    pub fn new(x: f64, y: f64, z: f64, heading: f64) -> Self {
        Self { x, y, z, heading }
    }

    pub fn position(&self) -> Vector {
        Vector::new(self.x, self.y)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite() && self.heading.is_finite()
    }
}

/// Relative displacement between two robots, as seen from the `from` robot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    /// `to - from` in world coordinates
    pub displacement: Vector,
    pub distance: f64,
    /// World-frame bearing of the displacement
    pub bearing: f64,
}

impl Relationship {
    pub fn between(from: Vector, to: Vector) -> Self {
        let displacement = to.sub(from);
        Self {
            displacement,
            distance: displacement.length(),
            bearing: displacement.bearing(),
        }
    }
}
