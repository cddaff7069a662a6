//! Formation definitions
//!
//! A formation describes the target shape: where each cell of an `n`-cell
//! topology should sit relative to the formation origin. Formations are
//! immutable values; the environment swaps them wholesale.
//!
//! # Offsets
//!
//! Curve shapes place cell `k` (counted from the topology head) at
//! `x = (k - (n-1)/2) * spacing`, `y = f(x)`, so the origin sits in the middle
//! of the chain. A circle spreads `n` cells evenly on a circle of
//! circumference `n * spacing` around the origin. Custom offsets are used in
//! order and extended along +x past the last entry. All offsets are then
//! rotated by `heading`.

use crate::models::geometry::Vector;
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;
use thiserror::Error;

/// How the ends of the topology are joined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Closure {
    /// Open ends: head has no left neighbor, tail has no right neighbor
    Chain,
    /// Wrapped ends: tail's right is head and head's left is tail
    Ring,
}

/// Target shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FormationShape {
    /// y = 0
    Line,
    /// y = amplitude * sin(2πx / period)
    Sine { amplitude: f64, period: f64 },
    /// y = curvature * x²
    Parabola { curvature: f64 },
    /// Evenly spaced on a circle around the origin
    Circle,
    /// Explicit offsets, in topology order
    Custom { offsets: Vec<Vector> },
}

/// Reasons a formation is rejected at the boundary
#[derive(Debug, Error, PartialEq)]
pub enum FormationError {
    #[error("Formation spacing must be positive and finite, got {0}")]
    InvalidSpacing(f64),

    #[error("Formation parameter `{0}` must be finite")]
    NonFinite(&'static str),

    #[error("Sine period must be positive, got {0}")]
    InvalidPeriod(f64),

    #[error("Custom formation needs at least one offset")]
    EmptyCustomOffsets,

    #[error("Custom offset {index} is not finite")]
    NonFiniteOffset { index: usize },
}

/// A target arrangement of cells
///
/// # Example
/// ```
/// use formation_simulator_core_rs::models::{Closure, Formation, FormationShape};
///
/// let line = Formation::new(1, FormationShape::Line, 2.0);
/// assert_eq!(line.closure(), Closure::Chain);
///
/// let offsets = line.offsets(3);
/// assert_eq!(offsets[0].x, -2.0);
/// assert_eq!(offsets[2].x, 2.0);
///
/// let ring = Formation::new(2, FormationShape::Circle, 1.0);
/// assert_eq!(ring.closure(), Closure::Ring);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Formation {
    id: u32,
    shape: FormationShape,
    spacing: f64,
    #[serde(default)]
    heading: f64,
    closure: Closure,
}

impl Formation {
    /// Create a formation with the shape's natural closure
    /// (`Ring` for circles, `Chain` otherwise) and zero heading.
    pub fn new(id: u32, shape: FormationShape, spacing: f64) -> Self {
        let closure = match shape {
            FormationShape::Circle => Closure::Ring,
            _ => Closure::Chain,
        };
        Self {
            id,
            shape,
            spacing,
            heading: 0.0,
            closure,
        }
    }

    pub fn with_closure(mut self, closure: Closure) -> Self {
        self.closure = closure;
        self
    }

    pub fn with_heading(mut self, heading: f64) -> Self {
        self.heading = heading;
        self
    }

    /// Same shape under a different id (click-derived copies)
    pub fn with_id(mut self, id: u32) -> Self {
        self.id = id;
        self
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn shape(&self) -> &FormationShape {
        &self.shape
    }

    pub fn spacing(&self) -> f64 {
        self.spacing
    }

    pub fn heading(&self) -> f64 {
        self.heading
    }

    pub fn closure(&self) -> Closure {
        self.closure
    }

    /// Reject degenerate formations
    pub fn validate(&self) -> Result<(), FormationError> {
        if !(self.spacing.is_finite() && self.spacing > 0.0) {
            return Err(FormationError::InvalidSpacing(self.spacing));
        }
        if !self.heading.is_finite() {
            return Err(FormationError::NonFinite("heading"));
        }

        match &self.shape {
            FormationShape::Line | FormationShape::Circle => Ok(()),
            FormationShape::Sine { amplitude, period } => {
                if !amplitude.is_finite() {
                    return Err(FormationError::NonFinite("amplitude"));
                }
                if !(period.is_finite() && *period > 0.0) {
                    return Err(FormationError::InvalidPeriod(*period));
                }
                Ok(())
            }
            FormationShape::Parabola { curvature } => {
                if !curvature.is_finite() {
                    return Err(FormationError::NonFinite("curvature"));
                }
                Ok(())
            }
            FormationShape::Custom { offsets } => {
                if offsets.is_empty() {
                    return Err(FormationError::EmptyCustomOffsets);
                }
                match offsets.iter().position(|o| !o.is_finite()) {
                    Some(index) => Err(FormationError::NonFiniteOffset { index }),
                    None => Ok(()),
                }
            }
        }
    }

    /// Offsets (relative to the formation origin) for an `n`-cell topology,
    /// in topology order starting at the head.
    pub fn offsets(&self, n: usize) -> Vec<Vector> {
        (0..n)
            .map(|k| self.raw_offset(k, n).rotate(self.heading))
            .collect()
    }

    fn raw_offset(&self, k: usize, n: usize) -> Vector {
        let centered_x = (k as f64 - (n as f64 - 1.0) / 2.0) * self.spacing;

        match &self.shape {
            FormationShape::Line => Vector::new(centered_x, 0.0),
            FormationShape::Sine { amplitude, period } => {
                Vector::new(centered_x, amplitude * (TAU * centered_x / period).sin())
            }
            FormationShape::Parabola { curvature } => {
                Vector::new(centered_x, curvature * centered_x * centered_x)
            }
            FormationShape::Circle => {
                let radius = n as f64 * self.spacing / TAU;
                let angle = TAU * k as f64 / n as f64;
                Vector::new(radius * angle.cos(), radius * angle.sin())
            }
            FormationShape::Custom { offsets } => match offsets.get(k) {
                Some(offset) => *offset,
                None => {
                    let last = offsets.last().copied().unwrap_or(Vector::ZERO);
                    let overflow = (k + 1 - offsets.len()) as f64;
                    Vector::new(last.x + overflow * self.spacing, last.y)
                }
            },
        }
    }
}

impl Default for Formation {
    fn default() -> Self {
        Formation::new(0, FormationShape::Line, 1.0)
    }
}
