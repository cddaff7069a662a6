//! Cell model
//!
//! A cell is one slot of the formation topology. It references (never owns)
//! its neighbors by id and is occupied by at most one robot.
//!
//! # Critical Invariants
//!
//! 1. **Mutual links**: if `a.right == Some(b)` then `b.left == Some(a)`
//! 2. **Back-reference**: if `occupant == Some(r)` then robot `r` has
//!    `cell == Some(self.id)`
//!
//! Links are maintained by [`crate::topology::CellTopology`]; occupancy by
//! the environment, which updates both sides together.

use crate::models::geometry::Vector;
use crate::models::ids::{CellId, RobotId};
use serde::{Deserialize, Serialize};

/// Walking direction along the topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Left,
    Right,
}

impl Direction {
    pub fn opposite(self) -> Direction {
        match self {
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
        }
    }
}

/// A formation slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    id: CellId,
    /// Absolute desired position from the active formation
    target: Vector,
    occupant: Option<RobotId>,
    left: Option<CellId>,
    right: Option<CellId>,
}

impl Cell {
    /// Create an unlinked, empty cell
    pub fn new(id: CellId) -> Self {
        Self {
            id,
            target: Vector::ZERO,
            occupant: None,
            left: None,
            right: None,
        }
    }

    pub fn id(&self) -> CellId {
        self.id
    }

    pub fn target(&self) -> Vector {
        self.target
    }

    pub fn occupant(&self) -> Option<RobotId> {
        self.occupant
    }

    pub fn is_occupied(&self) -> bool {
        self.occupant.is_some()
    }

    pub fn left(&self) -> Option<CellId> {
        self.left
    }

    pub fn right(&self) -> Option<CellId> {
        self.right
    }

    /// Neighbor in the given direction
    pub fn neighbor(&self, direction: Direction) -> Option<CellId> {
        match direction {
            Direction::Left => self.left,
            Direction::Right => self.right,
        }
    }

    pub(crate) fn set_target(&mut self, target: Vector) {
        self.target = target;
    }

    pub(crate) fn set_occupant(&mut self, occupant: Option<RobotId>) {
        self.occupant = occupant;
    }

    pub(crate) fn set_neighbor(&mut self, direction: Direction, cell: Option<CellId>) {
        match direction {
            Direction::Left => self.left = cell,
            Direction::Right => self.right = cell,
        }
    }

    /// Rebuild a cell from checkpointed fields
    pub fn from_snapshot(
        id: CellId,
        target: Vector,
        occupant: Option<RobotId>,
        left: Option<CellId>,
        right: Option<CellId>,
    ) -> Self {
        Self {
            id,
            target,
            occupant,
            left,
            right,
        }
    }
}
