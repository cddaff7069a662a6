//! Strongly-typed identifiers for cells, robots and packet endpoints.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies a cell slot in the topology.
///
/// Allocated sequentially by the topology arena and never reused within the
/// lifetime of an environment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellId(pub u32);

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cell_{}", self.0)
    }
}

impl From<u32> for CellId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Identifies a robot in the registry.
///
/// Allocated monotonically; the lowest id wins auction ties.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RobotId(pub u32);

impl fmt::Display for RobotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "robot_{}", self.0)
    }
}

impl From<u32> for RobotId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Sender or receiver of a packet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Address {
    /// A single robot
    Robot(RobotId),
    /// The environment itself (operator)
    Environment,
    /// Every robot known to the receiving environment
    Broadcast,
}

impl Address {
    /// Robot id if this addresses a single robot
    pub fn robot(&self) -> Option<RobotId> {
        match self {
            Address::Robot(id) => Some(*id),
            _ => None,
        }
    }
}

impl From<RobotId> for Address {
    fn from(id: RobotId) -> Self {
        Address::Robot(id)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Robot(id) => write!(f, "{}", id),
            Address::Environment => write!(f, "environment"),
            Address::Broadcast => write!(f, "broadcast"),
        }
    }
}
