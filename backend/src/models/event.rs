//! Event logging for simulation replay and auditing.
//!
//! Every significant state change of the environment is recorded as an
//! [`Event`]. Events are appended in the order they happen within a step and
//! the log is never rewritten.
//!
//! # Event Types
//!
//! - **Topology**: cells added, inserted, removed, excised
//! - **Registry**: robots added, removed
//! - **Auction**: insertion/push auctions settled
//! - **Formation**: formation swapped
//! - **Convergence**: quiescence reached
//! - **Scenario**: scheduled scenario event failed
//!
//! # Example
//!
//! ```rust
//! use formation_simulator_core_rs::models::{CellId, Event, RobotId};
//!
//! let event = Event::InsertionSettled {
//!     step: 4,
//!     cell: CellId(2),
//!     winner: RobotId(7),
//!     score: -1.5,
//! };
//!
//! assert_eq!(event.step(), 4);
//! assert_eq!(event.event_type(), "InsertionSettled");
//! ```

use crate::models::ids::{CellId, RobotId};
use serde::{Deserialize, Serialize};

/// Simulation event capturing a state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    /// Cell appended next to an anchor (or as the first cell)
    CellAdded {
        step: usize,
        cell: CellId,
        anchor: Option<CellId>,
    },

    /// Cell spliced between two adjacent cells
    CellInserted {
        step: usize,
        cell: CellId,
        between: (CellId, CellId),
    },

    /// Cell detached; its occupant (if any) became free
    CellRemoved {
        step: usize,
        cell: CellId,
        freed: Option<RobotId>,
    },

    /// Corrupted cell forcibly removed by the invariant sweep
    CellExcised {
        step: usize,
        cell: CellId,
        reason: String,
    },

    RobotAdded {
        step: usize,
        robot: RobotId,
        x: f64,
        y: f64,
    },

    RobotRemoved {
        step: usize,
        robot: RobotId,
        vacated: Option<CellId>,
    },

    /// Free robot won an empty cell
    InsertionSettled {
        step: usize,
        cell: CellId,
        winner: RobotId,
        score: f64,
    },

    /// Challenger took an occupied cell from its occupant
    PushSettled {
        step: usize,
        cell: CellId,
        winner: RobotId,
        displaced: RobotId,
        score: f64,
    },

    FormationChanged {
        step: usize,
        formation_id: u32,
    },

    /// Error stayed under threshold for the required streak
    Quiescent {
        step: usize,
        error: f64,
    },

    ScenarioEventFailed {
        step: usize,
        description: String,
        reason: String,
    },
}

impl Event {
    /// Step at which this event occurred
    pub fn step(&self) -> usize {
        match self {
            Event::CellAdded { step, .. } => *step,
            Event::CellInserted { step, .. } => *step,
            Event::CellRemoved { step, .. } => *step,
            Event::CellExcised { step, .. } => *step,
            Event::RobotAdded { step, .. } => *step,
            Event::RobotRemoved { step, .. } => *step,
            Event::InsertionSettled { step, .. } => *step,
            Event::PushSettled { step, .. } => *step,
            Event::FormationChanged { step, .. } => *step,
            Event::Quiescent { step, .. } => *step,
            Event::ScenarioEventFailed { step, .. } => *step,
        }
    }

    /// Short name of the event type
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::CellAdded { .. } => "CellAdded",
            Event::CellInserted { .. } => "CellInserted",
            Event::CellRemoved { .. } => "CellRemoved",
            Event::CellExcised { .. } => "CellExcised",
            Event::RobotAdded { .. } => "RobotAdded",
            Event::RobotRemoved { .. } => "RobotRemoved",
            Event::InsertionSettled { .. } => "InsertionSettled",
            Event::PushSettled { .. } => "PushSettled",
            Event::FormationChanged { .. } => "FormationChanged",
            Event::Quiescent { .. } => "Quiescent",
            Event::ScenarioEventFailed { .. } => "ScenarioEventFailed",
        }
    }

    /// Cell the event is about, if any
    pub fn cell(&self) -> Option<CellId> {
        match self {
            Event::CellAdded { cell, .. } => Some(*cell),
            Event::CellInserted { cell, .. } => Some(*cell),
            Event::CellRemoved { cell, .. } => Some(*cell),
            Event::CellExcised { cell, .. } => Some(*cell),
            Event::RobotRemoved { vacated, .. } => *vacated,
            Event::InsertionSettled { cell, .. } => Some(*cell),
            Event::PushSettled { cell, .. } => Some(*cell),
            _ => None,
        }
    }

    /// Robot the event is about, if any
    pub fn robot(&self) -> Option<RobotId> {
        match self {
            Event::CellRemoved { freed, .. } => *freed,
            Event::RobotAdded { robot, .. } => Some(*robot),
            Event::RobotRemoved { robot, .. } => Some(*robot),
            Event::InsertionSettled { winner, .. } => Some(*winner),
            Event::PushSettled { winner, .. } => Some(*winner),
            _ => None,
        }
    }
}

/// Append-only event log.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventLog {
    events: Vec<Event>,
}

impl EventLog {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn log(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Events for a specific step
    pub fn events_at_step(&self, step: usize) -> Vec<&Event> {
        self.events.iter().filter(|e| e.step() == step).collect()
    }

    /// Events of a specific type
    pub fn events_of_type(&self, event_type: &str) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    /// Events touching a specific cell
    pub fn events_for_cell(&self, cell: CellId) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| e.cell() == Some(cell))
            .collect()
    }

    /// Events touching a specific robot
    pub fn events_for_robot(&self, robot: RobotId) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| e.robot() == Some(robot))
            .collect()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
