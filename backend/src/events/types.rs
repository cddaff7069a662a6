//! Scenario event types for simulation configuration
//!
//! Scenario events script changes to a running environment at specific
//! steps: robots joining or leaving, formation swaps, clicks, cells being
//! added or removed.
//!
//! # Design Principles
//!
//! 1. **Determinism**: events fire at fixed steps, before anything else in
//!    the tick
//! 2. **Self-contained**: events carry all data needed for execution
//! 3. **Non-fatal**: a failing event is logged and the tick continues

use crate::models::{CellId, Formation, RobotId};
use serde::{Deserialize, Serialize};

/// A scripted change to the environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScenarioEvent {
    /// Spawn a free robot
    AddRobot {
        x: f64,
        y: f64,
        #[serde(default)]
        z: f64,
        #[serde(default)]
        heading: f64,
    },

    /// Remove a robot, vacating its cell
    RemoveRobot { robot: RobotId },

    /// Install a new formation
    ChangeFormation { formation: Formation },

    /// Re-anchor a copy of the active formation at a point
    FormFromClick { x: f64, y: f64 },

    /// Add a cell to the right of `anchor` (after the tail if absent)
    AddCell {
        #[serde(default)]
        anchor: Option<CellId>,
    },

    /// Remove a cell (the newest one if absent)
    RemoveCell {
        #[serde(default)]
        cell: Option<CellId>,
    },
}

impl ScenarioEvent {
    /// One-line description for logs
    pub fn describe(&self) -> String {
        match self {
            ScenarioEvent::AddRobot { x, y, .. } => format!("add_robot at ({}, {})", x, y),
            ScenarioEvent::RemoveRobot { robot } => format!("remove_robot {}", robot),
            ScenarioEvent::ChangeFormation { formation } => {
                format!("change_formation to {}", formation.id())
            }
            ScenarioEvent::FormFromClick { x, y } => format!("form_from_click at ({}, {})", x, y),
            ScenarioEvent::AddCell { anchor: Some(anchor) } => format!("add_cell beside {}", anchor),
            ScenarioEvent::AddCell { anchor: None } => "add_cell at tail".to_string(),
            ScenarioEvent::RemoveCell { cell: Some(cell) } => format!("remove_cell {}", cell),
            ScenarioEvent::RemoveCell { cell: None } => "remove_cell newest".to_string(),
        }
    }
}

/// When to execute a scenario event
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventSchedule {
    /// Execute once at a specific step
    OneTime { step: usize },

    /// Execute at regular intervals starting from start_step
    Repeating { start_step: usize, interval: usize },
}

impl EventSchedule {
    /// Check if this schedule triggers at the given step
    pub fn should_execute(&self, step: usize) -> bool {
        match self {
            EventSchedule::OneTime { step: event_step } => step == *event_step,
            EventSchedule::Repeating {
                start_step,
                interval,
            } => {
                if *interval == 0 {
                    return step == *start_step;
                }
                step >= *start_step && (step - start_step) % interval == 0
            }
        }
    }
}

/// A scenario event paired with its schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledEvent {
    pub event: ScenarioEvent,
    pub schedule: EventSchedule,
}
