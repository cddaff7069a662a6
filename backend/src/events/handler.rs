//! Scenario event execution and scheduling
//!
//! This module handles:
//! - Scheduling events by step
//! - Executing events against an environment
//!
//! Failures are returned to the caller; the environment records them in its
//! event log and keeps running.

use crate::environment::{Environment, SimulationError};
use crate::events::types::{ScenarioEvent, ScheduledEvent};

/// Handles scenario event scheduling
#[derive(Debug, Clone, Default)]
pub struct ScenarioEventHandler {
    events: Vec<ScheduledEvent>,
}

impl ScenarioEventHandler {
    /// Create a new event handler with the given events
    pub fn new(events: Vec<ScheduledEvent>) -> Self {
        Self { events }
    }

    pub fn events(&self) -> &[ScheduledEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Get all events scheduled for a specific step, in configuration order
    pub fn events_for_step(&self, step: usize) -> Vec<&ScenarioEvent> {
        self.events
            .iter()
            .filter(|scheduled| scheduled.schedule.should_execute(step))
            .map(|scheduled| &scheduled.event)
            .collect()
    }
}

impl ScenarioEvent {
    /// Execute this event against the environment
    pub fn execute(&self, env: &mut Environment) -> Result<(), SimulationError> {
        match self {
            ScenarioEvent::AddRobot { x, y, z, heading } => {
                env.add_robot(*x, *y, *z, *heading)?;
            }
            ScenarioEvent::RemoveRobot { robot } => {
                env.remove_robot(*robot)?;
            }
            ScenarioEvent::ChangeFormation { formation } => {
                env.change_formation(formation.clone())?;
            }
            ScenarioEvent::FormFromClick { x, y } => {
                env.form_from_click(*x, *y)?;
            }
            ScenarioEvent::AddCell { anchor } => {
                env.add_cell(*anchor)?;
            }
            ScenarioEvent::RemoveCell { cell: Some(cell) } => {
                env.remove_cell(*cell)?;
            }
            ScenarioEvent::RemoveCell { cell: None } => {
                env.remove_newest_cell()?;
            }
        }
        Ok(())
    }
}
