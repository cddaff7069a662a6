//! Robot model
//!
//! An autonomous agent with a pose and an optional cell assignment.
//! A robot without a cell is *free* and takes part in insertion auctions.
//!
//! Besides its own state a robot keeps what it has learned from delivered
//! packets: the last heartbeat pose of each neighbor, the last assignment it
//! acknowledged and the id of the last formation broadcast it heard.

use crate::models::geometry::{Pose, Vector};
use crate::models::ids::{CellId, RobotId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Represents a robot in the registry
///
/// # Example
/// ```
/// use formation_simulator_core_rs::models::{Robot, RobotId, Vector};
///
/// let mut robot = Robot::new(RobotId(0), 0.0, 0.0, 0.0, 0.0);
/// assert!(robot.is_free());
///
/// let moved = robot.move_toward(Vector::new(3.0, 4.0), 2.0);
/// assert_eq!(moved, 2.0);
/// assert_eq!(robot.distance_traveled(), 2.0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Robot {
    id: RobotId,
    pose: Pose,
    cell: Option<CellId>,

    /// Cumulative path length (for the distance log)
    distance_traveled: f64,

    /// Last pose heard from each neighbor via heartbeat
    neighbor_view: BTreeMap<RobotId, Pose>,

    /// Cell named by the most recent assignment packet delivered to us
    acknowledged_cell: Option<CellId>,

    /// Id of the most recent formation broadcast delivered to us
    formation_id: Option<u32>,
}

impl Robot {
    /// Create a free robot at the given pose
    pub fn new(id: RobotId, x: f64, y: f64, z: f64, heading: f64) -> Self {
        Self {
            id,
            pose: Pose::new(x, y, z, heading),
            cell: None,
            distance_traveled: 0.0,
            neighbor_view: BTreeMap::new(),
            acknowledged_cell: None,
            formation_id: None,
        }
    }

    pub fn id(&self) -> RobotId {
        self.id
    }

    pub fn pose(&self) -> Pose {
        self.pose
    }

    pub fn position(&self) -> Vector {
        self.pose.position()
    }

    pub fn cell(&self) -> Option<CellId> {
        self.cell
    }

    pub fn is_free(&self) -> bool {
        self.cell.is_none()
    }

    pub fn distance_traveled(&self) -> f64 {
        self.distance_traveled
    }

    pub fn neighbor_view(&self) -> &BTreeMap<RobotId, Pose> {
        &self.neighbor_view
    }

    pub fn acknowledged_cell(&self) -> Option<CellId> {
        self.acknowledged_cell
    }

    pub fn formation_id(&self) -> Option<u32> {
        self.formation_id
    }

    pub(crate) fn set_cell(&mut self, cell: Option<CellId>) {
        self.cell = cell;
    }

    /// Translate toward `target` by at most `max_step`.
    ///
    /// Heading follows the direction of travel. Returns the distance moved.
    pub fn move_toward(&mut self, target: Vector, max_step: f64) -> f64 {
        let delta = target.sub(self.position());
        let gap = delta.length();
        if gap == 0.0 || max_step <= 0.0 {
            return 0.0;
        }

        let step = gap.min(max_step);
        let next = if step == gap {
            target
        } else {
            self.position().add(delta.scale(step / gap))
        };

        self.pose.x = next.x;
        self.pose.y = next.y;
        self.pose.heading = delta.bearing();
        self.distance_traveled += step;
        step
    }

    pub(crate) fn hear_heartbeat(&mut self, from: RobotId, pose: Pose) {
        self.neighbor_view.insert(from, pose);
    }

    pub(crate) fn acknowledge_assignment(&mut self, cell: CellId) {
        self.acknowledged_cell = Some(cell);
    }

    pub(crate) fn acknowledge_displacement(&mut self) {
        self.acknowledged_cell = None;
        self.neighbor_view.clear();
    }

    pub(crate) fn hear_formation(&mut self, formation_id: u32) {
        self.formation_id = Some(formation_id);
    }

    /// Rebuild a robot from checkpointed fields
    pub fn from_snapshot(
        id: RobotId,
        pose: Pose,
        cell: Option<CellId>,
        distance_traveled: f64,
        neighbor_view: BTreeMap<RobotId, Pose>,
        acknowledged_cell: Option<CellId>,
        formation_id: Option<u32>,
    ) -> Self {
        Self {
            id,
            pose,
            cell,
            distance_traveled,
            neighbor_view,
            acknowledged_cell,
            formation_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_move_snaps_onto_close_target() {
        let mut robot = Robot::new(RobotId(1), 0.0, 0.0, 0.0, 0.0);
        let moved = robot.move_toward(Vector::new(0.5, 0.0), 2.0);

        assert_eq!(moved, 0.5);
        assert_eq!(robot.position(), Vector::new(0.5, 0.0));
    }

    #[test]
    fn test_move_at_target_is_noop() {
        let mut robot = Robot::new(RobotId(1), 1.0, 1.0, 0.0, 0.3);
        assert_eq!(robot.move_toward(Vector::new(1.0, 1.0), 2.0), 0.0);
        assert_eq!(robot.pose().heading, 0.3);
    }

    #[test]
    fn test_displacement_forgets_neighbors() {
        let mut robot = Robot::new(RobotId(1), 0.0, 0.0, 0.0, 0.0);
        robot.hear_heartbeat(RobotId(2), Pose::default());
        robot.acknowledge_assignment(CellId(4));

        robot.acknowledge_displacement();

        assert!(robot.neighbor_view().is_empty());
        assert_eq!(robot.acknowledged_cell(), None);
    }
}
