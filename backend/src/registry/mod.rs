//! Robot Registry
//!
//! Tracks every robot known to an environment, keyed by a monotonically
//! allocated [`RobotId`]. Lookups return `Option`: an unknown id is a normal
//! outcome, not an error. Operations that need both robots to exist
//! (relationships) or that would mutate an unknown robot return
//! [`RegistryError`].
//!
//! The registry does not know about cells; the environment keeps the
//! robot ↔ cell back-references consistent.

use crate::models::{Relationship, Robot, RobotId, Vector};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum RegistryError {
    #[error("Unknown robot: {0}")]
    UnknownRobot(RobotId),
}

/// All robots of an environment
///
/// # Example
/// ```
/// use formation_simulator_core_rs::registry::RobotRegistry;
///
/// let mut registry = RobotRegistry::new();
/// let near = registry.add_robot(1.0, 0.0, 0.0, 0.0);
/// let far = registry.add_robot(5.0, 0.0, 0.0, 0.0);
///
/// assert_eq!(registry.nearest_free_robot(0.0, 0.0), Some(near));
/// assert_eq!(registry.relationship(far, near).unwrap().distance, 4.0);
/// ```
#[derive(Debug, Clone, Default)]
pub struct RobotRegistry {
    robots: BTreeMap<RobotId, Robot>,
    next_id: u32,
}

impl RobotRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from checkpointed robots
    pub fn from_parts(robots: Vec<Robot>, next_id: u32) -> Self {
        Self {
            robots: robots.into_iter().map(|r| (r.id(), r)).collect(),
            next_id,
        }
    }

    /// Register a free robot at the given pose
    pub fn add_robot(&mut self, x: f64, y: f64, z: f64, theta: f64) -> RobotId {
        let id = RobotId(self.next_id);
        self.next_id += 1;
        self.robots.insert(id, Robot::new(id, x, y, z, theta));
        id
    }

    /// Remove a robot. The caller must already have vacated its cell.
    pub fn remove_robot(&mut self, id: RobotId) -> Result<Robot, RegistryError> {
        self.robots.remove(&id).ok_or(RegistryError::UnknownRobot(id))
    }

    pub fn get_robot(&self, id: RobotId) -> Option<&Robot> {
        self.robots.get(&id)
    }

    pub(crate) fn get_robot_mut(&mut self, id: RobotId) -> Option<&mut Robot> {
        self.robots.get_mut(&id)
    }

    pub fn contains(&self, id: RobotId) -> bool {
        self.robots.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.robots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.robots.is_empty()
    }

    /// Next id the registry will hand out
    pub fn next_id(&self) -> u32 {
        self.next_id
    }

    /// All robots in id order
    pub fn robots(&self) -> impl Iterator<Item = &Robot> {
        self.robots.values()
    }

    /// Ids of robots without a cell, in id order
    pub fn free_robots(&self) -> Vec<RobotId> {
        self.robots
            .values()
            .filter(|r| r.is_free())
            .map(|r| r.id())
            .collect()
    }

    pub fn n_free_robots(&self) -> usize {
        self.robots.values().filter(|r| r.is_free()).count()
    }

    /// Displacement from robot `from` to robot `to`
    pub fn relationship(&self, to: RobotId, from: RobotId) -> Result<Relationship, RegistryError> {
        let to_robot = self.robots.get(&to).ok_or(RegistryError::UnknownRobot(to))?;
        let from_robot = self
            .robots
            .get(&from)
            .ok_or(RegistryError::UnknownRobot(from))?;
        Ok(Relationship::between(
            from_robot.position(),
            to_robot.position(),
        ))
    }

    /// Euclidean distance from `point` to a robot
    pub fn distance_to_robot(&self, point: Vector, id: RobotId) -> Option<f64> {
        self.robots.get(&id).map(|r| point.distance_to(r.position()))
    }

    /// Nearest free robot to `(x, y)` by linear scan; ties go to the lowest id
    pub fn nearest_free_robot(&self, x: f64, y: f64) -> Option<RobotId> {
        let point = Vector::new(x, y);
        let mut best: Option<(RobotId, f64)> = None;

        for robot in self.robots.values().filter(|r| r.is_free()) {
            let distance = point.distance_to(robot.position());
            match best {
                Some((_, best_distance)) if distance >= best_distance => {}
                _ => best = Some((robot.id(), distance)),
            }
        }

        best.map(|(id, _)| id)
    }

    /// Drop every robot; ids keep counting up
    pub fn clear(&mut self) {
        self.robots.clear();
    }
}
