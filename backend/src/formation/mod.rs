//! Formation Manager
//!
//! Holds the active [`Formation`] and the world-space origin it is anchored
//! at, and turns them into per-cell target positions.
//!
//! Formations are immutable once installed. A change swaps the whole
//! formation (and optionally the origin) after validation; a rejected
//! formation leaves the active one in place.

use crate::models::{Formation, FormationError, Vector};
use crate::topology::CellTopology;
use serde::{Deserialize, Serialize};

/// Active formation plus its anchor point
///
/// # Example
/// ```
/// use formation_simulator_core_rs::formation::FormationManager;
/// use formation_simulator_core_rs::models::{Formation, FormationShape, Vector};
///
/// let mut manager = FormationManager::new(Formation::default(), Vector::ZERO).unwrap();
/// let targets = manager.targets(3);
/// assert_eq!(targets[0], Vector::new(-1.0, 0.0));
///
/// let bad = Formation::new(7, FormationShape::Line, 0.0);
/// assert!(manager.change_formation(bad).is_err());
/// assert_eq!(manager.formation().id(), 0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormationManager {
    formation: Formation,
    origin: Vector,
    /// Next id handed to a click-derived formation
    next_formation_id: u32,
}

impl FormationManager {
    pub fn new(formation: Formation, origin: Vector) -> Result<Self, FormationError> {
        formation.validate()?;
        if !origin.is_finite() {
            return Err(FormationError::NonFinite("origin"));
        }
        let next_formation_id = formation.id().saturating_add(1);
        Ok(Self {
            formation,
            origin,
            next_formation_id,
        })
    }

    pub fn formation(&self) -> &Formation {
        &self.formation
    }

    pub fn origin(&self) -> Vector {
        self.origin
    }

    pub fn next_formation_id(&self) -> u32 {
        self.next_formation_id
    }

    /// Validate and install a new formation at the current origin
    pub fn change_formation(&mut self, formation: Formation) -> Result<(), FormationError> {
        let origin = self.origin;
        self.change_formation_at(formation, origin)
    }

    /// Validate and install a new formation anchored at `origin`
    pub fn change_formation_at(
        &mut self,
        formation: Formation,
        origin: Vector,
    ) -> Result<(), FormationError> {
        formation.validate()?;
        if !origin.is_finite() {
            return Err(FormationError::NonFinite("origin"));
        }
        self.next_formation_id = self
            .next_formation_id
            .max(formation.id().saturating_add(1));
        self.formation = formation;
        self.origin = origin;
        Ok(())
    }

    /// Copy of the active formation with a fresh id
    pub fn click_formation(&self) -> Formation {
        self.formation.clone().with_id(self.next_formation_id)
    }

    /// Absolute targets for an `n`-cell topology, head first
    pub fn targets(&self, n: usize) -> Vec<Vector> {
        self.formation
            .offsets(n)
            .into_iter()
            .map(|offset| self.origin.add(offset))
            .collect()
    }

    /// Write a target into every cell of `topology`, in topology order
    pub fn apply_targets(&self, topology: &mut CellTopology) {
        let order = topology.ordered();
        let targets = self.targets(order.len());
        for (id, target) in order.into_iter().zip(targets) {
            if let Some(cell) = topology.get_mut(id) {
                cell.set_target(target);
            }
        }
    }
}
