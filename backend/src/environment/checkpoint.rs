//! Checkpoint - Save/Load Environment State
//!
//! Enables serialization and deserialization of complete environment state
//! for pause/resume functionality.
//!
//! # Critical Invariants
//!
//! - **Determinism**: restoring a snapshot and ticking produces the same
//!   results as ticking the original
//! - **Occupancy Integrity**: every occupant is a registered robot assigned
//!   back to that cell, and every assignment is mirrored by its cell
//! - **Link Integrity**: neighbor links only name cells in the snapshot
//! - **Config Matching**: state can only be loaded with matching config

use crate::auction::AuctionBook;
use crate::core::time::StepClock;
use crate::environment::engine::{Environment, EnvironmentConfig, SimulationError};
use crate::formation::FormationManager;
use crate::models::{Cell, CellId, Closure, EventLog, Packet, Pose, Robot, RobotId, RunLogs, Vector};
use crate::registry::RobotRegistry;
use crate::rng::RngManager;
use crate::router::MessageRouter;
use crate::topology::CellTopology;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

// ============================================================================
// Snapshot Structures
// ============================================================================

/// Complete environment state snapshot
///
/// This structure captures all state necessary to resume a simulation
/// from an arbitrary step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Step the next tick will execute
    pub current_step: usize,

    /// RNG state at time of snapshot (CRITICAL for determinism)
    pub rng_state: u64,

    pub closure: Closure,
    pub head: Option<CellId>,
    pub next_cell_id: u32,
    pub cells: Vec<CellSnapshot>,

    pub next_robot_id: u32,
    pub robots: Vec<RobotSnapshot>,

    /// Undelivered packets, oldest first
    pub queue: Vec<Packet>,
    pub outbox: Vec<Packet>,
    pub total_messages: u64,
    pub dropped_packets: u64,

    /// Insertion requests waiting for bidders
    pub pending_auctions: Vec<CellId>,

    pub q_count: usize,
    pub last_error: f64,

    pub formation: FormationManager,

    pub logs: RunLogs,
    pub events: EventLog,

    /// SHA256 hash of original config (for validation)
    pub config_hash: String,
}

/// Cell state snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellSnapshot {
    pub id: CellId,
    pub target: Vector,
    pub occupant: Option<RobotId>,
    pub left: Option<CellId>,
    pub right: Option<CellId>,
}

impl From<&Cell> for CellSnapshot {
    fn from(cell: &Cell) -> Self {
        CellSnapshot {
            id: cell.id(),
            target: cell.target(),
            occupant: cell.occupant(),
            left: cell.left(),
            right: cell.right(),
        }
    }
}

impl From<CellSnapshot> for Cell {
    fn from(snapshot: CellSnapshot) -> Self {
        Cell::from_snapshot(
            snapshot.id,
            snapshot.target,
            snapshot.occupant,
            snapshot.left,
            snapshot.right,
        )
    }
}

/// Robot state snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotSnapshot {
    pub id: RobotId,
    pub pose: Pose,
    pub cell: Option<CellId>,
    pub distance_traveled: f64,
    pub neighbor_view: Vec<(RobotId, Pose)>,
    pub acknowledged_cell: Option<CellId>,
    pub formation_id: Option<u32>,
}

impl From<&Robot> for RobotSnapshot {
    fn from(robot: &Robot) -> Self {
        RobotSnapshot {
            id: robot.id(),
            pose: robot.pose(),
            cell: robot.cell(),
            distance_traveled: robot.distance_traveled(),
            neighbor_view: robot
                .neighbor_view()
                .iter()
                .map(|(id, pose)| (*id, *pose))
                .collect(),
            acknowledged_cell: robot.acknowledged_cell(),
            formation_id: robot.formation_id(),
        }
    }
}

impl From<RobotSnapshot> for Robot {
    fn from(snapshot: RobotSnapshot) -> Self {
        Robot::from_snapshot(
            snapshot.id,
            snapshot.pose,
            snapshot.cell,
            snapshot.distance_traveled,
            snapshot.neighbor_view.into_iter().collect::<BTreeMap<_, _>>(),
            snapshot.acknowledged_cell,
            snapshot.formation_id,
        )
    }
}

// ============================================================================
// Config Hashing
// ============================================================================

/// Compute deterministic SHA256 hash of config
///
/// This hash is used to verify that a checkpoint's config matches
/// the config used to restore it.
///
/// Uses canonical JSON serialization with sorted keys so the hash does not
/// depend on field order.
pub fn compute_config_hash<T: Serialize>(config: &T) -> Result<String, SimulationError> {
    use serde_json::Value;

    let value = serde_json::to_value(config).map_err(|e| {
        SimulationError::SerializationError(format!("Config serialization failed: {}", e))
    })?;

    // Recursively sort all object keys for canonical representation
    fn canonicalize(value: Value) -> Value {
        match value {
            Value::Object(map) => {
                let sorted: BTreeMap<String, Value> =
                    map.into_iter().map(|(k, v)| (k, canonicalize(v))).collect();
                Value::Object(sorted.into_iter().collect())
            }
            Value::Array(arr) => Value::Array(arr.into_iter().map(canonicalize).collect()),
            other => other,
        }
    }

    let json = serde_json::to_string(&canonicalize(value)).map_err(|e| {
        SimulationError::SerializationError(format!("Config serialization failed: {}", e))
    })?;

    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

// ============================================================================
// Validation Functions
// ============================================================================

fn invalid(msg: String) -> Result<(), SimulationError> {
    Err(SimulationError::StateValidationError(msg))
}

/// Validate state snapshot integrity
///
/// Checks critical invariants:
/// - Unique ids below the allocation counters
/// - Occupancy is mirrored between cells and robots
/// - Links, head and pending auctions name existing cells
pub fn validate_snapshot(snapshot: &StateSnapshot) -> Result<(), SimulationError> {
    // 1. Unique, allocated ids
    let mut cell_ids = BTreeSet::new();
    for cell in &snapshot.cells {
        if !cell_ids.insert(cell.id) {
            return invalid(format!("Duplicate cell {}", cell.id));
        }
        if cell.id.0 >= snapshot.next_cell_id {
            return invalid(format!("Cell {} was never allocated", cell.id));
        }
    }

    let mut robots = BTreeMap::new();
    for robot in &snapshot.robots {
        if robots.insert(robot.id, robot).is_some() {
            return invalid(format!("Duplicate robot {}", robot.id));
        }
        if robot.id.0 >= snapshot.next_robot_id {
            return invalid(format!("Robot {} was never allocated", robot.id));
        }
    }

    // 2. Cell → robot occupancy
    let cells: BTreeMap<CellId, &CellSnapshot> =
        snapshot.cells.iter().map(|c| (c.id, c)).collect();
    for cell in &snapshot.cells {
        if let Some(occupant) = cell.occupant {
            match robots.get(&occupant) {
                None => {
                    return invalid(format!(
                        "Cell {} is occupied by unknown robot {}",
                        cell.id, occupant
                    ))
                }
                Some(robot) if robot.cell != Some(cell.id) => {
                    return invalid(format!(
                        "Cell {} names {} as occupant, but it is assigned to {:?}",
                        cell.id, occupant, robot.cell
                    ))
                }
                Some(_) => {}
            }
        }

        for neighbor in [cell.left, cell.right].into_iter().flatten() {
            if !cells.contains_key(&neighbor) {
                return invalid(format!("Cell {} links to missing {}", cell.id, neighbor));
            }
        }
    }

    // 3. Robot → cell assignment
    for robot in &snapshot.robots {
        if let Some(cell_id) = robot.cell {
            match cells.get(&cell_id) {
                Some(cell) if cell.occupant == Some(robot.id) => {}
                _ => {
                    return invalid(format!(
                        "Robot {} is assigned to {} which does not hold it",
                        robot.id, cell_id
                    ))
                }
            }
        }
    }

    // 4. Head and pending auctions
    match snapshot.head {
        Some(head) if !cells.contains_key(&head) => {
            return invalid(format!("Head {} is not a cell", head));
        }
        None if !cells.is_empty() => {
            return invalid("Cells present but no head".to_string());
        }
        _ => {}
    }

    for pending in &snapshot.pending_auctions {
        if !cells.contains_key(pending) {
            return invalid(format!("Pending auction for missing {}", pending));
        }
    }

    Ok(())
}

// ============================================================================
// Save / Load
// ============================================================================

impl Environment {
    /// Capture the complete state
    pub fn snapshot(&self) -> Result<StateSnapshot, SimulationError> {
        let (topology, registry, router, auctions, formation) = self.parts();

        Ok(StateSnapshot {
            current_step: self.step_count(),
            rng_state: self.rng_state(),
            closure: topology.closure(),
            head: topology.head(),
            next_cell_id: topology.next_id(),
            cells: topology.cells().map(CellSnapshot::from).collect(),
            next_robot_id: registry.next_id(),
            robots: registry.robots().map(RobotSnapshot::from).collect(),
            queue: router.queued().cloned().collect(),
            outbox: router.forwarded().cloned().collect(),
            total_messages: router.total_messages(),
            dropped_packets: self.dropped_packets(),
            pending_auctions: auctions.pending().copied().collect(),
            q_count: self.q_count(),
            last_error: self.last_error(),
            formation: formation.clone(),
            logs: self.logs().clone(),
            events: self.event_log().clone(),
            config_hash: compute_config_hash(self.config())?,
        })
    }

    /// Serialize the complete state to JSON
    pub fn save_state(&self) -> Result<String, SimulationError> {
        let snapshot = self.snapshot()?;
        serde_json::to_string(&snapshot).map_err(|e| {
            SimulationError::SerializationError(format!("Snapshot serialization failed: {}", e))
        })
    }

    /// Rebuild an environment from a snapshot taken under `config`
    pub fn from_snapshot(
        config: EnvironmentConfig,
        snapshot: StateSnapshot,
    ) -> Result<Self, SimulationError> {
        Self::validate_config(&config)?;

        let actual = compute_config_hash(&config)?;
        if actual != snapshot.config_hash {
            return Err(SimulationError::ConfigMismatch {
                expected: snapshot.config_hash,
                actual,
            });
        }

        validate_snapshot(&snapshot)?;

        let topology = CellTopology::from_parts(
            snapshot.cells.into_iter().map(Cell::from).collect(),
            snapshot.head,
            snapshot.next_cell_id,
            config.max_cells,
            snapshot.closure,
        );
        if let Some(violation) = topology.verify().into_iter().next() {
            return Err(SimulationError::StateValidationError(format!(
                "Topology is corrupted: {}",
                violation
            )));
        }

        let registry = RobotRegistry::from_parts(
            snapshot.robots.into_iter().map(Robot::from).collect(),
            snapshot.next_robot_id,
        );
        let router = MessageRouter::from_parts(
            snapshot.queue,
            snapshot.outbox,
            config.queue_capacity,
            snapshot.total_messages,
        );
        let auctions: AuctionBook = snapshot.pending_auctions.into_iter().collect();
        let clock = StepClock::at(snapshot.current_step, config.max_steps);

        let mut env = Environment::empty(config, snapshot.formation);
        env.restore_parts(
            topology,
            registry,
            router,
            auctions,
            snapshot.q_count,
            clock,
            RngManager::new(snapshot.rng_state),
            snapshot.logs,
            snapshot.events,
            snapshot.last_error,
            snapshot.dropped_packets,
        );

        info!(step = env.step_count(), "environment restored from checkpoint");
        Ok(env)
    }

    /// Deserialize state produced by [`save_state`](Self::save_state)
    pub fn load_state(config: EnvironmentConfig, json: &str) -> Result<Self, SimulationError> {
        let snapshot: StateSnapshot = serde_json::from_str(json).map_err(|e| {
            SimulationError::SerializationError(format!("Snapshot deserialization failed: {}", e))
        })?;
        Self::from_snapshot(config, snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_config_hash_deterministic() {
        let hash1 = compute_config_hash(&EnvironmentConfig::default()).unwrap();
        let hash2 = compute_config_hash(&EnvironmentConfig::default()).unwrap();

        assert_eq!(hash1, hash2, "Same config should produce same hash");
    }

    #[test]
    fn test_compute_config_hash_different_for_different_configs() {
        let config1 = EnvironmentConfig::default();
        let config2 = EnvironmentConfig {
            rng_seed: 43,
            ..Default::default()
        };

        assert_ne!(
            compute_config_hash(&config1).unwrap(),
            compute_config_hash(&config2).unwrap(),
            "Different configs should produce different hashes"
        );
    }

    fn snapshot_with(cells: Vec<CellSnapshot>, robots: Vec<RobotSnapshot>) -> StateSnapshot {
        let env = Environment::new(EnvironmentConfig::default()).unwrap();
        let mut snapshot = env.snapshot().unwrap();
        snapshot.head = cells.first().map(|c| c.id);
        snapshot.next_cell_id = cells.len() as u32;
        snapshot.next_robot_id = robots.len() as u32;
        snapshot.cells = cells;
        snapshot.robots = robots;
        snapshot
    }

    fn robot(id: u32, cell: Option<u32>) -> RobotSnapshot {
        RobotSnapshot {
            id: RobotId(id),
            pose: Pose::default(),
            cell: cell.map(CellId),
            distance_traveled: 0.0,
            neighbor_view: vec![],
            acknowledged_cell: None,
            formation_id: None,
        }
    }

    fn cell(id: u32, occupant: Option<u32>) -> CellSnapshot {
        CellSnapshot {
            id: CellId(id),
            target: Vector::ZERO,
            occupant: occupant.map(RobotId),
            left: None,
            right: None,
        }
    }

    #[test]
    fn test_validate_accepts_consistent_occupancy() {
        let snapshot = snapshot_with(vec![cell(0, Some(0))], vec![robot(0, Some(0))]);
        assert!(validate_snapshot(&snapshot).is_ok());
    }

    #[test]
    fn test_validate_rejects_one_sided_occupancy() {
        let snapshot = snapshot_with(vec![cell(0, Some(0))], vec![robot(0, None)]);
        assert!(matches!(
            validate_snapshot(&snapshot),
            Err(SimulationError::StateValidationError(_))
        ));

        let snapshot = snapshot_with(vec![cell(0, None)], vec![robot(0, Some(0))]);
        assert!(validate_snapshot(&snapshot).is_err());
    }

    #[test]
    fn test_validate_rejects_dangling_link() {
        let mut lonely = cell(0, None);
        lonely.right = Some(CellId(5));
        let snapshot = snapshot_with(vec![lonely], vec![]);
        assert!(validate_snapshot(&snapshot).is_err());
    }
}
