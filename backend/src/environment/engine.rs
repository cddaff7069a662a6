//! Environment Engine
//!
//! Owns every component of the coordination core and runs the tick loop:
//!
//! ```text
//! For each step s:
//! 1. Execute scenario events scheduled for s
//! 2. Snapshot the message queue length (delivery barrier)
//! 3. Grow the topology while free robots outnumber empty cells;
//!    recompute cell targets
//! 4. Raise and settle insertion auctions (empty cells) and push auctions
//!    (contested occupied cells)
//! 5. Deliver the packets that were queued before the tick started
//! 6. Queue heartbeats between robots in neighboring cells
//! 7. Move assigned robots toward their targets
//! 8. Aggregate error → convergence detector; append error/distance logs
//! 9. Verify topology and cell/robot consistency; excise corrupted cells
//! 10. Advance the step clock
//! ```
//!
//! # Example
//!
//! ```rust
//! use formation_simulator_core_rs::environment::{Environment, EnvironmentConfig, RobotSpawn};
//!
//! let config = EnvironmentConfig {
//!     robots: vec![RobotSpawn::at(0.0, 1.0), RobotSpawn::at(2.0, -1.0)],
//!     max_steps: Some(200),
//!     ..Default::default()
//! };
//!
//! let mut env = Environment::new(config).unwrap();
//! while env.step() {}
//!
//! assert!(env.quiescence());
//! assert_eq!(env.n_cells(), 2);
//! assert_eq!(env.n_free_robots(), 0);
//! ```

use crate::auction::{
    Auction, AuctionBook, AuctionError, AuctionKind, AuctionPolicy, Bid, BidContext, BidScorer,
    NearestScorer,
};
use crate::convergence::ConvergenceDetector;
use crate::core::time::StepClock;
use crate::events::{ScenarioEvent, ScenarioEventHandler, ScheduledEvent};
use crate::formation::FormationManager;
use crate::models::{
    Address, Cell, CellId, Direction, DistanceSample, ErrorSample, Event, EventLog, Formation,
    FormationError, MessageRecord, Packet, PacketKind, Payload, Relationship, Robot, RobotId,
    RunLogs, Vector,
};
use crate::registry::{RegistryError, RobotRegistry};
use crate::rng::RngManager;
use crate::router::{MessageRouter, RouterError, DEFAULT_QUEUE_CAPACITY};
use crate::topology::{CellTopology, TopologyError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::{debug, error, info, warn};

// ============================================================================
// Configuration Types
// ============================================================================

/// Complete environment configuration
///
/// Every field has a default, so a JSON configuration only needs to name what
/// it changes.
///
/// # Fields
///
/// * `initial_cells` - Cells created before the first tick
/// * `robots` - Robots spawned at fixed poses
/// * `scatter` - Robots spawned uniformly in a rectangle around `origin`
/// * `formation` - Initial formation (its closure sets the topology's)
/// * `auction_policy` - Bid scoring rule
/// * `push_margin` - How much closer a challenger must be to trigger a push
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    pub initial_cells: usize,

    pub robots: Vec<RobotSpawn>,

    pub scatter: Option<ScatterConfig>,

    pub formation: Formation,

    /// World-space anchor of the formation
    pub origin: Vector,

    /// Seed for all randomness (robot scattering)
    pub rng_seed: u64,

    /// Topology capacity (None = unbounded)
    pub max_cells: Option<usize>,

    /// Hard bound on queued packets
    pub queue_capacity: usize,

    /// Aggregate error at or under which a tick counts as quiet
    pub max_trans_error: f64,

    /// Per-tick translation limit for each robot
    pub max_speed: f64,

    /// Splice grown cells next to the nearest cell instead of appending at
    /// an end
    pub use_insertion: bool,

    /// Add cells while free robots outnumber empty cells
    pub auto_grow: bool,

    pub auction_policy: AuctionPolicy,

    pub push_margin: f64,

    /// Horizon after which `step()` reports inactive (None = unbounded)
    pub max_steps: Option<usize>,

    pub scenario_events: Vec<ScheduledEvent>,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            initial_cells: 0,
            robots: Vec::new(),
            scatter: None,
            formation: Formation::default(),
            origin: Vector::ZERO,
            rng_seed: 12345,
            max_cells: None,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_trans_error: 0.1,
            max_speed: 0.5,
            use_insertion: false,
            auto_grow: true,
            auction_policy: AuctionPolicy::default(),
            push_margin: 0.5,
            max_steps: None,
            scenario_events: Vec::new(),
        }
    }
}

/// A robot placed at a fixed pose at construction
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RobotSpawn {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
    #[serde(default)]
    pub heading: f64,
}

impl RobotSpawn {
    /// Spawn at `(x, y)` on the ground, facing +x
    pub fn at(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            z: 0.0,
            heading: 0.0,
        }
    }
}

/// Robots spawned uniformly in a `width` x `height` rectangle centered on
/// the formation origin
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScatterConfig {
    pub count: usize,
    pub width: f64,
    pub height: f64,
}

// ============================================================================
// Errors and Results
// ============================================================================

/// Simulation error types
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Invalid pose: {0}")]
    InvalidPose(String),

    #[error(transparent)]
    Topology(#[from] TopologyError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Auction(#[from] AuctionError),

    #[error(transparent)]
    Router(#[from] RouterError),

    #[error(transparent)]
    Formation(#[from] FormationError),

    #[error(transparent)]
    Export(#[from] crate::export::ExportError),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("State validation error: {0}")]
    StateValidationError(String),

    #[error("Config mismatch: checkpoint was taken with {expected}, got {actual}")]
    ConfigMismatch { expected: String, actual: String },
}

/// Result of a single tick
#[derive(Debug, Clone, PartialEq)]
pub struct StepResult {
    /// Step that was executed
    pub step: usize,

    /// False once quiescent or once the step horizon is reached
    pub active: bool,

    pub quiescent: bool,

    /// Aggregate positional error after movement
    pub error: f64,

    pub scenario_events: usize,
    pub cells_added: usize,
    pub settled_insertions: usize,
    pub settled_pushes: usize,
    pub delivered: usize,
    pub heartbeats: usize,
    pub excised: usize,
}

// ============================================================================
// Environment
// ============================================================================

/// The coordination core: topology, registry, auctions, router, convergence
#[derive(Debug)]
pub struct Environment {
    config: EnvironmentConfig,
    topology: CellTopology,
    registry: RobotRegistry,
    router: MessageRouter,
    convergence: ConvergenceDetector,
    formation: FormationManager,
    auctions: AuctionBook,
    scorer: Box<dyn BidScorer>,
    scenario: ScenarioEventHandler,
    clock: StepClock,
    rng: RngManager,
    logs: RunLogs,
    event_log: EventLog,
    last_error: f64,
    /// Packets the environment itself failed to queue (backpressure)
    dropped_packets: u64,
}

impl Environment {
    /// Create a new environment
    ///
    /// Validates the configuration, creates `initial_cells` cells and spawns
    /// the configured robots. Invalid values are rejected, never coerced.
    pub fn new(config: EnvironmentConfig) -> Result<Self, SimulationError> {
        Self::validate_config(&config)?;

        let formation = FormationManager::new(config.formation.clone(), config.origin)?;
        let mut env = Self::empty(config, formation);

        for _ in 0..env.config.initial_cells {
            env.add_cell(None)?;
        }

        let spawns = env.config.robots.clone();
        for spawn in spawns {
            env.add_robot(spawn.x, spawn.y, spawn.z, spawn.heading)?;
        }

        if let Some(scatter) = env.config.scatter {
            let origin = env.formation.origin();
            let (half_w, half_h) = (scatter.width / 2.0, scatter.height / 2.0);
            for _ in 0..scatter.count {
                let x = env.rng.uniform(origin.x - half_w, origin.x + half_w);
                let y = env.rng.uniform(origin.y - half_h, origin.y + half_h);
                env.add_robot(x, y, 0.0, 0.0)?;
            }
        }

        info!(
            cells = env.topology.len(),
            robots = env.registry.len(),
            seed = env.config.rng_seed,
            policy = env.scorer.name(),
            "environment created"
        );

        Ok(env)
    }

    /// Components wired up from config, no cells or robots yet
    pub(crate) fn empty(config: EnvironmentConfig, formation: FormationManager) -> Self {
        Self {
            topology: CellTopology::new(formation.formation().closure(), config.max_cells),
            registry: RobotRegistry::new(),
            router: MessageRouter::new(config.queue_capacity),
            convergence: ConvergenceDetector::new(config.max_trans_error),
            formation,
            auctions: AuctionBook::new(),
            scorer: config.auction_policy.build(),
            scenario: ScenarioEventHandler::new(config.scenario_events.clone()),
            clock: StepClock::new(config.max_steps),
            rng: RngManager::new(config.rng_seed),
            logs: RunLogs::new(),
            event_log: EventLog::new(),
            last_error: 0.0,
            dropped_packets: 0,
            config,
        }
    }

    /// Validate configuration parameters
    pub fn validate_config(config: &EnvironmentConfig) -> Result<(), SimulationError> {
        fn invalid(msg: String) -> Result<(), SimulationError> {
            Err(SimulationError::InvalidConfig(msg))
        }

        if !(config.max_speed.is_finite() && config.max_speed > 0.0) {
            return invalid(format!("max_speed must be > 0 (got {})", config.max_speed));
        }

        if !(config.max_trans_error.is_finite() && config.max_trans_error >= 0.0) {
            return invalid(format!(
                "max_trans_error must be >= 0 (got {})",
                config.max_trans_error
            ));
        }

        if !(config.push_margin.is_finite() && config.push_margin >= 0.0) {
            return invalid(format!(
                "push_margin must be >= 0 (got {})",
                config.push_margin
            ));
        }

        if config.queue_capacity == 0 {
            return invalid("queue_capacity must be > 0".to_string());
        }

        if let Some(max) = config.max_cells {
            if config.initial_cells > max {
                return invalid(format!(
                    "initial_cells ({}) exceeds max_cells ({})",
                    config.initial_cells, max
                ));
            }
        }

        if !config.origin.is_finite() {
            return invalid("origin must be finite".to_string());
        }

        config
            .formation
            .validate()
            .map_err(|e| SimulationError::InvalidConfig(format!("formation: {}", e)))?;

        config
            .auction_policy
            .validate()
            .map_err(|e| SimulationError::InvalidConfig(format!("auction_policy: {}", e)))?;

        for (index, spawn) in config.robots.iter().enumerate() {
            let finite = [spawn.x, spawn.y, spawn.z, spawn.heading]
                .iter()
                .all(|v| v.is_finite());
            if !finite {
                return invalid(format!("robots[{}] has a non-finite pose", index));
            }
        }

        if let Some(scatter) = &config.scatter {
            for (name, extent) in [("width", scatter.width), ("height", scatter.height)] {
                if !(extent.is_finite() && extent > 0.0) {
                    return invalid(format!("scatter.{} must be > 0 (got {})", name, extent));
                }
            }
        }

        for (index, scheduled) in config.scenario_events.iter().enumerate() {
            if let crate::events::EventSchedule::Repeating { interval: 0, .. } = scheduled.schedule {
                return invalid(format!("scenario_events[{}] has interval 0", index));
            }
        }

        Ok(())
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn config(&self) -> &EnvironmentConfig {
        &self.config
    }

    /// Step the next tick will execute
    pub fn step_count(&self) -> usize {
        self.clock.current_step()
    }

    pub fn clock(&self) -> &StepClock {
        &self.clock
    }

    pub fn quiescence(&self) -> bool {
        self.convergence.quiescence()
    }

    pub fn q_count(&self) -> usize {
        self.convergence.q_count()
    }

    /// Aggregate error observed by the last tick
    pub fn last_error(&self) -> f64 {
        self.last_error
    }

    pub fn n_cells(&self) -> usize {
        self.topology.len()
    }

    pub fn n_robots(&self) -> usize {
        self.registry.len()
    }

    pub fn n_free_robots(&self) -> usize {
        self.registry.n_free_robots()
    }

    pub fn topology(&self) -> &CellTopology {
        &self.topology
    }

    pub fn registry(&self) -> &RobotRegistry {
        &self.registry
    }

    pub fn formation(&self) -> &Formation {
        self.formation.formation()
    }

    pub fn formation_manager(&self) -> &FormationManager {
        &self.formation
    }

    /// Cells in topology order, head first
    pub fn cells(&self) -> Vec<&Cell> {
        self.topology
            .ordered()
            .into_iter()
            .filter_map(|id| self.topology.get(id))
            .collect()
    }

    /// Robots in id order
    pub fn robots(&self) -> impl Iterator<Item = &Robot> {
        self.registry.robots()
    }

    /// Cell at `position` counted from the head
    pub fn get_cell(&self, position: usize) -> Option<&Cell> {
        self.topology
            .cell_at(position)
            .and_then(|id| self.topology.get(id))
    }

    pub fn cell(&self, id: CellId) -> Option<&Cell> {
        self.topology.get(id)
    }

    pub fn get_robot(&self, id: RobotId) -> Option<&Robot> {
        self.registry.get_robot(id)
    }

    /// Insertion requests still waiting for a bidder
    pub fn pending_auctions(&self) -> Vec<CellId> {
        self.auctions.pending().copied().collect()
    }

    pub fn logs(&self) -> &RunLogs {
        &self.logs
    }

    pub fn message_log(&self) -> &[MessageRecord] {
        self.logs.messages()
    }

    pub fn error_log(&self) -> &[ErrorSample] {
        self.logs.errors()
    }

    pub fn distance_log(&self) -> &[DistanceSample] {
        self.logs.distances()
    }

    pub fn event_log(&self) -> &EventLog {
        &self.event_log
    }

    pub fn total_messages(&self) -> u64 {
        self.router.total_messages()
    }

    pub fn queued_messages(&self) -> usize {
        self.router.len()
    }

    pub fn dropped_packets(&self) -> u64 {
        self.dropped_packets
    }

    pub fn rng_state(&self) -> u64 {
        self.rng.get_state()
    }

    // ========================================================================
    // Event Logging
    // ========================================================================

    fn log_event(&mut self, event: Event) {
        self.event_log.log(event);
    }

    /// Queue a packet raised by the environment itself; drops it under
    /// backpressure
    fn post(&mut self, packet: Packet) {
        if self.router.send_packet(packet).is_err() {
            self.dropped_packets += 1;
        }
    }

    // ========================================================================
    // Geometry Queries
    // ========================================================================

    /// Displacement from robot `from` to robot `to`
    pub fn relationship(&self, to: RobotId, from: RobotId) -> Result<Relationship, SimulationError> {
        Ok(self.registry.relationship(to, from)?)
    }

    /// Distance from the formation origin to a robot
    pub fn distance_to(&self, id: RobotId) -> Option<f64> {
        self.registry.distance_to_robot(self.formation.origin(), id)
    }

    /// Bearing from the formation origin to a robot
    pub fn angle_to(&self, id: RobotId) -> Option<f64> {
        self.registry
            .get_robot(id)
            .map(|r| r.position().sub(self.formation.origin()).bearing())
    }

    pub fn distance_to_robot(&self, point: Vector, id: RobotId) -> Option<f64> {
        self.registry.distance_to_robot(point, id)
    }

    /// Nearest free robot to a cell's target
    pub fn get_nearest_robot(&self, cell: CellId) -> Option<RobotId> {
        let target = self.topology.get(cell)?.target();
        self.registry.nearest_free_robot(target.x, target.y)
    }

    /// Nearest free robot to a point
    pub fn get_nearest_robot_to(&self, x: f64, y: f64) -> Option<RobotId> {
        self.registry.nearest_free_robot(x, y)
    }

    /// Cell whose target is nearest `position`; ties go to the lowest id
    fn entry_cell(&self, position: Vector) -> Option<CellId> {
        let mut best: Option<(CellId, f64)> = None;
        for cell in self.topology.cells() {
            let distance = position.distance_to(cell.target());
            match best {
                Some((_, best_distance)) if !(distance < best_distance) => {}
                _ => best = Some((cell.id(), distance)),
            }
        }
        best.map(|(id, _)| id)
    }

    fn bid_context(&self, robot: &Robot, cell: CellId) -> Option<BidContext> {
        let target = self.topology.get(cell)?.target();
        let hops = self
            .entry_cell(robot.position())
            .and_then(|entry| self.topology.hops_between(entry, cell).ok())
            .unwrap_or(0);
        Some(BidContext {
            distance: robot.position().distance_to(target),
            hops,
        })
    }

    /// Insertion score of `robot` for `cell` under the configured policy
    fn insertion_score(&self, robot: RobotId, cell: CellId) -> f64 {
        self.registry
            .get_robot(robot)
            .and_then(|r| self.bid_context(r, cell))
            .map(|context| self.scorer.score(&context))
            .unwrap_or(0.0)
    }

    /// Push score: proximity only, whatever the insertion policy
    fn push_score(&self, robot: RobotId, target: Vector) -> Option<f64> {
        let distance = self.registry.distance_to_robot(target, robot)?;
        Some(NearestScorer.score(&BidContext { distance, hops: 0 }))
    }

    // ========================================================================
    // Topology Operations
    // ========================================================================

    /// Add a cell right of `anchor` (after the tail when absent)
    pub fn add_cell(&mut self, anchor: Option<CellId>) -> Result<CellId, SimulationError> {
        let anchor = anchor.or_else(|| self.topology.tail());
        let id = self.topology.add_cell(anchor)?;
        self.cell_created(Event::CellAdded {
            step: self.clock.current_step(),
            cell: id,
            anchor,
        });
        Ok(id)
    }

    /// Add a cell on either side of `anchor`
    pub fn add_cell_beside(
        &mut self,
        anchor: CellId,
        side: Direction,
    ) -> Result<CellId, SimulationError> {
        let id = self.topology.add_cell_beside(anchor, side)?;
        self.cell_created(Event::CellAdded {
            step: self.clock.current_step(),
            cell: id,
            anchor: Some(anchor),
        });
        Ok(id)
    }

    /// Splice a new cell between adjacent cells `a` and `b`
    pub fn insert_cell(&mut self, a: CellId, b: CellId) -> Result<CellId, SimulationError> {
        if self.topology.is_full() {
            return Err(TopologyError::CapacityExhausted {
                max: self.topology.max_cells().unwrap_or(0),
            }
            .into());
        }
        let cell = self.topology.new_cell();
        let id = self.topology.insert_cell(a, b, cell)?;
        self.cell_created(Event::CellInserted {
            step: self.clock.current_step(),
            cell: id,
            between: (a, b),
        });
        Ok(id)
    }

    fn cell_created(&mut self, event: Event) {
        if let Some(cell) = event.cell() {
            self.auctions.raise(cell);
        }
        self.log_event(event);
        self.formation.apply_targets(&mut self.topology);
    }

    /// Remove a cell; its occupant (if any) becomes free
    pub fn remove_cell(&mut self, cell: CellId) -> Result<Option<RobotId>, SimulationError> {
        let freed = self.topology.remove_cell(cell)?;
        if let Some(robot) = freed.and_then(|id| self.registry.get_robot_mut(id)) {
            robot.set_cell(None);
        }
        self.auctions.retain(|pending| pending != cell);
        self.log_event(Event::CellRemoved {
            step: self.clock.current_step(),
            cell,
            freed,
        });
        self.formation.apply_targets(&mut self.topology);
        Ok(freed)
    }

    /// Remove the most recently created cell
    pub fn remove_newest_cell(&mut self) -> Result<(CellId, Option<RobotId>), SimulationError> {
        let cell = self.topology.newest().ok_or(TopologyError::Empty)?;
        let freed = self.remove_cell(cell)?;
        Ok((cell, freed))
    }

    // ========================================================================
    // Registry Operations
    // ========================================================================

    /// Register a free robot
    pub fn add_robot(&mut self, x: f64, y: f64, z: f64, theta: f64) -> Result<RobotId, SimulationError> {
        if ![x, y, z, theta].iter().all(|v| v.is_finite()) {
            return Err(SimulationError::InvalidPose(format!(
                "({}, {}, {}, {})",
                x, y, z, theta
            )));
        }
        let id = self.registry.add_robot(x, y, z, theta);
        self.log_event(Event::RobotAdded {
            step: self.clock.current_step(),
            robot: id,
            x,
            y,
        });
        Ok(id)
    }

    /// Remove a robot, vacating its cell first
    pub fn remove_robot(&mut self, id: RobotId) -> Result<Robot, SimulationError> {
        let vacated = self
            .registry
            .get_robot(id)
            .ok_or(RegistryError::UnknownRobot(id))?
            .cell();

        if let Some(cell_id) = vacated {
            if let Some(cell) = self.topology.get_mut(cell_id) {
                if cell.occupant() == Some(id) {
                    cell.set_occupant(None);
                }
                self.auctions.raise(cell_id);
            }
        }

        let robot = self.registry.remove_robot(id)?;
        debug!(robot = %id, vacated = ?vacated, "robot removed");
        self.log_event(Event::RobotRemoved {
            step: self.clock.current_step(),
            robot: id,
            vacated,
        });
        Ok(robot)
    }

    // ========================================================================
    // Auction Settlement
    // ========================================================================

    fn check_assignment(&self, cell: CellId, robot: RobotId) -> Result<&Cell, AuctionError> {
        let target = self
            .topology
            .get(cell)
            .ok_or(AuctionError::UnknownCell(cell))?;
        let bidder = self
            .registry
            .get_robot(robot)
            .ok_or(AuctionError::UnknownRobot(robot))?;
        if target.occupant() == Some(robot) {
            return Err(AuctionError::AlreadyOccupant { cell, robot });
        }
        if let Some(assigned) = bidder.cell() {
            return Err(AuctionError::RobotNotFree {
                robot,
                cell: assigned,
            });
        }
        Ok(target)
    }

    /// Assign a free robot to an empty cell
    pub fn settle_insertion_auction(
        &mut self,
        cell: CellId,
        robot: RobotId,
    ) -> Result<(), SimulationError> {
        let target = self.check_assignment(cell, robot)?;
        if let Some(occupant) = target.occupant() {
            return Err(AuctionError::CellOccupied { cell, occupant }.into());
        }
        let score = self.insertion_score(robot, cell);
        self.assign_insertion(cell, robot, score);
        Ok(())
    }

    /// Hand an occupied cell to a free challenger; returns the displaced
    /// robot
    pub fn settle_push_auction(
        &mut self,
        cell: CellId,
        robot: RobotId,
    ) -> Result<RobotId, SimulationError> {
        let target = self.check_assignment(cell, robot)?;
        let occupant = target.occupant().ok_or(AuctionError::CellEmpty(cell))?;
        let score = self.push_score(robot, target.target()).unwrap_or(0.0);
        self.assign_push(cell, robot, occupant, score);
        Ok(occupant)
    }

    fn assign_insertion(&mut self, cell: CellId, robot: RobotId, score: f64) {
        let step = self.clock.current_step();
        if let Some(c) = self.topology.get_mut(cell) {
            c.set_occupant(Some(robot));
        }
        if let Some(r) = self.registry.get_robot_mut(robot) {
            r.set_cell(Some(cell));
        }
        self.auctions.retain(|pending| pending != cell);

        debug!(%cell, %robot, score, "insertion auction settled");
        self.post(Packet::new(
            Address::Environment,
            Address::Robot(robot),
            PacketKind::InsertionAssignment,
            Some(Payload::Assignment { cell }),
            step,
        ));
        self.log_event(Event::InsertionSettled {
            step,
            cell,
            winner: robot,
            score,
        });
    }

    fn assign_push(&mut self, cell: CellId, winner: RobotId, displaced: RobotId, score: f64) {
        let step = self.clock.current_step();
        if let Some(c) = self.topology.get_mut(cell) {
            c.set_occupant(Some(winner));
        }
        if let Some(r) = self.registry.get_robot_mut(displaced) {
            r.set_cell(None);
        }
        if let Some(r) = self.registry.get_robot_mut(winner) {
            r.set_cell(Some(cell));
        }

        debug!(%cell, %winner, %displaced, score, "push auction settled");
        self.post(Packet::new(
            Address::Environment,
            Address::Robot(winner),
            PacketKind::PushAssignment,
            Some(Payload::Assignment { cell }),
            step,
        ));
        self.post(Packet::new(
            Address::Environment,
            Address::Robot(displaced),
            PacketKind::Displaced,
            Some(Payload::Assignment { cell }),
            step,
        ));
        self.log_event(Event::PushSettled {
            step,
            cell,
            winner,
            displaced,
            score,
        });
    }

    /// Submit sealed bids, recording each accepted bid as a packet
    fn run_auction(&mut self, kind: AuctionKind, cell: CellId, bids: Vec<Bid>) -> Option<Bid> {
        let step = self.clock.current_step();
        let mut auction = Auction::open(kind, cell);

        for bid in bids {
            match auction.submit(bid) {
                Ok(()) => self.post(Packet::new(
                    Address::Robot(bid.bidder),
                    Address::Environment,
                    PacketKind::AuctionBid,
                    Some(Payload::Bid {
                        cell,
                        score: bid.score,
                    }),
                    step,
                )),
                Err(e) => warn!(error = %e, "bid rejected"),
            }
        }

        auction.settle().ok()
    }

    /// One insertion auction among the free robots
    fn run_insertion_auction(&mut self, cell: CellId) -> Option<Bid> {
        let bids: Vec<Bid> = self
            .registry
            .free_robots()
            .into_iter()
            .filter_map(|id| {
                let robot = self.registry.get_robot(id)?;
                let context = self.bid_context(robot, cell)?;
                Some(Bid::new(id, self.scorer.score(&context)))
            })
            .collect();

        if bids.is_empty() {
            return None;
        }
        self.run_auction(AuctionKind::Insertion, cell, bids)
    }

    /// Offer every empty cell to the free robots, oldest request first
    fn run_insertion_auctions(&mut self) -> usize {
        for cell in self.topology.empty_cells() {
            self.auctions.raise(cell);
        }

        let mut settled = 0;
        let mut deferred = Vec::new();

        for cell in self.auctions.take_pending() {
            match self.topology.get(cell) {
                Some(c) if !c.is_occupied() => {}
                _ => continue,
            }
            match self.run_insertion_auction(cell) {
                Some(winner) => {
                    self.assign_insertion(cell, winner.bidder, winner.score);
                    settled += 1;
                }
                None => deferred.push(cell),
            }
        }

        for cell in deferred {
            self.auctions.raise(cell);
        }
        settled
    }

    /// Re-offer occupied cells that a free robot is clearly closer to
    fn run_push_auctions(&mut self) -> usize {
        let mut settled = 0;
        let mut displaced_this_tick = BTreeSet::new();

        for cell_id in self.topology.occupied_cells() {
            let challengers: Vec<RobotId> = self
                .registry
                .free_robots()
                .into_iter()
                .filter(|id| !displaced_this_tick.contains(id))
                .collect();
            if challengers.is_empty() {
                break;
            }

            let Some(cell) = self.topology.get(cell_id) else {
                continue;
            };
            let Some(occupant) = cell.occupant() else {
                continue;
            };
            let target = cell.target();
            let Some(occupant_distance) = self.registry.distance_to_robot(target, occupant) else {
                continue;
            };

            let contested = challengers.iter().any(|id| {
                self.registry
                    .distance_to_robot(target, *id)
                    .map_or(false, |d| d + self.config.push_margin < occupant_distance)
            });
            if !contested {
                continue;
            }

            let bids: Vec<Bid> = std::iter::once(occupant)
                .chain(challengers)
                .filter_map(|id| self.push_score(id, target).map(|score| Bid::new(id, score)))
                .collect();

            if let Some(winner) = self.run_auction(AuctionKind::Push, cell_id, bids) {
                if winner.bidder != occupant {
                    self.assign_push(cell_id, winner.bidder, occupant, winner.score);
                    displaced_this_tick.insert(occupant);
                    settled += 1;
                }
            }
        }

        settled
    }

    // ========================================================================
    // Formation Operations
    // ========================================================================

    /// Recompute every cell target and raise insertion auctions for all
    /// empty cells
    pub fn form_up(&mut self) {
        self.formation.apply_targets(&mut self.topology);
        for cell in self.topology.empty_cells() {
            self.auctions.raise(cell);
        }
    }

    /// Validate and install a new formation at the current origin
    pub fn change_formation(&mut self, formation: Formation) -> Result<(), SimulationError> {
        let origin = self.formation.origin();
        self.install_formation(formation, origin)
    }

    /// Anchor a copy of the active formation at `(x, y)`
    ///
    /// An empty topology is seeded with one cell, won by the free robot
    /// nearest the click. Returns the new formation id.
    pub fn form_from_click(&mut self, x: f64, y: f64) -> Result<u32, SimulationError> {
        let formation = self.formation.click_formation();
        let id = formation.id();
        self.install_formation(formation, Vector::new(x, y))?;

        if self.topology.is_empty() {
            if let Some(seed) = self.registry.nearest_free_robot(x, y) {
                let cell = self.add_cell(None)?;
                let score = self.insertion_score(seed, cell);
                self.assign_insertion(cell, seed, score);
            }
        }
        Ok(id)
    }

    fn install_formation(&mut self, formation: Formation, origin: Vector) -> Result<(), SimulationError> {
        self.formation.change_formation_at(formation, origin)?;

        let active = self.formation.formation().clone();
        let step = self.clock.current_step();
        self.topology.set_closure(active.closure());
        self.convergence.reset();

        info!(
            formation_id = active.id(),
            closure = ?active.closure(),
            "formation changed"
        );
        self.log_event(Event::FormationChanged {
            step,
            formation_id: active.id(),
        });
        self.post(Packet::new(
            Address::Environment,
            Address::Broadcast,
            PacketKind::ChangeFormation,
            Some(Payload::Formation(active)),
            step,
        ));

        self.form_up();
        Ok(())
    }

    // ========================================================================
    // Messaging
    // ========================================================================

    /// Queue a packet stamped with the current step
    pub fn send_msg(
        &mut self,
        payload: Option<Payload>,
        to: Address,
        from: Address,
        kind: PacketKind,
    ) -> Result<(), SimulationError> {
        let step = self.clock.current_step();
        Ok(self.router.send_msg(payload, to, from, kind, step)?)
    }

    pub fn send_packet(&mut self, packet: Packet) -> Result<(), SimulationError> {
        Ok(self.router.send_packet(packet)?)
    }

    /// Push a packet to the outbox for a parent environment
    pub fn forward_packet(&mut self, packet: Packet) -> Result<(), SimulationError> {
        Ok(self.router.forward_packet(packet)?)
    }

    /// Move queued packets for robots not registered here to the outbox
    pub fn forward_packets(&mut self) -> usize {
        let registry = &self.registry;
        self.router.forward_packets(|id| registry.contains(id))
    }

    pub fn take_forwarded(&mut self) -> Vec<Packet> {
        self.router.take_forwarded()
    }

    /// Queue packets forwarded from another environment
    pub fn accept(&mut self, packets: Vec<Packet>) -> Result<usize, SimulationError> {
        Ok(self.router.accept(packets)?)
    }

    /// Deliver up to `barrier` packets
    fn deliver(&mut self, barrier: usize, step: usize) -> usize {
        let mut delivered = 0;

        for _ in 0..barrier {
            let Some(packet) = self.router.dequeue(step, &mut self.logs) else {
                break;
            };
            delivered += 1;

            match packet.to() {
                Address::Robot(id) if self.registry.contains(id) => self.deliver_to(id, &packet),
                Address::Robot(id) => {
                    debug!(robot = %id, "forwarding packet for unknown robot");
                    if let Err(e) = self.router.forward_packet(packet) {
                        warn!(error = %e, "forwarded packet dropped");
                    }
                }
                Address::Broadcast => {
                    let recipients: Vec<RobotId> = self.registry.robots().map(|r| r.id()).collect();
                    for id in recipients {
                        self.deliver_to(id, &packet);
                    }
                }
                Address::Environment => {}
            }
        }

        delivered
    }

    fn deliver_to(&mut self, id: RobotId, packet: &Packet) {
        let Some(robot) = self.registry.get_robot_mut(id) else {
            return;
        };

        match (packet.kind(), packet.payload()) {
            (PacketKind::Heartbeat, Some(Payload::Pose(pose))) => {
                if let Some(from) = packet.from().robot() {
                    robot.hear_heartbeat(from, *pose);
                }
            }
            (
                PacketKind::InsertionAssignment | PacketKind::PushAssignment,
                Some(Payload::Assignment { cell }),
            ) => robot.acknowledge_assignment(*cell),
            (PacketKind::Displaced, _) => robot.acknowledge_displacement(),
            (PacketKind::ChangeFormation, Some(Payload::Formation(formation))) => {
                robot.hear_formation(formation.id())
            }
            _ => {}
        }
    }

    /// Heartbeats from each occupied cell's robot to its neighbors' robots
    fn queue_heartbeats(&mut self, step: usize) -> usize {
        let mut packets = Vec::new();

        for cell_id in self.topology.occupied_cells() {
            let Some(cell) = self.topology.get(cell_id) else {
                continue;
            };
            let Some(from) = cell.occupant() else {
                continue;
            };
            let Some(pose) = self.registry.get_robot(from).map(|r| r.pose()) else {
                continue;
            };

            let mut recipients = Vec::with_capacity(2);
            for neighbor in [cell.left(), cell.right()].into_iter().flatten() {
                let to = self.topology.get(neighbor).and_then(|c| c.occupant());
                if let Some(to) = to {
                    if to != from && !recipients.contains(&to) {
                        recipients.push(to);
                    }
                }
            }

            for to in recipients {
                packets.push(Packet::heartbeat(from, to, pose, step));
            }
        }

        let count = packets.len();
        for packet in packets {
            self.post(packet);
        }
        count
    }

    // ========================================================================
    // Tick Loop Implementation
    // ========================================================================

    /// Execute one simulation tick
    ///
    /// Once the step horizon is reached this is a no-op reporting
    /// `active == false`.
    pub fn tick(&mut self) -> StepResult {
        let step = self.clock.current_step();

        if self.clock.is_exhausted() {
            return StepResult {
                step,
                active: false,
                quiescent: self.quiescence(),
                error: self.last_error,
                scenario_events: 0,
                cells_added: 0,
                settled_insertions: 0,
                settled_pushes: 0,
                delivered: 0,
                heartbeats: 0,
                excised: 0,
            };
        }

        // STEP 1: SCENARIO EVENTS
        let scenario_events = self.run_scenario_events(step);

        // STEP 2: DELIVERY BARRIER
        // Packets raised from here on wait for the next tick
        let barrier = self.router.len();

        // STEP 3: GROWTH AND TARGETS
        self.formation.apply_targets(&mut self.topology);
        let cells_added = self.grow();

        // STEP 4: AUCTIONS
        let settled_insertions = self.run_insertion_auctions();
        let settled_pushes = self.run_push_auctions();

        // STEP 5: DELIVERY
        let delivered = self.deliver(barrier, step);

        // STEP 6: HEARTBEATS
        let heartbeats = self.queue_heartbeats(step);

        // STEP 7: MOTION
        let step_distance = self.move_robots();

        // STEP 8: CONVERGENCE AND LOGS
        let error = self.aggregate_error();
        let was_quiescent = self.convergence.quiescence();
        let quiescent = self.convergence.observe(error);
        if quiescent && !was_quiescent {
            info!(step, error, "formation quiescent");
            self.log_event(Event::Quiescent { step, error });
        }
        self.logs.record_error(ErrorSample {
            step,
            error,
            q_count: self.convergence.q_count(),
        });
        let per_robot: Vec<(RobotId, f64)> = self
            .registry
            .robots()
            .map(|r| (r.id(), r.distance_traveled()))
            .collect();
        self.logs.record_distance(DistanceSample {
            step,
            total_distance: per_robot.iter().map(|(_, d)| d).sum(),
            step_distance,
            per_robot,
        });
        self.last_error = error;

        // STEP 9: INVARIANT SWEEP
        let excised = self.sweep_invariants(step);

        // STEP 10: ADVANCE TIME
        self.clock.advance_step();

        StepResult {
            step,
            active: !quiescent && !self.clock.is_exhausted(),
            quiescent,
            error,
            scenario_events,
            cells_added,
            settled_insertions,
            settled_pushes,
            delivered,
            heartbeats,
            excised,
        }
    }

    /// Run one tick; false once quiescent or out of steps
    pub fn step(&mut self) -> bool {
        self.tick().active
    }

    /// Reset to an empty environment at step 0
    ///
    /// Cells, robots, queued packets, pending auctions and logs are dropped;
    /// the formation, RNG and id counters are kept.
    pub fn clear(&mut self) {
        self.topology.clear();
        self.registry.clear();
        self.router.clear();
        self.auctions.clear();
        self.convergence.reset();
        self.logs.clear();
        self.event_log.clear();
        self.clock.reset();
        self.last_error = 0.0;
        self.dropped_packets = 0;
        info!("environment cleared");
    }

    fn run_scenario_events(&mut self, step: usize) -> usize {
        let events: Vec<ScenarioEvent> = self
            .scenario
            .events_for_step(step)
            .into_iter()
            .cloned()
            .collect();

        let mut executed = 0;
        for event in events {
            match event.execute(self) {
                Ok(()) => executed += 1,
                Err(e) => {
                    let description = event.describe();
                    warn!(step, event = %description, error = %e, "scenario event failed");
                    self.log_event(Event::ScenarioEventFailed {
                        step,
                        description,
                        reason: e.to_string(),
                    });
                }
            }
        }
        executed
    }

    /// Add cells while free robots outnumber empty cells
    fn grow(&mut self) -> usize {
        if !self.config.auto_grow {
            return 0;
        }

        let empty = self.topology.empty_cells().len();
        let waiting: Vec<RobotId> = self.registry.free_robots().into_iter().skip(empty).collect();

        let mut added = 0;
        for robot in waiting {
            if self.topology.is_full() {
                break;
            }
            let Some(position) = self.registry.get_robot(robot).map(|r| r.position()) else {
                continue;
            };
            match self.add_cell_near(position) {
                Ok(_) => added += 1,
                Err(e) => {
                    debug!(error = %e, "topology growth stopped");
                    break;
                }
            }
        }
        added
    }

    /// Place a new cell for a robot at `position`
    fn add_cell_near(&mut self, position: Vector) -> Result<CellId, SimulationError> {
        let (Some(head), Some(tail)) = (self.topology.head(), self.topology.tail()) else {
            return self.add_cell(None);
        };

        let distance = |topology: &CellTopology, id: CellId| {
            topology
                .get(id)
                .map_or(f64::INFINITY, |c| position.distance_to(c.target()))
        };

        if self.config.use_insertion {
            let nearest = self.entry_cell(position).ok_or(TopologyError::Empty)?;
            let neighbors = self
                .topology
                .get(nearest)
                .map(|c| [c.left(), c.right()])
                .unwrap_or([None, None]);

            let mut partner: Option<(CellId, f64)> = None;
            for neighbor in neighbors.into_iter().flatten().filter(|n| *n != nearest) {
                let d = distance(&self.topology, neighbor);
                match partner {
                    Some((_, best)) if !(d < best) => {}
                    _ => partner = Some((neighbor, d)),
                }
            }

            return match partner {
                Some((neighbor, _)) => self.insert_cell(nearest, neighbor),
                None => self.add_cell_beside(nearest, Direction::Right),
            };
        }

        if distance(&self.topology, head) <= distance(&self.topology, tail) && head != tail {
            self.add_cell_beside(head, Direction::Left)
        } else {
            self.add_cell_beside(tail, Direction::Right)
        }
    }

    /// Move every assigned robot toward its cell target
    fn move_robots(&mut self) -> f64 {
        let assignments: Vec<(RobotId, Vector)> = self
            .topology
            .cells()
            .filter_map(|c| Some((c.occupant()?, c.target())))
            .filter(|(_, target)| target.is_finite())
            .collect();

        let max_speed = self.config.max_speed;
        let mut step_distance = 0.0;
        for (robot, target) in assignments {
            if let Some(r) = self.registry.get_robot_mut(robot) {
                step_distance += r.move_toward(target, max_speed);
            }
        }
        step_distance
    }

    /// Sum over occupied cells of |robot - target|
    fn aggregate_error(&self) -> f64 {
        self.topology
            .cells()
            .filter_map(|c| {
                let occupant = c.occupant()?;
                self.registry.distance_to_robot(c.target(), occupant)
            })
            .sum()
    }

    /// Excise corrupted cells and free robots with dangling assignments
    fn sweep_invariants(&mut self, step: usize) -> usize {
        let mut excised = 0;

        for _ in 0..=self.topology.len() {
            let Some(violation) = self.topology.verify().into_iter().next() else {
                break;
            };
            self.excise(violation.cell(), violation.to_string(), step);
            excised += 1;
        }

        let mismatched: Vec<(CellId, String)> = self
            .topology
            .cells()
            .filter_map(|cell| {
                let occupant = cell.occupant()?;
                match self.registry.get_robot(occupant) {
                    None => Some((cell.id(), format!("occupant {} is not registered", occupant))),
                    Some(robot) if robot.cell() != Some(cell.id()) => Some((
                        cell.id(),
                        format!("occupant {} is assigned to {:?}", occupant, robot.cell()),
                    )),
                    Some(_) => None,
                }
            })
            .collect();
        for (cell, reason) in mismatched {
            self.excise(cell, reason, step);
            excised += 1;
        }

        let orphans: Vec<RobotId> = self
            .registry
            .robots()
            .filter(|robot| match robot.cell() {
                Some(cell) => {
                    self.topology.get(cell).and_then(|c| c.occupant()) != Some(robot.id())
                }
                None => false,
            })
            .map(|robot| robot.id())
            .collect();
        for id in orphans {
            error!(robot = %id, "robot assigned to a cell that does not hold it");
            if let Some(robot) = self.registry.get_robot_mut(id) {
                robot.set_cell(None);
            }
        }

        if excised > 0 {
            self.formation.apply_targets(&mut self.topology);
        }
        excised
    }

    fn excise(&mut self, cell: CellId, reason: String, step: usize) {
        error!(%cell, %reason, "excising corrupted cell");
        if let Some(occupant) = self.topology.excise(cell) {
            if let Some(robot) = self.registry.get_robot_mut(occupant) {
                if robot.cell() == Some(cell) {
                    robot.set_cell(None);
                }
            }
        }
        self.auctions.retain(|pending| pending != cell);
        self.log_event(Event::CellExcised { step, cell, reason });
    }

    // ========================================================================
    // Checkpoint Support
    // ========================================================================

    pub(crate) fn parts(
        &self,
    ) -> (
        &CellTopology,
        &RobotRegistry,
        &MessageRouter,
        &AuctionBook,
        &FormationManager,
    ) {
        (
            &self.topology,
            &self.registry,
            &self.router,
            &self.auctions,
            &self.formation,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn restore_parts(
        &mut self,
        topology: CellTopology,
        registry: RobotRegistry,
        router: MessageRouter,
        auctions: AuctionBook,
        q_count: usize,
        clock: StepClock,
        rng: RngManager,
        logs: RunLogs,
        event_log: EventLog,
        last_error: f64,
        dropped_packets: u64,
    ) {
        self.topology = topology;
        self.registry = registry;
        self.router = router;
        self.auctions = auctions;
        self.convergence = ConvergenceDetector::with_count(self.config.max_trans_error, q_count);
        self.clock = clock;
        self.rng = rng;
        self.logs = logs;
        self.event_log = event_log;
        self.last_error = last_error;
        self.dropped_packets = dropped_packets;
    }

    #[cfg(test)]
    pub(crate) fn topology_mut(&mut self) -> &mut CellTopology {
        &mut self.topology
    }

    #[cfg(test)]
    pub(crate) fn registry_mut(&mut self) -> &mut RobotRegistry {
        &mut self.registry
    }
}
