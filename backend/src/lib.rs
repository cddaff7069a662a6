//! Formation Simulator Core - Rust Engine
//!
//! Cell-based robot formation simulator with deterministic execution.
//!
//! # Architecture
//!
//! - **core**: Step clock
//! - **models**: Domain types (Cell, Robot, Formation, Packet, logs)
//! - **topology**: Doubly linked cell arena and its invariants
//! - **registry**: Robot arena and proximity queries
//! - **auction**: Sealed-bid insertion and push auctions
//! - **router**: Bounded packet queue with a delivery barrier
//! - **formation**: Target computation for the active formation
//! - **convergence**: Quiescence detection
//! - **environment**: Tick loop, checkpoints, capability traits
//! - **events**: Scheduled scenario events
//! - **export**: JSON Lines run exports
//! - **rng**: Deterministic random number generation
//!
//! # Critical Invariants
//!
//! 1. Neighbor links are always mutual
//! 2. A robot occupies at most one cell and a cell holds at most one robot
//! 3. All randomness is deterministic (seeded RNG)
//! 4. Iteration order never depends on hashing

// Module declarations
pub mod auction;
pub mod convergence;
pub mod core;
pub mod environment;
pub mod events;
pub mod export;
pub mod formation;
pub mod models;
pub mod registry;
pub mod rng;
pub mod router;
pub mod topology;

// Re-exports for convenience
pub use auction::{AuctionError, AuctionPolicy, Bid, BidScorer};
pub use convergence::ConvergenceDetector;
pub use core::time::StepClock;
pub use environment::{
    Canvas, Environment, EnvironmentConfig, Frame, RecordingEnvironment, Renderable, RobotSpawn,
    ScatterConfig, SimulationError, StateSnapshot, Steppable, StepResult,
};
pub use events::{EventSchedule, ScenarioEvent, ScheduledEvent};
pub use export::ExportError;
pub use formation::FormationManager;
pub use models::{
    cell::{Cell, Direction},
    event::{Event, EventLog},
    formation::{Closure, Formation, FormationError, FormationShape},
    geometry::{Pose, Relationship, Vector},
    ids::{Address, CellId, RobotId},
    packet::{Packet, PacketKind, Payload},
    robot::Robot,
};
pub use registry::{RegistryError, RobotRegistry};
pub use rng::RngManager;
pub use router::{MessageRouter, RouterError};
pub use topology::{CellTopology, TopologyError, TopologyViolation};
