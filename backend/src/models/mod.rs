//! Domain models for the formation simulator

pub mod cell;
pub mod event;
pub mod formation;
pub mod geometry;
pub mod ids;
pub mod log;
pub mod packet;
pub mod robot;

// Re-exports
pub use cell::{Cell, Direction};
pub use event::{Event, EventLog};
pub use formation::{Closure, Formation, FormationError, FormationShape};
pub use geometry::{Pose, Relationship, Vector};
pub use ids::{Address, CellId, RobotId};
pub use log::{DistanceSample, ErrorSample, MessageRecord, RunLogs};
pub use packet::{Packet, PacketKind, Payload};
pub use robot::Robot;
