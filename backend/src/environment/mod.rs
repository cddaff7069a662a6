//! Environment - the coordination core and its tick loop
//!
//! See `engine.rs` for the tick loop, `checkpoint.rs` for save/restore and
//! `capability.rs` for the steppable/renderable capability traits.

pub mod capability;
pub mod checkpoint;
pub mod engine;

#[cfg(test)]
mod tests;

// Re-export main types for convenience
pub use capability::{
    Canvas, Frame, FrameCell, FrameRobot, RecordingEnvironment, Renderable, Steppable,
};
pub use checkpoint::{compute_config_hash, CellSnapshot, RobotSnapshot, StateSnapshot};
pub use engine::{
    Environment, EnvironmentConfig, RobotSpawn, ScatterConfig, SimulationError, StepResult,
};
