//! Per-step run logs used for post-hoc analysis.
//!
//! - [`MessageRecord`]: one entry per delivered packet (one per broadcast,
//!   not per recipient)
//! - [`ErrorSample`]: aggregate positional error and the quiescence streak
//! - [`DistanceSample`]: aggregate distance traveled by all robots
//!
//! All three are append-only and monotonic in step number.

use crate::models::ids::{Address, RobotId};
use crate::models::packet::PacketKind;
use serde::{Deserialize, Serialize};

/// One delivered packet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub step: usize,
    pub from: Address,
    pub to: Address,
    pub kind: PacketKind,
}

/// Aggregate positional error at the end of a step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorSample {
    pub step: usize,
    pub error: f64,
    pub q_count: usize,
}

/// Aggregate distance traveled at the end of a step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistanceSample {
    pub step: usize,
    pub total_distance: f64,
    /// Distance covered during this step alone
    pub step_distance: f64,
    /// Cumulative distance per robot, in id order
    pub per_robot: Vec<(RobotId, f64)>,
}

/// The three run logs, owned by the environment
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunLogs {
    messages: Vec<MessageRecord>,
    errors: Vec<ErrorSample>,
    distances: Vec<DistanceSample>,
}

impl RunLogs {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_message(&mut self, record: MessageRecord) {
        debug_assert!(self
            .messages
            .last()
            .map_or(true, |last| last.step <= record.step));
        self.messages.push(record);
    }

    pub(crate) fn record_error(&mut self, sample: ErrorSample) {
        self.errors.push(sample);
    }

    pub(crate) fn record_distance(&mut self, sample: DistanceSample) {
        self.distances.push(sample);
    }

    pub fn messages(&self) -> &[MessageRecord] {
        &self.messages
    }

    pub fn errors(&self) -> &[ErrorSample] {
        &self.errors
    }

    pub fn distances(&self) -> &[DistanceSample] {
        &self.distances
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.errors.clear();
        self.distances.clear();
    }
}
