//! Packets routed through the environment's message queue.
//!
//! A packet is created when a robot or the environment needs to communicate,
//! enqueued once, delivered (and logged) exactly once, and never mutated in
//! between. Auction results share the queue with general traffic but carry
//! their own kinds so they can be told apart.

use crate::models::formation::Formation;
use crate::models::geometry::Pose;
use crate::models::ids::{Address, CellId, RobotId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Packet type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PacketKind {
    /// Periodic pose exchange between neighboring robots
    Heartbeat,
    /// A new formation was installed
    ChangeFormation,
    /// A sealed bid submitted to an auction
    AuctionBid,
    /// Winner of an insertion auction
    InsertionAssignment,
    /// Winner of a push auction
    PushAssignment,
    /// Previous occupant of a pushed cell
    Displaced,
}

impl PacketKind {
    /// True for packets that carry an auction outcome
    pub fn is_auction_result(&self) -> bool {
        matches!(
            self,
            PacketKind::InsertionAssignment | PacketKind::PushAssignment | PacketKind::Displaced
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PacketKind::Heartbeat => "heartbeat",
            PacketKind::ChangeFormation => "change_formation",
            PacketKind::AuctionBid => "auction_bid",
            PacketKind::InsertionAssignment => "insertion_assignment",
            PacketKind::PushAssignment => "push_assignment",
            PacketKind::Displaced => "displaced",
        }
    }
}

impl fmt::Display for PacketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optional packet body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    Pose(Pose),
    Bid { cell: CellId, score: f64 },
    Assignment { cell: CellId },
    Formation(Formation),
    Text { body: String },
}

/// An addressed unit of communication
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    from: Address,
    to: Address,
    kind: PacketKind,
    payload: Option<Payload>,
    /// Step in which the packet was raised
    step: usize,
}

impl Packet {
    pub fn new(
        from: Address,
        to: Address,
        kind: PacketKind,
        payload: Option<Payload>,
        step: usize,
    ) -> Self {
        Self {
            from,
            to,
            kind,
            payload,
            step,
        }
    }

    /// Heartbeat from one robot to another carrying the sender's pose
    pub fn heartbeat(from: RobotId, to: RobotId, pose: Pose, step: usize) -> Self {
        Self::new(
            Address::Robot(from),
            Address::Robot(to),
            PacketKind::Heartbeat,
            Some(Payload::Pose(pose)),
            step,
        )
    }

    pub fn from(&self) -> Address {
        self.from
    }

    pub fn to(&self) -> Address {
        self.to
    }

    pub fn kind(&self) -> PacketKind {
        self.kind
    }

    pub fn payload(&self) -> Option<&Payload> {
        self.payload.as_ref()
    }

    pub fn step(&self) -> usize {
        self.step
    }

    pub fn is_broadcast(&self) -> bool {
        self.to == Address::Broadcast
    }
}
