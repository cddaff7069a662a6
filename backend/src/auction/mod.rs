//! Auction Protocol
//!
//! Single-round sealed-bid auctions resolving contention for cells.
//!
//! # Rules
//!
//! - Highest score wins
//! - Equal scores go to the lowest bidder id
//! - Non-finite scores are rejected at submission
//! - An auction settles once; afterwards it accepts no bids
//!
//! Winner selection depends only on the set of `(bidder, score)` pairs, never
//! on submission order, so settling the same bids twice yields the same
//! winner.
//!
//! # Kinds
//!
//! - **Insertion**: an empty cell is offered to the free robots
//! - **Push**: an occupied cell is re-offered to its occupant and the free
//!   robots; a challenger that outbids the occupant displaces it
//!
//! Pending insertion requests wait in an [`AuctionBook`] until at least one
//! bidder is available.

mod scoring;

pub use scoring::{AuctionPolicy, BidContext, BidScorer, NearestScorer, WeightedScorer};

use crate::models::{CellId, RobotId};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum AuctionError {
    #[error("Bid from {bidder} has non-finite score {score}")]
    NonFiniteScore { bidder: RobotId, score: f64 },

    #[error("Auction for {0} is already settled")]
    AlreadySettled(CellId),

    #[error("Auction for {0} has no bids")]
    NoBids(CellId),

    #[error("Unknown cell: {0}")]
    UnknownCell(CellId),

    #[error("Unknown robot: {0}")]
    UnknownRobot(RobotId),

    #[error("{cell} is already occupied by {occupant}")]
    CellOccupied { cell: CellId, occupant: RobotId },

    #[error("{0} has no occupant to push")]
    CellEmpty(CellId),

    #[error("{robot} already occupies {cell}")]
    AlreadyOccupant { cell: CellId, robot: RobotId },

    #[error("{robot} is assigned to {cell}")]
    RobotNotFree { robot: RobotId, cell: CellId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuctionKind {
    Insertion,
    Push,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuctionStatus {
    Open,
    Settled,
}

/// A sealed bid
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bid {
    pub bidder: RobotId,
    pub score: f64,
}

impl Bid {
    pub fn new(bidder: RobotId, score: f64) -> Self {
        Self { bidder, score }
    }

    /// Whether this bid beats `other` (higher score, then lower id)
    pub fn beats(&self, other: &Bid) -> bool {
        self.score > other.score || (self.score == other.score && self.bidder < other.bidder)
    }
}

/// One auction for one cell
///
/// # Example
/// ```
/// use formation_simulator_core_rs::auction::{Auction, AuctionKind, Bid};
/// use formation_simulator_core_rs::models::{CellId, RobotId};
///
/// let mut auction = Auction::open(AuctionKind::Insertion, CellId(0));
/// auction.submit(Bid::new(RobotId(4), -1.0)).unwrap();
/// auction.submit(Bid::new(RobotId(2), -5.0)).unwrap();
///
/// let winner = auction.settle().unwrap();
/// assert_eq!(winner.bidder, RobotId(4));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Auction {
    kind: AuctionKind,
    cell: CellId,
    best: Option<Bid>,
    bids: usize,
    status: AuctionStatus,
}

impl Auction {
    pub fn open(kind: AuctionKind, cell: CellId) -> Self {
        Self {
            kind,
            cell,
            best: None,
            bids: 0,
            status: AuctionStatus::Open,
        }
    }

    pub fn kind(&self) -> AuctionKind {
        self.kind
    }

    pub fn cell(&self) -> CellId {
        self.cell
    }

    pub fn status(&self) -> AuctionStatus {
        self.status
    }

    pub fn best_bid(&self) -> Option<Bid> {
        self.best
    }

    /// Number of accepted bids
    pub fn bid_count(&self) -> usize {
        self.bids
    }

    /// Submit a sealed bid
    pub fn submit(&mut self, bid: Bid) -> Result<(), AuctionError> {
        if self.status == AuctionStatus::Settled {
            return Err(AuctionError::AlreadySettled(self.cell));
        }
        if !bid.score.is_finite() {
            return Err(AuctionError::NonFiniteScore {
                bidder: bid.bidder,
                score: bid.score,
            });
        }

        self.bids += 1;
        match self.best {
            Some(best) if !bid.beats(&best) => {}
            _ => self.best = Some(bid),
        }
        Ok(())
    }

    /// Close the auction and return the winning bid
    pub fn settle(&mut self) -> Result<Bid, AuctionError> {
        if self.status == AuctionStatus::Settled {
            return Err(AuctionError::AlreadySettled(self.cell));
        }
        let winner = self.best.ok_or(AuctionError::NoBids(self.cell))?;
        self.status = AuctionStatus::Settled;
        Ok(winner)
    }
}

/// Pending insertion requests, in the order they were raised
///
/// A cell appears at most once.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuctionBook {
    pending: VecDeque<CellId>,
}

impl AuctionBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an insertion request; returns false if already queued
    pub fn raise(&mut self, cell: CellId) -> bool {
        if self.pending.contains(&cell) {
            return false;
        }
        self.pending.push_back(cell);
        true
    }

    pub fn pending(&self) -> impl Iterator<Item = &CellId> {
        self.pending.iter()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Drain every pending request, oldest first
    pub fn take_pending(&mut self) -> Vec<CellId> {
        self.pending.drain(..).collect()
    }

    /// Drop requests for which `keep` is false
    pub fn retain(&mut self, mut keep: impl FnMut(CellId) -> bool) {
        self.pending.retain(|cell| keep(*cell));
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

impl FromIterator<CellId> for AuctionBook {
    fn from_iter<I: IntoIterator<Item = CellId>>(iter: I) -> Self {
        let mut book = AuctionBook::new();
        for cell in iter {
            book.raise(cell);
        }
        book
    }
}
