//! Bid scoring policies
//!
//! A [`BidScorer`] turns what a robot knows about a contested cell into a
//! sealed-bid score. Higher scores win, so every built-in scorer returns a
//! negated cost.
//!
//! Scorers are selected through [`AuctionPolicy`], which is part of the
//! environment configuration:
//!
//! ```rust
//! use formation_simulator_core_rs::auction::{AuctionPolicy, BidContext};
//!
//! let policy = AuctionPolicy::Weighted {
//!     distance_weight: 1.0,
//!     hop_weight: 0.5,
//! };
//! let scorer = policy.build();
//!
//! let score = scorer.score(&BidContext { distance: 2.0, hops: 2 });
//! assert_eq!(score, -3.0);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// What a bidder knows about the cell it is bidding on
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BidContext {
    /// Euclidean distance from the bidder to the cell's target
    pub distance: f64,
    /// Topological hops from the bidder's entry cell to the contested cell
    pub hops: usize,
}

/// Scoring rule for sealed bids
pub trait BidScorer: Debug + Send + Sync {
    /// Score a bid; higher wins
    fn score(&self, context: &BidContext) -> f64;

    /// Short policy name for logs
    fn name(&self) -> &'static str;
}

/// Linear combination of distance and hop count
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightedScorer {
    pub distance_weight: f64,
    pub hop_weight: f64,
}

impl BidScorer for WeightedScorer {
    fn score(&self, context: &BidContext) -> f64 {
        -(self.distance_weight * context.distance + self.hop_weight * context.hops as f64)
    }

    fn name(&self) -> &'static str {
        "weighted"
    }
}

/// Pure proximity
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NearestScorer;

impl BidScorer for NearestScorer {
    fn score(&self, context: &BidContext) -> f64 {
        -context.distance
    }

    fn name(&self) -> &'static str {
        "nearest"
    }
}

/// Auction scoring configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuctionPolicy {
    Weighted { distance_weight: f64, hop_weight: f64 },
    Nearest,
}

impl Default for AuctionPolicy {
    fn default() -> Self {
        AuctionPolicy::Weighted {
            distance_weight: 1.0,
            hop_weight: 0.25,
        }
    }
}

impl AuctionPolicy {
    /// Reject weights that would make scores meaningless
    pub fn validate(&self) -> Result<(), String> {
        match self {
            AuctionPolicy::Weighted {
                distance_weight,
                hop_weight,
            } => {
                for (name, weight) in [("distance_weight", distance_weight), ("hop_weight", hop_weight)] {
                    if !weight.is_finite() || *weight < 0.0 {
                        return Err(format!(
                            "{} must be finite and >= 0 (got {})",
                            name, weight
                        ));
                    }
                }
                Ok(())
            }
            AuctionPolicy::Nearest => Ok(()),
        }
    }

    /// Instantiate the scorer this policy describes
    pub fn build(&self) -> Box<dyn BidScorer> {
        match *self {
            AuctionPolicy::Weighted {
                distance_weight,
                hop_weight,
            } => Box::new(WeightedScorer {
                distance_weight,
                hop_weight,
            }),
            AuctionPolicy::Nearest => Box::new(NearestScorer),
        }
    }
}
