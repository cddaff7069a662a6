//! Convergence Detector
//!
//! Debounced quiescence over aggregate positional error. A single quiet tick
//! proves nothing; the formation is quiescent only after
//! [`QUIESCENCE_COUNT`] consecutive ticks at or under the threshold.

use serde::{Deserialize, Serialize};

/// Consecutive quiet ticks required for quiescence
pub const QUIESCENCE_COUNT: usize = 5;

/// Streak counter over per-tick aggregate error
///
/// # Example
/// ```
/// use formation_simulator_core_rs::convergence::ConvergenceDetector;
///
/// let mut detector = ConvergenceDetector::new(0.1);
/// for _ in 0..4 {
///     detector.observe(0.0);
/// }
/// assert!(!detector.quiescence());
/// detector.observe(0.0);
/// assert!(detector.quiescence());
///
/// detector.observe(3.0);
/// assert_eq!(detector.q_count(), 0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceDetector {
    q_count: usize,
    threshold: f64,
}

impl ConvergenceDetector {
    pub fn new(threshold: f64) -> Self {
        Self {
            q_count: 0,
            threshold,
        }
    }

    /// Restore a detector mid-streak
    pub fn with_count(threshold: f64, q_count: usize) -> Self {
        Self { q_count, threshold }
    }

    /// Record one tick's aggregate error; returns the new quiescence state
    pub fn observe(&mut self, error: f64) -> bool {
        if error.is_finite() && error <= self.threshold {
            self.q_count = self.q_count.saturating_add(1);
        } else {
            self.q_count = 0;
        }
        self.quiescence()
    }

    pub fn quiescence(&self) -> bool {
        self.q_count >= QUIESCENCE_COUNT
    }

    pub fn q_count(&self) -> usize {
        self.q_count
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn reset(&mut self) {
        self.q_count = 0;
    }
}
