//! xorshift64* random number generator
//!
//! 64-bit state, 64-bit output. Same seed gives the same sequence, which is
//! what makes scattered robot placements reproducible across runs and
//! checkpoint restores.

use serde::{Deserialize, Serialize};

/// Deterministic random number generator using xorshift64*
///
/// # Example
/// ```
/// use formation_simulator_core_rs::RngManager;
///
/// let mut rng = RngManager::new(12345);
/// let x = rng.uniform(-5.0, 5.0);
/// assert!((-5.0..5.0).contains(&x));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RngManager {
    state: u64,
}

impl RngManager {
    /// Create a new RNG with the given seed (0 is mapped to 1)
    pub fn new(seed: u64) -> Self {
        let state = if seed == 0 { 1 } else { seed };
        Self { state }
    }

    /// Next raw 64-bit value
    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }

    /// Uniform f64 in [0.0, 1.0)
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 * (1.0 / ((1u64 << 53) as f64))
    }

    /// Uniform f64 in [min, max)
    ///
    /// # Panics
    /// Panics if `min >= max` or either bound is not finite.
    pub fn uniform(&mut self, min: f64, max: f64) -> f64 {
        assert!(
            min.is_finite() && max.is_finite() && min < max,
            "uniform bounds must be finite with min < max"
        );
        min + self.next_f64() * (max - min)
    }

    /// Uniform index in [0, len)
    ///
    /// # Panics
    /// Panics if `len == 0`.
    pub fn index(&mut self, len: usize) -> usize {
        assert!(len > 0, "cannot pick from an empty range");
        (self.next_u64() % len as u64) as usize
    }

    /// Current internal state (checkpointing)
    ///
    /// `RngManager::new(rng.get_state())` continues the same sequence.
    pub fn get_state(&self) -> u64 {
        self.state
    }
}
