//! Step clock for the simulation
//!
//! The simulation advances in discrete steps (ticks). A run may be bounded by
//! an optional step horizon; once the horizon is reached the environment
//! reports itself as no longer active.

use serde::{Deserialize, Serialize};

/// Counts elapsed steps and tracks the optional run horizon
///
/// # Example
/// ```
/// use formation_simulator_core_rs::StepClock;
///
/// let mut clock = StepClock::new(Some(3));
/// assert_eq!(clock.current_step(), 0);
///
/// clock.advance_step();
/// assert_eq!(clock.current_step(), 1);
/// assert!(!clock.is_exhausted());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepClock {
    /// Steps elapsed since the environment was created or cleared
    current_step: usize,
    /// Step count after which the run is over (None = unbounded)
    max_steps: Option<usize>,
}

impl StepClock {
    /// Create a clock at step 0
    ///
    /// # Arguments
    /// * `max_steps` - Optional horizon; `Some(0)` means the run is over
    ///   before it starts
    pub fn new(max_steps: Option<usize>) -> Self {
        Self {
            current_step: 0,
            max_steps,
        }
    }

    /// Restore a clock at an arbitrary step (checkpoint resume)
    pub fn at(current_step: usize, max_steps: Option<usize>) -> Self {
        Self {
            current_step,
            max_steps,
        }
    }

    /// Advance by one step
    pub fn advance_step(&mut self) {
        self.current_step += 1;
    }

    /// Steps elapsed so far
    pub fn current_step(&self) -> usize {
        self.current_step
    }

    /// Configured horizon
    pub fn max_steps(&self) -> Option<usize> {
        self.max_steps
    }

    /// Steps left before the horizon (None if unbounded)
    ///
    /// # Example
    /// ```
    /// use formation_simulator_core_rs::StepClock;
    ///
    /// let mut clock = StepClock::new(Some(10));
    /// clock.advance_step();
    /// assert_eq!(clock.remaining(), Some(9));
    /// assert_eq!(StepClock::new(None).remaining(), None);
    /// ```
    pub fn remaining(&self) -> Option<usize> {
        self.max_steps
            .map(|max| max.saturating_sub(self.current_step))
    }

    /// True once the horizon has been reached
    pub fn is_exhausted(&self) -> bool {
        self.remaining() == Some(0)
    }

    /// Rewind to step 0, keeping the horizon
    pub fn reset(&mut self) {
        self.current_step = 0;
    }
}

impl Default for StepClock {
    fn default() -> Self {
        Self::new(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_horizon_is_exhausted_immediately() {
        let clock = StepClock::new(Some(0));
        assert!(clock.is_exhausted());
    }

    #[test]
    fn test_reset_keeps_horizon() {
        let mut clock = StepClock::new(Some(5));
        clock.advance_step();
        clock.advance_step();
        clock.reset();
        assert_eq!(clock.current_step(), 0);
        assert_eq!(clock.max_steps(), Some(5));
    }
}
