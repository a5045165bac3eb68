//! Injectable source of randomness.
//!
//! Server selection, error-queue sampling and backoff jitter all draw from a
//! [`RandomSource`] so tests can script every decision.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[cfg(test)]
#[path = "random_tests.rs"]
mod tests;

/// Source of uniformly distributed values
pub trait RandomSource: Send {
    /// Next value in `[0, 1)`
    fn next_f64(&mut self) -> f64;

    /// Next index in `0..len`. `len` must be non-zero.
    fn next_index(&mut self, len: usize) -> usize;
}

/// Random source backed by an entropy-seeded [`StdRng`]
pub struct StdRandom {
    rng: StdRng,
}

impl StdRandom {
    /// Create a source seeded from the operating system
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Create a reproducible source
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for StdRandom {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomSource for StdRandom {
    fn next_f64(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }

    fn next_index(&mut self, len: usize) -> usize {
        self.rng.gen_range(0..len)
    }
}

/// Random source replaying a fixed cycle of values.
///
/// Indices are derived from the same values: `floor(value * len)`.
#[derive(Debug, Clone)]
pub struct ScriptedRandom {
    values: Vec<f64>,
    position: usize,
}

impl ScriptedRandom {
    /// Replay `values` in order, starting over when exhausted.
    ///
    /// An empty script always yields `0.0`.
    pub fn new(values: Vec<f64>) -> Self {
        Self {
            values,
            position: 0,
        }
    }

    /// Always yield `value`
    pub fn constant(value: f64) -> Self {
        Self::new(vec![value])
    }
}

impl RandomSource for ScriptedRandom {
    fn next_f64(&mut self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }

        let value = self.values[self.position % self.values.len()];
        self.position += 1;
        value.clamp(0.0, 1.0 - f64::EPSILON)
    }

    fn next_index(&mut self, len: usize) -> usize {
        let index = (self.next_f64() * len as f64) as usize;
        index.min(len.saturating_sub(1))
    }
}
