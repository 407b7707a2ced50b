//! Seeded pseudo-random numbers for the stochastic searches.

/// Source of uniform randomness for the searches.
///
/// Everything the optimizer draws goes through `next_f64`, so any implementation
/// that is deterministic for a given seed makes the searches reproducible.
pub trait SearchRng {
    /// Uniform in [0, 1).
    fn next_f64(&mut self) -> f64;

    /// Uniform integer in [0, bound). Returns 0 when `bound` is 0.
    fn next_int(&mut self, bound: usize) -> usize {
        if bound == 0 {
            return 0;
        }
        ((self.next_f64() * bound as f64) as usize).min(bound - 1)
    }

    /// Fisher-Yates shuffle, walking from the back.
    fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = self.next_int(i + 1);
            items.swap(i, j);
        }
    }
}

/// Numerical Recipes linear congruential generator.
///
/// `state = state * 1664525 + 1013904223 (mod 2^32)`, `next = state / 2^32`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lcg {
    state: u32,
}

impl Lcg {
    pub const MULTIPLIER: u32 = 1_664_525;
    pub const INCREMENT: u32 = 1_013_904_223;

    pub fn new(seed: u32) -> Self {
        Self { state: seed }
    }

    pub fn state(&self) -> u32 {
        self.state
    }
}

impl SearchRng for Lcg {
    fn next_f64(&mut self) -> f64 {
        self.state = self
            .state
            .wrapping_mul(Self::MULTIPLIER)
            .wrapping_add(Self::INCREMENT);
        self.state as f64 / 4_294_967_296.0
    }
}

/// Seed for requests that did not supply one.
pub(crate) fn entropy_seed() -> u32 {
    use std::time::{SystemTime, UNIX_EPOCH};

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    (nanos ^ (nanos >> 32)) as u32
}
