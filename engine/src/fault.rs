//! Synthetic failure injection.
//!
//! A configurable failure probability checked once per record, before any
//! mutation is staged. Used by tests and chaos tooling to exercise the
//! caller's retry and dead-letter paths.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// Injects failures at a configured percentage rate.
#[derive(Debug)]
pub struct FailureInjector {
    rate_percent: u8,
    rng: SmallRng,
}

impl FailureInjector {
    /// Create an injector with the given seed. Rate starts at zero.
    pub fn new(seed: u64) -> Self {
        Self {
            rate_percent: 0,
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    /// An injector that never fires.
    pub fn disabled() -> Self {
        Self::new(0)
    }

    /// Set the failure rate as a percentage, clamped to 100.
    pub fn set_rate(&mut self, rate_percent: u8) {
        self.rate_percent = rate_percent.min(100);
    }

    /// Roll the dice for one record.
    pub fn should_fail(&mut self) -> bool {
        if self.rate_percent == 0 {
            return false;
        }
        self.rng.gen_range(0..100) < u32::from(self.rate_percent)
    }
}
