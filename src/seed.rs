//! Seed fan-out (component B): derives an arbitrary number of reproducible
//! 32-bit sub-seeds from a single 64-bit master seed.
//!
//! The expander is the single shared, reproducible fixture every sub-PRNG
//! in the crate (pool shuffle, request-type selection, body-size sampling,
//! per-connection seeding) is built from.

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

/// Expands a master seed into an arbitrary sequence of sub-seeds.
///
/// Two `SeedExpander`s constructed with the same master seed produce
/// identical sequences of sub-seeds (§8 invariant I6), regardless of
/// process or thread.
pub struct SeedExpander {
    rng: Pcg32,
}

impl SeedExpander {
    #[must_use]
    pub fn new(master_seed: u64) -> Self {
        // Stream id is fixed so the expander is fully determined by the master seed.
        Self {
            rng: Pcg32::new(master_seed, 0xa02b_dbf7_bb3c_0a7a),
        }
    }

    /// Draws the next sub-seed in the sequence.
    pub fn next_seed(&mut self) -> u32 {
        self.rng.gen()
    }

    /// Draws `n` sub-seeds at once, in draw order.
    pub fn next_seeds(&mut self, n: usize) -> Vec<u32> {
        (0..n).map(|_| self.next_seed()).collect()
    }
}
