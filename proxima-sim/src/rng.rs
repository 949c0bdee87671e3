//
// Copyright (c) The Proxima Core Contributors
//
// SPDX-License-Identifier: MIT
//

/// Uniform random source provided by the hosting simulation.
///
/// Seeding is the host's responsibility so that simulation runs stay
/// reproducible. The engine draws jitter and initial DD sequence
/// numbers from here and nothing else.
pub trait UniformRng {
    /// Uniform 32-bit value.
    fn rand_u32(&self) -> u32;

    /// Uniform integer in `[lo, hi)`. `hi` must be greater than `lo`.
    fn rand_range(&self, lo: u64, hi: u64) -> u64;
}
