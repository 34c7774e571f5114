//! Randomized block sizing.
//!
//! Block lengths are drawn per block so the artifact set leaks as little as
//! possible about the plaintext length.  Two regimes:
//!
//! | Input size `S`        | Next block length                              |
//! |-----------------------|------------------------------------------------|
//! | `S ≤ 10^8` bytes      | `uniform[1 MiB, 10 MiB]`                       |
//! | `S > 10^8` bytes      | `uniform[10^(d-2), 10^(d-1)]`, `d = ⌊log10 S⌋` |
//!
//! Terminal rule: a final block shorter than 1 MiB is never emitted unless
//! it is the only block.  When the draw would leave such a tail, the
//! remainder is absorbed into the current block.
//!
//! Size selection is metadata hiding, not secrecy; any uniform PRNG is
//! acceptable here.  The chunker feeds it from the same RNG as the key
//! material so seeded runs stay fully deterministic.

use rand::Rng;

/// Smallest block the sizer will emit (1 MiB), except for a single-block
/// package whose whole input is smaller.
pub const MIN_BLOCK: u64 = 1024 * 1024;
/// Largest draw in the small/medium regime (10 MiB).
pub const MAX_BLOCK: u64 = 10 * 1024 * 1024;
/// Inputs above this size switch to the large-file regime.
pub const LARGE_FILE_THRESHOLD: u64 = 100_000_000;

#[derive(Debug, Clone)]
pub struct Sizer {
    lo: u64,
    hi: u64,
    fixed: Option<u64>,
    min_tail: u64,
}

impl Sizer {
    /// Build a sizer for an input of `total_size` bytes.  A `fixed` override
    /// replaces the random draw entirely; the terminal rule then scales down
    /// to the override, so a tail shorter than one fixed block is absorbed
    /// rather than emitted.
    pub fn new(total_size: u64, fixed: Option<u64>) -> Self {
        let (lo, hi) = if total_size > LARGE_FILE_THRESHOLD {
            let d = digits(total_size) - 1;
            (10u64.pow(d - 2), 10u64.pow(d - 1))
        } else {
            (MIN_BLOCK, MAX_BLOCK)
        };
        let fixed = fixed.map(|n| n.max(1));
        let min_tail = fixed.map_or(MIN_BLOCK, |n| n.min(MIN_BLOCK));
        Self { lo, hi, fixed, min_tail }
    }

    /// Length of the next block given `remaining` unconsumed input bytes.
    ///
    /// Always returns a value in `1..=remaining` for `remaining > 0`.
    pub fn next_len<R: Rng>(&self, rng: &mut R, remaining: u64) -> u64 {
        debug_assert!(remaining > 0, "sizer called with no input left");
        let want = match self.fixed {
            Some(n) => n,
            None => rng.gen_range(self.lo..=self.hi),
        };
        let len = want.min(remaining);
        // Absorb a tail that would fall below the minimum.
        if remaining > len && remaining - len < self.min_tail {
            remaining
        } else {
            len
        }
    }
}

/// Decimal digit count of a nonzero integer.
fn digits(mut n: u64) -> u32 {
    let mut d = 0;
    while n > 0 {
        n /= 10;
        d += 1;
    }
    d
}
