//! Randomness used to fill the filler bytes of outbound commands.
//!
//! Lite `SetParams` commands carry bytes the breezer ignores but that captured
//! traffic shows as random. The source is injectable so tests can assert the
//! exact wire output.

use rand::Rng;

/// A source of filler bytes.
pub trait RandomSource: Send + Sync {
    /// Fill `buf` with bytes.
    fn fill(&mut self, buf: &mut [u8]);
}

/// Thread-local RNG from `rand`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn fill(&mut self, buf: &mut [u8]) {
        rand::rng().fill(buf);
    }
}

/// Deterministic source cycling through a fixed byte pattern.
///
/// ```
/// use tion_core::random::{FixedRandom, RandomSource};
///
/// let mut rng = FixedRandom::new(vec![0xAB, 0xCD]);
/// let mut buf = [0u8; 3];
/// rng.fill(&mut buf);
/// assert_eq!(buf, [0xAB, 0xCD, 0xAB]);
/// ```
#[derive(Debug, Clone)]
pub struct FixedRandom {
    pattern: Vec<u8>,
    pos: usize,
}

impl FixedRandom {
    /// Create a source repeating `pattern`. An empty pattern yields zeros.
    pub fn new(pattern: Vec<u8>) -> Self {
        Self { pattern, pos: 0 }
    }

    /// A source that always yields `byte`.
    pub fn constant(byte: u8) -> Self {
        Self::new(vec![byte])
    }
}

impl RandomSource for FixedRandom {
    fn fill(&mut self, buf: &mut [u8]) {
        if self.pattern.is_empty() {
            buf.fill(0);
            return;
        }
        for b in buf.iter_mut() {
            *b = self.pattern[self.pos % self.pattern.len()];
            self.pos = self.pos.wrapping_add(1);
        }
    }
}
