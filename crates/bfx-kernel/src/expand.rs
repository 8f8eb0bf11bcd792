//! Deterministic expansion of identities into derived data
//!
//! Every identity expands into an unbounded, reproducible word stream.
//! The stream is the "expression" side of the paradigm: a 64-bit identity
//! stands in for arbitrarily much derived content, regenerated on demand
//! instead of stored.

use crate::identity::SubstrateId;

const GAMMA: u64 = 0x9e37_79b9_7f4a_7c15;
const MIX1: u64 = 0xbf58_476d_1ce4_e5b9;
const MIX2: u64 = 0x94d0_49bb_1331_11eb;

/// Advance one splitmix64 step
#[inline]
const fn mix(state: u64) -> u64 {
    let mut z = state;
    z = (z ^ (z >> 30)).wrapping_mul(MIX1);
    z = (z ^ (z >> 27)).wrapping_mul(MIX2);
    z ^ (z >> 31)
}

/// Infinite word stream seeded by an identity (splitmix64)
///
/// Two streams with the same seed produce identical output on every
/// platform. The stream never ends; callers bound it with `take`.
#[derive(Debug, Clone)]
pub struct ExpansionStream {
    state: u64,
}

impl ExpansionStream {
    /// Seed a stream from an identity
    #[inline]
    #[must_use]
    pub const fn new(id: SubstrateId) -> Self {
        Self { state: id.raw() }
    }

    /// The next word without going through the iterator protocol
    #[inline]
    pub fn next_word(&mut self) -> u64 {
        self.state = self.state.wrapping_add(GAMMA);
        mix(self.state)
    }
}

impl Iterator for ExpansionStream {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        Some(self.next_word())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (usize::MAX, None)
    }
}

/// Expand an identity into `len` derived bytes (little-endian words)
#[must_use]
pub fn expand(id: SubstrateId, len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(len);
    let mut stream = ExpansionStream::new(id);
    while out.len() < len {
        let word = stream.next_word().to_le_bytes();
        let take = (len - out.len()).min(8);
        out.extend_from_slice(&word[..take]);
    }
    out
}
