//! XOR delta algebra
//!
//! Change between two identities is a 64-bit XOR mask: self-inverse,
//! composable, and carrying its own information content (popcount). The
//! same algebra extends to payload bytes, where it powers three-way
//! rebasing of concurrent edits.

use crate::identity::SubstrateId;

/// A change mask between two substrate identities
///
/// XOR is self-inverse: applying a delta twice restores the input.
/// Deltas compose by XOR and the composition is order-independent.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(transparent)]
pub struct Delta(u64);

impl Delta {
    /// The no-change delta
    pub const IDENTITY: Self = Self(0);

    /// Create a delta from a raw mask
    #[inline]
    #[must_use]
    pub const fn new(mask: u64) -> Self {
        Self(mask)
    }

    /// The raw mask
    #[inline]
    #[must_use]
    pub const fn mask(self) -> u64 {
        self.0
    }

    /// The delta taking `a` to `b`
    #[inline]
    #[must_use]
    pub const fn between(a: SubstrateId, b: SubstrateId) -> Self {
        Self(a.raw() ^ b.raw())
    }

    /// Apply the delta to an identity
    #[inline]
    #[must_use]
    pub const fn apply(self, id: SubstrateId) -> SubstrateId {
        SubstrateId::new(id.raw() ^ self.0)
    }

    /// Compose with another delta (order-independent)
    #[inline]
    #[must_use]
    pub const fn compose(self, other: Self) -> Self {
        Self(self.0 ^ other.0)
    }

    /// The inverse delta (XOR masks are self-inverse)
    #[inline]
    #[must_use]
    pub const fn inverse(self) -> Self {
        self
    }

    /// Whether this delta changes nothing
    #[inline]
    #[must_use]
    pub const fn is_identity(self) -> bool {
        self.0 == 0
    }

    /// Information content of the change: the number of flipped bits
    #[inline]
    #[must_use]
    pub const fn weight(self) -> u32 {
        self.0.count_ones()
    }
}

/// XOR two equal-length payloads into a change mask.
///
/// # Errors
/// Returns [`DeltaError::LengthMismatch`] if the payload lengths differ.
pub fn xor_bytes(base: &[u8], target: &[u8]) -> Result<Vec<u8>, DeltaError> {
    if base.len() != target.len() {
        return Err(DeltaError::LengthMismatch {
            left: base.len(),
            right: target.len(),
        });
    }
    Ok(base.iter().zip(target).map(|(a, b)| a ^ b).collect())
}

/// Three-way merge of two concurrent edits of the same base payload.
///
/// Both edits are reduced to XOR masks against `base`; the merge applies
/// both masks. Valid only when the edits touch disjoint byte positions.
/// Positions changed by both sides are rejected even when the changes
/// agree, since XOR composition would cancel them.
///
/// # Errors
/// Returns [`DeltaError::LengthMismatch`] if the three payloads differ in
/// length, or [`DeltaError::OverlappingChanges`] naming the first byte both
/// sides modified.
pub fn rebase(base: &[u8], ours: &[u8], theirs: &[u8]) -> Result<Vec<u8>, DeltaError> {
    let d_ours = xor_bytes(base, ours)?;
    let d_theirs = xor_bytes(base, theirs)?;
    for (offset, (a, b)) in d_ours.iter().zip(&d_theirs).enumerate() {
        if *a != 0 && *b != 0 {
            return Err(DeltaError::OverlappingChanges { offset });
        }
    }
    Ok(base
        .iter()
        .zip(d_ours.iter().zip(&d_theirs))
        .map(|(byte, (a, b))| byte ^ a ^ b)
        .collect())
}

/// Errors from the byte-level delta algebra
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DeltaError {
    /// Payload lengths differ
    #[error("payload length mismatch: {left} vs {right}")]
    LengthMismatch { left: usize, right: usize },

    /// Both edits touched the same byte
    #[error("overlapping changes at byte {offset}")]
    OverlappingChanges { offset: usize },
}
