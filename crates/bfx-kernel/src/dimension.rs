//! Dimensional levels and the promotion map
//!
//! A substrate lives at one of eight nesting levels. Promotion lifts an
//! identity one level up through a fixed bijective mixing step; demotion is
//! its exact inverse. Lifting across several levels iterates the step.

use std::fmt::{self, Display, Formatter};

use crate::identity::SubstrateId;

/// Input salt of the promotion step (golden-ratio constant).
const SALT_IN: u64 = 0x9e37_79b9_7f4a_7c15;

/// Output salt of the promotion step.
const SALT_OUT: u64 = 0xc2b2_ae3d_27d4_eb4f;

/// Rotation applied between the two salts.
const ROT: u32 = 21;

/// A dimensional level, 0 through 7
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct Dimension(u8);

impl Dimension {
    /// The ground level
    pub const GROUND: Self = Self(0);

    /// The highest level
    pub const MAX: Self = Self(7);

    /// Create a dimension
    ///
    /// # Errors
    /// Returns an error if `level` exceeds [`Dimension::MAX`]
    #[inline]
    pub const fn new(level: u8) -> Result<Self, DimensionError> {
        if level > Self::MAX.0 {
            return Err(DimensionError::OutOfRange { level });
        }
        Ok(Self(level))
    }

    /// The raw level
    #[inline]
    #[must_use]
    pub const fn level(self) -> u8 {
        self.0
    }

    /// The level above, if any
    #[inline]
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        if self.0 >= Self::MAX.0 {
            None
        } else {
            Some(Self(self.0 + 1))
        }
    }

    /// The level below, if any
    #[inline]
    #[must_use]
    pub const fn prev(self) -> Option<Self> {
        if self.0 == 0 {
            None
        } else {
            Some(Self(self.0 - 1))
        }
    }
}

impl Default for Dimension {
    fn default() -> Self {
        Self::GROUND
    }
}

impl Display for Dimension {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lift an identity one level up.
///
/// The step is a bijection on the 64-bit space: [`demote`] recovers the
/// input exactly. Promoted identities are deterministic and uncorrelated
/// with their sources.
#[inline]
#[must_use]
pub const fn promote(id: SubstrateId) -> SubstrateId {
    SubstrateId::new((id.raw() ^ SALT_IN).rotate_left(ROT) ^ SALT_OUT)
}

/// Lower an identity one level down (exact inverse of [`promote`]).
#[inline]
#[must_use]
pub const fn demote(id: SubstrateId) -> SubstrateId {
    SubstrateId::new((id.raw() ^ SALT_OUT).rotate_right(ROT) ^ SALT_IN)
}

/// Lift an identity from one dimension to another.
///
/// Applies [`promote`] or [`demote`] once per level crossed; `from == to`
/// returns the identity unchanged.
#[must_use]
pub fn lift(id: SubstrateId, from: Dimension, to: Dimension) -> SubstrateId {
    let mut out = id;
    if to.level() >= from.level() {
        for _ in from.level()..to.level() {
            out = promote(out);
        }
    } else {
        for _ in to.level()..from.level() {
            out = demote(out);
        }
    }
    out
}

/// Errors for dimensional levels
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DimensionError {
    /// Level outside 0..=7
    #[error("dimension level {level} out of range (max 7)")]
    OutOfRange { level: u8 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn promote_then_demote_restores() {
        for raw in [0u64, 1, 42, u64::MAX, 0xdead_beef_cafe_f00d] {
            let id = SubstrateId::new(raw);
            assert_eq!(demote(promote(id)), id);
            assert_eq!(promote(demote(id)), id);
        }
    }

    #[test]
    fn promotion_changes_identity() {
        let id = SubstrateId::of(b"ground value");
        assert_ne!(promote(id), id);
    }

    #[test]
    fn lift_same_level_is_identity() {
        let id = SubstrateId::of(b"x");
        let d = Dimension::new(3).unwrap();
        assert_eq!(lift(id, d, d), id);
    }

    #[test]
    fn lift_up_then_down_restores() {
        let id = SubstrateId::of(b"y");
        let ground = Dimension::GROUND;
        let top = Dimension::MAX;
        let lifted = lift(id, ground, top);
        assert_eq!(lift(lifted, top, ground), id);
    }

    #[test]
    fn lift_composes_single_steps() {
        let id = SubstrateId::of(b"z");
        let d0 = Dimension::GROUND;
        let d2 = Dimension::new(2).unwrap();
        assert_eq!(lift(id, d0, d2), promote(promote(id)));
    }

    #[test]
    fn dimension_bounds() {
        assert_eq!(Dimension::new(7), Ok(Dimension::MAX));
        assert_eq!(
            Dimension::new(8),
            Err(DimensionError::OutOfRange { level: 8 })
        );
        assert_eq!(Dimension::MAX.next(), None);
        assert_eq!(Dimension::GROUND.prev(), None);
        assert_eq!(Dimension::GROUND.next(), Some(Dimension::new(1).unwrap()));
    }
}
