//! Substrate identity primitives
//!
//! Provides [`SubstrateId`], the strongly-typed 64-bit identity every value
//! in the system is addressed by, plus the derivation routines producing it.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use sha2::{Digest, Sha256};

/// FNV-1a 64-bit offset basis.
pub const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;

/// FNV-1a 64-bit prime.
pub const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Hash a byte string with FNV-1a 64.
///
/// Deterministic and platform-independent. This is the fast
/// non-cryptographic derivation path; the canonical path folds SHA-256.
#[inline]
#[must_use]
pub const fn fnv1a64(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET;
    let mut i = 0;
    while i < bytes.len() {
        hash ^= bytes[i] as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
        i += 1;
    }
    hash
}

/// Identity derivation algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IdentityAlgo {
    /// FNV-1a 64: fast, non-cryptographic
    Fnv1a,
    /// SHA-256 folded to 64 bits (first 8 digest bytes, big-endian)
    #[default]
    Sha256,
}

/// A 64-bit substrate identity
///
/// Every value is addressed by its identity: a deterministic function of the
/// value's canonical byte encoding. Identities are immutable and cheap to
/// copy; equal identities address the same substrate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SubstrateId(u64);

impl SubstrateId {
    /// The zero identity (placeholder/uninitialized)
    pub const ZERO: Self = Self(0);

    /// Create an identity from a raw 64-bit value
    #[inline]
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw 64-bit value
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Big-endian byte encoding (used in audit leaves and log entries)
    #[inline]
    #[must_use]
    pub const fn to_be_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    /// Derive the canonical identity of a byte string (SHA-256 fold)
    #[inline]
    #[must_use]
    pub fn of(bytes: &[u8]) -> Self {
        Self::of_with(bytes, IdentityAlgo::Sha256)
    }

    /// Derive an identity with an explicit algorithm
    #[must_use]
    pub fn of_with(bytes: &[u8], algo: IdentityAlgo) -> Self {
        match algo {
            IdentityAlgo::Fnv1a => Self(fnv1a64(bytes)),
            IdentityAlgo::Sha256 => {
                let digest = Sha256::digest(bytes);
                let mut head = [0u8; 8];
                head.copy_from_slice(&digest[..8]);
                Self(u64::from_be_bytes(head))
            }
        }
    }

    /// Derive the identity of a structured value via its canonical JSON
    /// encoding (object keys sorted)
    ///
    /// # Errors
    /// Returns an error if the value cannot be serialized
    #[inline]
    pub fn of_value(value: &serde_json::Value) -> Result<Self, IdentityError> {
        let canonical = serde_json::to_vec(value)?;
        Ok(Self::of(&canonical))
    }

    /// Check if this is the zero identity
    #[inline]
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl Display for SubstrateId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl FromStr for SubstrateId {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 16 {
            return Err(IdentityError::InvalidLength {
                expected: 16,
                actual: s.len(),
            });
        }
        let raw = u64::from_str_radix(s, 16)?;
        Ok(Self(raw))
    }
}

impl From<u64> for SubstrateId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

// Serde implementations: hex string in human-readable formats, raw u64 in
// binary ones.
impl serde::Serialize for SubstrateId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_string())
        } else {
            serializer.serialize_u64(self.0)
        }
    }
}

impl<'de> serde::Deserialize<'de> for SubstrateId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct IdVisitor;

        impl serde::de::Visitor<'_> for IdVisitor {
            type Value = SubstrateId;

            fn expecting(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
                formatter.write_str("a 16-char hex string or a u64")
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                value.parse().map_err(serde::de::Error::custom)
            }

            fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(SubstrateId::new(value))
            }
        }

        if deserializer.is_human_readable() {
            deserializer.deserialize_str(IdVisitor)
        } else {
            deserializer.deserialize_u64(IdVisitor)
        }
    }
}

/// Errors that can occur when working with substrate identities
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    /// Invalid hex string length
    #[error("invalid identity length: expected {expected} hex chars, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// Hex parse error
    #[error("identity parse error: {0}")]
    Parse(#[from] std::num::ParseIntError),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
