//! Error types for the substrate store
//!
//! Covers the failure surface of the persistence layer:
//! - Locator parsing and lens projection
//! - Optimistic-concurrency conflicts
//! - Integrity violations found on ingest, read, or audit
//! - Durable backend faults (locking, corruption, I/O)

use std::path::PathBuf;

use bfx_kernel::{IdentityError, LensError, SubstrateId};

use crate::srl::{SrlError, Version};

/// Convenience alias for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Main store error type
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Underlying I/O failure
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding/decoding failure
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Malformed substrate locator
    #[error("invalid srl: {0}")]
    InvalidSrl(#[from] SrlError),

    /// Lens projection failure
    #[error("lens error: {0}")]
    Lens(#[from] LensError),

    /// Identity derivation failure
    #[error("identity error: {0}")]
    Identity(#[from] IdentityError),

    /// A live append carried no payload bytes
    #[error("empty payload for live append to '{key}'; only tombstones may be empty")]
    EmptyPayload {
        /// Canonical key
        key: String,
    },

    /// Compare-and-append lost the race or targeted a stale head
    #[error("version conflict on '{key}': expected {expected:?}, head is {head:?}")]
    VersionConflict {
        /// Canonical key
        key: String,
        /// Head version the writer based its change on
        expected: Option<Version>,
        /// Head version actually observed
        head: Option<Version>,
    },

    /// Stored payload does not hash to its recorded identity
    #[error("identity mismatch on '{key}' {version}: recorded {expected}, computed {actual}")]
    IdentityMismatch {
        /// Canonical key
        key: String,
        /// Affected version
        version: Version,
        /// Identity the record claims
        expected: SubstrateId,
        /// Identity the payload hashes to
        actual: SubstrateId,
    },

    /// A referenced version does not exist or was compacted away
    #[error("version {version} of '{key}' is not retained")]
    VersionAbsent {
        /// Canonical key
        key: String,
        /// Requested version
        version: Version,
    },

    /// Store directory is held by another process
    #[error("store at {path:?} is locked by another process")]
    Locked {
        /// Store root directory
        path: PathBuf,
    },

    /// Unrecoverable on-disk damage
    #[error("corrupt store data: {context}")]
    Corrupt {
        /// What was being read when the damage was found
        context: String,
    },

    /// No resolution strategy registered under the requested name
    #[error("unknown resolution strategy: {name}")]
    UnknownStrategy {
        /// Requested strategy name
        name: String,
    },

    /// The resolution strategy declined to merge a conflicting write
    #[error("conflict on '{key}' rejected by {strategy}: {reason}")]
    ConflictRejected {
        /// Canonical key
        key: String,
        /// Strategy that rejected
        strategy: String,
        /// Why the write could not be merged
        reason: String,
    },

    /// Commit retries ran out before a compare-and-append succeeded
    #[error("commit to '{key}' gave up after {attempts} attempts")]
    AttemptsExhausted {
        /// Canonical key
        key: String,
        /// Attempts made
        attempts: u32,
    },
}

impl StoreError {
    /// True for errors a writer can resolve by re-reading and retrying
    #[inline]
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::VersionConflict { .. }
                | Self::ConflictRejected { .. }
                | Self::AttemptsExhausted { .. }
        )
    }

    /// True for errors that indicate damaged or tampered data
    #[inline]
    #[must_use]
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::Corrupt { .. } | Self::IdentityMismatch { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_classification() {
        let err = StoreError::VersionConflict {
            key: "app/doc".to_string(),
            expected: Some(Version::new(2)),
            head: Some(Version::new(3)),
        };
        assert!(err.is_conflict());
        assert!(!err.is_corruption());
    }

    #[test]
    fn corruption_classification() {
        let err = StoreError::IdentityMismatch {
            key: "app/doc".to_string(),
            version: Version::FIRST,
            expected: SubstrateId::new(1),
            actual: SubstrateId::new(2),
        };
        assert!(err.is_corruption());
        assert!(!err.is_conflict());
    }

    #[test]
    fn error_display_names_the_key() {
        let err = StoreError::AttemptsExhausted {
            key: "app/doc".to_string(),
            attempts: 5,
        };
        assert!(err.to_string().contains("app/doc"));
        assert!(err.to_string().contains('5'));
    }
}
