//! Storage backend abstraction
//!
//! A backend owns the versioned lineages and the one atomic primitive
//! everything else builds on: compare-and-append. Facades never
//! read-modify-write around it.

use bfx_kernel::SubstrateId;

use crate::compact::{CompactionReport, RetentionPolicy};
use crate::config::BackendKind;
use crate::error::Result;
use crate::record::{Record, VersionSummary, WriterId};
use crate::srl::{Revision, Version};

/// Head expectation of an append
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Expected {
    /// Append regardless of the current head
    #[default]
    Any,
    /// The key must not exist yet
    Absent,
    /// The head must be exactly this version
    At(Version),
}

/// A single append to one lineage
#[derive(Debug, Clone)]
pub struct AppendRequest {
    /// Canonical storage key
    pub key: String,
    /// Payload bytes
    pub payload: Vec<u8>,
    /// Identity the payload must hash to
    pub identity: SubstrateId,
    /// Committing writer, if known
    pub writer: Option<WriterId>,
    /// Whether this append deletes the key
    pub tombstone: bool,
    /// Compare-and-append guard
    pub expected: Expected,
}

impl AppendRequest {
    /// Build a live append, deriving the payload identity
    #[must_use]
    pub fn live(key: impl Into<String>, payload: Vec<u8>) -> Self {
        let identity = SubstrateId::of(&payload);
        Self {
            key: key.into(),
            payload,
            identity,
            writer: None,
            tombstone: false,
            expected: Expected::Any,
        }
    }

    /// Build a tombstone append
    #[must_use]
    pub fn tombstone(key: impl Into<String>) -> Self {
        let payload = Vec::new();
        let identity = SubstrateId::of(&payload);
        Self {
            key: key.into(),
            payload,
            identity,
            writer: None,
            tombstone: true,
            expected: Expected::Any,
        }
    }

    /// Attach a writer identity
    #[must_use]
    pub fn by(mut self, writer: WriterId) -> Self {
        self.writer = Some(writer);
        self
    }

    /// Guard the append with a head expectation
    #[must_use]
    pub const fn expecting(mut self, expected: Expected) -> Self {
        self.expected = expected;
        self
    }

    /// Materialize the record this request appends at `version`
    #[must_use]
    pub fn into_record(self, version: Version) -> Record {
        if self.tombstone {
            Record::tombstone(self.key, version, self.writer)
        } else {
            let mut record = Record::live(self.key, version, self.payload, self.writer);
            record.identity = self.identity;
            record
        }
    }
}

/// Empty payloads mark deletion; a live record must carry bytes.
pub(crate) fn check_payload(request: &AppendRequest) -> Result<()> {
    if !request.tombstone && request.payload.is_empty() {
        return Err(crate::error::StoreError::EmptyPayload {
            key: request.key.clone(),
        });
    }
    Ok(())
}

/// Shared compare-and-append guard check.
///
/// Backends call this while holding whatever lock makes the subsequent
/// append atomic.
pub(crate) fn check_expectation(
    key: &str,
    expected: Expected,
    head: Option<Version>,
) -> Result<()> {
    let conflict = |want: Option<Version>| crate::error::StoreError::VersionConflict {
        key: key.to_string(),
        expected: want,
        head,
    };
    match expected {
        Expected::Any => Ok(()),
        Expected::Absent => {
            if head.is_none() {
                Ok(())
            } else {
                Err(conflict(None))
            }
        }
        Expected::At(version) => {
            if head == Some(version) {
                Ok(())
            } else {
                Err(conflict(Some(version)))
            }
        }
    }
}

/// Store-wide size statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StoreStats {
    /// Live lineages
    pub keys: u64,
    /// Records across all lineages
    pub records: u64,
    /// Tombstone records
    pub tombstones: u64,
    /// Bytes in the write-ahead log
    pub wal_bytes: u64,
    /// Bytes in segment files
    pub segment_bytes: u64,
}

/// A versioned, append-only object store
///
/// Implementations are shared across tasks, so every method takes `&self`.
/// Appends are atomic with respect to the head expectation; two concurrent
/// appends guarded with the same [`Expected::At`] cannot both succeed.
#[async_trait::async_trait]
pub trait StorageBackend: Send + Sync {
    /// Append one version to a lineage
    ///
    /// Verifies the payload hashes to the request identity, checks the head
    /// expectation, and assigns the next version number.
    ///
    /// # Errors
    /// [`crate::StoreError::VersionConflict`] when the expectation fails,
    /// [`crate::StoreError::IdentityMismatch`] when the payload does not
    /// hash to the request identity, plus backend-specific I/O errors
    async fn append(&self, request: AppendRequest) -> Result<Version>;

    /// Read a record at a revision
    ///
    /// `Revision::Head` hides tombstoned lineages (returns `Ok(None)`);
    /// `Revision::At` returns whatever is retained at that version,
    /// tombstones included.
    ///
    /// # Errors
    /// Backend-specific read failures
    async fn read(&self, key: &str, revision: Revision) -> Result<Option<Record>>;

    /// The newest record of a lineage, tombstone or not
    ///
    /// # Errors
    /// Backend-specific read failures
    async fn head(&self, key: &str) -> Result<Option<Record>>;

    /// Payload-free listing of a lineage in version order
    ///
    /// # Errors
    /// Backend-specific read failures
    async fn history(&self, key: &str) -> Result<Vec<VersionSummary>>;

    /// All canonical keys with at least one retained record, sorted
    ///
    /// # Errors
    /// Backend-specific read failures
    async fn keys(&self) -> Result<Vec<String>>;

    /// Force buffered state to durable storage
    ///
    /// # Errors
    /// Backend-specific flush failures
    async fn flush(&self) -> Result<()>;

    /// Trim lineages per `policy` and consolidate durable storage
    ///
    /// # Errors
    /// Backend-specific rewrite failures
    async fn compact(&self, policy: &RetentionPolicy) -> Result<CompactionReport>;

    /// Current size statistics
    ///
    /// # Errors
    /// Backend-specific read failures
    async fn stats(&self) -> Result<StoreStats>;

    /// Which backend this is
    fn kind(&self) -> BackendKind;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_request_derives_identity() {
        let request = AppendRequest::live("app/doc", b"data".to_vec());
        assert_eq!(request.identity, SubstrateId::of(b"data"));
        assert!(!request.tombstone);
        assert_eq!(request.expected, Expected::Any);
    }

    #[test]
    fn request_builders_compose() {
        let writer = WriterId::new();
        let request = AppendRequest::tombstone("app/doc")
            .by(writer)
            .expecting(Expected::At(Version::new(3)));
        assert!(request.tombstone);
        assert_eq!(request.writer, Some(writer));
        assert_eq!(request.expected, Expected::At(Version::new(3)));
    }

    #[test]
    fn into_record_keeps_request_identity() {
        let request = AppendRequest::live("app/doc", b"data".to_vec());
        let identity = request.identity;
        let record = request.into_record(Version::new(2));
        assert_eq!(record.identity, identity);
        assert_eq!(record.version, Version::new(2));
        assert!(record.verify_identity());
    }
}
