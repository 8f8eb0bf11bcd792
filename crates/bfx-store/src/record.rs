//! Versioned records
//!
//! A [`Record`] is one immutable version of one key: payload bytes, the
//! substrate identity they hash to, and provenance. Deletion never removes
//! records; it appends a tombstone version.

use chrono::{DateTime, Utc};
use std::fmt::{self, Display, Formatter};
use uuid::Uuid;

use bfx_kernel::SubstrateId;

use crate::srl::Version;

/// Identity of a committing writer
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(transparent)]
pub struct WriterId(Uuid);

impl WriterId {
    /// Generate a fresh writer identity
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying UUID
    #[inline]
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for WriterId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for WriterId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One immutable version of one key
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Record {
    /// Canonical storage key (`realm/a/b`)
    pub key: String,
    /// Position in the key's lineage, starting at 1
    pub version: Version,
    /// Substrate identity of the payload
    pub identity: SubstrateId,
    /// Payload bytes (hex-encoded in human-readable formats)
    #[serde(with = "hex_payload")]
    pub payload: Vec<u8>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Writer that committed this version, if known
    pub writer: Option<WriterId>,
    /// Whether this version deletes the key
    pub tombstone: bool,
}

impl Record {
    /// Create a live record, deriving the payload identity
    #[must_use]
    pub fn live(
        key: impl Into<String>,
        version: Version,
        payload: Vec<u8>,
        writer: Option<WriterId>,
    ) -> Self {
        let identity = SubstrateId::of(&payload);
        Self {
            key: key.into(),
            version,
            identity,
            payload,
            created_at: Utc::now(),
            writer,
            tombstone: false,
        }
    }

    /// Create a tombstone record (empty payload)
    #[must_use]
    pub fn tombstone(key: impl Into<String>, version: Version, writer: Option<WriterId>) -> Self {
        let payload = Vec::new();
        let identity = SubstrateId::of(&payload);
        Self {
            key: key.into(),
            version,
            identity,
            payload,
            created_at: Utc::now(),
            writer,
            tombstone: true,
        }
    }

    /// Re-derive the payload identity and compare
    #[must_use]
    pub fn verify_identity(&self) -> bool {
        SubstrateId::of(&self.payload) == self.identity
    }

    /// Payload-free listing row for this record
    #[must_use]
    pub fn summary(&self) -> VersionSummary {
        VersionSummary {
            version: self.version,
            identity: self.identity,
            created_at: self.created_at,
            writer: self.writer,
            tombstone: self.tombstone,
            payload_len: self.payload.len() as u64,
        }
    }
}

/// History listing entry: a record without its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct VersionSummary {
    /// Position in the lineage
    pub version: Version,
    /// Substrate identity of the payload
    pub identity: SubstrateId,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Committing writer, if known
    pub writer: Option<WriterId>,
    /// Whether the version is a tombstone
    pub tombstone: bool,
    /// Payload size in bytes
    pub payload_len: u64,
}

mod hex_payload {
    use serde::Deserialize;

    pub(super) fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        if serializer.is_human_readable() {
            serializer.serialize_str(&hex::encode(bytes))
        } else {
            serializer.collect_seq(bytes)
        }
    }

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            hex::decode(&s).map_err(serde::de::Error::custom)
        } else {
            Vec::<u8>::deserialize(deserializer)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_record_binds_identity() {
        let record = Record::live("app/doc", Version::FIRST, b"payload".to_vec(), None);
        assert_eq!(record.identity, SubstrateId::of(b"payload"));
        assert!(record.verify_identity());
        assert!(!record.tombstone);
    }

    #[test]
    fn tampering_fails_verification() {
        let mut record = Record::live("app/doc", Version::FIRST, b"payload".to_vec(), None);
        record.payload[0] ^= 0xff;
        assert!(!record.verify_identity());
    }

    #[test]
    fn tombstone_has_empty_payload() {
        let record = Record::tombstone("app/doc", Version::new(4), Some(WriterId::new()));
        assert!(record.tombstone);
        assert!(record.payload.is_empty());
        assert!(record.verify_identity());
    }

    #[test]
    fn summary_mirrors_record() {
        let writer = WriterId::new();
        let record = Record::live("app/doc", Version::new(2), b"abc".to_vec(), Some(writer));
        let summary = record.summary();
        assert_eq!(summary.version, Version::new(2));
        assert_eq!(summary.identity, record.identity);
        assert_eq!(summary.writer, Some(writer));
        assert_eq!(summary.payload_len, 3);
        assert!(!summary.tombstone);
    }

    #[test]
    fn payload_serializes_as_hex() {
        let record = Record::live("app/doc", Version::FIRST, vec![0xde, 0xad], None);
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"dead\""));
        let back: Record = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn writer_ids_are_unique() {
        assert_ne!(WriterId::new(), WriterId::new());
    }
}
