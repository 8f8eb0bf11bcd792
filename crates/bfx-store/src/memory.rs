//! In-memory backend
//!
//! Lineages live in a concurrent map; the map's entry lock makes
//! compare-and-append atomic. Nothing survives the process, which is the
//! point: ephemeral stores and tests run on this backend.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use bfx_kernel::SubstrateId;

use crate::backend::{check_expectation, check_payload, AppendRequest, StorageBackend, StoreStats};
use crate::compact::{CompactionReport, RetentionPolicy};
use crate::config::BackendKind;
use crate::error::{Result, StoreError};
use crate::record::{Record, VersionSummary};
use crate::srl::{Revision, Version};

/// Ephemeral lineage store
#[derive(Debug, Default)]
pub struct MemoryBackend {
    lineages: DashMap<String, Vec<Record>>,
}

impl MemoryBackend {
    /// Create an empty backend
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn read_at(lineage: &[Record], revision: Revision) -> Option<Record> {
    match revision {
        Revision::Head => lineage
            .last()
            .filter(|record| !record.tombstone)
            .cloned(),
        Revision::At(version) => lineage
            .binary_search_by_key(&version, |record| record.version)
            .ok()
            .map(|idx| lineage[idx].clone()),
    }
}

#[async_trait::async_trait]
impl StorageBackend for MemoryBackend {
    async fn append(&self, request: AppendRequest) -> Result<Version> {
        check_payload(&request)?;
        let actual = SubstrateId::of(&request.payload);
        match self.lineages.entry(request.key.clone()) {
            Entry::Occupied(mut entry) => {
                let lineage = entry.get_mut();
                let head = lineage.last().map(|record| record.version);
                check_expectation(&request.key, request.expected, head)?;
                let version = head.map_or(Version::FIRST, Version::next);
                if actual != request.identity {
                    return Err(StoreError::IdentityMismatch {
                        key: request.key,
                        version,
                        expected: request.identity,
                        actual,
                    });
                }
                lineage.push(request.into_record(version));
                Ok(version)
            }
            Entry::Vacant(entry) => {
                check_expectation(&request.key, request.expected, None)?;
                let version = Version::FIRST;
                if actual != request.identity {
                    return Err(StoreError::IdentityMismatch {
                        key: request.key,
                        version,
                        expected: request.identity,
                        actual,
                    });
                }
                entry.insert(vec![request.into_record(version)]);
                Ok(version)
            }
        }
    }

    async fn read(&self, key: &str, revision: Revision) -> Result<Option<Record>> {
        Ok(self
            .lineages
            .get(key)
            .and_then(|lineage| read_at(&lineage, revision)))
    }

    async fn head(&self, key: &str) -> Result<Option<Record>> {
        Ok(self
            .lineages
            .get(key)
            .and_then(|lineage| lineage.last().cloned()))
    }

    async fn history(&self, key: &str) -> Result<Vec<VersionSummary>> {
        Ok(self
            .lineages
            .get(key)
            .map(|lineage| lineage.iter().map(Record::summary).collect())
            .unwrap_or_default())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self
            .lineages
            .iter()
            .filter(|entry| !entry.value().is_empty())
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn flush(&self) -> Result<()> {
        Ok(())
    }

    async fn compact(&self, policy: &RetentionPolicy) -> Result<CompactionReport> {
        let mut report = CompactionReport::default();
        let mut purged: Vec<String> = Vec::new();

        for mut entry in self.lineages.iter_mut() {
            let lineage = entry.value_mut();
            report.records_before += lineage.len() as u64;
            let retained = policy.retained(lineage);
            let kept = retained.len();
            if kept == lineage.len() {
                report.records_after += kept as u64;
                continue;
            }
            let dropped_bytes: u64 = lineage[..lineage.len() - kept]
                .iter()
                .map(|record| record.payload.len() as u64)
                .sum();
            report.bytes_reclaimed += dropped_bytes;
            if kept == 0 {
                purged.push(entry.key().clone());
            } else {
                let tail = lineage.split_off(lineage.len() - kept);
                *lineage = tail;
                report.records_after += kept as u64;
            }
        }

        for key in purged {
            self.lineages.remove(&key);
            report.keys_purged += 1;
        }
        report.records_dropped = report.records_before - report.records_after;
        Ok(report)
    }

    async fn stats(&self) -> Result<StoreStats> {
        let mut stats = StoreStats::default();
        for entry in self.lineages.iter() {
            let lineage = entry.value();
            if lineage.is_empty() {
                continue;
            }
            stats.keys += 1;
            stats.records += lineage.len() as u64;
            stats.tombstones += lineage.iter().filter(|r| r.tombstone).count() as u64;
        }
        Ok(stats)
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }
}
