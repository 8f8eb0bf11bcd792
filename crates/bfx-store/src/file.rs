//! Durable file backend
//!
//! Layout of a store directory:
//!
//! ```text
//! <root>/LOCK                     exclusive lock, holder PID inside
//! <root>/wal.log                  write-ahead log (JSON lines)
//! <root>/segments/segment-*.seg   immutable compaction snapshots
//! ```
//!
//! Recovery on open loads segments in sequence order, then replays the log
//! on top; duplicate `(key, version)` pairs are skipped so a crash between
//! segment publication and log truncation replays into the same live set.
//! The full record set is mirrored in memory and the read path never
//! touches disk.
//!
//! Durability ordering for compaction: publish the new segment (write,
//! fsync, rename) before truncating the log and deleting old segments.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tracing::{info, instrument, warn};

use bfx_kernel::SubstrateId;

use crate::backend::{check_expectation, check_payload, AppendRequest, StorageBackend, StoreStats};
use crate::compact::{CompactionReport, RetentionPolicy};
use crate::config::BackendKind;
use crate::error::{Result, StoreError};
use crate::record::{Record, VersionSummary};
use crate::segment::SegmentSet;
use crate::srl::{Revision, Version};
use crate::wal::WriteAheadLog;

const LOCK_FILE: &str = "LOCK";
const WAL_FILE: &str = "wal.log";
const SEGMENT_DIR: &str = "segments";

/// Exclusive directory lock, held for the backend's lifetime
#[derive(Debug)]
struct DirLock {
    path: PathBuf,
}

impl DirLock {
    /// Atomically create the lock file, recording this process's PID.
    ///
    /// A pre-existing lock file fails the open; a lock left by a dead
    /// process must be removed by hand (the error names the path).
    fn acquire(root: &Path) -> Result<Self> {
        let path = root.join(LOCK_FILE);
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(mut file) => {
                let _ = writeln!(file, "{}", std::process::id());
                Ok(Self { path })
            }
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(StoreError::Locked {
                    path: root.to_path_buf(),
                })
            }
            Err(err) => Err(err.into()),
        }
    }
}

impl Drop for DirLock {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), %err, "failed to release lock file");
        }
    }
}

/// Write-ahead-logged backend with segment compaction
///
/// Reads run against the in-memory mirror under a sync lock; appends are
/// serialized by an async mutex so the head check, the log write, and the
/// mirror update form one atomic step.
#[derive(Debug)]
pub struct FileBackend {
    root: PathBuf,
    _lock: DirLock,
    wal: WriteAheadLog,
    segments: SegmentSet,
    lineages: RwLock<BTreeMap<String, Vec<Record>>>,
    append_lock: tokio::sync::Mutex<()>,
}

impl FileBackend {
    /// Open (or create) a store directory and recover its record set
    ///
    /// # Errors
    /// [`StoreError::Locked`] if another process holds the directory,
    /// [`StoreError::Corrupt`] if a segment is damaged, plus I/O errors
    #[instrument(skip_all, fields(root = %root.as_ref().display()))]
    pub async fn open(root: impl AsRef<Path>, sync_on_write: bool) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root).await?;
        let lock = DirLock::acquire(&root)?;

        let segments = SegmentSet::open(root.join(SEGMENT_DIR)).await?;
        let segment_records = segments.load_all().await?;
        let (wal, wal_records) = WriteAheadLog::open(root.join(WAL_FILE), sync_on_write).await?;

        let mut lineages: BTreeMap<String, Vec<Record>> = BTreeMap::new();
        let mut replayed = 0usize;
        let mut skipped = 0usize;
        for record in segment_records.into_iter().chain(wal_records) {
            let lineage = lineages.entry(record.key.clone()).or_default();
            if lineage.iter().any(|r| r.version == record.version) {
                skipped += 1;
                continue;
            }
            lineage.push(record);
            replayed += 1;
        }
        for lineage in lineages.values_mut() {
            lineage.sort_by_key(|record| record.version);
        }

        info!(
            keys = lineages.len(),
            records = replayed,
            duplicates_skipped = skipped,
            segments = segments.count(),
            "file backend recovered"
        );

        Ok(Self {
            root,
            _lock: lock,
            wal,
            segments,
            lineages: RwLock::new(lineages),
            append_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// The store's root directory
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait::async_trait]
impl StorageBackend for FileBackend {
    async fn append(&self, request: AppendRequest) -> Result<Version> {
        check_payload(&request)?;

        // One writer at a time: the expectation check stays valid until the
        // mirror update below.
        let _guard = self.append_lock.lock().await;

        let head = self
            .lineages
            .read()
            .get(&request.key)
            .and_then(|lineage| lineage.last().map(|record| record.version));
        check_expectation(&request.key, request.expected, head)?;
        let version = head.map_or(Version::FIRST, Version::next);

        let actual = SubstrateId::of(&request.payload);
        if actual != request.identity {
            return Err(StoreError::IdentityMismatch {
                key: request.key,
                version,
                expected: request.identity,
                actual,
            });
        }

        let record = request.into_record(version);
        self.wal.append(&record).await?;

        let mut lineages = self.lineages.write();
        lineages.entry(record.key.clone()).or_default().push(record);
        Ok(version)
    }

    async fn read(&self, key: &str, revision: Revision) -> Result<Option<Record>> {
        let lineages = self.lineages.read();
        let Some(lineage) = lineages.get(key) else {
            return Ok(None);
        };
        Ok(match revision {
            Revision::Head => lineage.last().filter(|record| !record.tombstone).cloned(),
            Revision::At(version) => lineage
                .binary_search_by_key(&version, |record| record.version)
                .ok()
                .map(|idx| lineage[idx].clone()),
        })
    }

    async fn head(&self, key: &str) -> Result<Option<Record>> {
        Ok(self
            .lineages
            .read()
            .get(key)
            .and_then(|lineage| lineage.last().cloned()))
    }

    async fn history(&self, key: &str) -> Result<Vec<VersionSummary>> {
        Ok(self
            .lineages
            .read()
            .get(key)
            .map(|lineage| lineage.iter().map(Record::summary).collect())
            .unwrap_or_default())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self
            .lineages
            .read()
            .iter()
            .filter(|(_, lineage)| !lineage.is_empty())
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn flush(&self) -> Result<()> {
        self.wal.flush().await
    }

    #[instrument(skip_all)]
    async fn compact(&self, policy: &RetentionPolicy) -> Result<CompactionReport> {
        // Appends pause for the duration; reads keep running against the
        // old mirror until the swap at the end.
        let _guard = self.append_lock.lock().await;

        let snapshot = self.lineages.read().clone();
        let mut report = CompactionReport::default();
        let mut retained_map: BTreeMap<String, Vec<Record>> = BTreeMap::new();
        let mut retained_flat: Vec<Record> = Vec::new();

        for (key, lineage) in &snapshot {
            report.records_before += lineage.len() as u64;
            let retained = policy.retained(lineage);
            report.records_after += retained.len() as u64;
            report.bytes_reclaimed += lineage[..lineage.len() - retained.len()]
                .iter()
                .map(|record| record.payload.len() as u64)
                .sum::<u64>();
            if retained.is_empty() {
                report.keys_purged += 1;
                continue;
            }
            retained_map.insert(key.clone(), retained.to_vec());
            retained_flat.extend_from_slice(retained);
        }
        report.records_dropped = report.records_before - report.records_after;

        // Publish first; every crash point from here replays into the same
        // live record set.
        self.wal.flush().await?;
        let sequence = self.segments.publish(retained_flat).await?;
        self.wal.truncate().await?;
        report.segments_removed = self.segments.remove_older_than(sequence).await?;

        *self.lineages.write() = retained_map;
        info!(
            dropped = report.records_dropped,
            purged = report.keys_purged,
            segments_removed = report.segments_removed,
            "compaction finished"
        );
        Ok(report)
    }

    async fn stats(&self) -> Result<StoreStats> {
        let mut stats = StoreStats::default();
        {
            let lineages = self.lineages.read();
            for lineage in lineages.values() {
                if lineage.is_empty() {
                    continue;
                }
                stats.keys += 1;
                stats.records += lineage.len() as u64;
                stats.tombstones += lineage.iter().filter(|r| r.tombstone).count() as u64;
            }
        }
        stats.wal_bytes = self.wal.size_bytes().await?;
        stats.segment_bytes = self.segments.total_bytes().await?;
        Ok(stats)
    }

    fn kind(&self) -> BackendKind {
        BackendKind::File
    }
}
