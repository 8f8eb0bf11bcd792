//! Immutable segment snapshots
//!
//! Compaction rewrites the retained records into one numbered segment file
//! under `segments/`. Segments are written to a temp file, fsynced, and
//! renamed into place; only then do they count. On open, segments load in
//! sequence order before the write-ahead log replays on top of them.
//!
//! Unlike the log, a segment is produced whole by a completed compaction.
//! Damage here is not a torn tail to shrug off; it is a hard corruption
//! error.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Result, StoreError};
use crate::record::Record;

const SEGMENT_SUFFIX: &str = ".seg";
const SEGMENT_PREFIX: &str = "segment-";

/// Serialized body of one segment file
#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct SegmentBody {
    sequence: u64,
    records: Vec<Record>,
}

/// The numbered segment files of one store directory
#[derive(Debug)]
pub(crate) struct SegmentSet {
    dir: PathBuf,
    sequences: parking_lot::Mutex<Vec<u64>>,
}

impl SegmentSet {
    /// Scan (and create) the segment directory
    pub(crate) async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;

        let mut sequences = Vec::new();
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(seq) = parse_sequence(name) {
                sequences.push(seq);
            }
        }
        sequences.sort_unstable();

        debug!(dir = %dir.display(), segments = sequences.len(), "segment set opened");
        Ok(Self {
            dir,
            sequences: parking_lot::Mutex::new(sequences),
        })
    }

    /// Load every segment's records, oldest segment first.
    ///
    /// # Errors
    /// [`StoreError::Corrupt`] if any segment fails to parse or contains a
    /// record whose payload does not hash to its identity
    pub(crate) async fn load_all(&self) -> Result<Vec<Record>> {
        let sequences = self.sequences.lock().clone();
        let mut records = Vec::new();
        for seq in sequences {
            let path = self.segment_path(seq);
            let bytes = tokio::fs::read(&path).await?;
            let body: SegmentBody =
                serde_json::from_slice(&bytes).map_err(|err| StoreError::Corrupt {
                    context: format!("segment {}: {err}", path.display()),
                })?;
            for record in &body.records {
                if !record.verify_identity() {
                    return Err(StoreError::Corrupt {
                        context: format!(
                            "segment {}: identity mismatch on '{}' {}",
                            path.display(),
                            record.key,
                            record.version
                        ),
                    });
                }
            }
            records.extend(body.records);
        }
        Ok(records)
    }

    /// Publish a new segment holding `records`.
    ///
    /// The body is written to a temp file, fsynced, then renamed into
    /// place. Returns the new sequence number.
    pub(crate) async fn publish(&self, records: Vec<Record>) -> Result<u64> {
        let sequence = self.sequences.lock().last().copied().unwrap_or(0) + 1;
        let body = SegmentBody { sequence, records };
        let bytes = serde_json::to_vec(&body)?;

        let path = self.segment_path(sequence);
        let tmp = path.with_extension("seg.tmp");
        {
            let mut file = tokio::fs::File::create(&tmp).await?;
            tokio::io::AsyncWriteExt::write_all(&mut file, &bytes).await?;
            file.sync_all().await?;
        }
        tokio::fs::rename(&tmp, &path).await?;

        self.sequences.lock().push(sequence);
        info!(sequence, bytes = bytes.len(), "segment published");
        Ok(sequence)
    }

    /// Delete every segment older than `sequence`, returning how many
    pub(crate) async fn remove_older_than(&self, sequence: u64) -> Result<u64> {
        let stale: Vec<u64> = {
            let mut sequences = self.sequences.lock();
            let stale: Vec<u64> = sequences.iter().copied().filter(|&s| s < sequence).collect();
            sequences.retain(|&s| s >= sequence);
            stale
        };
        let removed = stale.len() as u64;
        for seq in stale {
            tokio::fs::remove_file(self.segment_path(seq)).await?;
        }
        Ok(removed)
    }

    /// Total size of the live segment files in bytes
    pub(crate) async fn total_bytes(&self) -> Result<u64> {
        let sequences = self.sequences.lock().clone();
        let mut total = 0u64;
        for seq in sequences {
            total += tokio::fs::metadata(self.segment_path(seq)).await?.len();
        }
        Ok(total)
    }

    /// Number of live segments
    pub(crate) fn count(&self) -> usize {
        self.sequences.lock().len()
    }

    fn segment_path(&self, sequence: u64) -> PathBuf {
        self.dir
            .join(format!("{SEGMENT_PREFIX}{sequence:08}{SEGMENT_SUFFIX}"))
    }
}

fn parse_sequence(name: &str) -> Option<u64> {
    name.strip_prefix(SEGMENT_PREFIX)?
        .strip_suffix(SEGMENT_SUFFIX)?
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::srl::Version;

    fn records(n: u64) -> Vec<Record> {
        (1..=n)
            .map(|v| Record::live("app/doc", Version::new(v), vec![v as u8; 8], None))
            .collect()
    }

    #[tokio::test]
    async fn publish_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let segments = SegmentSet::open(dir.path()).await.unwrap();
        assert_eq!(segments.count(), 0);

        let seq = segments.publish(records(3)).await.unwrap();
        assert_eq!(seq, 1);

        let reopened = SegmentSet::open(dir.path()).await.unwrap();
        assert_eq!(reopened.count(), 1);
        let loaded = reopened.load_all().await.unwrap();
        assert_eq!(loaded.len(), 3);
        assert!(loaded.iter().all(Record::verify_identity));
    }

    #[tokio::test]
    async fn sequences_increase() {
        let dir = tempfile::tempdir().unwrap();
        let segments = SegmentSet::open(dir.path()).await.unwrap();
        assert_eq!(segments.publish(records(1)).await.unwrap(), 1);
        assert_eq!(segments.publish(records(2)).await.unwrap(), 2);

        let loaded = segments.load_all().await.unwrap();
        assert_eq!(loaded.len(), 3);
    }

    #[tokio::test]
    async fn remove_older_than_keeps_newest() {
        let dir = tempfile::tempdir().unwrap();
        let segments = SegmentSet::open(dir.path()).await.unwrap();
        segments.publish(records(1)).await.unwrap();
        segments.publish(records(1)).await.unwrap();
        let newest = segments.publish(records(1)).await.unwrap();

        let removed = segments.remove_older_than(newest).await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(segments.count(), 1);
        assert_eq!(segments.load_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn corrupt_segment_is_a_hard_error() {
        let dir = tempfile::tempdir().unwrap();
        let segments = SegmentSet::open(dir.path()).await.unwrap();
        segments.publish(records(2)).await.unwrap();

        std::fs::write(dir.path().join("segment-00000001.seg"), b"not json").unwrap();

        let reopened = SegmentSet::open(dir.path()).await.unwrap();
        let result = reopened.load_all().await;
        assert!(matches!(result, Err(StoreError::Corrupt { .. })));
    }

    #[tokio::test]
    async fn tampered_record_is_a_hard_error() {
        let dir = tempfile::tempdir().unwrap();
        let segments = SegmentSet::open(dir.path()).await.unwrap();

        let mut forged = records(1);
        forged[0].identity = bfx_kernel::SubstrateId::new(0xbad);
        let body = SegmentBody {
            sequence: 1,
            records: forged,
        };
        std::fs::write(
            dir.path().join("segment-00000001.seg"),
            serde_json::to_vec(&body).unwrap(),
        )
        .unwrap();

        let reopened = SegmentSet::open(dir.path()).await.unwrap();
        let result = reopened.load_all().await;
        assert!(matches!(result, Err(StoreError::Corrupt { .. })));
    }

    #[tokio::test]
    async fn stray_files_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("README"), b"x").unwrap();
        std::fs::write(dir.path().join("segment-bad.seg"), b"x").unwrap();
        let segments = SegmentSet::open(dir.path()).await.unwrap();
        assert_eq!(segments.count(), 0);
    }
}
