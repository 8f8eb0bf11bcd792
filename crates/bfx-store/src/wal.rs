//! Write-ahead log
//!
//! Appends are JSON lines, one [`Record`] per line with the payload hex
//! encoded. Each entry carries the payload's substrate identity, so replay
//! can validate every entry without any external checksum. A corrupt or
//! half-written tail is truncated at the last valid entry; everything
//! before it is trusted.

use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::Result;
use crate::record::Record;

/// Append-only record log with per-entry identity validation
#[derive(Debug)]
pub(crate) struct WriteAheadLog {
    path: PathBuf,
    sync_on_write: bool,
    file: Mutex<File>,
}

impl WriteAheadLog {
    /// Open (or create) the log and replay its valid prefix.
    ///
    /// Returns the log handle and the records recovered from it, in append
    /// order. A damaged tail is truncated in place with a warning.
    pub(crate) async fn open(
        path: impl AsRef<Path>,
        sync_on_write: bool,
    ) -> Result<(Self, Vec<Record>)> {
        let path = path.as_ref().to_path_buf();
        let (records, valid_len, total_len) = replay(&path).await?;

        if valid_len < total_len {
            warn!(
                path = %path.display(),
                valid_bytes = valid_len,
                total_bytes = total_len,
                "truncating corrupt wal tail"
            );
            let file = OpenOptions::new().write(true).open(&path).await?;
            file.set_len(valid_len).await?;
            file.sync_all().await?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        debug!(path = %path.display(), records = records.len(), "wal opened");
        Ok((
            Self {
                path,
                sync_on_write,
                file: Mutex::new(file),
            },
            records,
        ))
    }

    /// Append one record; fsyncs when `sync_on_write` is set
    pub(crate) async fn append(&self, record: &Record) -> Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let mut file = self.file.lock().await;
        file.write_all(&line).await?;
        if self.sync_on_write {
            file.sync_all().await?;
        }
        Ok(())
    }

    /// Force buffered entries to disk
    pub(crate) async fn flush(&self) -> Result<()> {
        let mut file = self.file.lock().await;
        file.flush().await?;
        file.sync_all().await?;
        Ok(())
    }

    /// Drop every entry (called after a segment has been published)
    pub(crate) async fn truncate(&self) -> Result<()> {
        let file = self.file.lock().await;
        file.set_len(0).await?;
        file.sync_all().await?;
        Ok(())
    }

    /// Current size in bytes
    pub(crate) async fn size_bytes(&self) -> Result<u64> {
        let file = self.file.lock().await;
        Ok(file.metadata().await?.len())
    }

    /// Path of the log file
    #[allow(dead_code)]
    pub(crate) fn path(&self) -> &Path {
        &self.path
    }
}

/// Read the log, returning the valid records, the byte length of the valid
/// prefix, and the total file length.
async fn replay(path: &Path) -> Result<(Vec<Record>, u64, u64)> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Ok((Vec::new(), 0, 0));
        }
        Err(err) => return Err(err.into()),
    };

    let total_len = bytes.len() as u64;
    let mut records = Vec::new();
    let mut valid_len = 0u64;
    let mut offset = 0usize;

    while offset < bytes.len() {
        let Some(rel) = bytes[offset..].iter().position(|&b| b == b'\n') else {
            // Incomplete final line: a crash mid-append. The prefix stands.
            break;
        };
        let line = &bytes[offset..offset + rel];
        let Ok(record) = serde_json::from_slice::<Record>(line) else {
            break;
        };
        if !record.verify_identity() {
            break;
        }
        offset += rel + 1;
        valid_len = offset as u64;
        records.push(record);
    }

    Ok((records, valid_len, total_len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::srl::Version;

    fn sample(version: u64, payload: &[u8]) -> Record {
        Record::live("app/doc", Version::new(version), payload.to_vec(), None)
    }

    #[tokio::test]
    async fn append_then_reopen_replays() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wal.log");

        {
            let (wal, replayed) = WriteAheadLog::open(&path, true).await.unwrap();
            assert!(replayed.is_empty());
            wal.append(&sample(1, b"one")).await.unwrap();
            wal.append(&sample(2, b"two")).await.unwrap();
        }

        let (_, replayed) = WriteAheadLog::open(&path, true).await.unwrap();
        assert_eq!(replayed.len(), 2);
        assert_eq!(replayed[0].payload, b"one");
        assert_eq!(replayed[1].version, Version::new(2));
    }

    #[tokio::test]
    async fn corrupt_tail_is_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wal.log");

        {
            let (wal, _) = WriteAheadLog::open(&path, true).await.unwrap();
            wal.append(&sample(1, b"keep")).await.unwrap();
        }
        // Simulate a torn write after the valid entry.
        let mut bytes = std::fs::read(&path).unwrap();
        bytes.extend_from_slice(b"{\"key\": \"app/doc\", garbage");
        std::fs::write(&path, &bytes).unwrap();

        let (wal, replayed) = WriteAheadLog::open(&path, true).await.unwrap();
        assert_eq!(replayed.len(), 1);
        assert_eq!(replayed[0].payload, b"keep");

        // The file itself was repaired; appends continue cleanly.
        wal.append(&sample(2, b"after")).await.unwrap();
        drop(wal);
        let (_, replayed) = WriteAheadLog::open(&path, true).await.unwrap();
        assert_eq!(replayed.len(), 2);
    }

    #[tokio::test]
    async fn tampered_entry_cuts_replay() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wal.log");

        {
            let (wal, _) = WriteAheadLog::open(&path, true).await.unwrap();
            wal.append(&sample(1, b"good")).await.unwrap();
            let mut forged = sample(2, b"evil");
            forged.identity = bfx_kernel::SubstrateId::new(0xbad);
            // Write the forged entry through the raw file path.
            let mut line = serde_json::to_vec(&forged).unwrap();
            line.push(b'\n');
            let mut file = std::fs::OpenOptions::new()
                .append(true)
                .open(&path)
                .unwrap();
            std::io::Write::write_all(&mut file, &line).unwrap();
        }

        let (_, replayed) = WriteAheadLog::open(&path, true).await.unwrap();
        assert_eq!(replayed.len(), 1);
    }

    #[tokio::test]
    async fn truncate_empties_the_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wal.log");

        let (wal, _) = WriteAheadLog::open(&path, false).await.unwrap();
        wal.append(&sample(1, b"x")).await.unwrap();
        wal.flush().await.unwrap();
        assert!(wal.size_bytes().await.unwrap() > 0);

        wal.truncate().await.unwrap();
        assert_eq!(wal.size_bytes().await.unwrap(), 0);
        drop(wal);

        let (_, replayed) = WriteAheadLog::open(&path, false).await.unwrap();
        assert!(replayed.is_empty());
    }
}
