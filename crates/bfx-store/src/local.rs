//! Single-writer store facade
//!
//! [`LocalStore`] wraps one backend with the whole read/write surface of
//! the paradigm: substrate puts and gets, lens projection with a
//! content-addressed view cache, prefix listing, Merkle history audit, and
//! compaction. The view cache is keyed by record identity, so equal
//! payloads parse and project exactly once no matter how many keys or
//! versions carry them.

use std::sync::Arc;

use moka::future::Cache;
use serde_json::Value;
use tracing::{debug, info, instrument};

use bfx_kernel::{Delta, Lens, LensRegistry, Substrate, SubstrateId};

use crate::backend::{AppendRequest, Expected, StorageBackend, StoreStats};
use crate::compact::CompactionReport;
use crate::config::{BackendKind, StoreConfig};
use crate::error::{Result, StoreError};
use crate::file::FileBackend;
use crate::history::{HistoryRoot, LineageProof, LineageTree};
use crate::index::KeyIndex;
use crate::memory::MemoryBackend;
use crate::record::{Record, VersionSummary};
use crate::srl::{Revision, Srl, Version};

/// Build the backend a configuration names
pub(crate) async fn open_backend(config: &StoreConfig) -> Result<Arc<dyn StorageBackend>> {
    Ok(match config.backend {
        BackendKind::Memory => Arc::new(MemoryBackend::new()),
        BackendKind::File => {
            Arc::new(FileBackend::open(&config.root, config.sync_on_write).await?)
        }
    })
}

/// Outcome of a full-store identity audit
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct VerifyReport {
    /// Records whose identity was recomputed
    pub records_checked: u64,
    /// `(key, version)` pairs whose payload no longer hashes to its identity
    pub mismatches: Vec<(String, Version)>,
}

impl VerifyReport {
    /// Whether every record verified
    #[inline]
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.mismatches.is_empty()
    }
}

/// Versioned substrate store for one process
pub struct LocalStore {
    backend: Arc<dyn StorageBackend>,
    index: KeyIndex,
    lenses: LensRegistry,
    views: Cache<(SubstrateId, String), Value>,
    config: StoreConfig,
}

impl LocalStore {
    /// Open the configured backend and rebuild the key index
    ///
    /// # Errors
    /// Backend open/recovery failures
    #[instrument(skip_all, fields(backend = %config.backend))]
    pub async fn open(config: StoreConfig) -> Result<Self> {
        let backend = open_backend(&config).await?;
        let store = Self {
            views: Cache::new(config.cache_capacity),
            backend,
            index: KeyIndex::new(),
            lenses: LensRegistry::with_defaults(),
            config,
        };
        store.rebuild_index().await?;
        info!(keys = store.index.len(), "store opened");
        Ok(store)
    }

    /// Wrap an already-open backend (shared with a
    /// [`CentralStore`](crate::CentralStore), typically)
    pub async fn with_backend(
        backend: Arc<dyn StorageBackend>,
        config: StoreConfig,
    ) -> Result<Self> {
        let store = Self {
            views: Cache::new(config.cache_capacity),
            backend,
            index: KeyIndex::new(),
            lenses: LensRegistry::with_defaults(),
            config,
        };
        store.rebuild_index().await?;
        Ok(store)
    }

    async fn rebuild_index(&self) -> Result<()> {
        let mut entries = Vec::new();
        for key in self.backend.keys().await? {
            if let Some(head) = self.backend.head(&key).await? {
                entries.push((key, head.version));
            }
        }
        self.index.rebuild(entries);
        Ok(())
    }

    /// The lens registry used by [`LocalStore::view_with`]
    #[must_use]
    pub fn lenses(&self) -> &LensRegistry {
        &self.lenses
    }

    /// The configuration this store was opened with
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// The shared backend handle
    #[must_use]
    pub fn backend(&self) -> Arc<dyn StorageBackend> {
        Arc::clone(&self.backend)
    }

    /// Store a structured value as the next version of `srl`'s lineage
    ///
    /// # Errors
    /// Serialization and backend failures
    pub async fn put(&self, srl: &Srl, value: &Value) -> Result<Version> {
        let payload = serde_json::to_vec(value)?;
        self.put_bytes(srl, payload).await
    }

    /// Store raw payload bytes as the next version
    ///
    /// # Errors
    /// Backend failures
    pub async fn put_bytes(&self, srl: &Srl, payload: Vec<u8>) -> Result<Version> {
        let key = srl.canonical_key();
        let version = self
            .backend
            .append(AppendRequest::live(key.clone(), payload))
            .await?;
        self.index.insert(key, version);
        debug!(%srl, %version, "put");
        Ok(version)
    }

    /// Compare-and-set write: succeed only if the head is `expected`
    /// (`None` requires the key to be absent)
    ///
    /// # Errors
    /// [`StoreError::VersionConflict`] when the head moved, plus
    /// serialization and backend failures
    pub async fn put_if(
        &self,
        srl: &Srl,
        value: &Value,
        expected: Option<Version>,
    ) -> Result<Version> {
        let payload = serde_json::to_vec(value)?;
        let key = srl.canonical_key();
        let guard = expected.map_or(Expected::Absent, Expected::At);
        let version = self
            .backend
            .append(AppendRequest::live(key.clone(), payload).expecting(guard))
            .await?;
        self.index.insert(key, version);
        Ok(version)
    }

    /// Delete a key by appending a tombstone version
    ///
    /// # Errors
    /// Backend failures
    pub async fn remove(&self, srl: &Srl) -> Result<Version> {
        let key = srl.canonical_key();
        let version = self
            .backend
            .append(AppendRequest::tombstone(key.clone()))
            .await?;
        self.index.insert(key, version);
        debug!(%srl, %version, "tombstoned");
        Ok(version)
    }

    /// Read the record an SRL refers to
    ///
    /// Head reads hide tombstoned lineages; pinned reads return whatever
    /// is retained at that version.
    ///
    /// # Errors
    /// Backend failures
    pub async fn get(&self, srl: &Srl) -> Result<Option<Record>> {
        self.backend
            .read(&srl.canonical_key(), srl.revision())
            .await
    }

    /// Read and parse a record into a [`Substrate`]
    ///
    /// Tombstones read as `None`.
    ///
    /// # Errors
    /// Backend failures, or a payload that is not valid JSON
    pub async fn get_substrate(&self, srl: &Srl) -> Result<Option<Substrate>> {
        match self.get(srl).await? {
            Some(record) if !record.tombstone => {
                Ok(Some(Substrate::from_bytes(&record.payload)?))
            }
            _ => Ok(None),
        }
    }

    /// Project a lens over the value an SRL refers to
    ///
    /// Projections are cached by `(record identity, lens name)`.
    ///
    /// # Errors
    /// Backend failures, parse failures, or the lens's projection error
    pub async fn view(&self, srl: &Srl, lens: &dyn Lens) -> Result<Option<Value>> {
        let Some(record) = self.get(srl).await? else {
            return Ok(None);
        };
        if record.tombstone {
            return Ok(None);
        }
        let cache_key = (record.identity, lens.name().to_string());
        if let Some(hit) = self.views.get(&cache_key).await {
            return Ok(Some(hit));
        }
        let substrate = Substrate::from_bytes(&record.payload)?;
        let projected = substrate.view(lens)?;
        self.views.insert(cache_key, projected.clone()).await;
        Ok(Some(projected))
    }

    /// Project through a lens resolved from the registry by name
    ///
    /// # Errors
    /// [`bfx_kernel::LensError::UnknownLens`] wrapped in
    /// [`StoreError::Lens`] when no lens has that name
    pub async fn view_with(&self, srl: &Srl, lens_name: &str) -> Result<Option<Value>> {
        let lens = self
            .lenses
            .get(lens_name)
            .ok_or_else(|| bfx_kernel::LensError::UnknownLens(lens_name.to_string()))?;
        self.view(srl, lens.as_ref()).await
    }

    /// Payload-free version listing of a lineage
    ///
    /// # Errors
    /// Backend failures
    pub async fn history(&self, srl: &Srl) -> Result<Vec<VersionSummary>> {
        self.backend.history(&srl.canonical_key()).await
    }

    /// Merkle root over the retained version chain
    ///
    /// # Errors
    /// Backend failures
    pub async fn history_root(&self, srl: &Srl) -> Result<HistoryRoot> {
        let history = self.history(srl).await?;
        Ok(LineageTree::from_history(&history).root())
    }

    /// Membership proof for one retained version
    ///
    /// # Errors
    /// Backend failures
    pub async fn prove(&self, srl: &Srl, version: Version) -> Result<Option<LineageProof>> {
        let history = self.history(srl).await?;
        let Some(index) = history.iter().position(|s| s.version == version) else {
            return Ok(None);
        };
        Ok(LineageTree::from_history(&history).prove(index))
    }

    /// Identity delta between two retained versions of one key
    ///
    /// # Errors
    /// [`StoreError::VersionAbsent`] when either version is not retained
    pub async fn delta(&self, srl: &Srl, from: Version, to: Version) -> Result<Delta> {
        let key = srl.canonical_key();
        let a = self
            .backend
            .read(&key, Revision::At(from))
            .await?
            .ok_or_else(|| StoreError::VersionAbsent {
                key: key.clone(),
                version: from,
            })?;
        let b = self
            .backend
            .read(&key, Revision::At(to))
            .await?
            .ok_or_else(|| StoreError::VersionAbsent {
                key: key.clone(),
                version: to,
            })?;
        Ok(Delta::between(a.identity, b.identity))
    }

    /// Keys under a realm whose path starts with `prefix` (empty prefix
    /// lists the whole realm), sorted
    #[must_use]
    pub fn list(&self, realm: &str, prefix: &str) -> Vec<String> {
        let full = if prefix.is_empty() {
            format!("{realm}/")
        } else {
            format!("{realm}/{prefix}")
        };
        self.index.keys_with_prefix(&full)
    }

    /// Recompute every retained record's identity
    ///
    /// # Errors
    /// Backend failures
    #[instrument(skip_all)]
    pub async fn verify(&self) -> Result<VerifyReport> {
        let mut report = VerifyReport::default();
        for key in self.backend.keys().await? {
            for summary in self.backend.history(&key).await? {
                let Some(record) = self
                    .backend
                    .read(&key, Revision::At(summary.version))
                    .await?
                else {
                    continue;
                };
                report.records_checked += 1;
                if !record.verify_identity() {
                    report.mismatches.push((key.clone(), summary.version));
                }
            }
        }
        if !report.is_clean() {
            tracing::error!(mismatches = report.mismatches.len(), "identity audit failed");
        }
        Ok(report)
    }

    /// Run compaction under the configured retention policy
    ///
    /// # Errors
    /// Backend rewrite failures
    pub async fn compact(&self) -> Result<CompactionReport> {
        let report = self.backend.compact(&self.config.retention_policy()).await?;
        self.rebuild_index().await?;
        Ok(report)
    }

    /// Force buffered state to durable storage
    ///
    /// # Errors
    /// Backend flush failures
    pub async fn flush(&self) -> Result<()> {
        self.backend.flush().await
    }

    /// Store-wide size statistics
    ///
    /// # Errors
    /// Backend read failures
    pub async fn stats(&self) -> Result<StoreStats> {
        self.backend.stats().await
    }

    /// Entries currently held by the view cache
    #[must_use]
    pub fn cached_views(&self) -> u64 {
        self.views.entry_count()
    }
}
