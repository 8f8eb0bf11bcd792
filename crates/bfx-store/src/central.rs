//! Multi-writer coordination
//!
//! A [`CentralStore`] is a cheap-clone handle over one shared backend.
//! Each writer gets a [`WriterHandle`] with its own identity; commits run
//! a bounded compare-and-append loop, handing every lost race to the
//! store's [`ResolutionStrategy`](crate::ResolutionStrategy). The backend
//! stays the single point of atomicity; this layer only decides what to
//! retry.

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use bfx_kernel::SubstrateId;

use crate::backend::{AppendRequest, Expected, StorageBackend};
use crate::config::StoreConfig;
use crate::conflict::{ConflictContext, Resolution, ResolutionStrategy, StrategyRegistry};
use crate::error::{Result, StoreError};
use crate::local::open_backend;
use crate::record::WriterId;
use crate::srl::{Revision, Srl, Version};

struct Inner {
    backend: Arc<dyn StorageBackend>,
    strategies: StrategyRegistry,
    strategy: Arc<dyn ResolutionStrategy>,
    max_attempts: u32,
}

/// Shared, multi-writer store handle
#[derive(Clone)]
pub struct CentralStore {
    inner: Arc<Inner>,
}

impl CentralStore {
    /// Open the configured backend and select the configured strategy
    ///
    /// # Errors
    /// Backend open failures, or an unregistered strategy name
    pub async fn open(config: StoreConfig) -> Result<Self> {
        let backend = open_backend(&config).await?;
        Self::with_backend(backend, &config)
    }

    /// Coordinate writers over an already-open backend
    ///
    /// # Errors
    /// An unregistered strategy name in `config`
    pub fn with_backend(backend: Arc<dyn StorageBackend>, config: &StoreConfig) -> Result<Self> {
        let strategies = StrategyRegistry::with_defaults();
        let strategy = strategies
            .get(&config.strategy)
            .ok_or_else(|| StoreError::UnknownStrategy {
                name: config.strategy.clone(),
            })?;
        Ok(Self {
            inner: Arc::new(Inner {
                backend,
                strategies,
                strategy,
                max_attempts: config.max_commit_attempts.max(1),
            }),
        })
    }

    /// The same store resolving conflicts with a different strategy
    ///
    /// # Errors
    /// [`StoreError::UnknownStrategy`] if `name` is not registered
    pub fn with_strategy(&self, name: &str) -> Result<Self> {
        let strategy = self
            .inner
            .strategies
            .get(name)
            .ok_or_else(|| StoreError::UnknownStrategy {
                name: name.to_string(),
            })?;
        Ok(Self {
            inner: Arc::new(Inner {
                backend: Arc::clone(&self.inner.backend),
                strategies: StrategyRegistry::with_defaults(),
                strategy,
                max_attempts: self.inner.max_attempts,
            }),
        })
    }

    /// Name of the active conflict resolution strategy
    #[must_use]
    pub fn strategy_name(&self) -> &'static str {
        self.inner.strategy.name()
    }

    /// The shared backend handle
    #[must_use]
    pub fn backend(&self) -> Arc<dyn StorageBackend> {
        Arc::clone(&self.inner.backend)
    }

    /// Mint a writer with a fresh identity
    #[must_use]
    pub fn writer(&self) -> WriterHandle {
        WriterHandle {
            store: self.clone(),
            id: WriterId::new(),
        }
    }
}

/// What a successful commit produced
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct CommitReceipt {
    /// Version the payload landed at
    pub version: Version,
    /// Substrate identity of the committed payload
    pub identity: SubstrateId,
    /// Compare-and-append attempts it took
    pub attempts: u32,
    /// Strategy that resolved a conflict along the way, if any
    pub resolved_by: Option<&'static str>,
}

/// One writer's view of a [`CentralStore`]
#[derive(Clone)]
pub struct WriterHandle {
    store: CentralStore,
    id: WriterId,
}

impl WriterHandle {
    /// This writer's identity
    #[must_use]
    pub const fn id(&self) -> WriterId {
        self.id
    }

    /// Commit a payload on top of `base` (`None` claims the key is new)
    ///
    /// Runs up to the configured number of compare-and-append attempts,
    /// consulting the resolution strategy after every lost race.
    ///
    /// # Errors
    /// [`StoreError::ConflictRejected`] when the strategy declines to
    /// merge, [`StoreError::AttemptsExhausted`] when retries run out,
    /// [`StoreError::VersionConflict`] for a conflict with nothing to
    /// resolve against, plus backend failures
    #[instrument(skip(self, payload), fields(writer = %self.id))]
    pub async fn commit(
        &self,
        srl: &Srl,
        payload: Vec<u8>,
        base: Option<Version>,
    ) -> Result<CommitReceipt> {
        let inner = &self.store.inner;
        let key = srl.canonical_key();
        let mut payload = payload;
        let mut expected = base.map_or(Expected::Absent, Expected::At);
        let mut resolved_by = None;

        for attempt in 1..=inner.max_attempts {
            let request = AppendRequest::live(key.clone(), payload.clone())
                .by(self.id)
                .expecting(expected);
            let identity = request.identity;

            match inner.backend.append(request).await {
                Ok(version) => {
                    debug!(%srl, %version, attempt, "commit applied");
                    return Ok(CommitReceipt {
                        version,
                        identity,
                        attempts: attempt,
                        resolved_by,
                    });
                }
                Err(StoreError::VersionConflict { .. }) => {
                    let Some(head) = inner.backend.head(&key).await? else {
                        // Expected a version on a key that has none; there
                        // is no head to resolve against.
                        return Err(StoreError::VersionConflict {
                            key,
                            expected: base,
                            head: None,
                        });
                    };
                    let base_record = match base {
                        Some(version) => {
                            inner.backend.read(&key, Revision::At(version)).await?
                        }
                        None => None,
                    };
                    let resolution = inner.strategy.resolve(&ConflictContext {
                        key: &key,
                        incoming: &payload,
                        base: base_record.as_ref(),
                        head: &head,
                    });
                    match resolution {
                        Resolution::Retry { payload: merged } => {
                            debug!(%srl, head = %head.version, attempt, "conflict resolved, retrying");
                            payload = merged;
                            expected = Expected::At(head.version);
                            resolved_by = Some(inner.strategy.name());
                        }
                        Resolution::Reject { reason } => {
                            warn!(%srl, %reason, "commit rejected");
                            return Err(StoreError::ConflictRejected {
                                key,
                                strategy: inner.strategy.name().to_string(),
                                reason,
                            });
                        }
                    }
                }
                Err(err) => return Err(err),
            }
        }

        Err(StoreError::AttemptsExhausted {
            key,
            attempts: inner.max_attempts,
        })
    }

    /// Tombstone a key on top of `base`
    ///
    /// Deletions never merge; a lost race is surfaced as the conflict it
    /// is.
    ///
    /// # Errors
    /// [`StoreError::VersionConflict`] when the head moved, plus backend
    /// failures
    pub async fn remove(&self, srl: &Srl, base: Version) -> Result<Version> {
        let key = srl.canonical_key();
        self.store
            .inner
            .backend
            .append(
                AppendRequest::tombstone(key)
                    .by(self.id)
                    .expecting(Expected::At(base)),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn srl(raw: &str) -> Srl {
        raw.parse().unwrap()
    }

    async fn central(strategy: &str) -> CentralStore {
        CentralStore::open(StoreConfig::memory().with_strategy(strategy))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn fresh_commit_lands_at_version_one() {
        let store = central("strict").await;
        let writer = store.writer();
        let receipt = writer
            .commit(&srl("srl://app/doc"), b"v1".to_vec(), None)
            .await
            .unwrap();
        assert_eq!(receipt.version, Version::FIRST);
        assert_eq!(receipt.identity, SubstrateId::of(b"v1"));
        assert_eq!(receipt.attempts, 1);
        assert!(receipt.resolved_by.is_none());
    }

    #[tokio::test]
    async fn strict_rejects_stale_base() {
        let store = central("strict").await;
        let doc = srl("srl://app/doc");
        let a = store.writer();
        let b = store.writer();

        let first = a.commit(&doc, b"a1".to_vec(), None).await.unwrap();
        a.commit(&doc, b"a2".to_vec(), Some(first.version))
            .await
            .unwrap();

        // b still believes v1 is the head.
        let result = b.commit(&doc, b"b1".to_vec(), Some(first.version)).await;
        assert!(matches!(result, Err(StoreError::ConflictRejected { .. })));
    }

    #[tokio::test]
    async fn unresolvable_conflict_reports_missing_head() {
        let store = central("last-writer-wins").await;
        let result = store
            .writer()
            .commit(&srl("srl://app/ghost"), b"x".to_vec(), Some(Version::new(3)))
            .await;
        assert!(matches!(
            result,
            Err(StoreError::VersionConflict { head: None, .. })
        ));
    }

    #[tokio::test]
    async fn last_writer_wins_retries_over_new_head() {
        let store = central("last-writer-wins").await;
        let doc = srl("srl://app/doc");
        let a = store.writer();
        let b = store.writer();

        let first = a.commit(&doc, b"a1".to_vec(), None).await.unwrap();
        a.commit(&doc, b"a2".to_vec(), Some(first.version))
            .await
            .unwrap();

        let receipt = b
            .commit(&doc, b"b1".to_vec(), Some(first.version))
            .await
            .unwrap();
        assert_eq!(receipt.version, Version::new(3));
        assert_eq!(receipt.attempts, 2);
        assert_eq!(receipt.resolved_by, Some("last-writer-wins"));

        let head = store.backend().read(&doc.canonical_key(), Revision::Head)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(head.payload, b"b1");
        assert_eq!(head.writer, Some(b.id()));
    }

    #[tokio::test]
    async fn xor_rebase_merges_concurrent_disjoint_edits() {
        let store = central("xor-rebase").await;
        let doc = srl("srl://app/doc");
        let a = store.writer();
        let b = store.writer();

        let base = a.commit(&doc, b"aaaa".to_vec(), None).await.unwrap();
        // a edits byte 0, b concurrently edits byte 3 from the same base.
        a.commit(&doc, b"Xaaa".to_vec(), Some(base.version))
            .await
            .unwrap();
        let receipt = b
            .commit(&doc, b"aaaY".to_vec(), Some(base.version))
            .await
            .unwrap();

        assert_eq!(receipt.resolved_by, Some("xor-rebase"));
        let head = store.backend().read(&doc.canonical_key(), Revision::Head)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(head.payload, b"XaaY");
    }

    #[tokio::test]
    async fn xor_rebase_rejects_overlapping_edits() {
        let store = central("xor-rebase").await;
        let doc = srl("srl://app/doc");
        let a = store.writer();
        let b = store.writer();

        let base = a.commit(&doc, b"aaaa".to_vec(), None).await.unwrap();
        a.commit(&doc, b"Xaaa".to_vec(), Some(base.version))
            .await
            .unwrap();
        let result = b.commit(&doc, b"Yaaa".to_vec(), Some(base.version)).await;
        assert!(matches!(result, Err(StoreError::ConflictRejected { .. })));
    }

    #[tokio::test]
    async fn unknown_strategy_fails_open() {
        let result = CentralStore::open(StoreConfig::memory().with_strategy("nope")).await;
        assert!(matches!(result, Err(StoreError::UnknownStrategy { .. })));
    }

    #[tokio::test]
    async fn with_strategy_switches_resolution() {
        let store = central("strict").await;
        assert_eq!(store.strategy_name(), "strict");
        let relaxed = store.with_strategy("last-writer-wins").unwrap();
        assert_eq!(relaxed.strategy_name(), "last-writer-wins");
        assert!(store.with_strategy("nope").is_err());
    }

    #[tokio::test]
    async fn remove_is_strictly_guarded() {
        let store = central("last-writer-wins").await;
        let doc = srl("srl://app/doc");
        let writer = store.writer();
        let receipt = writer.commit(&doc, b"x".to_vec(), None).await.unwrap();

        let stale = writer.remove(&doc, Version::new(9)).await;
        assert!(matches!(stale, Err(StoreError::VersionConflict { .. })));

        let version = writer.remove(&doc, receipt.version).await.unwrap();
        assert_eq!(version, Version::new(2));
    }
}
