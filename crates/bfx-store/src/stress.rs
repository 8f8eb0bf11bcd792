//! Seeded multi-writer stress workload
//!
//! Drives a [`CentralStore`] with several concurrent writers committing
//! random payloads to a shared key set, then audits the result: every
//! retained record must hash to its identity and every lineage must be a
//! gap-free version chain. Deterministic per seed, up to task scheduling;
//! the audit holds for any interleaving.

use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use tracing::{info, instrument};

use crate::central::CentralStore;
use crate::error::{Result, StoreError};
use crate::srl::{Revision, Srl, Version};

/// Shape of one stress run
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct StressConfig {
    /// Distinct keys the writers contend over
    pub keys: usize,
    /// Total commits across all writers
    pub commits: u64,
    /// Concurrent writer tasks
    pub writers: usize,
    /// Seed for the per-writer RNGs
    pub seed: u64,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            keys: 16,
            commits: 1_000,
            writers: 4,
            seed: 42,
        }
    }
}

/// Outcome of a stress run
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct StressReport {
    /// Commits that landed
    pub commits_applied: u64,
    /// Commits the strategy rejected
    pub commits_rejected: u64,
    /// Commits that ran out of attempts
    pub commits_exhausted: u64,
    /// Compare-and-append attempts across all commits
    pub attempts_total: u64,
    /// Records audited after the run
    pub records_audited: u64,
    /// Identity or lineage violations found by the audit
    pub violations: u64,
}

impl StressReport {
    /// Whether the run finished with a clean audit
    #[must_use]
    pub fn passed(&self) -> bool {
        self.violations == 0
    }

    /// Human-readable summary
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "applied {} / rejected {} / exhausted {} commits ({} attempts), \
             audited {} records, {} violations: {}",
            self.commits_applied,
            self.commits_rejected,
            self.commits_exhausted,
            self.attempts_total,
            self.records_audited,
            self.violations,
            if self.passed() { "PASS" } else { "FAIL" }
        )
    }
}

fn stress_srl(key: usize) -> Srl {
    format!("srl://stress/key-{key:04}")
        .parse()
        .expect("stress srl is well-formed")
}

/// Run a seeded workload against `store` and audit the result
///
/// # Errors
/// Backend failures; strategy rejections and exhausted retries are
/// counted, not raised
#[instrument(skip(store))]
pub async fn run(store: CentralStore, config: StressConfig) -> Result<StressReport> {
    let writers = config.writers.max(1);
    let per_writer = config.commits / writers as u64;
    let remainder = config.commits % writers as u64;

    let mut tasks = Vec::with_capacity(writers);
    for writer_index in 0..writers {
        let store = store.clone();
        let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(writer_index as u64));
        let keys = config.keys.max(1);
        // The first `remainder` writers take one extra commit so the run
        // performs exactly `config.commits` in total.
        let quota = per_writer + u64::from((writer_index as u64) < remainder);
        tasks.push(tokio::spawn(async move {
            let writer = store.writer();
            let mut partial = StressReport::default();
            for _ in 0..quota {
                let key = rng.random_range(0..keys);
                let srl = stress_srl(key);
                let mut payload = vec![0u8; 32];
                rng.fill_bytes(&mut payload);

                // Base the commit on whatever head this writer observes;
                // the race between observe and commit is the point.
                let base = store
                    .backend()
                    .head(&srl.canonical_key())
                    .await?
                    .map(|record| record.version);

                match writer.commit(&srl, payload, base).await {
                    Ok(receipt) => {
                        partial.commits_applied += 1;
                        partial.attempts_total += u64::from(receipt.attempts);
                    }
                    Err(StoreError::ConflictRejected { .. }) => {
                        partial.commits_rejected += 1;
                    }
                    Err(StoreError::AttemptsExhausted { .. }) => {
                        partial.commits_exhausted += 1;
                    }
                    Err(err) => return Err(err),
                }
            }
            Ok(partial)
        }));
    }

    let mut report = StressReport::default();
    for task in tasks {
        let partial = task.await.expect("stress writer task panicked")?;
        report.commits_applied += partial.commits_applied;
        report.commits_rejected += partial.commits_rejected;
        report.commits_exhausted += partial.commits_exhausted;
        report.attempts_total += partial.attempts_total;
    }

    audit(&store, &mut report).await?;
    info!(summary = %report.summary(), "stress run finished");
    Ok(report)
}

/// Re-check every lineage: identities must verify and version chains must
/// be gap-free from 1
async fn audit(store: &CentralStore, report: &mut StressReport) -> Result<()> {
    let backend = store.backend();
    for key in backend.keys().await? {
        let history = backend.history(&key).await?;
        for (index, summary) in history.iter().enumerate() {
            report.records_audited += 1;
            if summary.version != Version::new(index as u64 + 1) {
                report.violations += 1;
                continue;
            }
            let Some(record) = backend.read(&key, Revision::At(summary.version)).await? else {
                report.violations += 1;
                continue;
            };
            if !record.verify_identity() {
                report.violations += 1;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn contended_run_passes_audit() {
        let store = CentralStore::open(
            StoreConfig::memory()
                .with_strategy("last-writer-wins")
                .with_max_commit_attempts(16),
        )
        .await
        .unwrap();

        let report = run(
            store,
            StressConfig {
                keys: 4,
                commits: 400,
                writers: 4,
                seed: 7,
            },
        )
        .await
        .unwrap();

        assert!(report.passed(), "{}", report.summary());
        assert_eq!(report.commits_applied, 400);
        assert!(report.attempts_total >= report.commits_applied);
        assert!(report.records_audited >= report.commits_applied);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn commit_count_is_exact_when_writers_do_not_divide_it() {
        let store = CentralStore::open(
            StoreConfig::memory()
                .with_strategy("last-writer-wins")
                .with_max_commit_attempts(16),
        )
        .await
        .unwrap();

        let report = run(
            store,
            StressConfig {
                keys: 4,
                commits: 1_000,
                writers: 3,
                seed: 23,
            },
        )
        .await
        .unwrap();

        assert!(report.passed(), "{}", report.summary());
        assert_eq!(
            report.commits_applied + report.commits_rejected + report.commits_exhausted,
            1_000
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn strict_run_counts_rejections() {
        let store = CentralStore::open(StoreConfig::memory().with_strategy("strict"))
            .await
            .unwrap();

        let report = run(
            store,
            StressConfig {
                keys: 2,
                commits: 200,
                writers: 4,
                seed: 11,
            },
        )
        .await
        .unwrap();

        // Whatever got rejected, the surviving lineages are intact.
        assert!(report.passed(), "{}", report.summary());
        assert_eq!(
            report.commits_applied + report.commits_rejected + report.commits_exhausted,
            200
        );
    }
}
