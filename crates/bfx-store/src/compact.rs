//! Retention policies and compaction reporting
//!
//! Compaction trims each lineage to its retained tail and consolidates
//! durable state. The policy decides what survives; the backends decide
//! how the survivors are rewritten.

use crate::record::Record;

/// What compaction keeps of each lineage
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RetentionPolicy {
    /// Number of newest versions to retain per key
    retain_versions: u64,
    /// Drop whole lineages whose head is a tombstone
    purge_tombstones: bool,
}

impl RetentionPolicy {
    /// Retain every version (compaction still consolidates storage)
    #[must_use]
    pub const fn keep_all() -> Self {
        Self {
            retain_versions: u64::MAX,
            purge_tombstones: false,
        }
    }

    /// Retain the newest `n` versions per key (at least one)
    #[must_use]
    pub const fn keep_last(n: u64) -> Self {
        let retain = if n == 0 { 1 } else { n };
        Self {
            retain_versions: retain,
            purge_tombstones: false,
        }
    }

    /// Also drop lineages whose newest version is a tombstone
    #[must_use]
    pub const fn with_purge_tombstones(mut self, purge: bool) -> Self {
        self.purge_tombstones = purge;
        self
    }

    /// Versions retained per key
    #[inline]
    #[must_use]
    pub const fn retain_versions(&self) -> u64 {
        self.retain_versions
    }

    /// Whether tombstoned lineages are purged entirely
    #[inline]
    #[must_use]
    pub const fn purge_tombstones(&self) -> bool {
        self.purge_tombstones
    }

    /// The retained suffix of a lineage sorted by ascending version.
    ///
    /// Empty when the lineage is purged (tombstoned head under a purging
    /// policy).
    #[must_use]
    pub fn retained<'a>(&self, lineage: &'a [Record]) -> &'a [Record] {
        if lineage.is_empty() {
            return lineage;
        }
        if self.purge_tombstones && lineage[lineage.len() - 1].tombstone {
            return &lineage[lineage.len()..];
        }
        let keep = usize::try_from(self.retain_versions).unwrap_or(usize::MAX);
        let start = lineage.len().saturating_sub(keep);
        &lineage[start..]
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::keep_all()
    }
}

/// What a compaction pass did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CompactionReport {
    /// Records present before the pass
    pub records_before: u64,
    /// Records retained after the pass
    pub records_after: u64,
    /// Records dropped by retention
    pub records_dropped: u64,
    /// Lineages removed entirely (tombstone purge)
    pub keys_purged: u64,
    /// Durable segment files deleted
    pub segments_removed: u64,
    /// Approximate bytes no longer stored
    pub bytes_reclaimed: u64,
}
