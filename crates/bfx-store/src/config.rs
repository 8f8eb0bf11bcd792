//! Store configuration
//!
//! [`StoreConfig`] selects the backend and tunes durability, caching,
//! retention, and conflict handling. All fields have workable defaults;
//! the CLI loads overrides from a TOML file.

use std::fmt::{self, Display, Formatter};
use std::path::PathBuf;

use crate::compact::RetentionPolicy;

/// Which backend a store runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// Ephemeral in-process backend
    #[default]
    Memory,
    /// Durable backend (write-ahead log plus segment files)
    File,
}

impl Display for BackendKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => write!(f, "memory"),
            Self::File => write!(f, "file"),
        }
    }
}

/// Configuration for opening a store
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Backend selection
    pub backend: BackendKind,
    /// Root directory for durable backends
    pub root: PathBuf,
    /// Fsync the log on every append
    pub sync_on_write: bool,
    /// Capacity of the lens view cache (entries)
    pub cache_capacity: u64,
    /// Versions retained per key by compaction; `None` keeps all
    pub retain_versions: Option<u64>,
    /// Drop tombstoned lineages entirely during compaction
    pub purge_tombstones: bool,
    /// Compare-and-append retries before a commit gives up
    pub max_commit_attempts: u32,
    /// Conflict resolution strategy name
    pub strategy: String,
}

impl StoreConfig {
    /// Configuration with defaults (memory backend)
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Memory-backed configuration
    #[must_use]
    pub fn memory() -> Self {
        Self::new()
    }

    /// File-backed configuration rooted at `root`
    #[must_use]
    pub fn file(root: impl Into<PathBuf>) -> Self {
        Self {
            backend: BackendKind::File,
            root: root.into(),
            ..Self::default()
        }
    }

    /// Set per-append fsync behavior
    #[must_use]
    pub fn with_sync_on_write(mut self, sync: bool) -> Self {
        self.sync_on_write = sync;
        self
    }

    /// Set the view cache capacity
    #[must_use]
    pub fn with_cache_capacity(mut self, entries: u64) -> Self {
        self.cache_capacity = entries;
        self
    }

    /// Set version retention for compaction
    #[must_use]
    pub fn with_retention(mut self, retain_versions: Option<u64>, purge_tombstones: bool) -> Self {
        self.retain_versions = retain_versions;
        self.purge_tombstones = purge_tombstones;
        self
    }

    /// Set the commit retry bound
    #[must_use]
    pub fn with_max_commit_attempts(mut self, attempts: u32) -> Self {
        self.max_commit_attempts = attempts.max(1);
        self
    }

    /// Set the conflict resolution strategy by registry name
    #[must_use]
    pub fn with_strategy(mut self, name: impl Into<String>) -> Self {
        self.strategy = name.into();
        self
    }

    /// The retention policy this configuration implies
    #[must_use]
    pub fn retention_policy(&self) -> RetentionPolicy {
        let policy = self
            .retain_versions
            .map_or_else(RetentionPolicy::keep_all, RetentionPolicy::keep_last);
        policy.with_purge_tombstones(self.purge_tombstones)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Memory,
            root: PathBuf::from("bfx-data"),
            sync_on_write: true,
            cache_capacity: 1024,
            retain_versions: None,
            purge_tombstones: false,
            max_commit_attempts: 5,
            strategy: "strict".to_string(),
        }
    }
}
