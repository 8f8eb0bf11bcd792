//! Pluggable conflict resolution
//!
//! When a compare-and-append loses its race, the incoming write, the
//! observed head, and (when still retained) the base record are handed to
//! a [`ResolutionStrategy`]. The strategy either produces a payload to
//! retry on top of the new head or rejects the write with a reason. A
//! strategy never writes anything itself; the commit loop in
//! [`CentralStore`](crate::CentralStore) owns the retry.

use std::sync::Arc;

use dashmap::DashMap;

use bfx_kernel::rebase;

use crate::record::Record;

/// Everything a strategy can see about one conflict
#[derive(Debug)]
pub struct ConflictContext<'a> {
    /// Canonical key under contention
    pub key: &'a str,
    /// Payload the losing writer wanted to append
    pub incoming: &'a [u8],
    /// Record the writer based its change on, when still retained
    pub base: Option<&'a Record>,
    /// Head record observed after the failed append
    pub head: &'a Record,
}

/// What to do about a conflicting write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Re-attempt on top of the observed head with this payload
    Retry {
        /// Payload for the retry (possibly merged)
        payload: Vec<u8>,
    },
    /// Surface the conflict to the caller
    Reject {
        /// Why the write could not be merged
        reason: String,
    },
}

/// A named conflict resolution policy
///
/// Implementations must be deterministic: the same context always yields
/// the same resolution.
pub trait ResolutionStrategy: Send + Sync {
    /// Registry name of this strategy
    fn name(&self) -> &'static str;

    /// Decide what to do about `ctx`
    fn resolve(&self, ctx: &ConflictContext<'_>) -> Resolution;
}

/// Reject unless the write was based on the current head. The default.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrictVersioning;

impl ResolutionStrategy for StrictVersioning {
    fn name(&self) -> &'static str {
        "strict"
    }

    fn resolve(&self, ctx: &ConflictContext<'_>) -> Resolution {
        Resolution::Reject {
            reason: format!(
                "write based on {:?} but head is {}",
                ctx.base.map(|record| record.version),
                ctx.head.version
            ),
        }
    }
}

/// Always retry the incoming payload on top of the new head
#[derive(Debug, Clone, Copy, Default)]
pub struct LastWriterWins;

impl ResolutionStrategy for LastWriterWins {
    fn name(&self) -> &'static str {
        "last-writer-wins"
    }

    fn resolve(&self, ctx: &ConflictContext<'_>) -> Resolution {
        Resolution::Retry {
            payload: ctx.incoming.to_vec(),
        }
    }
}

/// Three-way XOR merge of concurrent edits
///
/// Valid only when the base record is still retained, all three payloads
/// have the same length, and the two sides changed disjoint byte
/// positions. Anything else is rejected; this strategy never silently
/// overwrites the other writer's bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct XorRebase;

impl ResolutionStrategy for XorRebase {
    fn name(&self) -> &'static str {
        "xor-rebase"
    }

    fn resolve(&self, ctx: &ConflictContext<'_>) -> Resolution {
        let Some(base) = ctx.base else {
            return Resolution::Reject {
                reason: "base version not retained".to_string(),
            };
        };
        if base.tombstone || ctx.head.tombstone {
            return Resolution::Reject {
                reason: "cannot rebase across a tombstone".to_string(),
            };
        }
        match rebase(&base.payload, ctx.incoming, &ctx.head.payload) {
            Ok(merged) => Resolution::Retry { payload: merged },
            Err(err) => Resolution::Reject {
                reason: err.to_string(),
            },
        }
    }
}

/// Concurrent registry of strategies by name
pub struct StrategyRegistry {
    strategies: DashMap<&'static str, Arc<dyn ResolutionStrategy>>,
}

impl StrategyRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self {
            strategies: DashMap::new(),
        }
    }

    /// Create a registry with the built-in strategies registered
    #[must_use]
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.register(Arc::new(StrictVersioning));
        registry.register(Arc::new(LastWriterWins));
        registry.register(Arc::new(XorRebase));
        registry
    }

    /// Register a strategy under its own name, replacing any previous entry
    pub fn register(&self, strategy: Arc<dyn ResolutionStrategy>) {
        self.strategies.insert(strategy.name(), strategy);
    }

    /// Look up a strategy by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn ResolutionStrategy>> {
        self.strategies
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Names of the registered strategies, sorted
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> =
            self.strategies.iter().map(|entry| *entry.key()).collect();
        names.sort_unstable();
        names
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::srl::Version;

    fn ctx<'a>(
        incoming: &'a [u8],
        base: Option<&'a Record>,
        head: &'a Record,
    ) -> ConflictContext<'a> {
        ConflictContext {
            key: "app/doc",
            incoming,
            base,
            head,
        }
    }

    #[test]
    fn strict_always_rejects() {
        let base = Record::live("app/doc", Version::FIRST, b"base".to_vec(), None);
        let head = Record::live("app/doc", Version::new(2), b"head".to_vec(), None);
        let resolution = StrictVersioning.resolve(&ctx(b"mine", Some(&base), &head));
        assert!(matches!(resolution, Resolution::Reject { .. }));
    }

    #[test]
    fn last_writer_wins_retries_incoming() {
        let head = Record::live("app/doc", Version::new(2), b"head".to_vec(), None);
        let resolution = LastWriterWins.resolve(&ctx(b"mine", None, &head));
        assert_eq!(
            resolution,
            Resolution::Retry {
                payload: b"mine".to_vec()
            }
        );
    }

    #[test]
    fn xor_rebase_merges_disjoint_edits() {
        let base = Record::live("app/doc", Version::FIRST, b"aaaa".to_vec(), None);
        let head = Record::live("app/doc", Version::new(2), b"aaab".to_vec(), None);
        let resolution = XorRebase.resolve(&ctx(b"baaa", Some(&base), &head));
        assert_eq!(
            resolution,
            Resolution::Retry {
                payload: b"baab".to_vec()
            }
        );
    }

    #[test]
    fn xor_rebase_rejects_overlap() {
        let base = Record::live("app/doc", Version::FIRST, b"aaaa".to_vec(), None);
        let head = Record::live("app/doc", Version::new(2), b"zaaa".to_vec(), None);
        let resolution = XorRebase.resolve(&ctx(b"qaaa", Some(&base), &head));
        assert!(matches!(resolution, Resolution::Reject { .. }));
    }

    #[test]
    fn xor_rebase_rejects_without_base() {
        let head = Record::live("app/doc", Version::new(2), b"head".to_vec(), None);
        let resolution = XorRebase.resolve(&ctx(b"mine", None, &head));
        assert!(matches!(resolution, Resolution::Reject { .. }));
    }

    #[test]
    fn xor_rebase_rejects_length_mismatch() {
        let base = Record::live("app/doc", Version::FIRST, b"aa".to_vec(), None);
        let head = Record::live("app/doc", Version::new(2), b"aaaa".to_vec(), None);
        let resolution = XorRebase.resolve(&ctx(b"bb", Some(&base), &head));
        assert!(matches!(resolution, Resolution::Reject { .. }));
    }

    #[test]
    fn xor_rebase_rejects_tombstone_head() {
        let base = Record::live("app/doc", Version::FIRST, Vec::new(), None);
        let head = Record::tombstone("app/doc", Version::new(2), None);
        let resolution = XorRebase.resolve(&ctx(b"", Some(&base), &head));
        assert!(matches!(resolution, Resolution::Reject { .. }));
    }

    #[test]
    fn registry_defaults() {
        let registry = StrategyRegistry::with_defaults();
        assert_eq!(
            registry.names(),
            vec!["last-writer-wins", "strict", "xor-rebase"]
        );
        assert!(registry.get("strict").is_some());
        assert!(registry.get("nope").is_none());
    }
}
