//! ButterflyFx Versioned Substrate Store
//!
//! Content-addressed, append-only object storage addressed by SRL
//! (`srl://realm/path@version`). Every key owns a monotonically versioned
//! lineage of immutable records; each record's payload is bound to its
//! substrate identity at ingest and re-checked on recovery and audit.
//!
//! # Architecture
//!
//! - [`StorageBackend`]: the atomic compare-and-append primitive, with
//!   [`MemoryBackend`] (ephemeral) and [`FileBackend`] (write-ahead log
//!   plus segment files, crash recovery) implementations
//! - [`LocalStore`]: single-writer facade with lens projection, a
//!   content-addressed view cache, prefix listing, Merkle history audit
//! - [`CentralStore`]: multi-writer coordination running bounded
//!   compare-and-append loops through a pluggable [`ResolutionStrategy`]
//! - [`RetentionPolicy`]: compaction keeps the newest versions per key and
//!   consolidates durable storage
//!
//! # Example
//!
//! ```rust
//! use bfx_store::{LocalStore, StoreConfig, Srl};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), bfx_store::StoreError> {
//! let store = LocalStore::open(StoreConfig::memory()).await?;
//! let srl: Srl = "srl://app/users/alice".parse()?;
//!
//! store.put(&srl, &serde_json::json!({"city": "Berlin"})).await?;
//! let record = store.get(&srl).await?.expect("just written");
//! assert!(record.verify_identity());
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod backend;
mod central;
mod compact;
mod config;
mod conflict;
mod error;
mod file;
mod history;
mod index;
mod local;
mod memory;
mod record;
mod segment;
mod srl;
pub mod stress;
mod wal;

pub use backend::{AppendRequest, Expected, StorageBackend, StoreStats};
pub use central::{CentralStore, CommitReceipt, WriterHandle};
pub use compact::{CompactionReport, RetentionPolicy};
pub use config::{BackendKind, StoreConfig};
pub use conflict::{
    ConflictContext, LastWriterWins, Resolution, ResolutionStrategy, StrategyRegistry,
    StrictVersioning, XorRebase,
};
pub use error::{Result, StoreError};
pub use file::FileBackend;
pub use history::{lineage_leaf, HistoryRoot, LineageProof, LineageTree, Sha256Hasher};
pub use index::KeyIndex;
pub use local::{LocalStore, VerifyReport};
pub use memory::MemoryBackend;
pub use record::{Record, VersionSummary, WriterId};
pub use srl::{Revision, Srl, SrlError, Version, SRL_SCHEME};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
