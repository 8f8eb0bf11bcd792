//! Testing utilities for the ButterflyFx workspace
//!
//! Shared fixtures: temp-dir stores, payload builders, lineage populators,
//! and a deterministic test lens.

#![allow(missing_docs)]

use serde_json::{json, Value};

use bfx_kernel::{Lens, LensError};
use bfx_store::{LocalStore, Srl, StoreConfig, Version};

/// A file-backed store rooted in a temp directory that lives as long as
/// the fixture does.
pub struct TempStore {
    pub dir: tempfile::TempDir,
    pub store: LocalStore,
}

impl TempStore {
    /// The configuration to reopen this store's directory after dropping
    /// `store` (lock release included).
    pub fn reopen_config(&self) -> StoreConfig {
        StoreConfig::file(self.dir.path())
    }
}

pub async fn temp_file_store() -> TempStore {
    let dir = tempfile::tempdir().expect("create temp dir");
    let store = LocalStore::open(StoreConfig::file(dir.path()))
        .await
        .expect("open file store");
    TempStore { dir, store }
}

pub async fn memory_store() -> LocalStore {
    LocalStore::open(StoreConfig::memory())
        .await
        .expect("open memory store")
}

pub fn test_srl(path: &str) -> Srl {
    format!("srl://test/{path}").parse().expect("valid test srl")
}

/// A small structured payload, distinct per `seq`
pub fn sample_payload(seq: u64) -> Value {
    json!({
        "seq": seq,
        "name": format!("sample-{seq}"),
        "tags": ["fixture", "bfx"],
        "meta": { "even": seq % 2 == 0 },
    })
}

/// Write `versions` sequential values to one lineage, returning the
/// version each landed at.
pub async fn populate(store: &LocalStore, srl: &Srl, versions: u64) -> Vec<Version> {
    let mut landed = Vec::with_capacity(versions as usize);
    for seq in 0..versions {
        let version = store
            .put(srl, &sample_payload(seq))
            .await
            .expect("populate put");
        landed.push(version);
    }
    landed
}

/// Lens projecting the `seq` field of [`sample_payload`] values
#[derive(Debug, Clone, Copy, Default)]
pub struct SeqLens;

impl Lens for SeqLens {
    fn name(&self) -> &str {
        "test:seq"
    }

    fn project(&self, value: &Value) -> Result<Value, LensError> {
        value
            .get("seq")
            .cloned()
            .ok_or_else(|| LensError::MissingField {
                path: "seq".to_string(),
                field: "seq".to_string(),
            })
    }
}
