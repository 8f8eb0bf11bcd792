//! Multi-writer conflict resolution and the interaction between
//! compaction and lineage audit, exercised end to end through
//! [`CentralStore`] and [`LocalStore`] sharing one backend.

use serde_json::json;

use bfx_store::{
    CentralStore, LocalStore, StoreConfig, StoreError, Version,
};
use bfx_test_utils::{memory_store, populate, temp_file_store, test_srl};

#[tokio::test]
async fn strict_strategy_surfaces_lost_races() {
    let central = CentralStore::open(StoreConfig::memory()).await.unwrap();
    let srl = test_srl("ledger/balance");

    let alice = central.writer();
    let bob = central.writer();
    let first = alice.commit(&srl, b"v1".to_vec(), None).await.unwrap();
    assert_eq!(first.version, Version::FIRST);
    assert_eq!(first.attempts, 1);
    assert!(first.resolved_by.is_none());

    // Both writers base on v1; the slower one loses.
    alice
        .commit(&srl, b"alice".to_vec(), Some(first.version))
        .await
        .unwrap();
    let err = bob
        .commit(&srl, b"bob".to_vec(), Some(first.version))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::ConflictRejected { .. }));
    assert!(err.is_conflict());
}

#[tokio::test]
async fn last_writer_wins_retries_onto_the_new_head() {
    let central = CentralStore::open(
        StoreConfig::memory().with_strategy("last-writer-wins"),
    )
    .await
    .unwrap();
    let srl = test_srl("ledger/notes");

    let alice = central.writer();
    let bob = central.writer();
    let first = alice.commit(&srl, b"v1".to_vec(), None).await.unwrap();
    alice
        .commit(&srl, b"alice".to_vec(), Some(first.version))
        .await
        .unwrap();

    let receipt = bob
        .commit(&srl, b"bob".to_vec(), Some(first.version))
        .await
        .unwrap();
    assert_eq!(receipt.version, Version::new(3));
    assert_eq!(receipt.attempts, 2);
    assert_eq!(receipt.resolved_by, Some("last-writer-wins"));

    let head = central
        .backend()
        .head(&srl.canonical_key())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(head.payload, b"bob");
}

#[tokio::test]
async fn xor_rebase_merges_disjoint_edits_and_rejects_overlap() {
    let central =
        CentralStore::open(StoreConfig::memory().with_strategy("xor-rebase"))
            .await
            .unwrap();
    let srl = test_srl("ledger/merged");

    let alice = central.writer();
    let bob = central.writer();
    let base = alice
        .commit(&srl, b"aaaaaaaa".to_vec(), None)
        .await
        .unwrap();

    // Alice edits the first byte, Bob the last; the rebase keeps both.
    alice
        .commit(&srl, b"Xaaaaaaa".to_vec(), Some(base.version))
        .await
        .unwrap();
    let receipt = bob
        .commit(&srl, b"aaaaaaaY".to_vec(), Some(base.version))
        .await
        .unwrap();
    assert_eq!(receipt.resolved_by, Some("xor-rebase"));

    let head = central
        .backend()
        .head(&srl.canonical_key())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(head.payload, b"XaaaaaaY");

    // A third writer touching the same byte as the head cannot merge.
    let carol = central.writer();
    let err = carol
        .commit(&srl, b"Zaaaaaaa".to_vec(), Some(base.version))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::ConflictRejected { .. }));
}

#[tokio::test]
async fn commit_against_an_absent_key_reports_no_head() {
    let central = CentralStore::open(StoreConfig::memory()).await.unwrap();
    let srl = test_srl("ledger/missing");

    let err = central
        .writer()
        .commit(&srl, b"payload".to_vec(), Some(Version::new(4)))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::VersionConflict { head: None, .. }
    ));
}

#[tokio::test]
async fn guarded_remove_refuses_a_moved_head() {
    let central = CentralStore::open(StoreConfig::memory()).await.unwrap();
    let srl = test_srl("ledger/doomed");
    let writer = central.writer();

    let first = writer.commit(&srl, b"v1".to_vec(), None).await.unwrap();
    writer
        .commit(&srl, b"v2".to_vec(), Some(first.version))
        .await
        .unwrap();

    let err = writer.remove(&srl, first.version).await.unwrap_err();
    assert!(matches!(err, StoreError::VersionConflict { .. }));
    let removed = writer.remove(&srl, Version::new(2)).await.unwrap();
    assert_eq!(removed, Version::new(3));
}

#[tokio::test]
async fn put_if_enforces_absence_and_exact_version() {
    let store = memory_store().await;
    let srl = test_srl("ledger/guarded");

    let v1 = store.put_if(&srl, &json!({"n": 1}), None).await.unwrap();
    assert_eq!(v1, Version::FIRST);

    // A second create-if-absent loses.
    let err = store.put_if(&srl, &json!({"n": 2}), None).await.unwrap_err();
    assert!(matches!(err, StoreError::VersionConflict { .. }));

    let v2 = store.put_if(&srl, &json!({"n": 2}), Some(v1)).await.unwrap();
    let err = store
        .put_if(&srl, &json!({"n": 3}), Some(v1))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::VersionConflict { .. }));
    assert_eq!(v2, Version::new(2));
}

#[tokio::test]
async fn history_proofs_verify_against_the_root() {
    let store = memory_store().await;
    let srl = test_srl("audit/lineage");
    populate(&store, &srl, 5).await;

    let root = store.history_root(&srl).await.unwrap();
    assert!(!root.is_empty());

    let history = store.history(&srl).await.unwrap();
    for summary in &history {
        let proof = store.prove(&srl, summary.version).await.unwrap().unwrap();
        assert!(proof.verify(&root));
        assert!(proof.matches(summary));
    }

    // Proving a version the lineage never had yields nothing.
    assert!(store.prove(&srl, Version::new(99)).await.unwrap().is_none());

    // Appending changes the root; old proofs no longer verify.
    let proof = store.prove(&srl, Version::FIRST).await.unwrap().unwrap();
    store.put(&srl, &json!({"more": true})).await.unwrap();
    let new_root = store.history_root(&srl).await.unwrap();
    assert_ne!(root, new_root);
    assert!(!proof.verify(&new_root));
}

#[tokio::test]
async fn compaction_reroots_the_lineage() {
    let fixture = temp_file_store().await;
    let srl = test_srl("audit/compacted");
    populate(&fixture.store, &srl, 6).await;
    let full_root = fixture.store.history_root(&srl).await.unwrap();

    let store = LocalStore::with_backend(
        fixture.store.backend(),
        StoreConfig::file(fixture.dir.path()).with_retention(Some(3), false),
    )
    .await
    .unwrap();
    store.compact().await.unwrap();

    // The root covers retained versions only, and proofs still work
    // for them.
    let compact_root = store.history_root(&srl).await.unwrap();
    assert_ne!(full_root, compact_root);
    let proof = store.prove(&srl, Version::new(6)).await.unwrap().unwrap();
    assert!(proof.verify(&compact_root));
    assert!(store.prove(&srl, Version::FIRST).await.unwrap().is_none());
}

#[tokio::test]
async fn central_and_local_stores_share_one_backend() {
    let fixture = temp_file_store().await;
    let central =
        CentralStore::with_backend(fixture.store.backend(), fixture.store.config())
            .unwrap();
    let srl = test_srl("shared/doc");

    let receipt = central
        .writer()
        .commit(&srl, serde_json::to_vec(&json!({"via": "central"})).unwrap(), None)
        .await
        .unwrap();

    let record = fixture.store.get(&srl).await.unwrap().unwrap();
    assert_eq!(record.version, receipt.version);
    assert_eq!(record.identity, receipt.identity);
}
