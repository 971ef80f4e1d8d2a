//! Integration tests for the artifact store
//!
//! These tests exercise the store through the `ArtifactStore` trait, the
//! way the engine consumes it, including snapshot loading and sharing a
//! store across threads.

use metricsql_catalog::{
    Artifact, ArtifactKind, ArtifactStore, InMemoryArtifactStore, StoreError,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;

const SNAPSHOT: &str = r#"{
  "artifacts": [
    {"kind": "METRICS_VIEW", "name": "Sales", "payload": "CREATE METRICS VIEW Sales DIMENSIONS a MEASURES SUM(b) AS s FROM t"},
    {"kind": "SOURCE", "name": "clicks", "payload": "CREATE SOURCE clicks WITH ('connector' = 's3')"},
    {"kind": "METRICS_VIEW", "name": "SALES", "payload": "CREATE METRICS VIEW SALES DIMENSIONS a MEASURES MAX(b) AS m FROM t"}
  ]
}"#;

#[test]
fn snapshot_load_overwrites_duplicates() {
    let store = InMemoryArtifactStore::from_snapshot_json(SNAPSHOT).unwrap();

    assert_eq!(store.len(), 2);
    let sales = store.get(ArtifactKind::MetricsView, "sales").unwrap();
    assert_eq!(sales.name, "SALES");
    assert!(sales.payload.contains("MAX(b)"));
}

#[test]
fn snapshot_roundtrip() {
    let store = InMemoryArtifactStore::from_snapshot_json(SNAPSHOT).unwrap();
    let json = store.to_snapshot_json().unwrap();
    let reloaded = InMemoryArtifactStore::from_snapshot_json(&json).unwrap();

    assert_eq!(store.snapshot(), reloaded.snapshot());
}

#[test]
fn empty_snapshot_document() {
    let store = InMemoryArtifactStore::from_snapshot_json("{}").unwrap();
    assert!(store.is_empty());
}

#[test]
fn save_after_bulk_load_rejects_existing_name() {
    let store = InMemoryArtifactStore::from_snapshot_json(SNAPSHOT).unwrap();
    let result = store.save(Artifact::new(ArtifactKind::Source, "CLICKS", "ddl"));

    assert_eq!(
        result,
        Err(StoreError::DuplicateArtifact {
            kind: ArtifactKind::Source,
            name: "CLICKS".to_string(),
        })
    );
}

#[test]
fn concurrent_saves_admit_one_winner() {
    let store: Arc<dyn ArtifactStore> = Arc::new(InMemoryArtifactStore::new());

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                store
                    .save(Artifact::new(ArtifactKind::MetricsView, "shared", format!("ddl {i}")))
                    .is_ok()
            })
        })
        .collect();

    let winners = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .filter(|saved| *saved)
        .count();

    assert_eq!(winners, 1);
    assert_eq!(store.names_of_kind(ArtifactKind::MetricsView).len(), 1);
}
