//! Tests for snapshot persistence and recovery.

use tempfile::TempDir;

use sinew::{
    Config, EmbeddedRelationshipStore, EntityType, NewRelationship, Provenance, RelationType,
    RelationshipStore, ALL_ENTITIES,
};

fn task_note(source: &str, target: &str) -> NewRelationship {
    NewRelationship::new(
        EntityType::Task,
        source,
        EntityType::Note,
        target,
        RelationType::TaskNote,
    )
}

#[tokio::test]
async fn test_snapshot_survives_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("relationships.json");

    let store = EmbeddedRelationshipStore::new().with_persistence(&path);
    store.initialize().await.unwrap();
    let kept = store.add(task_note("t1", "n1")).await.unwrap();
    let dropped = store.add(task_note("t2", "n2")).await.unwrap();
    store.remove(&dropped.id).await.unwrap();

    let reopened = EmbeddedRelationshipStore::new().with_persistence(&path);
    reopened.initialize().await.unwrap();

    let rows = reopened.query(ALL_ENTITIES, None);
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.id == kept.id));

    // Mirrors are rebuilt on load, so both endpoints answer.
    let from_note = reopened.query("n1", None);
    assert_eq!(from_note.len(), 1);
    assert_eq!(from_note[0].source_id, "n1");
    assert_eq!(from_note[0].target_id, "t1");
}

#[tokio::test]
async fn test_snapshot_holds_canonical_rows_only() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("relationships.json");

    let store = EmbeddedRelationshipStore::new().with_persistence(&path);
    store.initialize().await.unwrap();
    store.add(task_note("t1", "n1")).await.unwrap();
    store.add(task_note("t2", "n2")).await.unwrap();

    let raw = std::fs::read_to_string(&path).unwrap();
    let snapshot: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(snapshot["version"], 1);

    let rows = snapshot["relationships"].as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|row| row["canonical"].as_bool().unwrap()));
}

#[tokio::test]
async fn test_metadata_round_trips() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("relationships.json");

    let store = EmbeddedRelationshipStore::new().with_persistence(&path);
    store.initialize().await.unwrap();
    store
        .add(
            task_note("t1", "n1")
                .with_provenance(Provenance::Ai)
                .with_extra("origin", serde_json::json!("import")),
        )
        .await
        .unwrap();

    let reopened = EmbeddedRelationshipStore::new().with_persistence(&path);
    reopened.initialize().await.unwrap();

    let rows = reopened.query("t1", None);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].metadata.source, Provenance::Ai);
    assert_eq!(
        rows[0].metadata.extra.get("origin"),
        Some(&serde_json::json!("import"))
    );
}

#[tokio::test]
async fn test_from_config_places_snapshot() {
    let dir = TempDir::new().unwrap();
    let config = Config::from_str(&format!(
        r#"
        [storage]
        data_dir = "{}"
        graph_file = "graph.json"
        "#,
        dir.path().display()
    ))
    .unwrap();

    let store = EmbeddedRelationshipStore::from_config(&config);
    store.initialize().await.unwrap();
    store.add(task_note("t1", "n1")).await.unwrap();

    assert!(dir.path().join("graph.json").exists());
}

#[tokio::test]
async fn test_disabled_persistence_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let config = Config::from_str(&format!(
        r#"
        [storage]
        data_dir = "{}"
        persist = false
        "#,
        dir.path().display()
    ))
    .unwrap();
    assert!(config.graph_path().is_none());

    let store = EmbeddedRelationshipStore::from_config(&config);
    store.initialize().await.unwrap();
    store.add(task_note("t1", "n1")).await.unwrap();

    assert_eq!(store.query("t1", None).len(), 1);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}
