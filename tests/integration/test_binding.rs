//! Tests for consumer attachment and shared initialization.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use sinew::{
    ChangeBus, EmbeddedRelationshipStore, EntityRecord, EntityType, GraphEvent, NewRelationship,
    RelationType, Relationship, RelationshipBinding, RelationshipOverlay, RelationshipStore,
    Result, StoreError,
};

/// Store double counting initialization calls, optionally failing the
/// first `fail_first` of them.
struct CountingStore {
    inner: EmbeddedRelationshipStore,
    init_calls: AtomicUsize,
    fail_first: usize,
}

impl CountingStore {
    fn new(fail_first: usize) -> Self {
        Self {
            inner: EmbeddedRelationshipStore::new(),
            init_calls: AtomicUsize::new(0),
            fail_first,
        }
    }
}

#[async_trait]
impl RelationshipStore for CountingStore {
    async fn initialize(&self) -> Result<()> {
        let call = self.init_calls.fetch_add(1, Ordering::SeqCst);
        if call < self.fail_first {
            return Err(StoreError::Rejected("scripted init failure".to_string()).into());
        }
        self.inner.initialize().await
    }

    async fn add(&self, draft: NewRelationship) -> Result<Relationship> {
        self.inner.add(draft).await
    }

    async fn remove(&self, relationship_id: &str) -> Result<()> {
        self.inner.remove(relationship_id).await
    }

    fn query(
        &self,
        entity_id: &str,
        relationship_type: Option<RelationType>,
    ) -> Vec<Relationship> {
        self.inner.query(entity_id, relationship_type)
    }

    async fn resolve_related(
        &self,
        entity_id: &str,
        relationship_type: Option<RelationType>,
    ) -> Result<Vec<EntityRecord>> {
        self.inner.resolve_related(entity_id, relationship_type).await
    }
}

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
async fn test_concurrent_attaches_initialize_once() {
    let bus = Arc::new(ChangeBus::new());
    let store = Arc::new(CountingStore::new(0));
    let overlay = RelationshipOverlay::new(store.clone());

    let (a, b, c) = tokio::join!(
        RelationshipBinding::attach(overlay.clone(), Arc::clone(&bus)),
        RelationshipBinding::attach(overlay.clone(), Arc::clone(&bus)),
        RelationshipBinding::attach(overlay.clone(), Arc::clone(&bus)),
    );
    a.unwrap();
    b.unwrap();
    c.unwrap();

    assert_eq!(store.init_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failed_attach_releases_subscriptions_and_can_retry() {
    let bus = Arc::new(ChangeBus::new());
    let store = Arc::new(CountingStore::new(1));
    let overlay = RelationshipOverlay::new(store.clone());

    let err = RelationshipBinding::attach(overlay.clone(), Arc::clone(&bus)).await;
    assert!(err.is_err());
    assert_eq!(bus.subscriber_count(), 0);
    assert!(!overlay.is_initialized());

    // The one-shot guard does not latch a failure; the next consumer
    // retries initialization.
    let binding = RelationshipBinding::attach(overlay.clone(), Arc::clone(&bus))
        .await
        .unwrap();
    assert!(overlay.is_initialized());
    assert_eq!(store.init_calls.load(Ordering::SeqCst), 2);
    assert_eq!(bus.subscriber_count(), GraphEvent::ALL.len());
    drop(binding);
    assert_eq!(bus.subscriber_count(), 0);
}

#[tokio::test]
async fn test_consumers_share_overlay_state() {
    let bus = Arc::new(ChangeBus::new());
    let store = Arc::new(EmbeddedRelationshipStore::new().with_events(Arc::clone(&bus)));
    let overlay = RelationshipOverlay::new(store);

    let tasks_view = RelationshipBinding::attach(overlay.clone(), Arc::clone(&bus))
        .await
        .unwrap();
    let notes_view = RelationshipBinding::attach(overlay.clone(), Arc::clone(&bus))
        .await
        .unwrap();
    assert_eq!(bus.subscriber_count(), 2 * GraphEvent::ALL.len());

    let rel = tasks_view.add(task_note("t1", "n1")).await.unwrap();

    // The other consumer sees the same edge from its own endpoint.
    let rows = notes_view.read("n1", None);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, rel.id);
    assert_eq!(notes_view.statistics().total, 1);

    notes_view.remove(&rel.id).await.unwrap();
    assert!(tasks_view.read("t1", None).is_empty());
}
