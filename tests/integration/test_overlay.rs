//! Tests for the optimistic overlay lifecycle.
//!
//! A scripted store double pauses or rejects writes on demand, so these
//! tests can observe the view while a round-trip is still in flight.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Notify;

use sinew::{
    ChangeBus, EmbeddedRelationshipStore, EntityRecord, EntityType, NewRelationship, OverlayError,
    RelationType, Relationship, RelationshipBinding, RelationshipOverlay, RelationshipStore,
    Result, StoreError,
};

/// Store double wrapping the embedded store with scripted failures and
/// gates that hold a write open at a chosen point.
struct ScriptedStore {
    inner: EmbeddedRelationshipStore,
    fail_adds: AtomicBool,
    fail_removes: AtomicBool,
    hold_adds_at_entry: AtomicBool,
    add_entered: Notify,
    release_entry: Notify,
    hold_adds_after_apply: AtomicBool,
    add_applied: Notify,
    release_apply: Notify,
    hold_removes_at_entry: AtomicBool,
    remove_entered: Notify,
    release_remove: Notify,
}

impl ScriptedStore {
    fn new(bus: Arc<ChangeBus>) -> Self {
        Self {
            inner: EmbeddedRelationshipStore::new().with_events(bus),
            fail_adds: AtomicBool::new(false),
            fail_removes: AtomicBool::new(false),
            hold_adds_at_entry: AtomicBool::new(false),
            add_entered: Notify::new(),
            release_entry: Notify::new(),
            hold_adds_after_apply: AtomicBool::new(false),
            add_applied: Notify::new(),
            release_apply: Notify::new(),
            hold_removes_at_entry: AtomicBool::new(false),
            remove_entered: Notify::new(),
            release_remove: Notify::new(),
        }
    }
}

#[async_trait]
impl RelationshipStore for ScriptedStore {
    async fn initialize(&self) -> Result<()> {
        self.inner.initialize().await
    }

    async fn add(&self, draft: NewRelationship) -> Result<Relationship> {
        if self.hold_adds_at_entry.load(Ordering::SeqCst) {
            self.add_entered.notify_one();
            self.release_entry.notified().await;
        }
        if self.fail_adds.load(Ordering::SeqCst) {
            return Err(StoreError::Rejected("scripted add rejection".to_string()).into());
        }
        let confirmed = self.inner.add(draft).await?;
        if self.hold_adds_after_apply.load(Ordering::SeqCst) {
            self.add_applied.notify_one();
            self.release_apply.notified().await;
        }
        Ok(confirmed)
    }

    async fn remove(&self, relationship_id: &str) -> Result<()> {
        if self.hold_removes_at_entry.load(Ordering::SeqCst) {
            self.remove_entered.notify_one();
            self.release_remove.notified().await;
        }
        if self.fail_removes.load(Ordering::SeqCst) {
            return Err(StoreError::Rejected("scripted remove rejection".to_string()).into());
        }
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

/// Scripted store plus an overlay attached to it the way a live consumer
/// would be, with invalidation signals flowing.
async fn scripted() -> (Arc<ScriptedStore>, RelationshipOverlay, RelationshipBinding) {
    let bus = Arc::new(ChangeBus::new());
    let store = Arc::new(ScriptedStore::new(Arc::clone(&bus)));
    let overlay = RelationshipOverlay::new(store.clone());
    let binding = RelationshipBinding::attach(overlay.clone(), bus)
        .await
        .unwrap();
    (store, overlay, binding)
}

#[tokio::test]
async fn test_add_is_visible_before_the_store_settles() {
    let (store, overlay, _binding) = scripted().await;
    store.hold_adds_at_entry.store(true, Ordering::SeqCst);

    let task = tokio::spawn({
        let overlay = overlay.clone();
        async move { overlay.add(task_note("t1", "n1")).await }
    });
    store.add_entered.notified().await;

    // The provisional row is already serving reads.
    let rows = overlay.read("t1", None);
    assert_eq!(rows.len(), 1);
    assert!(rows[0].id.starts_with("pending-"));
    assert_eq!(rows[0].source_id, "t1");
    assert_eq!(rows[0].target_id, "n1");
    assert!(overlay.is_loading());

    store.release_entry.notify_one();
    let confirmed = task.await.unwrap().unwrap();
    assert!(!confirmed.id.starts_with("pending-"));

    // Steady state: still exactly one edge, now the confirmed row.
    let rows = overlay.read("t1", None);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, confirmed.id);
    assert!(!overlay.is_loading());
}

#[tokio::test]
async fn test_no_duplicate_flash_when_confirmation_races_cleanup() {
    let (store, overlay, _binding) = scripted().await;
    store.hold_adds_after_apply.store(true, Ordering::SeqCst);

    let task = tokio::spawn({
        let overlay = overlay.clone();
        async move { overlay.add(task_note("t1", "n1")).await }
    });
    store.add_applied.notified().await;

    // The confirmed row is in the store and the invalidation signal has
    // fired, but the provisional entry has not been cleared yet. The view
    // must still show a single edge.
    let rows = overlay.read("t1", None);
    assert_eq!(rows.len(), 1);
    assert!(!rows[0].id.starts_with("pending-"));

    store.release_apply.notify_one();
    task.await.unwrap().unwrap();
    assert_eq!(overlay.read("t1", None).len(), 1);
}

#[tokio::test]
async fn test_confirmed_rows_precede_provisional_ones() {
    let (store, overlay, _binding) = scripted().await;
    let settled = overlay.add(task_note("t1", "n1")).await.unwrap();

    store.hold_adds_at_entry.store(true, Ordering::SeqCst);
    let task = tokio::spawn({
        let overlay = overlay.clone();
        async move { overlay.add(task_note("t1", "n2")).await }
    });
    store.add_entered.notified().await;

    let rows = overlay.read("t1", None);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].id, settled.id);
    assert!(rows[1].id.starts_with("pending-"));

    store.release_entry.notify_one();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_failed_add_leaves_nothing_behind() {
    let (store, overlay, _binding) = scripted().await;
    store.fail_adds.store(true, Ordering::SeqCst);

    let err = overlay.add(task_note("t1", "n1")).await.unwrap_err();
    assert!(matches!(err, OverlayError::AddFailed { .. }));

    assert!(overlay.read("t1", None).is_empty());
    assert!(overlay.read("n1", None).is_empty());
    assert!(!overlay.is_loading());
    assert!(matches!(
        overlay.last_error(),
        Some(OverlayError::AddFailed { .. })
    ));
}

#[tokio::test]
async fn test_remove_hides_before_the_store_settles() {
    let (store, overlay, _binding) = scripted().await;
    let rel = overlay.add(task_note("t1", "n1")).await.unwrap();

    store.hold_removes_at_entry.store(true, Ordering::SeqCst);
    let task = tokio::spawn({
        let overlay = overlay.clone();
        let id = rel.id.clone();
        async move { overlay.remove(&id).await }
    });
    store.remove_entered.notified().await;

    // The store still holds the row, the view already hides it.
    assert_eq!(store.query("t1", None).len(), 1);
    assert!(overlay.read("t1", None).is_empty());
    assert!(overlay.read("n1", None).is_empty());

    store.release_remove.notify_one();
    task.await.unwrap().unwrap();
    assert!(overlay.read("t1", None).is_empty());
}

#[tokio::test]
async fn test_failed_remove_restores_the_edge() {
    let (store, overlay, _binding) = scripted().await;
    let rel = overlay.add(task_note("t1", "n1")).await.unwrap();
    store.fail_removes.store(true, Ordering::SeqCst);

    let err = overlay.remove(&rel.id).await.unwrap_err();
    assert!(matches!(err, OverlayError::RemoveFailed { .. }));

    // The edge reappears for both endpoints after the rejection.
    assert_eq!(overlay.read("t1", None).len(), 1);
    assert_eq!(overlay.read("n1", None).len(), 1);
    assert!(matches!(
        overlay.last_error(),
        Some(OverlayError::RemoveFailed { .. })
    ));
}

#[tokio::test]
async fn test_concurrent_adds_of_the_same_edge_converge() {
    let (_store, overlay, binding) = scripted().await;

    // Writes are not serialized against each other; both may land in the
    // store. Readers still converge on one edge.
    let (first, second) = tokio::join!(
        overlay.add(task_note("t1", "n1")),
        overlay.add(NewRelationship::new(
            EntityType::Note,
            "n1",
            EntityType::Task,
            "t1",
            RelationType::TaskNote,
        )),
    );
    first.unwrap();
    second.unwrap();

    assert_eq!(binding.read("t1", None).len(), 1);
    assert_eq!(binding.read("n1", None).len(), 1);
}

#[tokio::test]
async fn test_concurrent_removes_are_idempotent() {
    let (_store, overlay, _binding) = scripted().await;
    let rel = overlay.add(task_note("t1", "n1")).await.unwrap();

    let (first, second) = tokio::join!(overlay.remove(&rel.id), overlay.remove(&rel.id));
    first.unwrap();
    second.unwrap();

    assert!(overlay.read("t1", None).is_empty());
    assert!(overlay.last_error().is_none());
}
