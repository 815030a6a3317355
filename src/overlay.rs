//! Optimistic overlay over the relationship store.
//!
//! The overlay gives callers immediate feedback for graph writes: an `add`
//! synthesizes a provisional row that readers see at once, while the store
//! round-trip settles in the background; a `remove` hides the target row
//! before the deletion is durable. Every speculative entry is reconciled on
//! every exit path, so a rejected write can never leave the graph showing an
//! edge the store refused, nor hiding one whose deletion failed.
//!
//! Reads merge three sources: the store's confirmed rows, the speculative
//! entries, and the invalidation signals that announce writes from other
//! processes. Merged views are deduplicated by logical-edge signature, so
//! canonical and mirror rows, or a confirmed row racing its own provisional
//! shadow, collapse to a single edge.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::error::OverlayError;
use crate::graph::{
    EdgeSignature, EntityRecord, GraphStats, NewRelationship, Provenance, RelationType,
    Relationship, RelationshipStore, ALL_ENTITIES,
};
use crate::metrics::get_metrics;

/// Prefix of provisional relationship ids.
const PENDING_PREFIX: &str = "pending-";

// ============================================================================
// Internal State
// ============================================================================

/// A speculative entry: a locally shadowed relationship, possibly pending
/// deletion.
#[derive(Debug, Clone)]
struct OptimisticRelationship {
    relationship: Relationship,
    /// Pending deletion. Internal only, readers never see a removing entry.
    removing: bool,
}

/// Mutable overlay state behind one lock. Single-writer: every mutation goes
/// through the overlay's own methods.
#[derive(Debug, Default)]
struct OverlayState {
    /// Speculative entries keyed by provisional or real relationship id.
    entries: HashMap<String, OptimisticRelationship>,
    /// Entry ids in insertion order.
    entry_order: Vec<String>,
    /// Store round-trips currently in flight.
    in_flight: usize,
    /// Most recent failure. Never cleared by a later success.
    last_error: Option<OverlayError>,
    /// Bumped on every entry mutation.
    revision: u64,
    /// Bumped on every invalidation signal.
    refresh_epoch: u64,
}

impl OverlayState {
    fn drop_entry(&mut self, id: &str) -> bool {
        if self.entries.remove(id).is_some() {
            self.entry_order.retain(|eid| eid != id);
            true
        } else {
            false
        }
    }

    fn record_failure(&mut self, err: &OverlayError) {
        self.last_error = Some(err.clone());
    }
}

/// A memoized read result, valid while both stamps still match.
#[derive(Debug, Clone)]
struct MemoizedRead {
    revision: u64,
    refresh_epoch: u64,
    rows: Vec<Relationship>,
}

struct OverlayInner {
    store: Arc<dyn RelationshipStore>,
    state: RwLock<OverlayState>,
    /// One-shot store initialization, shared by every consumer of this
    /// overlay. A failed attempt leaves the cell unset so a later consumer
    /// can retry.
    init: OnceCell<()>,
    read_memo: Mutex<HashMap<(String, Option<RelationType>), MemoizedRead>>,
    stats_memo: Mutex<Option<(u64, GraphStats)>>,
}

// ============================================================================
// RelationshipOverlay
// ============================================================================

/// Cheaply cloneable handle to the shared overlay.
///
/// Entity modules clone one overlay per consumer; all clones observe the
/// same speculative state, error state, and memoized views.
#[derive(Clone)]
pub struct RelationshipOverlay {
    inner: Arc<OverlayInner>,
}

impl RelationshipOverlay {
    /// Create an overlay over the given store.
    pub fn new(store: Arc<dyn RelationshipStore>) -> Self {
        Self {
            inner: Arc::new(OverlayInner {
                store,
                state: RwLock::new(OverlayState::default()),
                init: OnceCell::new(),
                read_memo: Mutex::new(HashMap::new()),
                stats_memo: Mutex::new(None),
            }),
        }
    }

    /// Run the store's initialization exactly once, no matter how many
    /// consumers call this concurrently.
    pub async fn ensure_initialized(&self) -> crate::error::Result<()> {
        self.inner
            .init
            .get_or_try_init(|| async { self.inner.store.initialize().await })
            .await?;
        Ok(())
    }

    /// Whether the shared initialization has completed.
    pub fn is_initialized(&self) -> bool {
        self.inner.init.initialized()
    }

    /// Whether any store round-trip is currently in flight.
    pub fn is_loading(&self) -> bool {
        self.inner.state.read().in_flight > 0
    }

    /// The most recent failure, if any.
    ///
    /// Failures stick: a later successful operation does not clear this, so
    /// a caller inspecting state after a batch cannot miss an earlier
    /// rejection. Only [`clear_error`](Self::clear_error) resets it, and a
    /// later failure supersedes it.
    pub fn last_error(&self) -> Option<OverlayError> {
        self.inner.state.read().last_error.clone()
    }

    /// Reset the recorded failure.
    pub fn clear_error(&self) {
        self.inner.state.write().last_error = None;
    }

    /// Handle an invalidation signal: the durable graph changed, memoized
    /// views must be re-derived. Signal payloads carry no meaning here, only
    /// their arrival counts.
    pub fn notify_changed(&self) {
        let epoch = {
            let mut state = self.inner.state.write();
            state.refresh_epoch += 1;
            state.refresh_epoch
        };
        get_metrics().invalidation_signals_total.inc();
        debug!("invalidation signal received, refresh epoch now {epoch}");
    }

    // ------------------------------------------------------------------
    // Write operations
    // ------------------------------------------------------------------

    /// Add a relationship optimistically.
    ///
    /// A provisional row is visible to readers before the store round-trip
    /// starts; on success it is replaced by the confirmed row, on failure it
    /// is rolled back. The round-trip itself runs in a detached task, so the
    /// rollback happens even if the caller stops awaiting mid-operation.
    pub async fn add(&self, draft: NewRelationship) -> Result<Relationship, OverlayError> {
        if !self.is_initialized() {
            let err = OverlayError::NotInitialized;
            self.inner.state.write().record_failure(&err);
            get_metrics().add_failures_total.inc();
            return Err(err);
        }

        let temp_id = format!("{PENDING_PREFIX}{}", uuid::Uuid::new_v4());
        let provisional = draft.to_relationship(temp_id.clone());

        let entries_len = {
            let mut state = self.inner.state.write();
            state.entries.insert(
                temp_id.clone(),
                OptimisticRelationship {
                    relationship: provisional,
                    removing: false,
                },
            );
            state.entry_order.push(temp_id.clone());
            state.in_flight += 1;
            state.revision += 1;
            state.entries.len()
        };
        get_metrics().overlay_entries.set(entries_len as i64);

        let inner = Arc::clone(&self.inner);
        let cleanup_id = temp_id.clone();
        let handle = tokio::spawn(async move {
            let result = inner.store.add(draft).await;

            let mut state = inner.state.write();
            state.drop_entry(&temp_id);
            state.in_flight -= 1;
            state.revision += 1;
            let entries_len = state.entries.len();

            let outcome = match result {
                Ok(relationship) => {
                    debug!(
                        "relationship {} confirmed ({})",
                        relationship.id,
                        relationship.signature()
                    );
                    Ok(relationship)
                }
                Err(err) => {
                    let err = OverlayError::add_failed(err);
                    state.record_failure(&err);
                    warn!("add rolled back: {err}");
                    Err(err)
                }
            };
            drop(state);

            get_metrics().overlay_entries.set(entries_len as i64);
            match &outcome {
                Ok(_) => get_metrics().relationships_added_total.inc(),
                Err(_) => get_metrics().add_failures_total.inc(),
            }
            outcome
        });

        match handle.await {
            Ok(outcome) => outcome,
            Err(join_err) => {
                // The task died before reconciling. Restore consistency here.
                let err = OverlayError::Unknown(join_err.to_string());
                let mut state = self.inner.state.write();
                if state.drop_entry(&cleanup_id) {
                    state.in_flight = state.in_flight.saturating_sub(1);
                    state.revision += 1;
                }
                state.record_failure(&err);
                drop(state);
                get_metrics().add_failures_total.inc();
                Err(err)
            }
        }
    }

    /// Remove a relationship optimistically.
    ///
    /// The target row disappears from reads at once. If the store rejects
    /// the deletion the row reappears and the failure is recorded. Removing
    /// an id neither the overlay nor the store knows is a successful no-op,
    /// matching the store's idempotent delete.
    pub async fn remove(&self, relationship_id: &str) -> Result<(), OverlayError> {
        // Tombstone the row: flag an existing entry, or shadow a confirmed
        // row under its real id.
        let confirmed = self
            .inner
            .store
            .query(ALL_ENTITIES, None)
            .into_iter()
            .find(|rel| rel.id == relationship_id);

        let tombstoned = {
            let mut state = self.inner.state.write();
            state.in_flight += 1;
            if let Some(entry) = state.entries.get_mut(relationship_id) {
                entry.removing = true;
                state.revision += 1;
                false
            } else if let Some(relationship) = confirmed {
                state.entries.insert(
                    relationship_id.to_string(),
                    OptimisticRelationship {
                        relationship,
                        removing: true,
                    },
                );
                state.entry_order.push(relationship_id.to_string());
                state.revision += 1;
                true
            } else {
                false
            }
        };

        let inner = Arc::clone(&self.inner);
        let target_id = relationship_id.to_string();
        let handle = tokio::spawn(async move {
            let result = inner.store.remove(&target_id).await;

            let mut state = inner.state.write();
            state.in_flight -= 1;
            state.revision += 1;

            let outcome = match result {
                Ok(()) => {
                    state.drop_entry(&target_id);
                    Ok(())
                }
                Err(err) => {
                    let err = OverlayError::remove_failed(err);
                    // Resurrect: the row must visibly reappear.
                    if tombstoned {
                        state.drop_entry(&target_id);
                    } else if let Some(entry) = state.entries.get_mut(&target_id) {
                        entry.removing = false;
                    }
                    state.record_failure(&err);
                    warn!("remove of {target_id} rolled back: {err}");
                    Err(err)
                }
            };
            let entries_len = state.entries.len();
            drop(state);

            get_metrics().overlay_entries.set(entries_len as i64);
            match &outcome {
                Ok(()) => get_metrics().relationships_removed_total.inc(),
                Err(_) => get_metrics().remove_failures_total.inc(),
            }
            outcome
        });

        match handle.await {
            Ok(outcome) => outcome,
            Err(join_err) => {
                let err = OverlayError::Unknown(join_err.to_string());
                let mut state = self.inner.state.write();
                if tombstoned {
                    state.drop_entry(relationship_id);
                } else if let Some(entry) = state.entries.get_mut(relationship_id) {
                    entry.removing = false;
                }
                state.in_flight = state.in_flight.saturating_sub(1);
                state.revision += 1;
                state.record_failure(&err);
                drop(state);
                get_metrics().remove_failures_total.inc();
                Err(err)
            }
        }
    }

    // ------------------------------------------------------------------
    // Read operations
    // ------------------------------------------------------------------

    /// Merged view of the graph around one entity, deduplicated by
    /// logical-edge signature.
    ///
    /// The view is assembled in order:
    /// 1. confirmed rows for `entity_id` from the store, minus rows whose
    ///    deletion is pending, collapsed to one row per signature;
    /// 2. speculative entries touching `entity_id` that are not pending
    ///    deletion and whose signature is not already present, so a
    ///    confirmed row arriving while its provisional shadow still exists
    ///    never shows twice.
    ///
    /// Results are memoized; a call recomputes only after an entry mutation
    /// or an invalidation signal.
    pub fn read(
        &self,
        entity_id: &str,
        relationship_type: Option<RelationType>,
    ) -> Vec<Relationship> {
        // Stamps are captured before the computation. A write landing in
        // between makes the memoized rows stale under these stamps, and the
        // next call recomputes.
        let (revision, refresh_epoch) = {
            let state = self.inner.state.read();
            (state.revision, state.refresh_epoch)
        };

        let key = (entity_id.to_string(), relationship_type);
        {
            let memo = self.inner.read_memo.lock();
            if let Some(hit) = memo.get(&key) {
                if hit.revision == revision && hit.refresh_epoch == refresh_epoch {
                    get_metrics().read_memo_hits_total.inc();
                    return hit.rows.clone();
                }
            }
        }
        get_metrics().read_recomputes_total.inc();

        let confirmed = self.inner.store.query(entity_id, relationship_type);

        let state = self.inner.state.read();
        let removing: HashSet<&str> = state
            .entries
            .values()
            .filter(|entry| entry.removing)
            .map(|entry| entry.relationship.id.as_str())
            .collect();

        let mut seen: HashSet<EdgeSignature> = HashSet::new();
        let mut rows: Vec<Relationship> = Vec::new();

        for relationship in confirmed {
            if removing.contains(relationship.id.as_str()) {
                continue;
            }
            if seen.insert(relationship.signature()) {
                rows.push(relationship);
            }
        }

        for id in &state.entry_order {
            let Some(entry) = state.entries.get(id) else {
                continue;
            };
            if entry.removing {
                continue;
            }
            let relationship = &entry.relationship;
            if entity_id != ALL_ENTITIES && !relationship.involves(entity_id) {
                continue;
            }
            if relationship_type.is_some_and(|rt| relationship.relationship_type != rt) {
                continue;
            }
            if seen.insert(relationship.signature()) {
                rows.push(relationship.clone());
            }
        }
        drop(state);

        let mut memo = self.inner.read_memo.lock();
        memo.insert(
            key,
            MemoizedRead {
                revision,
                refresh_epoch,
                rows: rows.clone(),
            },
        );
        rows
    }

    /// Load the entities on the far side of each edge. Reflects durable
    /// state only; speculative entries are not followed.
    pub async fn resolve_related(
        &self,
        entity_id: &str,
        relationship_type: Option<RelationType>,
    ) -> crate::error::Result<Vec<EntityRecord>> {
        self.inner
            .store
            .resolve_related(entity_id, relationship_type)
            .await
    }

    /// Provenance counts over the confirmed graph.
    ///
    /// Recomputed only when an invalidation signal has arrived since the
    /// last call; speculative entries are never counted.
    pub fn statistics(&self) -> GraphStats {
        let refresh_epoch = self.inner.state.read().refresh_epoch;
        {
            let memo = self.inner.stats_memo.lock();
            if let Some((stamped, stats)) = memo.as_ref() {
                if *stamped == refresh_epoch {
                    return stats.clone();
                }
            }
        }

        let mut stats = GraphStats::default();
        for relationship in self.inner.store.query(ALL_ENTITIES, None) {
            if !relationship.canonical {
                continue;
            }
            stats.total += 1;
            match relationship.metadata.source {
                Provenance::Ai => stats.from_ai += 1,
                Provenance::Manual => stats.from_manual += 1,
            }
        }

        *self.inner.stats_memo.lock() = Some((refresh_epoch, stats.clone()));
        stats
    }
}
