//! Per-consumer binding between entity modules and the shared overlay.
//!
//! Each entity module (tasks, notes, topics, companies, contacts, sessions)
//! attaches one binding. Attaching subscribes to the invalidation events and
//! runs the shared one-shot store initialization; dropping the binding
//! unsubscribes. The binding republishes the overlay's operations and state
//! so modules never reimplement merge and dedup themselves.

use std::sync::Arc;

use tracing::debug;

use crate::error::OverlayError;
use crate::events::{ChangeBus, GraphEvent, SubscriptionId};
use crate::graph::{EntityRecord, GraphStats, NewRelationship, RelationType, Relationship};
use crate::overlay::RelationshipOverlay;

/// A consumer's handle on the relationship graph.
///
/// Holds live subscriptions on the invalidation bus; they are released when
/// the binding is dropped, so a detached consumer stops driving refreshes.
pub struct RelationshipBinding {
    overlay: RelationshipOverlay,
    bus: Arc<ChangeBus>,
    subscriptions: Vec<SubscriptionId>,
}

impl RelationshipBinding {
    /// Attach a consumer to the graph.
    ///
    /// Subscribes to every invalidation event, forwarding each arrival to
    /// the overlay, then ensures the store is initialized. Initialization is
    /// shared: any number of concurrently attaching consumers trigger it at
    /// most once. On failure the partially attached binding is dropped and
    /// its subscriptions are released.
    pub async fn attach(
        overlay: RelationshipOverlay,
        bus: Arc<ChangeBus>,
    ) -> crate::error::Result<Self> {
        let mut subscriptions = Vec::with_capacity(GraphEvent::ALL.len());
        for event in GraphEvent::ALL {
            let forward = overlay.clone();
            subscriptions.push(bus.subscribe(event, move || forward.notify_changed()));
        }
        debug!("binding attached with {} subscription(s)", subscriptions.len());

        let binding = Self {
            overlay,
            bus,
            subscriptions,
        };
        binding.overlay.ensure_initialized().await?;
        Ok(binding)
    }

    /// The shared overlay behind this binding.
    pub fn overlay(&self) -> &RelationshipOverlay {
        &self.overlay
    }

    /// Add a relationship optimistically.
    pub async fn add(&self, draft: NewRelationship) -> Result<Relationship, OverlayError> {
        self.overlay.add(draft).await
    }

    /// Remove a relationship optimistically.
    pub async fn remove(&self, relationship_id: &str) -> Result<(), OverlayError> {
        self.overlay.remove(relationship_id).await
    }

    /// Merged, deduplicated view of the graph around one entity.
    pub fn read(
        &self,
        entity_id: &str,
        relationship_type: Option<RelationType>,
    ) -> Vec<Relationship> {
        self.overlay.read(entity_id, relationship_type)
    }

    /// Load the entities on the far side of each confirmed edge.
    pub async fn resolve_related(
        &self,
        entity_id: &str,
        relationship_type: Option<RelationType>,
    ) -> crate::error::Result<Vec<EntityRecord>> {
        self.overlay.resolve_related(entity_id, relationship_type).await
    }

    /// Whether any store round-trip is in flight.
    pub fn is_loading(&self) -> bool {
        self.overlay.is_loading()
    }

    /// The most recent failure, if any.
    pub fn last_error(&self) -> Option<OverlayError> {
        self.overlay.last_error()
    }

    /// Reset the recorded failure.
    pub fn clear_error(&self) {
        self.overlay.clear_error()
    }

    /// Provenance counts over the confirmed graph.
    pub fn statistics(&self) -> GraphStats {
        self.overlay.statistics()
    }
}

impl Drop for RelationshipBinding {
    fn drop(&mut self) {
        for id in self.subscriptions.drain(..) {
            self.bus.unsubscribe(id);
        }
        debug!("binding detached");
    }
}
