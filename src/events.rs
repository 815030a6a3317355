//! In-process invalidation channel for graph changes.
//!
//! The bus carries three event categories signaling "the graph changed":
//! - `RELATIONSHIP_ADDED` - an edge was written
//! - `RELATIONSHIP_REMOVED` - an edge was deleted
//! - `RELATIONSHIP_UPDATED` - reserved for external emitters
//!
//! Signals carry no payload; subscribers re-derive their view from the
//! confirmed state on every delivery. Delivery is at-least-once and in
//! emission order, with no cross-signal causal guarantee.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Graph change categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GraphEvent {
    /// A relationship was added.
    RelationshipAdded,
    /// A relationship was removed.
    RelationshipRemoved,
    /// A relationship was updated.
    RelationshipUpdated,
}

impl GraphEvent {
    /// All event categories.
    pub const ALL: [GraphEvent; 3] = [
        GraphEvent::RelationshipAdded,
        GraphEvent::RelationshipRemoved,
        GraphEvent::RelationshipUpdated,
    ];

    /// Parse an event name from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "RELATIONSHIP_ADDED" | "relationship.added" => Some(Self::RelationshipAdded),
            "RELATIONSHIP_REMOVED" | "relationship.removed" => Some(Self::RelationshipRemoved),
            "RELATIONSHIP_UPDATED" | "relationship.updated" => Some(Self::RelationshipUpdated),
            _ => None,
        }
    }

    /// Get the event name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RelationshipAdded => "RELATIONSHIP_ADDED",
            Self::RelationshipRemoved => "RELATIONSHIP_REMOVED",
            Self::RelationshipUpdated => "RELATIONSHIP_UPDATED",
        }
    }
}

impl std::fmt::Display for GraphEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Handle for a single subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

type Handler = Arc<dyn Fn() + Send + Sync>;

struct Subscription {
    id: SubscriptionId,
    event: GraphEvent,
    handler: Handler,
}

#[derive(Default)]
struct BusInner {
    next_id: u64,
    subscriptions: Vec<Subscription>,
}

/// In-process broadcast bus for graph change signals.
///
/// Handlers are invoked synchronously, in subscription order, outside the
/// registry lock so a handler may subscribe or unsubscribe reentrantly.
#[derive(Default)]
pub struct ChangeBus {
    inner: Mutex<BusInner>,
}

impl ChangeBus {
    /// Create a new bus with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a handler to one event category.
    pub fn subscribe(
        &self,
        event: GraphEvent,
        handler: impl Fn() + Send + Sync + 'static,
    ) -> SubscriptionId {
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = SubscriptionId(inner.next_id);
        inner.subscriptions.push(Subscription {
            id,
            event,
            handler: Arc::new(handler),
        });
        debug!("subscribed {id} to {event}");
        id
    }

    /// Remove a subscription. Returns whether it existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut inner = self.inner.lock();
        let len_before = inner.subscriptions.len();
        inner.subscriptions.retain(|s| s.id != id);
        let removed = inner.subscriptions.len() < len_before;
        if removed {
            debug!("unsubscribed {id}");
        }
        removed
    }

    /// Total number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscriptions.len()
    }

    /// Deliver a signal to every matching handler, in subscription order.
    pub fn emit(&self, event: GraphEvent) {
        let handlers: Vec<Handler> = {
            let inner = self.inner.lock();
            inner
                .subscriptions
                .iter()
                .filter(|s| s.event == event)
                .map(|s| Arc::clone(&s.handler))
                .collect()
        };

        trace!("emitting {event} to {} handler(s)", handlers.len());
        for handler in handlers {
            handler();
        }
    }
}
