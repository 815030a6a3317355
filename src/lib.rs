//! Sinew: Typed Relationship Graph with Optimistic Overlay
//!
//! A relationship layer for workspace entities (tasks, notes, topics,
//! companies, contacts, sessions) that gives callers immediate feedback on
//! graph writes while durable storage catches up, with read-side
//! deduplication so concurrent writers converge on one view.

pub mod binding;
pub mod config;
pub mod error;
pub mod events;
pub mod graph;
pub mod metrics;
pub mod overlay;

pub use binding::RelationshipBinding;
pub use config::Config;
pub use error::{ConfigError, OverlayError, Result, SinewError, StoreError};
pub use events::{ChangeBus, GraphEvent, SubscriptionId};
pub use graph::{
    CollectionProvider, CompanyRecord, ContactRecord, EdgeSignature, EmbeddedRelationshipStore,
    EntityDirectory, EntityProvider, EntityRecord, EntityType, GraphStats, NewRelationship,
    NoteRecord, Provenance, RelationType, Relationship, RelationshipMetadata, RelationshipStore,
    SessionRecord, TaskRecord, TopicRecord, ALL_ENTITIES,
};
pub use metrics::{get_metrics, Metrics, MetricsSnapshot};
pub use overlay::RelationshipOverlay;
