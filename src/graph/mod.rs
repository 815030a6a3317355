//! Relationship graph: typed edges between workspace entities.
//!
//! Edges connect the six entity kinds (tasks, notes, topics, companies,
//! contacts, sessions) through a closed set of pairings. Each logical
//! edge is stored twice, once per direction, so lookups from either
//! endpoint stay cheap.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                     Graph Layer                          │
//! │  ┌───────────────┐ ┌───────────────┐ ┌───────────────┐  │
//! │  │ Relationship  │ │  Entity       │ │  Resolution   │  │
//! │  │ Store (edges) │ │  Directory    │ │  (traversal)  │  │
//! │  └───────────────┘ └───────────────┘ └───────────────┘  │
//! └─────────────────────────────────────────────────────────┘
//! ```

mod resolve;
mod store;
mod types;

pub use resolve::{
    CollectionProvider, CompanyRecord, ContactRecord, EntityDirectory, EntityProvider,
    EntityRecord, NoteRecord, SessionRecord, TaskRecord, TopicRecord,
};
pub use store::{EmbeddedRelationshipStore, RelationshipStore, ALL_ENTITIES};
pub use types::*;
