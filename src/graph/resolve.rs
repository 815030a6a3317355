//! Typed resolution of related entities.
//!
//! Each entity module registers a loader for its own collection; the
//! directory dispatches lookups through a closed tagged union instead of
//! runtime type inspection.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::graph::types::EntityType;

// ============================================================================
// Entity Records
// ============================================================================

/// A task as seen by the relationship layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub done: bool,
}

/// A note as seen by the relationship layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteRecord {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub preview: Option<String>,
}

/// A topic as seen by the relationship layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicRecord {
    pub id: String,
    pub name: String,
}

/// A company as seen by the relationship layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub domain: Option<String>,
}

/// A contact as seen by the relationship layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// A recording session as seen by the relationship layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
}

/// A resolved entity, tagged by its type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entity_type", rename_all = "lowercase")]
pub enum EntityRecord {
    Task(TaskRecord),
    Note(NoteRecord),
    Topic(TopicRecord),
    Company(CompanyRecord),
    Contact(ContactRecord),
    Session(SessionRecord),
}

impl EntityRecord {
    /// The entity type of this record.
    pub fn entity_type(&self) -> EntityType {
        match self {
            EntityRecord::Task(_) => EntityType::Task,
            EntityRecord::Note(_) => EntityType::Note,
            EntityRecord::Topic(_) => EntityType::Topic,
            EntityRecord::Company(_) => EntityType::Company,
            EntityRecord::Contact(_) => EntityType::Contact,
            EntityRecord::Session(_) => EntityType::Session,
        }
    }

    /// The record's id.
    pub fn id(&self) -> &str {
        match self {
            EntityRecord::Task(r) => &r.id,
            EntityRecord::Note(r) => &r.id,
            EntityRecord::Topic(r) => &r.id,
            EntityRecord::Company(r) => &r.id,
            EntityRecord::Contact(r) => &r.id,
            EntityRecord::Session(r) => &r.id,
        }
    }
}

// ============================================================================
// Providers
// ============================================================================

/// Loader for one entity collection.
///
/// Each entity module owns its collection and exposes lookups to the
/// relationship layer through this trait.
#[async_trait]
pub trait EntityProvider: Send + Sync {
    /// The entity type this provider serves.
    fn entity_type(&self) -> EntityType;

    /// Load a record by id. `None` when the entity does not exist.
    async fn fetch(&self, id: &str) -> Result<Option<EntityRecord>>;
}

/// Registry mapping each entity type to its provider.
#[derive(Default)]
pub struct EntityDirectory {
    providers: HashMap<EntityType, Arc<dyn EntityProvider>>,
}

impl EntityDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider for its entity type.
    pub fn with_provider(mut self, provider: Arc<dyn EntityProvider>) -> Self {
        self.register(provider);
        self
    }

    /// Register a provider, replacing any previous one for the same type.
    pub fn register(&mut self, provider: Arc<dyn EntityProvider>) {
        self.providers.insert(provider.entity_type(), provider);
    }

    /// Check whether a provider is registered for the given type.
    pub fn is_registered(&self, entity_type: EntityType) -> bool {
        self.providers.contains_key(&entity_type)
    }

    /// Resolve an entity through its registered provider.
    ///
    /// Returns `None` when no provider is registered for the type or
    /// when the provider does not know the id.
    pub async fn resolve(
        &self,
        entity_type: EntityType,
        id: &str,
    ) -> Result<Option<EntityRecord>> {
        match self.providers.get(&entity_type) {
            Some(provider) => provider.fetch(id).await,
            None => {
                debug!("no provider registered for {entity_type}, skipping {id}");
                Ok(None)
            }
        }
    }
}

// ============================================================================
// Reference Provider
// ============================================================================

/// In-memory provider over a keyed record collection.
pub struct CollectionProvider {
    entity_type: EntityType,
    records: RwLock<HashMap<String, EntityRecord>>,
}

impl CollectionProvider {
    /// Create an empty collection for the given entity type.
    pub fn new(entity_type: EntityType) -> Self {
        Self {
            entity_type,
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Insert a record, keyed by its id.
    pub fn insert(&self, record: EntityRecord) {
        debug_assert_eq!(record.entity_type(), self.entity_type);
        self.records
            .write()
            .insert(record.id().to_string(), record);
    }

    /// Number of records in the collection.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Check whether the collection is empty.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl EntityProvider for CollectionProvider {
    fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    async fn fetch(&self, id: &str) -> Result<Option<EntityRecord>> {
        Ok(self.records.read().get(id).cloned())
    }
}
