//! Relationship storage trait and the embedded reference implementation.
//!
//! The store owns the physical layout of edges: two rows per logical edge
//! (canonical plus direction-mirror, sharing one id) indexed for O(1)
//! lookup from either endpoint.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{Result, StoreError};
use crate::events::{ChangeBus, GraphEvent};
use crate::graph::resolve::{EntityDirectory, EntityRecord};
use crate::graph::types::{EdgeSignature, NewRelationship, RelationType, Relationship};

/// Sentinel entity id selecting every row in the store.
pub const ALL_ENTITIES: &str = "*";

// ============================================================================
// RelationshipStore Trait
// ============================================================================

/// Trait for relationship storage backends.
#[async_trait]
pub trait RelationshipStore: Send + Sync {
    /// Initialize the store, loading any persisted state.
    ///
    /// Must complete before `add` or `remove` are accepted. Idempotent.
    async fn initialize(&self) -> Result<()>;

    /// Write a new logical edge and return its canonical row.
    async fn add(&self, draft: NewRelationship) -> Result<Relationship>;

    /// Delete a logical edge by id.
    ///
    /// Removing an id the store does not know is a successful no-op.
    async fn remove(&self, relationship_id: &str) -> Result<()>;

    /// Synchronous read against the store's in-memory index.
    ///
    /// Returns the rows whose recorded source is `entity_id` (the mirror
    /// row serves lookups from the other endpoint), optionally filtered by
    /// type. [`ALL_ENTITIES`] selects every row. An uninitialized store
    /// has an empty index.
    fn query(&self, entity_id: &str, relationship_type: Option<RelationType>)
        -> Vec<Relationship>;

    /// Follow each edge from `entity_id` to its opposite endpoint and load
    /// that entity from its owning collection.
    async fn resolve_related(
        &self,
        entity_id: &str,
        relationship_type: Option<RelationType>,
    ) -> Result<Vec<EntityRecord>>;
}

// ============================================================================
// Internal Data Structure
// ============================================================================

/// The canonical row and its direction-mirror.
#[derive(Debug, Clone)]
struct EdgeRows {
    canonical: Relationship,
    mirror: Relationship,
}

/// Internal indexed storage.
#[derive(Debug, Default)]
struct GraphData {
    /// Edge pairs by logical id.
    edges: HashMap<String, EdgeRows>,
    /// Index: entity id -> logical edge ids, in insertion order.
    by_entity: HashMap<String, Vec<String>>,
    /// Logical edge ids in insertion order, for the sentinel query.
    order: Vec<String>,
}

impl GraphData {
    /// Insert a canonical row and its generated mirror.
    fn insert_edge(&mut self, canonical: Relationship) {
        let mirror = canonical.mirrored();
        let id = canonical.id.clone();

        self.by_entity
            .entry(canonical.source_id.clone())
            .or_default()
            .push(id.clone());
        if canonical.target_id != canonical.source_id {
            self.by_entity
                .entry(canonical.target_id.clone())
                .or_default()
                .push(id.clone());
        }

        self.order.push(id.clone());
        self.edges.insert(id, EdgeRows { canonical, mirror });
    }

    /// Remove both rows of a logical edge. Returns the pair if it existed.
    fn remove_edge(&mut self, id: &str) -> Option<EdgeRows> {
        let rows = self.edges.remove(id)?;

        for entity_id in [&rows.canonical.source_id, &rows.canonical.target_id] {
            if let Some(ids) = self.by_entity.get_mut(entity_id) {
                ids.retain(|eid| eid != id);
            }
        }
        self.order.retain(|eid| eid != id);

        Some(rows)
    }
}

// ============================================================================
// Embedded Implementation
// ============================================================================

/// In-memory relationship store with optional JSON persistence.
///
/// Only canonical rows are persisted; mirrors are rebuilt when the
/// snapshot is loaded.
pub struct EmbeddedRelationshipStore {
    /// All rows and indexes behind a single lock, so `query` stays a
    /// synchronous read.
    data: RwLock<GraphData>,
    /// Set once `initialize` has completed.
    ready: AtomicBool,
    /// Optional snapshot file path.
    persistence_path: Option<PathBuf>,
    /// Serializes snapshot writes.
    persist_lock: AsyncMutex<()>,
    /// Invalidation bus notified after writes.
    bus: Option<Arc<ChangeBus>>,
    /// Entity loaders used by `resolve_related`.
    directory: Option<Arc<EntityDirectory>>,
}

impl EmbeddedRelationshipStore {
    /// Create a new in-memory store without persistence.
    pub fn new() -> Self {
        Self {
            data: RwLock::new(GraphData::default()),
            ready: AtomicBool::new(false),
            persistence_path: None,
            persist_lock: AsyncMutex::new(()),
            bus: None,
            directory: None,
        }
    }

    /// Create a store from configuration, honoring its persistence settings.
    pub fn from_config(config: &Config) -> Self {
        let mut store = Self::new();
        store.persistence_path = config.graph_path();
        store
    }

    /// Set the snapshot file path.
    pub fn with_persistence(mut self, path: impl Into<PathBuf>) -> Self {
        self.persistence_path = Some(path.into());
        self
    }

    /// Attach the invalidation bus signaled after writes.
    pub fn with_events(mut self, bus: Arc<ChangeBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Attach the entity directory consulted by `resolve_related`.
    pub fn with_directory(mut self, directory: Arc<EntityDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.ready.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(StoreError::NotReady.into())
        }
    }

    fn emit(&self, event: GraphEvent) {
        if let Some(bus) = &self.bus {
            bus.emit(event);
        }
    }

    /// Load a persisted snapshot, rebuilding mirrors and indexes.
    async fn load_from_file(&self, path: &std::path::Path) -> Result<()> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(StoreError::Io)?;

        let persisted: PersistenceData =
            serde_json::from_str(&content).map_err(StoreError::Serialization)?;

        let mut data = self.data.write();
        for rel in persisted.relationships {
            data.insert_edge(rel);
        }

        info!(
            "Loaded {} relationship(s) from {}",
            data.edges.len(),
            path.display()
        );

        Ok(())
    }

    /// Persist canonical rows to file if persistence is enabled.
    async fn persist(&self) -> Result<()> {
        let Some(ref path) = self.persistence_path else {
            return Ok(());
        };

        let _lock = self.persist_lock.lock().await;

        let relationships: Vec<Relationship> = {
            let data = self.data.read();
            data.order
                .iter()
                .filter_map(|id| data.edges.get(id))
                .map(|rows| rows.canonical.clone())
                .collect()
        };

        let persisted = PersistenceData {
            version: 1,
            relationships,
        };

        let content =
            serde_json::to_string_pretty(&persisted).map_err(StoreError::Serialization)?;

        // Write to temp file first, then rename for atomicity.
        let temp_path = path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, content)
            .await
            .map_err(StoreError::Io)?;
        tokio::fs::rename(&temp_path, path)
            .await
            .map_err(StoreError::Io)?;

        Ok(())
    }
}

impl Default for EmbeddedRelationshipStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RelationshipStore for EmbeddedRelationshipStore {
    async fn initialize(&self) -> Result<()> {
        if self.ready.load(Ordering::Acquire) {
            return Ok(());
        }

        if let Some(path) = self.persistence_path.clone() {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(StoreError::Io)?;
            }
            if path.exists() {
                self.load_from_file(&path).await?;
            }
        }

        self.ready.store(true, Ordering::Release);
        debug!("relationship store initialized");
        Ok(())
    }

    async fn add(&self, draft: NewRelationship) -> Result<Relationship> {
        self.ensure_ready()?;

        if !draft.pairing_is_valid() {
            return Err(StoreError::Rejected(format!(
                "{} cannot connect {} and {}",
                draft.relationship_type, draft.source_type, draft.target_type
            ))
            .into());
        }

        let rel = draft.to_relationship(uuid::Uuid::new_v4().to_string());
        {
            let mut data = self.data.write();
            data.insert_edge(rel.clone());
        }

        self.persist().await?;
        self.emit(GraphEvent::RelationshipAdded);
        debug!("added relationship {} ({})", rel.id, rel.signature());

        Ok(rel)
    }

    async fn remove(&self, relationship_id: &str) -> Result<()> {
        self.ensure_ready()?;

        let removed = {
            let mut data = self.data.write();
            data.remove_edge(relationship_id).is_some()
        };

        if removed {
            self.persist().await?;
            self.emit(GraphEvent::RelationshipRemoved);
            debug!("removed relationship {relationship_id}");
        }

        Ok(())
    }

    fn query(
        &self,
        entity_id: &str,
        relationship_type: Option<RelationType>,
    ) -> Vec<Relationship> {
        let data = self.data.read();

        let matches_type =
            |rel: &Relationship| relationship_type.is_none_or(|rt| rel.relationship_type == rt);

        if entity_id == ALL_ENTITIES {
            return data
                .order
                .iter()
                .filter_map(|id| data.edges.get(id))
                .flat_map(|rows| [&rows.canonical, &rows.mirror])
                .filter(|rel| matches_type(rel))
                .cloned()
                .collect();
        }

        let Some(edge_ids) = data.by_entity.get(entity_id) else {
            return Vec::new();
        };

        edge_ids
            .iter()
            .filter_map(|id| data.edges.get(id))
            .flat_map(|rows| [&rows.canonical, &rows.mirror])
            .filter(|rel| rel.source_id == entity_id && matches_type(rel))
            .cloned()
            .collect()
    }

    async fn resolve_related(
        &self,
        entity_id: &str,
        relationship_type: Option<RelationType>,
    ) -> Result<Vec<EntityRecord>> {
        let rows = self.query(entity_id, relationship_type);

        let mut seen: std::collections::HashSet<EdgeSignature> = std::collections::HashSet::new();
        let mut records = Vec::new();

        for rel in rows {
            if !seen.insert(rel.signature()) {
                continue;
            }
            let Some((entity_type, opposite_id)) = rel.opposite_endpoint(entity_id) else {
                continue;
            };

            let resolved = match &self.directory {
                Some(directory) => directory.resolve(entity_type, opposite_id).await?,
                None => None,
            };

            match resolved {
                Some(record) => records.push(record),
                None => debug!("skipping unresolvable {entity_type} {opposite_id}"),
            }
        }

        Ok(records)
    }
}

/// On-disk snapshot format.
#[derive(Debug, Serialize, Deserialize)]
struct PersistenceData {
    version: u32,
    relationships: Vec<Relationship>,
}
