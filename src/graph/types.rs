//! Core types for the relationship graph.
//!
//! This module defines the entity classification, the closed set of allowed
//! relationship pairings, and the relationship rows exchanged with the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// Entity Types
// ============================================================================

/// The type classification of a linked entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    /// A single actionable task.
    Task,
    /// A free-form note.
    Note,
    /// A subject area or topic.
    Topic,
    /// A company or organization.
    Company,
    /// A person.
    Contact,
    /// A recording session.
    Session,
}

impl EntityType {
    /// All entity types, in declaration order.
    pub const ALL: [EntityType; 6] = [
        EntityType::Task,
        EntityType::Note,
        EntityType::Topic,
        EntityType::Company,
        EntityType::Contact,
        EntityType::Session,
    ];

    /// Get a human-readable display name.
    pub fn display_name(&self) -> &'static str {
        match self {
            EntityType::Task => "Task",
            EntityType::Note => "Note",
            EntityType::Topic => "Topic",
            EntityType::Company => "Company",
            EntityType::Contact => "Contact",
            EntityType::Session => "Session",
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

// ============================================================================
// Relationship Types
// ============================================================================

/// The closed set of allowed relationship pairings.
///
/// Each variant names the two entity types it may connect; direction is
/// not part of the pairing, so a `TaskNote` edge may be recorded from the
/// task or from the note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationType {
    TaskNote,
    NoteTopic,
    NoteCompany,
    NoteContact,
    NoteSession,
    TaskSession,
}

impl RelationType {
    /// All relationship types, in declaration order.
    pub const ALL: [RelationType; 6] = [
        RelationType::TaskNote,
        RelationType::NoteTopic,
        RelationType::NoteCompany,
        RelationType::NoteContact,
        RelationType::NoteSession,
        RelationType::TaskSession,
    ];

    /// The pair of entity types this relationship may connect.
    pub fn endpoints(&self) -> (EntityType, EntityType) {
        match self {
            RelationType::TaskNote => (EntityType::Task, EntityType::Note),
            RelationType::NoteTopic => (EntityType::Note, EntityType::Topic),
            RelationType::NoteCompany => (EntityType::Note, EntityType::Company),
            RelationType::NoteContact => (EntityType::Note, EntityType::Contact),
            RelationType::NoteSession => (EntityType::Note, EntityType::Session),
            RelationType::TaskSession => (EntityType::Task, EntityType::Session),
        }
    }

    /// Check whether this relationship may connect the two entity types,
    /// in either orientation.
    pub fn connects(&self, a: EntityType, b: EntityType) -> bool {
        let (x, y) = self.endpoints();
        (a == x && b == y) || (a == y && b == x)
    }

    /// Get the wire name of this relationship type.
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationType::TaskNote => "TASK_NOTE",
            RelationType::NoteTopic => "NOTE_TOPIC",
            RelationType::NoteCompany => "NOTE_COMPANY",
            RelationType::NoteContact => "NOTE_CONTACT",
            RelationType::NoteSession => "NOTE_SESSION",
            RelationType::TaskSession => "TASK_SESSION",
        }
    }
}

impl std::fmt::Display for RelationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Relationship Metadata
// ============================================================================

/// How a relationship came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    /// Suggested or created by an automated pipeline.
    Ai,
    /// Created by a person.
    Manual,
}

/// Metadata attached to a relationship at creation time.
///
/// `source` is written once and never mutated afterwards; statistics
/// partition strictly on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipMetadata {
    /// Provenance of the relationship.
    pub source: Provenance,
    /// When the relationship was created.
    pub created_at: DateTime<Utc>,
    /// Additional free-form fields.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl RelationshipMetadata {
    /// Create metadata with the given provenance, stamped now.
    pub fn new(source: Provenance) -> Self {
        Self {
            source,
            created_at: Utc::now(),
            extra: HashMap::new(),
        }
    }
}

impl Default for RelationshipMetadata {
    fn default() -> Self {
        Self::new(Provenance::Manual)
    }
}

// ============================================================================
// Relationships
// ============================================================================

/// A typed link between two entities.
///
/// The store keeps two physical rows per logical edge: the canonical row
/// and a direction-mirror sharing the same `id`. Exactly one of the pair
/// has `canonical = true`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    /// Logical identifier shared by the canonical row and its mirror.
    pub id: String,
    /// Type of relationship.
    pub relationship_type: RelationType,
    /// Type of the source entity.
    pub source_type: EntityType,
    /// ID of the source entity.
    pub source_id: String,
    /// Type of the target entity.
    pub target_type: EntityType,
    /// ID of the target entity.
    pub target_id: String,
    /// Creation metadata.
    #[serde(default)]
    pub metadata: RelationshipMetadata,
    /// Whether this is the canonical row of the pair.
    #[serde(default = "default_canonical")]
    pub canonical: bool,
}

fn default_canonical() -> bool {
    true
}

impl Relationship {
    /// The logical-edge signature: sorted endpoint ids plus type.
    ///
    /// Identical for the canonical row, its mirror, and any duplicate edge
    /// written in the opposite direction.
    pub fn signature(&self) -> EdgeSignature {
        EdgeSignature::new(&self.source_id, &self.target_id, self.relationship_type)
    }

    /// Check whether the relationship references the entity on either side.
    pub fn involves(&self, entity_id: &str) -> bool {
        self.source_id == entity_id || self.target_id == entity_id
    }

    /// The endpoint opposite the given entity, if the entity is an endpoint.
    pub fn opposite_endpoint(&self, entity_id: &str) -> Option<(EntityType, &str)> {
        if self.source_id == entity_id {
            Some((self.target_type, self.target_id.as_str()))
        } else if self.target_id == entity_id {
            Some((self.source_type, self.source_id.as_str()))
        } else {
            None
        }
    }

    /// The direction-mirror of this row: endpoints swapped, same id,
    /// `canonical = false`.
    pub fn mirrored(&self) -> Relationship {
        Relationship {
            id: self.id.clone(),
            relationship_type: self.relationship_type,
            source_type: self.target_type,
            source_id: self.target_id.clone(),
            target_type: self.source_type,
            target_id: self.source_id.clone(),
            metadata: self.metadata.clone(),
            canonical: false,
        }
    }
}

/// Duplicate-detection key for a logical edge, independent of direction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EdgeSignature {
    lo: String,
    hi: String,
    relationship_type: RelationType,
}

impl EdgeSignature {
    /// Build a signature from two endpoint ids and a relationship type.
    pub fn new(a: &str, b: &str, relationship_type: RelationType) -> Self {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        Self {
            lo: lo.to_string(),
            hi: hi.to_string(),
            relationship_type,
        }
    }
}

impl std::fmt::Display for EdgeSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.lo, self.hi, self.relationship_type)
    }
}

// ============================================================================
// Drafts
// ============================================================================

/// Parameters for adding a relationship.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRelationship {
    /// Type of the source entity.
    pub source_type: EntityType,
    /// ID of the source entity.
    pub source_id: String,
    /// Type of the target entity.
    pub target_type: EntityType,
    /// ID of the target entity.
    pub target_id: String,
    /// Type of relationship.
    pub relationship_type: RelationType,
    /// Optional metadata; defaults to manual provenance stamped now.
    #[serde(default)]
    pub metadata: Option<RelationshipMetadata>,
}

impl NewRelationship {
    /// Create a draft relationship between two entities.
    pub fn new(
        source_type: EntityType,
        source_id: impl Into<String>,
        target_type: EntityType,
        target_id: impl Into<String>,
        relationship_type: RelationType,
    ) -> Self {
        Self {
            source_type,
            source_id: source_id.into(),
            target_type,
            target_id: target_id.into(),
            relationship_type,
            metadata: None,
        }
    }

    /// Set the provenance.
    pub fn with_provenance(mut self, source: Provenance) -> Self {
        self.metadata.get_or_insert_with(RelationshipMetadata::default).source = source;
        self
    }

    /// Set the creation timestamp.
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.metadata
            .get_or_insert_with(RelationshipMetadata::default)
            .created_at = created_at;
        self
    }

    /// Add an extra metadata field.
    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata
            .get_or_insert_with(RelationshipMetadata::default)
            .extra
            .insert(key.into(), value);
        self
    }

    /// Check the draft against the pairing rules of its relationship type.
    pub fn pairing_is_valid(&self) -> bool {
        self.relationship_type
            .connects(self.source_type, self.target_type)
    }

    /// Materialize a canonical relationship row with the given id.
    pub fn to_relationship(&self, id: impl Into<String>) -> Relationship {
        Relationship {
            id: id.into(),
            relationship_type: self.relationship_type,
            source_type: self.source_type,
            source_id: self.source_id.clone(),
            target_type: self.target_type,
            target_id: self.target_id.clone(),
            metadata: self.metadata.clone().unwrap_or_default(),
            canonical: true,
        }
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// Aggregate counts over the confirmed relationship set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    /// Number of logical edges.
    pub total: usize,
    /// Edges with AI provenance.
    pub from_ai: usize,
    /// Edges with manual provenance.
    pub from_manual: usize,
}
