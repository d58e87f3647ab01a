//! Entities and Relationships - the property-graph side of the model
//!
//! Every memory is mirrored as an entity of type `memory` with the same id,
//! so edges can target memories and plain entities uniformly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::memory::record::MetaMap;

// ============================================================================
// ENTITY
// ============================================================================

/// Graph node type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Person,
    Project,
    File,
    #[default]
    Concept,
    Technology,
    Task,
    Organization,
    Location,
    Event,
    Session,
    Memory,
    Custom,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Person => "person",
            EntityType::Project => "project",
            EntityType::File => "file",
            EntityType::Concept => "concept",
            EntityType::Technology => "technology",
            EntityType::Task => "task",
            EntityType::Organization => "organization",
            EntityType::Location => "location",
            EntityType::Event => "event",
            EntityType::Session => "session",
            EntityType::Memory => "memory",
            EntityType::Custom => "custom",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "person" => Some(EntityType::Person),
            "project" => Some(EntityType::Project),
            "file" => Some(EntityType::File),
            "concept" => Some(EntityType::Concept),
            "technology" => Some(EntityType::Technology),
            "task" => Some(EntityType::Task),
            "organization" => Some(EntityType::Organization),
            "location" => Some(EntityType::Location),
            "event" => Some(EntityType::Event),
            "session" => Some(EntityType::Session),
            "memory" => Some(EntityType::Memory),
            "custom" => Some(EntityType::Custom),
            _ => None,
        }
    }
}

/// A graph node
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub id: Uuid,
    /// Display name (1..200 chars)
    pub name: String,
    pub entity_type: EntityType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Stored as one JSON-encoded column in the graph store
    #[serde(default)]
    pub properties: MetaMap,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Entity {
    pub fn new(name: impl Into<String>, entity_type: EntityType) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            entity_type,
            description: None,
            created_at: Utc::now(),
            properties: MetaMap::new(),
            tags: vec![],
        }
    }

    /// Maximum entity name length
    pub const MAX_NAME_CHARS: usize = 200;

    pub fn name_is_valid(name: &str) -> bool {
        let chars = name.chars().count();
        chars >= 1 && chars <= Self::MAX_NAME_CHARS
    }
}

// ============================================================================
// RELATIONSHIP
// ============================================================================

/// Directed edge type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipType {
    #[default]
    RelatesTo,
    DependsOn,
    PartOf,
    CreatedBy,
    CreatedIn,
    Uses,
    Blocks,
    References,
    SimilarTo,
    Supersedes,
    ParentOf,
    ChildOf,
    Custom,
}

impl RelationshipType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipType::RelatesTo => "RELATES_TO",
            RelationshipType::DependsOn => "DEPENDS_ON",
            RelationshipType::PartOf => "PART_OF",
            RelationshipType::CreatedBy => "CREATED_BY",
            RelationshipType::CreatedIn => "CREATED_IN",
            RelationshipType::Uses => "USES",
            RelationshipType::Blocks => "BLOCKS",
            RelationshipType::References => "REFERENCES",
            RelationshipType::SimilarTo => "SIMILAR_TO",
            RelationshipType::Supersedes => "SUPERSEDES",
            RelationshipType::ParentOf => "PARENT_OF",
            RelationshipType::ChildOf => "CHILD_OF",
            RelationshipType::Custom => "CUSTOM",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "RELATES_TO" => Some(RelationshipType::RelatesTo),
            "DEPENDS_ON" => Some(RelationshipType::DependsOn),
            "PART_OF" => Some(RelationshipType::PartOf),
            "CREATED_BY" => Some(RelationshipType::CreatedBy),
            "CREATED_IN" => Some(RelationshipType::CreatedIn),
            "USES" => Some(RelationshipType::Uses),
            "BLOCKS" => Some(RelationshipType::Blocks),
            "REFERENCES" => Some(RelationshipType::References),
            "SIMILAR_TO" => Some(RelationshipType::SimilarTo),
            "SUPERSEDES" => Some(RelationshipType::Supersedes),
            "PARENT_OF" => Some(RelationshipType::ParentOf),
            "CHILD_OF" => Some(RelationshipType::ChildOf),
            "CUSTOM" => Some(RelationshipType::Custom),
            _ => None,
        }
    }

    /// The type persisted at write time. `CUSTOM` edges land in the default
    /// relation, matching the engine's merging semantics.
    pub fn storage_type(&self) -> Self {
        match self {
            RelationshipType::Custom => RelationshipType::RelatesTo,
            other => *other,
        }
    }
}

/// A directed, typed edge between two entities
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    pub from_entity_id: Uuid,
    pub to_entity_id: Uuid,
    pub relationship_type: RelationshipType,
    /// Optional edge weight in [0, 1]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strength: Option<f32>,
    #[serde(default)]
    pub properties: MetaMap,
}

impl Relationship {
    pub fn new(from: Uuid, to: Uuid, relationship_type: RelationshipType) -> Self {
        Self {
            from_entity_id: from,
            to_entity_id: to,
            relationship_type,
            strength: None,
            properties: MetaMap::new(),
        }
    }
}

// ============================================================================
// SESSION
// ============================================================================

/// Session registry row, backed by an entity of type `session`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub session_id: Uuid,
    pub interaction_count: u64,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

// ============================================================================
// TESTS
// ============================================================================
