//! Graph Tools
//!
//! `elefanteGraphEntityCreate` / `elefanteGraphRelationshipCreate` upsert
//! nodes and edges, `elefanteGraphConnect` batches both with client refs,
//! and `elefanteGraphQuery` runs read-only parameterized queries (the
//! safety filter rejects destructive keywords).

use std::sync::Arc;

use elefante_core::{
    ConnectEntity, ConnectRelationship, EngineError, EntityType, MemoryOrchestrator,
    Relationship, RelationshipType, Result,
};
use serde::Deserialize;
use serde_json::{json, Map as JsonMap, Value};
use uuid::Uuid;

use super::parse_args;

// ============================================================================
// SCHEMAS
// ============================================================================

pub fn entity_create_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "name": { "type": "string", "description": "Entity name (1..200 chars)" },
            "entityType": {
                "type": "string",
                "enum": ["person", "project", "file", "concept", "technology", "task",
                         "organization", "location", "event", "session", "memory", "custom"]
            },
            "description": { "type": "string" }
        },
        "required": ["name", "entityType"]
    })
}

pub fn relationship_create_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "fromEntityId": { "type": "string", "format": "uuid" },
            "toEntityId": { "type": "string", "format": "uuid" },
            "relationshipType": {
                "type": "string",
                "enum": ["RELATES_TO", "DEPENDS_ON", "PART_OF", "CREATED_BY", "CREATED_IN",
                         "USES", "BLOCKS", "REFERENCES", "SIMILAR_TO", "SUPERSEDES",
                         "PARENT_OF", "CHILD_OF", "CUSTOM"]
            },
            "strength": { "type": "number", "minimum": 0.0, "maximum": 1.0 }
        },
        "required": ["fromEntityId", "toEntityId", "relationshipType"]
    })
}

pub fn connect_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "entities": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "ref": { "type": "string", "description": "Client-side reference key" },
                        "name": { "type": "string" },
                        "entityType": { "type": "string" },
                        "description": { "type": "string" }
                    },
                    "required": ["name"]
                }
            },
            "relationships": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "from": { "type": "string", "description": "Ref, entity name, or UUID" },
                        "to": { "type": "string" },
                        "relationshipType": { "type": "string" },
                        "strength": { "type": "number" }
                    },
                    "required": ["from", "to"]
                }
            }
        }
    })
}

pub fn query_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "query": {
                "type": "string",
                "description": "Read-only query over entities/edges; DELETE, DROP and REMOVE are rejected"
            },
            "params": {
                "type": "object",
                "description": "Named scalar parameters, referenced as :name"
            }
        },
        "required": ["query"]
    })
}

// ============================================================================
// EXECUTORS
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct EntityCreateArgs {
    name: String,
    entity_type: String,
    description: Option<String>,
}

pub async fn execute_entity_create(
    orchestrator: &Arc<MemoryOrchestrator>,
    args: Option<Value>,
) -> Result<Value> {
    let args: EntityCreateArgs = parse_args(args)?;
    let entity_type = EntityType::parse(&args.entity_type)
        .ok_or_else(|| EngineError::InvalidInput(format!("unknown entityType: {}", args.entity_type)))?;

    let entity = orchestrator.upsert_entity(&args.name, entity_type, args.description.as_deref())?;
    Ok(json!({
        "success": true,
        "entityId": entity.id,
        "name": entity.name,
        "entityType": entity.entity_type,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RelationshipCreateArgs {
    from_entity_id: Uuid,
    to_entity_id: Uuid,
    relationship_type: String,
    strength: Option<f32>,
}

pub async fn execute_relationship_create(
    orchestrator: &Arc<MemoryOrchestrator>,
    args: Option<Value>,
) -> Result<Value> {
    let args: RelationshipCreateArgs = parse_args(args)?;
    let relationship_type = RelationshipType::parse(&args.relationship_type).ok_or_else(|| {
        EngineError::InvalidInput(format!("unknown relationshipType: {}", args.relationship_type))
    })?;

    let mut relationship =
        Relationship::new(args.from_entity_id, args.to_entity_id, relationship_type);
    relationship.strength = args.strength;
    orchestrator.create_relationship(&relationship)?;

    Ok(json!({
        "success": true,
        "from": args.from_entity_id,
        "to": args.to_entity_id,
        "relationshipType": relationship_type,
    }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ConnectArgs {
    #[serde(default)]
    entities: Vec<ConnectEntity>,
    #[serde(default)]
    relationships: Vec<ConnectRelationship>,
}

pub async fn execute_connect(
    orchestrator: &Arc<MemoryOrchestrator>,
    args: Option<Value>,
) -> Result<Value> {
    let args: ConnectArgs = parse_args(args)?;
    let (entities, relationships_created) =
        orchestrator.graph_connect(&args.entities, &args.relationships)?;

    let rows: Vec<Value> = entities
        .iter()
        .map(|entity| json!({"entityId": entity.id, "name": entity.name}))
        .collect();
    Ok(json!({
        "success": true,
        "entities": rows,
        "relationshipsCreated": relationships_created,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct QueryArgs {
    query: String,
    #[serde(default)]
    params: JsonMap<String, Value>,
}

pub async fn execute_query(
    orchestrator: &Arc<MemoryOrchestrator>,
    args: Option<Value>,
) -> Result<Value> {
    let args: QueryArgs = parse_args(args)?;
    let rows = orchestrator.graph_query(&args.query, &args.params)?;
    Ok(json!({
        "success": true,
        "count": rows.len(),
        "rows": rows,
    }))
}

// ============================================================================
// TESTS
// ============================================================================
