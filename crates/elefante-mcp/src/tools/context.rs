//! Context Retrieval Tool
//!
//! `elefanteContextGet`: session-scoped memories plus the graph
//! neighborhood around them, up to a bounded depth. Lock-free.

use std::sync::Arc;

use elefante_core::{MemoryOrchestrator, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use super::parse_args;

pub fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "sessionId": {
                "type": "string",
                "format": "uuid",
                "description": "Restrict to one session; omit for recent global context"
            },
            "depth": { "type": "integer", "minimum": 1, "maximum": 3, "default": 2 },
            "limit": { "type": "integer", "minimum": 1, "maximum": 100, "default": 10 }
        }
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ContextArgs {
    session_id: Option<Uuid>,
    depth: Option<usize>,
    limit: Option<usize>,
}

pub async fn execute(orchestrator: &Arc<MemoryOrchestrator>, args: Option<Value>) -> Result<Value> {
    let args: ContextArgs = parse_args(args)?;
    let depth = args.depth.unwrap_or(2).clamp(1, 3);
    let limit = args.limit.unwrap_or(10).clamp(1, 100);

    let bundle = orchestrator.get_context(args.session_id, depth, limit).await?;

    let memories: Vec<Value> = bundle
        .memories
        .iter()
        .map(|memory| {
            json!({
                "memoryId": memory.id,
                "content": memory.content,
                "memoryType": memory.memory_type,
                "importance": memory.importance,
                "sessionId": memory.session_id,
                "createdAt": memory.created_at,
            })
        })
        .collect();
    let entities: Vec<Value> = bundle
        .entities
        .iter()
        .map(|entity| {
            json!({
                "entityId": entity.id,
                "name": entity.name,
                "entityType": entity.entity_type,
                "description": entity.description,
            })
        })
        .collect();
    let relationships: Vec<Value> = bundle
        .relationships
        .iter()
        .map(|rel| {
            json!({
                "from": rel.from_entity_id,
                "to": rel.to_entity_id,
                "relationshipType": rel.relationship_type,
                "strength": rel.strength,
            })
        })
        .collect();

    Ok(json!({
        "success": true,
        "memories": memories,
        "entities": entities,
        "relationships": relationships,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use elefante_core::EngineConfig;

    #[tokio::test]
    async fn test_context_includes_linked_entities() {
        let dir = std::env::temp_dir().join(format!("elefante-ctx-{}", Uuid::new_v4()));
        let mut config = EngineConfig::with_data_dir(dir);
        config.embedding_dimensions = 32;
        let orch = Arc::new(MemoryOrchestrator::open(config).unwrap());

        super::super::memory_add::execute(
            &orch,
            Some(json!({
                "content": "TestEntity powers the ingest flow",
                "entities": [{"name": "TestEntity", "entityType": "concept"}]
            })),
        )
        .await
        .unwrap();

        let context = execute(&orch, Some(json!({"depth": 2, "limit": 10}))).await.unwrap();
        assert_eq!(context["success"], true);
        assert_eq!(context["memories"].as_array().unwrap().len(), 1);
        let entities = context["entities"].as_array().unwrap();
        assert!(entities.iter().any(|e| e["name"] == "TestEntity"));
        let rels = context["relationships"].as_array().unwrap();
        assert!(rels.iter().any(|r| r["relationshipType"] == "RELATES_TO"));
    }
}
