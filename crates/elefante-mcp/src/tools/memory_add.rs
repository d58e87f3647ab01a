//! Memory Ingestion Tool
//!
//! `elefanteMemoryAdd`: store one memory through the full pipeline
//! (classification hints, dedup probe, fan-out writes, auto-linking).

use std::sync::Arc;

use elefante_core::{
    AddMemoryInput, Domain, EngineError, EntityRef, Layer, MemoryOrchestrator, MemorySource,
    MemoryType, MetaMap, Result,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use super::parse_args;

pub fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "content": {
                "type": "string",
                "description": "The memory content to store (1..10000 chars)"
            },
            "layer": {
                "type": "string",
                "enum": ["self", "world", "intent"],
                "description": "self (who I am), world (facts), intent (rules/goals)"
            },
            "sublayer": {
                "type": "string",
                "description": "identity/preference/constraint (self), fact/failure/method (world), rule/goal/anti-pattern (intent)"
            },
            "domain": {
                "type": "string",
                "enum": ["work", "personal", "learning", "project", "reference", "system"]
            },
            "category": { "type": "string" },
            "memoryType": {
                "type": "string",
                "enum": ["conversation", "fact", "insight", "code", "decision", "task", "note",
                         "preference", "question", "answer", "hypothesis", "observation"]
            },
            "intent": { "type": "string" },
            "importance": { "type": "integer", "minimum": 1, "maximum": 10 },
            "source": {
                "type": "string",
                "enum": ["user_input", "agent_generated", "system_inferred", "external_api",
                         "document", "web_scrape", "code_analysis"]
            },
            "tags": { "type": "array", "items": { "type": "string" } },
            "entities": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "name": { "type": "string" },
                        "entityType": { "type": "string" },
                        "description": { "type": "string" }
                    },
                    "required": ["name"]
                },
                "description": "Entities to upsert and link to this memory"
            },
            "metadata": {
                "type": "object",
                "description": "Scalar custom metadata; title/canonical_key/namespace are honored"
            },
            "sessionId": { "type": "string", "format": "uuid" },
            "project": { "type": "string" },
            "filePath": { "type": "string" },
            "forceNew": {
                "type": "boolean",
                "description": "Skip all dedup linking and always create a new record",
                "default": false
            }
        },
        "required": ["content"]
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct AddArgs {
    content: String,
    layer: Option<String>,
    sublayer: Option<String>,
    domain: Option<String>,
    category: Option<String>,
    memory_type: Option<String>,
    intent: Option<String>,
    importance: Option<u8>,
    source: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    entities: Vec<EntityRef>,
    metadata: Option<MetaMap>,
    session_id: Option<Uuid>,
    project: Option<String>,
    file_path: Option<String>,
    #[serde(default)]
    force_new: bool,
}

fn parse_enum<T>(field: &str, value: Option<String>, parse: impl Fn(&str) -> Option<T>) -> Result<Option<T>> {
    match value {
        None => Ok(None),
        Some(raw) => parse(&raw)
            .map(Some)
            .ok_or_else(|| EngineError::InvalidInput(format!("unknown {field}: {raw}"))),
    }
}

pub async fn execute(orchestrator: &Arc<MemoryOrchestrator>, args: Option<Value>) -> Result<Value> {
    let args: AddArgs = parse_args(args)?;

    let input = AddMemoryInput {
        content: args.content,
        memory_type: parse_enum("memoryType", args.memory_type, MemoryType::parse)?,
        layer: parse_enum("layer", args.layer, Layer::parse)?,
        sublayer: args.sublayer,
        domain: parse_enum("domain", args.domain, Domain::parse)?,
        category: args.category,
        intent: args.intent,
        importance: args.importance,
        source: parse_enum("source", args.source, MemorySource::parse)?,
        tags: args.tags,
        entities: args.entities,
        metadata: args.metadata.unwrap_or_default(),
        session_id: args.session_id,
        project: args.project,
        file_path: args.file_path,
        force_new: args.force_new,
    };

    match orchestrator.add_memory(input).await? {
        None => Ok(json!({
            "success": true,
            "quarantined": true,
            "message": "Test-namespace memory quarantined (set ELEFANTE_ALLOW_TEST_MEMORIES=1 to persist)",
        })),
        Some(result) => {
            Ok(json!({
                "success": true,
                "memoryId": result.memory.id,
                "status": result.outcome,
                "relatedId": result.related_id,
                "namespace": result.memory.namespace,
                "canonicalKey": result.memory.canonical_key,
                "importance": result.memory.importance,
                "accessCount": result.memory.access_count,
                "tags": result.memory.tags,
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use elefante_core::EngineConfig;

    fn orchestrator() -> Arc<MemoryOrchestrator> {
        let dir = std::env::temp_dir().join(format!("elefante-add-{}", Uuid::new_v4()));
        let mut config = EngineConfig::with_data_dir(dir);
        config.embedding_dimensions = 32;
        Arc::new(MemoryOrchestrator::open(config).unwrap())
    }

    #[tokio::test]
    async fn test_add_minimal() {
        let orch = orchestrator();
        let result = execute(
            &orch,
            Some(json!({"content": "The pipeline deploys on merge to main"})),
        )
        .await
        .unwrap();
        assert_eq!(result["success"], true);
        assert_eq!(result["status"], "new");
        assert!(result["memoryId"].is_string());
    }

    #[tokio::test]
    async fn test_add_with_hints() {
        let orch = orchestrator();
        let result = execute(
            &orch,
            Some(json!({
                "content": "I prefer tabs over spaces",
                "layer": "self",
                "sublayer": "preference",
                "memoryType": "preference",
                "importance": 8,
                "tags": ["style"]
            })),
        )
        .await
        .unwrap();
        assert_eq!(result["success"], true);
        assert_eq!(result["importance"], 8);
    }

    #[tokio::test]
    async fn test_add_rejects_bad_enum() {
        let orch = orchestrator();
        let err = execute(
            &orch,
            Some(json!({"content": "x", "layer": "cosmic"})),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), "invalid_input");
    }

    #[tokio::test]
    async fn test_add_missing_content_rejected() {
        let orch = orchestrator();
        let err = execute(&orch, Some(json!({"importance": 3}))).await.unwrap_err();
        assert_eq!(err.kind(), "invalid_input");
    }

    #[tokio::test]
    async fn test_duplicate_reports_reinforced() {
        let orch = orchestrator();
        let args = json!({"content": "Exactly the same sentence for dedup"});
        let first = execute(&orch, Some(args.clone())).await.unwrap();
        let second = execute(&orch, Some(args)).await.unwrap();
        assert_eq!(second["status"], "reinforced");
        assert_eq!(second["memoryId"], first["memoryId"]);
    }
}
