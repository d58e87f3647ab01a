//! Agent-Driven ETL Tools
//!
//! `elefanteETLProcess` surfaces raw memories with hints,
//! `elefanteETLClassify` persists the agent's topology decision, and
//! `elefanteETLStatus` reports pipeline counters.

use std::sync::Arc;

use elefante_core::{EtlClassification, MemoryOrchestrator, Result};
use serde_json::{json, Value};

use super::parse_args;

pub fn process_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "limit": {
                "type": "integer",
                "minimum": 1,
                "maximum": 100,
                "default": 10,
                "description": "Maximum raw memories to surface (each moves to 'processing')"
            }
        }
    })
}

pub fn classify_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "memoryId": { "type": "string", "format": "uuid" },
            "ring": { "type": "string", "enum": ["core", "domain", "topic", "leaf"] },
            "knowledgeType": {
                "type": "string",
                "enum": ["law", "principle", "method", "decision", "insight", "preference", "fact"]
            },
            "topic": { "type": "string", "description": "Short tag, e.g. coding-standards" },
            "summary": { "type": "string", "maxLength": 200 },
            "ownerId": { "type": "string" }
        },
        "required": ["memoryId", "ring", "knowledgeType", "topic", "summary"]
    })
}

pub fn status_schema() -> Value {
    json!({
        "type": "object",
        "properties": {},
        "additionalProperties": false
    })
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ProcessArgs {
    limit: Option<usize>,
}

pub async fn execute_process(
    orchestrator: &Arc<MemoryOrchestrator>,
    args: Option<Value>,
) -> Result<Value> {
    let args: ProcessArgs = parse_args(args)?;
    let items = orchestrator.etl_process(args.limit.unwrap_or(10).clamp(1, 100))?;
    Ok(json!({
        "success": true,
        "count": items.len(),
        "items": items,
    }))
}

pub async fn execute_classify(
    orchestrator: &Arc<MemoryOrchestrator>,
    args: Option<Value>,
) -> Result<Value> {
    let input: EtlClassification = parse_args(args)?;
    let memory = orchestrator.etl_classify(&input)?;
    Ok(json!({
        "success": true,
        "memoryId": memory.id,
        "ring": memory.ring,
        "knowledgeType": memory.knowledge_type,
        "topic": memory.topic,
        "summary": memory.summary,
        "ownerId": memory.owner_id,
        "processingStatus": memory.processing_status,
    }))
}

pub async fn execute_status(orchestrator: &Arc<MemoryOrchestrator>) -> Result<Value> {
    let status = orchestrator.etl_status()?;
    Ok(json!({
        "success": true,
        "status": status,
    }))
}
