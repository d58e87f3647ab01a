//! Hybrid Search Tool
//!
//! `elefanteMemorySearch`: parallel vector + graph + conversation retrieval
//! with adaptive weighting and near-duplicate merging. Lock-free.

use std::sync::Arc;

use elefante_core::{
    EngineError, Layer, MemoryOrchestrator, MemoryStatus, MemoryType, Namespace, QueryMode,
    Result, SearchFilters, SearchParams,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use super::parse_args;

pub fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "query": { "type": "string", "description": "Search query" },
            "mode": {
                "type": "string",
                "enum": ["semantic", "structured", "hybrid"],
                "default": "hybrid"
            },
            "limit": { "type": "integer", "minimum": 1, "maximum": 100, "default": 10 },
            "minSimilarity": { "type": "number", "minimum": 0.0, "maximum": 1.0, "default": 0.3 },
            "includeConversation": {
                "type": "boolean",
                "default": false,
                "description": "Blend recent session messages into the ranking"
            },
            "includeStored": { "type": "boolean", "default": true },
            "sessionId": { "type": "string", "format": "uuid" },
            "filters": {
                "type": "object",
                "properties": {
                    "layer": { "type": "string", "enum": ["self", "world", "intent"] },
                    "sublayer": { "type": "string" },
                    "memoryType": { "type": "string" },
                    "status": { "type": "string" },
                    "namespace": { "type": "string", "enum": ["prod", "test", "ephemeral"] },
                    "project": { "type": "string" },
                    "tags": { "type": "array", "items": { "type": "string" } },
                    "minImportance": { "type": "integer", "minimum": 1, "maximum": 10 }
                }
            }
        },
        "required": ["query"]
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct FilterArgs {
    layer: Option<String>,
    sublayer: Option<String>,
    memory_type: Option<String>,
    status: Option<String>,
    namespace: Option<String>,
    project: Option<String>,
    tags: Option<Vec<String>>,
    min_importance: Option<u8>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct SearchArgs {
    query: String,
    mode: Option<String>,
    limit: Option<usize>,
    min_similarity: Option<f32>,
    #[serde(default)]
    include_conversation: bool,
    include_stored: Option<bool>,
    session_id: Option<Uuid>,
    filters: Option<FilterArgs>,
}

impl FilterArgs {
    fn into_filters(self) -> Result<SearchFilters> {
        let mut filters = SearchFilters::default();
        if let Some(layer) = self.layer {
            filters.layer = Some(
                Layer::parse(&layer)
                    .ok_or_else(|| EngineError::InvalidInput(format!("unknown layer: {layer}")))?,
            );
        }
        filters.sublayer = self.sublayer;
        if let Some(memory_type) = self.memory_type {
            filters.memory_type = Some(MemoryType::parse(&memory_type).ok_or_else(|| {
                EngineError::InvalidInput(format!("unknown memoryType: {memory_type}"))
            })?);
        }
        if let Some(status) = self.status {
            filters.status = Some(
                MemoryStatus::parse(&status)
                    .ok_or_else(|| EngineError::InvalidInput(format!("unknown status: {status}")))?,
            );
        }
        if let Some(namespace) = self.namespace {
            filters.namespace = Some(Namespace::parse(&namespace).ok_or_else(|| {
                EngineError::InvalidInput(format!("unknown namespace: {namespace}"))
            })?);
        }
        filters.project = self.project;
        filters.tags = self.tags;
        filters.min_importance = self.min_importance;
        Ok(filters)
    }
}

pub async fn execute(orchestrator: &Arc<MemoryOrchestrator>, args: Option<Value>) -> Result<Value> {
    let args: SearchArgs = parse_args(args)?;

    let mode = match args.mode {
        None => QueryMode::Hybrid,
        Some(raw) => QueryMode::parse(&raw)
            .ok_or_else(|| EngineError::InvalidInput(format!("unknown mode: {raw}")))?,
    };

    let params = SearchParams {
        query: args.query,
        mode,
        limit: args.limit.unwrap_or(10).clamp(1, 100),
        filters: args.filters.unwrap_or_default().into_filters()?,
        min_similarity: args.min_similarity.unwrap_or(0.3),
        include_conversation: args.include_conversation,
        include_stored: args.include_stored.unwrap_or(true),
        session_id: args.session_id,
    };

    let results = orchestrator.search(params).await?;
    let rows: Vec<Value> = results
        .iter()
        .map(|result| {
            json!({
                "memoryId": result.memory.id,
                "content": result.memory.content,
                "score": result.score,
                "source": result.source,
                "sources": result.sources,
                "mergedFrom": result.merged_from,
                "memoryType": result.memory.memory_type,
                "layer": result.memory.layer,
                "importance": result.memory.importance,
                "tags": result.memory.tags,
                "sessionId": result.memory.session_id,
                "createdAt": result.memory.created_at,
            })
        })
        .collect();

    Ok(json!({
        "success": true,
        "count": rows.len(),
        "results": rows,
    }))
}
