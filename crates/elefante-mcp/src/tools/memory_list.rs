//! Memory Listing Tool
//!
//! `elefanteMemoryListAll`: paginated scan of the vector store. Lock-free.

use std::sync::Arc;

use elefante_core::{MemoryOrchestrator, Result, SearchFilters};
use serde::Deserialize;
use serde_json::{json, Value};

use super::parse_args;

pub fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "limit": { "type": "integer", "minimum": 1, "maximum": 500, "default": 50 },
            "offset": { "type": "integer", "minimum": 0, "default": 0 },
            "includeArchived": { "type": "boolean", "default": false }
        }
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ListArgs {
    limit: Option<usize>,
    offset: Option<usize>,
    #[serde(default)]
    include_archived: bool,
}

pub async fn execute(orchestrator: &Arc<MemoryOrchestrator>, args: Option<Value>) -> Result<Value> {
    let args: ListArgs = parse_args(args)?;
    let limit = args.limit.unwrap_or(50).clamp(1, 500);
    let offset = args.offset.unwrap_or(0);

    let filters = SearchFilters {
        include_archived: args.include_archived,
        ..Default::default()
    };
    let memories = orchestrator.list_memories(limit, offset, &filters)?;

    let rows: Vec<Value> = memories
        .iter()
        .map(|memory| {
            json!({
                "memoryId": memory.id,
                "content": memory.content,
                "title": memory.title(),
                "layer": memory.layer,
                "sublayer": memory.sublayer,
                "memoryType": memory.memory_type,
                "importance": memory.importance,
                "status": memory.status,
                "namespace": memory.namespace,
                "canonicalKey": memory.canonical_key,
                "processingStatus": memory.processing_status,
                "tags": memory.tags,
                "createdAt": memory.created_at,
                "lastAccessed": memory.last_accessed,
                "accessCount": memory.access_count,
            })
        })
        .collect();

    Ok(json!({
        "success": true,
        "count": rows.len(),
        "offset": offset,
        "limit": limit,
        "memories": rows,
    }))
}
