//! Session Listing Tool
//!
//! `elefanteSessionsList`: paginated view of the session registry.
//! Lock-free.

use std::sync::Arc;

use elefante_core::{MemoryOrchestrator, Result};
use serde::Deserialize;
use serde_json::{json, Value};

use super::parse_args;

pub fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "limit": { "type": "integer", "minimum": 1, "maximum": 200, "default": 20 },
            "offset": { "type": "integer", "minimum": 0, "default": 0 }
        }
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct SessionsArgs {
    limit: Option<usize>,
    offset: Option<usize>,
}

pub async fn execute(orchestrator: &Arc<MemoryOrchestrator>, args: Option<Value>) -> Result<Value> {
    let args: SessionsArgs = parse_args(args)?;
    let sessions = orchestrator.list_sessions(
        args.limit.unwrap_or(20).clamp(1, 200),
        args.offset.unwrap_or(0),
    )?;
    Ok(json!({
        "success": true,
        "count": sessions.len(),
        "sessions": sessions,
    }))
}
