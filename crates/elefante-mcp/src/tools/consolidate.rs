//! Memory Consolidation Tool
//!
//! `elefanteMemoryConsolidate`: run the deterministic refinery. Dry-run by
//! default; apply mode runs under the write lock with a longer timeout.

use std::sync::Arc;

use elefante_core::{MemoryOrchestrator, Result};
use serde::Deserialize;
use serde_json::{json, Value};

use super::parse_args;

pub fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "apply": {
                "type": "boolean",
                "default": false,
                "description": "Write the plan back; false returns the plan and stats only"
            }
        }
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ConsolidateArgs {
    #[serde(default)]
    pub apply: bool,
}

/// Whether this invocation mutates the stores (drives dispatcher locking).
pub fn wants_apply(args: &Option<Value>) -> bool {
    args.as_ref()
        .and_then(|a| a.get("apply"))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

pub async fn execute(orchestrator: &Arc<MemoryOrchestrator>, args: Option<Value>) -> Result<Value> {
    let args: ConsolidateArgs = parse_args(args)?;
    let report = orchestrator.consolidate(args.apply)?;
    Ok(json!({
        "success": true,
        "applied": report.applied,
        "changed": report.changed,
        "stats": report.stats,
    }))
}
