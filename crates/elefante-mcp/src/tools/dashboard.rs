//! Dashboard Tool
//!
//! `elefanteDashboardOpen`: optionally rebuild the snapshot consumed by the
//! external dashboard UI, then return its location. The snapshot refresh is
//! the only part that takes the write lock.

use std::sync::Arc;

use elefante_core::{MemoryOrchestrator, Result};
use serde::Deserialize;
use serde_json::{json, Value};

use super::parse_args;
use crate::snapshot;

pub fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "refresh": {
                "type": "boolean",
                "default": true,
                "description": "Rebuild the snapshot from both stores before returning"
            }
        }
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct DashboardArgs {
    refresh: Option<bool>,
}

/// Whether this invocation mutates the snapshot file (drives locking).
pub fn wants_refresh(args: &Option<Value>) -> bool {
    args.as_ref()
        .and_then(|a| a.get("refresh"))
        .and_then(Value::as_bool)
        .unwrap_or(true)
}

pub async fn execute(orchestrator: &Arc<MemoryOrchestrator>, args: Option<Value>) -> Result<Value> {
    let args: DashboardArgs = parse_args(args)?;
    let path = orchestrator.config().snapshot_path();

    let refreshed = if args.refresh.unwrap_or(true) {
        let snapshot = snapshot::refresh(orchestrator, &path)?;
        Some(snapshot.stats)
    } else {
        None
    };

    Ok(json!({
        "success": true,
        "url": format!("file://{}", path.display()),
        "snapshotPath": path,
        "refreshed": refreshed.is_some(),
        "stats": refreshed,
    }))
}
