//! System Tools
//!
//! `elefanteSystemEnable` / `elefanteSystemDisable` are backward-compatible
//! no-ops kept for clients that still perform the enable ceremony; locking
//! is transaction-scoped now. `elefanteSystemStatusGet` reports mode, lock
//! state, and store statistics.

use std::sync::Arc;

use elefante_core::{MemoryOrchestrator, Result};
use serde_json::{json, Value};

pub fn enable_schema() -> Value {
    json!({
        "type": "object",
        "properties": {},
        "additionalProperties": false
    })
}

pub fn disable_schema() -> Value {
    enable_schema()
}

pub fn status_schema() -> Value {
    enable_schema()
}

/// Compat no-op: operations auto-acquire and release locks per call.
pub async fn execute_enable(orchestrator: &Arc<MemoryOrchestrator>) -> Result<Value> {
    let status = orchestrator.status()?;
    Ok(json!({
        "success": true,
        "mode": "transaction-scoped",
        "note": "Elefante no longer requires an enable ceremony; writes lock per operation",
        "status": status,
    }))
}

/// Compat no-op counterpart of `execute_enable`.
pub async fn execute_disable(orchestrator: &Arc<MemoryOrchestrator>) -> Result<Value> {
    let status = orchestrator.status()?;
    Ok(json!({
        "success": true,
        "mode": "transaction-scoped",
        "note": "Nothing to disable; writes lock per operation",
        "status": status,
    }))
}

pub async fn execute_status(orchestrator: &Arc<MemoryOrchestrator>) -> Result<Value> {
    let status = orchestrator.status()?;
    let etl = orchestrator.etl_status()?;
    Ok(json!({
        "success": true,
        "status": status,
        "etl": etl,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use elefante_core::EngineConfig;

    fn orchestrator() -> Arc<MemoryOrchestrator> {
        let dir = std::env::temp_dir().join(format!("elefante-sys-{}", uuid::Uuid::new_v4()));
        let mut config = EngineConfig::with_data_dir(dir);
        config.embedding_dimensions = 32;
        Arc::new(MemoryOrchestrator::open(config).unwrap())
    }

    #[tokio::test]
    async fn test_enable_disable_are_noops() {
        let orch = orchestrator();
        let enabled = execute_enable(&orch).await.unwrap();
        assert_eq!(enabled["success"], true);
        let disabled = execute_disable(&orch).await.unwrap();
        assert_eq!(disabled["success"], true);
    }

    #[tokio::test]
    async fn test_status_reports_stores() {
        let orch = orchestrator();
        let status = execute_status(&orch).await.unwrap();
        assert_eq!(status["status"]["vector"]["count"], 0);
        assert_eq!(status["status"]["lock"]["locked"], false);
        assert_eq!(status["etl"]["total"], 0);
    }
}
