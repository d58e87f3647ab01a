//! Test Harness
//!
//! Disposable engine instances rooted in temp directories, wired to the
//! concept-table mock embedder. The temp directory lives as long as the
//! harness value.

use std::sync::Arc;

use elefante_core::{
    AddMemoryInput, EngineConfig, Layer, MemoryOrchestrator, MemoryType, MetaValue,
};
use tempfile::TempDir;
use uuid::Uuid;

use crate::mocks::ConceptEmbedder;

/// One disposable engine
pub struct TestEngine {
    pub orchestrator: Arc<MemoryOrchestrator>,
    _dir: TempDir,
}

impl TestEngine {
    /// Engine with default configuration (test memories quarantined).
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    /// Engine that persists test-namespace memories.
    pub fn allowing_test_memories() -> Self {
        Self::with_config(|config| config.allow_test_memories = true)
    }

    pub fn with_config(tune: impl FnOnce(&mut EngineConfig)) -> Self {
        let dir = TempDir::new().expect("temp dir");
        let mut config = EngineConfig::with_data_dir(dir.path());
        config.acquire_timeout_secs = 1;
        tune(&mut config);

        let orchestrator =
            MemoryOrchestrator::with_embedder(config, Arc::new(ConceptEmbedder::new()))
                .expect("orchestrator");
        Self {
            orchestrator: Arc::new(orchestrator),
            _dir: dir,
        }
    }
}

impl Default for TestEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Plain ingestion input with mid importance.
pub fn input(content: &str) -> AddMemoryInput {
    AddMemoryInput {
        content: content.to_string(),
        importance: Some(5),
        ..Default::default()
    }
}

/// Self-layer preference input.
pub fn preference_input(content: &str) -> AddMemoryInput {
    AddMemoryInput {
        layer: Some(Layer::Self_),
        sublayer: Some("preference".to_string()),
        memory_type: Some(MemoryType::Preference),
        importance: Some(8),
        ..input(content)
    }
}

/// Session-scoped conversation turn.
pub fn conversation_input(content: &str, session_id: Uuid) -> AddMemoryInput {
    AddMemoryInput {
        memory_type: Some(MemoryType::Conversation),
        session_id: Some(session_id),
        ..input(content)
    }
}

/// Attach a title (drives title-based reassertion and canonical slugs).
pub fn with_title(mut input: AddMemoryInput, title: &str) -> AddMemoryInput {
    input.metadata.insert("title".to_string(), MetaValue::from(title));
    input
}
