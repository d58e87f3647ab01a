//! Agent-Driven ETL Loop
//!
//! The engine never calls a model. Ambiguous memories are surfaced to the
//! external agent (`process`), which classifies them with its own judgment
//! and writes the result back (`classify`). `processing_status` tracks every
//! memory through raw → processing → processed, with a bounded retry budget
//! before a memory is parked as failed.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::embeddings::Embedder;
use crate::error::{EngineError, Result};
use crate::memory::query::SearchFilters;
use crate::memory::record::{
    KnowledgeType, Memory, MemoryPatch, MetaValue, ProcessingStatus, Ring, MAX_SUMMARY_CHARS,
};
use crate::vector::VectorStore;

/// Validation failures tolerated before a memory is marked failed
pub const MAX_CLASSIFY_ATTEMPTS: i64 = 3;

/// Custom-metadata key tracking failed classification attempts
const ATTEMPTS_KEY: &str = "etl_attempts";

// ============================================================================
// SURFACE TYPES
// ============================================================================

/// Hints handed to the agent with each raw memory
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EtlHints {
    pub layer: String,
    pub sublayer: String,
    pub memory_type: String,
    pub importance: u8,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// One memory surfaced for agent classification
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EtlItem {
    pub memory_id: Uuid,
    pub content: String,
    pub hints: EtlHints,
}

/// Agent-supplied topology classification
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EtlClassification {
    pub memory_id: Uuid,
    pub ring: String,
    pub knowledge_type: String,
    pub topic: String,
    pub summary: String,
    #[serde(default)]
    pub owner_id: Option<String>,
}

/// Pipeline counters
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EtlStatus {
    pub total: u64,
    pub raw: u64,
    pub processing: u64,
    pub processed: u64,
    pub failed: u64,
}

// ============================================================================
// ETL LOOP
// ============================================================================

/// Agent classification loop over the vector store.
pub struct EtlLoop {
    vector: Arc<VectorStore>,
    default_owner: String,
}

impl EtlLoop {
    pub fn new(vector: Arc<VectorStore>, default_owner: impl Into<String>) -> Self {
        Self {
            vector,
            default_owner: default_owner.into(),
        }
    }

    /// Surface up to `limit` raw memories, moving them to `processing`.
    pub fn process(&self, embedder: &dyn Embedder, limit: usize) -> Result<Vec<EtlItem>> {
        let filters = SearchFilters {
            processing_status: Some(ProcessingStatus::Raw),
            include_archived: true,
            ..Default::default()
        };
        let raw = self.vector.get_all(limit, 0, &filters)?;

        let mut items = vec![];
        for memory in raw {
            let patch = MemoryPatch {
                processing_status: Some(ProcessingStatus::Processing),
                ..Default::default()
            };
            self.vector.update(embedder, memory.id, &patch)?;
            items.push(EtlItem {
                memory_id: memory.id,
                hints: EtlHints {
                    layer: memory.layer.as_str().to_string(),
                    sublayer: memory.sublayer.clone(),
                    memory_type: memory.memory_type.as_str().to_string(),
                    importance: memory.importance,
                    tags: memory.tags.clone(),
                    title: memory.title().map(str::to_string),
                },
                content: memory.content,
            });
        }
        Ok(items)
    }

    /// Persist an agent classification.
    ///
    /// Validation errors leave the memory in `processing` and burn one
    /// attempt; the attempt budget promotes it to `failed`. Re-classifying
    /// an already-processed memory overwrites its topology (idempotent).
    pub fn classify(&self, input: &EtlClassification) -> Result<Memory> {
        let mut memory = self
            .vector
            .get(input.memory_id)?
            .ok_or_else(|| EngineError::NotFound(input.memory_id.to_string()))?;

        match self.validate(input) {
            Ok((ring, knowledge_type, topic, summary, owner_id)) => {
                memory.ring = Some(ring);
                memory.knowledge_type = Some(knowledge_type);
                memory.topic = Some(topic.clone());
                memory.summary = Some(summary.clone());
                memory.owner_id = Some(owner_id.clone());
                memory.processing_status = ProcessingStatus::Processed;
                memory.last_modified = chrono::Utc::now();
                memory.custom_metadata.remove(ATTEMPTS_KEY);
                memory.set_custom("ring", ring.as_str());
                memory.set_custom("knowledge_type", knowledge_type.as_str());
                memory.set_custom("topic", topic);
                memory.set_custom("summary", summary);
                memory.set_custom("owner_id", owner_id);
                memory.set_custom("processing_status", ProcessingStatus::Processed.as_str());

                self.vector.replace(&memory)?;
                Ok(memory)
            }
            Err(validation) => {
                let attempts = memory
                    .custom_metadata
                    .get(ATTEMPTS_KEY)
                    .and_then(MetaValue::as_i64)
                    .unwrap_or(0)
                    + 1;
                memory.set_custom(ATTEMPTS_KEY, attempts);
                if attempts >= MAX_CLASSIFY_ATTEMPTS {
                    warn!(
                        memory_id = %memory.id,
                        attempts,
                        "classification retries exhausted, marking failed"
                    );
                    memory.processing_status = ProcessingStatus::Failed;
                }
                self.vector.replace(&memory)?;
                Err(validation)
            }
        }
    }

    /// Pipeline counters.
    pub fn status(&self) -> Result<EtlStatus> {
        let mut status = EtlStatus::default();
        for (processing_status, count) in self.vector.processing_counts()? {
            status.total += count;
            match processing_status {
                ProcessingStatus::Raw => status.raw = count,
                ProcessingStatus::Processing => status.processing = count,
                ProcessingStatus::Processed => status.processed = count,
                ProcessingStatus::Failed => status.failed = count,
            }
        }
        Ok(status)
    }

    fn validate(
        &self,
        input: &EtlClassification,
    ) -> Result<(Ring, KnowledgeType, String, String, String)> {
        let ring = Ring::parse(&input.ring)
            .ok_or_else(|| EngineError::InvalidInput(format!("unknown ring: {}", input.ring)))?;
        let knowledge_type = KnowledgeType::parse(&input.knowledge_type).ok_or_else(|| {
            EngineError::InvalidInput(format!("unknown knowledge_type: {}", input.knowledge_type))
        })?;

        let topic = input.topic.trim();
        if topic.is_empty() || topic.chars().count() > 64 {
            return Err(EngineError::InvalidInput(
                "topic must be a non-empty tag of at most 64 chars".to_string(),
            ));
        }

        let summary = input.summary.trim();
        if summary.is_empty() || summary.chars().count() > MAX_SUMMARY_CHARS {
            return Err(EngineError::InvalidInput(format!(
                "summary must be 1..{} chars",
                MAX_SUMMARY_CHARS
            )));
        }

        let owner_id = input
            .owner_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.default_owner)
            .to_string();

        Ok((ring, knowledge_type, topic.to_string(), summary.to_string(), owner_id))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashEmbedder;

    const DIM: usize = 64;

    fn setup() -> (EtlLoop, Arc<VectorStore>, HashEmbedder) {
        let store = Arc::new(VectorStore::open_in_memory(DIM).unwrap());
        (EtlLoop::new(store.clone(), "owner-jay"), store, HashEmbedder::new(DIM))
    }

    fn raw_memory(embedder: &HashEmbedder, content: &str) -> Memory {
        let mut memory = Memory::new(content);
        memory.importance = 5;
        memory.urgency = 5;
        memory.embedding = Some(embedder.embed(content).unwrap());
        memory
    }

    fn classification(memory_id: Uuid) -> EtlClassification {
        EtlClassification {
            memory_id,
            ring: "leaf".to_string(),
            knowledge_type: "fact".to_string(),
            topic: "general".to_string(),
            summary: "a classified fact".to_string(),
            owner_id: None,
        }
    }

    #[test]
    fn test_process_moves_raw_to_processing() {
        let (etl, store, embedder) = setup();
        for i in 0..3 {
            store.add(&raw_memory(&embedder, &format!("raw memory {i}"))).unwrap();
        }

        let items = etl.process(&embedder, 2).unwrap();
        assert_eq!(items.len(), 2);
        assert!(!items[0].hints.layer.is_empty());

        let status = etl.status().unwrap();
        assert_eq!(status.raw, 1);
        assert_eq!(status.processing, 2);
        assert_eq!(status.total, 3);
    }

    #[test]
    fn test_classify_persists_topology() {
        let (etl, store, embedder) = setup();
        let memory = raw_memory(&embedder, "classify me");
        store.add(&memory).unwrap();
        etl.process(&embedder, 1).unwrap();

        let classified = etl.classify(&classification(memory.id)).unwrap();
        assert_eq!(classified.ring, Some(Ring::Leaf));
        assert_eq!(classified.knowledge_type, Some(KnowledgeType::Fact));
        assert_eq!(classified.topic.as_deref(), Some("general"));
        assert_eq!(classified.owner_id.as_deref(), Some("owner-jay"));
        assert_eq!(classified.processing_status, ProcessingStatus::Processed);
        assert_eq!(classified.custom_str("ring"), Some("leaf"));

        let stored = store.get(memory.id).unwrap().unwrap();
        assert_eq!(stored.processing_status, ProcessingStatus::Processed);
        assert!(stored.validate().is_ok());
    }

    #[test]
    fn test_classify_is_idempotent_overwrite() {
        let (etl, store, embedder) = setup();
        let memory = raw_memory(&embedder, "classify me twice");
        store.add(&memory).unwrap();

        etl.classify(&classification(memory.id)).unwrap();
        let mut second = classification(memory.id);
        second.ring = "domain".to_string();
        second.knowledge_type = "preference".to_string();
        let reclassified = etl.classify(&second).unwrap();
        assert_eq!(reclassified.ring, Some(Ring::Domain));
        assert_eq!(reclassified.knowledge_type, Some(KnowledgeType::Preference));
    }

    #[test]
    fn test_classify_validation_failure_keeps_processing() {
        let (etl, store, embedder) = setup();
        let memory = raw_memory(&embedder, "bad classification target");
        store.add(&memory).unwrap();
        etl.process(&embedder, 1).unwrap();

        let mut bad = classification(memory.id);
        bad.ring = "stratosphere".to_string();
        let err = etl.classify(&bad).unwrap_err();
        assert_eq!(err.kind(), "invalid_input");

        let stored = store.get(memory.id).unwrap().unwrap();
        assert_eq!(stored.processing_status, ProcessingStatus::Processing);
        assert_eq!(stored.custom_metadata[ATTEMPTS_KEY].as_i64(), Some(1));
    }

    #[test]
    fn test_repeated_failures_promote_to_failed() {
        let (etl, store, embedder) = setup();
        let memory = raw_memory(&embedder, "doomed memory");
        store.add(&memory).unwrap();
        etl.process(&embedder, 1).unwrap();

        let mut bad = classification(memory.id);
        bad.knowledge_type = "vibes".to_string();
        for _ in 0..MAX_CLASSIFY_ATTEMPTS {
            let _ = etl.classify(&bad);
        }

        let stored = store.get(memory.id).unwrap().unwrap();
        assert_eq!(stored.processing_status, ProcessingStatus::Failed);
        assert_eq!(etl.status().unwrap().failed, 1);
    }

    #[test]
    fn test_summary_bounds_enforced() {
        let (etl, store, embedder) = setup();
        let memory = raw_memory(&embedder, "summary bounds");
        store.add(&memory).unwrap();

        let mut bad = classification(memory.id);
        bad.summary = "s".repeat(MAX_SUMMARY_CHARS + 1);
        assert!(etl.classify(&bad).is_err());
    }

    #[test]
    fn test_classify_unknown_id_is_not_found() {
        let (etl, _store, embedder) = setup();
        let err = etl
            .classify(&classification(Uuid::new_v4()))
            .unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }
}
