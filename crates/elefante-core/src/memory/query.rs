//! Search Query Surface
//!
//! Modes, filters, weight planning, and the candidate/result types shared by
//! the retrieval collectors.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::memory::record::{
    Layer, Memory, MemoryStatus, MemoryType, Namespace, ProcessingStatus,
};

// ============================================================================
// MODES AND WEIGHTS
// ============================================================================

/// Search routing mode
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum QueryMode {
    /// Vector search only
    Semantic,
    /// Graph pattern query only
    Structured,
    /// Both, with adaptively planned weights (default)
    #[default]
    Hybrid,
}

impl QueryMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "semantic" => Some(QueryMode::Semantic),
            "structured" => Some(QueryMode::Structured),
            "hybrid" => Some(QueryMode::Hybrid),
            _ => None,
        }
    }
}

/// Planned collector weights for one query
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightPlan {
    pub vector: f32,
    pub graph: f32,
}

impl WeightPlan {
    /// Choose weights from the mode and the query text.
    ///
    /// Identifier-flavored queries lean on the graph; question-flavored
    /// queries lean on vectors; everything else splits evenly.
    pub fn plan(mode: QueryMode, query: &str) -> Self {
        match mode {
            QueryMode::Semantic => Self { vector: 1.0, graph: 0.0 },
            QueryMode::Structured => Self { vector: 0.0, graph: 1.0 },
            QueryMode::Hybrid => {
                let lower = query.to_lowercase();
                let identifier_flavored = ["named", "called", "id", "uuid"]
                    .iter()
                    .any(|t| lower.split_whitespace().any(|w| w.trim_matches(|c: char| !c.is_alphanumeric()) == *t));
                if identifier_flavored {
                    return Self { vector: 0.3, graph: 0.7 };
                }
                let question_flavored = ["what", "who", "when", "where", "why", "how", "which"]
                    .iter()
                    .any(|q| lower.trim_start().starts_with(q));
                if question_flavored {
                    Self { vector: 0.7, graph: 0.3 }
                } else {
                    Self { vector: 0.5, graph: 0.5 }
                }
            }
        }
    }
}

// ============================================================================
// FILTERS
// ============================================================================

/// Structured filters applied by both collectors
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchFilters {
    pub layer: Option<Layer>,
    pub sublayer: Option<String>,
    pub memory_type: Option<MemoryType>,
    pub status: Option<MemoryStatus>,
    pub namespace: Option<Namespace>,
    pub processing_status: Option<ProcessingStatus>,
    pub session_id: Option<Uuid>,
    pub project: Option<String>,
    pub canonical_key: Option<String>,
    pub tags: Option<Vec<String>>,
    pub min_importance: Option<u8>,
    /// Exclude archived records unless explicitly requested
    pub include_archived: bool,
}

impl SearchFilters {
    /// In-process filter check, for collectors that hydrate full records.
    pub fn matches(&self, memory: &Memory) -> bool {
        if let Some(layer) = self.layer {
            if memory.layer != layer {
                return false;
            }
        }
        if let Some(sublayer) = &self.sublayer {
            if &memory.sublayer != sublayer {
                return false;
            }
        }
        if let Some(memory_type) = self.memory_type {
            if memory.memory_type != memory_type {
                return false;
            }
        }
        if let Some(status) = self.status {
            if memory.status != status {
                return false;
            }
        }
        if let Some(namespace) = self.namespace {
            if memory.namespace != namespace {
                return false;
            }
        }
        if let Some(processing_status) = self.processing_status {
            if memory.processing_status != processing_status {
                return false;
            }
        }
        if let Some(session_id) = self.session_id {
            if memory.session_id != Some(session_id) {
                return false;
            }
        }
        if let Some(project) = &self.project {
            if memory.project.as_deref() != Some(project.as_str()) {
                return false;
            }
        }
        if let Some(canonical_key) = &self.canonical_key {
            if memory.canonical_key.as_deref() != Some(canonical_key.as_str()) {
                return false;
            }
        }
        if let Some(tags) = &self.tags {
            if !tags.iter().any(|t| memory.tags.contains(t)) {
                return false;
            }
        }
        if let Some(min_importance) = self.min_importance {
            if memory.importance < min_importance {
                return false;
            }
        }
        if !self.include_archived && memory.archived {
            return false;
        }
        true
    }

    pub fn is_empty(&self) -> bool {
        self.layer.is_none()
            && self.sublayer.is_none()
            && self.memory_type.is_none()
            && self.status.is_none()
            && self.namespace.is_none()
            && self.processing_status.is_none()
            && self.session_id.is_none()
            && self.project.is_none()
            && self.canonical_key.is_none()
            && self.tags.is_none()
            && self.min_importance.is_none()
    }
}

// ============================================================================
// CANDIDATES AND RESULTS
// ============================================================================

/// Which collector produced a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateSource {
    Vector,
    Graph,
    Conversation,
    /// More than one source contributed after merging
    Hybrid,
}

impl CandidateSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CandidateSource::Vector => "vector",
            CandidateSource::Graph => "graph",
            CandidateSource::Conversation => "conversation",
            CandidateSource::Hybrid => "hybrid",
        }
    }
}

/// One scored candidate flowing through the retrieval pipeline
#[derive(Debug, Clone)]
pub struct SearchCandidate {
    pub memory_id: Uuid,
    pub content: String,
    pub score: f32,
    pub source: CandidateSource,
    pub embedding: Option<Vec<f32>>,
    pub memory: Option<Memory>,
}

impl SearchCandidate {
    pub fn new(memory_id: Uuid, content: impl Into<String>, score: f32, source: CandidateSource) -> Self {
        Self {
            memory_id,
            content: content.into(),
            score,
            source,
            embedding: None,
            memory: None,
        }
    }
}

/// Final search result row returned to the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub memory: Memory,
    pub score: f32,
    pub source: CandidateSource,
    /// Distinct sources that contributed before merging
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub sources: Vec<CandidateSource>,
    /// Number of near-duplicate candidates collapsed into this row
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merged_from: Option<usize>,
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weight_plan_modes() {
        assert_eq!(
            WeightPlan::plan(QueryMode::Semantic, "anything"),
            WeightPlan { vector: 1.0, graph: 0.0 }
        );
        assert_eq!(
            WeightPlan::plan(QueryMode::Structured, "anything"),
            WeightPlan { vector: 0.0, graph: 1.0 }
        );
    }

    #[test]
    fn test_weight_plan_identifier_queries_favor_graph() {
        let plan = WeightPlan::plan(QueryMode::Hybrid, "the entity named TestEntity");
        assert_eq!(plan, WeightPlan { vector: 0.3, graph: 0.7 });
        let plan = WeightPlan::plan(QueryMode::Hybrid, "memory with uuid 1234");
        assert_eq!(plan, WeightPlan { vector: 0.3, graph: 0.7 });
    }

    #[test]
    fn test_weight_plan_question_queries_favor_vectors() {
        let plan = WeightPlan::plan(QueryMode::Hybrid, "what formatter do I prefer");
        assert_eq!(plan, WeightPlan { vector: 0.7, graph: 0.3 });
    }

    #[test]
    fn test_weight_plan_default_split() {
        let plan = WeightPlan::plan(QueryMode::Hybrid, "python formatting preferences");
        assert_eq!(plan, WeightPlan { vector: 0.5, graph: 0.5 });
    }

    #[test]
    fn test_filters_is_empty_ignores_include_archived() {
        let filters = SearchFilters {
            include_archived: true,
            ..Default::default()
        };
        assert!(filters.is_empty());
        let filters = SearchFilters {
            min_importance: Some(5),
            ..Default::default()
        };
        assert!(!filters.is_empty());
    }
}
