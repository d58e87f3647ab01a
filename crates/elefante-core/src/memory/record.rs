//! Memory Record - The fundamental unit of storage
//!
//! A memory is identified by one UUID across both stores: the vector store
//! holds the full flattened record, the graph store holds a node of type
//! `memory` with the same id (invariant: the two are created and removed
//! together).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::memory::entity::RelationshipType;

// ============================================================================
// LIMITS
// ============================================================================

/// Maximum memory content length in characters
pub const MAX_CONTENT_CHARS: usize = 10_000;

/// Maximum one-line summary length in characters
pub const MAX_SUMMARY_CHARS: usize = 200;

// ============================================================================
// CLASSIFICATION ENUMS
// ============================================================================

/// Memory layer: who I am / facts about the world / rules and goals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    #[serde(rename = "self")]
    Self_,
    #[default]
    World,
    Intent,
}

impl Layer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Layer::Self_ => "self",
            Layer::World => "world",
            Layer::Intent => "intent",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "self" => Some(Layer::Self_),
            "world" => Some(Layer::World),
            "intent" => Some(Layer::Intent),
            _ => None,
        }
    }
}

/// Memory domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Work,
    Personal,
    Learning,
    Project,
    #[default]
    Reference,
    System,
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Work => "work",
            Domain::Personal => "personal",
            Domain::Learning => "learning",
            Domain::Project => "project",
            Domain::Reference => "reference",
            Domain::System => "system",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "work" => Some(Domain::Work),
            "personal" => Some(Domain::Personal),
            "learning" => Some(Domain::Learning),
            "project" => Some(Domain::Project),
            "reference" => Some(Domain::Reference),
            "system" => Some(Domain::System),
            _ => None,
        }
    }
}

/// Type of memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MemoryType {
    #[default]
    Conversation,
    Fact,
    Insight,
    Code,
    Decision,
    Task,
    Note,
    Preference,
    Question,
    Answer,
    Hypothesis,
    Observation,
}

impl MemoryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryType::Conversation => "conversation",
            MemoryType::Fact => "fact",
            MemoryType::Insight => "insight",
            MemoryType::Code => "code",
            MemoryType::Decision => "decision",
            MemoryType::Task => "task",
            MemoryType::Note => "note",
            MemoryType::Preference => "preference",
            MemoryType::Question => "question",
            MemoryType::Answer => "answer",
            MemoryType::Hypothesis => "hypothesis",
            MemoryType::Observation => "observation",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "conversation" => Some(MemoryType::Conversation),
            "fact" => Some(MemoryType::Fact),
            "insight" => Some(MemoryType::Insight),
            "code" => Some(MemoryType::Code),
            "decision" => Some(MemoryType::Decision),
            "task" => Some(MemoryType::Task),
            "note" => Some(MemoryType::Note),
            "preference" => Some(MemoryType::Preference),
            "question" => Some(MemoryType::Question),
            "answer" => Some(MemoryType::Answer),
            "hypothesis" => Some(MemoryType::Hypothesis),
            "observation" => Some(MemoryType::Observation),
            _ => None,
        }
    }
}

// ============================================================================
// V5 TOPOLOGY ENUMS
// ============================================================================

/// Topology ring, from foundational to peripheral
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ring {
    Core,
    Domain,
    Topic,
    Leaf,
}

impl Ring {
    pub fn as_str(&self) -> &'static str {
        match self {
            Ring::Core => "core",
            Ring::Domain => "domain",
            Ring::Topic => "topic",
            Ring::Leaf => "leaf",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "core" => Some(Ring::Core),
            "domain" => Some(Ring::Domain),
            "topic" => Some(Ring::Topic),
            "leaf" => Some(Ring::Leaf),
            _ => None,
        }
    }
}

/// Kind of knowledge a memory encodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KnowledgeType {
    Law,
    Principle,
    Method,
    Decision,
    Insight,
    Preference,
    Fact,
}

impl KnowledgeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            KnowledgeType::Law => "law",
            KnowledgeType::Principle => "principle",
            KnowledgeType::Method => "method",
            KnowledgeType::Decision => "decision",
            KnowledgeType::Insight => "insight",
            KnowledgeType::Preference => "preference",
            KnowledgeType::Fact => "fact",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "law" => Some(KnowledgeType::Law),
            "principle" => Some(KnowledgeType::Principle),
            "method" => Some(KnowledgeType::Method),
            "decision" => Some(KnowledgeType::Decision),
            "insight" => Some(KnowledgeType::Insight),
            "preference" => Some(KnowledgeType::Preference),
            "fact" => Some(KnowledgeType::Fact),
            _ => None,
        }
    }
}

// ============================================================================
// LIFECYCLE ENUMS
// ============================================================================

/// Stored lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MemoryStatus {
    #[default]
    New,
    Active,
    Redundant,
    Deprecated,
    Archived,
}

impl MemoryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryStatus::New => "new",
            MemoryStatus::Active => "active",
            MemoryStatus::Redundant => "redundant",
            MemoryStatus::Deprecated => "deprecated",
            MemoryStatus::Archived => "archived",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "new" => Some(MemoryStatus::New),
            "active" => Some(MemoryStatus::Active),
            "redundant" => Some(MemoryStatus::Redundant),
            "deprecated" => Some(MemoryStatus::Deprecated),
            "archived" => Some(MemoryStatus::Archived),
            _ => None,
        }
    }
}

/// ETL processing state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    #[default]
    Raw,
    Processing,
    Processed,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Raw => "raw",
            ProcessingStatus::Processing => "processing",
            ProcessingStatus::Processed => "processed",
            ProcessingStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "raw" => Some(ProcessingStatus::Raw),
            "processing" => Some(ProcessingStatus::Processing),
            "processed" => Some(ProcessingStatus::Processed),
            "failed" => Some(ProcessingStatus::Failed),
            _ => None,
        }
    }

    /// Refinery winner-selection rank (higher wins).
    pub fn rank(&self) -> u8 {
        match self {
            ProcessingStatus::Processed => 3,
            ProcessingStatus::Processing => 2,
            ProcessingStatus::Raw => 1,
            ProcessingStatus::Failed => 0,
        }
    }
}

/// Dedup namespace partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Namespace {
    #[default]
    Prod,
    Test,
    Ephemeral,
}

impl Namespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Prod => "prod",
            Namespace::Test => "test",
            Namespace::Ephemeral => "ephemeral",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "prod" => Some(Namespace::Prod),
            "test" => Some(Namespace::Test),
            "ephemeral" => Some(Namespace::Ephemeral),
            _ => None,
        }
    }
}

/// Provenance of a memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MemorySource {
    #[default]
    UserInput,
    AgentGenerated,
    SystemInferred,
    ExternalApi,
    Document,
    WebScrape,
    CodeAnalysis,
}

impl MemorySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemorySource::UserInput => "user_input",
            MemorySource::AgentGenerated => "agent_generated",
            MemorySource::SystemInferred => "system_inferred",
            MemorySource::ExternalApi => "external_api",
            MemorySource::Document => "document",
            MemorySource::WebScrape => "web_scrape",
            MemorySource::CodeAnalysis => "code_analysis",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user_input" => Some(MemorySource::UserInput),
            "agent_generated" => Some(MemorySource::AgentGenerated),
            "system_inferred" => Some(MemorySource::SystemInferred),
            "external_api" => Some(MemorySource::ExternalApi),
            "document" => Some(MemorySource::Document),
            "web_scrape" => Some(MemorySource::WebScrape),
            "code_analysis" => Some(MemorySource::CodeAnalysis),
            _ => None,
        }
    }

    /// Default reliability score per source.
    pub fn default_reliability(&self) -> f32 {
        match self {
            MemorySource::UserInput => 0.9,
            MemorySource::Document => 0.85,
            MemorySource::CodeAnalysis => 0.85,
            MemorySource::ExternalApi => 0.75,
            MemorySource::AgentGenerated => 0.7,
            MemorySource::SystemInferred => 0.6,
            MemorySource::WebScrape => 0.5,
        }
    }
}

// ============================================================================
// CUSTOM METADATA
// ============================================================================

/// Scalar custom-metadata value
///
/// The vector store flattens well-known keys to indexed columns and
/// serializes the whole map to one JSON blob for lossless round-trips.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl MetaValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetaValue::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            MetaValue::Int(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<&str> for MetaValue {
    fn from(s: &str) -> Self {
        MetaValue::Str(s.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(s: String) -> Self {
        MetaValue::Str(s)
    }
}

impl From<i64> for MetaValue {
    fn from(v: i64) -> Self {
        MetaValue::Int(v)
    }
}

impl From<f64> for MetaValue {
    fn from(v: f64) -> Self {
        MetaValue::Float(v)
    }
}

impl From<bool> for MetaValue {
    fn from(v: bool) -> Self {
        MetaValue::Bool(v)
    }
}

/// Ordered custom-metadata map
pub type MetaMap = BTreeMap<String, MetaValue>;

// ============================================================================
// MEMORY
// ============================================================================

/// A memory record
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Memory {
    /// Unique identifier, stable across both stores
    pub id: Uuid,
    /// The memory content (1..10000 chars)
    pub content: String,
    /// Dense embedding; optional in transit, required at rest in the vector store
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,

    // ========== Classification ==========
    pub layer: Layer,
    /// Free-form short tag (`preference`, `fact`, `rule`, ...)
    pub sublayer: String,
    pub domain: Domain,
    /// Short tag; `test` routes to the test namespace
    pub category: String,
    pub memory_type: MemoryType,
    /// Open short tag (`reference`, `reminder`, `learning`, `decision_log`, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,

    // ========== V5 topology (set by ETL) ==========
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ring: Option<Ring>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub knowledge_type: Option<KnowledgeType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    /// One-line essence (<= 200 chars)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,

    // ========== Scores and lifecycle ==========
    /// 1..10
    pub importance: u8,
    /// 1..10
    pub urgency: u8,
    /// 0.0..1.0
    pub confidence: f32,
    pub status: MemoryStatus,
    pub archived: bool,
    pub deprecated: bool,
    pub processing_status: ProcessingStatus,

    // ========== Relationships (ids only; the graph holds the edges) ==========
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supersedes_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub superseded_by_id: Option<Uuid>,
    #[serde(default)]
    pub related_memory_ids: Vec<Uuid>,
    #[serde(default)]
    pub conflict_ids: Vec<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relationship_type: Option<RelationshipType>,

    // ========== Identity for dedup ==========
    /// Stable concept slug; inferred when the agent does not supply one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canonical_key: Option<String>,
    pub namespace: Namespace,

    // ========== Provenance & temporal ==========
    pub source: MemorySource,
    /// 0.0..1.0; defaults by source
    pub source_reliability: f32,
    pub verified: bool,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub access_count: u32,

    // ========== Context anchoring ==========
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,

    // ========== Tags and keywords ==========
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,

    /// Open scalar map; `title`, `summary`, `canonical_key`, `namespace`,
    /// `processing_status` and the topology fields are always preserved here
    #[serde(default)]
    pub custom_metadata: MetaMap,
}

impl Default for Memory {
    fn default() -> Self {
        let now = Utc::now();
        let source = MemorySource::default();
        Self {
            id: Uuid::new_v4(),
            content: String::new(),
            embedding: None,
            layer: Layer::World,
            sublayer: "fact".to_string(),
            domain: Domain::Reference,
            category: "general".to_string(),
            memory_type: MemoryType::Conversation,
            intent: None,
            ring: None,
            knowledge_type: None,
            topic: None,
            summary: None,
            owner_id: None,
            importance: 1,
            urgency: 1,
            confidence: 0.7,
            status: MemoryStatus::New,
            archived: false,
            deprecated: false,
            processing_status: ProcessingStatus::Raw,
            parent_id: None,
            supersedes_id: None,
            superseded_by_id: None,
            related_memory_ids: vec![],
            conflict_ids: vec![],
            relationship_type: None,
            canonical_key: None,
            namespace: Namespace::Prod,
            source_reliability: source.default_reliability(),
            source,
            verified: false,
            created_at: now,
            last_modified: now,
            last_accessed: now,
            access_count: 0,
            project: None,
            file_path: None,
            session_id: None,
            tags: vec![],
            keywords: vec![],
            custom_metadata: MetaMap::new(),
        }
    }
}

impl Memory {
    /// Create a new memory with the given content.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    /// Agent-supplied title, if any.
    pub fn title(&self) -> Option<&str> {
        self.custom_str("title")
    }

    /// String custom-metadata value for `key`, trimmed, empty treated as absent.
    pub fn custom_str(&self, key: &str) -> Option<&str> {
        self.custom_metadata
            .get(key)
            .and_then(MetaValue::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Insert or replace a custom-metadata value.
    pub fn set_custom(&mut self, key: impl Into<String>, value: impl Into<MetaValue>) {
        self.custom_metadata.insert(key.into(), value.into());
    }

    /// Not archived, not deprecated, and not redundant.
    pub fn is_active(&self) -> bool {
        !self.archived && !self.deprecated && self.status != MemoryStatus::Redundant
    }

    /// Union new tags in, preserving order and uniqueness.
    pub fn merge_tags(&mut self, tags: &[String]) {
        for tag in tags {
            if !self.tags.iter().any(|t| t == tag) {
                self.tags.push(tag.clone());
            }
        }
    }

    /// Validate field bounds. Enum fields are valid by construction; this
    /// checks lengths and numeric ranges plus topology ownership.
    pub fn validate(&self) -> Result<()> {
        let chars = self.content.chars().count();
        if chars == 0 || chars > MAX_CONTENT_CHARS {
            return Err(EngineError::InvalidInput(format!(
                "content length must be 1..{} chars, got {}",
                MAX_CONTENT_CHARS, chars
            )));
        }
        if !(1..=10).contains(&self.importance) {
            return Err(EngineError::InvalidInput(format!(
                "importance must be 1..10, got {}",
                self.importance
            )));
        }
        if !(1..=10).contains(&self.urgency) {
            return Err(EngineError::InvalidInput(format!(
                "urgency must be 1..10, got {}",
                self.urgency
            )));
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(EngineError::InvalidInput(format!(
                "confidence must be 0.0..1.0, got {}",
                self.confidence
            )));
        }
        if !(0.0..=1.0).contains(&self.source_reliability) {
            return Err(EngineError::InvalidInput(format!(
                "source_reliability must be 0.0..1.0, got {}",
                self.source_reliability
            )));
        }
        if self.ring.is_some() {
            if self.knowledge_type.is_none() || self.topic.is_none() {
                return Err(EngineError::InvalidInput(
                    "ring requires knowledge_type and topic".to_string(),
                ));
            }
            if let Some(summary) = &self.summary {
                if summary.chars().count() > MAX_SUMMARY_CHARS {
                    return Err(EngineError::InvalidInput(format!(
                        "summary must be <= {} chars",
                        MAX_SUMMARY_CHARS
                    )));
                }
            }
            if self.owner_id.as_deref().unwrap_or("").is_empty() {
                return Err(EngineError::InvalidInput(
                    "ring requires a non-empty owner_id".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Temporal-decay relevance factor in [0, 1].
    ///
    /// `base + access_bonus - age_penalty` where base is importance/10,
    /// access_bonus caps at 0.2 and the age penalty at 0.3 (180-day ramp
    /// on time since last access).
    pub fn temporal_score(&self, now: DateTime<Utc>) -> f32 {
        let base = f32::from(self.importance) / 10.0;
        let access_bonus = ((1.0 + self.access_count as f32).ln() * 0.05).min(0.2);
        let days_idle = (now - self.last_accessed).num_seconds().max(0) as f32 / 86_400.0;
        let age_penalty = (days_idle / 180.0).clamp(0.0, 0.3);
        (base + access_bonus - age_penalty).clamp(0.0, 1.0)
    }
}

// ============================================================================
// PATCH
// ============================================================================

/// Field-level update applied by `VectorStore::update` and the refinery.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MemoryPatch {
    pub content: Option<String>,
    pub importance: Option<u8>,
    pub tags: Option<Vec<String>>,
    pub status: Option<MemoryStatus>,
    pub deprecated: Option<bool>,
    pub archived: Option<bool>,
    pub relationship_type: Option<RelationshipType>,
    pub supersedes_id: Option<Uuid>,
    pub superseded_by_id: Option<Uuid>,
    pub canonical_key: Option<String>,
    pub namespace: Option<Namespace>,
    pub custom_metadata: Option<MetaMap>,
    pub processing_status: Option<ProcessingStatus>,
    pub last_accessed: Option<DateTime<Utc>>,
    pub last_modified: Option<DateTime<Utc>>,
    pub access_count: Option<u32>,
}

impl MemoryPatch {
    pub fn is_empty(&self) -> bool {
        serde_json::to_value(self)
            .map(|v| {
                v.as_object()
                    .map(|o| o.values().all(|v| v.is_null()))
                    .unwrap_or(true)
            })
            .unwrap_or(true)
    }

    /// Whether the patch touches `content` (forces a re-embed).
    pub fn needs_reembed(&self) -> bool {
        self.content.is_some()
    }
}

// ============================================================================
// TESTS
// ============================================================================
