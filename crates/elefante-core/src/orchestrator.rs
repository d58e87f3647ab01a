//! Memory Orchestrator
//!
//! The central coordination layer over both stores: the ingestion pipeline
//! (classify → embed → dedup probe → fan-out writes → auto-link), hybrid
//! retrieval (parallel vector + graph + conversation collectors), context
//! subgraphs, and the delete path that keeps id parity between stores.
//!
//! Writers are expected to hold the write lock for the duration of one
//! logical operation; reads are lock-free.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::classify::{classify_namespace, infer_canonical_key, is_first_person};
use crate::config::EngineConfig;
use crate::embeddings::{CachingEmbedder, Embedder, HashEmbedder};
use crate::error::{EngineError, Result};
use crate::etl::{EtlClassification, EtlItem, EtlLoop, EtlStatus};
use crate::graph::{GraphStore, GraphStoreStats, Neighborhood};
use crate::lock::{LockStatus, WriteLockManager};
use crate::memory::entity::{Entity, EntityType, Relationship, RelationshipType, SessionInfo};
use crate::memory::query::{
    QueryMode, SearchCandidate, SearchFilters, SearchResult, WeightPlan,
};
use crate::memory::record::{
    Domain, Layer, Memory, MemorySource, MemoryType, MetaMap, MetaValue, Namespace,
};
use crate::refinery::{Refinery, RefineryReport};
use crate::search::conversation;
use crate::search::dedup::merge_duplicates;
use crate::search::{merge_stored, normalize_by_source};
use crate::vector::{VectorStore, VectorStoreStats};

/// Normative dedup thresholds, referenced by every caller.
pub mod thresholds {
    /// Top-1 probe floor during ingestion
    pub const DEDUP_PROBE: f32 = 0.85;
    /// At or above this, reinforce the existing memory instead of creating
    pub const DEDUP_REINFORCE: f32 = 0.95;
    /// At or above this (below reinforce), link as related
    pub const DEDUP_RELATED: f32 = 0.80;
    /// Result-merge threshold in hybrid retrieval
    pub const RESULT_MERGE: f32 = 0.95;
}

/// Content preview length stored on graph memory nodes
const PREVIEW_CHARS: usize = 200;

// ============================================================================
// INPUT / OUTPUT TYPES
// ============================================================================

/// Entity reference supplied with an ingestion call
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EntityRef {
    pub name: String,
    #[serde(default)]
    pub entity_type: EntityType,
    #[serde(default)]
    pub description: Option<String>,
}

/// Ingestion input
#[derive(Debug, Clone, Default)]
pub struct AddMemoryInput {
    pub content: String,
    pub memory_type: Option<MemoryType>,
    pub layer: Option<Layer>,
    pub sublayer: Option<String>,
    pub domain: Option<Domain>,
    pub category: Option<String>,
    pub intent: Option<String>,
    pub importance: Option<u8>,
    pub source: Option<MemorySource>,
    pub tags: Vec<String>,
    pub entities: Vec<EntityRef>,
    pub metadata: MetaMap,
    pub session_id: Option<Uuid>,
    pub project: Option<String>,
    pub file_path: Option<String>,
    /// Skip all dedup linking (no reinforce, no related, no SIMILAR_TO edge)
    pub force_new: bool,
}

/// How an ingestion call resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestOutcome {
    New,
    Related,
    Redundant,
    Reinforced,
}

/// Ingestion result
#[derive(Debug, Clone)]
pub struct AddMemoryResult {
    pub memory: Memory,
    pub outcome: IngestOutcome,
    pub related_id: Option<Uuid>,
}

/// Search parameters
#[derive(Debug, Clone)]
pub struct SearchParams {
    pub query: String,
    pub mode: QueryMode,
    pub limit: usize,
    pub filters: SearchFilters,
    pub min_similarity: f32,
    pub include_conversation: bool,
    pub include_stored: bool,
    pub session_id: Option<Uuid>,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            query: String::new(),
            mode: QueryMode::Hybrid,
            limit: 10,
            filters: SearchFilters::default(),
            min_similarity: 0.0,
            include_conversation: false,
            include_stored: true,
            session_id: None,
        }
    }
}

/// Session-scoped context bundle
#[derive(Debug, Clone, Default)]
pub struct ContextBundle {
    pub memories: Vec<Memory>,
    pub entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,
}

/// Entity spec for `graph_connect`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ConnectEntity {
    /// Client-side reference key, resolvable from relationships
    #[serde(default)]
    pub r#ref: Option<String>,
    pub name: String,
    #[serde(default)]
    pub entity_type: EntityType,
    #[serde(default)]
    pub description: Option<String>,
}

/// Relationship spec for `graph_connect`; endpoints are client refs, entity
/// names, or UUIDs
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ConnectRelationship {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub relationship_type: RelationshipType,
    #[serde(default)]
    pub strength: Option<f32>,
}

/// Combined system status
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStatus {
    pub enabled: bool,
    pub data_dir: String,
    pub lock: LockStatus,
    pub vector: VectorStoreStats,
    pub graph: GraphStoreStats,
}

// ============================================================================
// ORCHESTRATOR
// ============================================================================

/// Coordinates memory operations across the vector and graph stores.
pub struct MemoryOrchestrator {
    config: EngineConfig,
    vector: Arc<VectorStore>,
    graph: Arc<GraphStore>,
    embedder: Arc<CachingEmbedder>,
    locks: WriteLockManager,
    etl: EtlLoop,
}

impl MemoryOrchestrator {
    /// Open both stores with the built-in deterministic embedder.
    pub fn open(config: EngineConfig) -> Result<Self> {
        let embedder: Arc<dyn Embedder> =
            Arc::new(HashEmbedder::new(config.embedding_dimensions));
        Self::with_embedder(config, embedder)
    }

    /// Open with an injected embedder capability (tests, ONNX builds).
    pub fn with_embedder(config: EngineConfig, embedder: Arc<dyn Embedder>) -> Result<Self> {
        config.ensure_layout()?;

        let embedder = Arc::new(CachingEmbedder::new(embedder, config.embedding_cache_size));
        let vector = Arc::new(VectorStore::open(
            &config.vector_db_path(),
            embedder.dimension(),
            config.temporal_decay,
        )?);
        let graph = Arc::new(GraphStore::open(&config.graph_db_path())?);
        let locks = WriteLockManager::new(
            config.write_lock_path(),
            Duration::from_secs(config.acquire_timeout_secs),
            Duration::from_secs(config.lock_timeout_secs),
        );
        let etl = EtlLoop::new(vector.clone(), config.owner_id.clone());

        info!(data_dir = %config.data_dir.display(), "memory orchestrator initialized");
        Ok(Self {
            config,
            vector,
            graph,
            embedder,
            locks,
            etl,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn locks(&self) -> &WriteLockManager {
        &self.locks
    }

    pub fn vector(&self) -> &Arc<VectorStore> {
        &self.vector
    }

    pub fn graph(&self) -> &Arc<GraphStore> {
        &self.graph
    }

    pub fn embedder(&self) -> &dyn Embedder {
        self.embedder.as_ref()
    }

    // ========================================================================
    // INGESTION PIPELINE
    // ========================================================================

    /// Ingest one memory. Returns `None` when a test-namespace memory is
    /// quarantined; otherwise the stored (or reinforced) record.
    pub async fn add_memory(&self, input: AddMemoryInput) -> Result<Option<AddMemoryResult>> {
        let mut memory = self.build_memory(&input)?;
        memory.validate()?;

        // Test-memory guard: inferred test namespace is quarantined unless
        // explicitly allowed by the environment.
        if memory.namespace == Namespace::Test && !self.config.allow_test_memories {
            info!(content = %preview(&memory.content, 50), "test memory quarantined");
            return Ok(None);
        }

        let embedding = self.embedder.embed(&memory.content)?;
        memory.embedding = Some(embedding.clone());

        // Dedup: an agent-supplied title reasserts its existing memory, and
        // the vector probe catches near-verbatim restatements.
        let mut related: Option<(Uuid, f32)> = None;
        let mut outcome = IngestOutcome::New;
        if !input.force_new {
            if let Some(title) = memory.title() {
                if let Some(existing) = self.vector.find_by_title(title)? {
                    let reinforced = self.reinforce(existing, &memory)?;
                    return Ok(Some(AddMemoryResult {
                        related_id: Some(reinforced.id),
                        memory: reinforced,
                        outcome: IngestOutcome::Reinforced,
                    }));
                }
            }

            let probe = self.vector.search_by_embedding(
                &embedding,
                1,
                &SearchFilters::default(),
                thresholds::DEDUP_PROBE,
                false,
            )?;
            if let Some(best) = probe.first() {
                if best.similarity >= thresholds::DEDUP_REINFORCE {
                    let reinforced = self.reinforce(best.memory.clone(), &memory)?;
                    return Ok(Some(AddMemoryResult {
                        related_id: Some(reinforced.id),
                        memory: reinforced,
                        outcome: IngestOutcome::Reinforced,
                    }));
                }
                if best.similarity >= thresholds::DEDUP_RELATED {
                    related = Some((best.memory.id, best.similarity));
                    outcome = IngestOutcome::Related;
                    memory.related_memory_ids.push(best.memory.id);
                }
            }
        }

        // Vector write first, then the graph node; a graph failure rolls the
        // vector write back so id parity holds.
        self.vector.add(&memory)?;
        if let Err(graph_err) = self.create_memory_node(&memory) {
            warn!(id = %memory.id, error = %graph_err, "graph node write failed, compensating");
            let _ = self.vector.delete(memory.id);
            return Err(EngineError::IntegrityViolation(format!(
                "graph node write failed: {}",
                graph_err
            )));
        }

        self.auto_link(&memory, &input.entities, related, input.force_new);

        debug!(id = %memory.id, outcome = ?outcome, "memory ingested");
        Ok(Some(AddMemoryResult {
            memory,
            outcome,
            related_id: related.map(|(id, _)| id),
        }))
    }

    fn build_memory(&self, input: &AddMemoryInput) -> Result<Memory> {
        let mut memory = Memory::new(input.content.clone());
        if let Some(memory_type) = input.memory_type {
            memory.memory_type = memory_type;
        }
        if let Some(layer) = input.layer {
            memory.layer = layer;
        }
        if let Some(sublayer) = &input.sublayer {
            memory.sublayer = sublayer.clone();
        }
        if let Some(domain) = input.domain {
            memory.domain = domain;
        }
        if let Some(category) = &input.category {
            memory.category = category.clone();
        }
        memory.intent = input.intent.clone();
        if let Some(importance) = input.importance {
            memory.importance = importance;
        }
        if let Some(source) = input.source {
            memory.source = source;
            memory.source_reliability = source.default_reliability();
        }
        memory.tags = input.tags.clone();
        memory.session_id = input.session_id;
        memory.project = input.project.clone();
        memory.file_path = input.file_path.clone();
        memory.custom_metadata = input.metadata.clone();
        // Creation counts as the first access
        memory.access_count = 1;

        // Classifier fills whatever the hints left open.
        memory.namespace = classify_namespace(&memory);
        memory.set_custom("namespace", memory.namespace.as_str());
        let canonical_key = infer_canonical_key(&memory);
        memory.set_custom("canonical_key", canonical_key.clone());
        memory.canonical_key = Some(canonical_key);
        memory.set_custom("processing_status", memory.processing_status.as_str());

        Ok(memory)
    }

    /// Update an existing memory instead of creating a near-duplicate.
    fn reinforce(&self, mut existing: Memory, incoming: &Memory) -> Result<Memory> {
        existing.access_count += 1;
        existing.importance = existing.importance.max(incoming.importance);
        existing.merge_tags(&incoming.tags);
        existing.last_modified = Utc::now();
        existing.last_accessed = existing.last_modified;
        self.vector.replace(&existing)?;
        info!(id = %existing.id, "reinforced existing memory");
        Ok(existing)
    }

    fn create_memory_node(&self, memory: &Memory) -> Result<()> {
        let mut node = Entity::new(
            memory
                .title()
                .map(str::to_string)
                .unwrap_or_else(|| format!("memory-{}", memory.id)),
            EntityType::Memory,
        );
        node.id = memory.id;
        node.description = memory.summary.clone();
        node.tags = memory.tags.clone();
        node.properties
            .insert("content".into(), MetaValue::from(preview(&memory.content, PREVIEW_CHARS)));
        if let Some(title) = memory.title() {
            node.properties.insert("title".into(), MetaValue::from(title));
        }
        node.properties.insert("layer".into(), MetaValue::from(memory.layer.as_str()));
        node.properties.insert("sublayer".into(), MetaValue::from(memory.sublayer.clone()));
        node.properties
            .insert("memory_type".into(), MetaValue::from(memory.memory_type.as_str()));
        node.properties
            .insert("importance".into(), MetaValue::Int(i64::from(memory.importance)));
        node.properties.insert("status".into(), MetaValue::from(memory.status.as_str()));
        node.properties
            .insert("timestamp".into(), MetaValue::from(memory.created_at.to_rfc3339()));
        self.graph.create_entity(&node)
    }

    /// Auto-link the fresh memory node: user, session, supplied entities,
    /// and the dedup-related memory. Edge failures degrade to warnings; the
    /// node itself is already in place and readers tolerate missing edges.
    fn auto_link(
        &self,
        memory: &Memory,
        entities: &[EntityRef],
        related: Option<(Uuid, f32)>,
        force_new: bool,
    ) {
        if is_first_person(&memory.content) {
            if let Err(e) = self.link_user(memory) {
                warn!(id = %memory.id, error = %e, "user auto-link failed");
            }
        }

        if let Some(session_id) = memory.session_id {
            if let Err(e) = self.link_session(memory, session_id) {
                warn!(id = %memory.id, error = %e, "session auto-link failed");
            }
        }

        for spec in entities {
            let linked = self
                .upsert_entity(&spec.name, spec.entity_type, spec.description.as_deref())
                .and_then(|entity| {
                    self.graph.create_relationship(&Relationship::new(
                        memory.id,
                        entity.id,
                        RelationshipType::RelatesTo,
                    ))
                });
            if let Err(e) = linked {
                warn!(id = %memory.id, entity = %spec.name, error = %e, "entity auto-link failed");
            }
        }

        if !force_new {
            if let Some((related_id, similarity)) = related {
                let mut edge = Relationship::new(memory.id, related_id, RelationshipType::SimilarTo);
                edge.strength = Some(similarity);
                edge.properties
                    .insert("similarity".into(), MetaValue::Float(f64::from(similarity)));
                if let Err(e) = self.graph.create_relationship(&edge) {
                    warn!(id = %memory.id, error = %e, "similar-to auto-link failed");
                }
            }
        }
    }

    fn link_user(&self, memory: &Memory) -> Result<()> {
        let user = match self
            .graph
            .find_entity_by_name(&self.config.user_name, Some(EntityType::Person))?
        {
            Some(user) => user,
            None => {
                let mut user = Entity::new(self.config.user_name.clone(), EntityType::Person);
                user.description = Some("The user interacting with the system".to_string());
                user.properties.insert("is_user_profile".into(), MetaValue::Bool(true));
                self.graph.create_entity(&user)?;
                user
            }
        };
        self.graph
            .create_relationship(&Relationship::new(memory.id, user.id, RelationshipType::RelatesTo))
    }

    fn link_session(&self, memory: &Memory, session_id: Uuid) -> Result<()> {
        let now = Utc::now();
        let mut session = match self.graph.get_entity(session_id)? {
            Some(session) => session,
            None => {
                let mut session = Entity::new(format!("session-{session_id}"), EntityType::Session);
                session.id = session_id;
                session.properties.insert("interaction_count".into(), MetaValue::Int(0));
                session
            }
        };
        let count = session
            .properties
            .get("interaction_count")
            .and_then(MetaValue::as_i64)
            .unwrap_or(0);
        session.properties.insert("interaction_count".into(), MetaValue::Int(count + 1));
        session
            .properties
            .insert("last_active".into(), MetaValue::from(now.to_rfc3339()));
        self.graph.create_entity(&session)?;

        self.graph
            .create_relationship(&Relationship::new(memory.id, session_id, RelationshipType::CreatedIn))
    }

    // ========================================================================
    // HYBRID RETRIEVAL
    // ========================================================================

    /// Hybrid search across the enabled collectors.
    pub async fn search(&self, params: SearchParams) -> Result<Vec<SearchResult>> {
        if params.query.trim().is_empty() {
            return Err(EngineError::InvalidInput("query must not be empty".to_string()));
        }
        let plan = WeightPlan::plan(params.mode, &params.query);
        let limit = params.limit.max(1);

        let conversation_active = params.include_conversation && params.session_id.is_some();

        let (semantic, structured, conversational) = tokio::join!(
            self.semantic_collect(&params, plan, limit),
            self.structured_collect(&params, plan, limit),
            self.conversation_collect(&params, limit, conversation_active),
        );
        let semantic = semantic?;
        let structured = structured?;
        let conversational = conversational?;

        // Merge the stored paths by memory id under the planned weights.
        let vector_scores: Vec<(Uuid, f32)> =
            semantic.iter().map(|s| (s.memory.id, s.similarity)).collect();
        let graph_scores: Vec<(Uuid, f32)> = structured
            .iter()
            .map(|m| (m.id, f32::from(m.importance) / 10.0))
            .collect();
        let merged = merge_stored(&vector_scores, &graph_scores, plan);

        let mut by_id: std::collections::HashMap<Uuid, Memory> = std::collections::HashMap::new();
        for hit in semantic {
            by_id.insert(hit.memory.id, hit.memory);
        }
        for memory in structured {
            by_id.entry(memory.id).or_insert(memory);
        }

        let mut candidates: Vec<SearchCandidate> = merged
            .into_iter()
            .filter_map(|(id, score, source)| {
                let memory = by_id.remove(&id)?;
                let mut candidate = SearchCandidate::new(id, memory.content.clone(), score, source);
                candidate.embedding = memory.embedding.clone();
                candidate.memory = Some(memory);
                Some(candidate)
            })
            .collect();

        let stored_active = !candidates.is_empty();
        candidates.extend(conversational);

        // With both paths active, bring the score scales together before
        // merging near-duplicates.
        if conversation_active && stored_active {
            normalize_by_source(&mut candidates);
        }

        let merged = merge_duplicates(self.embedder.as_ref(), candidates, thresholds::RESULT_MERGE)?;

        let mut results: Vec<SearchResult> = merged
            .into_iter()
            .filter_map(|m| {
                let memory = m.candidate.memory?;
                Some(SearchResult {
                    memory,
                    score: m.candidate.score,
                    source: m.candidate.source,
                    sources: m.sources,
                    merged_from: Some(m.merged_from),
                })
            })
            .collect();
        results.truncate(limit);

        // Access tracking persists asynchronously.
        let ids: Vec<Uuid> = results.iter().map(|r| r.memory.id).collect();
        let vector = self.vector.clone();
        tokio::spawn(async move {
            if let Err(e) = vector.touch(&ids) {
                warn!(error = %e, "access tracking update failed");
            }
        });

        Ok(results)
    }

    async fn semantic_collect(
        &self,
        params: &SearchParams,
        plan: WeightPlan,
        limit: usize,
    ) -> Result<Vec<crate::vector::ScoredMemory>> {
        if !params.include_stored || plan.vector <= 0.0 {
            return Ok(vec![]);
        }
        self.vector.search(
            self.embedder.as_ref(),
            &params.query,
            limit * 2,
            &params.filters,
            params.min_similarity,
            true,
        )
    }

    async fn structured_collect(
        &self,
        params: &SearchParams,
        plan: WeightPlan,
        limit: usize,
    ) -> Result<Vec<Memory>> {
        if !params.include_stored || plan.graph <= 0.0 {
            return Ok(vec![]);
        }
        let nodes = self.graph.entities_by_type(EntityType::Memory, limit * 2, 0)?;
        let mut memories = vec![];
        for node in nodes {
            if let Some(memory) = self.vector.get(node.id)? {
                if params.filters.matches(&memory) {
                    memories.push(memory);
                }
            }
        }
        Ok(memories)
    }

    async fn conversation_collect(
        &self,
        params: &SearchParams,
        limit: usize,
        active: bool,
    ) -> Result<Vec<SearchCandidate>> {
        let Some(session_id) = params.session_id.filter(|_| active) else {
            return Ok(vec![]);
        };
        let filters = SearchFilters {
            session_id: Some(session_id),
            memory_type: Some(MemoryType::Conversation),
            ..Default::default()
        };
        let window = self.vector.get_all(conversation::MAX_WINDOW, 0, &filters)?;
        Ok(conversation::collect_candidates(&window, &params.query, Utc::now(), limit))
    }

    // ========================================================================
    // CONTEXT, LISTING, DELETE
    // ========================================================================

    /// Session (or global) context: memories plus their graph neighborhood.
    pub async fn get_context(
        &self,
        session_id: Option<Uuid>,
        depth: usize,
        limit: usize,
    ) -> Result<ContextBundle> {
        let filters = SearchFilters {
            session_id,
            ..Default::default()
        };
        let memories = self.vector.get_all(limit, 0, &filters)?;

        let mut bundle = ContextBundle {
            memories,
            ..Default::default()
        };
        let mut seen_entities: std::collections::HashSet<Uuid> = std::collections::HashSet::new();
        for memory in &bundle.memories {
            let Neighborhood { entities, relationships } =
                self.graph.get_neighbors(memory.id, depth)?;
            for entity in entities {
                if seen_entities.insert(entity.id) {
                    bundle.entities.push(entity);
                }
            }
            for relationship in relationships {
                if !bundle.relationships.iter().any(|r| {
                    r.from_entity_id == relationship.from_entity_id
                        && r.to_entity_id == relationship.to_entity_id
                        && r.relationship_type == relationship.relationship_type
                }) {
                    bundle.relationships.push(relationship);
                }
            }
        }
        Ok(bundle)
    }

    /// Paginated memory listing.
    pub fn list_memories(
        &self,
        limit: usize,
        offset: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<Memory>> {
        self.vector.get_all(limit, offset, filters)
    }

    /// Remove a memory from both stores. Graph first; the vector record is
    /// only removed once the graph delete succeeded, so a failure never
    /// leaves an orphan graph node.
    pub async fn delete_memory(&self, id: Uuid) -> Result<bool> {
        let existed_in_vector = self.vector.get(id)?.is_some();
        if !existed_in_vector && self.graph.get_entity(id)?.is_none() {
            return Ok(false);
        }

        self.graph.delete_entity(id)?;
        self.vector.delete(id)?;
        info!(%id, "memory deleted from both stores");
        Ok(true)
    }

    // ========================================================================
    // GRAPH SURFACE
    // ========================================================================

    /// Name-merging entity upsert: an existing `(name, type)` entity is
    /// updated in place rather than duplicated.
    pub fn upsert_entity(
        &self,
        name: &str,
        entity_type: EntityType,
        description: Option<&str>,
    ) -> Result<Entity> {
        match self.graph.find_entity_by_name(name, Some(entity_type))? {
            Some(mut existing) => {
                if let Some(description) = description {
                    existing.description = Some(description.to_string());
                    self.graph.create_entity(&existing)?;
                }
                Ok(existing)
            }
            None => {
                let mut entity = Entity::new(name, entity_type);
                entity.description = description.map(str::to_string);
                self.graph.create_entity(&entity)?;
                Ok(entity)
            }
        }
    }

    /// Create a relationship between two existing entities.
    pub fn create_relationship(&self, relationship: &Relationship) -> Result<()> {
        for endpoint in [relationship.from_entity_id, relationship.to_entity_id] {
            if self.graph.get_entity(endpoint)?.is_none() {
                return Err(EngineError::NotFound(endpoint.to_string()));
            }
        }
        self.graph.create_relationship(relationship)
    }

    /// Atomic upsert of entities plus relationships with client refs.
    pub fn graph_connect(
        &self,
        entities: &[ConnectEntity],
        relationships: &[ConnectRelationship],
    ) -> Result<(Vec<Entity>, usize)> {
        let mut by_ref: std::collections::HashMap<String, Uuid> = std::collections::HashMap::new();
        let mut upserted = vec![];

        for spec in entities {
            let entity = self.upsert_entity(&spec.name, spec.entity_type, spec.description.as_deref())?;
            if let Some(r) = &spec.r#ref {
                by_ref.insert(r.clone(), entity.id);
            }
            by_ref.insert(spec.name.clone(), entity.id);
            upserted.push(entity);
        }

        let resolve = |token: &str| -> Result<Uuid> {
            if let Some(id) = by_ref.get(token) {
                return Ok(*id);
            }
            if let Ok(id) = Uuid::parse_str(token) {
                return Ok(id);
            }
            if let Some(entity) = self.graph.find_entity_by_name(token, None)? {
                return Ok(entity.id);
            }
            Err(EngineError::NotFound(format!("unresolvable endpoint: {token}")))
        };

        let mut created = 0;
        for spec in relationships {
            let mut relationship = Relationship::new(
                resolve(&spec.from)?,
                resolve(&spec.to)?,
                spec.relationship_type,
            );
            relationship.strength = spec.strength;
            self.graph.create_relationship(&relationship)?;
            created += 1;
        }

        Ok((upserted, created))
    }

    /// Read-only parameterized graph query (destructive keywords rejected).
    pub fn graph_query(
        &self,
        query: &str,
        params: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<Vec<serde_json::Map<String, serde_json::Value>>> {
        self.graph.execute(query, params)
    }

    /// Paginated session registry listing.
    pub fn list_sessions(&self, limit: usize, offset: usize) -> Result<Vec<SessionInfo>> {
        let sessions = self.graph.entities_by_type(EntityType::Session, limit, offset)?;
        Ok(sessions
            .into_iter()
            .map(|entity| SessionInfo {
                session_id: entity.id,
                interaction_count: entity
                    .properties
                    .get("interaction_count")
                    .and_then(MetaValue::as_i64)
                    .unwrap_or(0)
                    .max(0) as u64,
                created_at: entity.created_at,
                last_active: entity
                    .properties
                    .get("last_active")
                    .and_then(MetaValue::as_str)
                    .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
                    .map(|t| t.with_timezone(&Utc))
                    .unwrap_or(entity.created_at),
            })
            .collect())
    }

    // ========================================================================
    // MAINTENANCE SURFACES
    // ========================================================================

    /// Run the refinery, dry-run or apply.
    pub fn consolidate(&self, apply: bool) -> Result<RefineryReport> {
        Refinery::new(self.vector.clone()).run(self.embedder.as_ref(), apply)
    }

    /// Surface raw memories to the agent for classification.
    pub fn etl_process(&self, limit: usize) -> Result<Vec<EtlItem>> {
        self.etl.process(self.embedder.as_ref(), limit)
    }

    /// Persist an agent classification.
    pub fn etl_classify(&self, input: &EtlClassification) -> Result<Memory> {
        self.etl.classify(input)
    }

    /// ETL pipeline counters.
    pub fn etl_status(&self) -> Result<EtlStatus> {
        self.etl.status()
    }

    /// Combined status for the status tool.
    pub fn status(&self) -> Result<SystemStatus> {
        Ok(SystemStatus {
            enabled: true,
            data_dir: self.config.data_dir.display().to_string(),
            lock: self.locks.status(),
            vector: self.vector.stats()?,
            graph: self.graph.stats()?,
        })
    }
}

fn preview(content: &str, max_chars: usize) -> String {
    content.chars().take(max_chars).collect()
}

// ============================================================================
// TESTS
// ============================================================================
