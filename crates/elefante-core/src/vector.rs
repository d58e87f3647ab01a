//! Vector Store Adapter
//!
//! Typed wrapper over the embedded kNN index: every memory is stored as
//! `(id, embedding, content, flattened metadata)`. Well-known fields are
//! flattened to indexed columns; the full `custom_metadata` map is also
//! serialized to one JSON blob so arbitrary keys round-trip losslessly.
//!
//! Search embeds the query, ranks by cosine similarity, and optionally
//! blends in temporal-decay scoring (importance, access frequency, age).

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::TemporalDecayConfig;
use crate::embeddings::{cosine_similarity, Embedder};
use crate::error::{EngineError, Result};
use crate::memory::entity::RelationshipType;
use crate::memory::query::SearchFilters;
use crate::memory::record::{
    Domain, Layer, Memory, MemoryPatch, MemorySource, MemoryStatus, MemoryType, MetaMap,
    Namespace, ProcessingStatus, Ring, KnowledgeType,
};

/// Collection name reported by `stats`
const COLLECTION: &str = "memories";

// ============================================================================
// RESULT TYPES
// ============================================================================

/// One scored vector-search hit
#[derive(Debug, Clone)]
pub struct ScoredMemory {
    pub memory: Memory,
    /// Raw cosine similarity in [0, 1]
    pub similarity: f32,
    /// Final score after optional temporal blending
    pub score: f32,
}

/// Store statistics
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorStoreStats {
    pub count: u64,
    pub collection: String,
    pub dimension: usize,
}

// ============================================================================
// VECTOR STORE
// ============================================================================

/// Embedded vector store with flattened memory metadata.
///
/// Separate reader/writer connections behind mutexes keep every method
/// `&self`, so the store is `Send + Sync` behind an `Arc`.
pub struct VectorStore {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
    dimension: usize,
    temporal: TemporalDecayConfig,
}

impl VectorStore {
    /// Open (creating if needed) the store at `path`.
    pub fn open(path: &Path, dimension: usize, temporal: TemporalDecayConfig) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let writer = Connection::open(path)
            .map_err(|e| EngineError::StoreUnavailable(format!("vector store: {}", e)))?;
        configure_connection(&writer)?;
        init_schema(&writer)?;

        let reader = Connection::open(path)
            .map_err(|e| EngineError::StoreUnavailable(format!("vector store: {}", e)))?;
        configure_connection(&reader)?;

        Ok(Self {
            writer: Mutex::new(writer),
            reader: Mutex::new(reader),
            dimension,
            temporal,
        })
    }

    /// In-memory store for tests.
    #[cfg(test)]
    pub fn open_in_memory(dimension: usize) -> Result<Self> {
        let dir = std::env::temp_dir().join(format!("elefante-vec-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir)?;
        Self::open(&dir.join("memories.db"), dimension, TemporalDecayConfig::default())
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Insert a memory. The embedding must be present and match the
    /// configured dimension.
    pub fn add(&self, memory: &Memory) -> Result<()> {
        let embedding = memory
            .embedding
            .as_deref()
            .ok_or_else(|| EngineError::InvalidInput("memory has no embedding".to_string()))?;
        if embedding.len() != self.dimension {
            return Err(EngineError::InvalidInput(format!(
                "embedding dimension {} != configured {}",
                embedding.len(),
                self.dimension
            )));
        }
        memory.validate()?;

        let conn = self.writer.lock().map_err(poisoned)?;
        insert_memory(&conn, memory)?;
        debug!(id = %memory.id, "memory added to vector store");
        Ok(())
    }

    /// Reconstruct a full memory by id.
    pub fn get(&self, id: Uuid) -> Result<Option<Memory>> {
        let conn = self.reader.lock().map_err(poisoned)?;
        conn.query_row(
            "SELECT * FROM memories WHERE id = ?1",
            params![id.to_string()],
            row_to_memory,
        )
        .optional()
        .map_err(EngineError::from)
    }

    /// Exact title lookup (newest first).
    pub fn find_by_title(&self, title: &str) -> Result<Option<Memory>> {
        let conn = self.reader.lock().map_err(poisoned)?;
        conn.query_row(
            "SELECT * FROM memories WHERE title = ?1 ORDER BY created_at DESC LIMIT 1",
            params![title],
            row_to_memory,
        )
        .optional()
        .map_err(EngineError::from)
    }

    /// kNN search over cosine similarity with optional temporal blending.
    ///
    /// Candidates below `min_similarity` are dropped before blending. With
    /// temporal decay enabled the similarity ranking is oversampled 2x, the
    /// blend `w_sem * similarity + w_tmp * temporal` re-ranks, and the list
    /// is truncated back to `limit`.
    pub fn search(
        &self,
        embedder: &dyn Embedder,
        query: &str,
        limit: usize,
        filters: &SearchFilters,
        min_similarity: f32,
        apply_temporal_decay: bool,
    ) -> Result<Vec<ScoredMemory>> {
        let query_embedding = embedder.embed(query)?;
        self.search_by_embedding(&query_embedding, limit, filters, min_similarity, apply_temporal_decay)
    }

    /// Search with a precomputed query embedding (the ingestion dedup probe
    /// reuses the just-computed content embedding).
    pub fn search_by_embedding(
        &self,
        query_embedding: &[f32],
        limit: usize,
        filters: &SearchFilters,
        min_similarity: f32,
        apply_temporal_decay: bool,
    ) -> Result<Vec<ScoredMemory>> {
        let temporal_enabled = apply_temporal_decay && self.temporal.enabled;
        let oversample = if temporal_enabled { limit * 2 } else { limit };

        let candidates = self.scan(filters, None, None)?;
        let mut scored: Vec<ScoredMemory> = candidates
            .into_iter()
            .filter_map(|memory| {
                let embedding = memory.embedding.as_deref()?;
                let similarity = cosine_similarity(query_embedding, embedding);
                if similarity < min_similarity {
                    return None;
                }
                Some(ScoredMemory {
                    similarity,
                    score: similarity,
                    memory,
                })
            })
            .collect();

        scored.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(oversample);

        if temporal_enabled {
            let now = Utc::now();
            for hit in &mut scored {
                let temporal = hit.memory.temporal_score(now);
                hit.score = (self.temporal.semantic_weight * hit.similarity
                    + self.temporal.temporal_weight * temporal)
                    .clamp(0.0, 1.0);
            }
            scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
            scored.truncate(limit);
        }

        Ok(scored)
    }

    /// Field-level update. Content changes re-embed; the underlying engine
    /// has no in-place update, so this is a read-patch-replace.
    pub fn update(&self, embedder: &dyn Embedder, id: Uuid, patch: &MemoryPatch) -> Result<Memory> {
        let mut memory = self
            .get(id)?
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;

        apply_patch(&mut memory, patch);
        if patch.needs_reembed() {
            memory.embedding = Some(embedder.embed(&memory.content)?);
        }
        if patch.last_modified.is_none() {
            memory.last_modified = Utc::now();
        }

        self.replace(&memory)?;
        Ok(memory)
    }

    /// Full rewrite by id.
    pub fn replace(&self, memory: &Memory) -> Result<()> {
        let embedding = memory
            .embedding
            .as_deref()
            .ok_or_else(|| EngineError::InvalidInput("memory has no embedding".to_string()))?;
        if embedding.len() != self.dimension {
            return Err(EngineError::InvalidInput(format!(
                "embedding dimension {} != configured {}",
                embedding.len(),
                self.dimension
            )));
        }

        let mut conn = self.writer.lock().map_err(poisoned)?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM memories WHERE id = ?1", params![memory.id.to_string()])?;
        insert_memory(&tx, memory)?;
        tx.commit()?;
        Ok(())
    }

    /// Delete by id. Returns whether a row was removed.
    pub fn delete(&self, id: Uuid) -> Result<bool> {
        let conn = self.writer.lock().map_err(poisoned)?;
        let n = conn.execute("DELETE FROM memories WHERE id = ?1", params![id.to_string()])?;
        Ok(n > 0)
    }

    /// Paginated scan (newest first), used by the refinery and exports.
    pub fn get_all(&self, limit: usize, offset: usize, filters: &SearchFilters) -> Result<Vec<Memory>> {
        self.scan(filters, Some(limit), Some(offset))
    }

    /// Bump access tracking for search hits. Lightweight write without a
    /// full replace; callers persist this after returning results.
    pub fn touch(&self, ids: &[Uuid]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let now = Utc::now();
        let conn = self.writer.lock().map_err(poisoned)?;
        for id in ids {
            conn.execute(
                "UPDATE memories SET last_accessed = ?1, access_count = access_count + 1 WHERE id = ?2",
                params![now, id.to_string()],
            )?;
        }
        Ok(())
    }

    /// Store statistics.
    pub fn stats(&self) -> Result<VectorStoreStats> {
        let conn = self.reader.lock().map_err(poisoned)?;
        let count: u64 = conn.query_row("SELECT COUNT(*) FROM memories", [], |row| row.get::<_, i64>(0))? as u64;
        Ok(VectorStoreStats {
            count,
            collection: COLLECTION.to_string(),
            dimension: self.dimension,
        })
    }

    /// Counts per processing status (ETL status surface).
    pub fn processing_counts(&self) -> Result<Vec<(ProcessingStatus, u64)>> {
        let conn = self.reader.lock().map_err(poisoned)?;
        let mut stmt =
            conn.prepare("SELECT processing_status, COUNT(*) FROM memories GROUP BY processing_status")?;
        let rows = stmt.query_map([], |row| {
            let status: String = row.get(0)?;
            let count: u64 = row.get::<_, i64>(1)? as u64;
            Ok((status, count))
        })?;

        let mut counts = vec![];
        for row in rows {
            let (status, count) = row?;
            match ProcessingStatus::parse(&status) {
                Some(status) => counts.push((status, count)),
                None => warn!(status, "unknown processing_status in store"),
            }
        }
        Ok(counts)
    }

    fn scan(
        &self,
        filters: &SearchFilters,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> Result<Vec<Memory>> {
        let (clause, params) = filters_to_sql(filters);
        let mut sql = format!("SELECT * FROM memories{} ORDER BY created_at DESC", clause);
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, offset.unwrap_or(0)));
        }

        let conn = self.reader.lock().map_err(poisoned)?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(params), row_to_memory)?;

        let mut memories = vec![];
        for row in rows {
            memories.push(row?);
        }
        Ok(memories)
    }
}

// ============================================================================
// SCHEMA AND ROW MAPPING
// ============================================================================

pub(crate) fn configure_connection(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA cache_size = -16000;
         PRAGMA temp_store = MEMORY;
         PRAGMA busy_timeout = 5000;",
    )?;
    Ok(())
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS memories (
            id                 TEXT PRIMARY KEY,
            content            TEXT NOT NULL,
            embedding          BLOB NOT NULL,
            layer              TEXT NOT NULL,
            sublayer           TEXT NOT NULL,
            domain             TEXT NOT NULL,
            category           TEXT NOT NULL,
            memory_type        TEXT NOT NULL,
            intent             TEXT,
            ring               TEXT,
            knowledge_type     TEXT,
            topic              TEXT,
            summary            TEXT,
            owner_id           TEXT,
            importance         INTEGER NOT NULL,
            urgency            INTEGER NOT NULL,
            confidence         REAL NOT NULL,
            status             TEXT NOT NULL,
            archived           INTEGER NOT NULL DEFAULT 0,
            deprecated         INTEGER NOT NULL DEFAULT 0,
            processing_status  TEXT NOT NULL,
            parent_id          TEXT,
            supersedes_id      TEXT,
            superseded_by_id   TEXT,
            related_memory_ids TEXT NOT NULL DEFAULT '[]',
            conflict_ids       TEXT NOT NULL DEFAULT '[]',
            relationship_type  TEXT,
            canonical_key      TEXT,
            namespace          TEXT NOT NULL,
            source             TEXT NOT NULL,
            source_reliability REAL NOT NULL,
            verified           INTEGER NOT NULL DEFAULT 0,
            created_at         TEXT NOT NULL,
            last_modified      TEXT NOT NULL,
            last_accessed      TEXT NOT NULL,
            access_count       INTEGER NOT NULL DEFAULT 0,
            project            TEXT,
            file_path          TEXT,
            session_id         TEXT,
            tags               TEXT NOT NULL DEFAULT '[]',
            keywords           TEXT NOT NULL DEFAULT '[]',
            title              TEXT,
            custom_metadata    TEXT NOT NULL DEFAULT '{}'
        );
        CREATE INDEX IF NOT EXISTS idx_memories_canonical ON memories(namespace, canonical_key);
        CREATE INDEX IF NOT EXISTS idx_memories_session ON memories(session_id);
        CREATE INDEX IF NOT EXISTS idx_memories_type ON memories(memory_type);
        CREATE INDEX IF NOT EXISTS idx_memories_title ON memories(title);
        CREATE INDEX IF NOT EXISTS idx_memories_processing ON memories(processing_status);",
    )?;
    Ok(())
}

fn insert_memory(conn: &Connection, memory: &Memory) -> Result<()> {
    let embedding = memory
        .embedding
        .as_deref()
        .ok_or_else(|| EngineError::InvalidInput("memory has no embedding".to_string()))?;

    conn.execute(
        "INSERT INTO memories (
            id, content, embedding,
            layer, sublayer, domain, category, memory_type, intent,
            ring, knowledge_type, topic, summary, owner_id,
            importance, urgency, confidence, status, archived, deprecated, processing_status,
            parent_id, supersedes_id, superseded_by_id, related_memory_ids, conflict_ids, relationship_type,
            canonical_key, namespace,
            source, source_reliability, verified,
            created_at, last_modified, last_accessed, access_count,
            project, file_path, session_id,
            tags, keywords, title, custom_metadata
        ) VALUES (
            ?1, ?2, ?3,
            ?4, ?5, ?6, ?7, ?8, ?9,
            ?10, ?11, ?12, ?13, ?14,
            ?15, ?16, ?17, ?18, ?19, ?20, ?21,
            ?22, ?23, ?24, ?25, ?26, ?27,
            ?28, ?29,
            ?30, ?31, ?32,
            ?33, ?34, ?35, ?36,
            ?37, ?38, ?39,
            ?40, ?41, ?42, ?43
        )",
        params![
            memory.id.to_string(),
            memory.content,
            embedding_to_bytes(embedding),
            memory.layer.as_str(),
            memory.sublayer,
            memory.domain.as_str(),
            memory.category,
            memory.memory_type.as_str(),
            memory.intent,
            memory.ring.map(|r| r.as_str()),
            memory.knowledge_type.map(|k| k.as_str()),
            memory.topic,
            memory.summary,
            memory.owner_id,
            memory.importance,
            memory.urgency,
            memory.confidence,
            memory.status.as_str(),
            memory.archived,
            memory.deprecated,
            memory.processing_status.as_str(),
            memory.parent_id.map(|u| u.to_string()),
            memory.supersedes_id.map(|u| u.to_string()),
            memory.superseded_by_id.map(|u| u.to_string()),
            serde_json::to_string(&memory.related_memory_ids)?,
            serde_json::to_string(&memory.conflict_ids)?,
            memory.relationship_type.map(|r| r.as_str()),
            memory.canonical_key,
            memory.namespace.as_str(),
            memory.source.as_str(),
            memory.source_reliability,
            memory.verified,
            memory.created_at,
            memory.last_modified,
            memory.last_accessed,
            memory.access_count,
            memory.project,
            memory.file_path,
            memory.session_id.map(|u| u.to_string()),
            serde_json::to_string(&memory.tags)?,
            serde_json::to_string(&memory.keywords)?,
            memory.title().map(str::to_string),
            serde_json::to_string(&memory.custom_metadata)?,
        ],
    )?;
    Ok(())
}

fn row_to_memory(row: &Row<'_>) -> rusqlite::Result<Memory> {
    fn bad(msg: String) -> rusqlite::Error {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            Box::<dyn std::error::Error + Send + Sync>::from(msg),
        )
    }
    fn parse_uuid(value: Option<String>) -> rusqlite::Result<Option<Uuid>> {
        value
            .map(|s| Uuid::parse_str(&s).map_err(|e| bad(format!("bad uuid: {e}"))))
            .transpose()
    }
    fn parse_json<T: serde::de::DeserializeOwned>(raw: String) -> rusqlite::Result<T> {
        serde_json::from_str(&raw).map_err(|e| bad(format!("bad json column: {e}")))
    }

    let layer: String = row.get("layer")?;
    let domain: String = row.get("domain")?;
    let memory_type: String = row.get("memory_type")?;
    let status: String = row.get("status")?;
    let processing: String = row.get("processing_status")?;
    let namespace: String = row.get("namespace")?;
    let source: String = row.get("source")?;
    let ring: Option<String> = row.get("ring")?;
    let knowledge_type: Option<String> = row.get("knowledge_type")?;
    let relationship_type: Option<String> = row.get("relationship_type")?;

    let id: String = row.get("id")?;
    let mut memory = Memory::new(row.get::<_, String>("content")?);
    memory.id = Uuid::parse_str(&id).map_err(|e| bad(format!("bad uuid: {e}")))?;
    memory.embedding = Some(bytes_to_embedding(&row.get::<_, Vec<u8>>("embedding")?));
    memory.layer = Layer::parse(&layer).ok_or_else(|| bad(format!("bad layer: {layer}")))?;
    memory.sublayer = row.get("sublayer")?;
    memory.domain = Domain::parse(&domain).ok_or_else(|| bad(format!("bad domain: {domain}")))?;
    memory.category = row.get("category")?;
    memory.memory_type = MemoryType::parse(&memory_type)
        .ok_or_else(|| bad(format!("bad memory_type: {memory_type}")))?;
    memory.intent = row.get("intent")?;
    memory.ring = ring
        .map(|s| Ring::parse(&s).ok_or_else(|| bad(format!("bad ring: {s}"))))
        .transpose()?;
    memory.knowledge_type = knowledge_type
        .map(|s| KnowledgeType::parse(&s).ok_or_else(|| bad(format!("bad knowledge_type: {s}"))))
        .transpose()?;
    memory.topic = row.get("topic")?;
    memory.summary = row.get("summary")?;
    memory.owner_id = row.get("owner_id")?;
    memory.importance = row.get("importance")?;
    memory.urgency = row.get("urgency")?;
    memory.confidence = row.get("confidence")?;
    memory.status =
        MemoryStatus::parse(&status).ok_or_else(|| bad(format!("bad status: {status}")))?;
    memory.archived = row.get("archived")?;
    memory.deprecated = row.get("deprecated")?;
    memory.processing_status = ProcessingStatus::parse(&processing)
        .ok_or_else(|| bad(format!("bad processing_status: {processing}")))?;
    memory.parent_id = parse_uuid(row.get("parent_id")?)?;
    memory.supersedes_id = parse_uuid(row.get("supersedes_id")?)?;
    memory.superseded_by_id = parse_uuid(row.get("superseded_by_id")?)?;
    memory.related_memory_ids = parse_json(row.get("related_memory_ids")?)?;
    memory.conflict_ids = parse_json(row.get("conflict_ids")?)?;
    memory.relationship_type = relationship_type
        .map(|s| {
            RelationshipType::parse(&s).ok_or_else(|| bad(format!("bad relationship_type: {s}")))
        })
        .transpose()?;
    memory.canonical_key = row.get("canonical_key")?;
    memory.namespace = Namespace::parse(&namespace)
        .ok_or_else(|| bad(format!("bad namespace: {namespace}")))?;
    memory.source =
        MemorySource::parse(&source).ok_or_else(|| bad(format!("bad source: {source}")))?;
    memory.source_reliability = row.get("source_reliability")?;
    memory.verified = row.get("verified")?;
    memory.created_at = row.get::<_, DateTime<Utc>>("created_at")?;
    memory.last_modified = row.get::<_, DateTime<Utc>>("last_modified")?;
    memory.last_accessed = row.get::<_, DateTime<Utc>>("last_accessed")?;
    memory.access_count = row.get("access_count")?;
    memory.project = row.get("project")?;
    memory.file_path = row.get("file_path")?;
    memory.session_id = parse_uuid(row.get("session_id")?)?;
    memory.tags = parse_json(row.get("tags")?)?;
    memory.keywords = parse_json(row.get("keywords")?)?;
    memory.custom_metadata = parse_json::<MetaMap>(row.get("custom_metadata")?)?;

    Ok(memory)
}

fn apply_patch(memory: &mut Memory, patch: &MemoryPatch) {
    if let Some(content) = &patch.content {
        memory.content = content.clone();
    }
    if let Some(importance) = patch.importance {
        memory.importance = importance;
    }
    if let Some(tags) = &patch.tags {
        memory.tags = tags.clone();
    }
    if let Some(status) = patch.status {
        memory.status = status;
    }
    if let Some(deprecated) = patch.deprecated {
        memory.deprecated = deprecated;
    }
    if let Some(archived) = patch.archived {
        memory.archived = archived;
    }
    if let Some(relationship_type) = patch.relationship_type {
        memory.relationship_type = Some(relationship_type);
    }
    if let Some(supersedes_id) = patch.supersedes_id {
        memory.supersedes_id = Some(supersedes_id);
    }
    if let Some(superseded_by_id) = patch.superseded_by_id {
        memory.superseded_by_id = Some(superseded_by_id);
    }
    if let Some(canonical_key) = &patch.canonical_key {
        memory.canonical_key = Some(canonical_key.clone());
    }
    if let Some(namespace) = patch.namespace {
        memory.namespace = namespace;
    }
    if let Some(custom) = &patch.custom_metadata {
        memory.custom_metadata = custom.clone();
    }
    if let Some(processing_status) = patch.processing_status {
        memory.processing_status = processing_status;
    }
    if let Some(last_accessed) = patch.last_accessed {
        memory.last_accessed = last_accessed;
    }
    if let Some(last_modified) = patch.last_modified {
        memory.last_modified = last_modified;
    }
    if let Some(access_count) = patch.access_count {
        memory.access_count = access_count;
    }
}

fn filters_to_sql(filters: &SearchFilters) -> (String, Vec<rusqlite::types::Value>) {
    use rusqlite::types::Value;

    let mut conditions: Vec<String> = vec![];
    let mut params: Vec<Value> = vec![];
    let push = |cond: &str, value: Value, params: &mut Vec<Value>| {
        params.push(value);
        format!("{} = ?{}", cond, params.len())
    };

    if let Some(layer) = filters.layer {
        let c = push("layer", Value::Text(layer.as_str().to_string()), &mut params);
        conditions.push(c);
    }
    if let Some(sublayer) = &filters.sublayer {
        let c = push("sublayer", Value::Text(sublayer.clone()), &mut params);
        conditions.push(c);
    }
    if let Some(memory_type) = filters.memory_type {
        let c = push("memory_type", Value::Text(memory_type.as_str().to_string()), &mut params);
        conditions.push(c);
    }
    if let Some(status) = filters.status {
        let c = push("status", Value::Text(status.as_str().to_string()), &mut params);
        conditions.push(c);
    }
    if let Some(namespace) = filters.namespace {
        let c = push("namespace", Value::Text(namespace.as_str().to_string()), &mut params);
        conditions.push(c);
    }
    if let Some(processing) = filters.processing_status {
        let c = push("processing_status", Value::Text(processing.as_str().to_string()), &mut params);
        conditions.push(c);
    }
    if let Some(session_id) = filters.session_id {
        let c = push("session_id", Value::Text(session_id.to_string()), &mut params);
        conditions.push(c);
    }
    if let Some(project) = &filters.project {
        let c = push("project", Value::Text(project.clone()), &mut params);
        conditions.push(c);
    }
    if let Some(canonical_key) = &filters.canonical_key {
        let c = push("canonical_key", Value::Text(canonical_key.clone()), &mut params);
        conditions.push(c);
    }
    if let Some(min_importance) = filters.min_importance {
        params.push(Value::Integer(i64::from(min_importance)));
        conditions.push(format!("importance >= ?{}", params.len()));
    }
    if let Some(tags) = &filters.tags {
        // Tags are stored as a JSON array; ANY-match via substring on the
        // quoted tag text.
        let mut any = vec![];
        for tag in tags {
            params.push(Value::Text(format!("%\"{}\"%", tag)));
            any.push(format!("tags LIKE ?{}", params.len()));
        }
        if !any.is_empty() {
            conditions.push(format!("({})", any.join(" OR ")));
        }
    }
    if !filters.include_archived {
        conditions.push("archived = 0".to_string());
    }

    if conditions.is_empty() {
        (String::new(), params)
    } else {
        (format!(" WHERE {}", conditions.join(" AND ")), params)
    }
}

/// Little-endian f32 packing for the embedding blob.
pub fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Inverse of [`embedding_to_bytes`].
pub fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> EngineError {
    EngineError::StoreUnavailable("vector store mutex poisoned".to_string())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashEmbedder;

    const DIM: usize = 64;

    fn store() -> VectorStore {
        VectorStore::open_in_memory(DIM).unwrap()
    }

    fn embedder() -> HashEmbedder {
        HashEmbedder::new(DIM)
    }

    fn memory(content: &str) -> Memory {
        let mut memory = Memory::new(content);
        memory.importance = 5;
        memory.urgency = 5;
        memory.embedding = Some(embedder().embed(content).unwrap());
        memory
    }

    #[test]
    fn test_add_get_roundtrip() {
        let store = store();
        let mut m = memory("Rust ownership rules prevent data races");
        m.tags = vec!["rust".into(), "memory-safety".into()];
        m.set_custom("title", "Rust-Ownership");
        m.session_id = Some(Uuid::new_v4());

        store.add(&m).unwrap();
        let back = store.get(m.id).unwrap().unwrap();

        assert_eq!(back.content, m.content);
        assert_eq!(back.tags, m.tags);
        assert_eq!(back.title(), Some("Rust-Ownership"));
        assert_eq!(back.session_id, m.session_id);
        assert_eq!(back.embedding, m.embedding);
        assert_eq!(back.namespace, Namespace::Prod);
    }

    #[test]
    fn test_add_requires_embedding() {
        let store = store();
        let mut m = Memory::new("no embedding");
        m.importance = 5;
        m.urgency = 5;
        assert!(store.add(&m).is_err());

        m.embedding = Some(vec![0.5; DIM + 1]);
        let err = store.add(&m).unwrap_err();
        assert_eq!(err.kind(), "invalid_input");
    }

    #[test]
    fn test_search_ranks_by_similarity() {
        let store = store();
        let e = embedder();
        let close = memory("the build pipeline broke after the compiler upgrade");
        let far = memory("grocery list apples oranges flour");
        store.add(&close).unwrap();
        store.add(&far).unwrap();

        let hits = store
            .search(&e, "build pipeline compiler failure", 10, &SearchFilters::default(), 0.0, false)
            .unwrap();
        assert_eq!(hits[0].memory.id, close.id);
        assert!(hits[0].similarity >= hits.last().unwrap().similarity);
    }

    #[test]
    fn test_search_min_similarity_monotone() {
        let store = store();
        let e = embedder();
        for content in [
            "kubernetes cluster autoscaling policy",
            "cluster scaling thresholds for k8s",
            "banana bread recipe with walnuts",
        ] {
            store.add(&memory(content)).unwrap();
        }

        let loose = store
            .search(&e, "cluster scaling", 10, &SearchFilters::default(), 0.0, false)
            .unwrap();
        let tight = store
            .search(&e, "cluster scaling", 10, &SearchFilters::default(), 0.4, false)
            .unwrap();
        assert!(tight.len() <= loose.len());
    }

    #[test]
    fn test_temporal_decay_boosts_important_recent() {
        let store = store();
        let e = embedder();

        let mut stale = memory("team standup notes for project atlas");
        stale.importance = 1;
        stale.last_accessed = Utc::now() - chrono::Duration::days(170);
        let mut hot = memory("team standup notes for project atlas today");
        hot.importance = 10;
        hot.access_count = 30;
        store.add(&stale).unwrap();
        store.add(&hot).unwrap();

        let hits = store
            .search(&e, "standup notes project atlas", 1, &SearchFilters::default(), 0.0, true)
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].memory.id, hot.id);
        assert!((0.0..=1.0).contains(&hits[0].score));
    }

    #[test]
    fn test_update_patches_fields() {
        let store = store();
        let e = embedder();
        let m = memory("original fact about the deploy process");
        store.add(&m).unwrap();

        let patch = MemoryPatch {
            importance: Some(9),
            status: Some(MemoryStatus::Active),
            tags: Some(vec!["deploy".into()]),
            ..Default::default()
        };
        let updated = store.update(&e, m.id, &patch).unwrap();
        assert_eq!(updated.importance, 9);
        assert_eq!(updated.status, MemoryStatus::Active);
        assert_eq!(updated.tags, vec!["deploy"]);
        assert!(updated.last_modified >= m.last_modified);

        let back = store.get(m.id).unwrap().unwrap();
        assert_eq!(back.importance, 9);
    }

    #[test]
    fn test_update_content_reembeds() {
        let store = store();
        let e = embedder();
        let m = memory("old content");
        store.add(&m).unwrap();

        let patch = MemoryPatch {
            content: Some("entirely new content about databases".into()),
            ..Default::default()
        };
        let updated = store.update(&e, m.id, &patch).unwrap();
        assert_ne!(updated.embedding, m.embedding);
        assert_eq!(
            updated.embedding.as_deref().unwrap(),
            e.embed("entirely new content about databases").unwrap()
        );
    }

    #[test]
    fn test_update_missing_is_not_found() {
        let store = store();
        let e = embedder();
        let err = store
            .update(&e, Uuid::new_v4(), &MemoryPatch::default())
            .unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[test]
    fn test_delete() {
        let store = store();
        let m = memory("to be deleted");
        store.add(&m).unwrap();
        assert!(store.delete(m.id).unwrap());
        assert!(!store.delete(m.id).unwrap());
        assert!(store.get(m.id).unwrap().is_none());
    }

    #[test]
    fn test_get_all_pagination_and_filters() {
        let store = store();
        for i in 0..5 {
            let mut m = memory(&format!("fact number {i}"));
            m.memory_type = MemoryType::Fact;
            store.add(&m).unwrap();
        }
        let mut conv = memory("a conversation line");
        conv.memory_type = MemoryType::Conversation;
        store.add(&conv).unwrap();

        let facts = store
            .get_all(
                10,
                0,
                &SearchFilters {
                    memory_type: Some(MemoryType::Fact),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(facts.len(), 5);

        let page = store.get_all(2, 2, &SearchFilters::default()).unwrap();
        assert_eq!(page.len(), 2);
    }

    #[test]
    fn test_archived_excluded_by_default() {
        let store = store();
        let mut m = memory("archived memory");
        m.archived = true;
        store.add(&m).unwrap();

        assert!(store.get_all(10, 0, &SearchFilters::default()).unwrap().is_empty());
        let with_archived = store
            .get_all(
                10,
                0,
                &SearchFilters {
                    include_archived: true,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(with_archived.len(), 1);
    }

    #[test]
    fn test_find_by_title() {
        let store = store();
        let mut m = memory("the no-emoji rule");
        m.set_custom("title", "Self-Limit-Emojis");
        store.add(&m).unwrap();

        let hit = store.find_by_title("Self-Limit-Emojis").unwrap().unwrap();
        assert_eq!(hit.id, m.id);
        assert!(store.find_by_title("Missing").unwrap().is_none());
    }

    #[test]
    fn test_touch_bumps_access() {
        let store = store();
        let m = memory("often accessed");
        store.add(&m).unwrap();

        store.touch(&[m.id]).unwrap();
        store.touch(&[m.id]).unwrap();
        let back = store.get(m.id).unwrap().unwrap();
        assert_eq!(back.access_count, 2);
        assert!(back.last_accessed >= m.last_accessed);
    }

    #[test]
    fn test_stats() {
        let store = store();
        store.add(&memory("one")).unwrap();
        store.add(&memory("two")).unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.collection, "memories");
        assert_eq!(stats.dimension, DIM);
    }

    #[test]
    fn test_tag_filter_any_match() {
        let store = store();
        let mut a = memory("tagged test one");
        a.tags = vec!["test".into()];
        let mut b = memory("tagged e2e two");
        b.tags = vec!["e2e".into()];
        let mut c = memory("untagged three");
        c.tags = vec!["misc".into()];
        for m in [&a, &b, &c] {
            store.add(m).unwrap();
        }

        let hits = store
            .get_all(
                10,
                0,
                &SearchFilters {
                    tags: Some(vec!["test".into(), "e2e".into()]),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn test_embedding_bytes_roundtrip() {
        let original = vec![1.5_f32, -2.25, 0.0, 3.125];
        let bytes = embedding_to_bytes(&original);
        assert_eq!(bytes_to_embedding(&bytes), original);
    }
}
