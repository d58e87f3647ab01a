//! Graph Store Adapter
//!
//! Typed wrapper over the embedded property graph: entities (nodes) and
//! typed directed relationships (edges). Entity `properties` are stored as
//! one JSON-encoded column. Arbitrary read queries go through `execute`,
//! which rejects destructive keywords; the only delete path is the dedicated
//! `delete_entity`, which detaches edges first.

use std::collections::{HashSet, VecDeque};
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, ToSql};
use serde_json::{Map as JsonMap, Value as JsonValue};
use tracing::debug;
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::memory::entity::{Entity, EntityType, Relationship, RelationshipType};
use crate::memory::record::MetaMap;
use crate::vector::configure_connection;

/// Maximum traversal depth for `find_path`
pub const MAX_PATH_DEPTH: usize = 3;

/// Maximum number of paths returned by `find_path`
pub const MAX_PATHS: usize = 10;

// ============================================================================
// RESULT TYPES
// ============================================================================

/// Neighborhood of an entity up to a bounded depth
#[derive(Debug, Clone, Default)]
pub struct Neighborhood {
    pub entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,
}

/// Store statistics
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphStoreStats {
    pub entities: u64,
    pub relationships: u64,
}

// ============================================================================
// GRAPH STORE
// ============================================================================

/// Embedded property-graph store.
pub struct GraphStore {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
}

impl GraphStore {
    /// Open (creating if needed) the store at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let writer = Connection::open(path)
            .map_err(|e| EngineError::StoreUnavailable(format!("graph store: {}", e)))?;
        configure_connection(&writer)?;

        let store = Self {
            writer: Mutex::new(writer),
            reader: Mutex::new(
                Connection::open(path)
                    .map_err(|e| EngineError::StoreUnavailable(format!("graph store: {}", e)))?,
            ),
        };
        store.init_schema()?;
        Ok(store)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let dir = std::env::temp_dir().join(format!("elefante-graph-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir)?;
        Self::open(&dir.join("graph.db"))
    }

    /// Create node and edge tables. Idempotent.
    pub fn init_schema(&self) -> Result<()> {
        let conn = self.writer.lock().map_err(poisoned)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS entities (
                id          TEXT PRIMARY KEY,
                name        TEXT NOT NULL,
                entity_type TEXT NOT NULL,
                description TEXT,
                created_at  TEXT NOT NULL,
                properties  TEXT NOT NULL DEFAULT '{}',
                tags        TEXT NOT NULL DEFAULT '[]'
            );
            CREATE INDEX IF NOT EXISTS idx_entities_name ON entities(name);
            CREATE INDEX IF NOT EXISTS idx_entities_type ON entities(entity_type);
            CREATE TABLE IF NOT EXISTS edges (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                from_id    TEXT NOT NULL,
                to_id      TEXT NOT NULL,
                rel_type   TEXT NOT NULL,
                strength   REAL,
                properties TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_edges_from ON edges(from_id);
            CREATE INDEX IF NOT EXISTS idx_edges_to ON edges(to_id);
            CREATE INDEX IF NOT EXISTS idx_edges_type ON edges(rel_type);",
        )?;
        Ok(())
    }

    /// Insert or update an entity by id. Identical names stay distinct; the
    /// orchestrator performs name-based merges before calling this.
    pub fn create_entity(&self, entity: &Entity) -> Result<()> {
        if !Entity::name_is_valid(&entity.name) {
            return Err(EngineError::InvalidInput(format!(
                "entity name must be 1..{} chars",
                Entity::MAX_NAME_CHARS
            )));
        }

        let conn = self.writer.lock().map_err(poisoned)?;
        conn.execute(
            "INSERT INTO entities (id, name, entity_type, description, created_at, properties, tags)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                entity_type = excluded.entity_type,
                description = excluded.description,
                properties = excluded.properties,
                tags = excluded.tags",
            params![
                entity.id.to_string(),
                entity.name,
                entity.entity_type.as_str(),
                entity.description,
                entity.created_at,
                serde_json::to_string(&entity.properties)?,
                serde_json::to_string(&entity.tags)?,
            ],
        )?;
        debug!(id = %entity.id, name = %entity.name, "entity upserted");
        Ok(())
    }

    /// Insert a directed edge. `CUSTOM` maps to the default relation at
    /// write time.
    pub fn create_relationship(&self, relationship: &Relationship) -> Result<()> {
        if let Some(strength) = relationship.strength {
            if !(0.0..=1.0).contains(&strength) {
                return Err(EngineError::InvalidInput(format!(
                    "strength must be 0.0..1.0, got {}",
                    strength
                )));
            }
        }

        let conn = self.writer.lock().map_err(poisoned)?;
        conn.execute(
            "INSERT INTO edges (from_id, to_id, rel_type, strength, properties, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                relationship.from_entity_id.to_string(),
                relationship.to_entity_id.to_string(),
                relationship.relationship_type.storage_type().as_str(),
                relationship.strength,
                serde_json::to_string(&relationship.properties)?,
                Utc::now(),
            ],
        )?;
        Ok(())
    }

    pub fn get_entity(&self, id: Uuid) -> Result<Option<Entity>> {
        let conn = self.reader.lock().map_err(poisoned)?;
        conn.query_row(
            "SELECT * FROM entities WHERE id = ?1",
            params![id.to_string()],
            row_to_entity,
        )
        .optional()
        .map_err(EngineError::from)
    }

    /// Name lookup used for orchestrator-side merges. Optional type narrows
    /// the match.
    pub fn find_entity_by_name(
        &self,
        name: &str,
        entity_type: Option<EntityType>,
    ) -> Result<Option<Entity>> {
        let conn = self.reader.lock().map_err(poisoned)?;
        match entity_type {
            Some(entity_type) => conn
                .query_row(
                    "SELECT * FROM entities WHERE name = ?1 AND entity_type = ?2
                     ORDER BY created_at ASC LIMIT 1",
                    params![name, entity_type.as_str()],
                    row_to_entity,
                )
                .optional()
                .map_err(EngineError::from),
            None => conn
                .query_row(
                    "SELECT * FROM entities WHERE name = ?1 ORDER BY created_at ASC LIMIT 1",
                    params![name],
                    row_to_entity,
                )
                .optional()
                .map_err(EngineError::from),
        }
    }

    /// Entities of one type, newest first (session listing).
    pub fn entities_by_type(
        &self,
        entity_type: EntityType,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Entity>> {
        let conn = self.reader.lock().map_err(poisoned)?;
        let mut stmt = conn.prepare(
            "SELECT * FROM entities WHERE entity_type = ?1
             ORDER BY created_at DESC LIMIT ?2 OFFSET ?3",
        )?;
        let rows = stmt.query_map(
            params![entity_type.as_str(), limit as i64, offset as i64],
            row_to_entity,
        )?;
        collect_rows(rows)
    }

    /// Bounded breadth-first traversal from `id`, following edges in both
    /// directions.
    pub fn get_neighbors(&self, id: Uuid, depth: usize) -> Result<Neighborhood> {
        let mut neighborhood = Neighborhood::default();
        let mut visited: HashSet<Uuid> = HashSet::new();
        let mut seen_edges: HashSet<(Uuid, Uuid, RelationshipType)> = HashSet::new();
        let mut frontier: VecDeque<(Uuid, usize)> = VecDeque::new();
        frontier.push_back((id, 0));
        visited.insert(id);

        while let Some((node, dist)) = frontier.pop_front() {
            if dist >= depth {
                continue;
            }
            for edge in self.edges_touching(node)? {
                let key = (edge.from_entity_id, edge.to_entity_id, edge.relationship_type);
                if seen_edges.insert(key) {
                    neighborhood.relationships.push(edge.clone());
                }
                let other = if edge.from_entity_id == node {
                    edge.to_entity_id
                } else {
                    edge.from_entity_id
                };
                if visited.insert(other) {
                    if let Some(entity) = self.get_entity(other)? {
                        neighborhood.entities.push(entity);
                    }
                    frontier.push_back((other, dist + 1));
                }
            }
        }

        Ok(neighborhood)
    }

    /// Up to [`MAX_PATHS`] paths between two entities, each at most
    /// `max_depth` hops (capped at [`MAX_PATH_DEPTH`]).
    pub fn find_path(&self, from: Uuid, to: Uuid, max_depth: usize) -> Result<Vec<Vec<Uuid>>> {
        let max_depth = max_depth.min(MAX_PATH_DEPTH);
        let mut paths: Vec<Vec<Uuid>> = vec![];
        let mut queue: VecDeque<Vec<Uuid>> = VecDeque::new();
        queue.push_back(vec![from]);

        while let Some(path) = queue.pop_front() {
            if paths.len() >= MAX_PATHS {
                break;
            }
            let last = *path.last().expect("paths are non-empty");
            if last == to {
                paths.push(path);
                continue;
            }
            if path.len() > max_depth {
                continue;
            }
            for edge in self.edges_touching(last)? {
                let next = if edge.from_entity_id == last {
                    edge.to_entity_id
                } else {
                    edge.from_entity_id
                };
                if path.contains(&next) {
                    continue;
                }
                let mut extended = path.clone();
                extended.push(next);
                queue.push_back(extended);
            }
        }

        Ok(paths)
    }

    /// Run a parameterized read query.
    ///
    /// Hard precondition for every caller: queries mentioning `DELETE`,
    /// `DROP`, or `REMOVE` are rejected. The internal delete path uses
    /// [`GraphStore::delete_entity`] instead.
    pub fn execute(&self, query: &str, query_params: &JsonMap<String, JsonValue>) -> Result<Vec<JsonMap<String, JsonValue>>> {
        ensure_read_only(query)?;

        let bindings: Vec<(String, rusqlite::types::Value)> = query_params
            .iter()
            .map(|(key, value)| Ok((format!(":{}", key), json_to_sql(value)?)))
            .collect::<Result<_>>()?;
        let bound: Vec<(&str, &dyn ToSql)> = bindings
            .iter()
            .map(|(key, value)| (key.as_str(), value as &dyn ToSql))
            .collect();

        let conn = self.reader.lock().map_err(poisoned)?;
        let mut stmt = conn.prepare(query)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

        let mut rows = stmt.query(&bound[..])?;
        let mut results = vec![];
        while let Some(row) = rows.next()? {
            let mut record = JsonMap::new();
            for (index, column) in columns.iter().enumerate() {
                let value: rusqlite::types::Value = row.get(index)?;
                record.insert(column.clone(), sql_to_json(value));
            }
            results.push(record);
        }
        Ok(results)
    }

    /// Detach and delete a node. Returns whether the entity existed.
    pub fn delete_entity(&self, id: Uuid) -> Result<bool> {
        let mut conn = self.writer.lock().map_err(poisoned)?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM edges WHERE from_id = ?1 OR to_id = ?1",
            params![id.to_string()],
        )?;
        let removed = tx.execute("DELETE FROM entities WHERE id = ?1", params![id.to_string()])?;
        tx.commit()?;
        Ok(removed > 0)
    }

    /// Store statistics.
    pub fn stats(&self) -> Result<GraphStoreStats> {
        let conn = self.reader.lock().map_err(poisoned)?;
        let entities: u64 = conn.query_row("SELECT COUNT(*) FROM entities", [], |row| row.get::<_, i64>(0))? as u64;
        let relationships: u64 = conn.query_row("SELECT COUNT(*) FROM edges", [], |row| row.get::<_, i64>(0))? as u64;
        Ok(GraphStoreStats { entities, relationships })
    }

    /// Full export for the dashboard snapshot.
    pub fn export(&self) -> Result<(Vec<Entity>, Vec<Relationship>)> {
        let conn = self.reader.lock().map_err(poisoned)?;
        let mut stmt = conn.prepare("SELECT * FROM entities ORDER BY created_at ASC")?;
        let entities = collect_rows(stmt.query_map([], row_to_entity)?)?;

        let mut stmt = conn.prepare("SELECT * FROM edges ORDER BY id ASC")?;
        let relationships = collect_rows(stmt.query_map([], row_to_relationship)?)?;
        Ok((entities, relationships))
    }

    fn edges_touching(&self, id: Uuid) -> Result<Vec<Relationship>> {
        let conn = self.reader.lock().map_err(poisoned)?;
        let mut stmt = conn.prepare("SELECT * FROM edges WHERE from_id = ?1 OR to_id = ?1")?;
        let rows = stmt.query_map(params![id.to_string()], row_to_relationship)?;
        collect_rows(rows)
    }
}

// ============================================================================
// QUERY SAFETY
// ============================================================================

/// Reject queries containing destructive keywords (case-insensitive), and
/// anything that is not a plain read.
pub fn ensure_read_only(query: &str) -> Result<()> {
    let upper = query.to_uppercase();
    for keyword in ["DELETE", "DROP", "REMOVE"] {
        if upper.contains(keyword) {
            return Err(EngineError::InvalidInput(format!(
                "destructive keyword {} is not allowed in graph queries",
                keyword
            )));
        }
    }
    let trimmed = upper.trim_start();
    if !trimmed.starts_with("SELECT") && !trimmed.starts_with("WITH") {
        return Err(EngineError::InvalidInput(
            "graph queries must be read-only SELECT statements".to_string(),
        ));
    }
    Ok(())
}

// ============================================================================
// ROW MAPPING
// ============================================================================

fn bad(msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        Box::<dyn std::error::Error + Send + Sync>::from(msg),
    )
}

fn row_to_entity(row: &Row<'_>) -> rusqlite::Result<Entity> {
    let id: String = row.get("id")?;
    let entity_type: String = row.get("entity_type")?;
    let properties: String = row.get("properties")?;
    let tags: String = row.get("tags")?;

    let mut entity = Entity::new(
        row.get::<_, String>("name")?,
        EntityType::parse(&entity_type).ok_or_else(|| bad(format!("bad entity_type: {entity_type}")))?,
    );
    entity.id = Uuid::parse_str(&id).map_err(|e| bad(format!("bad uuid: {e}")))?;
    entity.description = row.get("description")?;
    entity.created_at = row.get::<_, DateTime<Utc>>("created_at")?;
    entity.properties =
        serde_json::from_str::<MetaMap>(&properties).map_err(|e| bad(format!("bad properties: {e}")))?;
    entity.tags = serde_json::from_str(&tags).map_err(|e| bad(format!("bad tags: {e}")))?;
    Ok(entity)
}

fn row_to_relationship(row: &Row<'_>) -> rusqlite::Result<Relationship> {
    let from_id: String = row.get("from_id")?;
    let to_id: String = row.get("to_id")?;
    let rel_type: String = row.get("rel_type")?;
    let properties: String = row.get("properties")?;

    let mut relationship = Relationship::new(
        Uuid::parse_str(&from_id).map_err(|e| bad(format!("bad uuid: {e}")))?,
        Uuid::parse_str(&to_id).map_err(|e| bad(format!("bad uuid: {e}")))?,
        RelationshipType::parse(&rel_type).ok_or_else(|| bad(format!("bad rel_type: {rel_type}")))?,
    );
    relationship.strength = row.get("strength")?;
    relationship.properties =
        serde_json::from_str::<MetaMap>(&properties).map_err(|e| bad(format!("bad properties: {e}")))?;
    Ok(relationship)
}

fn collect_rows<T>(rows: impl Iterator<Item = rusqlite::Result<T>>) -> Result<Vec<T>> {
    let mut out = vec![];
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

fn json_to_sql(value: &JsonValue) -> Result<rusqlite::types::Value> {
    use rusqlite::types::Value;
    match value {
        JsonValue::Null => Ok(Value::Null),
        JsonValue::Bool(b) => Ok(Value::Integer(i64::from(*b))),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Value::Integer(i))
            } else if let Some(f) = n.as_f64() {
                Ok(Value::Real(f))
            } else {
                Err(EngineError::InvalidInput(format!("unsupported number: {n}")))
            }
        }
        JsonValue::String(s) => Ok(Value::Text(s.clone())),
        other => Err(EngineError::InvalidInput(format!(
            "graph query params must be scalars, got {other}"
        ))),
    }
}

fn sql_to_json(value: rusqlite::types::Value) -> JsonValue {
    use rusqlite::types::Value;
    match value {
        Value::Null => JsonValue::Null,
        Value::Integer(i) => JsonValue::from(i),
        Value::Real(f) => JsonValue::from(f),
        Value::Text(s) => JsonValue::String(s),
        Value::Blob(b) => JsonValue::String(format!("<{} bytes>", b.len())),
    }
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> EngineError {
    EngineError::StoreUnavailable("graph store mutex poisoned".to_string())
}

// ============================================================================
// TESTS
// ============================================================================
