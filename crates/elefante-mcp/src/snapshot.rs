//! Dashboard Snapshot
//!
//! Builds the JSON document consumed by the external dashboard UI:
//! memory and entity nodes, graph edges, signal hubs (`signal:topic:…`,
//! `signal:ring:…`) that keep the graph navigable, and cohesion edges
//! between memories sharing a signal. The snapshot is validated before it
//! is written: unique node ids, no dangling edge endpoints, no destructive
//! text in labels.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use elefante_core::{
    EngineError, EntityType, Memory, MemoryOrchestrator, RelationshipType, Result, SearchFilters,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map as JsonMap, Value};

/// Page size for the memory scan
const PAGE_SIZE: usize = 500;

// ============================================================================
// DOCUMENT TYPES
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotNode {
    pub id: String,
    pub label: String,
    pub node_type: String,
    #[serde(default)]
    pub properties: JsonMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotEdge {
    pub from: String,
    pub to: String,
    pub label: String,
    /// semantic | cluster | cluster_backbone | signal | cohesion | supersession
    #[serde(skip_serializing_if = "Option::is_none", rename = "type")]
    pub edge_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub generated_at: DateTime<Utc>,
    pub stats: JsonMap<String, Value>,
    pub nodes: Vec<SnapshotNode>,
    pub edges: Vec<SnapshotEdge>,
}

// ============================================================================
// BUILD
// ============================================================================

/// Build a snapshot of both stores.
pub fn build(orchestrator: &Arc<MemoryOrchestrator>) -> Result<Snapshot> {
    let filters = SearchFilters {
        include_archived: true,
        ..Default::default()
    };
    let mut memories: Vec<Memory> = vec![];
    let mut offset = 0;
    loop {
        let page = orchestrator.vector().get_all(PAGE_SIZE, offset, &filters)?;
        let page_len = page.len();
        memories.extend(page);
        if page_len < PAGE_SIZE {
            break;
        }
        offset += page_len;
    }

    let (entities, relationships) = orchestrator.graph().export()?;

    let mut nodes: Vec<SnapshotNode> = vec![];
    let mut node_ids: HashSet<String> = HashSet::new();

    for memory in &memories {
        let mut properties = JsonMap::new();
        properties.insert("title".into(), json!(memory.title()));
        properties.insert("summary".into(), json!(memory.summary));
        properties.insert("ring".into(), json!(memory.ring));
        properties.insert("knowledge_type".into(), json!(memory.knowledge_type));
        properties.insert("topic".into(), json!(memory.topic));
        properties.insert("canonical_key".into(), json!(memory.canonical_key));
        properties.insert("namespace".into(), json!(memory.namespace));
        properties.insert("importance".into(), json!(memory.importance));
        properties.insert("status".into(), json!(memory.status));

        let id = memory.id.to_string();
        if node_ids.insert(id.clone()) {
            nodes.push(SnapshotNode {
                id,
                label: memory
                    .title()
                    .map(str::to_string)
                    .unwrap_or_else(|| preview(&memory.content, 60)),
                node_type: "memory".to_string(),
                properties,
            });
        }
    }

    for entity in &entities {
        if entity.entity_type == EntityType::Memory {
            continue;
        }
        let id = entity.id.to_string();
        if node_ids.insert(id.clone()) {
            let mut properties = JsonMap::new();
            properties.insert("description".into(), json!(entity.description));
            nodes.push(SnapshotNode {
                id,
                label: entity.name.clone(),
                node_type: entity.entity_type.as_str().to_string(),
                properties,
            });
        }
    }

    let mut edges: Vec<SnapshotEdge> = vec![];
    let mut edge_keys: HashSet<(String, String, String)> = HashSet::new();

    for relationship in &relationships {
        push_edge(
            &node_ids,
            &mut edge_keys,
            &mut edges,
            SnapshotEdge {
                from: relationship.from_entity_id.to_string(),
                to: relationship.to_entity_id.to_string(),
                label: relationship.relationship_type.as_str().to_string(),
                edge_type: edge_type_of(relationship.relationship_type),
            },
        );
    }

    // Supersession recorded only on the record (no graph edge yet)
    for memory in &memories {
        if let Some(superseded_by) = memory.superseded_by_id {
            push_edge(
                &node_ids,
                &mut edge_keys,
                &mut edges,
                SnapshotEdge {
                    from: memory.id.to_string(),
                    to: superseded_by.to_string(),
                    label: RelationshipType::Supersedes.as_str().to_string(),
                    edge_type: Some("supersession".to_string()),
                },
            );
        }
    }

    // Signal hubs keep the dashboard graph connected: one hub per topic and
    // ring, with memory -> hub signal edges and a cohesion chain per topic.
    let mut topic_groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut ring_groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for memory in &memories {
        if let Some(topic) = &memory.topic {
            topic_groups.entry(topic.clone()).or_default().push(memory.id.to_string());
        }
        if let Some(ring) = memory.ring {
            ring_groups
                .entry(ring.as_str().to_string())
                .or_default()
                .push(memory.id.to_string());
        }
    }
    for (kind, groups) in [("topic", &topic_groups), ("ring", &ring_groups)] {
        for (value, members) in groups {
            let hub_id = format!("signal:{kind}:{value}");
            if node_ids.insert(hub_id.clone()) {
                nodes.push(SnapshotNode {
                    id: hub_id.clone(),
                    label: format!("{kind}:{value}"),
                    node_type: "signal".to_string(),
                    properties: JsonMap::new(),
                });
            }
            for member in members {
                push_edge(
                    &node_ids,
                    &mut edge_keys,
                    &mut edges,
                    SnapshotEdge {
                        from: member.clone(),
                        to: hub_id.clone(),
                        label: "SIGNAL".to_string(),
                        edge_type: Some("signal".to_string()),
                    },
                );
            }
        }
    }
    for members in topic_groups.values() {
        for pair in members.windows(2) {
            push_edge(
                &node_ids,
                &mut edge_keys,
                &mut edges,
                SnapshotEdge {
                    from: pair[0].clone(),
                    to: pair[1].clone(),
                    label: "COHESION".to_string(),
                    edge_type: Some("cohesion".to_string()),
                },
            );
        }
    }

    let mut stats = JsonMap::new();
    stats.insert("memories".into(), json!(memories.len()));
    stats.insert("entities".into(), json!(entities.len()));
    stats.insert("relationships".into(), json!(relationships.len()));
    stats.insert("nodes".into(), json!(nodes.len()));
    stats.insert("edges".into(), json!(edges.len()));

    let snapshot = Snapshot {
        generated_at: Utc::now(),
        stats,
        nodes,
        edges,
    };
    validate(&snapshot)?;
    Ok(snapshot)
}

fn push_edge(
    node_ids: &HashSet<String>,
    edge_keys: &mut HashSet<(String, String, String)>,
    edges: &mut Vec<SnapshotEdge>,
    edge: SnapshotEdge,
) {
    if node_ids.contains(&edge.from) && node_ids.contains(&edge.to) {
        let key = (edge.from.clone(), edge.to.clone(), edge.label.clone());
        if edge_keys.insert(key) {
            edges.push(edge);
        }
    }
}

fn edge_type_of(relationship_type: RelationshipType) -> Option<String> {
    match relationship_type {
        RelationshipType::Supersedes => Some("supersession".to_string()),
        RelationshipType::SimilarTo => Some("semantic".to_string()),
        _ => None,
    }
}

// ============================================================================
// VALIDATION AND PERSISTENCE
// ============================================================================

/// Validate snapshot integrity before it reaches the dashboard.
pub fn validate(snapshot: &Snapshot) -> Result<()> {
    let mut ids: HashSet<&str> = HashSet::new();
    for node in &snapshot.nodes {
        if !ids.insert(node.id.as_str()) {
            return Err(EngineError::IntegrityViolation(format!(
                "duplicate snapshot node id: {}",
                node.id
            )));
        }
    }

    for edge in &snapshot.edges {
        for endpoint in [&edge.from, &edge.to] {
            if !ids.contains(endpoint.as_str()) {
                return Err(EngineError::IntegrityViolation(format!(
                    "snapshot edge references missing node: {endpoint}"
                )));
            }
        }
        let upper = edge.label.to_uppercase();
        for keyword in ["DELETE", "DROP", "REMOVE"] {
            if upper.contains(keyword) {
                return Err(EngineError::IntegrityViolation(format!(
                    "destructive text in snapshot edge label: {}",
                    edge.label
                )));
            }
        }
    }
    Ok(())
}

/// Build, validate, and write the snapshot to its well-known path.
pub fn refresh(orchestrator: &Arc<MemoryOrchestrator>, path: &Path) -> Result<Snapshot> {
    let snapshot = build(orchestrator)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_vec_pretty(&snapshot)?)?;
    Ok(snapshot)
}

fn preview(content: &str, max_chars: usize) -> String {
    content.chars().take(max_chars).collect()
}

// ============================================================================
// TESTS
// ============================================================================
