//! Deterministic Memory Refinery
//!
//! Batch cleanup with no model calls: canonicalize every memory's
//! `(namespace, canonical_key)` identity, collapse duplicate groups down to
//! one active winner, and repair lifecycle drift (redundant implies archived
//! and deprecated). Produces a field-level plan; apply mode writes the plan
//! back in a single pass.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::classify::{classify_namespace, infer_canonical_key};
use crate::embeddings::Embedder;
use crate::error::Result;
use crate::memory::entity::RelationshipType;
use crate::memory::query::SearchFilters;
use crate::memory::record::{Memory, MemoryPatch, MemoryStatus, MetaValue, Namespace};
use crate::vector::VectorStore;

/// Page size for the full-store scan
const PAGE_SIZE: usize = 500;

/// How many duplicate groups the stats sample includes
const SAMPLE_GROUPS: usize = 10;

// ============================================================================
// PLAN TYPES
// ============================================================================

/// One planned field-level update
#[derive(Debug, Clone)]
pub struct RefineryUpdate {
    pub memory_id: Uuid,
    pub patch: MemoryPatch,
}

/// Sample row describing one duplicate group
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateGroupSample {
    pub namespace: String,
    pub canonical_key: String,
    pub count: usize,
    pub winner_id: Uuid,
    pub member_ids: Vec<Uuid>,
}

/// Plan statistics
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefineryStats {
    pub total_memories: usize,
    pub groups: usize,
    pub duplicate_groups: usize,
    pub redundant_marked: usize,
    pub canonical_key_set: usize,
    pub namespace_set: usize,
    pub planned_updates: usize,
    pub duplicate_groups_sample: Vec<DuplicateGroupSample>,
    pub generated_at: chrono::DateTime<Utc>,
}

/// A complete refinery plan
#[derive(Debug, Clone)]
pub struct RefineryPlan {
    pub updates: Vec<RefineryUpdate>,
    pub stats: RefineryStats,
}

/// Outcome of a refinery run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefineryReport {
    pub applied: bool,
    pub changed: usize,
    pub stats: RefineryStats,
}

// ============================================================================
// PLAN BUILDING
// ============================================================================

/// Build the cleanup plan for a set of memories.
///
/// Only genuine diffs enter the plan, so running the refinery twice plans
/// zero additional changes the second time.
pub fn build_plan(memories: &[Memory]) -> RefineryPlan {
    let mut groups: BTreeMap<(Namespace, String), Vec<&Memory>> = BTreeMap::new();
    for memory in memories {
        let namespace = classify_namespace(memory);
        let canonical_key = infer_canonical_key(memory);
        groups.entry((namespace, canonical_key)).or_default().push(memory);
    }

    let mut updates: Vec<RefineryUpdate> = vec![];
    let mut redundant_marked = 0;
    let mut canonical_key_set = 0;
    let mut namespace_set = 0;
    let mut samples: Vec<DuplicateGroupSample> = vec![];

    for ((namespace, canonical_key), group) in &groups {
        let winner = select_winner(group);

        if group.len() > 1 {
            samples.push(DuplicateGroupSample {
                namespace: namespace.as_str().to_string(),
                canonical_key: canonical_key.clone(),
                count: group.len(),
                winner_id: winner.id,
                member_ids: group.iter().map(|m| m.id).collect(),
            });
        }

        for memory in group {
            let mut patch = MemoryPatch::default();

            // Persist the inferred canonicalization, both flattened and in
            // custom metadata for round-trips.
            let mut custom = memory.custom_metadata.clone();
            let mut custom_changed = false;
            if memory.custom_str("namespace") != Some(namespace.as_str()) {
                custom.insert("namespace".into(), MetaValue::from(namespace.as_str()));
                custom_changed = true;
            }
            if memory.custom_str("canonical_key") != Some(canonical_key.as_str()) {
                custom.insert("canonical_key".into(), MetaValue::from(canonical_key.clone()));
                custom_changed = true;
            }
            if custom_changed {
                patch.custom_metadata = Some(custom);
            }
            if memory.namespace != *namespace {
                patch.namespace = Some(*namespace);
                namespace_set += 1;
            }
            if memory.canonical_key.as_deref() != Some(canonical_key.as_str()) {
                patch.canonical_key = Some(canonical_key.clone());
                canonical_key_set += 1;
            }

            // Lifecycle consistency: once redundant, always archived and
            // deprecated, even for sole members of their group.
            if memory.status == MemoryStatus::Redundant {
                if !memory.deprecated {
                    patch.deprecated = Some(true);
                }
                if !memory.archived {
                    patch.archived = Some(true);
                }
            }

            if memory.id != winner.id {
                if memory.status != MemoryStatus::Redundant {
                    patch.status = Some(MemoryStatus::Redundant);
                    redundant_marked += 1;
                }
                if !memory.deprecated {
                    patch.deprecated = Some(true);
                }
                if !memory.archived {
                    patch.archived = Some(true);
                }
                if memory.superseded_by_id != Some(winner.id) {
                    patch.superseded_by_id = Some(winner.id);
                }
                if memory.relationship_type != Some(RelationshipType::Supersedes) {
                    patch.relationship_type = Some(RelationshipType::Supersedes);
                }
            }

            if !patch.is_empty() {
                updates.push(RefineryUpdate {
                    memory_id: memory.id,
                    patch,
                });
            }
        }
    }

    samples.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.namespace.cmp(&b.namespace))
            .then_with(|| a.canonical_key.cmp(&b.canonical_key))
    });
    let duplicate_groups = samples.len();
    samples.truncate(SAMPLE_GROUPS);

    let stats = RefineryStats {
        total_memories: memories.len(),
        groups: groups.len(),
        duplicate_groups,
        redundant_marked,
        canonical_key_set,
        namespace_set,
        planned_updates: updates.len(),
        duplicate_groups_sample: samples,
        generated_at: Utc::now(),
    };

    RefineryPlan { updates, stats }
}

/// Pick the canonical winner of a duplicate group.
///
/// Strict descending ordering: active first, then processing-status rank,
/// importance, access count, creation time, and finally the
/// lexicographically greater id as a deterministic tiebreak.
pub fn select_winner<'a>(group: &[&'a Memory]) -> &'a Memory {
    group
        .iter()
        .copied()
        .max_by_key(|m| {
            (
                m.is_active(),
                m.processing_status.rank(),
                m.importance,
                m.access_count,
                m.created_at,
                m.id.to_string(),
            )
        })
        .expect("groups are non-empty")
}

// ============================================================================
// RUNNER
// ============================================================================

/// Batch refinery over the vector store.
pub struct Refinery {
    vector: Arc<VectorStore>,
}

impl Refinery {
    pub fn new(vector: Arc<VectorStore>) -> Self {
        Self { vector }
    }

    /// Build a plan over every stored memory and optionally apply it.
    /// Apply runs inside the caller's write-lock window.
    pub fn run(&self, embedder: &dyn Embedder, apply: bool) -> Result<RefineryReport> {
        let filters = SearchFilters {
            include_archived: true,
            ..Default::default()
        };

        let mut memories: Vec<Memory> = vec![];
        let mut offset = 0;
        loop {
            let page = self.vector.get_all(PAGE_SIZE, offset, &filters)?;
            let page_len = page.len();
            memories.extend(page);
            if page_len < PAGE_SIZE {
                break;
            }
            offset += page_len;
        }

        let plan = build_plan(&memories);

        if !apply {
            info!(
                planned_updates = plan.stats.planned_updates,
                duplicate_groups = plan.stats.duplicate_groups,
                "refinery plan built (dry run)"
            );
            return Ok(RefineryReport {
                applied: false,
                changed: 0,
                stats: plan.stats,
            });
        }

        let mut changed = 0;
        for update in &plan.updates {
            if self.vector.get(update.memory_id)?.is_none() {
                continue;
            }
            self.vector.update(embedder, update.memory_id, &update.patch)?;
            changed += 1;
        }

        info!(changed, planned_updates = plan.stats.planned_updates, "refinery applied");
        Ok(RefineryReport {
            applied: true,
            changed,
            stats: plan.stats,
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================
