//! Hybrid Retrieval
//!
//! Pure merge/scoring machinery for the search pipeline: weighted merge of
//! the vector and graph collectors, per-source min-max normalization, and
//! the near-duplicate result merge. The orchestrator owns the fan-out and
//! wires the collectors together.

pub mod conversation;
pub mod dedup;

use std::collections::HashMap;

use uuid::Uuid;

use crate::memory::query::{CandidateSource, SearchCandidate, WeightPlan};

// ============================================================================
// STORED-PATH MERGE
// ============================================================================

/// Merge vector and graph hits by memory id under the planned weights.
///
/// `combined = w_vec * vector_score + w_graph * graph_score`; a missing
/// source contributes zero. The source becomes `hybrid` when both
/// contributed.
pub fn merge_stored(
    vector_hits: &[(Uuid, f32)],
    graph_hits: &[(Uuid, f32)],
    plan: WeightPlan,
) -> Vec<(Uuid, f32, CandidateSource)> {
    let mut merged: HashMap<Uuid, (Option<f32>, Option<f32>)> = HashMap::new();

    for (id, score) in vector_hits {
        merged.entry(*id).or_default().0 = Some(*score);
    }
    for (id, score) in graph_hits {
        merged.entry(*id).or_default().1 = Some(*score);
    }

    let mut results: Vec<(Uuid, f32, CandidateSource)> = merged
        .into_iter()
        .map(|(id, (vector_score, graph_score))| {
            let combined = plan.vector * vector_score.unwrap_or(0.0)
                + plan.graph * graph_score.unwrap_or(0.0);
            let source = match (vector_score.is_some(), graph_score.is_some()) {
                (true, true) => CandidateSource::Hybrid,
                (true, false) => CandidateSource::Vector,
                _ => CandidateSource::Graph,
            };
            (id, combined, source)
        })
        .collect();

    results.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    results
}

// ============================================================================
// NORMALIZATION
// ============================================================================

/// Min-max normalize candidate scores within each source group.
///
/// Applied before deduplication when both the conversation and stored paths
/// are active, so one source's scale cannot drown out the other. Degenerate
/// groups (single candidate, or all scores equal) keep their score clamped
/// into [0, 1] rather than collapsing every group onto 1.0.
pub fn normalize_by_source(candidates: &mut [SearchCandidate]) {
    let mut ranges: HashMap<CandidateSource, (f32, f32)> = HashMap::new();
    for candidate in candidates.iter() {
        let entry = ranges
            .entry(candidate.source)
            .or_insert((candidate.score, candidate.score));
        entry.0 = entry.0.min(candidate.score);
        entry.1 = entry.1.max(candidate.score);
    }

    for candidate in candidates.iter_mut() {
        let (min, max) = ranges[&candidate.source];
        candidate.score = if max - min > f32::EPSILON {
            (candidate.score - min) / (max - min)
        } else {
            candidate.score.clamp(0.0, 1.0)
        };
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u8) -> Uuid {
        Uuid::from_u128(u128::from(n))
    }

    #[test]
    fn test_merge_stored_weighted_sum() {
        let vector = vec![(id(1), 0.9), (id(2), 0.5)];
        let graph = vec![(id(1), 0.8), (id(3), 1.0)];
        let plan = WeightPlan { vector: 0.5, graph: 0.5 };

        let merged = merge_stored(&vector, &graph, plan);
        let by_id: HashMap<Uuid, (f32, CandidateSource)> =
            merged.iter().map(|(i, s, src)| (*i, (*s, *src))).collect();

        let (score, source) = by_id[&id(1)];
        assert!((score - 0.85).abs() < 0.0001);
        assert_eq!(source, CandidateSource::Hybrid);

        // Single-source hits still go through the weighted sum
        let (score, source) = by_id[&id(2)];
        assert!((score - 0.25).abs() < 0.0001);
        assert_eq!(source, CandidateSource::Vector);

        let (score, source) = by_id[&id(3)];
        assert!((score - 0.5).abs() < 0.0001);
        assert_eq!(source, CandidateSource::Graph);
    }

    #[test]
    fn test_merge_stored_sorted_descending() {
        let vector = vec![(id(1), 0.2), (id(2), 0.9)];
        let merged = merge_stored(&vector, &[], WeightPlan { vector: 1.0, graph: 0.0 });
        assert_eq!(merged[0].0, id(2));
        assert!(merged[0].1 >= merged[1].1);
    }

    #[test]
    fn test_merge_stored_zero_weight_side() {
        let vector = vec![(id(1), 0.9)];
        let graph = vec![(id(2), 1.0)];
        let merged = merge_stored(&vector, &graph, WeightPlan { vector: 1.0, graph: 0.0 });
        let by_id: HashMap<Uuid, f32> = merged.iter().map(|(i, s, _)| (*i, *s)).collect();
        assert!((by_id[&id(1)] - 0.9).abs() < 0.0001);
        assert_eq!(by_id[&id(2)], 0.0);
    }

    #[test]
    fn test_normalize_by_source() {
        let mut candidates = vec![
            SearchCandidate::new(id(1), "a", 0.2, CandidateSource::Vector),
            SearchCandidate::new(id(2), "b", 0.6, CandidateSource::Vector),
            SearchCandidate::new(id(3), "c", 10.0, CandidateSource::Conversation),
            SearchCandidate::new(id(4), "d", 20.0, CandidateSource::Conversation),
        ];
        normalize_by_source(&mut candidates);

        assert_eq!(candidates[0].score, 0.0);
        assert_eq!(candidates[1].score, 1.0);
        assert_eq!(candidates[2].score, 0.0);
        assert_eq!(candidates[3].score, 1.0);
    }

    #[test]
    fn test_normalize_degenerate_group_keeps_score() {
        let mut candidates = vec![SearchCandidate::new(id(1), "a", 0.37, CandidateSource::Vector)];
        normalize_by_source(&mut candidates);
        assert_eq!(candidates[0].score, 0.37);

        let mut candidates = vec![SearchCandidate::new(id(1), "a", 1.8, CandidateSource::Graph)];
        normalize_by_source(&mut candidates);
        assert_eq!(candidates[0].score, 1.0);
    }
}
