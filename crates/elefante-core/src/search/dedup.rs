//! Result Deduplication
//!
//! Collapses near-duplicate search candidates using cosine similarity on
//! their embeddings. Union-find clusters pairwise matches; each cluster
//! merges into a single candidate that keeps the maximum score and records
//! which sources contributed.

use crate::embeddings::{cosine_similarity, Embedder};
use crate::error::Result;
use crate::memory::query::{CandidateSource, SearchCandidate};

/// Default similarity threshold for merging results
pub const MERGE_THRESHOLD: f32 = 0.95;

// ============================================================================
// UNION-FIND
// ============================================================================

struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    fn find(&mut self, x: usize) -> usize {
        if self.parent[x] != x {
            self.parent[x] = self.find(self.parent[x]);
        }
        self.parent[x]
    }

    fn union(&mut self, x: usize, y: usize) {
        let rx = self.find(x);
        let ry = self.find(y);
        if rx == ry {
            return;
        }
        if self.rank[rx] < self.rank[ry] {
            self.parent[rx] = ry;
        } else if self.rank[rx] > self.rank[ry] {
            self.parent[ry] = rx;
        } else {
            self.parent[ry] = rx;
            self.rank[rx] += 1;
        }
    }
}

// ============================================================================
// MERGE
// ============================================================================

/// A candidate after duplicate merging
#[derive(Debug, Clone)]
pub struct MergedCandidate {
    pub candidate: SearchCandidate,
    /// Distinct contributing sources
    pub sources: Vec<CandidateSource>,
    /// Size of the duplicate group this row represents
    pub merged_from: usize,
}

/// Merge candidates whose embeddings are within `threshold` cosine
/// similarity of each other.
///
/// Candidates missing an embedding are embedded on demand from their text.
/// Each duplicate group keeps the best-scored member; differing sources
/// promote the merged row to `hybrid`.
pub fn merge_duplicates(
    embedder: &dyn Embedder,
    candidates: Vec<SearchCandidate>,
    threshold: f32,
) -> Result<Vec<MergedCandidate>> {
    let mut candidates = candidates;
    for candidate in &mut candidates {
        if candidate.embedding.is_none() {
            candidate.embedding = Some(embedder.embed(&candidate.content)?);
        }
    }

    let n = candidates.len();
    let mut uf = UnionFind::new(n);
    for i in 0..n {
        for j in (i + 1)..n {
            let (Some(a), Some(b)) = (&candidates[i].embedding, &candidates[j].embedding) else {
                continue;
            };
            if cosine_similarity(a, b) >= threshold {
                uf.union(i, j);
            }
        }
    }

    let mut groups: std::collections::HashMap<usize, Vec<usize>> = std::collections::HashMap::new();
    for i in 0..n {
        let root = uf.find(i);
        groups.entry(root).or_default().push(i);
    }

    let mut merged: Vec<MergedCandidate> = groups
        .into_values()
        .map(|members| {
            let best = members
                .iter()
                .copied()
                .max_by(|a, b| {
                    candidates[*a]
                        .score
                        .partial_cmp(&candidates[*b].score)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .expect("groups are non-empty");

            let mut sources: Vec<CandidateSource> = vec![];
            for member in &members {
                if !sources.contains(&candidates[*member].source) {
                    sources.push(candidates[*member].source);
                }
            }

            let mut candidate = candidates[best].clone();
            if sources.len() > 1 {
                candidate.source = CandidateSource::Hybrid;
            }

            MergedCandidate {
                candidate,
                sources,
                merged_from: members.len(),
            }
        })
        .collect();

    merged.sort_by(|a, b| {
        b.candidate
            .score
            .partial_cmp(&a.candidate.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    Ok(merged)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashEmbedder;
    use uuid::Uuid;

    fn candidate(content: &str, score: f32, source: CandidateSource) -> SearchCandidate {
        SearchCandidate::new(Uuid::new_v4(), content, score, source)
    }

    fn candidate_with_embedding(
        content: &str,
        score: f32,
        source: CandidateSource,
        embedding: Vec<f32>,
    ) -> SearchCandidate {
        let mut c = candidate(content, score, source);
        c.embedding = Some(embedding);
        c
    }

    #[test]
    fn test_union_find_links_transitively() {
        let mut uf = UnionFind::new(5);
        uf.union(0, 1);
        uf.union(2, 3);
        uf.union(1, 3);
        assert_eq!(uf.find(0), uf.find(3));
        assert_ne!(uf.find(0), uf.find(4));
    }

    #[test]
    fn test_merge_keeps_max_score_and_union_of_sources() {
        let embedder = HashEmbedder::new(32);
        let shared = vec![1.0, 0.0, 0.0];
        let candidates = vec![
            candidate_with_embedding("a", 0.6, CandidateSource::Vector, shared.clone()),
            candidate_with_embedding("b", 0.9, CandidateSource::Conversation, shared.clone()),
            candidate_with_embedding("c", 0.3, CandidateSource::Vector, vec![0.0, 1.0, 0.0]),
        ];

        let merged = merge_duplicates(&embedder, candidates, 0.95).unwrap();
        assert_eq!(merged.len(), 2);

        let top = &merged[0];
        assert_eq!(top.candidate.score, 0.9);
        assert_eq!(top.candidate.source, CandidateSource::Hybrid);
        assert_eq!(top.merged_from, 2);
        assert!(top.sources.contains(&CandidateSource::Vector));
        assert!(top.sources.contains(&CandidateSource::Conversation));

        let single = &merged[1];
        assert_eq!(single.merged_from, 1);
        assert_eq!(single.candidate.source, CandidateSource::Vector);
    }

    #[test]
    fn test_merge_same_source_stays_unhybridized() {
        let embedder = HashEmbedder::new(32);
        let shared = vec![0.0, 1.0, 0.0];
        let candidates = vec![
            candidate_with_embedding("a", 0.4, CandidateSource::Vector, shared.clone()),
            candidate_with_embedding("b", 0.8, CandidateSource::Vector, shared.clone()),
        ];

        let merged = merge_duplicates(&embedder, candidates, 0.95).unwrap();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].candidate.source, CandidateSource::Vector);
        assert_eq!(merged[0].sources, vec![CandidateSource::Vector]);
    }

    #[test]
    fn test_merge_embeds_missing_embeddings() {
        let embedder = HashEmbedder::new(64);
        let candidates = vec![
            candidate("the exact same sentence", 0.5, CandidateSource::Vector),
            candidate("the exact same sentence", 0.7, CandidateSource::Graph),
        ];

        let merged = merge_duplicates(&embedder, candidates, 0.95).unwrap();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].candidate.score, 0.7);
        assert_eq!(merged[0].merged_from, 2);
    }

    #[test]
    fn test_distinct_candidates_survive() {
        let embedder = HashEmbedder::new(32);
        let candidates = vec![
            candidate_with_embedding("a", 0.5, CandidateSource::Vector, vec![1.0, 0.0, 0.0]),
            candidate_with_embedding("b", 0.6, CandidateSource::Vector, vec![0.0, 1.0, 0.0]),
            candidate_with_embedding("c", 0.7, CandidateSource::Vector, vec![0.0, 0.0, 1.0]),
        ];
        let merged = merge_duplicates(&embedder, candidates, 0.95).unwrap();
        assert_eq!(merged.len(), 3);
        // Sorted by score descending
        assert!(merged[0].candidate.score >= merged[1].candidate.score);
        assert!(merged[1].candidate.score >= merged[2].candidate.score);
    }

    #[test]
    fn test_empty_input() {
        let embedder = HashEmbedder::new(32);
        let merged = merge_duplicates(&embedder, vec![], 0.95).unwrap();
        assert!(merged.is_empty());
    }
}
