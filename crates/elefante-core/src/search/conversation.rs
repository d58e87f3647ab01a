//! Conversation Context Collector
//!
//! Scores recent session messages against the query so pronouns and
//! follow-ups resolve to what was just discussed. Candidates are weighted by
//! recency (one-hour half-life), keyword overlap, and message role.

use std::collections::HashSet;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};

use crate::memory::query::{CandidateSource, SearchCandidate};
use crate::memory::record::{Memory, MemorySource, MemoryType};

/// Maximum session messages considered per query
pub const MAX_WINDOW: usize = 50;

/// Recency half-life in seconds (one hour)
const HALF_LIFE_SECS: f64 = 3600.0;

/// Scoring weights: recency, keyword overlap, role
const W_RECENCY: f32 = 0.5;
const W_KEYWORD: f32 = 0.3;
const W_ROLE: f32 = 0.2;

static STOPWORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "from", "has", "have",
        "in", "is", "it", "its", "of", "on", "or", "that", "the", "to", "was", "were", "what",
        "which", "will", "with",
    ]
    .into_iter()
    .collect()
});

/// Score session memories against the query.
///
/// `memories` should already be filtered to the session's conversation
/// window (the orchestrator fetches up to [`MAX_WINDOW`] rows).
pub fn collect_candidates(
    memories: &[Memory],
    query: &str,
    now: DateTime<Utc>,
    limit: usize,
) -> Vec<SearchCandidate> {
    let query_tokens: Vec<String> = tokenize(query);
    if query_tokens.is_empty() {
        return vec![];
    }
    let keyword_tokens: Vec<&String> = query_tokens
        .iter()
        .filter(|t| !STOPWORDS.contains(t.as_str()))
        .collect();

    let mut candidates: Vec<SearchCandidate> = memories
        .iter()
        .take(MAX_WINDOW)
        .map(|memory| {
            let content_lower = memory.content.to_lowercase();

            let age_secs = (now - memory.created_at).num_seconds().max(0) as f64;
            let recency = 0.5_f64.powf(age_secs / HALF_LIFE_SECS) as f32;

            let overlap = keyword_tokens
                .iter()
                .filter(|t| content_lower.contains(t.as_str()))
                .count();
            let keyword = overlap as f32 / query_tokens.len() as f32;

            let role = role_weight(memory);
            let score = W_RECENCY * recency + W_KEYWORD * keyword + W_ROLE * role;

            let mut candidate = SearchCandidate::new(
                memory.id,
                memory.content.clone(),
                score,
                CandidateSource::Conversation,
            );
            candidate.embedding = memory.embedding.clone();
            candidate.memory = Some(memory.clone());
            candidate
        })
        .collect();

    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    candidates.truncate(limit);
    candidates
}

/// Role weight by provenance; plain conversation turns sit between user
/// input and system inference.
fn role_weight(memory: &Memory) -> f32 {
    match memory.source {
        MemorySource::UserInput => 1.0,
        MemorySource::AgentGenerated => 0.7,
        MemorySource::SystemInferred => 0.5,
        _ if memory.memory_type == MemoryType::Conversation => 0.8,
        _ => 0.6,
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================
