//! Mock Embedder
//!
//! A deterministic embedder with a small concept table: sentences sharing a
//! concept land on the same dominant dimensions, so paraphrases score high
//! cosine similarity the way a real model would, while unrelated texts stay
//! near-orthogonal through a low-weight hash residue.

use elefante_core::{Embedder, EngineError, Result};

/// Embedding dimension used across the e2e suite
pub const DIM: usize = 96;

/// Residue weight for non-concept tokens
const RESIDUE_WEIGHT: f32 = 0.05;

/// Concept table: each row claims one dimension; any phrase hit adds full
/// weight on that dimension.
const CONCEPTS: &[&[&str]] = &[
    &["electric blue"],
    &["favorite color", "favourite color"],
    &["black formatter", "formatter", "formatting"],
    &["line-length", "line length"],
    &["prefer", "preference"],
    &["emoji", "emojis"],
    &["kubernetes", "k8s", "cluster"],
    &["deploy", "deployment", "release"],
    &["session", "conversation"],
    &["entity", "graph"],
    &["test memory", "guard"],
];

/// Concept-table embedder for tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConceptEmbedder;

impl ConceptEmbedder {
    pub fn new() -> Self {
        Self
    }
}

impl Embedder for ConceptEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(EngineError::InvalidInput("cannot embed empty text".to_string()));
        }

        let lower = text.to_lowercase();
        let mut vector = vec![0.0_f32; DIM];

        for (index, synonyms) in CONCEPTS.iter().enumerate() {
            if synonyms.iter().any(|phrase| lower.contains(phrase)) {
                vector[index] += 1.0;
            }
        }

        // Low-weight residue keeps distinct texts distinguishable
        for token in lower.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()) {
            let mut hash: u32 = 2166136261;
            for byte in token.bytes() {
                hash ^= u32::from(byte);
                hash = hash.wrapping_mul(16777619);
            }
            let slot = CONCEPTS.len() + (hash as usize % (DIM - CONCEPTS.len()));
            vector[slot] += RESIDUE_WEIGHT;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        DIM
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use elefante_core::cosine_similarity;

    #[test]
    fn test_paraphrases_score_high() {
        let embedder = ConceptEmbedder::new();
        let a = embedder
            .embed("My favorite color is definitely Electric Blue.")
            .unwrap();
        let b = embedder
            .embed("I really love Electric Blue, it is my favorite color.")
            .unwrap();
        assert!(cosine_similarity(&a, &b) >= 0.95);
    }

    #[test]
    fn test_unrelated_texts_score_low() {
        let embedder = ConceptEmbedder::new();
        let a = embedder.embed("My favorite color is Electric Blue").unwrap();
        let b = embedder.embed("quarterly tax filing is due in April").unwrap();
        assert!(cosine_similarity(&a, &b) < 0.5);
    }

    #[test]
    fn test_deterministic() {
        let embedder = ConceptEmbedder::new();
        let a = embedder.embed("same text").unwrap();
        let b = embedder.embed("same text").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), DIM);
    }
}
