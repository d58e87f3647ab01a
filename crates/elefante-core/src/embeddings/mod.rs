//! Embedding Facade
//!
//! The core consumes embeddings as a capability: `embed(text) -> Vec<f32>`.
//! All the engine relies on is determinism for identical text and
//! cosine-comparability of the vectors.
//!
//! The built-in [`HashEmbedder`] is a deterministic feature-hash model that
//! works offline with no model download. A fastembed-backed embedder is
//! available behind the `onnx` feature.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use lru::LruCache;
use sha1::{Digest, Sha1};

use crate::error::{EngineError, Result};

#[cfg(feature = "onnx")]
#[cfg_attr(docsrs, doc(cfg(feature = "onnx")))]
pub mod onnx;

// ============================================================================
// CAPABILITY TRAIT
// ============================================================================

/// Embedding capability consumed by the engine.
pub trait Embedder: Send + Sync {
    /// Embed one text into a dense vector.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch of texts (ingestion path).
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    /// Vector dimension produced by this embedder.
    fn dimension(&self) -> usize;
}

// ============================================================================
// SIMILARITY
// ============================================================================

/// Cosine similarity clamped into [0, 1].
///
/// Returns 0 for zero-magnitude vectors or a dimension mismatch, so scoring
/// code never divides by zero or compares across spaces.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0_f32;
    let mut norm_a = 0.0_f32;
    let mut norm_b = 0.0_f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denominator = (norm_a * norm_b).sqrt();
    if denominator > 0.0 {
        (dot / denominator).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// L2-normalize a vector in place.
pub fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

// ============================================================================
// HASH EMBEDDER (deterministic, offline)
// ============================================================================

/// Deterministic feature-hash embedder.
///
/// Buckets lowercased word tokens (and their char trigrams, at lower weight)
/// into a fixed-dimension vector via SHA-1, then L2-normalizes. Identical
/// text always produces the identical vector; near-identical wording lands
/// close in cosine space.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn bucket(&self, token: &str) -> (usize, f32) {
        let digest = Sha1::digest(token.as_bytes());
        let index = u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]) as usize
            % self.dimensions;
        // Sign from another digest byte keeps buckets from all piling up
        // positive, which would inflate similarity between unrelated texts.
        let sign = if digest[4] & 1 == 0 { 1.0 } else { -1.0 };
        (index, sign)
    }
}

impl Embedder for HashEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(EngineError::InvalidInput("cannot embed empty text".to_string()));
        }

        let mut vector = vec![0.0_f32; self.dimensions];
        let lower = text.to_lowercase();

        for token in lower.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()) {
            let (index, sign) = self.bucket(token);
            vector[index] += sign;

            let chars: Vec<char> = token.chars().collect();
            if chars.len() > 3 {
                for window in chars.windows(3) {
                    let trigram: String = window.iter().collect();
                    let (index, sign) = self.bucket(&trigram);
                    vector[index] += sign * 0.25;
                }
            }
        }

        normalize(&mut vector);
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimensions
    }
}

// ============================================================================
// CACHING WRAPPER
// ============================================================================

/// Thread-safe LRU cache in front of any [`Embedder`], keyed by a hash of
/// the normalized text.
pub struct CachingEmbedder {
    inner: Arc<dyn Embedder>,
    cache: Mutex<LruCache<String, Vec<f32>>>,
}

impl CachingEmbedder {
    pub fn new(inner: Arc<dyn Embedder>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity >= 1");
        Self {
            inner,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn cache_key(text: &str) -> String {
        let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
        let digest = Sha1::digest(normalized.to_lowercase().as_bytes());
        digest.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

impl Embedder for CachingEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let key = Self::cache_key(text);
        if let Ok(mut cache) = self.cache.lock() {
            if let Some(hit) = cache.get(&key) {
                return Ok(hit.clone());
            }
        }

        let vector = self.inner.embed(text)?;
        if let Ok(mut cache) = self.cache.lock() {
            cache.put(key, vector.clone());
        }
        Ok(vector)
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }
}

// ============================================================================
// TESTS
// ============================================================================
