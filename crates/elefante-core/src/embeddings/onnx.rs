//! fastembed-backed Embedder
//!
//! Local ONNX inference (nomic-embed-text-v1.5, 768 dimensions). The model
//! is process-global: fastembed holds mutable inference state, so it lives
//! behind a `OnceLock<Mutex<..>>`.

use std::sync::{Mutex, MutexGuard, OnceLock};

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

use crate::embeddings::{normalize, Embedder};
use crate::error::{EngineError, Result};

/// Dimensions produced by nomic-embed-text-v1.5
pub const ONNX_EMBEDDING_DIMENSIONS: usize = 768;

/// Maximum text length passed to the model (longer inputs are truncated)
const MAX_TEXT_LENGTH: usize = 8192;

static MODEL: OnceLock<std::result::Result<Mutex<TextEmbedding>, String>> = OnceLock::new();

fn get_model() -> Result<MutexGuard<'static, TextEmbedding>> {
    let result = MODEL.get_or_init(|| {
        let options = InitOptions::new(EmbeddingModel::NomicEmbedTextV15)
            .with_show_download_progress(false);
        TextEmbedding::try_new(options)
            .map(Mutex::new)
            .map_err(|e| format!("Failed to initialize embedding model: {}", e))
    });

    match result {
        Ok(model) => model
            .lock()
            .map_err(|e| EngineError::StoreUnavailable(format!("embedding model lock poisoned: {}", e))),
        Err(err) => Err(EngineError::StoreUnavailable(err.clone())),
    }
}

fn clip(text: &str) -> &str {
    if text.len() > MAX_TEXT_LENGTH {
        let mut end = MAX_TEXT_LENGTH;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        &text[..end]
    } else {
        text
    }
}

/// Embedder backed by a local ONNX model.
#[derive(Debug, Default, Clone, Copy)]
pub struct OnnxEmbedder;

impl OnnxEmbedder {
    pub fn new() -> Self {
        Self
    }
}

impl Embedder for OnnxEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(EngineError::InvalidInput("cannot embed empty text".to_string()));
        }

        let mut model = get_model()?;
        let mut embeddings = model
            .embed(vec![clip(text)], None)
            .map_err(|e| EngineError::StoreUnavailable(format!("embedding failed: {}", e)))?;

        let mut vector = embeddings
            .pop()
            .ok_or_else(|| EngineError::StoreUnavailable("no embedding generated".to_string()))?;
        normalize(&mut vector);
        Ok(vector)
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let mut model = get_model()?;
        let clipped: Vec<&str> = texts.iter().map(|t| clip(t)).collect();
        let embeddings = model
            .embed(clipped, None)
            .map_err(|e| EngineError::StoreUnavailable(format!("embedding failed: {}", e)))?;

        Ok(embeddings
            .into_iter()
            .map(|mut v| {
                normalize(&mut v);
                v
            })
            .collect())
    }

    fn dimension(&self) -> usize {
        ONNX_EMBEDDING_DIMENSIONS
    }
}
