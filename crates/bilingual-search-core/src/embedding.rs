//! Embedding provider trait and vector utilities.
//!
//! Defines the [`EmbeddingProvider`] trait that all embedding backends
//! implement, the text builder that turns a [`Record`] into embedding
//! input, and pure helpers for vector serialization and similarity.
//!
//! Concrete providers (OpenAI-compatible, Ollama) live in the
//! `bilingual-search` app crate.

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::models::Record;

/// Default cap on embedding input text, in characters.
pub const MAX_EMBEDDING_CHARS: usize = 8000;

/// Availability report from [`EmbeddingProvider::health_check`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderHealth {
    pub available: bool,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Text-to-vector backend.
///
/// `embed` failures are ordinary errors: the semantic orchestrator turns
/// them into warnings and the queue processor into item failures.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;
    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
    async fn health_check(&self) -> ProviderHealth;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EmbedTextError {
    #[error("no embeddable text for {entity_type} {id}")]
    NoEmbeddableText { entity_type: String, id: String },
}

/// Concatenate the record's embedding fields, in the order its entity type
/// declares them, separated by single spaces and cut to `max_chars`.
pub fn embedding_text(record: &Record, max_chars: usize) -> Result<String, EmbedTextError> {
    let parts: Vec<&str> = record
        .entity_type
        .embedding_fields()
        .iter()
        .filter_map(|name| record.field(name))
        .map(str::trim)
        .collect();

    if parts.is_empty() {
        return Err(EmbedTextError::NoEmbeddableText {
            entity_type: record.entity_type.to_string(),
            id: record.id.clone(),
        });
    }

    Ok(parts.join(" ").chars().take(max_chars).collect())
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB produced by [`vec_to_blob`]. Trailing partial chunks are ignored.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`.
///
/// Returns `0.0` for empty vectors, zero vectors, or vectors of different
/// lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let (dot, norm_a, norm_b) = a
        .iter()
        .zip(b)
        .fold((0.0f32, 0.0f32, 0.0f32), |(d, na, nb), (x, y)| {
            (d + x * y, na + x * x, nb + y * y)
        });

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }
    dot / denom
}
