// Embeddings module
// Text to vector mapping (Ollama) and sliding window chunking

pub mod chunking;
pub mod ollama;

pub use chunking::{Chunk, ChunkingConfig, chunk_document, chunk_text};
pub use ollama::{DEFAULT_EMBEDDING_DIMENSION, EmbeddingResult, OllamaClient};

use crate::Result;

/// Maps text to fixed-length vectors.
///
/// Every vector produced by one implementation has the same dimension, and
/// vectors are only comparable with vectors from the same model.
pub trait Embedder: Send + Sync {
    /// Identifier of the underlying model
    fn model_name(&self) -> &str;

    /// Embed a single text
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed several texts, returning vectors in input order
    #[inline]
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|text| self.embed(text)).collect()
    }
}
