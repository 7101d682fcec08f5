// Deterministic embedders and fixture builders for unit tests

mod pdf;

pub use pdf::write_pdf;

use std::sync::Mutex;

use crate::embeddings::Embedder;
use crate::{AssistantError, Result};

/// Bag-of-words embedder: every lowercase word is hashed into one of `dimension` buckets
pub struct HashEmbedder {
    pub dimension: usize,
}

impl HashEmbedder {
    pub const fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

fn fnv1a(word: &str) -> u64 {
    word.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
    })
}

impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash-test"
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0_f32; self.dimension];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|word| !word.is_empty())
        {
            let bucket = (fnv1a(&word.to_lowercase()) % self.dimension as u64) as usize;
            vector[bucket] += 1.0;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        Ok(vector)
    }
}

/// Always fails, as an unreachable embedding backend would
pub struct FailingEmbedder;

impl Embedder for FailingEmbedder {
    fn model_name(&self) -> &str {
        "unreachable"
    }

    fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(AssistantError::EmbeddingModel(
            "connection refused".to_string(),
        ))
    }
}

/// Returns constant vectors of a fixed length
pub struct ConstantEmbedder {
    pub vector: Vec<f32>,
}

impl Embedder for ConstantEmbedder {
    fn model_name(&self) -> &str {
        "constant-test"
    }

    fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(self.vector.clone())
    }
}

/// Hash embedder that remembers the size of every `embed_batch` call
pub struct BatchRecorder {
    inner: HashEmbedder,
    batches: Mutex<Vec<usize>>,
}

impl BatchRecorder {
    pub const fn new(dimension: usize) -> Self {
        Self {
            inner: HashEmbedder::new(dimension),
            batches: Mutex::new(Vec::new()),
        }
    }

    pub fn batches(&self) -> Vec<usize> {
        self.batches.lock().expect("lock is not poisoned").clone()
    }
}

impl Embedder for BatchRecorder {
    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.inner.embed(text)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.batches
            .lock()
            .expect("lock is not poisoned")
            .push(texts.len());
        texts.iter().map(|text| self.inner.embed(text)).collect()
    }
}
