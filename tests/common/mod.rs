#![allow(
    dead_code,
    unused_imports,
    reason = "each integration test crate uses a different subset"
)]

// Shared fixtures for integration tests

#[path = "../../src/test_support/pdf.rs"]
mod pdf;

pub use pdf::write_pdf;

use doc_assistant::Result;
use doc_assistant::embeddings::Embedder;

/// Counts occurrences of a fixed vocabulary, one dimension per word, L2-normalised.
///
/// Words outside the vocabulary are ignored, so retrieval results are exact and
/// independent of any hashing.
pub struct KeywordEmbedder {
    vocabulary: Vec<&'static str>,
}

impl KeywordEmbedder {
    pub fn new(vocabulary: &[&'static str]) -> Self {
        Self {
            vocabulary: vocabulary.to_vec(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.vocabulary.len()
    }
}

impl Embedder for KeywordEmbedder {
    fn model_name(&self) -> &str {
        "keyword-test"
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0_f32; self.vocabulary.len()];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .map(str::to_lowercase)
        {
            if let Some(position) = self.vocabulary.iter().position(|v| *v == word) {
                vector[position] += 1.0;
            }
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

/// `len` characters made of `keyword` followed by filler words, ending on a full word boundary
pub fn page_text(keyword: &str, len: usize) -> String {
    let mut text = String::with_capacity(len + 16);
    while text.len() < len {
        text.push_str(keyword);
        text.push_str(" and more ");
    }
    text.truncate(len);
    text
}

/// Replace the characters at `offset` with `phrase`, keeping the total length
pub fn insert_phrase(text: &str, offset: usize, phrase: &str) -> String {
    let mut result: String = text.chars().take(offset).collect();
    result.push_str(phrase);
    result.extend(text.chars().skip(offset + phrase.chars().count()));
    result
}

pub fn init_test_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init()
        .ok();
}
