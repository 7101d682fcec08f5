// Ingestion pipeline
// PDF -> chunks -> embeddings -> persisted vector index


use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::document::{Document, load_pdf};
use crate::embeddings::{Chunk, ChunkingConfig, Embedder, chunk_document};
use crate::index::{IndexEntry, IndexManifest, save_snapshot};
use crate::{AssistantError, Result};

/// Summary of a completed ingestion run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionReport {
    pub pages: usize,
    pub chunks: usize,
    pub dimension: usize,
    pub index_path: PathBuf,
    pub elapsed: Duration,
}

pub struct IngestionPipeline {
    embedder: Arc<dyn Embedder>,
    chunking: ChunkingConfig,
    batch_size: usize,
    dimension: usize,
    index_path: PathBuf,
}

impl IngestionPipeline {
    #[inline]
    pub fn new(config: &Config, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            chunking: config.chunking.clone(),
            batch_size: (config.ollama.batch_size as usize).max(1),
            dimension: config.ollama.embedding_dimension as usize,
            index_path: config.index_path(),
        }
    }

    #[inline]
    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    /// Load the PDF at `document_path` and index it
    #[inline]
    pub async fn run(&self, document_path: &Path) -> Result<IngestionReport> {
        info!("Loading document from {:?}", document_path);
        let document = load_pdf(document_path)?;
        self.ingest_document(&document).await
    }

    /// Chunk, embed and persist an already loaded document.
    ///
    /// The previous index at the configured path is only replaced once every
    /// chunk has been embedded and the new snapshot is complete.
    #[inline]
    pub async fn ingest_document(&self, document: &Document) -> Result<IngestionReport> {
        let started = Instant::now();

        let chunks = chunk_document(document, &self.chunking)?;
        info!(
            "Split {} pages into {} chunks (size {}, overlap {})",
            document.pages.len(),
            chunks.len(),
            self.chunking.chunk_size,
            self.chunking.chunk_overlap
        );

        if chunks.is_empty() {
            warn!(
                "Document {} produced no chunks, writing an empty index",
                document.source
            );
        }

        let vectors = self.embed_chunks(&chunks).await?;
        self.check_vectors(&chunks, &vectors)?;

        let entries: Vec<IndexEntry> = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexEntry::from_chunk(chunk, vector))
            .collect();

        let manifest = IndexManifest::new(
            self.embedder.model_name(),
            self.dimension,
            entries.len(),
            &self.chunking,
            document.source.clone(),
        );

        save_snapshot(&self.index_path, &manifest, &entries).await?;

        let report = IngestionReport {
            pages: document.pages.len(),
            chunks: entries.len(),
            dimension: self.dimension,
            index_path: self.index_path.clone(),
            elapsed: started.elapsed(),
        };
        info!(
            "Ingestion finished: {} chunks from {} pages in {:?}",
            report.chunks, report.pages, report.elapsed
        );
        Ok(report)
    }

    async fn embed_chunks(&self, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let embedder = Arc::clone(&self.embedder);
        let batch_size = self.batch_size;

        let bar = if console::user_attended_stderr() {
            ProgressBar::new(texts.len() as u64).with_style(
                ProgressStyle::with_template("{spinner} [{pos}/{len}] Embedding chunks {wide_bar}")
                    .expect("style template is valid"),
            )
        } else {
            ProgressBar::hidden()
        };

        let task_bar = bar.clone();
        let vectors = tokio::task::spawn_blocking(move || {
            let mut vectors = Vec::with_capacity(texts.len());
            for batch in texts.chunks(batch_size) {
                debug!("Embedding batch of {} chunks", batch.len());
                vectors.extend(embedder.embed_batch(batch)?);
                task_bar.inc(batch.len() as u64);
            }
            Ok::<_, AssistantError>(vectors)
        })
        .await
        .context("Embedding task failed")??;

        bar.finish_and_clear();
        Ok(vectors)
    }

    fn check_vectors(&self, chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<()> {
        if vectors.len() != chunks.len() {
            return Err(AssistantError::EmbeddingModel(format!(
                "model {} returned {} embeddings for {} chunks",
                self.embedder.model_name(),
                vectors.len(),
                chunks.len()
            )));
        }

        if let Some((position, vector)) = vectors
            .iter()
            .enumerate()
            .find(|(_, vector)| vector.len() != self.dimension)
        {
            return Err(AssistantError::EmbeddingModel(format!(
                "model {} returned a {}-dimensional vector for chunk {} (configured dimension is {})",
                self.embedder.model_name(),
                vector.len(),
                position,
                self.dimension
            )));
        }

        Ok(())
    }
}
