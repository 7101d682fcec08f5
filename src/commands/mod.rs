
use anyhow::Context;
use console::style;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::chat::run_chat;
use crate::config::Config;
use crate::embeddings::OllamaClient;
use crate::ingest::{IngestionPipeline, IngestionReport};
use crate::{AssistantError, Result, service};

/// Health-check the embedding model, then index `document` (or the configured document)
#[inline]
pub async fn ingest(config: &Config, document: Option<PathBuf>) -> Result<IngestionReport> {
    let document_path = document.unwrap_or_else(|| config.document_path());

    let client = OllamaClient::new(&config.ollama)
        .map_err(|e| AssistantError::EmbeddingModel(format!("{e:#}")))?;
    let health_client = client.clone();
    tokio::task::spawn_blocking(move || health_client.health_check())
        .await
        .context("Health check task failed")?
        .map_err(|e| AssistantError::EmbeddingModel(format!("{e:#}")))?;

    let pipeline = IngestionPipeline::new(config, Arc::new(client));
    let report = pipeline.run(&document_path).await?;

    println!(
        "{} Ingested {} chunks from {} pages of {}",
        style("✓").green().bold(),
        report.chunks,
        report.pages,
        document_path.display()
    );
    println!("  Index: {}", report.index_path.display());
    println!("  Dimension: {}", report.dimension);
    println!("  Duration: {:.1?}", report.elapsed);

    Ok(report)
}

/// Run the query service, optionally on a different address than configured
#[inline]
pub async fn serve(config: &Config, bind: Option<String>) -> Result<()> {
    let mut config = config.clone();
    if let Some(bind) = bind {
        config.service.bind_address = bind;
        config
            .service
            .validate()
            .map_err(|e| AssistantError::Config(e.to_string()))?;
    }

    info!("Starting query service on {}", config.service.bind_address);
    service::serve(&config).await
}

/// Open the terminal chat, optionally against a different service URL than configured
#[inline]
pub async fn chat(config: &Config, url: Option<String>) -> Result<()> {
    let mut config = config.clone();
    if let Some(url) = url {
        config.client.base_url = url;
        config
            .client
            .validate()
            .map_err(|e| AssistantError::Config(e.to_string()))?;
    }

    tokio::task::spawn_blocking(move || run_chat(&config))
        .await
        .context("Chat session failed")?
}
