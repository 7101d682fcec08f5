// Query service
// Answers questions over HTTP from the persisted vector index


use anyhow::Context;
use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::{Config, RetrievalConfig};
use crate::embeddings::{Embedder, OllamaClient};
use crate::index::{RetrievedChunk, VectorIndex, load_snapshot};
use crate::{AssistantError, Result};

/// Answer returned when retrieval produced no context
pub const NO_ANSWER: &str = "I don't know";

/// Separator placed between retrieved chunks
pub const CONTEXT_SEPARATOR: &str = "\n\n";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatRequest {
    pub question: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatResponse {
    pub answer: String,
}

/// Everything a request needs, loaded once at startup and shared read-only
#[derive(Clone)]
pub struct ServiceContext {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    top_k: usize,
    answer_max_chars: usize,
}

impl ServiceContext {
    #[inline]
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        retrieval: &RetrievalConfig,
    ) -> Self {
        Self {
            embedder,
            index,
            top_k: retrieval.top_k,
            answer_max_chars: retrieval.answer_max_chars,
        }
    }

    #[inline]
    pub fn index_len(&self) -> usize {
        self.index.len()
    }

    /// Embed `question`, fetch the nearest chunks and build the answer text
    #[inline]
    pub async fn answer(&self, question: &str) -> Result<String> {
        let embedder = Arc::clone(&self.embedder);
        let owned_question = question.to_owned();
        let vector = tokio::task::spawn_blocking(move || embedder.embed(&owned_question))
            .await
            .context("Embedding task failed")??;

        let chunks = self.index.query(&vector, self.top_k)?;
        debug!(
            "Retrieved {} chunks (pages {:?}) for question of {} chars",
            chunks.len(),
            chunks.iter().map(|chunk| chunk.page).collect::<Vec<_>>(),
            question.chars().count()
        );

        Ok(assemble_answer(&chunks, self.answer_max_chars))
    }
}

/// Join the chunk texts with a blank line and keep the first `max_chars` characters.
///
/// An empty context yields [`NO_ANSWER`].
#[inline]
pub fn assemble_answer(chunks: &[RetrievedChunk], max_chars: usize) -> String {
    let context = chunks
        .iter()
        .map(|chunk| chunk.text.as_str())
        .join(CONTEXT_SEPARATOR);

    if context.is_empty() {
        return NO_ANSWER.to_string();
    }

    context.chars().take(max_chars).collect()
}

/// Build the HTTP router exposing `POST /chat`
#[inline]
pub fn router(context: ServiceContext) -> Router {
    Router::new()
        .route("/chat", post(chat_handler))
        .with_state(context)
}

async fn chat_handler(
    State(context): State<ServiceContext>,
    payload: std::result::Result<Json<ChatRequest>, JsonRejection>,
) -> std::result::Result<Json<ChatResponse>, ApiError> {
    let Json(request) = payload?;
    let answer = context.answer(&request.question).await?;
    Ok(Json(ChatResponse { answer }))
}

/// Text embedded once at startup to learn the model's output dimension
const DIMENSION_CHECK_TEXT: &str = "dimension check";

/// Load the embedding model and the index, then serve until Ctrl-C
#[inline]
pub async fn serve(config: &Config) -> Result<()> {
    let addr = config
        .bind_address()
        .map_err(|e| AssistantError::Config(e.to_string()))?;

    let context = load_context(config).await?;
    let entries = context.index_len();

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(
        "Query service listening on http://{} ({} indexed chunks)",
        addr, entries
    );

    axum::serve(listener, router(context))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Query service terminated unexpectedly")?;

    info!("Query service stopped");
    Ok(())
}

/// Startup work of [`serve`], run before anything is bound.
///
/// An unreachable backend or missing model is [`AssistantError::EmbeddingModel`].
/// A missing or unreadable index, or one whose dimension differs from what the
/// model actually returns, is [`AssistantError::IndexLoad`].
#[inline]
pub async fn load_context(config: &Config) -> Result<ServiceContext> {
    let client = OllamaClient::new(&config.ollama)
        .map_err(|e| AssistantError::EmbeddingModel(format!("{e:#}")))?;
    let health_client = client.clone();
    tokio::task::spawn_blocking(move || health_client.health_check())
        .await
        .context("Health check task failed")?
        .map_err(|e| AssistantError::EmbeddingModel(format!("{e:#}")))?;

    let index_path = config.index_path();
    let snapshot = load_snapshot(&index_path, config.ollama.embedding_dimension as usize).await?;
    if snapshot.manifest.model != config.ollama.model {
        warn!(
            "Index at {:?} was built with model {} but the service embeds with {}",
            index_path, snapshot.manifest.model, config.ollama.model
        );
    }

    let embedder: Arc<dyn Embedder> = Arc::new(client);
    check_model_dimension(Arc::clone(&embedder), snapshot.index.dimension()).await?;

    Ok(ServiceContext::new(
        embedder,
        Arc::new(snapshot.index),
        &config.retrieval,
    ))
}

async fn check_model_dimension(embedder: Arc<dyn Embedder>, index_dimension: usize) -> Result<()> {
    let model = embedder.model_name().to_string();
    let vector = tokio::task::spawn_blocking(move || embedder.embed(DIMENSION_CHECK_TEXT))
        .await
        .context("Embedding task failed")??;

    if vector.len() != index_dimension {
        return Err(AssistantError::IndexLoad(format!(
            "model {} returns {}-dimensional vectors but the index holds {}-dimensional vectors",
            model,
            vector.len(),
            index_dimension
        )));
    }

    debug!("Model {} matches index dimension {}", model, index_dimension);
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
        return;
    }
    info!("Shutdown signal received");
}

/// Error returned by HTTP handlers, rendered as `{"error": {"code", "message"}}`
#[derive(Debug)]
pub enum ApiError {
    /// The request body was rejected by the JSON extractor
    InvalidRequest(StatusCode, String),
    /// The embedding backend failed for this request
    EmbeddingUnavailable(String),
    Internal(String),
}

impl From<JsonRejection> for ApiError {
    #[inline]
    fn from(rejection: JsonRejection) -> Self {
        Self::InvalidRequest(rejection.status(), rejection.body_text())
    }
}

impl From<AssistantError> for ApiError {
    #[inline]
    fn from(error: AssistantError) -> Self {
        match error {
            AssistantError::EmbeddingModel(message) => Self::EmbeddingUnavailable(message),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    #[inline]
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::InvalidRequest(status, message) => {
                debug!("Rejected request: {}", message);
                (status, message)
            }
            Self::EmbeddingUnavailable(message) => {
                error!("Embedding backend failed: {}", message);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Embedding model unavailable".to_string(),
                )
            }
            Self::Internal(message) => {
                error!("Failed to answer question: {}", message);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal error".to_string(),
                )
            }
        };

        let body = serde_json::json!({
            "error": {
                "code": status.as_u16(),
                "message": message,
            }
        });

        (status, Json(body)).into_response()
    }
}
