use thiserror::Error;

pub type Result<T> = std::result::Result<T, AssistantError>;

#[derive(Error, Debug)]
pub enum AssistantError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Document load error: {0}")]
    DocumentLoad(String),

    #[error("Embedding model error: {0}")]
    EmbeddingModel(String),

    #[error("Index load error: {0}")]
    IndexLoad(String),

    #[error("Index write error: {0}")]
    IndexWrite(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod chat;
pub mod commands;
pub mod config;
pub mod document;
pub mod embeddings;
pub mod index;
pub mod ingest;
pub mod service;

#[cfg(test)]
mod test_support;
