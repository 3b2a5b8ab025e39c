//! Collaborator traits for the remote model services.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    #[cfg(feature = "http")]
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },

    #[cfg(feature = "http")]
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("model returned no {0}")]
    Empty(&'static str),

    #[error("invalid client configuration: {0}")]
    Config(String),
}

/// Turns text into a vector in the same space as the corpus embeddings.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError>;
}

/// Sends a rendered prompt to a model and returns its raw text answer.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;

    /// Label recorded in reports.
    fn model_name(&self) -> &str;
}
