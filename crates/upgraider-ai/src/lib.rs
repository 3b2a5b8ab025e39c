//! AI layer: reference retrieval, prompt construction, LLM access and response parsing.

pub mod parse;
pub mod prompt;
pub mod retriever;
mod service;

pub use parse::parse_response;
pub use prompt::{PromptError, PromptTemplate};
pub use retriever::{RetrievalConfig, retrieve};
pub use service::{CompletionService, EmbeddingService, LlmError};

#[cfg(feature = "http")]
mod openai;
#[cfg(feature = "http")]
pub use openai::{
    ChatClient, CompletionClient, DEFAULT_BASE_URL, DEFAULT_CHAT_MODEL, DEFAULT_EMBEDDING_MODEL,
    EmbeddingClient,
};
