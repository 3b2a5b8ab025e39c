//! HTTP clients for OpenAI-compatible chat, completion and embedding endpoints.
//!
//! Every call is a single attempt; failures surface as [`LlmError`] and the
//! pipeline decides how to degrade.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::service::{CompletionService, EmbeddingService, LlmError};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_CHAT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-ada-002";
const MAX_TOKENS: u32 = 300;

const SYSTEM_PROMPT: &str =
    "You are a smart code reviewer who can spot code that uses a non-existent or deprecated API.";

async fn ok_or_server_error(resp: reqwest::Response) -> Result<reqwest::Response, LlmError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(LlmError::Server {
        status: status.as_u16(),
        body,
    })
}

// ── Chat ──

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// `/chat/completions` client with a fixed code-reviewer system message.
pub struct ChatClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl ChatClient {
    /// `base_url` like `https://api.openai.com/v1`; a trailing slash is dropped.
    pub fn new(base_url: &str, api_key: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
        }
    }

    fn body(&self, prompt: &str) -> Value {
        json!({
            "model": &self.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": prompt}
            ],
            "temperature": 0.0,
            "max_tokens": MAX_TOKENS
        })
    }
}

#[async_trait]
impl CompletionService for ChatClient {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(url = %url, model = %self.model, "chat request");
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.body(prompt))
            .send()
            .await?;
        let parsed: ChatResponse = ok_or_server_error(resp).await?.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(LlmError::Empty("choices"))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// ── Completion ──

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    text: String,
}

/// Plain completion endpoint with caller-supplied auth headers.
pub struct CompletionClient {
    client: reqwest::Client,
    endpoint: String,
    headers: BTreeMap<String, String>,
    label: String,
}

impl CompletionClient {
    /// `headers_json` is a JSON object of extra headers, e.g. `{"api-key": "..."}`.
    pub fn new(endpoint: String, headers_json: &str, label: String) -> Result<Self, LlmError> {
        let headers: BTreeMap<String, String> = serde_json::from_str(headers_json)
            .map_err(|e| LlmError::Config(format!("completion headers: {e}")))?;
        Ok(Self {
            client: reqwest::Client::new(),
            endpoint,
            headers,
            label,
        })
    }

    fn body(prompt: &str) -> Value {
        json!({
            "prompt": prompt,
            "temperature": 0,
            "best_of": 1,
            "max_tokens": MAX_TOKENS
        })
    }
}

#[async_trait]
impl CompletionService for CompletionClient {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        debug!(endpoint = %self.endpoint, "completion request");
        let mut req = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json");
        for (name, value) in &self.headers {
            req = req.header(name.as_str(), value.as_str());
        }
        let resp = req.json(&Self::body(prompt)).send().await?;
        let parsed: CompletionResponse = ok_or_server_error(resp).await?.json().await?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or(LlmError::Empty("choices"))?;
        Ok(trim_completion(&choice.text))
    }

    fn model_name(&self) -> &str {
        &self.label
    }
}

fn trim_completion(text: &str) -> String {
    text.trim_matches(|c| c == ' ' || c == '\n').to_string()
}

// ── Embeddings ──

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// `/embeddings` client producing vectors comparable with the corpus.
pub struct EmbeddingClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl EmbeddingClient {
    pub fn new(base_url: &str, api_key: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
        }
    }
}

#[async_trait]
impl EmbeddingService for EmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let url = format!("{}/embeddings", self.base_url);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&json!({"model": &self.model, "input": text}))
            .send()
            .await?;
        let parsed: EmbeddingResponse = ok_or_server_error(resp).await?.json().await?;
        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or(LlmError::Empty("embedding"))
    }
}
