//! Blocking HTTP client for a local Ollama instance.
//!
//! Covers the three endpoints the service needs: `/api/chat` with images
//! (vision OCR), `/api/embed` (text embeddings) and `/api/tags` (model
//! discovery at startup). Callers run it inside `spawn_blocking`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OllamaError {
    #[error("Ollama is not reachable at {0}")]
    NotReachable(String),

    #[error("Ollama returned an error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Model '{0}' is not installed")]
    ModelNotFound(String),

    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Unexpected response from Ollama: {0}")]
    ResponseParsing(String),
}

/// Chat with base64-encoded images attached to the user message.
pub trait VisionClient: Send + Sync {
    fn chat_with_images(
        &self,
        model: &str,
        user_prompt: &str,
        images: &[String],
        system: Option<&str>,
    ) -> Result<String, OllamaError>;
}

/// Batch text embedding.
pub trait EmbedClient: Send + Sync {
    fn embed(&self, model: &str, inputs: &[&str]) -> Result<Vec<Vec<f32>>, OllamaError>;
}

pub struct OllamaClient {
    base_url: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl OllamaClient {
    /// Build a client. Must be called outside an async context: the
    /// blocking reqwest client owns its own runtime.
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, OllamaError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| OllamaError::Network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            timeout_secs,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn list_models(&self) -> Result<Vec<String>, OllamaError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| self.map_send_error(e))?;
        let parsed: TagsResponse = Self::read_json(response)?;
        Ok(parsed.models.into_iter().map(|m| m.name).collect())
    }

    /// Fails with `ModelNotFound` unless a model whose name starts with
    /// `model` is installed (`llava` matches `llava:13b`).
    pub fn require_model(&self, model: &str) -> Result<(), OllamaError> {
        let models = self.list_models()?;
        if models.iter().any(|m| m.starts_with(model)) {
            Ok(())
        } else {
            Err(OllamaError::ModelNotFound(model.to_string()))
        }
    }

    fn post_json<B: Serialize, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, OllamaError> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .map_err(|e| self.map_send_error(e))?;
        Self::read_json(response)
    }

    fn read_json<R: DeserializeOwned>(
        response: reqwest::blocking::Response,
    ) -> Result<R, OllamaError> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().unwrap_or_default();
            return Err(OllamaError::ApiError {
                status: status.as_u16(),
                message,
            });
        }
        response
            .json()
            .map_err(|e| OllamaError::ResponseParsing(e.to_string()))
    }

    fn map_send_error(&self, e: reqwest::Error) -> OllamaError {
        if e.is_connect() {
            OllamaError::NotReachable(self.base_url.clone())
        } else if e.is_timeout() {
            OllamaError::Timeout(self.timeout_secs)
        } else {
            OllamaError::Network(e.to_string())
        }
    }
}

impl VisionClient for OllamaClient {
    fn chat_with_images(
        &self,
        model: &str,
        user_prompt: &str,
        images: &[String],
        system: Option<&str>,
    ) -> Result<String, OllamaError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system {
            messages.push(ChatMessage {
                role: "system",
                content: system,
                images: None,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: user_prompt,
            images: Some(images),
        });

        let body = ChatRequest {
            model,
            messages,
            stream: false,
            options: ChatOptions { temperature: 0.0 },
        };
        let parsed: ChatResponse = self.post_json("/api/chat", &body)?;
        Ok(parsed.message.content)
    }
}

impl EmbedClient for OllamaClient {
    fn embed(&self, model: &str, inputs: &[&str]) -> Result<Vec<Vec<f32>>, OllamaError> {
        let body = EmbedRequest { model, input: inputs };
        let parsed: EmbedResponse = self.post_json("/api/embed", &body)?;
        if parsed.embeddings.len() != inputs.len() {
            return Err(OllamaError::ResponseParsing(format!(
                "expected {} embeddings, got {}",
                inputs.len(),
                parsed.embeddings.len()
            )));
        }
        Ok(parsed.embeddings)
    }
}

// ──────────────────────────────────────────────
// Wire types
// ──────────────────────────────────────────────

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    options: ChatOptions,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    images: Option<&'a [String]>,
}

/// Deterministic decoding for transcription.
#[derive(Serialize)]
struct ChatOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Deserialize)]
struct TagsResponse {
    models: Vec<TagModel>,
}

#[derive(Deserialize)]
struct TagModel {
    name: String,
}
