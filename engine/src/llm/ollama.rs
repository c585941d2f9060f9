//! Ollama Backend
//!
//! This module implements the `Backend` trait for Ollama, a local inference
//! server typically listening at http://localhost:11434.
//!
//! - `chat` maps to `POST /api/chat` (non-streaming)
//! - `list_models` maps to `GET /api/tags`
//!
//! Every model the router picks is served by the same Ollama instance; the
//! model name is a per-call argument rather than provider state.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use super::{Backend, BackendError, ChatOptions, ChatResponse, Message, ModelInfo, Result};

/// Default HTTP timeout. Callers apply tighter per-stage timeouts on top.
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 600;

/// Timeout for the model listing call
const LIST_TIMEOUT_SECS: u64 = 10;

/// Ollama backend
#[derive(Debug, Clone)]
pub struct OllamaBackend {
    /// Base URL for Ollama API (typically http://localhost:11434)
    base_url: String,

    /// Default temperature applied when a call does not set one
    default_temperature: Option<f32>,

    /// HTTP client for API requests
    client: Client,
}

impl OllamaBackend {
    /// Create a new Ollama backend
    ///
    /// # Arguments
    /// * `base_url` - Base URL for Ollama API (e.g., "http://localhost:11434")
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Falling back to default HTTP client: {}", e);
                Client::new()
            });

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            default_temperature: None,
            client,
        }
    }

    /// Set the temperature used when a call does not specify one
    pub fn with_default_temperature(mut self, temperature: Option<f32>) -> Self {
        self.default_temperature = temperature;
        self
    }

    /// Base URL this backend talks to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn build_request(&self, model: &str, messages: &[Message], options: &ChatOptions) -> OllamaRequest {
        let temperature = options.temperature.or(self.default_temperature);
        let request_options = if temperature.is_some() || options.max_tokens.is_some() {
            Some(OllamaOptions {
                temperature,
                num_predict: options.max_tokens,
            })
        } else {
            None
        };

        OllamaRequest {
            model: model.to_string(),
            messages: messages
                .iter()
                .map(|msg| OllamaMessage {
                    role: msg.role.to_string(),
                    content: msg.content.clone(),
                })
                .collect(),
            stream: false,
            format: options.json_output.then(|| "json".to_string()),
            options: request_options,
        }
    }

    fn map_transport_error(&self, e: reqwest::Error) -> BackendError {
        if e.is_timeout() {
            BackendError::Timeout
        } else if e.is_connect() {
            BackendError::Unavailable(format!(
                "Cannot connect to Ollama at {}. Is Ollama running?",
                self.base_url
            ))
        } else {
            BackendError::Unavailable(e.to_string())
        }
    }
}

#[async_trait]
impl Backend for OllamaBackend {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn chat(
        &self,
        model: &str,
        messages: &[Message],
        options: &ChatOptions,
    ) -> Result<ChatResponse> {
        let request = self.build_request(model, messages, options);

        tracing::debug!(
            "Ollama request: model={}, messages={}, total_chars={}",
            model,
            request.messages.len(),
            request
                .messages
                .iter()
                .map(|m| m.content.len())
                .sum::<usize>()
        );

        let url = format!("{}/api/chat", self.base_url);
        let start = Instant::now();
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        tracing::debug!(
            "Ollama response from {} received in {:.1}s",
            model,
            start.elapsed().as_secs_f64()
        );

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Http { status, body });
        }

        let parsed: OllamaResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Parse(format!("Failed to parse Ollama response: {}", e)))?;

        Ok(ChatResponse {
            text: parsed.message.content,
            prompt_tokens: parsed.prompt_eval_count,
            completion_tokens: parsed.eval_count,
        })
    }

    async fn list_models(&self) -> Vec<ModelInfo> {
        let url = format!("{}/api/tags", self.base_url);
        let response = match self
            .client
            .get(&url)
            .timeout(Duration::from_secs(LIST_TIMEOUT_SECS))
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                tracing::warn!("Ollama model listing returned {}", response.status());
                return Vec::new();
            }
            Err(e) => {
                tracing::warn!("Ollama model listing failed: {}", self.map_transport_error(e));
                return Vec::new();
            }
        };

        match response.json::<OllamaTags>().await {
            Ok(tags) => tags
                .models
                .into_iter()
                .map(|m| ModelInfo {
                    name: m.name,
                    metadata: m.details,
                })
                .collect(),
            Err(e) => {
                tracing::warn!("Failed to parse Ollama model listing: {}", e);
                Vec::new()
            }
        }
    }
}

/// Ollama chat request format
#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

/// Ollama sampling options
#[derive(Debug, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

/// Ollama message format
#[derive(Debug, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

/// Ollama chat response format
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    message: OllamaMessage,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

/// Ollama `/api/tags` response format
#[derive(Debug, Deserialize)]
struct OllamaTags {
    #[serde(default)]
    models: Vec<OllamaTag>,
}

#[derive(Debug, Deserialize)]
struct OllamaTag {
    name: String,
    #[serde(default)]
    details: Option<serde_json::Value>,
}
