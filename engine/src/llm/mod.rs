//! Inference Backend Abstraction
//!
//! This module defines the contract the dispatch engine uses to talk to an
//! inference backend: one chat call against a named model and one call that
//! lists the models the backend can serve. The `Backend` trait is the only
//! seam between the engine and the wire protocol; `ollama` provides the HTTP
//! implementation used by the binary.
//!
//! It also hosts the JSON extraction helpers shared by the routing
//! and self-QA stages, which read JSON objects out of free-text model output.

use async_trait::async_trait;
use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub mod ollama;

/// Result type for backend operations
pub type Result<T> = std::result::Result<T, BackendError>;

/// Errors that can occur during a backend call
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Timeout")]
    Timeout,

    #[error("HTTP error ({status}): {body}")]
    Http { status: u16, body: String },

    #[error("Parse error: {0}")]
    Parse(String),
}

impl BackendError {
    /// Failures another model on the same backend might not hit
    pub fn is_retryable(&self) -> bool {
        match self {
            BackendError::Unavailable(_) | BackendError::Timeout => true,
            BackendError::Http { status, .. } => *status >= 500,
            BackendError::Parse(_) => false,
        }
    }
}

impl From<BackendError> for EngineError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Timeout => EngineError::BackendTimeout,
            other => EngineError::BackendUnavailable(other.to_string()),
        }
    }
}

/// Message in a chat request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    /// Role of the message sender
    pub role: MessageRole,

    /// Content of the message
    pub content: String,
}

impl Message {
    /// Create a new user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    /// Create a new assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }

    /// Create a new system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }
}

/// Role of a message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// User message
    User,

    /// Assistant message
    Assistant,

    /// System message
    System,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::System => write!(f, "system"),
        }
    }
}

/// Per-call options
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatOptions {
    /// Sampling temperature, backend default when unset
    pub temperature: Option<f32>,

    /// Ask the backend to constrain output to a JSON object
    pub json_output: bool,

    /// Upper bound on generated tokens
    pub max_tokens: Option<u32>,
}

impl ChatOptions {
    /// Options for short auxiliary calls that must answer with JSON
    pub fn json() -> Self {
        Self {
            temperature: Some(0.0),
            json_output: true,
            max_tokens: Some(256),
        }
    }
}

/// Response from a chat call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Generated text
    pub text: String,

    /// Tokens consumed by the prompt, when reported
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_tokens: Option<u32>,

    /// Tokens generated, when reported
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_tokens: Option<u32>,
}

impl ChatResponse {
    /// Response with text only
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// A model advertised by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Model name as accepted by `Backend::chat`
    pub name: String,

    /// Backend-specific metadata (size on disk, family, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl ModelInfo {
    /// Model info with no metadata
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            metadata: None,
        }
    }
}

/// Inference backend contract
///
/// Implementations may block for a long time inside `chat`; callers bound
/// the call with their own timeout.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Returns the name of the backend (e.g., "ollama")
    fn name(&self) -> &str;

    /// Run one chat completion against `model`
    async fn chat(
        &self,
        model: &str,
        messages: &[Message],
        options: &ChatOptions,
    ) -> Result<ChatResponse>;

    /// List the models the backend can serve
    ///
    /// Never fails: an unreachable backend yields an empty list so routing
    /// degrades to the configured default model.
    async fn list_models(&self) -> Vec<ModelInfo>;
}

/// Run `Backend::chat` bounded by `limit`; an elapsed limit maps to
/// `BackendError::Timeout`.
pub async fn chat_with_timeout(
    backend: &dyn Backend,
    model: &str,
    messages: &[Message],
    options: &ChatOptions,
    limit: Duration,
) -> Result<ChatResponse> {
    match tokio::time::timeout(limit, backend.chat(model, messages, options)).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!("{} call to {} timed out after {:?}", backend.name(), model, limit);
            Err(BackendError::Timeout)
        }
    }
}

/// Extract a JSON object from free-text model output.
///
/// Handles the shapes small models actually produce:
/// 1. Raw JSON: the whole text is an object
/// 2. Fenced JSON (with or without trailing text): ` ```json\n{...}\n``` `
/// 3. JSON embedded in prose: the first balanced `{...}` in the text
pub fn extract_json_object(content: &str) -> Option<serde_json::Value> {
    let trimmed = content.trim();

    if let Some(value) = parse_object(trimmed) {
        return Some(value);
    }

    if let Some(inner) = extract_fenced_json(trimmed) {
        if let Some(value) = parse_object(inner.trim()) {
            return Some(value);
        }
    }

    let mut search_from = 0;
    while let Some(pos) = trimmed[search_from..].find('{') {
        let start = search_from + pos;
        if let Some(candidate) = extract_balanced_json(&trimmed[start..]) {
            if let Some(value) = parse_object(candidate) {
                return Some(value);
            }
        }
        search_from = start + 1;
    }

    None
}

fn parse_object(s: &str) -> Option<serde_json::Value> {
    serde_json::from_str::<serde_json::Value>(s)
        .ok()
        .filter(|v| v.is_object())
}

/// Extract the body of the first markdown code fence in the text.
///
/// Works even when there is trailing prose after the closing ```.
fn extract_fenced_json(content: &str) -> Option<&str> {
    let fence_start = content.find("```")?;
    let after_opening = &content[fence_start + 3..];

    // Skip the language tag line (e.g. "json\n")
    let body_start_rel = after_opening.find('\n')? + 1;
    let body_start = fence_start + 3 + body_start_rel;

    let closing = content[body_start..].find("```")?;
    let body_end = body_start + closing;

    if body_start >= body_end {
        return None;
    }

    Some(&content[body_start..body_end])
}

/// Extract a balanced JSON object starting at position 0 of `s`.
///
/// Counts `{` / `}` depth, respecting string literals, to find the
/// matching close brace.
fn extract_balanced_json(s: &str) -> Option<&str> {
    if !s.starts_with('{') {
        return None;
    }
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_creation() {
        let user_msg = Message::user("Hello");
        assert_eq!(user_msg.role, MessageRole::User);
        assert_eq!(user_msg.content, "Hello");

        let assistant_msg = Message::assistant("Hi there");
        assert_eq!(assistant_msg.role, MessageRole::Assistant);

        let system_msg = Message::system("You are a helpful assistant");
        assert_eq!(system_msg.role, MessageRole::System);
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_string(&Message::system("x")).unwrap();
        assert!(json.contains(r#""role":"system""#));
    }

    #[test]
    fn test_backend_error_mapping() {
        assert!(matches!(
            EngineError::from(BackendError::Timeout),
            EngineError::BackendTimeout
        ));
        assert!(matches!(
            EngineError::from(BackendError::Http {
                status: 500,
                body: "boom".into()
            }),
            EngineError::BackendUnavailable(_)
        ));
    }

    #[test]
    fn test_extract_raw_json() {
        let value = extract_json_object(r#"{"complexity": "low"}"#).unwrap();
        assert_eq!(value["complexity"], "low");
    }

    #[test]
    fn test_extract_fenced_json_with_trailing_prose() {
        let content = "Here you go:\n```json\n{\"domain\": \"code\"}\n```\nHope that helps.";
        let value = extract_json_object(content).unwrap();
        assert_eq!(value["domain"], "code");
    }

    #[test]
    fn test_extract_json_embedded_in_prose() {
        let content = r#"Sure! {"questions": ["What {scope}?", "Which DB?"]} done"#;
        let value = extract_json_object(content).unwrap();
        assert_eq!(value["questions"][0], "What {scope}?");
    }

    #[test]
    fn test_extract_skips_non_object_json() {
        assert!(extract_json_object("[1, 2, 3]").is_none());
        assert!(extract_json_object("no json here").is_none());
        assert!(extract_json_object("{ unterminated").is_none());
    }

    #[test]
    fn test_extract_skips_broken_braces_before_valid_object() {
        let content = r#"{oops} then {"prefer_fast": true}"#;
        let value = extract_json_object(content).unwrap();
        assert_eq!(value["prefer_fast"], true);
    }
}
