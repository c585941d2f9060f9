//! Shared test doubles for the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use switchyard_engine::config::Config;
use switchyard_engine::dispatcher::Dispatcher;
use switchyard_engine::llm::{
    Backend, BackendError, ChatOptions, ChatResponse, Message, MessageRole, ModelInfo,
};
use switchyard_engine::router::hint::ROUTER_SYSTEM_PROMPT;

/// The pool used by most scenarios
pub const POOL: [&str; 3] = ["tiny-1b", "coder-14b", "general-34b"];

/// What a backend call was for, judged from its messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Router,
    Questions,
    Answer,
    Main,
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub kind: CallKind,
    pub model: String,
    pub messages: Vec<Message>,
    pub json_output: bool,
}

impl RecordedCall {
    pub fn system(&self) -> &str {
        self.messages
            .iter()
            .find(|m| m.role == MessageRole::System)
            .map(|m| m.content.as_str())
            .unwrap_or_default()
    }

    pub fn last_user(&self) -> &str {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::User)
            .map(|m| m.content.as_str())
            .unwrap_or_default()
    }
}

type Responder = dyn Fn(&RecordedCall) -> Result<String, BackendError> + Send + Sync;

/// In-memory backend answering from a script
pub struct ScriptedBackend {
    models: Vec<String>,
    responder: Box<Responder>,
    delay: Option<Duration>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedBackend {
    pub fn new(models: &[&str]) -> Self {
        Self {
            models: models.iter().map(|m| m.to_string()).collect(),
            responder: Box::new(default_reply),
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_responder<F>(mut self, responder: F) -> Self
    where
        F: Fn(&RecordedCall) -> Result<String, BackendError> + Send + Sync + 'static,
    {
        self.responder = Box::new(responder);
        self
    }

    /// Sleep before answering each call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_of(&self, kind: CallKind) -> Vec<RecordedCall> {
        self.calls().into_iter().filter(|c| c.kind == kind).collect()
    }
}

/// Well-behaved replies for every call kind
pub fn default_reply(call: &RecordedCall) -> Result<String, BackendError> {
    Ok(match call.kind {
        CallKind::Router => {
            r#"{"complexity": "low", "domain": "general", "self_question": false, "prefer_fast": false}"#
                .to_string()
        }
        CallKind::Questions => r#"{"questions": ["Which scope?", "Which constraints?"]}"#.to_string(),
        CallKind::Answer => "A short internal answer.".to_string(),
        CallKind::Main => format!("answer from {}", call.model),
    })
}

fn kind_of(messages: &[Message], options: &ChatOptions) -> CallKind {
    let system = messages
        .iter()
        .find(|m| m.role == MessageRole::System)
        .map(|m| m.content.as_str())
        .unwrap_or_default();
    let user = messages
        .iter()
        .rev()
        .find(|m| m.role == MessageRole::User)
        .map(|m| m.content.as_str())
        .unwrap_or_default();

    if system == ROUTER_SYSTEM_PROMPT {
        CallKind::Router
    } else if options.json_output {
        CallKind::Questions
    } else if user.starts_with("Request:\n") {
        CallKind::Answer
    } else {
        CallKind::Main
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn chat(
        &self,
        model: &str,
        messages: &[Message],
        options: &ChatOptions,
    ) -> switchyard_engine::llm::Result<ChatResponse> {
        // Recorded before the delay so a test can see the call in flight
        let call = RecordedCall {
            kind: kind_of(messages, options),
            model: model.to_string(),
            messages: messages.to_vec(),
            json_output: options.json_output,
        };
        self.calls.lock().unwrap().push(call.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        (self.responder)(&call).map(ChatResponse::text)
    }

    async fn list_models(&self) -> Vec<ModelInfo> {
        self.models.iter().map(ModelInfo::named).collect()
    }
}

/// Config with short timeouts for tests
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.backend.request_timeout_secs = 5;
    config.backend.aux_timeout_secs = 5;
    config
}

pub fn dispatcher_with(backend: Arc<ScriptedBackend>, config: &Config) -> Arc<Dispatcher> {
    Arc::new(Dispatcher::new(backend, config))
}

pub fn dispatcher(backend: Arc<ScriptedBackend>) -> Arc<Dispatcher> {
    dispatcher_with(backend, &test_config())
}
