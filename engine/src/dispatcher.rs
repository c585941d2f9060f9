//! Dispatcher
//!
//! Runs one request through the full pipeline:
//!
//! 1. Classify the text and pick the branch
//! 2. Read the branch history
//! 3. List the backend's models and route (fast-router hint, model choice,
//!    optional self-QA pre-pass)
//! 4. Call the chosen model, bounded by the request timeout, with one retry on
//!    the fastest model when the backend is down or slow
//! 5. Append the user/assistant pair to the branch history
//!
//! Every stage records a progress step. Cancellation is cooperative and
//! observed before and after every backend call; a cancelled request leaves
//! the conversation memory untouched and reports `DispatchOutcome::Cancelled`
//! rather than an error.
//!
//! The dispatcher owns the shared tables (branch memory, progress records) and
//! is constructed explicitly and passed around behind an `Arc`.

use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::classifier::{TaskClassifier, TaskTag};
use crate::config::{Config, PromptsConfig};
use crate::heuristics::Heuristics;
use crate::llm::ollama::OllamaBackend;
use crate::llm::{chat_with_timeout, Backend, ChatOptions, ChatResponse, Message};
use crate::memory::{ConversationMemory, ConversationTurn};
use crate::progress::{icons, ProgressSink, ProgressTracker, RequestProgress};
use crate::router::{ModelPool, ModelRouter, RoutePlan, RouteReason};
use sdk::errors::EngineError;
use sdk::types::{Branch, BranchStatus, ProgressSnapshot};

/// A request to dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchRequest {
    pub request_id: String,
    pub text: String,
    pub requested_model: Option<String>,
}

impl DispatchRequest {
    /// Request with a fresh random id
    pub fn new(text: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), text)
    }

    pub fn with_id(request_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            text: text.into(),
            requested_model: None,
        }
    }

    /// Ask for a specific model; blank names are ignored
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        let model = model.into();
        self.requested_model = (!model.trim().is_empty()).then_some(model);
        self
    }
}

/// A completed request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchResult {
    pub request_id: String,
    pub answer: String,
    pub model_used: String,
    pub route_reason: RouteReason,
    pub task: TaskTag,
    pub branch: Branch,
    /// The chosen model failed and the fastest model answered instead
    pub fell_back: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_tokens: Option<u32>,
    pub duration_ms: u64,
}

/// How a dispatched request ended, short of an error
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Completed(DispatchResult),
    Cancelled { request_id: String },
}

impl DispatchOutcome {
    pub fn request_id(&self) -> &str {
        match self {
            DispatchOutcome::Completed(result) => &result.request_id,
            DispatchOutcome::Cancelled { request_id } => request_id,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, DispatchOutcome::Cancelled { .. })
    }
}

/// Remembers whether the backend last advertised any models
///
/// Only transitions are logged, so a backend that stays down does not warn
/// on every request. `reset` forgets the last observation; the next one is
/// treated as the first.
#[derive(Debug, Default)]
pub struct AvailabilityMonitor {
    last_seen: Mutex<Option<bool>>,
}

impl AvailabilityMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a model listing. Returns true when availability changed.
    pub fn observe(&self, backend: &str, model_count: usize) -> bool {
        let available = model_count > 0;
        let mut last = self.last_seen.lock().unwrap_or_else(PoisonError::into_inner);
        let previous = last.replace(available);

        match (previous, available) {
            (Some(false), false) | (Some(true), true) => return false,
            (None | Some(true), false) => warn!(
                "Backend {} lists no models, routing falls back to the configured default",
                backend
            ),
            (Some(false), true) => info!("Backend {} is back with {} models", backend, model_count),
            (None, true) => debug!("Backend {} lists {} models", backend, model_count),
        }
        true
    }

    /// Last observation, `None` before the first one
    pub fn last_seen(&self) -> Option<bool> {
        *self.last_seen.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn reset(&self) {
        *self.last_seen.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// Dispatcher settings taken from `Config`
#[derive(Debug, Clone)]
struct DispatchSettings {
    history_pairs: usize,
    request_timeout: Duration,
    progress_retention: Duration,
    temperature: Option<f32>,
    prompts: PromptsConfig,
}

impl DispatchSettings {
    fn from_config(config: &Config) -> Self {
        Self {
            history_pairs: config.memory.history_pairs,
            request_timeout: Duration::from_secs(config.backend.request_timeout_secs),
            progress_retention: Duration::from_secs(config.progress.retention_secs),
            temperature: config.backend.temperature,
            prompts: config.prompts.clone(),
        }
    }
}

/// Per-request pipeline over shared memory and progress tables
pub struct Dispatcher {
    backend: Arc<dyn Backend>,
    classifier: TaskClassifier,
    router: ModelRouter,
    memory: Arc<ConversationMemory>,
    progress: Arc<ProgressTracker>,
    availability: AvailabilityMonitor,
    settings: DispatchSettings,
}

impl Dispatcher {
    /// Create a dispatcher with fresh memory and progress tables
    pub fn new(backend: Arc<dyn Backend>, config: &Config) -> Self {
        Self::with_parts(
            backend,
            config,
            Arc::new(ConversationMemory::from_config(&config.memory)),
            Arc::new(ProgressTracker::new()),
        )
    }

    /// Create a dispatcher over existing memory and progress tables
    pub fn with_parts(
        backend: Arc<dyn Backend>,
        config: &Config,
        memory: Arc<ConversationMemory>,
        progress: Arc<ProgressTracker>,
    ) -> Self {
        let heuristics = Arc::new(Heuristics::new(&config.heuristics));
        let router = ModelRouter::new(
            Arc::clone(&backend),
            Arc::new(config.routing.clone()),
            Arc::clone(&heuristics),
            Duration::from_secs(config.backend.aux_timeout_secs),
        );

        Self {
            backend,
            classifier: TaskClassifier::new(heuristics),
            router,
            memory,
            progress,
            availability: AvailabilityMonitor::new(),
            settings: DispatchSettings::from_config(config),
        }
    }

    /// Create a dispatcher talking to the configured Ollama server
    pub fn from_config(config: &Config) -> Self {
        let backend = OllamaBackend::new(config.backend.base_url.clone())
            .with_default_temperature(config.backend.temperature);
        Self::new(Arc::new(backend), config)
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub fn classifier(&self) -> &TaskClassifier {
        &self.classifier
    }

    pub fn router(&self) -> &ModelRouter {
        &self.router
    }

    pub fn memory(&self) -> &Arc<ConversationMemory> {
        &self.memory
    }

    pub fn progress(&self) -> &Arc<ProgressTracker> {
        &self.progress
    }

    pub fn availability(&self) -> &AvailabilityMonitor {
        &self.availability
    }

    /// Run a request to completion on the current task
    pub async fn dispatch(&self, request: DispatchRequest) -> Result<DispatchOutcome, EngineError> {
        self.start(&request.request_id);
        self.run(request).await
    }

    /// Run a request on a background task
    ///
    /// The progress record exists before this returns, so the caller can poll
    /// and cancel right away.
    pub fn spawn(
        self: Arc<Self>,
        request: DispatchRequest,
    ) -> JoinHandle<Result<DispatchOutcome, EngineError>> {
        self.start(&request.request_id);
        tokio::spawn(async move { self.run(request).await })
    }

    pub fn poll_progress(&self, request_id: &str, since: usize) -> ProgressSnapshot {
        self.progress.get(request_id, since)
    }

    /// Ask a running request to stop at its next check point
    pub fn cancel(&self, request_id: &str) -> bool {
        let known = self.progress.cancel(request_id);
        if known {
            info!(request_id = %request_id, "Cancellation requested");
        }
        known
    }

    pub fn branch_status(&self, branch: Branch) -> BranchStatus {
        self.memory.status(branch)
    }

    /// Clear one branch, or both
    pub fn reset(&self, branch: Option<Branch>) {
        self.memory.clear(branch);
        match branch {
            Some(branch) => info!("Cleared {} branch history", branch),
            None => info!("Cleared all branch histories"),
        }
    }

    /// Names of the models the backend serves right now
    pub async fn available_models(&self) -> Vec<String> {
        let models: Vec<String> = self
            .backend
            .list_models()
            .await
            .into_iter()
            .map(|m| m.name)
            .collect();
        self.availability.observe(self.backend.name(), models.len());
        models
    }

    fn start(&self, request_id: &str) {
        self.progress.prune(self.settings.progress_retention);
        self.progress.init(request_id);
    }

    async fn run(&self, request: DispatchRequest) -> Result<DispatchOutcome, EngineError> {
        let started = Instant::now();
        let request_id = request.request_id.clone();
        let sink = RequestProgress::new(Arc::clone(&self.progress), request_id.clone());
        info!(request_id = %request_id, "Dispatching request");

        match self.pipeline(&request, &sink, started).await {
            Ok(result) => {
                sink.add_step(
                    "Done",
                    icons::DONE,
                    Some(format!("{} ms", result.duration_ms)),
                );
                self.progress.mark_done(&request_id);
                info!(
                    request_id = %request_id,
                    model = %result.model_used,
                    duration_ms = result.duration_ms,
                    "Request completed"
                );
                Ok(DispatchOutcome::Completed(result))
            }
            Err(EngineError::Cancelled) => {
                self.progress.finish_cancelled(&request_id);
                info!(request_id = %request_id, "Request cancelled");
                Ok(DispatchOutcome::Cancelled { request_id })
            }
            Err(e) => {
                error!(request_id = %request_id, "Request failed: {}", e);
                sink.add_step("Request failed", icons::FAILED, Some(e.to_string()));
                self.progress.mark_done(&request_id);
                Err(e)
            }
        }
    }

    async fn pipeline(
        &self,
        request: &DispatchRequest,
        sink: &RequestProgress,
        started: Instant,
    ) -> Result<DispatchResult, EngineError> {
        sink.add_step("Request received", icons::START, None);
        sink.ensure_not_cancelled()?;

        let task = self.classifier.classify(&request.text);
        let branch = task.branch();
        sink.add_step(
            &format!("Classified as {}", task),
            icons::CLASSIFY,
            Some(format!("{} branch", branch)),
        );

        let history = self
            .memory
            .history_for(branch, self.settings.history_pairs * 2);

        let available = self.available_models().await;
        sink.add_step(
            &format!("{} models available", available.len()),
            icons::MODELS,
            None,
        );
        sink.ensure_not_cancelled()?;

        let plan = self
            .router
            .route(
                &request.text,
                &available,
                request.requested_model.as_deref(),
                sink,
            )
            .await?;

        let pending = self
            .memory
            .begin(branch, request.request_id.clone(), request.text.clone());
        let messages = self.build_messages(branch, &plan, &history, &request.text);

        let (response, model_used, fell_back) = self
            .complete(&plan.decision.model, &available, &messages, sink)
            .await?;

        pending.commit(response.text.clone(), Some(model_used.clone()));

        Ok(DispatchResult {
            request_id: request.request_id.clone(),
            answer: response.text,
            model_used,
            route_reason: plan.decision.reason,
            task,
            branch,
            fell_back,
            prompt_tokens: response.prompt_tokens,
            completion_tokens: response.completion_tokens,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    fn build_messages(
        &self,
        branch: Branch,
        plan: &RoutePlan,
        history: &[ConversationTurn],
        text: &str,
    ) -> Vec<Message> {
        let mut system = match branch {
            Branch::Analytical => self.settings.prompts.analytical_system.clone(),
            Branch::Creative => self.settings.prompts.creative_system.clone(),
        };
        if !plan.self_qa.analysis_context.is_empty() {
            system.push_str("\n\n");
            system.push_str(&plan.self_qa.analysis_context);
        }

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(Message::system(system));
        messages.extend(history.iter().map(ConversationTurn::to_message));
        messages.push(Message::user(text));
        messages
    }

    /// Main backend call with a single retry on the fastest model
    async fn complete(
        &self,
        model: &str,
        available: &[String],
        messages: &[Message],
        sink: &RequestProgress,
    ) -> Result<(ChatResponse, String, bool), EngineError> {
        let options = ChatOptions {
            temperature: self.settings.temperature,
            ..ChatOptions::default()
        };
        let limit = self.settings.request_timeout;

        sink.ensure_not_cancelled()?;
        sink.add_step(&format!("Calling {}", model), icons::MODEL, None);
        let first = chat_with_timeout(self.backend.as_ref(), model, messages, &options, limit).await;
        sink.ensure_not_cancelled()?;

        let err = match first {
            Ok(response) => return Ok((response, model.to_string(), false)),
            Err(e) => e,
        };

        let pool = ModelPool::new(available);
        let fallback = match pool.fastest() {
            Some(fast) if err.is_retryable() && fast.name != model => fast.name.clone(),
            _ => return Err(err.into()),
        };

        warn!("{} failed ({}), retrying once with {}", model, err, fallback);
        sink.add_step(
            &format!("{} failed, retrying with {}", model, fallback),
            icons::WARN,
            Some(err.to_string()),
        );
        sink.set_active_model(&fallback);

        let retry = chat_with_timeout(self.backend.as_ref(), &fallback, messages, &options, limit).await;
        sink.ensure_not_cancelled()?;

        let response = retry?;
        Ok((response, fallback, true))
    }
}
