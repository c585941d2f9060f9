//! Model Router
//!
//! Picks the concrete model for a request. Selection is a staged pipeline
//! that short-circuits on the first decisive stage:
//!
//! 1. Fast-router check: the fastest model describes the request as a
//!    `RoutingHint`. Short greetings are forced to `low` / `prefer_fast` and
//!    go straight to the fastest model.
//! 2. Self-questions go to the fastest model.
//! 3. An available requested model is honored, upgraded to a strong model for
//!    complex requests, or downgraded to the fastest model when the hint
//!    prefers speed.
//! 4. An unavailable requested model is logged and ignored.
//! 5. Automatic selection by code domain, complexity and question length.
//! 6. Fallback chain ending at the configured default model.
//!
//! Every stage emits a progress step, so a given input always yields the same
//! step sequence. The router can also run the self-QA pre-pass on the chosen
//! route (`route`).

pub mod hint;
pub mod models;

pub use hint::{Complexity, HintOutcome, RoutingHint};
pub use models::{extract_size_hint, ModelPool, PoolEntry, SizeBounds};

use sdk::errors::EngineError;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::RoutingConfig;
use crate::heuristics::{Heuristics, RequestText};
use crate::llm::Backend;
use crate::progress::{icons, ProgressSink};
use crate::self_qa::{SelfQaOutcome, SelfQaStage};

/// Why a model was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteReason {
    /// Short greeting, forced to the fastest model
    Greeting,
    /// Question about the assistant itself
    SelfQuestion,
    /// Requested model used as is
    Requested,
    /// Requested model too small for a complex request
    RequestedUpgraded,
    /// Requested model larger than needed for a quick request
    RequestedDowngraded,
    /// Code request served by a configured code model
    PreferredCoder,
    /// Code request served by the strongest coder in the size window
    StrongCoder,
    /// Code request served by the strongest coder of any size
    AnyCoder,
    /// Complex request served by the strongest model
    HighComplexity,
    /// The hint asked for speed
    PreferFast,
    /// Short question
    QuickQuestion,
    /// Configured default model
    Default,
    /// Configured general model
    General,
    /// Strongest model under the size cap
    StrongestCapped,
    /// Configured default model, not advertised by the backend
    DefaultUnverified,
    /// Nothing else applied
    LastResort,
}

impl RouteReason {
    pub fn as_str(self) -> &'static str {
        match self {
            RouteReason::Greeting => "greeting",
            RouteReason::SelfQuestion => "self_question",
            RouteReason::Requested => "requested",
            RouteReason::RequestedUpgraded => "requested_upgraded",
            RouteReason::RequestedDowngraded => "requested_downgraded",
            RouteReason::PreferredCoder => "preferred_coder",
            RouteReason::StrongCoder => "strong_coder",
            RouteReason::AnyCoder => "any_coder",
            RouteReason::HighComplexity => "high_complexity",
            RouteReason::PreferFast => "prefer_fast",
            RouteReason::QuickQuestion => "quick_question",
            RouteReason::Default => "default",
            RouteReason::General => "general",
            RouteReason::StrongestCapped => "strongest_capped",
            RouteReason::DefaultUnverified => "default_unverified",
            RouteReason::LastResort => "last_resort",
        }
    }
}

impl fmt::Display for RouteReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of `ModelRouter::select`
#[derive(Debug, Clone, PartialEq)]
pub struct RouteDecision {
    pub model: String,
    pub reason: RouteReason,
    pub hint: RoutingHint,
}

/// Model choice plus the optional self-QA context
#[derive(Debug, Clone, PartialEq)]
pub struct RoutePlan {
    pub decision: RouteDecision,
    pub self_qa: SelfQaOutcome,
}

/// Staged model selection
pub struct ModelRouter {
    backend: Arc<dyn Backend>,
    config: Arc<RoutingConfig>,
    heuristics: Arc<Heuristics>,
    aux_timeout: Duration,
    self_qa: SelfQaStage,
}

impl ModelRouter {
    /// Create a router
    ///
    /// # Arguments
    /// * `backend` - Backend used for the fast-router and self-QA calls
    /// * `config` - Routing configuration
    /// * `heuristics` - Compiled keyword heuristics
    /// * `aux_timeout` - Upper bound for each auxiliary backend call
    pub fn new(
        backend: Arc<dyn Backend>,
        config: Arc<RoutingConfig>,
        heuristics: Arc<Heuristics>,
        aux_timeout: Duration,
    ) -> Self {
        let self_qa = SelfQaStage::new(
            Arc::clone(&backend),
            Arc::clone(&heuristics),
            aux_timeout,
            config.self_qa_enabled,
        );
        Self {
            backend,
            config,
            heuristics,
            aux_timeout,
            self_qa,
        }
    }

    pub fn config(&self) -> &RoutingConfig {
        &self.config
    }

    /// Select a model, then run the self-QA pre-pass for it
    pub async fn route(
        &self,
        text: &str,
        available: &[String],
        requested: Option<&str>,
        progress: &dyn ProgressSink,
    ) -> Result<RoutePlan, EngineError> {
        let decision = self.select(text, available, requested, progress).await?;
        let pool = ModelPool::new(available);
        let self_qa = self
            .self_qa
            .maybe_run(text, &pool, &decision.hint, progress)
            .await?;
        Ok(RoutePlan { decision, self_qa })
    }

    /// Select a model for `text`
    ///
    /// Only cancellation and an empty pool without a configured default fail;
    /// every other problem degrades the choice.
    pub async fn select(
        &self,
        text: &str,
        available: &[String],
        requested: Option<&str>,
        progress: &dyn ProgressSink,
    ) -> Result<RouteDecision, EngineError> {
        let request = RequestText::new(text);
        let pool = ModelPool::new(available);
        progress.add_step(
            "Routing request",
            icons::ROUTER,
            Some(format!("{} models available", pool.len())),
        );

        let hint = self.routing_hint(&request, &pool, progress).await?;
        self.decide(&request, &pool, hint, requested, progress)
    }

    /// Stage 1: fetch the hint and apply the greeting guardrail
    async fn routing_hint(
        &self,
        request: &RequestText<'_>,
        pool: &ModelPool,
        progress: &dyn ProgressSink,
    ) -> Result<RoutingHint, EngineError> {
        let mut hint = match pool.fastest() {
            None => {
                progress.add_step("Fast router skipped: no models available", icons::WARN, None);
                RoutingHint::degraded(None)
            }
            Some(_) if !self.config.fast_router_enabled => {
                progress.add_step("Fast router disabled", icons::ROUTER, None);
                RoutingHint::degraded(None)
            }
            Some(fast) => {
                hint::fetch_hint(
                    self.backend.as_ref(),
                    &fast.name,
                    request.raw(),
                    self.aux_timeout,
                    progress,
                )
                .await?
                .into_hint()
            }
        };

        if !hint.self_question && self.heuristics.is_self_reference(request) {
            hint.self_question = true;
        }

        if self.is_greeting(request) {
            hint.complexity = Complexity::Low;
            hint.prefer_fast = true;
            progress.add_step("Greeting guardrail: forcing fast model", icons::GUARD, None);
        }

        Ok(hint)
    }

    fn is_greeting(&self, request: &RequestText<'_>) -> bool {
        self.heuristics
            .is_greeting(request, self.config.greeting_max_words)
    }

    fn strong_window(&self) -> SizeBounds {
        SizeBounds::between(self.config.strong_min_size_b, self.config.max_model_size_b)
    }

    /// Stages 1 to 6 given a hint. Pure apart from progress steps.
    pub fn decide(
        &self,
        request: &RequestText<'_>,
        pool: &ModelPool,
        hint: RoutingHint,
        requested: Option<&str>,
        progress: &dyn ProgressSink,
    ) -> Result<RouteDecision, EngineError> {
        let fastest = pool.fastest().map(|e| e.name.clone());

        if let Some(fast) = &fastest {
            if self.is_greeting(request) {
                return Ok(self.finish(fast, RouteReason::Greeting, hint, progress));
            }
            if hint.self_question {
                progress.add_step("Self-question detected", icons::ROUTER, None);
                return Ok(self.finish(fast, RouteReason::SelfQuestion, hint, progress));
            }
        }

        let complex = hint.is_high() || self.heuristics.is_complex(request);

        if let Some(name) = requested.map(str::trim).filter(|n| !n.is_empty()) {
            match pool.resolve(name) {
                Some(entry) => {
                    return Ok(self.honor_requested(entry, pool, complex, hint, progress));
                }
                None => {
                    warn!(
                        "Requested model {} is not available, selecting automatically",
                        name
                    );
                    progress.add_step(
                        &format!("Requested model {} not available", name),
                        icons::WARN,
                        None,
                    );
                }
            }
        }

        if let Some((model, reason)) = self.automatic(request, pool, &hint, complex, progress) {
            return Ok(self.finish(&model, reason, hint, progress));
        }

        self.fallback(pool, hint, progress)
    }

    /// Stage 3
    fn honor_requested(
        &self,
        entry: &PoolEntry,
        pool: &ModelPool,
        complex: bool,
        hint: RoutingHint,
        progress: &dyn ProgressSink,
    ) -> RouteDecision {
        let min = self.config.strong_min_size_b;
        progress.add_step(
            &format!("Requested model {} is available", entry.name),
            icons::MODEL,
            None,
        );

        if complex && entry.size_b.is_some_and(|s| s < min) {
            if let Some(strong) = pool.strongest(self.strong_window()) {
                progress.add_step(
                    &format!("Upgrading {} to {} for a complex request", entry.name, strong.name),
                    icons::UPGRADE,
                    None,
                );
                return self.finish(&strong.name, RouteReason::RequestedUpgraded, hint, progress);
            }
            debug!("No strong model available to upgrade {}", entry.name);
        } else if hint.prefer_fast && entry.size_b.is_some_and(|s| s >= min) {
            if let Some(fast) = pool.fastest().filter(|f| f.name != entry.name) {
                progress.add_step(
                    &format!("Downgrading {} to {} for a quick request", entry.name, fast.name),
                    icons::DOWNGRADE,
                    None,
                );
                return self.finish(&fast.name, RouteReason::RequestedDowngraded, hint, progress);
            }
        }

        self.finish(&entry.name, RouteReason::Requested, hint, progress)
    }

    /// Stage 5
    fn automatic(
        &self,
        request: &RequestText<'_>,
        pool: &ModelPool,
        hint: &RoutingHint,
        complex: bool,
        progress: &dyn ProgressSink,
    ) -> Option<(String, RouteReason)> {
        let cap = self.config.max_model_size_b;

        if self.heuristics.has_code_signals(request) || hint.is_code_domain() {
            progress.add_step("Code request detected", icons::ROUTER, None);
            let is_coder = |e: &PoolEntry| self.heuristics.is_coder_model(&e.name);

            if let Some(e) = pool.find_preferred(&self.config.preferred_code_models) {
                return Some((e.name.clone(), RouteReason::PreferredCoder));
            }
            if let Some(e) = pool.strongest_where(self.strong_window(), is_coder) {
                return Some((e.name.clone(), RouteReason::StrongCoder));
            }
            if let Some(e) = pool.strongest_where(SizeBounds::any(), is_coder) {
                return Some((e.name.clone(), RouteReason::AnyCoder));
            }
            debug!("No code model available");
        }

        if complex {
            progress.add_step("High complexity detected", icons::ROUTER, None);
            if let Some(e) = pool
                .strongest(self.strong_window())
                .or_else(|| pool.strongest(SizeBounds::capped(cap)))
            {
                return Some((e.name.clone(), RouteReason::HighComplexity));
            }
        }

        let fast = pool.fastest()?;
        if hint.prefer_fast {
            progress.add_step("Fast answer preferred", icons::ROUTER, None);
            return Some((fast.name.clone(), RouteReason::PreferFast));
        }
        if self.is_quick_question(request) {
            progress.add_step("Short question detected", icons::ROUTER, None);
            return Some((fast.name.clone(), RouteReason::QuickQuestion));
        }

        None
    }

    fn is_quick_question(&self, request: &RequestText<'_>) -> bool {
        let count = request.word_count();
        count > 0
            && count <= self.config.quick_question_max_words
            && request.raw().trim_end().ends_with('?')
    }

    /// Stage 6
    fn fallback(
        &self,
        pool: &ModelPool,
        hint: RoutingHint,
        progress: &dyn ProgressSink,
    ) -> Result<RouteDecision, EngineError> {
        progress.add_step("Using fallback chain", icons::ROUTER, None);

        if let Some(e) = pool.resolve(&self.config.default_model) {
            let name = e.name.clone();
            return Ok(self.finish(&name, RouteReason::Default, hint, progress));
        }
        if let Some(e) = pool.resolve(&self.config.general_model) {
            let name = e.name.clone();
            return Ok(self.finish(&name, RouteReason::General, hint, progress));
        }
        if let Some(e) = pool.strongest(SizeBounds::capped(self.config.max_model_size_b)) {
            let name = e.name.clone();
            return Ok(self.finish(&name, RouteReason::StrongestCapped, hint, progress));
        }

        let default = self.config.default_model.trim();
        if !default.is_empty() {
            warn!(
                "Default model {} is not advertised by the backend, using it anyway",
                default
            );
            return Ok(self.finish(default, RouteReason::DefaultUnverified, hint, progress));
        }

        match pool.fastest() {
            Some(e) => {
                let name = e.name.clone();
                Ok(self.finish(&name, RouteReason::LastResort, hint, progress))
            }
            None => {
                progress.add_step("No models available", icons::FAILED, None);
                Err(EngineError::NoModelsAvailable)
            }
        }
    }

    fn finish(
        &self,
        model: &str,
        reason: RouteReason,
        hint: RoutingHint,
        progress: &dyn ProgressSink,
    ) -> RouteDecision {
        info!(model = %model, reason = %reason, "Model selected");
        progress.add_step(
            &format!("Model selected: {}", model),
            icons::MODEL,
            Some(reason.to_string()),
        );
        progress.set_active_model(model);

        RouteDecision {
            model: model.to_string(),
            reason,
            hint,
        }
    }
}
