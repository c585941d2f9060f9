//! Routing scenarios against a scripted backend
//!
//! Each test runs the full `ModelRouter::select` pipeline, fast-router call
//! included, and checks both the chosen model and the recorded stage trace.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{default_reply, CallKind, ScriptedBackend, POOL};
use switchyard_engine::config::RoutingConfig;
use switchyard_engine::heuristics::Heuristics;
use switchyard_engine::llm::BackendError;
use switchyard_engine::progress::{ProgressTracker, RequestProgress};
use switchyard_engine::router::{Complexity, ModelRouter, RouteReason};

fn router_for(backend: Arc<ScriptedBackend>) -> ModelRouter {
    ModelRouter::new(
        backend,
        Arc::new(RoutingConfig::default()),
        Arc::new(Heuristics::default()),
        Duration::from_secs(5),
    )
}

fn pool() -> Vec<String> {
    POOL.iter().map(|m| m.to_string()).collect()
}

fn sink(tracker: &Arc<ProgressTracker>, id: &str) -> RequestProgress {
    tracker.init(id);
    RequestProgress::new(Arc::clone(tracker), id)
}

fn step_texts(tracker: &ProgressTracker, id: &str) -> Vec<String> {
    tracker.get(id, 0).steps.into_iter().map(|s| s.text).collect()
}

#[tokio::test]
async fn test_scenario_greeting_goes_to_fastest_model() {
    // The fast router wrongly calls the greeting complex
    let backend = Arc::new(ScriptedBackend::new(&POOL).with_responder(|call| match call.kind {
        CallKind::Router => Ok(r#"{"complexity": "high", "domain": "general", "prefer_fast": false}"#.into()),
        _ => default_reply(call),
    }));
    let router = router_for(Arc::clone(&backend));
    let tracker = Arc::new(ProgressTracker::new());
    let progress = sink(&tracker, "a");

    let decision = router
        .select("hallo", &pool(), None, &progress)
        .await
        .unwrap();

    assert_eq!(decision.model, "tiny-1b");
    assert_eq!(decision.reason, RouteReason::Greeting);
    assert_eq!(decision.hint.complexity, Complexity::Low);
    assert!(decision.hint.prefer_fast);

    let router_calls = backend.calls_of(CallKind::Router);
    assert_eq!(router_calls.len(), 1);
    assert_eq!(router_calls[0].model, "tiny-1b");

    assert_eq!(
        step_texts(&tracker, "a"),
        vec![
            "Routing request",
            "Fast router check with tiny-1b",
            "Routing hint received",
            "Greeting guardrail: forcing fast model",
            "Model selected: tiny-1b",
        ]
    );
    assert_eq!(tracker.get("a", 0).active_model.as_deref(), Some("tiny-1b"));
}

#[tokio::test]
async fn test_greeting_ignores_requested_model() {
    let backend = Arc::new(ScriptedBackend::new(&POOL));
    let router = router_for(backend);
    let tracker = Arc::new(ProgressTracker::new());

    let decision = router
        .select("Hey there!", &pool(), Some("general-34b"), &sink(&tracker, "g"))
        .await
        .unwrap();

    assert_eq!(decision.model, "tiny-1b");
}

#[tokio::test]
async fn test_polite_opener_keeps_requested_model() {
    let backend = Arc::new(ScriptedBackend::new(&POOL));
    let router = router_for(backend);
    let tracker = Arc::new(ProgressTracker::new());

    let decision = router
        .select("hey, debug my SQL", &pool(), Some("coder-14b"), &sink(&tracker, "p"))
        .await
        .unwrap();

    assert_eq!(decision.model, "coder-14b");
    assert_eq!(decision.reason, RouteReason::Requested);
    assert!(!decision.hint.prefer_fast);
    assert!(!step_texts(&tracker, "p")
        .iter()
        .any(|s| s.starts_with("Greeting guardrail")));
}

#[tokio::test]
async fn test_scenario_complex_code_request_avoids_tiny_model() {
    let backend = Arc::new(ScriptedBackend::new(&POOL));
    let router = router_for(backend);
    let tracker = Arc::new(ProgressTracker::new());

    let decision = router
        .select(
            "Entwerfe eine REST-API mit Auth und DB-Migration",
            &pool(),
            None,
            &sink(&tracker, "b"),
        )
        .await
        .unwrap();

    assert!(
        decision.model == "coder-14b" || decision.model == "general-34b",
        "unexpected model {}",
        decision.model
    );
    assert_ne!(decision.model, "tiny-1b");
    assert!(step_texts(&tracker, "b").contains(&"Code request detected".to_string()));
}

#[tokio::test]
async fn test_scenario_requested_tiny_model_is_upgraded() {
    let backend = Arc::new(ScriptedBackend::new(&POOL));
    let router = router_for(backend);
    let tracker = Arc::new(ProgressTracker::new());

    let decision = router
        .select(
            "Entwerfe eine REST-API mit Auth und DB-Migration",
            &pool(),
            Some("tiny-1b"),
            &sink(&tracker, "c"),
        )
        .await
        .unwrap();

    assert_eq!(decision.reason, RouteReason::RequestedUpgraded);
    let size = switchyard_engine::router::extract_size_hint(&decision.model).unwrap();
    assert!(size >= 7.0);
}

#[tokio::test]
async fn test_scenario_empty_model_list_returns_default() {
    let backend = Arc::new(ScriptedBackend::new(&[]));
    let router = router_for(Arc::clone(&backend));
    let tracker = Arc::new(ProgressTracker::new());

    let decision = router
        .select("Erkläre mir Quantencomputer", &[], None, &sink(&tracker, "d"))
        .await
        .unwrap();

    assert_eq!(decision.model, RoutingConfig::default().default_model);
    assert!(backend.calls().is_empty());
    assert!(step_texts(&tracker, "d")
        .contains(&"Fast router skipped: no models available".to_string()));
}

#[tokio::test]
async fn test_router_failure_degrades_hint() {
    let backend = Arc::new(ScriptedBackend::new(&POOL).with_responder(|call| match call.kind {
        CallKind::Router => Err(BackendError::Unavailable("connection refused".into())),
        _ => default_reply(call),
    }));
    let router = router_for(backend);
    let tracker = Arc::new(ProgressTracker::new());

    let decision = router
        .select("how tall is the eiffel tower?", &pool(), None, &sink(&tracker, "f"))
        .await
        .unwrap();

    assert!(!decision.hint.checked);
    assert_eq!(decision.hint.domain, "general");
    assert_eq!(decision.reason, RouteReason::QuickQuestion);
    assert_eq!(decision.model, "tiny-1b");
}

#[tokio::test]
async fn test_self_question_from_hint_skips_upgrade() {
    let backend = Arc::new(ScriptedBackend::new(&POOL).with_responder(|call| match call.kind {
        CallKind::Router => Ok(r#"{"complexity": "high", "self_question": true}"#.into()),
        _ => default_reply(call),
    }));
    let router = router_for(backend);
    let tracker = Arc::new(ProgressTracker::new());

    let decision = router
        .select(
            "Can you implement a distributed database yourself?",
            &pool(),
            Some("tiny-1b"),
            &sink(&tracker, "s"),
        )
        .await
        .unwrap();

    assert_eq!(decision.reason, RouteReason::SelfQuestion);
    assert_eq!(decision.model, "tiny-1b");
    assert!(!step_texts(&tracker, "s")
        .iter()
        .any(|s| s.starts_with("Upgrading")));
}

#[tokio::test]
async fn test_cancelled_during_fast_router_check() {
    let tracker = Arc::new(ProgressTracker::new());
    let cancel_from_backend = Arc::clone(&tracker);
    let backend = Arc::new(ScriptedBackend::new(&POOL).with_responder(move |call| {
        cancel_from_backend.cancel("x");
        default_reply(call)
    }));
    let router = router_for(backend);

    let result = router
        .select("tell me about rivers", &pool(), None, &sink(&tracker, "x"))
        .await;

    assert!(matches!(result, Err(sdk::errors::EngineError::Cancelled)));
}
