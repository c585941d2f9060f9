//! Fast-router hint
//!
//! The first routing stage asks the fastest available model to describe the
//! request as a small JSON object. Small models are unreliable, so the answer
//! is parsed leniently. Anything unusable becomes `HintOutcome::Degraded`,
//! which carries the conservative default hint. A bad hint never fails a
//! request.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

use crate::llm::{chat_with_timeout, extract_json_object, Backend, ChatOptions, Message};
use crate::progress::{icons, ProgressSink};
use sdk::errors::EngineError;

/// Instruction sent to the fast model
pub const ROUTER_SYSTEM_PROMPT: &str = "You are a request router. Read the user message and \
reply with exactly one JSON object and nothing else, shaped like \
{\"complexity\": \"low|medium|high\", \"domain\": \"general|code|math|writing|other\", \
\"self_question\": false, \"prefer_fast\": false}. \
Set self_question to true when the user asks about you, the assistant. \
Set prefer_fast to true for small talk, greetings and trivial questions.";

/// How demanding a request is, as judged by the fast model
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Low,
    Medium,
    High,
    #[default]
    Unknown,
}

impl Complexity {
    fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "low" | "simple" | "trivial" => Complexity::Low,
            "medium" | "moderate" => Complexity::Medium,
            "high" | "complex" | "hard" => Complexity::High,
            _ => Complexity::Unknown,
        }
    }
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Complexity::Low => "low",
            Complexity::Medium => "medium",
            Complexity::High => "high",
            Complexity::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Structured routing hint for one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingHint {
    /// The fast model answered with a usable object
    pub checked: bool,
    pub router_model: Option<String>,
    pub complexity: Complexity,
    pub domain: String,
    pub self_question: bool,
    pub prefer_fast: bool,
}

impl RoutingHint {
    /// Conservative hint used whenever the fast-router check is unusable
    pub fn degraded(router_model: Option<String>) -> Self {
        Self {
            checked: false,
            router_model,
            complexity: Complexity::Unknown,
            domain: "general".to_string(),
            self_question: false,
            prefer_fast: false,
        }
    }

    pub fn is_high(&self) -> bool {
        self.complexity == Complexity::High
    }

    pub fn is_code_domain(&self) -> bool {
        self.domain == "code"
    }
}

impl Default for RoutingHint {
    fn default() -> Self {
        Self::degraded(None)
    }
}

/// Result of the fast-router stage
#[derive(Debug, Clone, PartialEq)]
pub enum HintOutcome {
    Ok(RoutingHint),
    Degraded { hint: RoutingHint, reason: String },
}

impl HintOutcome {
    pub fn hint(&self) -> &RoutingHint {
        match self {
            HintOutcome::Ok(hint) => hint,
            HintOutcome::Degraded { hint, .. } => hint,
        }
    }

    pub fn into_hint(self) -> RoutingHint {
        match self {
            HintOutcome::Ok(hint) => hint,
            HintOutcome::Degraded { hint, .. } => hint,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, HintOutcome::Degraded { .. })
    }

    fn degraded(router_model: Option<String>, reason: impl Into<String>) -> Self {
        HintOutcome::Degraded {
            hint: RoutingHint::degraded(router_model),
            reason: reason.into(),
        }
    }

    /// Parse fast-model output, recovering from malformed answers
    pub fn from_response(content: &str, router_model: &str) -> Self {
        match parse_hint(content, router_model) {
            Ok(hint) => HintOutcome::Ok(hint),
            Err(e) => {
                warn!("Fast router {} gave an unusable hint: {}", router_model, e);
                HintOutcome::degraded(Some(router_model.to_string()), e.to_string())
            }
        }
    }
}

/// Parse a hint object out of free-text model output
///
/// Fails with `MalformedHintResponse` when the text holds no JSON object or
/// the object has none of the expected keys. Missing keys take defaults.
pub fn parse_hint(content: &str, router_model: &str) -> Result<RoutingHint, EngineError> {
    let value = extract_json_object(content)
        .ok_or_else(|| EngineError::MalformedHintResponse("no JSON object in reply".into()))?;

    const KEYS: [&str; 4] = ["complexity", "domain", "self_question", "prefer_fast"];
    if !KEYS.iter().any(|k| value.get(k).is_some()) {
        return Err(EngineError::MalformedHintResponse(
            "reply object has no routing fields".into(),
        ));
    }

    let complexity = value
        .get("complexity")
        .and_then(Value::as_str)
        .map(Complexity::parse)
        .unwrap_or_default();
    let domain = value
        .get("domain")
        .and_then(Value::as_str)
        .map(|d| d.trim().to_lowercase())
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| "general".to_string());

    Ok(RoutingHint {
        checked: true,
        router_model: Some(router_model.to_string()),
        complexity,
        domain,
        self_question: flag(value.get("self_question")),
        prefer_fast: flag(value.get("prefer_fast")),
    })
}

// Small models answer booleans as true, "true", "yes" or 1.
fn flag(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => matches!(s.trim().to_lowercase().as_str(), "true" | "yes" | "1"),
        Some(Value::Number(n)) => n.as_i64() == Some(1),
        _ => false,
    }
}

/// Ask `router_model` for a hint
///
/// Backend failures degrade the hint. Only cancellation is returned as an
/// error.
pub async fn fetch_hint(
    backend: &dyn Backend,
    router_model: &str,
    text: &str,
    limit: Duration,
    progress: &dyn ProgressSink,
) -> Result<HintOutcome, EngineError> {
    progress.add_step(
        &format!("Fast router check with {}", router_model),
        icons::ROUTER,
        None,
    );
    progress.ensure_not_cancelled()?;

    let messages = [Message::system(ROUTER_SYSTEM_PROMPT), Message::user(text)];
    let result = chat_with_timeout(backend, router_model, &messages, &ChatOptions::json(), limit).await;

    progress.ensure_not_cancelled()?;

    let outcome = match result {
        Ok(response) => HintOutcome::from_response(&response.text, router_model),
        Err(e) => {
            warn!("Fast router check failed on {}: {}", router_model, e);
            HintOutcome::degraded(Some(router_model.to_string()), e.to_string())
        }
    };

    let hint = outcome.hint();
    debug!(
        "Routing hint: checked={} complexity={} domain={} self_question={} prefer_fast={}",
        hint.checked, hint.complexity, hint.domain, hint.self_question, hint.prefer_fast
    );
    let details = format!(
        "complexity={}, domain={}, self_question={}, prefer_fast={}",
        hint.complexity, hint.domain, hint.self_question, hint.prefer_fast
    );
    match &outcome {
        HintOutcome::Ok(_) => progress.add_step("Routing hint received", icons::ROUTER, Some(details)),
        HintOutcome::Degraded { reason, .. } => progress.add_step(
            "Routing hint unavailable, using defaults",
            icons::WARN,
            Some(reason.clone()),
        ),
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_well_formed_hint() {
        let hint = parse_hint(
            r#"{"complexity": "high", "domain": "Code", "self_question": false, "prefer_fast": false}"#,
            "tiny-1b",
        )
        .unwrap();
        assert!(hint.checked);
        assert_eq!(hint.router_model.as_deref(), Some("tiny-1b"));
        assert_eq!(hint.complexity, Complexity::High);
        assert!(hint.is_code_domain());
    }

    #[test]
    fn test_parse_tolerates_prose_and_loose_booleans() {
        let content = "Sure, here it is:\n```json\n{\"complexity\": \"LOW\", \"prefer_fast\": \"yes\", \"self_question\": 1}\n```";
        let hint = parse_hint(content, "tiny-1b").unwrap();
        assert_eq!(hint.complexity, Complexity::Low);
        assert!(hint.prefer_fast);
        assert!(hint.self_question);
        assert_eq!(hint.domain, "general");
    }

    #[test]
    fn test_parse_unknown_complexity_value() {
        let hint = parse_hint(r#"{"complexity": "galactic"}"#, "m").unwrap();
        assert_eq!(hint.complexity, Complexity::Unknown);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            parse_hint("I think this is a simple request.", "m"),
            Err(EngineError::MalformedHintResponse(_))
        ));
        assert!(matches!(
            parse_hint(r#"{"answer": 42}"#, "m"),
            Err(EngineError::MalformedHintResponse(_))
        ));
    }

    #[test]
    fn test_malformed_response_degrades() {
        let outcome = HintOutcome::from_response("not json", "tiny-1b");
        assert!(outcome.is_degraded());

        let hint = outcome.into_hint();
        assert!(!hint.checked);
        assert_eq!(hint.complexity, Complexity::Unknown);
        assert_eq!(hint.domain, "general");
        assert!(!hint.prefer_fast);
        assert_eq!(hint.router_model.as_deref(), Some("tiny-1b"));
    }
}
