//! Self-QA pre-pass
//!
//! For requests that ask for thorough work, the fast model first writes up to
//! two clarifying questions about the request and then answers each one in a
//! sentence or two. The answers are joined into an internal pre-analysis block
//! that is added to the main call's system context.
//!
//! The stage is gated: simple requests skip it and cost no backend calls.
//! Backend or parse failures never fail the request; they fall back to
//! generic questions or drop the answer. Cancellation is checked at every
//! question/answer boundary and is the only error returned.

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::heuristics::{Heuristics, RequestText};
use crate::llm::{chat_with_timeout, extract_json_object, Backend, ChatOptions, Message};
use crate::progress::{icons, ProgressSink};
use crate::router::{ModelPool, RoutingHint};
use sdk::errors::EngineError;

/// Questions asked at most per request
pub const MAX_QUESTIONS: usize = 2;

/// Used when the fast model produces no usable questions
pub const FALLBACK_QUESTIONS: [&str; MAX_QUESTIONS] = [
    "What exactly is being asked, and what would a complete answer contain?",
    "Which constraints, edge cases or risks must the answer take into account?",
];

const QUESTIONS_PROMPT: &str = "You prepare an expert's answer. Write at most two short \
clarifying questions whose answers would most improve the reply to the user's request. \
Reply with exactly one JSON object and nothing else: {\"questions\": [\"...\", \"...\"]}";

const ANSWER_PROMPT: &str = "Answer the question about the user's request in one or two \
sentences. Be concrete and do not address the user.";

/// One answered internal question
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QaExchange {
    pub question: String,
    pub answer: String,
}

/// Result of the self-QA stage
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SelfQaOutcome {
    /// Pre-analysis block for the system context; empty when skipped
    pub analysis_context: String,
    pub exchanges: Vec<QaExchange>,
}

impl SelfQaOutcome {
    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }

    fn from_exchanges(exchanges: Vec<QaExchange>) -> Self {
        if exchanges.is_empty() {
            return Self::default();
        }

        let mut context = String::from("Internal pre-analysis (not shown to the user):");
        for (i, qa) in exchanges.iter().enumerate() {
            context.push_str(&format!("\nQ{n}: {}\nA{n}: {}", qa.question, qa.answer, n = i + 1));
        }

        Self {
            analysis_context: context,
            exchanges,
        }
    }
}

/// Optional clarifying-question pre-pass
pub struct SelfQaStage {
    backend: Arc<dyn Backend>,
    heuristics: Arc<Heuristics>,
    aux_timeout: Duration,
    enabled: bool,
}

impl SelfQaStage {
    pub fn new(
        backend: Arc<dyn Backend>,
        heuristics: Arc<Heuristics>,
        aux_timeout: Duration,
        enabled: bool,
    ) -> Self {
        Self {
            backend,
            heuristics,
            aux_timeout,
            enabled,
        }
    }

    /// Whether a request warrants the pre-pass
    pub fn should_run(&self, request: &RequestText<'_>, hint: &RoutingHint) -> bool {
        self.enabled
            && (self.heuristics.wants_deep_analysis(request)
                || hint.is_high()
                || self.heuristics.is_complex(request))
    }

    /// Run the pre-pass if the request warrants it
    pub async fn maybe_run(
        &self,
        text: &str,
        pool: &ModelPool,
        hint: &RoutingHint,
        progress: &dyn ProgressSink,
    ) -> Result<SelfQaOutcome, EngineError> {
        let request = RequestText::new(text);
        if !self.should_run(&request, hint) {
            debug!("Self-QA not needed");
            return Ok(SelfQaOutcome::default());
        }

        let Some(fast) = pool.fastest() else {
            progress.add_step("Self-QA skipped: no models available", icons::WARN, None);
            return Ok(SelfQaOutcome::default());
        };
        let model = fast.name.as_str();

        progress.add_step(
            &format!("Self-QA: preparing questions with {}", model),
            icons::THINK,
            None,
        );
        let questions = self.questions(model, text, progress).await?;

        let mut exchanges = Vec::with_capacity(questions.len());
        for question in questions {
            progress.ensure_not_cancelled()?;
            let answer = self.answer(model, text, &question).await;
            progress.ensure_not_cancelled()?;

            match answer {
                Some(answer) => {
                    progress.add_step(
                        &format!("Self-QA answered: {}", question),
                        icons::ANSWER,
                        Some(answer.clone()),
                    );
                    exchanges.push(QaExchange { question, answer });
                }
                None => progress.add_step(
                    &format!("Self-QA left unanswered: {}", question),
                    icons::WARN,
                    None,
                ),
            }
        }

        Ok(SelfQaOutcome::from_exchanges(exchanges))
    }

    async fn questions(
        &self,
        model: &str,
        text: &str,
        progress: &dyn ProgressSink,
    ) -> Result<Vec<String>, EngineError> {
        progress.ensure_not_cancelled()?;
        let messages = [Message::system(QUESTIONS_PROMPT), Message::user(text)];
        let result = chat_with_timeout(
            self.backend.as_ref(),
            model,
            &messages,
            &ChatOptions::json(),
            self.aux_timeout,
        )
        .await;
        progress.ensure_not_cancelled()?;

        let parsed = match result {
            Ok(response) => parse_questions(&response.text),
            Err(e) => Err(e.into()),
        };

        Ok(match parsed {
            Ok(questions) => questions,
            Err(e) => {
                warn!("Self-QA question generation failed, using generic questions: {}", e);
                progress.add_step("Self-QA: using generic questions", icons::WARN, None);
                FALLBACK_QUESTIONS.iter().map(|q| q.to_string()).collect()
            }
        })
    }

    async fn answer(&self, model: &str, text: &str, question: &str) -> Option<String> {
        let messages = [
            Message::system(ANSWER_PROMPT),
            Message::user(format!("Request:\n{}\n\nQuestion: {}", text, question)),
        ];
        let options = ChatOptions {
            temperature: Some(0.2),
            json_output: false,
            max_tokens: Some(160),
        };

        match chat_with_timeout(self.backend.as_ref(), model, &messages, &options, self.aux_timeout)
            .await
        {
            Ok(response) => {
                let answer = response.text.trim();
                (!answer.is_empty()).then(|| answer.to_string())
            }
            Err(e) => {
                warn!("Self-QA answer failed for {:?}: {}", question, e);
                None
            }
        }
    }
}

/// Read up to `MAX_QUESTIONS` non-empty questions from model output
pub fn parse_questions(content: &str) -> Result<Vec<String>, EngineError> {
    let value = extract_json_object(content)
        .ok_or_else(|| EngineError::MalformedHintResponse("no JSON object in reply".into()))?;

    let questions: Vec<String> = value
        .get("questions")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|q| !q.is_empty())
                .take(MAX_QUESTIONS)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    if questions.is_empty() {
        return Err(EngineError::MalformedHintResponse(
            "reply contains no questions".into(),
        ));
    }
    Ok(questions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::Complexity;

    #[test]
    fn test_parse_questions_caps_at_two() {
        let questions =
            parse_questions(r#"{"questions": ["Which DB?", "  ", "Which auth?", "Which cloud?"]}"#)
                .unwrap();
        assert_eq!(questions, vec!["Which DB?", "Which auth?"]);
    }

    #[test]
    fn test_parse_questions_rejects_empty_or_garbage() {
        assert!(parse_questions(r#"{"questions": []}"#).is_err());
        assert!(parse_questions(r#"{"questions": "Which DB?"}"#).is_err());
        assert!(parse_questions("Here are my questions: which DB?").is_err());
    }

    #[test]
    fn test_context_block_numbers_exchanges() {
        let outcome = SelfQaOutcome::from_exchanges(vec![
            QaExchange {
                question: "Which DB?".into(),
                answer: "Postgres.".into(),
            },
            QaExchange {
                question: "Which auth?".into(),
                answer: "OAuth2.".into(),
            },
        ]);
        assert!(outcome.analysis_context.starts_with("Internal pre-analysis"));
        assert!(outcome.analysis_context.contains("Q2: Which auth?\nA2: OAuth2."));
        assert!(SelfQaOutcome::from_exchanges(Vec::new()).analysis_context.is_empty());
    }

    #[test]
    fn test_gating() {
        struct Never;

        #[async_trait::async_trait]
        impl Backend for Never {
            fn name(&self) -> &str {
                "never"
            }

            async fn chat(
                &self,
                _model: &str,
                _messages: &[Message],
                _options: &ChatOptions,
            ) -> crate::llm::Result<crate::llm::ChatResponse> {
                Err(crate::llm::BackendError::Timeout)
            }

            async fn list_models(&self) -> Vec<crate::llm::ModelInfo> {
                Vec::new()
            }
        }

        let stage = SelfQaStage::new(
            Arc::new(Never),
            Arc::new(Heuristics::default()),
            Duration::from_secs(1),
            true,
        );
        let simple = RoutingHint::default();
        let high = RoutingHint {
            complexity: Complexity::High,
            ..RoutingHint::default()
        };

        assert!(!stage.should_run(&RequestText::new("tell me a joke"), &simple));
        assert!(stage.should_run(&RequestText::new("tell me a joke"), &high));
        assert!(stage.should_run(&RequestText::new("Check this thoroughly"), &simple));

        let disabled = SelfQaStage::new(
            Arc::new(Never),
            Arc::new(Heuristics::default()),
            Duration::from_secs(1),
            false,
        );
        assert!(!disabled.should_run(&RequestText::new("Check this thoroughly"), &high));
    }
}
