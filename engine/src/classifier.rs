//! Task classifier
//!
//! Maps raw request text to a task tag with ordered keyword rules. The first
//! matching rule wins:
//!
//! 1. Search / information requests (checked first: they read like chat)
//! 2. Explicit command prefixes (`/`, `!`)
//! 3. Code
//! 4. Analysis
//! 5. Planning
//! 6. Creative writing
//! 7. Vision / images
//! 8. Chat (default, also for empty input)
//!
//! The branch follows from the tag alone: every tag belongs to exactly one of
//! `ANALYTICAL_TAGS` and `CREATIVE_TAGS`.

use sdk::types::Branch;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::heuristics::{Heuristics, RequestText};

/// Task type assigned to a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskTag {
    Search,
    Command,
    Code,
    Analysis,
    Planning,
    Creative,
    Vision,
    Chat,
}

/// Tags served by the analytical branch
pub const ANALYTICAL_TAGS: &[TaskTag] = &[
    TaskTag::Search,
    TaskTag::Command,
    TaskTag::Code,
    TaskTag::Analysis,
    TaskTag::Planning,
];

/// Tags served by the creative branch
pub const CREATIVE_TAGS: &[TaskTag] = &[TaskTag::Creative, TaskTag::Vision, TaskTag::Chat];

impl TaskTag {
    /// Branch this tag is routed to
    pub fn branch(self) -> Branch {
        if ANALYTICAL_TAGS.contains(&self) {
            Branch::Analytical
        } else {
            Branch::Creative
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskTag::Search => "search",
            TaskTag::Command => "command",
            TaskTag::Code => "code",
            TaskTag::Analysis => "analysis",
            TaskTag::Planning => "planning",
            TaskTag::Creative => "creative",
            TaskTag::Vision => "vision",
            TaskTag::Chat => "chat",
        }
    }
}

impl fmt::Display for TaskTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rule-based task classifier
#[derive(Debug, Clone)]
pub struct TaskClassifier {
    heuristics: Arc<Heuristics>,
}

impl TaskClassifier {
    pub fn new(heuristics: Arc<Heuristics>) -> Self {
        Self { heuristics }
    }

    /// Classify request text into a task tag
    pub fn classify(&self, text: &str) -> TaskTag {
        let text = RequestText::new(text);
        if text.is_blank() {
            return TaskTag::Chat;
        }

        let h = &self.heuristics;
        let words = text.words();

        if h.search.matches_any(words) {
            TaskTag::Search
        } else if h.is_command(&text) {
            TaskTag::Command
        } else if h.has_code_signals(&text) {
            TaskTag::Code
        } else if h.analysis.matches_any(words) {
            TaskTag::Analysis
        } else if h.planning.matches_any(words) {
            TaskTag::Planning
        } else if h.creative.matches_any(words) {
            TaskTag::Creative
        } else if h.vision.matches_any(words) {
            TaskTag::Vision
        } else {
            TaskTag::Chat
        }
    }
}

impl Default for TaskClassifier {
    fn default() -> Self {
        Self::new(Arc::new(Heuristics::default()))
    }
}
