//! Conversation memory
//!
//! Two independent bounded conversation logs, one per branch. Turns are only
//! ever stored as complete user/assistant pairs: `append` takes both halves
//! and writes them under one lock, and on overflow the oldest pair is evicted
//! as a unit. A reader therefore never observes a user turn without its
//! assistant reply.
//!
//! Callers that produce the user half before the reply exists use
//! `begin`, which returns a `PendingExchange`. Nothing is written until the
//! exchange is committed; dropping it (on failure or cancellation) leaves the
//! history untouched.
//!
//! History lives for the lifetime of the process and is never persisted.

use chrono::{DateTime, Utc};
use sdk::types::{Branch, BranchStatus};
use std::collections::VecDeque;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, warn};

use crate::config::MemoryConfig;
use crate::llm::{Message, MessageRole};

/// One stored turn. Immutable once appended.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationTurn {
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub request_id: String,
    pub branch: Branch,
    pub model_used: Option<String>,
}

impl ConversationTurn {
    /// Create a user turn
    pub fn user(branch: Branch, request_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            timestamp: Utc::now(),
            request_id: request_id.into(),
            branch,
            model_used: None,
        }
    }

    /// Create an assistant turn
    pub fn assistant(
        branch: Branch,
        request_id: impl Into<String>,
        content: impl Into<String>,
        model_used: Option<String>,
    ) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
            request_id: request_id.into(),
            branch,
            model_used,
        }
    }

    /// Convert into a chat message for the backend
    pub fn to_message(&self) -> Message {
        Message {
            role: self.role,
            content: self.content.clone(),
        }
    }
}

/// Bounded history of one branch
#[derive(Debug, Clone)]
pub struct BranchHistory {
    turns: VecDeque<ConversationTurn>,
    max_pairs: usize,
}

impl BranchHistory {
    pub fn new(max_pairs: usize) -> Self {
        let max_pairs = max_pairs.max(1);
        Self {
            turns: VecDeque::with_capacity(max_pairs * 2),
            max_pairs,
        }
    }

    /// Append a pair, evicting the oldest pairs beyond capacity
    fn push_pair(&mut self, user: ConversationTurn, assistant: ConversationTurn) {
        self.turns.push_back(user);
        self.turns.push_back(assistant);

        while self.turns.len() > self.max_pairs * 2 {
            self.turns.pop_front();
            self.turns.pop_front();
        }
    }

    /// Most recent `limit` turns in insertion order
    pub fn recent(&self, limit: usize) -> Vec<ConversationTurn> {
        let skip = self.turns.len().saturating_sub(limit);
        self.turns.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn max_pairs(&self) -> usize {
        self.max_pairs
    }

    fn clear(&mut self) {
        self.turns.clear();
    }

    fn status(&self, branch: Branch) -> BranchStatus {
        let last_model = self
            .turns
            .iter()
            .rev()
            .find(|t| t.role == MessageRole::Assistant)
            .and_then(|t| t.model_used.clone());

        BranchStatus {
            branch,
            turns: self.turns.len(),
            pairs: self.turns.len() / 2,
            capacity_pairs: self.max_pairs,
            last_model,
            last_activity: self.turns.back().map(|t| t.timestamp),
        }
    }
}

/// Both branch histories
#[derive(Debug)]
pub struct ConversationMemory {
    analytical: RwLock<BranchHistory>,
    creative: RwLock<BranchHistory>,
    max_turn_chars: usize,
}

impl ConversationMemory {
    /// Create memory keeping at most `max_pairs` pairs per branch
    pub fn new(max_pairs: usize, max_turn_chars: usize) -> Self {
        Self {
            analytical: RwLock::new(BranchHistory::new(max_pairs)),
            creative: RwLock::new(BranchHistory::new(max_pairs)),
            max_turn_chars: max_turn_chars.max(1),
        }
    }

    pub fn from_config(config: &MemoryConfig) -> Self {
        Self::new(config.max_pairs, config.max_turn_chars)
    }

    fn slot(&self, branch: Branch) -> &RwLock<BranchHistory> {
        match branch {
            Branch::Analytical => &self.analytical,
            Branch::Creative => &self.creative,
        }
    }

    // Critical sections never leave a history half-written, so a poisoned
    // lock still guards consistent data.
    fn read(&self, branch: Branch) -> RwLockReadGuard<'_, BranchHistory> {
        self.slot(branch).read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self, branch: Branch) -> RwLockWriteGuard<'_, BranchHistory> {
        self.slot(branch).write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Most recent `limit` turns of a branch, oldest first
    pub fn history_for(&self, branch: Branch, limit: usize) -> Vec<ConversationTurn> {
        self.read(branch).recent(limit)
    }

    /// Append a complete exchange to a branch
    ///
    /// Both turns are written under one lock. A pair with the wrong roles or
    /// a mismatched branch is dropped with a warning rather than stored.
    pub fn append(&self, branch: Branch, user: ConversationTurn, assistant: ConversationTurn) {
        if user.role != MessageRole::User || assistant.role != MessageRole::Assistant {
            warn!(
                "Dropping exchange for {} branch: expected user/assistant roles, got {}/{}",
                branch, user.role, assistant.role
            );
            return;
        }
        if user.branch != branch || assistant.branch != branch {
            warn!("Dropping exchange tagged for another branch than {}", branch);
            return;
        }

        let user = self.bounded(user);
        let assistant = self.bounded(assistant);

        let mut history = self.write(branch);
        history.push_pair(user, assistant);
        debug!("{} branch now holds {} turns", branch, history.len());
    }

    /// Start an exchange whose reply does not exist yet
    pub fn begin(
        &self,
        branch: Branch,
        request_id: impl Into<String>,
        user_text: impl Into<String>,
    ) -> PendingExchange<'_> {
        PendingExchange {
            memory: self,
            user: Some(ConversationTurn::user(branch, request_id, user_text)),
        }
    }

    /// Clear one branch, or both when `branch` is `None`
    pub fn clear(&self, branch: Option<Branch>) {
        match branch {
            Some(branch) => self.write(branch).clear(),
            None => {
                for branch in Branch::ALL {
                    self.write(branch).clear();
                }
            }
        }
    }

    /// Number of stored turns in a branch
    pub fn len(&self, branch: Branch) -> usize {
        self.read(branch).len()
    }

    pub fn status(&self, branch: Branch) -> BranchStatus {
        self.read(branch).status(branch)
    }

    fn bounded(&self, mut turn: ConversationTurn) -> ConversationTurn {
        turn.content = truncate_chars(&turn.content, self.max_turn_chars);
        turn
    }
}

/// The user half of an exchange, waiting for its reply
///
/// Nothing is stored until `commit`. Dropping the exchange discards it.
#[derive(Debug)]
pub struct PendingExchange<'a> {
    memory: &'a ConversationMemory,
    user: Option<ConversationTurn>,
}

impl PendingExchange<'_> {
    /// Store the user turn together with its reply
    pub fn commit(mut self, assistant_text: impl Into<String>, model_used: Option<String>) {
        if let Some(user) = self.user.take() {
            let assistant = ConversationTurn::assistant(
                user.branch,
                user.request_id.clone(),
                assistant_text,
                model_used,
            );
            self.memory.append(user.branch, user, assistant);
        }
    }
}

impl Drop for PendingExchange<'_> {
    fn drop(&mut self) {
        if let Some(user) = &self.user {
            debug!(
                "Discarding uncommitted exchange {} on {} branch",
                user.request_id, user.branch
            );
        }
    }
}

fn truncate_chars(content: &str, max_chars: usize) -> String {
    match content.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => content[..byte_idx].to_string(),
        None => content.to_string(),
    }
}
