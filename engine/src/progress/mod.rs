//! Progress tracking
//!
//! A per-request, append-only event log that a worker writes while a request
//! runs and any number of pollers read concurrently. Each record also carries
//! the request's cancellation and completion flags.
//!
//! # Concurrency
//!
//! One mutex guards the whole record table. Every critical section is pure
//! data mutation: no backend calls, no I/O, no awaits. Lock hold time stays
//! bounded no matter how long a backend call takes.
//!
//! # Cancellation
//!
//! Cancellation is cooperative. `cancel` only sets a flag; the worker observes
//! it at its next `ensure_not_cancelled` check point, which it runs before and
//! after every backend call. A worker blocked inside a backend call finishes
//! that call first. In-flight calls are never killed.

use chrono::{DateTime, Utc};
use sdk::errors::EngineError;
use sdk::types::{ProgressSnapshot, ProgressStep};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

/// Icons used for progress steps
pub mod icons {
    pub const START: &str = "🚀";
    pub const CLASSIFY: &str = "🏷️";
    pub const MODELS: &str = "📋";
    pub const ROUTER: &str = "🧭";
    pub const GUARD: &str = "🛡️";
    pub const MODEL: &str = "🤖";
    pub const UPGRADE: &str = "⬆️";
    pub const DOWNGRADE: &str = "⬇️";
    pub const WARN: &str = "⚠️";
    pub const THINK: &str = "🤔";
    pub const ANSWER: &str = "💬";
    pub const DONE: &str = "✅";
    pub const FAILED: &str = "❌";
    pub const CANCELLED: &str = "🛑";
}

/// Progress record of one request
#[derive(Debug, Clone)]
pub struct ProgressRecord {
    pub request_id: String,
    pub steps: Vec<ProgressStep>,
    pub active_model: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub done: bool,
    pub cancelled: bool,
    touched: Instant,
}

impl ProgressRecord {
    fn new(request_id: &str) -> Self {
        Self {
            request_id: request_id.to_string(),
            steps: Vec::new(),
            active_model: None,
            updated_at: Utc::now(),
            done: false,
            cancelled: false,
            touched: Instant::now(),
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
        self.touched = Instant::now();
    }

    fn push(&mut self, text: &str, icon: &str, details: Option<String>) {
        self.steps.push(ProgressStep {
            text: text.to_string(),
            icon: icon.to_string(),
            timestamp: Utc::now(),
            details,
        });
        self.touch();
    }
}

/// Thread-safe table of progress records keyed by request id
#[derive(Debug, Default)]
pub struct ProgressTracker {
    records: Mutex<HashMap<String, ProgressRecord>>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    // Every critical section leaves the table consistent, so a poisoned lock
    // still guards valid data.
    fn table(&self) -> MutexGuard<'_, HashMap<String, ProgressRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_record<R>(&self, request_id: &str, f: impl FnOnce(&mut ProgressRecord) -> R) -> Option<R> {
        self.table().get_mut(request_id).map(f)
    }

    /// Create a fresh record, replacing any record with the same id
    pub fn init(&self, request_id: &str) {
        self.table()
            .insert(request_id.to_string(), ProgressRecord::new(request_id));
    }

    /// Append a step. Unknown ids are ignored.
    pub fn add_step(&self, request_id: &str, text: &str, icon: &str, details: Option<String>) {
        if self
            .with_record(request_id, |r| r.push(text, icon, details))
            .is_none()
        {
            debug!("Dropping late progress step for {}: {}", request_id, text);
        }
    }

    pub fn set_active_model(&self, request_id: &str, model: &str) {
        self.with_record(request_id, |r| {
            r.active_model = Some(model.to_string());
            r.touch();
        });
    }

    pub fn mark_done(&self, request_id: &str) {
        self.with_record(request_id, |r| {
            r.done = true;
            r.touch();
        });
    }

    /// Set the cancellation flag. Returns false for unknown ids.
    ///
    /// Does not stop the worker; it makes later `ensure_not_cancelled` calls
    /// fail.
    pub fn cancel(&self, request_id: &str) -> bool {
        self.with_record(request_id, |r| {
            r.cancelled = true;
            r.touch();
        })
        .is_some()
    }

    pub fn is_cancelled(&self, request_id: &str) -> bool {
        self.with_record(request_id, |r| r.cancelled).unwrap_or(false)
    }

    /// Fail with `EngineError::Cancelled` if the request was cancelled
    ///
    /// Requests without a record are not tracked and never count as
    /// cancelled here.
    pub fn ensure_not_cancelled(&self, request_id: &str) -> Result<(), EngineError> {
        if self.is_cancelled(request_id) {
            Err(EngineError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Record the cancelled completion of a request
    ///
    /// Appends one cancellation step and sets `cancelled` and `done`. Only the
    /// first call on a running record has an effect; it returns true.
    pub fn finish_cancelled(&self, request_id: &str) -> bool {
        self.with_record(request_id, |r| {
            if r.done {
                return false;
            }
            r.cancelled = true;
            r.done = true;
            r.push("Cancelled", icons::CANCELLED, None);
            true
        })
        .unwrap_or(false)
    }

    /// Steps with index >= `since`, plus the flags a poller needs
    pub fn get(&self, request_id: &str, since: usize) -> ProgressSnapshot {
        let table = self.table();
        let Some(record) = table.get(request_id) else {
            return ProgressSnapshot::missing(since);
        };

        let start = since.min(record.steps.len());
        ProgressSnapshot {
            exists: true,
            steps: record.steps[start..].to_vec(),
            next_index: record.steps.len(),
            done: record.done,
            cancelled: record.cancelled,
            active_model: record.active_model.clone(),
            updated_at: Some(record.updated_at),
        }
    }

    /// Drop one record. Returns true if it existed.
    pub fn remove(&self, request_id: &str) -> bool {
        self.table().remove(request_id).is_some()
    }

    /// Evict finished records untouched for longer than `retention`
    ///
    /// Running records are never evicted. Returns the number removed.
    pub fn prune(&self, retention: Duration) -> usize {
        let mut table = self.table();
        let before = table.len();
        table.retain(|_, r| !(r.done && r.touched.elapsed() >= retention));
        let removed = before - table.len();
        if removed > 0 {
            debug!("Evicted {} finished progress records", removed);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.table().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table().is_empty()
    }
}

/// Where pipeline stages report progress and check for cancellation
pub trait ProgressSink: Send + Sync {
    fn add_step(&self, text: &str, icon: &str, details: Option<String>);

    fn set_active_model(&self, model: &str);

    fn ensure_not_cancelled(&self) -> Result<(), EngineError>;
}

/// A `ProgressSink` bound to one request of a shared tracker
#[derive(Debug, Clone)]
pub struct RequestProgress {
    tracker: Arc<ProgressTracker>,
    request_id: String,
}

impl RequestProgress {
    pub fn new(tracker: Arc<ProgressTracker>, request_id: impl Into<String>) -> Self {
        Self {
            tracker,
            request_id: request_id.into(),
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }
}

impl ProgressSink for RequestProgress {
    fn add_step(&self, text: &str, icon: &str, details: Option<String>) {
        self.tracker.add_step(&self.request_id, text, icon, details);
    }

    fn set_active_model(&self, model: &str) {
        self.tracker.set_active_model(&self.request_id, model);
    }

    fn ensure_not_cancelled(&self) -> Result<(), EngineError> {
        self.tracker.ensure_not_cancelled(&self.request_id)
    }
}
