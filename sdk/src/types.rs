//! Transport-facing types
//!
//! These are the shapes a transport layer hands back to its callers when they
//! poll a request or ask about a conversation branch. They carry no behaviour
//! beyond (de)serialization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the two independent conversational routes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Branch {
    /// Search, code, analysis and planning requests
    Analytical,

    /// Chat, writing and perceptual requests
    Creative,
}

impl Branch {
    /// Both branches, in a fixed order
    pub const ALL: [Branch; 2] = [Branch::Analytical, Branch::Creative];

    /// Short tag used in logs and turn metadata
    pub fn tag(&self) -> &'static str {
        match self {
            Branch::Analytical => "analytical",
            Branch::Creative => "creative",
        }
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Branch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "analytical" | "a" => Ok(Branch::Analytical),
            "creative" | "b" => Ok(Branch::Creative),
            other => Err(format!("unknown branch '{}'", other)),
        }
    }
}

/// A single progress step reported by a running request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressStep {
    /// Human-readable step text
    pub text: String,

    /// Short icon shown next to the step
    pub icon: String,

    /// When the step was recorded
    pub timestamp: DateTime<Utc>,

    /// Optional extra detail (model names, parsed hints, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Result of polling a request's progress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// False when the request id is unknown or already evicted
    pub exists: bool,

    /// Steps with index >= the requested `since` index
    pub steps: Vec<ProgressStep>,

    /// Index to pass as `since` on the next poll
    pub next_index: usize,

    /// The request finished (successfully, with an error, or cancelled)
    pub done: bool,

    /// The request was cancelled
    pub cancelled: bool,

    /// Model currently serving the request, once chosen
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_model: Option<String>,

    /// Last mutation time of the record
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ProgressSnapshot {
    /// Snapshot returned for an unknown request id
    ///
    /// Reports the request as finished and cancelled so a poller stops
    /// without special-casing disappearance.
    pub fn missing(since: usize) -> Self {
        Self {
            exists: false,
            steps: Vec::new(),
            next_index: since,
            done: true,
            cancelled: true,
            active_model: None,
            updated_at: None,
        }
    }
}

/// Summary of one conversation branch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchStatus {
    /// Branch being described
    pub branch: Branch,

    /// Number of stored turns (always even)
    pub turns: usize,

    /// Number of stored user/assistant pairs
    pub pairs: usize,

    /// Maximum number of pairs kept before eviction
    pub capacity_pairs: usize,

    /// Model that produced the most recent assistant turn
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_model: Option<String>,

    /// Timestamp of the most recent turn
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_activity: Option<DateTime<Utc>>,
}
