//! Switchyard Engine Library
//!
//! Adaptive request dispatch: classify a request, route it to one of two
//! conversation branches, pick a model from the backend's pool, and expose a
//! cancellable progress feed while the request runs. Used by the `switchyard`
//! binary and the integration tests.

/// Configuration management module
pub mod config;

/// Inference backend abstraction layer
pub mod llm;

/// Keyword heuristics shared by classification and routing
pub mod heuristics;

/// Task classification module
pub mod classifier;

/// Per-branch conversation memory
pub mod memory;

/// Model selection pipeline
pub mod router;

/// Clarifying-question pre-pass
pub mod self_qa;

/// Per-request progress records and cancellation
pub mod progress;

/// Request pipeline composition
pub mod dispatcher;

/// Telemetry and Observability
pub mod telemetry;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
