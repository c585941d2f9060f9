//! Switchyard SDK
//!
//! Shared error taxonomy and transport-facing types. Used by the engine and by
//! any transport layer that exposes dispatch, progress polling and
//! cancellation to its own callers.

/// Error types and handling
pub mod errors;

/// Progress and branch snapshot types
pub mod types;

// Re-export commonly used types
pub use errors::{EngineError, ErrorExt};
pub use types::{Branch, BranchStatus, ProgressSnapshot, ProgressStep};
