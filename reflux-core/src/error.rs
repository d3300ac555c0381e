//! Error types for the reactive engine.
//!
//! The engine is synchronous and in-memory, so the taxonomy is narrow: every
//! error here is either API misuse or a configuration mistake. Nothing is
//! retried.

use thiserror::Error;

/// Errors reported by the reactive engine.
#[derive(Debug, Error)]
pub enum ReactiveError {
    /// A write was attempted on a computed value built from a getter only.
    #[error("write operation failed: computed value is readonly")]
    ReadOnly,

    /// Effect nesting went deeper than the tracking markers can represent.
    #[error("effect nesting depth {depth} exceeds the supported maximum of {max}")]
    RecursionLimit { depth: u32, max: u32 },

    /// A computed value read itself before its first evaluation finished.
    #[error("computed value was read during its own first evaluation")]
    Cycle,

    /// A runtime configuration value is out of range.
    #[error("invalid runtime configuration: {0}")]
    InvalidConfig(String),

    /// A runtime configuration document could not be parsed.
    #[error("failed to parse runtime configuration")]
    Json(#[from] serde_json::Error),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ReactiveError>;
