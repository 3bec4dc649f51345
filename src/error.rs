//! Error types for Emotion Flux
//!
//! Errors only surface at the crate edges (config loading, record parsing,
//! baseline stores). The engine's per-sample entry points never return them.

use thiserror::Error;

/// Errors that can occur outside the per-sample processing path
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Failed to parse feature record: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid baseline: {0}")]
    InvalidBaseline(String),

    #[error("Baseline load failed: {0}")]
    BaselineLoad(String),

    #[error("Baseline persistence failed: {0}")]
    BaselinePersist(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
