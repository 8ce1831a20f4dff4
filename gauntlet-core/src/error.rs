//! Error types for the Gauntlet evaluation engine.
//!
//! Uses `thiserror` for public API error types with structured variants
//! covering the completion engine, configuration, and coordinator domains.
//! Transient trial failures are deliberately NOT errors: they are absorbed
//! into failed `TrialResult` entries so batch denominators stay accurate.

use std::path::PathBuf;

/// Top-level error type for the Gauntlet core library.
#[derive(Debug, thiserror::Error)]
pub enum GauntletError {
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Coordinator error: {0}")]
    Coordinator(#[from] CoordinatorError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from completion engine interactions.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("API request failed: {message}")]
    ApiRequest { message: String },

    #[error("API response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Engine connection failed: {message}")]
    Connection { message: String },

    #[error("Authentication failed for engine {engine}")]
    AuthFailed { engine: String },

    #[error("Engine '{model}' failed its health check")]
    Unavailable { model: String },
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

/// Errors from the progressive tier coordinator.
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("A progressive run is already active")]
    AlreadyActive,

    #[error("Tier plan is empty; nothing to execute")]
    EmptyTierPlan,

    #[error("Publishing tier {tier} failed: {message}")]
    PublishFailed { tier: String, message: String },

    #[error("Run was stopped before completion")]
    Stopped,
}

/// A type alias for results using the top-level `GauntletError`.
pub type Result<T> = std::result::Result<T, GauntletError>;
