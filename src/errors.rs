//! Typed error hierarchy for the Verso orchestrator.
//!
//! Two top-level enums cover the two subsystems:
//! - `CompletionError`: provider call failures, split into transient and
//!   context-length classes so the caller can react differently to each
//! - `WorkflowError`: step execution and persistence failures

use thiserror::Error;

/// Errors from the completion provider.
#[derive(Debug, Error)]
pub enum CompletionError {
    /// The request exceeded the model's context window. The context window
    /// manager prunes the conversation and retries once on this variant.
    #[error("context length exceeded for model {model}: {message}")]
    ContextLengthExceeded { model: String, message: String },

    /// Network-level failure (connect, timeout, TLS). Retryable.
    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),

    /// Rate limited by the provider. Retryable after a delay.
    #[error("rate limited (HTTP 429): {message}")]
    RateLimited { message: String },

    /// Provider returned a 5xx. Retryable.
    #[error("provider error (HTTP {status}): {message}")]
    Provider { status: u16, message: String },

    /// Provider returned a 4xx other than 429. Permanent.
    #[error("invalid request (HTTP {status}): {message}")]
    InvalidRequest { status: u16, message: String },

    /// Response body did not match the expected shape.
    #[error("malformed provider response: {0}")]
    MalformedResponse(String),

    /// Missing API key or other client misconfiguration. Permanent.
    #[error("configuration error: {0}")]
    Config(String),
}

impl CompletionError {
    /// Whether a retry may succeed without changing the request.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CompletionError::Network(_)
                | CompletionError::RateLimited { .. }
                | CompletionError::Provider { .. }
        )
    }

    /// Whether the conversation must be pruned before retrying.
    pub fn is_context_overflow(&self) -> bool {
        matches!(self, CompletionError::ContextLengthExceeded { .. })
    }
}

/// Errors from the workflow controller and its persistence glue.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("completion call failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: CompletionError,
    },

    #[error("failed to read source document at {path}: {source}")]
    SourceReadFailed {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write artifact at {path}: {source}")]
    ArtifactWriteFailed {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to persist session at {path}: {source}")]
    SessionPersistFailed {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("session file at {path} is corrupt: {message}")]
    SessionCorrupt {
        path: std::path::PathBuf,
        message: String,
    },

    #[error(transparent)]
    Completion(#[from] CompletionError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
