//! Error types for the cachelm domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

use crate::expert::Expert;
use crate::state::StateField;

/// The top-level error type for all cachelm operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Model client errors ---
    #[error("Model invocation failed: {0}")]
    Provider(#[from] ProviderError),

    // --- Routing errors ---
    #[error("Routing error: {0}")]
    Routing(#[from] RoutingError),

    // --- Checkpoint errors ---
    #[error("Checkpoint store error: {0}")]
    Store(#[from] StoreError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Boundary validation ---
    #[error("Validation error: {0}")]
    Validation(String),

    // --- State merging ---
    #[error("Merge conflict on {field}: {expert} was already written this turn")]
    MergeConflict { field: StateField, expert: Expert },

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Shorthand for a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Network error: {0}")]
    Network(String),
}

/// Rejections of model-assisted routing output.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    #[error("router output is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("router output is not a JSON object")]
    NotAnObject,

    #[error("router output has no `tasks` array")]
    MissingTasks,

    #[error("router output contains no usable tasks")]
    NoValidTasks,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Corrupt checkpoint for thread {thread_id}: {reason}")]
    Corrupt { thread_id: String, reason: String },
}
