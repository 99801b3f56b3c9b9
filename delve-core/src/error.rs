//! Error types for the Delve research core.
//!
//! Uses `thiserror` for public API error types. Only coordinator-level
//! structural errors ever reach a caller as `Err`: query failures and task
//! failures are contained and recorded on the session instead.

use uuid::Uuid;

/// Top-level error type for the Delve core library.
#[derive(Debug, thiserror::Error)]
pub enum DelveError {
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    #[error("Task error: {0}")]
    Task(#[from] TaskError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from session bookkeeping in the lead coordinator.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session not found: {session_id}")]
    NotFound { session_id: Uuid },

    #[error("Invalid session transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Session {session_id} is already {status}")]
    AlreadyTerminal { session_id: Uuid, status: String },

    #[error("Task not found in session: {task_id}")]
    TaskNotFound { task_id: Uuid },
}

/// Errors from a single call to the external search collaborator.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SearchError {
    #[error("Search request failed: {message}")]
    Request { message: String },

    #[error("Search timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Search failed after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
}

/// Errors raised while a worker aggregates its query outcomes.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("Aggregation failed for task {task_id} (queries attempted: {}): {message}", queries.join(" | "))]
    AggregationFailed {
        task_id: Uuid,
        queries: Vec<String>,
        message: String,
    },

    #[error("Worker for task {task_id} crashed: {message}")]
    WorkerCrashed { task_id: Uuid, message: String },
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Configuration load error: {message}")]
    Load { message: String },
}

/// A type alias for results using the top-level `DelveError`.
pub type Result<T> = std::result::Result<T, DelveError>;
