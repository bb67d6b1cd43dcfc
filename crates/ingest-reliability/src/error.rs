//! Error types shared across the controller

use uuid::Uuid;

/// Error type for queue collaborator operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum QueueError {
    /// Task not found (or not held by the calling worker)
    #[error("task not found: {0}")]
    TaskNotFound(Uuid),

    /// Backend could not be reached
    #[error("queue unavailable: {0}")]
    Unavailable(String),

    /// Any other backend failure
    #[error("queue backend error: {0}")]
    Backend(String),
}

/// Error type for resource and service health collaborators
#[derive(Debug, Clone, thiserror::Error)]
pub enum CollaboratorError {
    /// Signal could not be sampled
    #[error("health signal unavailable: {0}")]
    Unavailable(String),
}

/// Errors from controller lifecycle operations
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    /// Controller already running
    #[error("reliability controller is already running")]
    AlreadyRunning,

    /// Controller not running
    #[error("reliability controller is not running")]
    NotRunning,

    /// Queue error surfaced by a direct call
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),
}

/// Configuration loading errors
///
/// Never returned to callers of [`crate::ControllerConfig::load`]; loading
/// logs these and falls back to defaults.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// Config file was not valid JSON for the schema
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// Environment variable held an unparseable value
    #[error("invalid value for {key}: {value:?}")]
    InvalidEnv { key: String, value: String },
}
