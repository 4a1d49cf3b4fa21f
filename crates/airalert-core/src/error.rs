//! Error types shared across the Air Alert workspace.

use std::time::Duration;

/// Result alias used by every Air Alert crate.
pub type Result<T> = std::result::Result<T, AirAlertError>;

/// All errors surfaced by Air Alert components.
#[derive(Debug, thiserror::Error)]
pub enum AirAlertError {
    /// A task whose schedule field cannot be mapped onto the recurring clock.
    #[error("Unsupported task kind for '{task}': {reason}")]
    UnsupportedTaskKind { task: String, reason: String },

    /// The first job error seen during the startup pass.
    #[error("Task '{task}' failed during startup: {source}")]
    StartupTaskFailed {
        task: String,
        #[source]
        source: Box<AirAlertError>,
    },

    #[error("Task '{task}' timed out after {ttl:?}")]
    Timeout { task: String, ttl: Duration },

    #[error("Push delivery failed: {0}")]
    DeliveryFailed(String),

    #[error("Lookup failed: {0}")]
    LookupFailed(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl AirAlertError {
    /// Whether this error is the per-task deadline firing.
    pub fn is_timeout(&self) -> bool {
        matches!(self, AirAlertError::Timeout { .. })
    }
}
