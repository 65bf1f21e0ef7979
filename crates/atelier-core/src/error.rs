//! Unified error types for Atelier

use thiserror::Error;

/// Unified error type for all Atelier operations
#[derive(Error, Debug)]
pub enum AtelierError {
    // Capability errors
    #[error("capability call failed: {0}")]
    Capability(String),

    #[error("embedding error: {0}")]
    Embedding(String),

    // Run-terminating policy errors
    #[error("topic exhausted after {attempts} attempt(s)")]
    TopicExhausted { attempts: u32 },

    #[error("validation rejected: scored {score:.0}% after {attempts} attempt(s)")]
    ValidationRejected { score: f32, attempts: u32 },

    // Contract errors: driver bugs, never caught and continued
    #[error("lifecycle violation: {0}")]
    Lifecycle(String),

    // Collaborator errors
    #[error("render error: {0}")]
    Render(String),

    #[error("publish error: {0}")]
    Publish(String),

    // Configuration errors
    #[error("config error: {0}")]
    Config(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(String),
}

impl AtelierError {
    /// True for errors that abort the run as a policy decision rather
    /// than an unexpected failure.
    pub fn is_policy_abort(&self) -> bool {
        matches!(
            self,
            AtelierError::TopicExhausted { .. } | AtelierError::ValidationRejected { .. }
        )
    }

    /// Abort reason recorded in the run status and trace.
    pub fn abort_reason(&self) -> String {
        match self {
            AtelierError::TopicExhausted { .. } => "topic_exhausted".to_string(),
            AtelierError::ValidationRejected { .. } => "validation_failed".to_string(),
            other => other.to_string(),
        }
    }
}

/// Result type alias using AtelierError
pub type Result<T> = std::result::Result<T, AtelierError>;
