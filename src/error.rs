//! Error types for philoop
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// All error types that can occur while building or driving a pipeline
#[derive(Debug, Error)]
pub enum PhiloopError {
    /// Invalid module spec, duplicate module, or bad loop settings
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A module failed while computing or writing its output
    #[error("Module '{module}' failed: {message}")]
    ModuleExecution { module: String, message: String },

    /// Cross-prediction or phi computation failed
    #[error("Metrics error: {0}")]
    Metrics(String),

    /// Shared store contract failure
    #[error("Store error: {0}")]
    Store(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PhiloopError {
    /// Build a module execution error.
    pub fn module(module: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ModuleExecution {
            module: module.into(),
            message: message.into(),
        }
    }

    /// Message recorded in a cycle's error list.
    ///
    /// Module failures record only their inner message since the module name
    /// is already the first element of the pair.
    pub fn cycle_message(&self) -> String {
        match self {
            Self::ModuleExecution { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Result type alias for philoop operations
pub type Result<T> = std::result::Result<T, PhiloopError>;
