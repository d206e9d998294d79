//! Error types for the fleet agent

use thiserror::Error;

use crate::engine::EngineError;

/// Main error type for the fleet agent
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Container engine error: {0}")]
    EngineError(#[from] EngineError),

    /// Unknown action name or unsupported module subtype/compatibility
    #[error("Not implemented: {0}")]
    NotImplementedAction(String),

    /// Operation requires super-user identity
    #[error("Permission required: {0}")]
    PermissionRequired(String),

    #[error("Compose content unavailable for {0}")]
    ComposeContentUnavailable(String),

    #[error("Control plane error: {0}")]
    ControlPlaneError(String),

    #[error("Command error: {0}")]
    CommandError(String),

    #[error("Command timed out after {0:?}: {1}")]
    CommandTimeout(std::time::Duration, String),

    #[error("Deployment error: {0}")]
    DeployError(String),

    /// At least one action of a resource batch failed, carries the per-action summary
    #[error("Resource actions failed:\n{0}")]
    ResourceActionsFailed(String),

    #[error("Invalid payload: {0}")]
    PayloadError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

