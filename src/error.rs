use thiserror::Error;

/// Main error type for Automation Inspector
#[derive(Error, Debug)]
pub enum InspectorError {
    /// HTTP transport errors (connect, timeout, body read)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON (de)serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML (de)serialization errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    /// File system / socket I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Platform API answered with an unusable status or payload
    #[error("Platform API error: {0}")]
    Platform(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Graph build errors
    #[error("Build error: {0}")]
    Build(String),
}

/// Convenient Result type using InspectorError
pub type Result<T> = std::result::Result<T, InspectorError>;
