// src/error.rs

//! Unified error handling for the crawl orchestrator.

use std::fmt;

use thiserror::Error;

/// Result type alias for crawler operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization failed
    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// CSS selector parsing failed
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Session crashed or became unresponsive mid-task
    #[error("Transient session error: {0}")]
    SessionTransient(String),

    /// An expected page state never appeared within the timeout
    #[error("Timed out after {waited_ms}ms waiting for {what}")]
    ElementTimeout { what: String, waited_ms: u64 },

    /// A filter control required by the task is structurally absent
    #[error("Filter control '{control}' is not available on this site")]
    FilterUnavailable { control: String },

    /// A scraped row cannot be mapped to the unified schema
    #[error("Record shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Checkpoint could not be read or written
    #[error("Checkpoint I/O error: {0}")]
    CheckpointIo(String),
}

impl AppError {
    /// Create a selector parsing error.
    pub fn selector(selector: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a transient session error.
    pub fn session(message: impl fmt::Display) -> Self {
        Self::SessionTransient(message.to_string())
    }

    /// Create an element timeout error.
    pub fn timeout(what: impl Into<String>, waited_ms: u64) -> Self {
        Self::ElementTimeout {
            what: what.into(),
            waited_ms,
        }
    }

    /// Create a filter-unavailable error.
    pub fn filter_unavailable(control: impl Into<String>) -> Self {
        Self::FilterUnavailable {
            control: control.into(),
        }
    }

    /// Create a shape mismatch error.
    pub fn shape(message: impl Into<String>) -> Self {
        Self::ShapeMismatch(message.into())
    }

    /// Create a checkpoint I/O error.
    pub fn checkpoint(message: impl fmt::Display) -> Self {
        Self::CheckpointIo(message.to_string())
    }
}
