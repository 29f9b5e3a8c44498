//! # Error Types
//!
//! Custom error types for the e-paper server using `thiserror`.

use thiserror::Error;

/// Main error type for the e-paper server
#[derive(Debug, Error)]
pub enum ServerError {
    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration file could not be parsed
    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Settings could not be serialized back to TOML
    #[error("Configuration write error: {0}")]
    ConfigWrite(#[from] toml::ser::Error),

    /// Rejected settings update
    #[error("Settings error: {0}")]
    Settings(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Source image could not be decoded
    #[error("Image decode error: {0}")]
    Image(#[from] image::ImageError),

    /// Remote image source could not be fetched
    #[error("Image fetch error: {0}")]
    Fetch(#[from] reqwest::Error),

    /// Malformed bitmap stream
    #[error("Bitmap error: {0}")]
    Bitmap(String),

    /// Background task failed to complete
    #[error("Task error: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Result type alias for the e-paper server
pub type Result<T> = std::result::Result<T, ServerError>;
