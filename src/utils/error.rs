//! Error types for Playdeck
//!
//! This module defines custom error types used throughout the crate.
//! We use thiserror for convenient error type definitions and anyhow for
//! application-level error handling in the demo binary.

use thiserror::Error;

/// Main error type for Playdeck
#[derive(Error, Debug)]
pub enum PlaydeckError {
    /// Engine session errors (prepare failures, bad media sources)
    #[error("Engine error: {0}")]
    Engine(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Command dispatch errors (service worker gone, channel closed)
    #[error("Dispatch error: {0}")]
    Dispatch(String),

    /// Invalid input errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// File I/O errors
    #[error("File error: {0}")]
    FileIO(#[from] std::io::Error),

    /// Generic error for unexpected situations
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience type alias for Results in Playdeck
pub type Result<T> = std::result::Result<T, PlaydeckError>;

/// Extension trait for converting other errors to PlaydeckError
pub trait IntoPlaydeckError<T> {
    /// Convert this error into a PlaydeckError with the given context
    fn engine_err(self, context: &str) -> Result<T>;
    fn config_err(self, context: &str) -> Result<T>;
    fn dispatch_err(self, context: &str) -> Result<T>;
}

impl<T, E: std::fmt::Display> IntoPlaydeckError<T> for std::result::Result<T, E> {
    fn engine_err(self, context: &str) -> Result<T> {
        self.map_err(|e| PlaydeckError::Engine(format!("{}: {}", context, e)))
    }

    fn config_err(self, context: &str) -> Result<T> {
        self.map_err(|e| PlaydeckError::Config(format!("{}: {}", context, e)))
    }

    fn dispatch_err(self, context: &str) -> Result<T> {
        self.map_err(|e| PlaydeckError::Dispatch(format!("{}: {}", context, e)))
    }
}
