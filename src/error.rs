//! Error handling for the in-situ pipeline
//!
//! This module defines the crate-level error type and a Result alias used
//! outside the pipeline core (configuration, binary entry point).

use crate::pipeline::PipelineError;
use thiserror::Error;

/// Main error type for insitu-rs operations
#[derive(Error, Debug)]
pub enum InsituError {
    /// Errors raised by the pipeline core
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<InsituError>,
    },
}

impl InsituError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        InsituError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

/// Result type alias for insitu-rs operations
pub type Result<T> = std::result::Result<T, InsituError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}
