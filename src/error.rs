//! Error handling for the analysis crate
//!
//! Each layer has its own error enum. `AnalysisError` wraps them all for
//! callers that cross layer boundaries, together with a `Result` alias and a
//! `ResultExt` trait for adding context.

use crate::filter::FilterError;
use crate::pipeline::error::PipelineError;
use crate::serialize::{MigrationError, SchemaError};
use thiserror::Error;

/// Main error type for analysis operations
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Filter error: {0}")]
    Filter(#[from] FilterError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Migration error: {0}")]
    Migration(#[from] MigrationError),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<AnalysisError>,
    },
}

impl AnalysisError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        AnalysisError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

/// Result type alias for analysis operations
pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<AnalysisError>,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.into().with_context(f()))
    }
}
