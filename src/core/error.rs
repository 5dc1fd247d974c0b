//! Error types for Passepartout.
//!
//! Uses thiserror for structured errors with context. The split follows how
//! failures are handled:
//! - configuration errors are authoring bugs and abort the pipeline
//! - execution errors belong to one photo and a batch records them per item
//! - batch errors concern the batch driver itself

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for Passepartout.
///
/// This enum encompasses all error categories and enables automatic
/// conversion between specific error types.
#[derive(Error, Debug)]
pub enum PassepartoutError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Batch error: {0}")]
    Batch(#[from] BatchError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors in pipeline specifications or engine configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot parse color {value}: {reason}")]
    InvalidColor { value: String, reason: String },

    #[error("Invalid stage specification: {reason}")]
    InvalidStage { reason: String },

    #[error("Cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Errors from processor lookup.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Processor '{name}' not found")]
    NotFound { name: String },
}

/// Errors raised while running a pipeline.
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Pipeline has no stages")]
    EmptyPipeline,

    #[error("Stage '{stage}' received an empty buffer")]
    EmptyBuffer { stage: String },

    #[error("Invalid parameter '{parameter}' for stage '{stage}': {error}")]
    InvalidParameter {
        stage: String,
        parameter: String,
        error: String,
    },

    #[error("Stage '{stage}' cannot persist pixel format {format}")]
    UnsupportedPixelFormat { stage: String, format: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Cannot load font {path}: {error}")]
    Font { path: String, error: String },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Errors from the batch driver itself (never from a single item).
#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Cannot build worker pool: {0}")]
    WorkerPool(String),

    #[error("Cannot list input directory {path}: {error}")]
    Listing { path: PathBuf, error: String },
}

// ============================================================================
// Error Utilities
// ============================================================================

impl ExecutionError {
    /// Whether this is a specification authoring bug rather than a
    /// per-photo runtime failure.
    pub fn is_configuration_error(&self) -> bool {
        matches!(self, ExecutionError::Config(_) | ExecutionError::Registry(_))
    }

    /// Shorthand for an I/O error tied to a path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ExecutionError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias for Passepartout operations.
pub type PassepartoutResult<T> = Result<T, PassepartoutError>;

/// Result type alias for execution operations.
pub type ExecutionResult<T> = Result<T, ExecutionError>;
