//! Core types and traits for the Passepartout pipeline engine.
//!
//! This module contains the foundational pieces every stage touches:
//! - Parameter values, stage specifications and colors
//! - The processor trait and its metadata
//! - The pipeline context
//! - Photo metadata providers and engine configuration
//! - Error types

pub mod types;
pub mod color;
pub mod error;
pub mod context;
pub mod node;
pub mod metadata;
pub mod config;

// Re-export commonly used types
pub use types::{Alignment, Color, Direction, Easing, ImageRef, ParamEnum, Params, StageSpec, Value};
pub use color::parse_color;
pub use error::{BatchError, ConfigError, ExecutionError, PassepartoutError, RegistryError};
pub use context::{BufferSource, PipelineContext, StageStatus};
pub use node::{Category, Processor, ProcessorMetadata};
pub use metadata::{Metadata, MetadataProvider};
pub use config::EngineConfig;
