//! # Passepartout - Metadata-driven Photo Decoration
//!
//! Passepartout frames photos through declarative pipelines. A pipeline is an
//! ordered list of stages; each stage names a registered processor and carries
//! its parameters. Stages pass a buffer of images along, so a pipeline can
//! trim a photo, pad it to an aspect ratio, render an EXIF-driven footer and
//! drop a shadow in one run.
//!
//! ## Features
//!
//! - **Declarative Pipelines**: Stages are plain JSON, loadable with [`load_pipeline`](core::types::load_pipeline)
//! - **Three Processor Kinds**: Filters map images one to one, generators append, mergers collapse the buffer
//! - **Metadata Templates**: Photo metadata travels with every stage for text blocks and ratios
//! - **Batch Runs**: Whole directories processed on a worker pool with progress events
//! - **Extensible**: Add processors through the [`Processor`](core::node::Processor) trait
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use passepartout::prelude::*;
//!
//! let specs = vec![
//!     StageSpec::new("trim"),
//!     StageSpec::new("margin_with_ratio").with("ratio", "3:2"),
//!     StageSpec::new("shadow").with("shadow_radius", 20),
//! ];
//!
//! let framed = run_pipeline(specs, Some("photo.jpg".as_ref()), Some("framed.jpg".as_ref()))?;
//! ```
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`core`]: Parameter values, the processor trait, the pipeline context and errors
//! - [`execution`]: The pipeline executor and the batch driver
//! - [`filters`]: Processor registry and built-in processors
//!
//! ## Creating Custom Processors
//!
//! ```rust,ignore
//! use passepartout::prelude::*;
//!
//! struct Invert;
//!
//! impl Processor for Invert {
//!     fn metadata(&self) -> ProcessorMetadata {
//!         ProcessorMetadata::builder("invert", "Invert")
//!             .description("Invert every color channel")
//!             .category(Category::Filter)
//!             .build()
//!     }
//!
//!     fn process(&self, ctx: &mut PipelineContext) -> Result<(), ExecutionError> {
//!         let images = ctx
//!             .buffer()?
//!             .iter()
//!             .map(|img| {
//!                 let mut out = (**img).clone();
//!                 out.invert();
//!                 std::sync::Arc::new(out)
//!             })
//!             .collect();
//!         ctx.commit(images)
//!     }
//! }
//!
//! let mut registry = ProcessorRegistry::with_builtins();
//! registry.register(|| Box::new(Invert));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod core;
pub mod execution;
pub mod filters;

/// Prelude module for convenient imports.
///
/// Import everything commonly needed with:
/// ```rust,ignore
/// use passepartout::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use crate::core::types::{
        load_pipeline, Alignment, Color, Direction, Easing, ImageRef, ParamEnum, Params, StageSpec, Value,
    };

    // Processor traits and types
    pub use crate::core::node::{Category, ParameterDefinition, Processor, ProcessorMetadata};

    // Context
    pub use crate::core::context::{BufferSource, PipelineContext, StageStatus};

    // Errors
    pub use crate::core::error::{BatchError, ConfigError, ExecutionError, PassepartoutError, RegistryError};

    // Configuration and metadata
    pub use crate::core::config::EngineConfig;
    pub use crate::core::metadata::{ExifTool, Metadata, MetadataProvider, NoMetadata, StaticMetadata};

    // Execution
    pub use crate::execution::engine::{run_pipeline, ExecutionOptions, ExecutionStats, PipelineExecutor, PipelineJob, PipelineOutput};
    pub use crate::execution::batch::{collect_items, BatchItem, BatchProcessor, BatchReport, PipelineTemplate, StaticTemplate};
    pub use crate::execution::progress::{BatchEvent, BatchProgress};

    // Registry
    pub use crate::filters::registry::{ProcessorFactory, ProcessorRegistry};

    // Built-in processors
    pub use crate::filters::builtin::{
        // Filters
        Blur, Resize, Trim, Margin, MarginWithRatio, Watermark, WatermarkWithTimestamp, Shadow, RoundedCorner,
        // Generators
        SolidColor, GradientColor, RichText, MultiRichText, ImageLoader,
        // Mergers
        Concat, AlignmentMerger,
    };
}

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name.
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::prelude::*;
    use image::GenericImageView;

    #[test]
    fn test_version() {
        assert!(!super::VERSION.is_empty());
        assert_eq!(super::NAME, "passepartout");
    }

    #[test]
    fn test_registry_with_builtins() {
        let registry = ProcessorRegistry::with_builtins();

        assert!(registry.contains("trim"));
        assert!(registry.contains("margin_with_ratio"));
        assert!(registry.contains("watermark"));
        assert!(registry.contains("multi_rich_text"));
        assert!(registry.contains("concat"));
        assert!(!registry.contains("load_image"));
    }

    #[test]
    fn test_basic_pipeline() {
        let specs = vec![StageSpec::new("solid_color")
            .with("width", 8)
            .with("height", 4)
            .with("color", "red")];

        let image = run_pipeline(specs, None, None).unwrap();
        assert_eq!(image.dimensions(), (8, 4));
        assert_eq!(image.get_pixel(0, 0), image::Rgba([255, 0, 0, 255]));
    }
}
