//! Processor trait and processor metadata.
//!
//! A processor is one named pipeline stage. Processors are stateless: all
//! per-call state lives in the [`PipelineContext`] handed to
//! [`Processor::process`], so a single instance may be shared across threads.

use crate::core::context::PipelineContext;
use crate::core::error::ExecutionError;
use crate::core::types::Value;
use serde::{Deserialize, Serialize};

/// How a processor treats the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// buffer -> buffer, image by image
    Filter,
    /// parameters -> buffer; the incoming buffer is ignored
    Generator,
    /// buffer[n] -> buffer[1]; receives everything produced since the
    /// previous merger
    Merger,
}

impl Category {
    /// Get the display name for this category.
    pub fn display_name(&self) -> &'static str {
        match self {
            Category::Filter => "Filter",
            Category::Generator => "Generator",
            Category::Merger => "Merger",
        }
    }

    /// Get all categories in display order.
    pub fn all() -> &'static [Category] {
        &[Category::Filter, Category::Generator, Category::Merger]
    }
}

/// Documentation for a single stage parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterDefinition {
    /// Parameter key in the stage specification.
    pub name: String,
    /// Value used when the key is absent.
    pub default: Value,
    /// Human-readable description.
    pub description: String,
}

impl ParameterDefinition {
    /// Create a new parameter definition.
    pub fn new(name: impl Into<String>, default: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            default: default.into(),
            description: String::new(),
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Metadata describing a processor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorMetadata {
    /// Registry key (e.g., "margin_with_ratio")
    pub name: String,
    /// Human-readable name (e.g., "Margin With Ratio")
    pub display_name: String,
    /// Buffer semantics
    pub category: Category,
    /// Detailed description
    pub description: String,
    /// Parameter definitions
    pub parameters: Vec<ParameterDefinition>,
}

impl ProcessorMetadata {
    /// Create a new metadata builder.
    pub fn builder(name: impl Into<String>, display_name: impl Into<String>) -> ProcessorMetadataBuilder {
        ProcessorMetadataBuilder::new(name, display_name)
    }

    /// Get all parameter names.
    pub fn parameter_names(&self) -> Vec<&str> {
        self.parameters.iter().map(|p| p.name.as_str()).collect()
    }

    /// Find a parameter by name.
    pub fn get_parameter(&self, name: &str) -> Option<&ParameterDefinition> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Whether the executor must hand this processor the accumulated history.
    pub fn is_merger(&self) -> bool {
        self.category == Category::Merger
    }
}

/// Builder for ProcessorMetadata.
pub struct ProcessorMetadataBuilder {
    name: String,
    display_name: String,
    category: Category,
    description: String,
    parameters: Vec<ParameterDefinition>,
}

impl ProcessorMetadataBuilder {
    /// Create a new builder with required fields.
    pub fn new(name: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: display_name.into(),
            category: Category::Filter,
            description: String::new(),
            parameters: Vec::new(),
        }
    }

    /// Set the category.
    pub fn category(mut self, category: Category) -> Self {
        self.category = category;
        self
    }

    /// Set the description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Add a parameter.
    pub fn parameter(mut self, param: ParameterDefinition) -> Self {
        self.parameters.push(param);
        self
    }

    /// Build the metadata.
    pub fn build(self) -> ProcessorMetadata {
        ProcessorMetadata {
            name: self.name,
            display_name: self.display_name,
            category: self.category,
            description: self.description,
            parameters: self.parameters,
        }
    }
}

/// The core trait for pipeline stages.
///
/// # Thread Safety
///
/// `Send + Sync` bounds let the batch driver share the registry's processors
/// across worker threads.
///
/// # Example Implementation
///
/// ```ignore
/// struct Invert;
///
/// impl Processor for Invert {
///     fn metadata(&self) -> ProcessorMetadata {
///         ProcessorMetadata::builder("invert", "Invert")
///             .category(Category::Filter)
///             .description("Invert every image in the buffer")
///             .build()
///     }
///
///     fn process(&self, ctx: &mut PipelineContext) -> Result<(), ExecutionError> {
///         let inverted = ctx
///             .buffer()?
///             .iter()
///             .map(|img| {
///                 let mut img = (**img).clone();
///                 img.invert();
///                 Arc::new(img)
///             })
///             .collect();
///         ctx.commit(inverted)
///     }
/// }
/// ```
pub trait Processor: Send + Sync {
    /// Get the metadata for this processor.
    ///
    /// This is called during registration and should return consistent values.
    fn metadata(&self) -> ProcessorMetadata;

    /// Run the stage against its context.
    ///
    /// Reads parameters and the buffer from the context and leaves the stage
    /// output in the context's buffer.
    fn process(&self, ctx: &mut PipelineContext) -> Result<(), ExecutionError>;
}
