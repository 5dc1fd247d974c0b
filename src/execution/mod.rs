//! Execution module.
//!
//! Runs pipelines: the single-photo executor and the concurrent batch driver.

pub mod engine;
pub mod batch;
pub mod progress;

pub use engine::{run_pipeline, ExecutionOptions, PipelineExecutor, PipelineJob, PipelineOutput};
pub use batch::{collect_items, BatchItem, BatchProcessor, BatchReport, PipelineTemplate, StaticTemplate};
pub use progress::{BatchEvent, BatchProgress};
