//! Pipeline executor.
//!
//! Runs an ordered list of stage specifications. Filters and generators see
//! the previous stage's output; a merger sees every buffer produced since the
//! previous merger, flattened in order, which lets a specification feed
//! several independent generators into one merger purely by ordering.

use crate::core::config::EngineConfig;
use crate::core::context::{BufferSource, PipelineContext};
use crate::core::error::ExecutionError;
use crate::core::metadata::{ExifTool, Metadata, MetadataProvider};
use crate::core::node::Processor;
use crate::core::types::{ImageRef, Params, StageSpec, Value};
use crate::filters::registry::ProcessorRegistry;
use image::DynamicImage;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Execution options.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOptions {
    /// Persist every stage's buffer (stages may override with `save_buffer`).
    pub save_intermediates: bool,
    /// Directory for persisted buffers (stages may override with `output`).
    pub scratch_dir: PathBuf,
    /// Font used when a text segment's font cannot be found.
    pub default_font: Option<PathBuf>,
    /// Directories searched for relative font paths.
    pub font_dirs: Vec<PathBuf>,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl ExecutionOptions {
    /// Create a new options builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Options from the `[pipeline]` config section.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            save_intermediates: config.pipeline.save_intermediates,
            scratch_dir: config.pipeline.scratch_dir.clone(),
            default_font: config.pipeline.default_font.clone(),
            font_dirs: config.pipeline.font_dirs.clone(),
        }
    }

    /// Enable/disable persistence of intermediate buffers.
    pub fn with_save_intermediates(mut self, save: bool) -> Self {
        self.save_intermediates = save;
        self
    }

    /// Set the scratch directory.
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    /// Set the fallback font.
    pub fn with_default_font(mut self, font: impl Into<PathBuf>) -> Self {
        self.default_font = Some(font.into());
        self
    }

    /// Copy of these options with persistence switched off.
    pub fn without_intermediates(&self) -> Self {
        self.clone().with_save_intermediates(false)
    }
}

/// One pipeline run: specifications plus where the images come from and go.
#[derive(Debug, Clone, Default)]
pub struct PipelineJob {
    /// Ordered stages.
    pub specs: Vec<StageSpec>,
    /// Source photo, loaded lazily into the first stage's buffer.
    pub source: Option<PathBuf>,
    /// Where to write the final image.
    pub output: Option<PathBuf>,
    /// Images seeded after the source (used by nested pipelines).
    pub initial_buffer: Vec<ImageRef>,
    /// Metadata; read from the source with the executor's provider if absent.
    pub metadata: Option<Arc<Metadata>>,
}

impl PipelineJob {
    /// Create a job from stage specifications.
    pub fn new(specs: Vec<StageSpec>) -> Self {
        Self {
            specs,
            ..Self::default()
        }
    }

    /// Set the source photo.
    pub fn source(mut self, path: impl Into<PathBuf>) -> Self {
        self.source = Some(path.into());
        self
    }

    /// Set the output path.
    pub fn output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = Some(path.into());
        self
    }

    /// Seed the first stage with in-memory images.
    pub fn initial_buffer(mut self, images: Vec<ImageRef>) -> Self {
        self.initial_buffer = images;
        self
    }

    /// Use this metadata instead of reading it from the source.
    pub fn metadata(mut self, metadata: impl Into<Arc<Metadata>>) -> Self {
        self.metadata = Some(metadata.into());
        self
    }
}

/// Execution statistics.
#[derive(Debug, Clone, Default)]
pub struct ExecutionStats {
    /// Total execution time.
    pub total_duration: Duration,
    /// Number of stages executed.
    pub stages_executed: usize,
}

/// Result of a pipeline run.
#[derive(Debug)]
pub struct PipelineOutput {
    /// The last stage's buffer.
    pub buffer: Vec<ImageRef>,
    /// Debug artifacts written for the final buffer.
    pub persisted: Vec<PathBuf>,
    /// Execution statistics.
    pub stats: ExecutionStats,
}

impl PipelineOutput {
    /// The first image of the final buffer.
    pub fn first(&self) -> Option<&ImageRef> {
        self.buffer.first()
    }

    /// Take the first image out, cloning only if it is still shared.
    pub fn into_image(self) -> Result<DynamicImage, ExecutionError> {
        let first = self
            .buffer
            .into_iter()
            .next()
            .ok_or_else(|| ExecutionError::EmptyBuffer {
                stage: "final".to_string(),
            })?;
        Ok(Arc::try_unwrap(first).unwrap_or_else(|shared| (*shared).clone()))
    }
}

/// The pipeline executor.
pub struct PipelineExecutor {
    registry: Arc<ProcessorRegistry>,
    options: Arc<ExecutionOptions>,
    metadata_provider: Arc<dyn MetadataProvider>,
}

impl PipelineExecutor {
    /// Create an executor over the global registry.
    pub fn new() -> Self {
        Self::with_registry(ProcessorRegistry::global())
    }

    /// Create an executor over a specific registry.
    pub fn with_registry(registry: Arc<ProcessorRegistry>) -> Self {
        Self {
            registry,
            options: Arc::new(ExecutionOptions::default()),
            metadata_provider: Arc::new(ExifTool::default()),
        }
    }

    /// Set execution options.
    pub fn with_options(mut self, options: ExecutionOptions) -> Self {
        self.options = Arc::new(options);
        self
    }

    /// Set the metadata provider used for jobs without explicit metadata.
    pub fn with_metadata_provider(mut self, provider: Arc<dyn MetadataProvider>) -> Self {
        self.metadata_provider = provider;
        self
    }

    /// The registry this executor resolves names against.
    pub fn registry(&self) -> &Arc<ProcessorRegistry> {
        &self.registry
    }

    /// Execute a pipeline.
    ///
    /// Every processor name is resolved before the first stage runs, so an
    /// unknown name fails without side effects. Stage errors propagate
    /// unchanged.
    pub fn execute(&self, job: PipelineJob) -> Result<PipelineOutput, ExecutionError> {
        let start_time = Instant::now();
        let PipelineJob {
            specs,
            source,
            output,
            initial_buffer,
            metadata,
        } = job;

        if specs.is_empty() {
            return Err(ExecutionError::EmptyPipeline);
        }

        let processors = specs
            .iter()
            .map(|spec| self.registry.lookup(&spec.processor_name))
            .collect::<Result<Vec<Box<dyn Processor>>, _>>()?;
        let is_merger: Vec<bool> = processors.iter().map(|p| p.metadata().is_merger()).collect();
        let final_merger = is_merger.iter().rposition(|m| *m);

        let metadata = match (metadata, &source) {
            (Some(metadata), _) => metadata,
            (None, Some(path)) => Arc::new(self.metadata_provider.read(path)),
            (None, None) => Arc::new(Metadata::new()),
        };

        let mut seed = match source {
            Some(path) => {
                let mut paths = BufferSource::Paths(vec![path]);
                if !initial_buffer.is_empty() {
                    let mut images = paths.load()?;
                    images.extend(initial_buffer);
                    paths = BufferSource::Loaded(images);
                }
                Some(paths)
            }
            None => Some(BufferSource::Loaded(initial_buffer)),
        };

        // history[k] is the buffer stage k received as "previous output";
        // history[0] is the seed.
        let mut history: Vec<Vec<ImageRef>> = Vec::with_capacity(specs.len() + 1);
        if final_merger.is_some() {
            // a merger will read the seed, so it cannot stay lazy
            history.push(seed.take().unwrap_or_default().load()?);
        } else {
            history.push(Vec::new());
        }

        let mut last_merger: Option<usize> = None;
        let mut last_context: Option<PipelineContext> = None;

        for (idx, (spec, processor)) in specs.into_iter().zip(&processors).enumerate() {
            let input = if is_merger[idx] {
                let first = last_merger.map_or(0, |m| m + 1);
                let flattened: Vec<ImageRef> = history[first..=idx]
                    .iter_mut()
                    .flat_map(std::mem::take)
                    .collect();
                last_merger = Some(idx);
                BufferSource::Loaded(flattened)
            } else if let Some(seed) = seed.take() {
                seed
            } else {
                BufferSource::Loaded(history[idx].clone())
            };

            let stage_metadata = explicit_metadata(&spec.params).unwrap_or_else(|| Arc::clone(&metadata));
            let name = spec.processor_name.clone();
            let mut ctx = PipelineContext::new(spec)
                .with_runtime(Arc::clone(&self.registry), Arc::clone(&self.options))
                .with_metadata(stage_metadata)
                .with_buffer(input);

            let stage_start = Instant::now();
            processor.process(&mut ctx)?;
            log::debug!(
                "{} cost {:.2} ms",
                name,
                stage_start.elapsed().as_secs_f64() * 1000.0
            );

            // no later merger can reach this snapshot
            if final_merger.map_or(true, |m| m <= idx) {
                history[idx] = Vec::new();
            }
            history.push(ctx.take_buffer()?);
            last_context = Some(ctx);
        }

        let stages_executed = processors.len();
        let final_buffer = history.pop().unwrap_or_default();
        drop(history);

        let mut persisted = Vec::new();
        if let Some(mut ctx) = last_context {
            ctx.replace_buffer(final_buffer.clone());
            ctx.persist_intermediate("final", false)?;
            ctx.mark_done(true);
            persisted = ctx.persisted_paths().to_vec();
        }

        if let Some(path) = output {
            let first = final_buffer.first().ok_or_else(|| ExecutionError::EmptyBuffer {
                stage: "final".to_string(),
            })?;
            write_opaque(first, &path)?;
            log::info!("generated {}", path.display());
        }

        Ok(PipelineOutput {
            buffer: final_buffer,
            persisted,
            stats: ExecutionStats {
                total_duration: start_time.elapsed(),
                stages_executed,
            },
        })
    }
}

impl Default for PipelineExecutor {
    fn default() -> Self {
        Self::new()
    }
}

/// A stage may carry its own `exif` map, which then replaces the photo
/// metadata for that stage.
fn explicit_metadata(params: &Params) -> Option<Arc<Metadata>> {
    let map = params.get("exif")?.as_map()?;
    let metadata = map
        .iter()
        .map(|(k, v)| {
            let value = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), value)
        })
        .collect();
    Some(Arc::new(metadata))
}

/// Write an image without alpha, in the format implied by the extension.
fn write_opaque(image: &DynamicImage, path: &Path) -> Result<(), ExecutionError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| ExecutionError::io(parent, e))?;
    }
    DynamicImage::ImageRgb8(image.to_rgb8()).save(path)?;
    Ok(())
}

/// Run a pipeline with the global registry and exiftool metadata.
///
/// Returns the first image of the final buffer; when `output` is given it is
/// also written there as an opaque image.
pub fn run_pipeline(
    specs: Vec<StageSpec>,
    source: Option<&Path>,
    output: Option<&Path>,
) -> Result<DynamicImage, ExecutionError> {
    let mut job = PipelineJob::new(specs);
    job.source = source.map(Path::to_path_buf);
    job.output = output.map(Path::to_path_buf);
    PipelineExecutor::new().execute(job)?.into_image()
}
