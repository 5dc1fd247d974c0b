//! Pipeline context.
//!
//! One context exists per stage of a running pipeline. It owns the stage's
//! parameters and its buffer (the ordered images the stage reads and
//! replaces) and carries the shared, read-only photo metadata.

use crate::core::color::parse_color;
use crate::core::error::ExecutionError;
use crate::core::metadata::Metadata;
use crate::core::types::{Color, ImageRef, ParamEnum, Params, StageSpec, Value};
use crate::execution::engine::{ExecutionOptions, PipelineExecutor, PipelineJob};
use crate::filters::registry::ProcessorRegistry;
use image::{ColorType, ImageError};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

/// Where a buffer's images currently live.
///
/// A pipeline is seeded with paths; they are decoded the first time a stage
/// asks for the buffer and the decoded images replace the paths.
#[derive(Debug, Clone)]
pub enum BufferSource {
    /// Not yet decoded.
    Paths(Vec<PathBuf>),
    /// Decoded images.
    Loaded(Vec<ImageRef>),
}

impl BufferSource {
    /// Decode (if needed) and return the images.
    pub fn load(self) -> Result<Vec<ImageRef>, ExecutionError> {
        match self {
            BufferSource::Loaded(images) => Ok(images),
            BufferSource::Paths(paths) => paths.iter().map(|p| open_image(p)).collect(),
        }
    }

    /// Number of entries, decoded or not.
    pub fn len(&self) -> usize {
        match self {
            BufferSource::Paths(paths) => paths.len(),
            BufferSource::Loaded(images) => images.len(),
        }
    }

    /// Whether the buffer holds nothing.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for BufferSource {
    fn default() -> Self {
        BufferSource::Loaded(Vec::new())
    }
}

/// Decode one image from disk, keeping the path in I/O errors.
pub fn open_image(path: &Path) -> Result<ImageRef, ExecutionError> {
    image::open(path).map(Arc::new).map_err(|e| match e {
        ImageError::IoError(source) => ExecutionError::io(path, source),
        other => ExecutionError::Image(other),
    })
}

/// Terminal state of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StageStatus {
    /// The stage has not reported yet.
    #[default]
    Pending,
    /// The stage produced its output.
    Succeeded,
    /// The stage gave up without raising (e.g. resize without a size).
    Failed,
}

/// State handed to a processor.
pub struct PipelineContext {
    stage: String,
    params: Params,
    buffer: BufferSource,
    metadata: Arc<Metadata>,
    registry: Arc<ProcessorRegistry>,
    options: Arc<ExecutionOptions>,
    persisted: Vec<PathBuf>,
    status: StageStatus,
}

impl PipelineContext {
    /// Create a context for one stage, bound to the global registry and
    /// default options.
    pub fn new(spec: StageSpec) -> Self {
        Self {
            stage: spec.processor_name,
            params: spec.params,
            buffer: BufferSource::default(),
            metadata: Arc::new(Metadata::new()),
            registry: ProcessorRegistry::global(),
            options: Arc::new(ExecutionOptions::default()),
            persisted: Vec::new(),
            status: StageStatus::Pending,
        }
    }

    /// Bind the registry and options used for nested pipelines and
    /// persistence.
    pub fn with_runtime(mut self, registry: Arc<ProcessorRegistry>, options: Arc<ExecutionOptions>) -> Self {
        self.registry = registry;
        self.options = options;
        self
    }

    /// Attach photo metadata.
    pub fn with_metadata(mut self, metadata: Arc<Metadata>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Seed the buffer.
    pub fn with_buffer(mut self, buffer: BufferSource) -> Self {
        self.buffer = buffer;
        self
    }

    /// Name of the processor this context belongs to.
    pub fn stage_name(&self) -> &str {
        &self.stage
    }

    /// Read-only photo metadata.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Execution options in effect.
    pub fn options(&self) -> &ExecutionOptions {
        &self.options
    }

    /// All parameters of the stage.
    pub fn params(&self) -> &Params {
        &self.params
    }

    // ========================================================================
    // Parameter Getters
    // ========================================================================

    /// Get a parameter. JSON `null` counts as absent.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.params.get(key).filter(|v| !v.is_null())
    }

    /// Check if a non-null parameter exists.
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Get a parameter as an integer (floats truncate, numeric strings parse).
    pub fn get_int(&self, key: &str, default: i64) -> i64 {
        self.get(key).and_then(Value::as_integer).unwrap_or(default)
    }

    /// Get a parameter as a float.
    pub fn get_float(&self, key: &str, default: f64) -> f64 {
        self.get(key).and_then(Value::as_float).unwrap_or(default)
    }

    /// Get a parameter as a boolean. Accepts numbers and `"true"`/`"false"`.
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::Integer(i)) => *i != 0,
            Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => true,
                "false" | "no" | "0" => false,
                _ => default,
            },
            _ => default,
        }
    }

    /// Get a parameter as a string slice.
    pub fn get_str<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).and_then(Value::as_str).unwrap_or(default)
    }

    /// Get a parameter as a color.
    ///
    /// Absent keys yield `default`; present but unparsable values are a
    /// configuration error.
    pub fn get_color(&self, key: &str, default: Color) -> Result<Color, ExecutionError> {
        match self.get(key) {
            None => Ok(default),
            Some(value) => Ok(parse_color(value)?),
        }
    }

    /// Resolve a loosely-typed enum: symbolic name first, then value, else
    /// `default`.
    pub fn get_enum<E: ParamEnum>(&self, key: &str, default: E) -> E {
        self.get(key).and_then(E::resolve).unwrap_or(default)
    }

    /// Get a list parameter; absent or mistyped yields an empty slice.
    pub fn get_list(&self, key: &str) -> &[Value] {
        self.get(key)
            .and_then(Value::as_list)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Get a nested map parameter.
    pub fn get_map(&self, key: &str) -> Option<&Params> {
        self.get(key).and_then(Value::as_map)
    }

    /// Set a parameter.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.params.insert(key.into(), value.into());
    }

    /// Build an invalid-parameter error for this stage.
    pub fn invalid_parameter(&self, parameter: &str, error: impl Into<String>) -> ExecutionError {
        ExecutionError::InvalidParameter {
            stage: self.stage.clone(),
            parameter: parameter.to_string(),
            error: error.into(),
        }
    }

    // ========================================================================
    // Buffer
    // ========================================================================

    /// The current images, decoding seeded paths on first access.
    pub fn buffer(&mut self) -> Result<&[ImageRef], ExecutionError> {
        if let BufferSource::Paths(_) = self.buffer {
            let images = std::mem::take(&mut self.buffer).load()?;
            self.buffer = BufferSource::Loaded(images);
        }
        match &self.buffer {
            BufferSource::Loaded(images) => Ok(images),
            BufferSource::Paths(_) => Ok(&[]),
        }
    }

    /// Swap in a new buffer; the previous images are released.
    pub fn replace_buffer(&mut self, images: Vec<ImageRef>) {
        self.buffer = BufferSource::Loaded(images);
    }

    /// Move the buffer out, leaving it empty.
    pub fn take_buffer(&mut self) -> Result<Vec<ImageRef>, ExecutionError> {
        std::mem::take(&mut self.buffer).load()
    }

    // ========================================================================
    // Persistence and Status
    // ========================================================================

    /// Write the buffer to the scratch directory when enabled (or forced).
    ///
    /// The stage parameters `save_buffer` and `output` override the
    /// configured switch and directory. Opaque RGB images are written as
    /// jpg and RGBA images as png; other pixel formats are rejected.
    pub fn persist_intermediate(&mut self, stage: &str, force: bool) -> Result<(), ExecutionError> {
        let enabled = force || self.get_bool("save_buffer", self.options.save_intermediates);
        if !enabled {
            return Ok(());
        }

        let directory = self
            .get("output")
            .and_then(Value::as_str)
            .map(PathBuf::from)
            .unwrap_or_else(|| self.options.scratch_dir.clone());
        fs::create_dir_all(&directory).map_err(|e| ExecutionError::io(&directory, e))?;

        let images = self.buffer()?.to_vec();
        let mut written = Vec::with_capacity(images.len());
        for image in &images {
            let extension = match image.color() {
                ColorType::Rgb8 => "jpg",
                ColorType::Rgba8 => "png",
                other => {
                    return Err(ExecutionError::UnsupportedPixelFormat {
                        stage: stage.to_string(),
                        format: format!("{:?}", other),
                    })
                }
            };
            let path = directory.join(format!("{}_{}.{}", stage, Uuid::new_v4().simple(), extension));
            image.save(&path)?;
            written.push(path);
        }
        self.persisted = written;
        Ok(())
    }

    /// Paths written by the last [`persist_intermediate`](Self::persist_intermediate).
    pub fn persisted_paths(&self) -> &[PathBuf] {
        &self.persisted
    }

    /// Record the stage outcome.
    pub fn mark_done(&mut self, success: bool) {
        self.status = if success {
            StageStatus::Succeeded
        } else {
            StageStatus::Failed
        };
        for path in &self.persisted {
            log::info!("{} generated {}", self.stage, path.display());
        }
    }

    /// Outcome reported by the stage.
    pub fn status(&self) -> StageStatus {
        self.status
    }

    /// Replace the buffer, persist it if enabled and mark success.
    pub fn commit(&mut self, images: Vec<ImageRef>) -> Result<(), ExecutionError> {
        self.replace_buffer(images);
        let stage = self.stage.clone();
        self.persist_intermediate(&stage, false)?;
        self.mark_done(true);
        Ok(())
    }

    // ========================================================================
    // Nested Pipelines
    // ========================================================================

    /// Run a nested pipeline with this context's registry and metadata.
    ///
    /// Intermediate persistence is off for nested runs. Returns the nested
    /// pipeline's final buffer.
    pub fn subpipeline(
        &self,
        specs: Vec<StageSpec>,
        initial_buffer: Vec<ImageRef>,
    ) -> Result<Vec<ImageRef>, ExecutionError> {
        let executor = PipelineExecutor::with_registry(Arc::clone(&self.registry))
            .with_options(self.options.without_intermediates());
        let job = PipelineJob::new(specs)
            .initial_buffer(initial_buffer)
            .metadata(Arc::clone(&self.metadata));
        Ok(executor.execute(job)?.buffer)
    }
}

impl std::fmt::Debug for PipelineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineContext")
            .field("stage", &self.stage)
            .field("params", &self.params)
            .field("buffer_len", &self.buffer.len())
            .field("status", &self.status)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Alignment, Direction};
    use image::{DynamicImage, GrayImage, RgbImage, RgbaImage};

    fn context(spec: StageSpec) -> PipelineContext {
        PipelineContext::new(spec)
    }

    #[test]
    fn test_typed_getters_fall_back_to_defaults() {
        let ctx = context(
            StageSpec::new("margin")
                .with("left_margin", 10.7)
                .with("top_margin", "5")
                .with("flag", "true")
                .with("name", "x")
                .with("nothing", Value::Null),
        );

        assert_eq!(ctx.get_int("left_margin", 0), 10);
        assert_eq!(ctx.get_int("top_margin", 0), 5);
        assert_eq!(ctx.get_int("missing", 7), 7);
        assert_eq!(ctx.get_int("name", 3), 3);
        assert!(ctx.get_bool("flag", false));
        assert_eq!(ctx.get_str("name", "y"), "x");
        assert_eq!(ctx.get_str("nothing", "fallback"), "fallback");
        assert!(!ctx.contains("nothing"));
        assert!(ctx.get_list("missing").is_empty());
    }

    #[test]
    fn test_get_color_and_enum() {
        let ctx = context(
            StageSpec::new("concat")
                .with("background", "(255,255,255,0)")
                .with("bad", "not-a-color")
                .with("direction", "VERTICAL")
                .with("alignment", "middle"),
        );

        assert_eq!(
            ctx.get_color("background", Color::BLACK).unwrap(),
            Color::new(255, 255, 255, 0)
        );
        assert_eq!(ctx.get_color("missing", Color::RED).unwrap(), Color::RED);
        let err = ctx.get_color("bad", Color::BLACK).unwrap_err();
        assert!(err.is_configuration_error());

        assert_eq!(ctx.get_enum("direction", Direction::Horizontal), Direction::Vertical);
        // "middle" is neither a name nor a value
        assert_eq!(ctx.get_enum("alignment", Alignment::End), Alignment::End);
        assert_eq!(ctx.get_enum("missing", Alignment::Start), Alignment::Start);
    }

    #[test]
    fn test_buffer_loads_paths_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seed.png");
        RgbImage::new(4, 3).save(&path).unwrap();

        let mut ctx = context(StageSpec::new("blur")).with_buffer(BufferSource::Paths(vec![path.clone()]));
        assert_eq!(ctx.buffer().unwrap()[0].width(), 4);

        std::fs::remove_file(&path).unwrap();
        // cached: the file is gone but the buffer is still readable
        assert_eq!(ctx.buffer().unwrap().len(), 1);
        assert_eq!(ctx.take_buffer().unwrap().len(), 1);
        assert!(ctx.buffer().unwrap().is_empty());
    }

    #[test]
    fn test_missing_seed_is_io_error() {
        let mut ctx = context(StageSpec::new("blur"))
            .with_buffer(BufferSource::Paths(vec![PathBuf::from("/nonexistent/photo.jpg")]));
        assert!(matches!(ctx.buffer(), Err(ExecutionError::Io { .. })));
    }

    #[test]
    fn test_persist_uses_extension_per_pixel_format() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context(
            StageSpec::new("shadow")
                .with("save_buffer", true)
                .with("output", dir.path().to_string_lossy().to_string()),
        );
        ctx.commit(vec![
            Arc::new(DynamicImage::ImageRgb8(RgbImage::new(2, 2))),
            Arc::new(DynamicImage::ImageRgba8(RgbaImage::new(2, 2))),
        ])
        .unwrap();

        let paths = ctx.persisted_paths();
        assert_eq!(paths.len(), 2);
        assert_eq!(paths[0].extension().unwrap(), "jpg");
        assert_eq!(paths[1].extension().unwrap(), "png");
        assert!(paths[0].file_name().unwrap().to_string_lossy().starts_with("shadow_"));
        assert!(paths.iter().all(|p| p.exists()));
        assert_eq!(ctx.status(), StageStatus::Succeeded);
    }

    #[test]
    fn test_persist_disabled_by_default() {
        let mut ctx = context(StageSpec::new("blur"));
        ctx.commit(vec![Arc::new(DynamicImage::ImageRgb8(RgbImage::new(1, 1)))])
            .unwrap();
        assert!(ctx.persisted_paths().is_empty());
    }

    #[test]
    fn test_persist_rejects_unsupported_format() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context(
            StageSpec::new("gray").with("output", dir.path().to_string_lossy().to_string()),
        );
        ctx.replace_buffer(vec![Arc::new(DynamicImage::ImageLuma8(GrayImage::new(2, 2)))]);
        let err = ctx.persist_intermediate("gray", true).unwrap_err();
        assert!(matches!(err, ExecutionError::UnsupportedPixelFormat { .. }));
    }

    #[test]
    fn test_mark_done_failure() {
        let mut ctx = context(StageSpec::new("resize"));
        assert_eq!(ctx.status(), StageStatus::Pending);
        ctx.mark_done(false);
        assert_eq!(ctx.status(), StageStatus::Failed);
    }
}
