//! Batch driver.
//!
//! Runs one pipeline per photo on a bounded worker pool. Photos are
//! independent: each gets its own contexts and buffers, and the only shared
//! state is the read-only registry. A failing photo is logged and counted,
//! never propagated to its siblings.

use crate::core::config::EngineConfig;
use crate::core::error::{BatchError, ExecutionError};
use crate::core::metadata::{ExifTool, Metadata, MetadataProvider};
use crate::core::types::StageSpec;
use crate::execution::engine::{ExecutionOptions, PipelineExecutor, PipelineJob};
use crate::execution::progress::{BatchEvent, BatchProgress};
use crate::filters::registry::ProcessorRegistry;
use crossbeam::channel::Sender;
use parking_lot::Mutex;
use rayon::prelude::*;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use walkdir::WalkDir;

/// File extensions picked up when listing a directory.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "tif", "tiff", "webp"];

/// Produces the stage list for one photo.
///
/// Templates are rendered outside the engine; this is the boundary.
pub trait PipelineTemplate: Send + Sync {
    /// Render the pipeline for `source` given its metadata.
    fn render(&self, source: &Path, metadata: &Metadata) -> Result<Vec<StageSpec>, ExecutionError>;
}

/// The same pipeline for every photo.
#[derive(Debug, Clone)]
pub struct StaticTemplate(pub Vec<StageSpec>);

impl PipelineTemplate for StaticTemplate {
    fn render(&self, _source: &Path, _metadata: &Metadata) -> Result<Vec<StageSpec>, ExecutionError> {
        Ok(self.0.clone())
    }
}

/// One photo to process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItem {
    /// Source photo.
    pub source: PathBuf,
    /// Where the decorated photo goes.
    pub output: PathBuf,
}

impl BatchItem {
    /// Create a new item.
    pub fn new(source: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            output: output.into(),
        }
    }
}

/// List every image under `input_dir`, mirroring its layout in `output_dir`.
pub fn collect_items(input_dir: &Path, output_dir: &Path) -> Result<Vec<BatchItem>, BatchError> {
    let mut items = Vec::new();
    for entry in WalkDir::new(input_dir).sort_by_file_name() {
        let entry = entry.map_err(|e| BatchError::Listing {
            path: input_dir.to_path_buf(),
            error: e.to_string(),
        })?;
        if !entry.file_type().is_file() || !has_image_extension(entry.path()) {
            continue;
        }
        let relative = entry.path().strip_prefix(input_dir).unwrap_or(entry.path());
        items.push(BatchItem::new(entry.path(), output_dir.join(relative)));
    }
    Ok(items)
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Outcome of a batch.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    /// Items handled, whatever the outcome.
    pub processed: usize,
    /// Items written.
    pub success: usize,
    /// Items that failed.
    pub failure: usize,
    /// Items skipped because their output existed.
    pub skipped: usize,
    /// `(source, message)` per failure, in input order.
    pub failures: Vec<(PathBuf, String)>,
}

/// Runs pipelines for many photos concurrently.
pub struct BatchProcessor {
    workers: usize,
    overwrite: bool,
    registry: Arc<ProcessorRegistry>,
    options: ExecutionOptions,
    metadata_provider: Arc<dyn MetadataProvider>,
}

impl BatchProcessor {
    /// Four workers, no overwriting, exiftool metadata.
    pub fn new() -> Self {
        Self::from_config(&EngineConfig::default())
    }

    /// Settings from the `[batch]`, `[pipeline]` and `[metadata]` sections.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            workers: config.batch.workers,
            overwrite: config.batch.overwrite,
            registry: ProcessorRegistry::global(),
            options: ExecutionOptions::from_config(config),
            metadata_provider: Arc::new(ExifTool::from_config(&config.metadata)),
        }
    }

    /// Set the pool size.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Replace existing outputs instead of skipping them.
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Set execution options.
    pub fn with_options(mut self, options: ExecutionOptions) -> Self {
        self.options = options;
        self
    }

    /// Set the registry.
    pub fn with_registry(mut self, registry: Arc<ProcessorRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Set the metadata provider.
    pub fn with_metadata_provider(mut self, provider: Arc<dyn MetadataProvider>) -> Self {
        self.metadata_provider = provider;
        self
    }

    /// Process every item. Only failing to start the pool is an error;
    /// per-photo failures land in the report.
    pub fn run(
        &self,
        items: &[BatchItem],
        template: &dyn PipelineTemplate,
        observer: Option<Sender<BatchEvent>>,
    ) -> Result<BatchReport, BatchError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers.max(1))
            .build()
            .map_err(|e| BatchError::WorkerPool(e.to_string()))?;

        let executor = PipelineExecutor::with_registry(Arc::clone(&self.registry))
            .with_options(self.options.clone())
            .with_metadata_provider(Arc::clone(&self.metadata_provider));
        let progress = BatchProgress::start(items.len(), observer);
        let failures = Mutex::new(Vec::new());

        log::info!("Processing {} photos with {} workers", items.len(), self.workers.max(1));
        pool.install(|| {
            items.par_iter().enumerate().for_each(|(index, item)| {
                self.run_item(index, item, template, &executor, &progress, &failures);
            })
        });
        progress.complete();

        let mut failures = failures.into_inner();
        failures.sort_by_key(|(index, _, _)| *index);
        let report = BatchReport {
            processed: progress.processed(),
            success: progress.success(),
            failure: progress.failure(),
            skipped: progress.skipped(),
            failures: failures.into_iter().map(|(_, path, message)| (path, message)).collect(),
        };
        log::info!(
            "Batch finished: {} succeeded, {} failed, {} skipped",
            report.success,
            report.failure,
            report.skipped
        );
        Ok(report)
    }

    fn run_item(
        &self,
        index: usize,
        item: &BatchItem,
        template: &dyn PipelineTemplate,
        executor: &PipelineExecutor,
        progress: &BatchProgress,
        failures: &Mutex<Vec<(usize, PathBuf, String)>>,
    ) {
        if !self.overwrite && item.output.exists() {
            log::info!("Skipping {}: {} exists", item.source.display(), item.output.display());
            progress.item_skipped(index, item.source.clone());
            return;
        }

        progress.item_started(index, item.source.clone());
        let start = Instant::now();
        match self.process(item, template, executor) {
            Ok(()) => {
                progress.item_completed(index, item.source.clone(), start.elapsed().as_millis() as u64);
            }
            Err(e) => {
                log::error!("Failed to process {}: {}", item.source.display(), e);
                let message = e.to_string();
                failures.lock().push((index, item.source.clone(), message.clone()));
                progress.item_failed(index, item.source.clone(), message);
            }
        }
    }

    fn process(
        &self,
        item: &BatchItem,
        template: &dyn PipelineTemplate,
        executor: &PipelineExecutor,
    ) -> Result<(), ExecutionError> {
        if !item.source.is_file() {
            return Err(ExecutionError::io(
                &item.source,
                io::Error::new(io::ErrorKind::NotFound, "source photo not found"),
            ));
        }
        let metadata = Arc::new(self.metadata_provider.read(&item.source));
        let specs = template.render(&item.source, &metadata)?;
        let job = PipelineJob::new(specs)
            .source(&item.source)
            .output(&item.output)
            .metadata(metadata);
        executor.execute(job)?;
        Ok(())
    }
}

impl Default for BatchProcessor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::metadata::NoMetadata;
    use image::RgbImage;

    #[test]
    fn test_collect_items_mirrors_layout() {
        let input = tempfile::tempdir().unwrap();
        std::fs::create_dir(input.path().join("trip")).unwrap();
        RgbImage::new(1, 1).save(input.path().join("a.jpg")).unwrap();
        RgbImage::new(1, 1).save(input.path().join("trip/b.PNG")).unwrap();
        std::fs::write(input.path().join("notes.txt"), "x").unwrap();

        let items = collect_items(input.path(), Path::new("/out")).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].output, Path::new("/out/a.jpg"));
        assert_eq!(items[1].output, Path::new("/out/trip/b.PNG"));
    }

    #[test]
    fn test_skips_existing_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("in.jpg");
        let output = dir.path().join("out.jpg");
        RgbImage::new(4, 4).save(&source).unwrap();
        RgbImage::new(1, 1).save(&output).unwrap();

        let template = StaticTemplate(vec![StageSpec::new("blur")]);
        let processor = BatchProcessor::new()
            .with_workers(2)
            .with_metadata_provider(Arc::new(NoMetadata));
        let report = processor
            .run(&[BatchItem::new(&source, &output)], &template, None)
            .unwrap();
        assert_eq!((report.processed, report.skipped, report.success), (1, 1, 0));

        let report = processor
            .with_overwrite(true)
            .run(&[BatchItem::new(&source, &output)], &template, None)
            .unwrap();
        assert_eq!((report.processed, report.skipped, report.success), (1, 0, 1));
        assert_eq!(image::open(&output).unwrap().width(), 4);
    }

    #[test]
    fn test_template_errors_are_item_failures() {
        struct Broken;
        impl PipelineTemplate for Broken {
            fn render(&self, _: &Path, _: &Metadata) -> Result<Vec<StageSpec>, ExecutionError> {
                Err(ExecutionError::EmptyPipeline)
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("in.png");
        RgbImage::new(2, 2).save(&source).unwrap();
        let report = BatchProcessor::new()
            .with_metadata_provider(Arc::new(NoMetadata))
            .run(&[BatchItem::new(&source, dir.path().join("out.png"))], &Broken, None)
            .unwrap();
        assert_eq!(report.failure, 1);
        assert_eq!(report.failures[0].0, source);
    }
}
