//! Passepartout CLI - photo framing pipelines
//!
//! This is a demonstration CLI for the Passepartout library.

use anyhow::{bail, Context};
use passepartout::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args: Vec<String> = std::env::args().collect();
    let program = args.remove(0);
    let config = take_option(&mut args, "--config")?;
    let workers = take_option(&mut args, "--workers")?;
    let overwrite = take_flag(&mut args, "--overwrite");

    let Some(command) = args.first().cloned() else {
        print_usage(&program);
        return Ok(());
    };

    let mut config = match config {
        Some(path) => EngineConfig::load(&path).with_context(|| format!("loading config {}", path))?,
        None => EngineConfig::default(),
    };
    if let Some(workers) = workers {
        config.batch.workers = workers.parse().with_context(|| format!("invalid worker count {}", workers))?;
    }
    config.batch.overwrite |= overwrite;

    match command.as_str() {
        "list" => list_processors(),
        "info" => match args.get(1) {
            Some(name) => processor_info(name)?,
            None => bail!("Please specify a processor name"),
        },
        "run" => {
            let Some(pipeline) = args.get(1) else {
                bail!("Usage: {} run <pipeline.json> [input] [output]", program);
            };
            run(&config, Path::new(pipeline), args.get(2).map(PathBuf::from), args.get(3).map(PathBuf::from))?;
        }
        "batch" => {
            if args.len() < 4 {
                bail!("Usage: {} batch <pipeline.json> <input_dir> <output_dir>", program);
            }
            batch(&config, Path::new(&args[1]), Path::new(&args[2]), Path::new(&args[3]))?;
        }
        "help" | "--help" | "-h" => print_usage(&program),
        other => {
            print_usage(&program);
            bail!("Unknown command: {}", other);
        }
    }
    Ok(())
}

fn take_option(args: &mut Vec<String>, name: &str) -> anyhow::Result<Option<String>> {
    let Some(index) = args.iter().position(|a| a == name) else {
        return Ok(None);
    };
    if index + 1 >= args.len() {
        bail!("{} needs a value", name);
    }
    let value = args.remove(index + 1);
    args.remove(index);
    Ok(Some(value))
}

fn take_flag(args: &mut Vec<String>, name: &str) -> bool {
    match args.iter().position(|a| a == name) {
        Some(index) => {
            args.remove(index);
            true
        }
        None => false,
    }
}

fn print_usage(program: &str) {
    println!("Passepartout v{}", passepartout::VERSION);
    println!();
    println!("Usage: {} <command> [options]", program);
    println!();
    println!("Commands:");
    println!("  list                                   List all available processors");
    println!("  info <processor>                       Show a processor's parameters");
    println!("  run <pipeline.json> [input] [output]   Run a pipeline on one photo");
    println!("  batch <pipeline.json> <in> <out>       Run a pipeline on every photo under <in>");
    println!("  help                                   Show this help message");
    println!();
    println!("Options:");
    println!("  --config <file>    Engine configuration (TOML)");
    println!("  --workers <n>      Batch worker count");
    println!("  --overwrite        Replace existing batch outputs");
}

fn list_processors() {
    let registry = ProcessorRegistry::global();
    println!("Available processors ({} total):", registry.len());
    println!();

    for category in Category::all() {
        println!("  {}", category.display_name());
        for name in registry.processors_by_category(*category) {
            if let Some(metadata) = registry.get_metadata(name) {
                println!("      • {} - {}", metadata.name, metadata.description);
            }
        }
        println!();
    }
}

fn processor_info(name: &str) -> anyhow::Result<()> {
    let registry = ProcessorRegistry::global();
    let Some(metadata) = registry.get_metadata(name) else {
        bail!("Processor not found: {} (use 'list' to see available processors)", name);
    };

    println!("Processor: {}", metadata.display_name);
    println!("Name: {}", metadata.name);
    println!("Category: {}", metadata.category.display_name());
    println!();
    println!("Description:");
    println!("  {}", metadata.description);

    if !metadata.parameters.is_empty() {
        println!();
        println!("Parameters:");
        for param in &metadata.parameters {
            println!("  • {} = {}", param.name, param.default);
            if !param.description.is_empty() {
                println!("    {}", param.description);
            }
        }
    }
    Ok(())
}

fn read_pipeline(path: &Path) -> anyhow::Result<Vec<StageSpec>> {
    let json = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    load_pipeline(&json).with_context(|| format!("parsing {}", path.display()))
}

fn run(config: &EngineConfig, pipeline: &Path, input: Option<PathBuf>, output: Option<PathBuf>) -> anyhow::Result<()> {
    let specs = read_pipeline(pipeline)?;
    let executor = PipelineExecutor::new()
        .with_options(ExecutionOptions::from_config(config))
        .with_metadata_provider(Arc::new(ExifTool::from_config(&config.metadata)));

    let mut job = PipelineJob::new(specs);
    job.source = input;
    job.output = output.clone();
    let result = executor.execute(job)?;

    if let Some(output) = output {
        println!("Saved {}", output.display());
    }
    println!(
        "Completed {} stages in {}ms",
        result.stats.stages_executed,
        result.stats.total_duration.as_millis()
    );
    Ok(())
}

fn batch(config: &EngineConfig, pipeline: &Path, input_dir: &Path, output_dir: &Path) -> anyhow::Result<()> {
    let template = StaticTemplate(read_pipeline(pipeline)?);
    let items = collect_items(input_dir, output_dir)?;

    let (tx, rx) = crossbeam::channel::unbounded();
    let printer = std::thread::spawn(move || {
        for event in rx {
            match event {
                BatchEvent::ItemCompleted { source, duration_ms, .. } => {
                    println!("   • {} ({}ms)", source.display(), duration_ms);
                }
                BatchEvent::ItemFailed { source, message, .. } => {
                    eprintln!("   ✗ {}: {}", source.display(), message);
                }
                BatchEvent::Progress { percent, .. } => {
                    log::debug!("{:.0}% done", percent);
                }
                _ => {}
            }
        }
    });

    let report = BatchProcessor::from_config(config).run(&items, &template, Some(tx))?;
    // the processor dropped its sender, so the printer drains and exits
    printer.join().map_err(|_| anyhow::anyhow!("progress printer panicked"))?;

    println!(
        "Processed {}: {} succeeded, {} failed, {} skipped",
        report.processed, report.success, report.failure, report.skipped
    );
    if report.failure > 0 {
        bail!("{} photos failed", report.failure);
    }
    Ok(())
}
