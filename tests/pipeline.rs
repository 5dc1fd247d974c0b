//! End-to-end pipeline runs through the public API.

use image::{DynamicImage, GenericImageView, Rgb, RgbImage, Rgba};
use passepartout::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

fn executor() -> PipelineExecutor {
    PipelineExecutor::new().with_metadata_provider(Arc::new(NoMetadata))
}

fn write_photo(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
    let path = dir.join(name);
    RgbImage::from_pixel(width, height, Rgb([40, 80, 120])).save(&path).unwrap();
    path
}

fn run(specs: Vec<StageSpec>, source: Option<&Path>) -> Vec<ImageRef> {
    let mut job = PipelineJob::new(specs);
    job.source = source.map(Path::to_path_buf);
    executor().execute(job).unwrap().buffer
}

#[test]
fn test_single_generator() {
    let specs = vec![StageSpec::new("solid_color")
        .with("width", 100)
        .with("height", 50)
        .with("color", "red")];

    let image = run_pipeline(specs, None, None).unwrap();
    assert_eq!(image.dimensions(), (100, 50));
    assert!(image.to_rgba8().pixels().all(|p| *p == Rgba([255, 0, 0, 255])));
}

#[test]
fn test_margin_on_source_photo() {
    let dir = TempDir::new().unwrap();
    let photo = write_photo(dir.path(), "photo.png", 100, 100);
    let specs = vec![StageSpec::new("margin")
        .with("left_margin", 10)
        .with("right_margin", 10)
        .with("top_margin", 5)
        .with("bottom_margin", 5)];

    let out = run(specs, Some(&photo));
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].dimensions(), (120, 110));
    assert_eq!(out[0].get_pixel(10, 5), Rgba([40, 80, 120, 255]));
    assert_eq!(out[0].get_pixel(9, 5), Rgba([255, 255, 255, 255]));
    assert_eq!(out[0].get_pixel(109, 104), Rgba([40, 80, 120, 255]));
    assert_eq!(out[0].get_pixel(110, 105), Rgba([255, 255, 255, 255]));
}

#[test]
fn test_merger_collects_generator_outputs() {
    let specs = vec![
        StageSpec::new("solid_color").with("width", 10).with("height", 4).with("color", "red"),
        StageSpec::new("solid_color").with("width", 6).with("height", 8).with("color", "blue"),
        StageSpec::new("concat").with("spacing", 0),
    ];

    let out = run(specs, None);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].dimensions(), (16, 8));
    assert_eq!(out[0].get_pixel(0, 7), Rgba([255, 0, 0, 255]));
    assert_eq!(out[0].get_pixel(15, 0), Rgba([0, 0, 255, 255]));
}

#[test]
fn test_merger_includes_source_photo() {
    let dir = TempDir::new().unwrap();
    let photo = write_photo(dir.path(), "photo.png", 100, 100);
    let specs = vec![
        StageSpec::new("solid_color").with("width", 10).with("height", 10).with("color", "black"),
        StageSpec::new("concat").with("spacing", 0),
    ];

    let out = run(specs, Some(&photo));
    assert_eq!(out[0].dimensions(), (110, 100));
    assert_eq!(out[0].get_pixel(0, 0), Rgba([40, 80, 120, 255]));
    assert_eq!(out[0].get_pixel(105, 95), Rgba([0, 0, 0, 255]));
}

#[test]
fn test_generator_replaces_buffer_without_merger() {
    let dir = TempDir::new().unwrap();
    let photo = write_photo(dir.path(), "photo.png", 30, 30);
    let specs = vec![StageSpec::new("solid_color").with("width", 4).with("height", 4)];

    let out = run(specs, Some(&photo));
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].dimensions(), (4, 4));
}

#[test]
fn test_filter_chain_matches_combined_stage() {
    let dir = TempDir::new().unwrap();
    let photo = write_photo(dir.path(), "photo.png", 40, 20);

    let chained = run(
        vec![
            StageSpec::new("margin").with("left_margin", 6),
            StageSpec::new("margin").with("top_margin", 3),
        ],
        Some(&photo),
    );
    let combined = run(
        vec![StageSpec::new("margin").with("left_margin", 6).with("top_margin", 3)],
        Some(&photo),
    );

    assert_eq!(chained[0].to_rgba8(), combined[0].to_rgba8());
}

#[test]
fn test_zero_radius_shadow_is_identity() {
    let dir = TempDir::new().unwrap();
    let photo = write_photo(dir.path(), "photo.png", 12, 9);

    let out = run(vec![StageSpec::new("shadow").with("shadow_radius", 0)], Some(&photo));
    assert_eq!(out[0].dimensions(), (12, 9));
    assert_eq!(out[0].to_rgb8(), image::open(&photo).unwrap().to_rgb8());
}

#[test]
fn test_trim_twice_equals_trim_once() {
    let mut canvas = RgbImage::from_pixel(60, 40, Rgb([255, 255, 255]));
    for y in 10..25 {
        for x in 15..50 {
            canvas.put_pixel(x, y, Rgb([0, 0, 0]));
        }
    }
    let seed: Vec<ImageRef> = vec![Arc::new(DynamicImage::ImageRgb8(canvas))];

    let once = executor()
        .execute(PipelineJob::new(vec![StageSpec::new("trim")]).initial_buffer(seed.clone()))
        .unwrap();
    let twice = executor()
        .execute(PipelineJob::new(vec![StageSpec::new("trim"), StageSpec::new("trim")]).initial_buffer(seed))
        .unwrap();

    assert_eq!(once.buffer[0].dimensions(), (35, 15));
    assert_eq!(once.buffer[0].to_rgb8(), twice.buffer[0].to_rgb8());
}

#[test]
fn test_stage_metadata_override_drives_ratio() {
    let exif: Params = [
        ("ImageWidth".to_string(), Value::from("6000")),
        ("ImageHeight".to_string(), Value::from("4000")),
    ]
    .into_iter()
    .collect();
    let specs = vec![
        StageSpec::new("solid_color").with("width", 100).with("height", 100).with("color", "black"),
        StageSpec::new("margin_with_ratio").with("exif", exif),
    ];

    let out = run(specs, None);
    assert_eq!(out[0].dimensions(), (150, 100));
}

#[test]
fn test_unknown_processor_fails_before_any_stage() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("out.jpg");
    let specs = vec![
        StageSpec::new("solid_color").with("width", 4).with("height", 4),
        StageSpec::new("no_such_processor"),
    ];

    let err = run_pipeline(specs, None, Some(&output)).unwrap_err();
    assert!(matches!(err, ExecutionError::Registry(_)));
    assert!(err.is_configuration_error());
    assert!(!output.exists());
}

#[test]
fn test_empty_pipeline_is_rejected() {
    let err = executor().execute(PipelineJob::new(Vec::new())).unwrap_err();
    assert!(matches!(err, ExecutionError::EmptyPipeline));
}

#[test]
fn test_output_is_written_opaque() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("nested").join("out.png");
    let specs = vec![StageSpec::new("solid_color")
        .with("width", 8)
        .with("height", 6)
        .with("color", "red")];

    run_pipeline(specs, None, Some(&output)).unwrap();
    let written = image::open(&output).unwrap();
    assert_eq!(written.dimensions(), (8, 6));
    assert!(!written.color().has_alpha());
}

#[test]
fn test_pipeline_from_json() {
    let json = r#"[
        {"processor_name": "gradient_color", "width": 5, "height": 2, "start_color": "black", "end_color": "white"},
        {"processor_name": "margin", "left_margin": 1}
    ]"#;
    let specs = load_pipeline(json).unwrap();

    let out = run(specs, None);
    assert_eq!(out[0].dimensions(), (6, 2));
    assert_eq!(out[0].get_pixel(1, 0), Rgba([0, 0, 0, 255]));
    assert_eq!(out[0].get_pixel(5, 1), Rgba([255, 255, 255, 255]));
}

#[test]
fn test_intermediates_are_persisted() {
    let dir = TempDir::new().unwrap();
    let options = ExecutionOptions::new()
        .with_save_intermediates(true)
        .with_scratch_dir(dir.path());
    let specs = vec![
        StageSpec::new("solid_color").with("width", 4).with("height", 4),
        StageSpec::new("margin").with("left_margin", 2),
    ];

    let output = executor()
        .with_options(options)
        .execute(PipelineJob::new(specs))
        .unwrap();

    assert_eq!(output.persisted.len(), 1);
    assert!(output.persisted[0].starts_with(dir.path()));
    // two stages plus the final buffer
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 3);
}
