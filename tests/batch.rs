//! Batch driver runs over real files.

use image::{GenericImageView, Rgb, RgbImage};
use passepartout::prelude::*;
use std::sync::Arc;
use tempfile::TempDir;

fn framing() -> StaticTemplate {
    StaticTemplate(vec![StageSpec::new("margin")
        .with("left_margin", 2)
        .with("right_margin", 2)
        .with("top_margin", 2)
        .with("bottom_margin", 2)])
}

fn processor(workers: usize) -> BatchProcessor {
    BatchProcessor::new()
        .with_workers(workers)
        .with_metadata_provider(Arc::new(NoMetadata))
}

#[test]
fn test_failures_are_isolated() {
    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    let mut items = Vec::new();
    for i in 0..5 {
        let source = input.path().join(format!("photo_{}.png", i));
        // the third photo is never written
        if i != 2 {
            RgbImage::from_pixel(10, 6, Rgb([9, 9, 9])).save(&source).unwrap();
        }
        items.push(BatchItem::new(source, output.path().join(format!("photo_{}.jpg", i))));
    }

    let report = processor(3).run(&items, &framing(), None).unwrap();

    assert_eq!(report.processed, 5);
    assert_eq!(report.success, 4);
    assert_eq!(report.failure, 1);
    assert_eq!(report.skipped, 0);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].0, items[2].source);
    for (i, item) in items.iter().enumerate() {
        assert_eq!(item.output.exists(), i != 2);
    }
    let framed = image::open(&items[0].output).unwrap();
    assert_eq!(framed.dimensions(), (14, 10));
}

#[test]
fn test_directory_run_reports_progress() {
    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    std::fs::create_dir(input.path().join("day1")).unwrap();
    for name in ["a.png", "day1/b.png", "day1/c.png"] {
        RgbImage::from_pixel(4, 4, Rgb([200, 10, 10])).save(input.path().join(name)).unwrap();
    }
    std::fs::write(input.path().join("notes.txt"), "not a photo").unwrap();

    let items = collect_items(input.path(), output.path()).unwrap();
    assert_eq!(items.len(), 3);

    let (tx, rx) = crossbeam::channel::unbounded();
    let report = processor(2).run(&items, &framing(), Some(tx)).unwrap();
    let events: Vec<BatchEvent> = rx.iter().collect();

    assert_eq!(report.success, 3);
    assert!(output.path().join("day1").join("c.png").exists());
    assert_eq!(events.first(), Some(&BatchEvent::Started { total: 3 }));
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, BatchEvent::ItemCompleted { .. }))
            .count(),
        3
    );
    assert!(matches!(
        events.last(),
        Some(BatchEvent::Completed { success: 3, failure: 0, skipped: 0, .. })
    ));
}

#[test]
fn test_existing_outputs_are_skipped_unless_overwriting() {
    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    let source = input.path().join("photo.png");
    RgbImage::from_pixel(4, 4, Rgb([0, 0, 0])).save(&source).unwrap();
    let target = output.path().join("photo.png");
    RgbImage::from_pixel(1, 1, Rgb([0, 0, 0])).save(&target).unwrap();
    let items = vec![BatchItem::new(&source, &target)];

    let report = processor(1).run(&items, &framing(), None).unwrap();
    assert_eq!((report.processed, report.skipped, report.success), (1, 1, 0));
    assert_eq!(image::open(&target).unwrap().dimensions(), (1, 1));

    let report = processor(1)
        .with_overwrite(true)
        .run(&items, &framing(), None)
        .unwrap();
    assert_eq!(report.success, 1);
    assert_eq!(image::open(&target).unwrap().dimensions(), (8, 8));
}
