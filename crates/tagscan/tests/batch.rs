use std::fs;
use std::path::Path;

use tagscan::engine::{RawDetection, ScriptedEngine};
use tagscan::{
    BatchOptions, BatchReport, BatchScanner, DetectorRegistry, ExtensionMatch, ImageFormatKind,
    PipelineError, PoseConfig, ScanError,
};

fn write_gray_png(path: &Path, width: u32, height: u32) {
    image::GrayImage::from_fn(width, height, |x, y| image::Luma([((x + y) % 256) as u8]))
        .save_with_format(path, image::ImageFormat::Png)
        .expect("write png");
}

fn write_rgb_jpg(path: &Path, width: u32, height: u32) {
    image::RgbImage::from_pixel(width, height, image::Rgb([200, 100, 50]))
        .save(path)
        .expect("write jpg");
}

fn tags(n: u32) -> Vec<RawDetection> {
    (0..n)
        .map(|i| RawDetection::synthetic(i, "tag36h11", [10.0 * i as f64 + 8.0, 8.0], 4.0))
        .collect()
}

fn ready(engine: ScriptedEngine) -> DetectorRegistry<ScriptedEngine> {
    let mut registry = DetectorRegistry::new(engine);
    registry.init().expect("init");
    registry
}

#[test]
fn corrupt_file_is_skipped_and_totals_cover_loadable_files() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_gray_png(&dir.path().join("a.png"), 32, 24);
    write_rgb_jpg(&dir.path().join("b.jpg"), 16, 16);
    fs::write(dir.path().join("broken.pgm"), b"P5\n not really an image").expect("write");
    fs::write(dir.path().join("notes.txt"), b"hello").expect("write");
    fs::create_dir(dir.path().join("nested")).expect("mkdir");

    let engine = ScriptedEngine::new();
    engine.push_frame(tags(2));
    engine.push_frame(tags(3));
    let stats = engine.stats();
    let mut registry = ready(engine);

    let result = BatchScanner::new(BatchOptions::default())
        .scan_directory(&mut registry, dir.path())
        .expect("scan");

    assert_eq!(result.files_seen, 3);
    assert_eq!(result.files_skipped, 1);
    assert_eq!(result.entries_ignored, 2);
    assert_eq!(result.total_detections, 5);
    assert_eq!(stats.detect_calls(), 2);

    let broken = result
        .files
        .iter()
        .find(|f| f.path.ends_with("broken.pgm"))
        .expect("broken file outcome");
    assert!(broken.is_skipped());
    assert_eq!(broken.format, ImageFormatKind::Pnm);

    let jpg = result
        .files
        .iter()
        .find(|f| f.path.ends_with("b.jpg"))
        .expect("jpg outcome");
    assert_eq!(jpg.format, ImageFormatKind::Jpeg);
    assert_eq!(jpg.dimensions, Some((16, 16)));
}

#[test]
fn directories_with_image_names_are_ignored() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::create_dir(dir.path().join("frames.png")).expect("mkdir");
    write_gray_png(&dir.path().join("shot.png"), 8, 8);

    let engine = ScriptedEngine::new();
    engine.push_frame(tags(1));
    let stats = engine.stats();
    let mut registry = ready(engine);

    let result = BatchScanner::new(BatchOptions::default())
        .scan_directory(&mut registry, dir.path())
        .expect("scan");

    assert_eq!(result.files_seen, 1);
    assert_eq!(result.files_skipped, 0);
    assert_eq!(result.entries_ignored, 1);
    assert_eq!(result.total_detections, 1);
    assert_eq!(stats.detect_calls(), 1);
    assert!(result.files.iter().all(|f| !f.path.ends_with("frames.png")));
}

#[test]
fn engine_failure_skips_only_that_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_gray_png(&dir.path().join("one.png"), 8, 8);
    write_gray_png(&dir.path().join("two.pgm"), 8, 8);

    let engine = ScriptedEngine::new();
    engine.push_failure("engine hiccup");
    engine.push_frame(tags(4));
    let mut registry = ready(engine);

    let result = BatchScanner::new(BatchOptions::default())
        .scan_directory(&mut registry, dir.path())
        .expect("scan");

    assert_eq!(result.files_seen, 2);
    assert_eq!(result.files_skipped, 1);
    assert_eq!(result.total_detections, 4);
}

#[test]
fn capacity_bounds_each_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_gray_png(&dir.path().join("crowded.png"), 8, 8);

    let engine = ScriptedEngine::new();
    engine.push_frame(tags(9));
    let mut registry = ready(engine);

    let options = BatchOptions {
        capacity: 4,
        ..BatchOptions::default()
    };
    let result = BatchScanner::new(options)
        .scan_directory(&mut registry, dir.path())
        .expect("scan");

    assert_eq!(result.total_detections, 4);
    assert!(result.files[0].truncated);
    assert_eq!(result.files[0].engine_count, 9);
}

#[test]
fn suffix_and_contains_matching_differ_on_backup_names() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_gray_png(&dir.path().join("x.png.bak"), 8, 8);
    write_gray_png(&dir.path().join("UPPER.PNG"), 8, 8);

    let mut registry = ready(ScriptedEngine::new());

    let suffix = BatchScanner::new(BatchOptions::default())
        .scan_directory(&mut registry, dir.path())
        .expect("scan");
    assert_eq!(suffix.files_seen, 1);
    assert!(suffix.files[0].path.ends_with("UPPER.PNG"));
    assert_eq!(suffix.entries_ignored, 1);

    let contains = BatchScanner::new(BatchOptions {
        extension_match: ExtensionMatch::Contains,
        ..BatchOptions::default()
    })
    .scan_directory(&mut registry, dir.path())
    .expect("scan");
    assert_eq!(contains.files_seen, 1);
    assert!(contains.files[0].path.ends_with("x.png.bak"));
    assert_eq!(contains.files_skipped, 0);
}

#[test]
fn poses_are_attached_when_requested() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_gray_png(&dir.path().join("frame.png"), 64, 48);

    let engine = ScriptedEngine::new();
    engine.push_frame(vec![RawDetection::synthetic(
        9,
        "tag36h11",
        [32.0, 24.0],
        25.0,
    )]);
    let mut registry = ready(engine);

    let options = BatchOptions {
        pose: Some(PoseConfig::default()),
        ..BatchOptions::default()
    };
    let result = BatchScanner::new(options)
        .scan_directory(&mut registry, dir.path())
        .expect("scan");

    let poses = result.files[0].poses.as_ref().expect("poses");
    assert_eq!(poses.len(), 1);
    let pose = poses[0].as_ref().expect("pose");
    assert!((pose.distance - 1.0).abs() < 1e-9);
}

#[test]
fn missing_directory_is_an_open_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut registry = ready(ScriptedEngine::new());
    let err = BatchScanner::new(BatchOptions::default())
        .scan_directory(&mut registry, dir.path().join("does-not-exist"))
        .expect_err("must fail");
    assert!(matches!(err, ScanError::OpenDirectory { .. }));
}

#[test]
fn uninitialized_registry_fails_before_reading_the_directory() {
    let engine = ScriptedEngine::new();
    let stats = engine.stats();
    let mut registry = DetectorRegistry::new(engine);
    let err = BatchScanner::new(BatchOptions::default())
        .scan_directory(&mut registry, "/definitely/not/here")
        .expect_err("must fail");
    assert!(matches!(
        err,
        ScanError::Pipeline(PipelineError::NotInitialized)
    ));
    assert_eq!(stats.detect_calls(), 0);
}

#[test]
fn batch_report_is_written_as_json() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_gray_png(&dir.path().join("a.png"), 8, 8);
    let engine = ScriptedEngine::new();
    engine.push_frame(tags(1));
    let mut registry = ready(engine);

    let result = BatchScanner::new(BatchOptions::default())
        .scan_directory(&mut registry, dir.path())
        .expect("scan");

    let out = tempfile::tempdir().expect("tempdir");
    let path = out.path().join("batch.json");
    BatchReport::new(result.clone())
        .write_json(&path)
        .expect("write");

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&path).expect("read")).expect("json");
    assert_eq!(json["total_detections"], 1);
    assert_eq!(json["files"][0]["records"][0]["family"], "tag36h11");
    let back: BatchReport = tagscan::report::load_json(&path).expect("load");
    assert_eq!(back.result, result);
}
