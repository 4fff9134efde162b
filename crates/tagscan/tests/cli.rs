#![cfg(feature = "cli")]

use std::fs;
use std::path::Path;

use tagscan::cli::run;
use tagscan::engine::{RawDetection, ScriptedEngine};
use tagscan::{DetectionReport, TagscanConfig};

fn write_png(path: &Path, width: u32, height: u32) {
    image::GrayImage::from_pixel(width, height, image::Luma([90]))
        .save_with_format(path, image::ImageFormat::Png)
        .expect("write png");
}

fn run_with(engine: ScriptedEngine, args: &[&str]) -> (i32, String, String) {
    let mut out = Vec::new();
    let mut err = Vec::new();
    let argv = std::iter::once("tagscan").chain(args.iter().copied());
    let code = run(argv, engine, &mut out, &mut err);
    (
        code,
        String::from_utf8(out).expect("utf8 stdout"),
        String::from_utf8(err).expect("utf8 stderr"),
    )
}

#[test]
fn help_and_version_exit_zero() {
    let (code, out, _) = run_with(ScriptedEngine::new(), &["--help"]);
    assert_eq!(code, 0);
    assert!(out.contains("detect"));
    assert!(out.contains("scan"));

    let (code, out, _) = run_with(ScriptedEngine::new(), &["--version"]);
    assert_eq!(code, 0);
    assert!(out.contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn argument_errors_exit_one() {
    let (code, _, err) = run_with(ScriptedEngine::new(), &["detect"]);
    assert_eq!(code, 1);
    assert!(!err.is_empty());

    let (code, _, _) = run_with(ScriptedEngine::new(), &["detect", "a.png", "--capacity", "x"]);
    assert_eq!(code, 1);

    let (code, _, _) = run_with(ScriptedEngine::new(), &[]);
    assert_eq!(code, 1);
}

#[test]
fn detect_prints_tags_and_writes_json() {
    let dir = tempfile::tempdir().expect("tempdir");
    let image = dir.path().join("tag.png");
    let report = dir.path().join("report.json");
    write_png(&image, 40, 30);

    let engine = ScriptedEngine::new();
    engine.push_frame(vec![
        RawDetection::synthetic(4, "tag36h11", [20.0, 15.0], 6.0),
        RawDetection::synthetic(8, "tag36h11", [10.0, 10.0], 3.0),
    ]);

    let (code, out, err) = run_with(
        engine,
        &[
            "detect",
            image.to_str().expect("utf8 path"),
            "--capacity",
            "1",
            "--json",
            report.to_str().expect("utf8 path"),
        ],
    );
    assert_eq!(code, 0, "stderr: {err}");
    assert!(out.contains("Image loaded: 40x30"));
    assert!(out.contains("Total detections: 1"));
    assert!(out.contains("(showing 1 of 2 detections)"));
    assert!(out.contains("Tag ID: 4"));
    assert!(!out.contains("Tag ID: 8"));

    let report: DetectionReport = tagscan::report::load_json(&report).expect("report");
    assert_eq!((report.width, report.height), (40, 30));
    assert_eq!(report.engine_count, 2);
    assert!(report.truncated);
    assert_eq!(report.tags.len(), 1);
    assert!(report.tags[0].pose.is_none());
}

#[test]
fn detect_with_pose_reports_distance() {
    let dir = tempfile::tempdir().expect("tempdir");
    let image = dir.path().join("tag.pgm");
    write_png(&image, 640, 480);

    let engine = ScriptedEngine::new();
    engine.push_frame(vec![RawDetection::synthetic(
        2,
        "tag36h11",
        [320.0, 240.0],
        25.0,
    )]);

    let (code, out, err) = run_with(
        engine,
        &["detect", image.to_str().expect("utf8 path"), "--pose"],
    );
    assert_eq!(code, 0, "stderr: {err}");
    assert!(out.contains("fx: 500.0 pixels"));
    assert!(out.contains("cx: 320.0 pixels"));
    assert!(out.contains("Tag size: 0.10 meters"));
    assert!(out.contains("Distance: 1.000 meters"));
    let angles = out
        .lines()
        .find_map(|l| l.trim().strip_prefix("Rotation (roll,pitch,yaw): "))
        .expect("rotation line");
    // A facing tag may print negative zeros.
    assert_eq!(angles.replace('-', ""), "(0.0°, 0.0°, 0.0°)");
}

#[test]
fn detect_writes_annotated_image() {
    let dir = tempfile::tempdir().expect("tempdir");
    let image = dir.path().join("tag.png");
    let annotated = dir.path().join("annotated.png");
    write_png(&image, 40, 30);

    let engine = ScriptedEngine::new();
    engine.push_frame(vec![RawDetection::synthetic(4, "tag36h11", [20.0, 15.0], 6.0)]);

    let (code, _, err) = run_with(
        engine,
        &[
            "detect",
            image.to_str().expect("utf8 path"),
            "--annotate",
            annotated.to_str().expect("utf8 path"),
        ],
    );
    assert_eq!(code, 0, "stderr: {err}");

    let out = image::open(&annotated).expect("annotated png").to_rgb8();
    assert_eq!(out.dimensions(), (40, 30));
    assert_eq!(*out.get_pixel(20, 15), tagscan::annotate::CENTER_COLOR);
    assert_eq!(*out.get_pixel(0, 29), image::Rgb([90, 90, 90]));
}

#[test]
fn unreadable_font_exits_one() {
    let dir = tempfile::tempdir().expect("tempdir");
    let image = dir.path().join("tag.png");
    write_png(&image, 40, 30);

    let (code, _, err) = run_with(
        ScriptedEngine::new(),
        &[
            "detect",
            image.to_str().expect("utf8 path"),
            "--annotate",
            dir.path().join("out.png").to_str().expect("utf8 path"),
            "--font",
            dir.path().join("missing.ttf").to_str().expect("utf8 path"),
        ],
    );
    assert_eq!(code, 1);
    assert!(err.contains("cannot read font"));
    assert!(!dir.path().join("out.png").exists());
}

#[test]
fn unreadable_image_exits_one() {
    let dir = tempfile::tempdir().expect("tempdir");
    let missing = dir.path().join("missing.png");
    let (code, _, err) = run_with(
        ScriptedEngine::new(),
        &["detect", missing.to_str().expect("utf8 path")],
    );
    assert_eq!(code, 1);
    assert!(err.contains("failed to load image"));
}

#[test]
fn engine_initialization_failure_exits_one() {
    let dir = tempfile::tempdir().expect("tempdir");
    let image = dir.path().join("tag.png");
    write_png(&image, 8, 8);
    let (code, _, err) = run_with(
        ScriptedEngine::new().failing_detector_creation(),
        &["detect", image.to_str().expect("utf8 path")],
    );
    assert_eq!(code, 1);
    assert!(err.contains("initialization failed"));
}

#[test]
fn scan_survives_bad_files_and_reports_summary() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_png(&dir.path().join("good.png"), 16, 16);
    fs::write(dir.path().join("bad.jpg"), b"not a jpeg").expect("write");

    let engine = ScriptedEngine::new();
    engine.push_frame(vec![RawDetection::synthetic(1, "tag36h11", [8.0, 8.0], 2.0)]);

    let (code, out, err) = run_with(
        engine,
        &["scan", dir.path().to_str().expect("utf8 path")],
    );
    assert_eq!(code, 0, "stderr: {err}");
    assert!(out.contains("Scanning directory:"));
    assert!(out.contains("Processing: good.png"));
    assert!(out.contains("Processing: bad.jpg"));
    assert!(out.contains("Files skipped: 1"));
    assert!(out.contains("Total tags detected: 1"));
}

#[test]
fn scan_of_missing_directory_exits_one() {
    let dir = tempfile::tempdir().expect("tempdir");
    let missing = dir.path().join("nope");
    let (code, _, err) = run_with(
        ScriptedEngine::new(),
        &["scan", missing.to_str().expect("utf8 path")],
    );
    assert_eq!(code, 1);
    assert!(err.contains("cannot open directory"));
}

#[test]
fn config_file_sets_capacity_and_families() {
    let dir = tempfile::tempdir().expect("tempdir");
    let image = dir.path().join("tag.png");
    write_png(&image, 8, 8);
    let config_path = dir.path().join("tagscan.json");
    TagscanConfig {
        families: vec!["tag16h5".into()],
        capacity: 2,
        ..TagscanConfig::default()
    }
    .write_json(&config_path)
    .expect("config");

    let engine = ScriptedEngine::new();
    let stats = engine.stats();
    engine.push_frame(
        (0..5)
            .map(|i| RawDetection::synthetic(i, "tag16h5", [4.0, 4.0], 1.0))
            .collect(),
    );

    let (code, out, err) = run_with(
        engine,
        &[
            "--config",
            config_path.to_str().expect("utf8 path"),
            "detect",
            image.to_str().expect("utf8 path"),
        ],
    );
    assert_eq!(code, 0, "stderr: {err}");
    assert!(out.contains("(showing 2 of 5 detections)"));
    assert_eq!(stats.families_created(), 1);
}
