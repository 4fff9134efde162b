//! `tagscan` command line front end.
//!
//! [`run`] is generic over the detection engine so the whole command flow can
//! be driven in-process; the binary plugs in the AprilTag engine.

use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use tagscan_core::{init_with_level, level_from_verbosity};
use tagscan_engine::DetectionEngine;

use crate::report::{
    to_text, write_batch_summary, write_detections, write_file_outcome, write_intrinsics,
    write_posed_detections,
};
use crate::{
    annotate, classify, detect, BatchOptions, BatchReport, BatchScanner, DetectionReport,
    DetectorRegistry, ExtensionMatch, FileImageLoader, ImageFormatKind, ImageLoader, LabelFont,
    PoseConfig, TagscanConfig,
};

/// Directory scanned when `scan` gets no argument.
pub const DEFAULT_SCAN_DIR: &str = "ros2ws/apriltag/";

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser, Debug)]
#[command(name = "tagscan")]
#[command(about = "Detect AprilTag fiducials in image files and estimate their poses")]
#[command(version)]
struct Cli {
    /// JSON config file; command line flags override its values.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// More log output (repeatable).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Less log output (repeatable).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    quiet: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Detect tags in a single image.
    Detect(DetectArgs),

    /// Detect tags in every image of a directory.
    Scan(ScanArgs),
}

#[derive(Args, Debug, Clone, Default)]
struct PoseArgs {
    /// Estimate a pose for every detected tag.
    #[arg(long)]
    pose: bool,

    /// Tag border side in meters (implies --pose).
    #[arg(long)]
    tag_size: Option<f64>,

    /// Focal length x in pixels (implies --pose).
    #[arg(long)]
    fx: Option<f64>,

    /// Focal length y in pixels (implies --pose).
    #[arg(long)]
    fy: Option<f64>,

    /// Principal point x in pixels; image center when omitted (implies --pose).
    #[arg(long)]
    cx: Option<f64>,

    /// Principal point y in pixels; image center when omitted (implies --pose).
    #[arg(long)]
    cy: Option<f64>,
}

impl PoseArgs {
    fn requested(&self) -> bool {
        self.pose
            || self.tag_size.is_some()
            || self.fx.is_some()
            || self.fy.is_some()
            || self.cx.is_some()
            || self.cy.is_some()
    }

    /// Pose settings from the config file overlaid with the flags.
    fn resolve(&self, base: Option<PoseConfig>) -> CliResult<Option<PoseConfig>> {
        if base.is_none() && !self.requested() {
            return Ok(None);
        }
        let mut pose = base.unwrap_or_default();
        if let Some(v) = self.tag_size {
            pose.tag_size = v;
        }
        if let Some(v) = self.fx {
            pose.fx = v;
        }
        if let Some(v) = self.fy {
            pose.fy = v;
        }
        if self.cx.is_some() {
            pose.cx = self.cx;
        }
        if self.cy.is_some() {
            pose.cy = self.cy;
        }
        pose.validate()?;
        Ok(Some(pose))
    }
}

#[derive(Args, Debug, Clone)]
struct DetectArgs {
    /// Image file (PGM/PNM/PNG or JPEG).
    image: PathBuf,

    #[command(flatten)]
    pose: PoseArgs,

    /// Maximum number of detections reported.
    #[arg(long)]
    capacity: Option<usize>,

    /// Write a JSON report to this path.
    #[arg(long)]
    json: Option<PathBuf>,

    /// Write an annotated copy of the image to this path.
    #[arg(long)]
    annotate: Option<PathBuf>,

    /// TrueType font for annotation labels; without it only shapes are drawn.
    #[arg(long, requires = "annotate")]
    font: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
struct ScanArgs {
    /// Directory to scan.
    #[arg(default_value = DEFAULT_SCAN_DIR)]
    directory: PathBuf,

    /// Accept files whose name merely contains an image extension.
    #[arg(long)]
    contains_match: bool,

    #[command(flatten)]
    pose: PoseArgs,

    /// Maximum number of detections kept per image.
    #[arg(long)]
    capacity: Option<usize>,

    /// Write a JSON report to this path.
    #[arg(long)]
    json: Option<PathBuf>,
}

/// Parse `args` (program name first), run the command and return the exit code.
///
/// Reports go to `out`, problems to `err`. Argument errors exit with 1, help
/// and version with 0.
pub fn run<E, I, T>(args: I, engine: E, out: &mut dyn Write, err: &mut dyn Write) -> i32
where
    E: DetectionEngine,
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(e) => {
            let text = e.render().to_string();
            if e.use_stderr() {
                let _ = err.write_all(text.as_bytes());
                return 1;
            }
            let _ = out.write_all(text.as_bytes());
            return 0;
        }
    };

    let _ = init_with_level(level_from_verbosity(cli.verbose, cli.quiet));

    let result = load_config(cli.config.as_deref()).and_then(|config| match &cli.command {
        Commands::Detect(args) => run_detect(args, config, engine, out),
        Commands::Scan(args) => run_scan(args, config, engine, out),
    });

    match result {
        Ok(()) => 0,
        Err(e) => {
            log::error!("{e}");
            let _ = writeln!(err, "error: {e}");
            1
        }
    }
}

fn load_config(path: Option<&Path>) -> CliResult<TagscanConfig> {
    match path {
        Some(path) => Ok(TagscanConfig::load_json(path)?),
        None => Ok(TagscanConfig::default()),
    }
}

fn build_registry<E: DetectionEngine>(
    engine: E,
    config: &TagscanConfig,
) -> CliResult<DetectorRegistry<E>> {
    let mut registry = DetectorRegistry::with_families(engine, config.families.iter().cloned())
        .with_config(config.detector.clone());
    registry.init()?;
    Ok(registry)
}

fn run_detect<E: DetectionEngine>(
    args: &DetectArgs,
    config: TagscanConfig,
    engine: E,
    out: &mut dyn Write,
) -> CliResult<()> {
    let capacity = args.capacity.unwrap_or(config.capacity);
    let pose = args.pose.resolve(config.pose)?;
    let font = args.font.as_deref().map(LabelFont::load).transpose()?;
    let mut registry = build_registry(engine, &config)?;

    let format = args
        .image
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| classify(n, ExtensionMatch::Suffix))
        .unwrap_or(ImageFormatKind::Pnm);
    let image = FileImageLoader
        .load(&args.image, format)
        .map_err(|e| format!("failed to load image: {e}"))?;
    let size = (image.width(), image.height());
    writeln!(out, "Image loaded: {}x{}", size.0, size.1)?;
    let base = args.annotate.as_ref().map(|_| image.clone());

    let report = match pose {
        Some(pose) => {
            let estimator = pose.estimator_for(size.0, size.1);
            let posed = estimator.detect_with_pose(&mut registry, image, capacity)?;
            let text = to_text(|s| {
                write_intrinsics(s, estimator.intrinsics(), estimator.tag_size())?;
                std::fmt::Write::write_char(s, '\n')?;
                write_posed_detections(s, &posed)
            });
            out.write_all(text.as_bytes())?;
            DetectionReport::from_posed(
                args.image.clone(),
                size,
                *estimator.intrinsics(),
                estimator.tag_size(),
                posed,
            )
        }
        None => {
            let detections = detect(&mut registry, image, capacity)?;
            out.write_all(to_text(|s| write_detections(s, &detections)).as_bytes())?;
            DetectionReport::from_detections(args.image.clone(), size, detections)
        }
    };

    if let Some(path) = &args.json {
        report.write_json(path)?;
        log::info!("report written to {}", path.display());
    }
    if let (Some(path), Some(base)) = (&args.annotate, &base) {
        annotate(base, &report.tags, font.as_ref()).save(path)?;
        log::info!("annotated image written to {}", path.display());
    }
    registry.cleanup();
    Ok(())
}

fn run_scan<E: DetectionEngine>(
    args: &ScanArgs,
    config: TagscanConfig,
    engine: E,
    out: &mut dyn Write,
) -> CliResult<()> {
    let options = BatchOptions {
        capacity: args.capacity.unwrap_or(config.capacity),
        extension_match: if args.contains_match {
            ExtensionMatch::Contains
        } else {
            config.extension_match
        },
        pose: args.pose.resolve(config.pose)?,
    };
    let mut registry = build_registry(engine, &config)?;

    writeln!(out, "Scanning directory: {}", args.directory.display())?;
    let scanner = BatchScanner::new(options);
    let mut write_failed = None;
    let scanned = scanner.scan_directory_with(&mut registry, &args.directory, |outcome| {
        let text = to_text(|s| write_file_outcome(s, outcome));
        if let Err(e) = out.write_all(text.as_bytes()) {
            write_failed.get_or_insert(e);
        }
    });
    let result = scanned?;
    if let Some(e) = write_failed {
        return Err(e.into());
    }
    out.write_all(to_text(|s| write_batch_summary(s, &result)).as_bytes())?;

    if let Some(path) = &args.json {
        BatchReport::new(result).write_json(path)?;
        log::info!("report written to {}", path.display());
    }
    registry.cleanup();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_defaults_to_the_workspace_tag_directory() {
        let cli = Cli::try_parse_from(["tagscan", "scan"]).expect("parse");
        match cli.command {
            Commands::Scan(args) => {
                assert_eq!(args.directory, PathBuf::from(DEFAULT_SCAN_DIR));
                assert!(!args.contains_match);
                assert!(!args.pose.requested());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn intrinsics_flags_imply_pose() {
        let cli = Cli::try_parse_from(["tagscan", "detect", "a.png", "--fx", "800", "-v"])
            .expect("parse");
        assert_eq!(cli.verbose, 1);
        let Commands::Detect(args) = cli.command else {
            panic!("expected detect");
        };
        let pose = args.pose.resolve(None).expect("valid").expect("pose");
        assert_eq!(pose.fx, 800.0);
        assert_eq!(pose.fy, 500.0);
        assert_eq!(pose.tag_size, 0.1);
        assert!(pose.cx.is_none());
    }

    #[test]
    fn flags_override_config_pose() {
        let args = PoseArgs {
            tag_size: Some(0.2),
            ..PoseArgs::default()
        };
        let base = PoseConfig {
            fx: 650.0,
            cx: Some(10.0),
            ..PoseConfig::default()
        };
        let pose = args.resolve(Some(base)).expect("valid").expect("pose");
        assert_eq!(pose.tag_size, 0.2);
        assert_eq!(pose.fx, 650.0);
        assert_eq!(pose.cx, Some(10.0));

        let bad = PoseArgs {
            tag_size: Some(0.0),
            ..PoseArgs::default()
        };
        assert!(bad.resolve(None).is_err());
    }

    #[test]
    fn font_needs_an_annotation_target() {
        assert!(Cli::try_parse_from(["tagscan", "detect", "a.png", "--font", "f.ttf"]).is_err());
        let cli = Cli::try_parse_from([
            "tagscan", "detect", "a.png", "--annotate", "out.png", "--font", "f.ttf",
        ])
        .expect("parse");
        let Commands::Detect(args) = cli.command else {
            panic!("expected detect");
        };
        assert_eq!(args.annotate, Some(PathBuf::from("out.png")));
        assert_eq!(args.font, Some(PathBuf::from("f.ttf")));
    }
}
