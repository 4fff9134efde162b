//! Fiducial tag detection around a pluggable detection engine.
//!
//! This crate provides:
//! - [`DetectorRegistry`]: the engine detector and its marker families, with an
//!   idempotent `init`/`cleanup` lifecycle,
//! - [`detect`] / [`detect_buffer`]: one engine call mapped into a bounded list
//!   of [`DetectionRecord`](tagscan_core::DetectionRecord)s,
//! - [`PoseEstimator`]: camera-frame pose plus Euler angles and distance per tag,
//! - [`BatchScanner`]: a directory scan with per-file failure isolation,
//! - [`stream::FrameProcessor`]: detection on pushed raw frames,
//! - [`report`]: text and JSON reports,
//! - [`annotate`]: detection overlays drawn onto an RGB copy of the image,
//! - (feature `cli`) the `tagscan` command line front end in [`cli`].
//!
//! ## Quickstart
//!
//! ```
//! use tagscan::engine::{RawDetection, ScriptedEngine};
//! use tagscan::{detect_buffer, DetectorRegistry};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = ScriptedEngine::new();
//! engine.push_frame(vec![RawDetection::synthetic(3, "tag36h11", [32.0, 24.0], 8.0)]);
//!
//! let mut registry = DetectorRegistry::new(engine);
//! registry.init()?;
//!
//! let frame = vec![0u8; 64 * 48 * 3];
//! let detections = detect_buffer(&mut registry, &frame, 64, 48, 3, 10)?;
//! assert_eq!(detections.records[0].id, 3);
//! # Ok(())
//! # }
//! ```
//!
//! A real engine is available with the `apriltag` feature as
//! `tagscan::engine::AprilTagEngine`.

pub use tagscan_core as core;
pub use tagscan_engine as engine;

mod batch;
mod config;
mod error;
mod loader;
mod pipeline;
mod pose;
mod registry;

pub mod annotate;
pub mod report;
pub mod stream;

#[cfg(feature = "cli")]
pub mod cli;

pub use annotate::{annotate, AnnotateError, LabelFont};
pub use batch::{BatchOptions, BatchResult, BatchScanner, FileOutcome, ScanError};
pub use config::{ConfigError, PoseConfig, TagscanConfig, DEFAULT_CAPACITY};
pub use error::PipelineError;
pub use loader::{
    classify, ExtensionMatch, FileImageLoader, ImageFormatKind, ImageLoader, LoadError,
};
pub use pipeline::{detect, detect_buffer, detect_raw, record_from_raw, Detections};
pub use pose::{PoseEstimator, PosedDetection, PosedDetections};
pub use registry::{DetectorRegistry, RegistryState};
pub use report::{BatchReport, DetectionReport, ReportError};
