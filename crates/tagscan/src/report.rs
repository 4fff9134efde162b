//! Human-readable and JSON reports of detections, poses and batch scans.

use std::fmt::{self, Write};
use std::{fs, path::Path, path::PathBuf};

use serde::{Deserialize, Serialize};
use tagscan_core::{CameraIntrinsics, DetectionRecord, PoseEstimate};

use crate::{BatchResult, Detections, FileOutcome, PosedDetection, PosedDetections};

#[derive(thiserror::Error, Debug)]
pub enum ReportError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Write one record as an indented block, numbered from 1.
pub fn write_record(
    out: &mut impl Write,
    index: usize,
    record: &DetectionRecord,
    indent: &str,
) -> fmt::Result {
    writeln!(out, "{indent}Detection {}:", index + 1)?;
    writeln!(out, "{indent}  Tag ID: {}", record.id)?;
    writeln!(out, "{indent}  Family: {}", record.family)?;
    writeln!(
        out,
        "{indent}  Center: ({:.2}, {:.2})",
        record.center[0], record.center[1]
    )?;
    writeln!(out, "{indent}  Hamming Distance: {}", record.hamming)?;
    writeln!(out, "{indent}  Decision Margin: {:.3}", record.decision_margin)?;
    writeln!(out, "{indent}  Corners:")?;
    for (j, c) in record.corners.iter().enumerate() {
        writeln!(out, "{indent}    Corner {}: ({:.2}, {:.2})", j + 1, c[0], c[1])?;
    }
    Ok(())
}

/// Write the pose block of one tag.
///
/// Numbers are printed like `printf("%.3f")`: a negative value that rounds to
/// zero keeps its sign (`-0.000`).
pub fn write_pose(out: &mut impl Write, pose: &PoseEstimate, indent: &str) -> fmt::Result {
    let t = &pose.translation;
    let e = &pose.euler;
    writeln!(out, "{indent}Pose Estimation:")?;
    writeln!(out, "{indent}  Distance: {:.3} meters", pose.distance)?;
    writeln!(
        out,
        "{indent}  Position (x,y,z): ({:.3}, {:.3}, {:.3}) meters",
        t.x, t.y, t.z
    )?;
    writeln!(
        out,
        "{indent}  Rotation (roll,pitch,yaw): ({:.1}°, {:.1}°, {:.1}°)",
        e.roll, e.pitch, e.yaw
    )?;
    writeln!(out, "{indent}  Pose error: {:.6}", pose.error)?;
    writeln!(out, "{indent}  Rotation Matrix:")?;
    for row in 0..3 {
        write!(out, "{indent}    [")?;
        for col in 0..3 {
            write!(out, " {:8.4}", pose.rotation[(row, col)])?;
        }
        writeln!(out, " ]")?;
    }
    Ok(())
}

pub fn write_intrinsics(
    out: &mut impl Write,
    intrinsics: &CameraIntrinsics,
    tag_size: f64,
) -> fmt::Result {
    writeln!(out, "Camera Parameters:")?;
    writeln!(out, "  fx: {:.1} pixels", intrinsics.fx)?;
    writeln!(out, "  fy: {:.1} pixels", intrinsics.fy)?;
    writeln!(out, "  cx: {:.1} pixels", intrinsics.cx)?;
    writeln!(out, "  cy: {:.1} pixels", intrinsics.cy)?;
    writeln!(out, "  Tag size: {tag_size:.2} meters")
}

fn write_truncation(out: &mut impl Write, kept: usize, engine_count: usize) -> fmt::Result {
    if kept < engine_count {
        writeln!(out, "(showing {kept} of {engine_count} detections)")?;
    }
    Ok(())
}

pub fn write_detections(out: &mut impl Write, detections: &Detections) -> fmt::Result {
    writeln!(out, "=== Tag Detection Results ===")?;
    writeln!(out, "Total detections: {}", detections.len())?;
    write_truncation(out, detections.len(), detections.engine_count)?;
    writeln!(out)?;
    for (i, record) in detections.records.iter().enumerate() {
        write_record(out, i, record, "")?;
        writeln!(out)?;
    }
    Ok(())
}

pub fn write_posed_detections(out: &mut impl Write, posed: &PosedDetections) -> fmt::Result {
    writeln!(out, "=== Tag Detection Results with Pose ===")?;
    writeln!(out, "Total detections: {}", posed.detections.len())?;
    write_truncation(out, posed.detections.len(), posed.engine_count)?;
    writeln!(out)?;
    for (i, d) in posed.detections.iter().enumerate() {
        write_record(out, i, &d.record, "")?;
        match &d.pose {
            Some(pose) => write_pose(out, pose, "  ")?,
            None => writeln!(out, "  Pose Estimation: unavailable")?,
        }
        writeln!(out)?;
    }
    Ok(())
}

pub fn write_file_outcome(out: &mut impl Write, outcome: &FileOutcome) -> fmt::Result {
    let name = outcome
        .path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| outcome.path.display().to_string());
    writeln!(out)?;
    writeln!(out, "Processing: {name}")?;
    if let Some((w, h)) = outcome.dimensions {
        writeln!(out, "  Image size: {w}x{h}")?;
    }
    if let Some(error) = &outcome.error {
        writeln!(out, "  Skipped: {error}")?;
        return Ok(());
    }
    writeln!(out, "  Detections found: {}", outcome.engine_count)?;
    write_truncation(out, outcome.records.len(), outcome.engine_count)?;
    for (i, record) in outcome.records.iter().enumerate() {
        write_record(out, i, record, "  ")?;
        if let Some(Some(pose)) = outcome.poses.as_ref().and_then(|p| p.get(i)) {
            write_pose(out, pose, "    ")?;
        }
    }
    Ok(())
}

pub fn write_batch_summary(out: &mut impl Write, result: &BatchResult) -> fmt::Result {
    writeln!(out)?;
    writeln!(out, "=== SUMMARY ===")?;
    writeln!(out, "Directory: {}", result.directory.display())?;
    writeln!(out, "Files processed: {}", result.files_seen - result.files_skipped)?;
    writeln!(out, "Files skipped: {}", result.files_skipped)?;
    writeln!(out, "Total tags detected: {}", result.total_detections)
}

/// Run one of the `write_*` functions into a fresh string.
pub fn to_text(f: impl FnOnce(&mut String) -> fmt::Result) -> String {
    let mut s = String::new();
    // Writing into a String cannot fail.
    let _ = f(&mut s);
    s
}

/// JSON report of a single image.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionReport {
    pub version: String,
    pub image: PathBuf,
    pub width: usize,
    pub height: usize,
    pub engine_count: usize,
    pub truncated: bool,
    #[serde(default)]
    pub camera: Option<CameraIntrinsics>,
    #[serde(default)]
    pub tag_size: Option<f64>,
    pub tags: Vec<PosedDetection>,
}

impl DetectionReport {
    pub fn from_detections(image: PathBuf, size: (usize, usize), detections: Detections) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            image,
            width: size.0,
            height: size.1,
            engine_count: detections.engine_count,
            truncated: detections.truncated,
            camera: None,
            tag_size: None,
            tags: detections
                .records
                .into_iter()
                .map(|record| PosedDetection { record, pose: None })
                .collect(),
        }
    }

    pub fn from_posed(
        image: PathBuf,
        size: (usize, usize),
        intrinsics: CameraIntrinsics,
        tag_size: f64,
        posed: PosedDetections,
    ) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            image,
            width: size.0,
            height: size.1,
            engine_count: posed.engine_count,
            truncated: posed.truncated,
            camera: Some(intrinsics),
            tag_size: Some(tag_size),
            tags: posed.detections,
        }
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ReportError> {
        write_json(self, path)
    }
}

/// JSON report of a directory scan.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub version: String,
    #[serde(flatten)]
    pub result: BatchResult,
}

impl BatchReport {
    pub fn new(result: BatchResult) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            result,
        }
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ReportError> {
        write_json(self, path)
    }
}

fn write_json<T: Serialize>(value: &T, path: impl AsRef<Path>) -> Result<(), ReportError> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json)?;
    Ok(())
}

/// Read back a report written by one of the `write_json` methods.
pub fn load_json<T: for<'de> Deserialize<'de>>(path: impl AsRef<Path>) -> Result<T, ReportError> {
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}
