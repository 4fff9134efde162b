//! Detection engine capability for tagscan.
//!
//! The quad extraction / payload decoding algorithm is treated as an opaque
//! capability. This crate only describes its boundary:
//! - [`DetectionEngine`] creates detector and family handles,
//! - [`EngineDetector`] is configured, gets families registered, detects and
//!   solves poses,
//! - handles are released by `Drop`.
//!
//! Two engines are provided: [`ScriptedEngine`], which replays canned
//! detections, counts every handle it hands out and solves poses with
//! [`solve_pose_from_homography`], and (feature `apriltag`) `AprilTagEngine`
//! backed by the `apriltag` crate and its own pose solver.

#[cfg(feature = "apriltag")]
mod apriltag_backend;
mod config;
mod engine;
mod error;
mod homography_pose;
mod scripted;

#[cfg(feature = "apriltag")]
pub use apriltag_backend::{AprilTagDetector, AprilTagEngine, AprilTagFamily};
pub use config::{DetectorConfig, DEFAULT_FAMILIES, MAX_HAMMING_LIMIT};
pub use engine::{DetectionEngine, EngineDetector, EnginePose, MarkerFamily, RawDetection};
pub use error::EngineError;
pub use homography_pose::{
    reprojection_error, solve_pose_from_homography, tag_object_point, TAG_CORNER_COORDS,
};
pub use scripted::{EngineStats, ScriptedDetector, ScriptedEngine, ScriptedFamily};
