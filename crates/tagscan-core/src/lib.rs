//! Core types for fiducial tag detection pipelines.
//!
//! This crate is intentionally small. It knows nothing about a concrete
//! detection engine or image file formats; it only provides:
//! - the canonical strided luma image handed to an engine,
//! - conversion of raw 1- and 3-channel buffers into that image,
//! - the caller-facing detection record with its fixed-width family name,
//! - camera intrinsics, pose estimates and the Euler decomposition,
//! - a minimal `log` backend.

mod convert;
mod image;
mod logger;
mod pose;
mod record;

pub use convert::{convert_to_luma, rgb_to_luma, ConvertError};
pub use image::{LumaImage, STRIDE_ALIGNMENT};
pub use pose::{rotation_to_euler, CameraIntrinsics, EulerAngles, PoseEstimate, SINGULAR_EPS};
pub use record::{DetectionRecord, FamilyName, FAMILY_NAME_CAPACITY};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::{init_with_level, level_from_verbosity};
