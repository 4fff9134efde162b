use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};
use tagscan_core::{CameraIntrinsics, LumaImage};

use crate::homography_pose::TAG_CORNER_COORDS;
use crate::{DetectorConfig, EngineError};

/// One detection exactly as the engine reports it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    pub id: u32,
    /// Full family name; may exceed the record field width.
    pub family: String,
    pub hamming: u32,
    pub decision_margin: f64,
    pub center: [f64; 2],
    /// Corners in engine order, matching [`TAG_CORNER_COORDS`].
    pub corners: [[f64; 2]; 4],
    /// Maps tag coordinates in `[-1, 1]^2` to pixels.
    pub homography: Matrix3<f64>,
}

impl RawDetection {
    /// Axis-aligned detection of a tag centered at `center` with half side
    /// `half_size` pixels; corners and homography are mutually consistent.
    pub fn synthetic(id: u32, family: &str, center: [f64; 2], half_size: f64) -> Self {
        let homography = Matrix3::new(
            half_size, 0.0, center[0], //
            0.0, half_size, center[1], //
            0.0, 0.0, 1.0,
        );
        let corners = TAG_CORNER_COORDS.map(|[u, v]| {
            [center[0] + half_size * u, center[1] + half_size * v]
        });
        Self {
            id,
            family: family.to_string(),
            hamming: 0,
            decision_margin: 100.0,
            center,
            corners,
            homography,
        }
    }
}

/// Rotation, translation and residual returned by an engine pose solver.
#[derive(Clone, Debug, PartialEq)]
pub struct EnginePose {
    pub rotation: Matrix3<f64>,
    pub translation: Vector3<f64>,
    /// Solver residual, in the engine's own units.
    pub error: f64,
}

/// Engine-owned marker family handle.
pub trait MarkerFamily {
    fn name(&self) -> &str;
}

/// Engine-owned detector handle. Dropping it releases the engine resources.
pub trait EngineDetector {
    type Family: MarkerFamily;

    fn configure(&mut self, config: &DetectorConfig) -> Result<(), EngineError>;

    fn register_family(&mut self, family: &Self::Family) -> Result<(), EngineError>;

    /// Run detection once, synchronously, on a canonical luma image.
    fn detect(&mut self, image: &LumaImage) -> Result<Vec<RawDetection>, EngineError>;

    /// Solve the camera-frame pose of a detected tag.
    ///
    /// `tag_size` is the side of the tag's black border square.
    fn estimate_pose(
        &self,
        detection: &RawDetection,
        intrinsics: &CameraIntrinsics,
        tag_size: f64,
    ) -> Result<EnginePose, EngineError>;
}

/// Factory for detector and family handles.
pub trait DetectionEngine {
    type Family: MarkerFamily;
    type Detector: EngineDetector<Family = Self::Family>;

    fn create_detector(&self) -> Result<Self::Detector, EngineError>;

    fn create_family(&self, name: &str) -> Result<Self::Family, EngineError>;
}
