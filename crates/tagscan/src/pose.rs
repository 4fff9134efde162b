use serde::{Deserialize, Serialize};
use tagscan_core::{CameraIntrinsics, DetectionRecord, LumaImage, PoseEstimate};
use tagscan_engine::{DetectionEngine, EngineDetector, RawDetection};

use crate::pipeline::{bound_detections, detect_raw};
use crate::{DetectorRegistry, PipelineError};

/// A bounded detection together with its pose, when one could be solved.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PosedDetection {
    pub record: DetectionRecord,
    pub pose: Option<PoseEstimate>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PosedDetections {
    pub detections: Vec<PosedDetection>,
    pub engine_count: usize,
    pub truncated: bool,
}

/// Turns engine detections into camera-frame poses for tags of a known size.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PoseEstimator {
    intrinsics: CameraIntrinsics,
    tag_size: f64,
}

impl PoseEstimator {
    /// `tag_size` is the side of the tag's black border, in the unit wanted
    /// for the translation.
    pub fn new(intrinsics: CameraIntrinsics, tag_size: f64) -> Self {
        Self {
            intrinsics,
            tag_size,
        }
    }

    pub fn intrinsics(&self) -> &CameraIntrinsics {
        &self.intrinsics
    }

    pub fn tag_size(&self) -> f64 {
        self.tag_size
    }

    /// Ask the engine for the tag pose and derive Euler angles and distance.
    pub fn estimate<E: DetectionEngine>(
        &self,
        registry: &DetectorRegistry<E>,
        raw: &RawDetection,
    ) -> Result<PoseEstimate, PipelineError> {
        let detector = registry.detector()?;
        let pose = detector.estimate_pose(raw, &self.intrinsics, self.tag_size)?;
        let estimate = PoseEstimate::new(pose.rotation, pose.translation, pose.error);
        log::trace!(
            "tag {} pose: distance {:.3}, rpy ({:.1}, {:.1}, {:.1}), error {:.6}",
            raw.id,
            estimate.distance,
            estimate.euler.roll,
            estimate.euler.pitch,
            estimate.euler.yaw,
            estimate.error
        );
        Ok(estimate)
    }

    /// Bounded detection plus a pose per kept tag.
    ///
    /// A pose failure for one tag is logged and leaves that tag's pose empty.
    pub fn detect_with_pose<E: DetectionEngine>(
        &self,
        registry: &mut DetectorRegistry<E>,
        image: LumaImage,
        capacity: usize,
    ) -> Result<PosedDetections, PipelineError> {
        let raw = detect_raw(registry, image)?;
        let bounded = bound_detections(&raw, capacity);

        let detections = bounded
            .records
            .into_iter()
            .zip(&raw)
            .map(|(record, raw)| {
                let pose = match self.estimate(registry, raw) {
                    Ok(pose) => Some(pose),
                    Err(e) => {
                        log::warn!("pose estimation failed for tag {}: {e}", raw.id);
                        None
                    }
                };
                PosedDetection { record, pose }
            })
            .collect();

        Ok(PosedDetections {
            detections,
            engine_count: bounded.engine_count,
            truncated: bounded.truncated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use tagscan_engine::ScriptedEngine;

    #[test]
    fn estimate_requires_initialized_registry() {
        let engine = ScriptedEngine::new();
        let stats = engine.stats();
        let registry = DetectorRegistry::new(engine);
        let est = PoseEstimator::new(CameraIntrinsics::new(500.0, 500.0, 0.0, 0.0), 0.1);
        let raw = RawDetection::synthetic(0, "tag36h11", [0.0, 0.0], 10.0);
        assert!(matches!(
            est.estimate(&registry, &raw),
            Err(PipelineError::NotInitialized)
        ));
        assert_eq!(stats.pose_calls(), 0);
    }

    #[test]
    fn fronto_parallel_tag_has_zero_angles() {
        let mut registry = DetectorRegistry::new(ScriptedEngine::new());
        registry.init().expect("init");
        let est = PoseEstimator::new(CameraIntrinsics::new(500.0, 500.0, 320.0, 240.0), 0.1);
        let raw = RawDetection::synthetic(5, "tag36h11", [320.0, 240.0], 25.0);

        let pose = est.estimate(&registry, &raw).expect("pose");
        assert_relative_eq!(pose.euler.roll, 0.0, epsilon = 1e-9);
        assert_relative_eq!(pose.euler.pitch, 0.0, epsilon = 1e-9);
        assert_relative_eq!(pose.euler.yaw, 0.0, epsilon = 1e-9);
        assert_relative_eq!(pose.distance, 1.0, epsilon = 1e-9);
    }
}
