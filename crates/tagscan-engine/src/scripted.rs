//! Deterministic engine that replays canned detections.
//!
//! Every handle it creates is counted in a shared [`EngineStats`], so tests can
//! check that a registry created and released exactly what it should have.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tagscan_core::{CameraIntrinsics, LumaImage};

use crate::{
    solve_pose_from_homography, DetectionEngine, DetectorConfig, EngineDetector, EngineError,
    EnginePose, MarkerFamily, RawDetection, DEFAULT_FAMILIES,
};

type FrameQueue = Arc<Mutex<VecDeque<Result<Vec<RawDetection>, EngineError>>>>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Counters shared by a [`ScriptedEngine`] and every handle it created.
#[derive(Debug, Default)]
pub struct EngineStats {
    detectors_created: AtomicUsize,
    detectors_released: AtomicUsize,
    families_created: AtomicUsize,
    families_released: AtomicUsize,
    configure_calls: AtomicUsize,
    detect_calls: AtomicUsize,
    pose_calls: AtomicUsize,
    last_image: Mutex<Option<(usize, usize)>>,
}

impl EngineStats {
    pub fn detectors_created(&self) -> usize {
        self.detectors_created.load(Ordering::SeqCst)
    }

    pub fn detectors_released(&self) -> usize {
        self.detectors_released.load(Ordering::SeqCst)
    }

    pub fn families_created(&self) -> usize {
        self.families_created.load(Ordering::SeqCst)
    }

    pub fn families_released(&self) -> usize {
        self.families_released.load(Ordering::SeqCst)
    }

    pub fn configure_calls(&self) -> usize {
        self.configure_calls.load(Ordering::SeqCst)
    }

    pub fn detect_calls(&self) -> usize {
        self.detect_calls.load(Ordering::SeqCst)
    }

    pub fn pose_calls(&self) -> usize {
        self.pose_calls.load(Ordering::SeqCst)
    }

    /// Detector handles created and not yet dropped.
    pub fn live_detectors(&self) -> usize {
        self.detectors_created() - self.detectors_released()
    }

    /// Family handles created and not yet dropped.
    pub fn live_families(&self) -> usize {
        self.families_created() - self.families_released()
    }

    /// `(width, height)` of the image passed to the most recent detect call.
    pub fn last_image_size(&self) -> Option<(usize, usize)> {
        *lock(&self.last_image)
    }
}

/// Engine returning scripted frames in FIFO order.
///
/// Clones share the frame queue and the counters, so a test can keep a clone
/// while the original is owned by a registry. When the queue is empty a detect
/// call yields no detections.
#[derive(Clone, Debug)]
pub struct ScriptedEngine {
    frames: FrameQueue,
    stats: Arc<EngineStats>,
    known_families: Vec<String>,
    fail_detector_creation: bool,
    fail_family: Option<String>,
    fail_registration: Option<String>,
    fail_pose_for: Option<u32>,
}

impl Default for ScriptedEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedEngine {
    /// Engine knowing the default tag families.
    pub fn new() -> Self {
        Self {
            frames: Arc::default(),
            stats: Arc::default(),
            known_families: DEFAULT_FAMILIES.iter().map(|s| s.to_string()).collect(),
            fail_detector_creation: false,
            fail_family: None,
            fail_registration: None,
            fail_pose_for: None,
        }
    }

    /// Accept `name` as a family in addition to the defaults.
    pub fn with_known_family(mut self, name: &str) -> Self {
        self.known_families.push(name.to_string());
        self
    }

    pub fn failing_detector_creation(mut self) -> Self {
        self.fail_detector_creation = true;
        self
    }

    /// Creating the family `name` fails.
    pub fn failing_family(mut self, name: &str) -> Self {
        self.fail_family = Some(name.to_string());
        self
    }

    /// Registering the family `name` with a detector fails.
    pub fn failing_registration(mut self, name: &str) -> Self {
        self.fail_registration = Some(name.to_string());
        self
    }

    /// Pose estimation fails for every detection with this id.
    pub fn failing_pose_for(mut self, id: u32) -> Self {
        self.fail_pose_for = Some(id);
        self
    }

    /// Queue the result of one future detect call.
    pub fn push_frame(&self, detections: Vec<RawDetection>) {
        lock(&self.frames).push_back(Ok(detections));
    }

    /// Queue a failing detect call.
    pub fn push_failure(&self, reason: &str) {
        lock(&self.frames).push_back(Err(EngineError::Detection(reason.to_string())));
    }

    pub fn pending_frames(&self) -> usize {
        lock(&self.frames).len()
    }

    pub fn stats(&self) -> Arc<EngineStats> {
        Arc::clone(&self.stats)
    }
}

impl DetectionEngine for ScriptedEngine {
    type Family = ScriptedFamily;
    type Detector = ScriptedDetector;

    fn create_detector(&self) -> Result<ScriptedDetector, EngineError> {
        if self.fail_detector_creation {
            return Err(EngineError::DetectorCreation(
                "scripted detector creation failure".to_string(),
            ));
        }
        self.stats.detectors_created.fetch_add(1, Ordering::SeqCst);
        Ok(ScriptedDetector {
            frames: Arc::clone(&self.frames),
            stats: Arc::clone(&self.stats),
            families: Vec::new(),
            config: None,
            fail_registration: self.fail_registration.clone(),
            fail_pose_for: self.fail_pose_for,
        })
    }

    fn create_family(&self, name: &str) -> Result<ScriptedFamily, EngineError> {
        if self.fail_family.as_deref() == Some(name) || !self.known_families.iter().any(|f| f == name)
        {
            return Err(EngineError::UnknownFamily {
                name: name.to_string(),
            });
        }
        self.stats.families_created.fetch_add(1, Ordering::SeqCst);
        Ok(ScriptedFamily {
            name: name.to_string(),
            stats: Arc::clone(&self.stats),
        })
    }
}

/// Family handle of a [`ScriptedEngine`].
#[derive(Debug)]
pub struct ScriptedFamily {
    name: String,
    stats: Arc<EngineStats>,
}

impl MarkerFamily for ScriptedFamily {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for ScriptedFamily {
    fn drop(&mut self) {
        self.stats.families_released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Detector handle of a [`ScriptedEngine`].
#[derive(Debug)]
pub struct ScriptedDetector {
    frames: FrameQueue,
    stats: Arc<EngineStats>,
    families: Vec<String>,
    config: Option<DetectorConfig>,
    fail_registration: Option<String>,
    fail_pose_for: Option<u32>,
}

impl ScriptedDetector {
    /// Names of the families registered so far, in registration order.
    pub fn families(&self) -> &[String] {
        &self.families
    }

    pub fn config(&self) -> Option<&DetectorConfig> {
        self.config.as_ref()
    }
}

impl EngineDetector for ScriptedDetector {
    type Family = ScriptedFamily;

    fn configure(&mut self, config: &DetectorConfig) -> Result<(), EngineError> {
        config.validate()?;
        self.stats.configure_calls.fetch_add(1, Ordering::SeqCst);
        self.config = Some(config.clone());
        Ok(())
    }

    fn register_family(&mut self, family: &ScriptedFamily) -> Result<(), EngineError> {
        if self.fail_registration.as_deref() == Some(family.name()) {
            return Err(EngineError::FamilyRegistration {
                name: family.name().to_string(),
                reason: "scripted registration failure".to_string(),
            });
        }
        self.families.push(family.name().to_string());
        Ok(())
    }

    fn detect(&mut self, image: &LumaImage) -> Result<Vec<RawDetection>, EngineError> {
        self.stats.detect_calls.fetch_add(1, Ordering::SeqCst);
        *lock(&self.stats.last_image) = Some((image.width(), image.height()));
        let frame = lock(&self.frames).pop_front();
        log::trace!(
            "scripted detect on {}x{} image, frame queued: {}",
            image.width(),
            image.height(),
            frame.is_some()
        );
        frame.unwrap_or_else(|| Ok(Vec::new()))
    }

    fn estimate_pose(
        &self,
        detection: &RawDetection,
        intrinsics: &CameraIntrinsics,
        tag_size: f64,
    ) -> Result<EnginePose, EngineError> {
        self.stats.pose_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_pose_for == Some(detection.id) {
            return Err(EngineError::PoseSolve(format!(
                "scripted pose failure for tag {}",
                detection.id
            )));
        }
        solve_pose_from_homography(detection, intrinsics, tag_size)
    }
}

impl Drop for ScriptedDetector {
    fn drop(&mut self) {
        self.stats.detectors_released.fetch_add(1, Ordering::SeqCst);
    }
}
