//! Engine backed by the `apriltag` crate.
//!
//! All registered families share one upstream detector, so a frame is scanned
//! once, detections keep the upstream order and overlapping quads from
//! different families are resolved by the detector itself. The upstream
//! detector is built lazily on the first `detect` after the family set or the
//! configuration changed. Pose estimation calls the upstream
//! `estimate_tag_pose` (orthogonal iteration, better of two solutions).

use std::ffi::{c_int, CStr};
use std::ptr;

use apriltag_sys as sys;
use nalgebra::{Matrix3, Vector3};
use tagscan_core::{CameraIntrinsics, LumaImage};

use crate::{
    DetectionEngine, DetectorConfig, EngineDetector, EngineError, EnginePose, MarkerFamily,
    RawDetection,
};

fn upstream_family(name: &str) -> Result<apriltag::Family, EngineError> {
    match name {
        "tag16h5" => Ok(apriltag::Family::tag_16h5()),
        "tag25h9" => Ok(apriltag::Family::tag_25h9()),
        "tag36h11" => Ok(apriltag::Family::tag_36h11()),
        "tagCircle21h7" => Ok(apriltag::Family::tag_circle_21h7()),
        "tagCircle49h12" => Ok(apriltag::Family::tag_circle_49h12()),
        "tagStandard41h12" => Ok(apriltag::Family::tag_standard_41h12()),
        "tagStandard52h13" => Ok(apriltag::Family::tag_standard_52h13()),
        "tagCustom48h12" => Ok(apriltag::Family::tag_custom_48h12()),
        _ => Err(EngineError::UnknownFamily {
            name: name.to_string(),
        }),
    }
}

fn build_upstream(
    families: &[String],
    config: &DetectorConfig,
) -> Result<apriltag::Detector, EngineError> {
    let mut builder = apriltag::DetectorBuilder::new();
    for name in families {
        builder = builder.add_family_bits(upstream_family(name)?, config.max_hamming as usize);
    }
    let mut detector = builder
        .build()
        .map_err(|e| EngineError::DetectorCreation(e.to_string()))?;
    detector.set_decimation(config.decimate);
    detector.set_sigma(config.blur_sigma);
    detector.set_thread_number(config.threads.min(u8::MAX as u32) as u8);
    detector.set_refine_edges(config.refine_edges);
    detector.set_debug(config.debug);
    Ok(detector)
}

fn to_upstream_image(image: &LumaImage) -> Result<apriltag::Image, EngineError> {
    let mut out = apriltag::Image::zeros_with_stride(image.width(), image.height(), image.stride())
        .map_err(|e| EngineError::Detection(e.to_string()))?;
    for y in 0..image.height() {
        for (x, &v) in image.row(y).iter().enumerate() {
            out[(x, y)] = v;
        }
    }
    Ok(out)
}

/// Read the family name of an upstream detection.
fn detection_family(det: apriltag::Detection) -> (apriltag::Detection, Option<String>) {
    let raw = det.into_raw();
    // SAFETY: `raw` is a live detection returned by `apriltag_detector_detect`.
    // Its family pointer refers to a family registered on the detector, which
    // is never freed while the detector exists.
    let name = unsafe {
        let family = raw.as_ref().family;
        if family.is_null() || (*family).name.is_null() {
            None
        } else {
            Some(CStr::from_ptr((*family).name).to_string_lossy().into_owned())
        }
    };
    // SAFETY: ownership of `raw` is handed back exactly once.
    (unsafe { apriltag::Detection::from_raw(raw.as_ptr()) }, name)
}

fn to_raw_detection(det: apriltag::Detection) -> Result<RawDetection, EngineError> {
    let (det, family) = detection_family(det);
    let family =
        family.ok_or_else(|| EngineError::Detection("detection without a family".into()))?;
    let h = det.homography();
    let h = h.data();
    if h.len() != 9 {
        return Err(EngineError::Detection(format!(
            "homography with {} entries",
            h.len()
        )));
    }
    Ok(RawDetection {
        id: det.id() as u32,
        family,
        hamming: det.hamming() as u32,
        decision_margin: det.decision_margin() as f64,
        center: det.center(),
        corners: det.corners(),
        homography: Matrix3::from_row_slice(h),
    })
}

/// Owned upstream matrix, destroyed on drop.
struct OwnedMatd(*mut sys::matd_t);

impl OwnedMatd {
    fn from_row_major(rows: usize, cols: usize, data: &[f64]) -> Result<Self, EngineError> {
        debug_assert_eq!(rows * cols, data.len());
        // SAFETY: `data` holds `rows * cols` values; the result is checked for null.
        let m = unsafe { sys::matd_create_data(rows as c_int, cols as c_int, data.as_ptr()) };
        if m.is_null() {
            return Err(EngineError::PoseSolve("cannot allocate matrix".into()));
        }
        Ok(Self(m))
    }

    /// Row-major values, when the matrix exists and has `rows x cols` shape.
    fn values(&self, rows: usize, cols: usize) -> Option<&[f64]> {
        if self.0.is_null() {
            return None;
        }
        // SAFETY: non-null matrices come from `matd_create*` and stay alive
        // until `self` drops.
        unsafe {
            let m = &*self.0;
            if m.nrows as usize != rows || m.ncols as usize != cols {
                return None;
            }
            Some(m.data.as_slice(rows * cols))
        }
    }
}

impl Drop for OwnedMatd {
    fn drop(&mut self) {
        if !self.0.is_null() {
            // SAFETY: the matrix was allocated by the upstream library and is
            // destroyed once.
            unsafe { sys::matd_destroy(self.0) };
        }
    }
}

/// Upstream `estimate_tag_pose` on a detection rebuilt from its verbatim copy.
fn upstream_pose(
    detection: &RawDetection,
    intrinsics: &CameraIntrinsics,
    tag_size: f64,
) -> Result<EnginePose, EngineError> {
    if !tag_size.is_finite() || tag_size <= 0.0 {
        return Err(EngineError::PoseSolve(format!(
            "tag size must be positive, got {tag_size}"
        )));
    }
    if intrinsics.fx == 0.0 || intrinsics.fy == 0.0 {
        return Err(EngineError::PoseSolve("focal length must be non-zero".into()));
    }

    let h_rows: [f64; 9] = std::array::from_fn(|i| detection.homography[(i / 3, i % 3)]);
    let h = OwnedMatd::from_row_major(3, 3, &h_rows)?;
    let mut det = sys::apriltag_detection_t {
        family: ptr::null_mut(),
        id: detection.id as c_int,
        hamming: detection.hamming as c_int,
        decision_margin: detection.decision_margin as f32,
        H: h.0,
        c: detection.center,
        p: detection.corners,
    };
    let mut info = sys::apriltag_detection_info_t {
        det: &mut det,
        tagsize: tag_size,
        fx: intrinsics.fx,
        fy: intrinsics.fy,
        cx: intrinsics.cx,
        cy: intrinsics.cy,
    };
    let mut pose = sys::apriltag_pose_t {
        R: ptr::null_mut(),
        t: ptr::null_mut(),
    };
    // SAFETY: `info.det` points at `det`, whose homography `h` outlives the
    // call. The pose solver reads the homography and corners only and
    // allocates `pose.R` / `pose.t`, which are owned below.
    let error = unsafe { sys::estimate_tag_pose(&mut info, &mut pose) };
    let rotation = OwnedMatd(pose.R);
    let translation = OwnedMatd(pose.t);

    let (Some(r), Some(t)) = (rotation.values(3, 3), translation.values(3, 1)) else {
        return Err(EngineError::PoseSolve("no pose solution".into()));
    };
    if !error.is_finite() || r.iter().chain(t).any(|v| !v.is_finite()) {
        return Err(EngineError::PoseSolve("non-finite pose".into()));
    }
    Ok(EnginePose {
        rotation: Matrix3::from_row_slice(r),
        translation: Vector3::new(t[0], t[1], t[2]),
        error,
    })
}

/// Factory for [`AprilTagDetector`] handles.
#[derive(Clone, Copy, Debug, Default)]
pub struct AprilTagEngine;

impl AprilTagEngine {
    pub fn new() -> Self {
        Self
    }
}

/// Validated family name.
#[derive(Clone, Debug)]
pub struct AprilTagFamily {
    name: String,
}

impl MarkerFamily for AprilTagFamily {
    fn name(&self) -> &str {
        &self.name
    }
}

pub struct AprilTagDetector {
    config: DetectorConfig,
    families: Vec<String>,
    upstream: Option<apriltag::Detector>,
}

impl AprilTagDetector {
    pub fn families(&self) -> &[String] {
        &self.families
    }
}

impl std::fmt::Debug for AprilTagDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AprilTagDetector")
            .field("config", &self.config)
            .field("families", &self.families)
            .field("built", &self.upstream.is_some())
            .finish()
    }
}

impl DetectionEngine for AprilTagEngine {
    type Family = AprilTagFamily;
    type Detector = AprilTagDetector;

    fn create_detector(&self) -> Result<AprilTagDetector, EngineError> {
        Ok(AprilTagDetector {
            config: DetectorConfig::default(),
            families: Vec::new(),
            upstream: None,
        })
    }

    fn create_family(&self, name: &str) -> Result<AprilTagFamily, EngineError> {
        upstream_family(name)?;
        Ok(AprilTagFamily {
            name: name.to_string(),
        })
    }
}

impl EngineDetector for AprilTagDetector {
    type Family = AprilTagFamily;

    fn configure(&mut self, config: &DetectorConfig) -> Result<(), EngineError> {
        config.validate()?;
        self.config = config.clone();
        self.upstream = None;
        Ok(())
    }

    fn register_family(&mut self, family: &AprilTagFamily) -> Result<(), EngineError> {
        if self.families.iter().any(|n| n == family.name()) {
            return Err(EngineError::FamilyRegistration {
                name: family.name().to_string(),
                reason: "already registered".into(),
            });
        }
        self.families.push(family.name().to_string());
        self.upstream = None;
        Ok(())
    }

    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "debug", skip(self, image), fields(width = image.width(), height = image.height()))
    )]
    fn detect(&mut self, image: &LumaImage) -> Result<Vec<RawDetection>, EngineError> {
        if self.upstream.is_none() {
            self.upstream = Some(build_upstream(&self.families, &self.config)?);
        }
        let Some(detector) = self.upstream.as_mut() else {
            return Err(EngineError::Detection("detector not built".into()));
        };
        let upstream_image = to_upstream_image(image)?;
        let out = detector
            .detect(&upstream_image)
            .into_iter()
            .map(to_raw_detection)
            .collect::<Result<Vec<_>, _>>()?;
        log::debug!("apriltag engine returned {} detections", out.len());
        Ok(out)
    }

    fn estimate_pose(
        &self,
        detection: &RawDetection,
        intrinsics: &CameraIntrinsics,
        tag_size: f64,
    ) -> Result<EnginePose, EngineError> {
        upstream_pose(detection, intrinsics, tag_size)
    }
}
