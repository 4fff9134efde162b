//! Bounded detection: run the engine once and map its output into records.

use serde::{Deserialize, Serialize};
use tagscan_core::{convert_to_luma, DetectionRecord, FamilyName, LumaImage};
use tagscan_engine::{DetectionEngine, EngineDetector, RawDetection};

use crate::{DetectorRegistry, PipelineError};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Result of one bounded detection call.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Detections {
    /// The first `min(engine_count, capacity)` detections, in engine order.
    pub records: Vec<DetectionRecord>,
    /// Number of detections the engine reported.
    pub engine_count: usize,
    /// Whether `records` holds fewer detections than the engine found.
    pub truncated: bool,
}

impl Detections {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Map an engine detection into a caller-facing record.
///
/// Every field is copied verbatim except the family name, which is cut to the
/// fixed record width.
pub fn record_from_raw(raw: &RawDetection) -> DetectionRecord {
    let family = FamilyName::new(&raw.family);
    if family.is_truncation_of(&raw.family) {
        log::trace!("family name `{}` truncated to `{}`", raw.family, family);
    }
    DetectionRecord {
        id: raw.id,
        family,
        center: raw.center,
        corners: raw.corners,
        hamming: raw.hamming,
        decision_margin: raw.decision_margin,
    }
}

/// Run the engine once on `image` and return the unbounded raw list.
///
/// The image is consumed and released when the call returns.
pub fn detect_raw<E: DetectionEngine>(
    registry: &mut DetectorRegistry<E>,
    image: LumaImage,
) -> Result<Vec<RawDetection>, PipelineError> {
    let detector = registry.detector_mut()?;
    let raw = detector.detect(&image)?;
    log::debug!(
        "engine found {} tags in {}x{} image",
        raw.len(),
        image.width(),
        image.height()
    );
    Ok(raw)
}

/// Detect tags in `image`, keeping at most `capacity` records.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip(registry, image), fields(width = image.width(), height = image.height()))
)]
pub fn detect<E: DetectionEngine>(
    registry: &mut DetectorRegistry<E>,
    image: LumaImage,
    capacity: usize,
) -> Result<Detections, PipelineError> {
    let raw = detect_raw(registry, image)?;
    Ok(bound_detections(&raw, capacity))
}

/// Convert a raw 1- or 3-channel buffer and detect tags in it.
pub fn detect_buffer<E: DetectionEngine>(
    registry: &mut DetectorRegistry<E>,
    buffer: &[u8],
    width: usize,
    height: usize,
    channels: usize,
    capacity: usize,
) -> Result<Detections, PipelineError> {
    if !registry.is_initialized() {
        return Err(PipelineError::NotInitialized);
    }
    let image = convert_to_luma(buffer, width, height, channels)?;
    detect(registry, image, capacity)
}

pub(crate) fn bound_detections(raw: &[RawDetection], capacity: usize) -> Detections {
    let kept = raw.len().min(capacity);
    let records: Vec<DetectionRecord> = raw[..kept].iter().map(record_from_raw).collect();
    for r in &records {
        log::trace!(
            "tag id={} family={} center=({:.2}, {:.2}) hamming={} margin={:.3}",
            r.id,
            r.family,
            r.center[0],
            r.center[1],
            r.hamming,
            r.decision_margin
        );
    }
    if kept < raw.len() {
        log::debug!("kept {kept} of {} detections", raw.len());
    }
    Detections {
        records,
        engine_count: raw.len(),
        truncated: kept < raw.len(),
    }
}
