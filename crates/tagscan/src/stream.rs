//! Frame-by-frame detection for image sources that push raw buffers.

use std::io;

use tagscan_engine::DetectionEngine;

use crate::report::{to_text, write_detections};
use crate::{detect_buffer, Detections, DetectorRegistry, PipelineError};

/// Records kept per frame unless configured otherwise.
pub const DEFAULT_STREAM_CAPACITY: usize = 10;

/// Describes the frame a batch of detections came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameInfo {
    /// Zero-based count of frames handed to the processor.
    pub index: u64,
    pub width: usize,
    pub height: usize,
    pub channels: usize,
}

/// Receives the detections of every successfully processed frame.
pub trait DetectionSink {
    fn on_detections(&mut self, frame: &FrameInfo, detections: &Detections);
}

impl<F: FnMut(&FrameInfo, &Detections)> DetectionSink for F {
    fn on_detections(&mut self, frame: &FrameInfo, detections: &Detections) {
        self(frame, detections)
    }
}

/// Prints a text report of every frame to a writer.
#[derive(Debug)]
pub struct ReportSink<W> {
    out: W,
}

impl<W: io::Write> ReportSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: io::Write> DetectionSink for ReportSink<W> {
    fn on_detections(&mut self, frame: &FrameInfo, detections: &Detections) {
        let mut text = format!(
            "Frame {}: {}x{}, channels: {}\n",
            frame.index, frame.width, frame.height, frame.channels
        );
        if detections.is_empty() {
            text.push_str("No tags detected\n");
        } else {
            text.push_str(&to_text(|s| write_detections(s, detections)));
        }
        if let Err(e) = self.out.write_all(text.as_bytes()) {
            log::warn!("failed to write frame report: {e}");
        }
    }
}

/// Runs the detection pipeline on each pushed frame and forwards the results.
///
/// Frames are processed one at a time as they arrive; nothing is queued.
pub struct FrameProcessor<E: DetectionEngine, S> {
    registry: DetectorRegistry<E>,
    sink: S,
    capacity: usize,
    frames: u64,
}

impl<E: DetectionEngine, S: DetectionSink> FrameProcessor<E, S> {
    /// Takes ownership of `registry`; it is initialized on the first frame if needed.
    pub fn new(registry: DetectorRegistry<E>, sink: S) -> Self {
        Self {
            registry,
            sink,
            capacity: DEFAULT_STREAM_CAPACITY,
            frames: 0,
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of frames received so far, failed ones included.
    pub fn frames_received(&self) -> u64 {
        self.frames
    }

    pub fn registry(&self) -> &DetectorRegistry<E> {
        &self.registry
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Detect tags in one raw frame and hand them to the sink.
    ///
    /// Returns the number of records forwarded. Frames that fail to convert
    /// or detect are reported to the caller and never reach the sink.
    pub fn on_frame(
        &mut self,
        buffer: &[u8],
        width: usize,
        height: usize,
        channels: usize,
    ) -> Result<usize, PipelineError> {
        let frame = FrameInfo {
            index: self.frames,
            width,
            height,
            channels,
        };
        self.frames += 1;
        log::debug!(
            "frame {}: {width}x{height}, {channels} channels",
            frame.index
        );

        if !self.registry.is_initialized() {
            self.registry.init()?;
        }
        let detections = detect_buffer(
            &mut self.registry,
            buffer,
            width,
            height,
            channels,
            self.capacity,
        )?;
        self.sink.on_detections(&frame, &detections);
        Ok(detections.len())
    }

    /// Release the engine handles and return the sink.
    pub fn finish(self) -> S {
        let Self {
            mut registry, sink, ..
        } = self;
        registry.cleanup();
        sink
    }
}
