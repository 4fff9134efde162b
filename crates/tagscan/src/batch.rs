//! Directory scanning with per-file failure isolation.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tagscan_core::{DetectionRecord, PoseEstimate};
use tagscan_engine::DetectionEngine;

use crate::config::DEFAULT_CAPACITY;
use crate::loader::{classify, ExtensionMatch, FileImageLoader, ImageFormatKind, ImageLoader};
use crate::{detect, DetectorRegistry, PipelineError, PoseConfig};

#[cfg(feature = "tracing")]
use tracing::instrument;

#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    #[error("cannot open directory {}: {source}", path.display())]
    OpenDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

#[derive(Clone, Debug, PartialEq)]
pub struct BatchOptions {
    /// Maximum number of records kept per file.
    pub capacity: usize,
    pub extension_match: ExtensionMatch,
    /// Solve a pose per kept tag when set.
    pub pose: Option<PoseConfig>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            extension_match: ExtensionMatch::default(),
            pose: None,
        }
    }
}

/// What happened to one processable file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub format: ImageFormatKind,
    /// `(width, height)` when the file could be loaded.
    pub dimensions: Option<(usize, usize)>,
    pub records: Vec<DetectionRecord>,
    /// Detections the engine reported before bounding.
    pub engine_count: usize,
    pub truncated: bool,
    /// One entry per record when pose estimation was requested.
    pub poses: Option<Vec<Option<PoseEstimate>>>,
    /// Why the file was skipped.
    pub error: Option<String>,
}

impl FileOutcome {
    fn skipped(path: PathBuf, format: ImageFormatKind, error: String) -> Self {
        Self {
            path,
            format,
            dimensions: None,
            records: Vec::new(),
            engine_count: 0,
            truncated: false,
            poses: None,
            error: Some(error),
        }
    }

    pub fn is_skipped(&self) -> bool {
        self.error.is_some()
    }

    pub fn detection_count(&self) -> usize {
        self.records.len()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub directory: PathBuf,
    /// Processable files in the order the directory listed them.
    pub files: Vec<FileOutcome>,
    /// Processable files attempted.
    pub files_seen: usize,
    /// Processable files that failed to load or detect.
    pub files_skipped: usize,
    /// Directories and entries that were not processable images.
    pub entries_ignored: usize,
    /// Kept detections summed over successfully processed files.
    pub total_detections: usize,
}

/// Walks one directory level and runs detection on every image file.
#[derive(Clone, Debug, Default)]
pub struct BatchScanner<L = FileImageLoader> {
    loader: L,
    options: BatchOptions,
}

impl BatchScanner<FileImageLoader> {
    pub fn new(options: BatchOptions) -> Self {
        Self::with_loader(FileImageLoader, options)
    }
}

impl<L: ImageLoader> BatchScanner<L> {
    pub fn with_loader(loader: L, options: BatchOptions) -> Self {
        Self { loader, options }
    }

    pub fn options(&self) -> &BatchOptions {
        &self.options
    }

    pub fn scan_directory<E: DetectionEngine>(
        &self,
        registry: &mut DetectorRegistry<E>,
        dir: impl AsRef<Path>,
    ) -> Result<BatchResult, ScanError> {
        self.scan_directory_with(registry, dir, |_| {})
    }

    /// Like [`Self::scan_directory`], calling `on_file` as soon as each file is done.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip(self, registry, dir, on_file), fields(dir = %dir.as_ref().display()))
    )]
    pub fn scan_directory_with<E: DetectionEngine>(
        &self,
        registry: &mut DetectorRegistry<E>,
        dir: impl AsRef<Path>,
        mut on_file: impl FnMut(&FileOutcome),
    ) -> Result<BatchResult, ScanError> {
        let dir = dir.as_ref();
        if !registry.is_initialized() {
            return Err(PipelineError::NotInitialized.into());
        }
        let entries = fs::read_dir(dir).map_err(|source| ScanError::OpenDirectory {
            path: dir.to_path_buf(),
            source,
        })?;
        log::info!("scanning directory {}", dir.display());

        let mut result = BatchResult {
            directory: dir.to_path_buf(),
            ..BatchResult::default()
        };

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    log::warn!("unreadable entry in {}: {e}", dir.display());
                    result.entries_ignored += 1;
                    continue;
                }
            };
            if entry.file_type().is_ok_and(|t| t.is_dir()) {
                log::trace!("ignoring directory {}", entry.path().display());
                result.entries_ignored += 1;
                continue;
            }
            let name = entry.file_name();
            let format = match name
                .to_str()
                .and_then(|n| classify(n, self.options.extension_match))
            {
                Some(format) => format,
                None => {
                    log::trace!("ignoring {}", entry.path().display());
                    result.entries_ignored += 1;
                    continue;
                }
            };

            let outcome = self.scan_file(registry, entry.path(), format);
            result.files_seen += 1;
            if outcome.is_skipped() {
                result.files_skipped += 1;
            } else {
                result.total_detections += outcome.detection_count();
            }
            on_file(&outcome);
            result.files.push(outcome);
        }

        log::info!(
            "scanned {} files ({} skipped), {} tags",
            result.files_seen,
            result.files_skipped,
            result.total_detections
        );
        Ok(result)
    }

    /// Load and detect one file. Failures are reported in the outcome.
    pub fn scan_file<E: DetectionEngine>(
        &self,
        registry: &mut DetectorRegistry<E>,
        path: PathBuf,
        format: ImageFormatKind,
    ) -> FileOutcome {
        let image = match self.loader.load(&path, format) {
            Ok(image) => image,
            Err(e) => {
                log::warn!("failed to load image {}: {e}", path.display());
                return FileOutcome::skipped(path, format, e.to_string());
            }
        };
        let dimensions = (image.width(), image.height());
        let capacity = self.options.capacity;

        let detected = match &self.options.pose {
            Some(pose) => pose
                .estimator_for(dimensions.0, dimensions.1)
                .detect_with_pose(registry, image, capacity)
                .map(|posed| {
                    let (records, poses): (Vec<_>, Vec<_>) = posed
                        .detections
                        .into_iter()
                        .map(|d| (d.record, d.pose))
                        .unzip();
                    (records, Some(poses), posed.engine_count, posed.truncated)
                }),
            None => detect(registry, image, capacity)
                .map(|d| (d.records, None, d.engine_count, d.truncated)),
        };

        match detected {
            Ok((records, poses, engine_count, truncated)) => {
                log::debug!(
                    "{}: {}x{}, {} tags",
                    path.display(),
                    dimensions.0,
                    dimensions.1,
                    engine_count
                );
                FileOutcome {
                    path,
                    format,
                    dimensions: Some(dimensions),
                    records,
                    engine_count,
                    truncated,
                    poses,
                    error: None,
                }
            }
            Err(e) => {
                log::warn!("detection failed for {}: {e}", path.display());
                let mut outcome = FileOutcome::skipped(path, format, e.to_string());
                outcome.dimensions = Some(dimensions);
                outcome
            }
        }
    }
}
