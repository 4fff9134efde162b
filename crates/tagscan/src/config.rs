//! JSON configuration for the scanner and the command line tool.

use std::{fs, path::Path};

use serde::{Deserialize, Serialize};
use tagscan_core::CameraIntrinsics;
use tagscan_engine::{DetectorConfig, DEFAULT_FAMILIES};

use crate::{ExtensionMatch, PoseEstimator};

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Capacity used when neither the config nor the command line sets one.
pub const DEFAULT_CAPACITY: usize = 64;

fn default_families() -> Vec<String> {
    DEFAULT_FAMILIES.iter().map(|s| s.to_string()).collect()
}

fn default_capacity() -> usize {
    DEFAULT_CAPACITY
}

fn default_focal() -> f64 {
    500.0
}

fn default_tag_size() -> f64 {
    0.1
}

/// Camera and tag parameters for pose estimation.
///
/// The principal point falls back to the image center, so a single config
/// serves images of different sizes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoseConfig {
    /// Tag border side, meters.
    #[serde(default = "default_tag_size")]
    pub tag_size: f64,
    #[serde(default = "default_focal")]
    pub fx: f64,
    #[serde(default = "default_focal")]
    pub fy: f64,
    #[serde(default)]
    pub cx: Option<f64>,
    #[serde(default)]
    pub cy: Option<f64>,
}

impl Default for PoseConfig {
    fn default() -> Self {
        Self {
            tag_size: default_tag_size(),
            fx: default_focal(),
            fy: default_focal(),
            cx: None,
            cy: None,
        }
    }
}

impl PoseConfig {
    pub fn intrinsics_for(&self, width: usize, height: usize) -> CameraIntrinsics {
        let centered = CameraIntrinsics::centered(self.fx, self.fy, width, height);
        CameraIntrinsics {
            cx: self.cx.unwrap_or(centered.cx),
            cy: self.cy.unwrap_or(centered.cy),
            ..centered
        }
    }

    pub fn estimator_for(&self, width: usize, height: usize) -> PoseEstimator {
        PoseEstimator::new(self.intrinsics_for(width, height), self.tag_size)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.tag_size.is_finite() || self.tag_size <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "tag_size must be positive, got {}",
                self.tag_size
            )));
        }
        for (name, v) in [("fx", self.fx), ("fy", self.fy)] {
            if !v.is_finite() || v == 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be finite and non-zero, got {v}"
                )));
            }
        }
        Ok(())
    }
}

/// Everything the scanner needs besides the engine itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagscanConfig {
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default = "default_families")]
    pub families: Vec<String>,
    /// Maximum number of records kept per image.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    #[serde(default)]
    pub extension_match: ExtensionMatch,
    /// Solve a pose per tag when present.
    #[serde(default)]
    pub pose: Option<PoseConfig>,
}

impl Default for TagscanConfig {
    fn default() -> Self {
        Self {
            detector: DetectorConfig::default(),
            families: default_families(),
            capacity: default_capacity(),
            extension_match: ExtensionMatch::default(),
            pose: None,
        }
    }
}

impl TagscanConfig {
    /// Load a JSON config from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.detector
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if self.families.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one tag family is required".to_string(),
            ));
        }
        if let Some(pose) = &self.pose {
            pose.validate()?;
        }
        Ok(())
    }
}
