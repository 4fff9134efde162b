use serde::{Deserialize, Serialize};

use crate::EngineError;

/// Families registered when the caller does not choose any.
pub const DEFAULT_FAMILIES: [&str; 3] = ["tag36h11", "tag25h9", "tag16h5"];

fn default_decimate() -> f32 {
    1.0
}

fn default_threads() -> u32 {
    1
}

fn default_refine_edges() -> bool {
    true
}

fn default_max_hamming() -> u32 {
    2
}

/// Largest bit-error correction the upstream decoder accepts.
pub const MAX_HAMMING_LIMIT: u32 = 3;

/// Detector tuning applied once at registry initialization.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Downsampling factor applied before quad detection.
    #[serde(default = "default_decimate")]
    pub decimate: f32,
    /// Gaussian blur sigma applied before quad detection (0 disables).
    #[serde(default)]
    pub blur_sigma: f32,
    /// Worker threads the engine may use internally.
    #[serde(default = "default_threads")]
    pub threads: u32,
    #[serde(default)]
    pub debug: bool,
    /// Snap quad edges to strong image gradients.
    #[serde(default = "default_refine_edges")]
    pub refine_edges: bool,
    /// Bit errors corrected while decoding, per registered family.
    #[serde(default = "default_max_hamming")]
    pub max_hamming: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            decimate: default_decimate(),
            blur_sigma: 0.0,
            threads: default_threads(),
            debug: false,
            refine_edges: default_refine_edges(),
            max_hamming: default_max_hamming(),
        }
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        if !self.decimate.is_finite() || self.decimate <= 0.0 {
            return Err(EngineError::InvalidConfig(format!(
                "decimate must be a positive number, got {}",
                self.decimate
            )));
        }
        if !self.blur_sigma.is_finite() || self.blur_sigma < 0.0 {
            return Err(EngineError::InvalidConfig(format!(
                "blur_sigma must be finite and non-negative, got {}",
                self.blur_sigma
            )));
        }
        if self.threads == 0 {
            return Err(EngineError::InvalidConfig(
                "threads must be at least 1".to_string(),
            ));
        }
        if self.max_hamming > MAX_HAMMING_LIMIT {
            return Err(EngineError::InvalidConfig(format!(
                "max_hamming must be at most {MAX_HAMMING_LIMIT}, got {}",
                self.max_hamming
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_detector_setup() {
        let cfg = DetectorConfig::default();
        assert_eq!(cfg.decimate, 1.0);
        assert_eq!(cfg.blur_sigma, 0.0);
        assert_eq!(cfg.threads, 1);
        assert!(!cfg.debug);
        assert!(cfg.refine_edges);
        assert_eq!(cfg.max_hamming, 2);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn missing_json_fields_fall_back_to_defaults() {
        let cfg: DetectorConfig = serde_json::from_str(r#"{"decimate": 2.0}"#).expect("json");
        assert_eq!(cfg.decimate, 2.0);
        assert_eq!(cfg.threads, 1);
        assert!(cfg.refine_edges);
        assert_eq!(cfg.max_hamming, 2);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let bad = [
            DetectorConfig {
                decimate: 0.0,
                ..DetectorConfig::default()
            },
            DetectorConfig {
                decimate: f32::NAN,
                ..DetectorConfig::default()
            },
            DetectorConfig {
                blur_sigma: -1.0,
                ..DetectorConfig::default()
            },
            DetectorConfig {
                threads: 0,
                ..DetectorConfig::default()
            },
            DetectorConfig {
                max_hamming: 4,
                ..DetectorConfig::default()
            },
        ];
        for cfg in bad {
            assert!(matches!(cfg.validate(), Err(EngineError::InvalidConfig(_))));
        }
    }
}
