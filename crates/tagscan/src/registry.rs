//! Detector lifecycle: one engine detector plus the marker families registered with it.

use tagscan_engine::{
    DetectionEngine, DetectorConfig, EngineDetector, EngineError, DEFAULT_FAMILIES,
};

use crate::PipelineError;

/// Lifecycle state of a [`DetectorRegistry`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegistryState {
    Uninitialized,
    Initialized,
}

// Field order is release order: the detector goes before the families it references.
struct ActiveDetector<D, F> {
    detector: D,
    families: Vec<F>,
}

/// Owns the engine detector handle and the configured marker families.
///
/// `init` and `cleanup` are idempotent. Several registries may coexist, each
/// with its own engine handles; dropping a registry releases its handles.
pub struct DetectorRegistry<E: DetectionEngine> {
    engine: E,
    config: DetectorConfig,
    family_names: Vec<String>,
    active: Option<ActiveDetector<E::Detector, E::Family>>,
}

impl<E: DetectionEngine> DetectorRegistry<E> {
    /// Registry for the default families with the default detector config.
    pub fn new(engine: E) -> Self {
        Self::with_families(engine, DEFAULT_FAMILIES)
    }

    pub fn with_families<I, S>(engine: E, families: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            engine,
            config: DetectorConfig::default(),
            family_names: families.into_iter().map(Into::into).collect(),
            active: None,
        }
    }

    /// Replace the detector config. Takes effect at the next successful `init`.
    pub fn with_config(mut self, config: DetectorConfig) -> Self {
        self.config = config;
        self
    }

    /// Create the detector, create and register every family, apply the config.
    ///
    /// Returns `Ok` without touching the engine when already initialized. On
    /// failure every handle created by this attempt is released and the
    /// registry stays uninitialized.
    pub fn init(&mut self) -> Result<(), PipelineError> {
        if self.active.is_some() {
            log::debug!("detector registry already initialized");
            return Ok(());
        }
        match self.create_active() {
            Ok(active) => {
                log::info!(
                    "detector initialized with families [{}]",
                    self.family_names.join(", ")
                );
                self.active = Some(active);
                Ok(())
            }
            Err(e) => {
                log::error!("detector initialization failed: {e}");
                Err(PipelineError::InitializationFailure(e))
            }
        }
    }

    fn create_active(&self) -> Result<ActiveDetector<E::Detector, E::Family>, EngineError> {
        self.config.validate()?;
        if self.family_names.is_empty() {
            return Err(EngineError::InvalidConfig(
                "at least one tag family is required".to_string(),
            ));
        }

        let mut detector = self.engine.create_detector()?;
        let mut families = Vec::with_capacity(self.family_names.len());
        for name in &self.family_names {
            let family = self.engine.create_family(name)?;
            detector.register_family(&family)?;
            families.push(family);
        }
        detector.configure(&self.config)?;

        Ok(ActiveDetector { detector, families })
    }

    /// Release the detector, then the families. No-op when uninitialized.
    pub fn cleanup(&mut self) {
        if let Some(active) = self.active.take() {
            let n_families = active.families.len();
            drop(active);
            log::info!("detector released along with {n_families} families");
        }
    }

    pub fn state(&self) -> RegistryState {
        if self.active.is_some() {
            RegistryState::Initialized
        } else {
            RegistryState::Uninitialized
        }
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.active.is_some()
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Families registered at the next (or current) initialization.
    pub fn family_names(&self) -> &[String] {
        &self.family_names
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// The live engine detector, or `NotInitialized`.
    pub fn detector(&self) -> Result<&E::Detector, PipelineError> {
        self.active
            .as_ref()
            .map(|a| &a.detector)
            .ok_or(PipelineError::NotInitialized)
    }

    pub fn detector_mut(&mut self) -> Result<&mut E::Detector, PipelineError> {
        self.active
            .as_mut()
            .map(|a| &mut a.detector)
            .ok_or(PipelineError::NotInitialized)
    }
}

impl<E: DetectionEngine> Drop for DetectorRegistry<E> {
    fn drop(&mut self) {
        self.cleanup();
    }
}

impl<E: DetectionEngine + std::fmt::Debug> std::fmt::Debug for DetectorRegistry<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetectorRegistry")
            .field("engine", &self.engine)
            .field("config", &self.config)
            .field("family_names", &self.family_names)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tagscan_engine::ScriptedEngine;

    #[test]
    fn new_registry_starts_uninitialized() {
        let registry = DetectorRegistry::new(ScriptedEngine::new());
        assert_eq!(registry.state(), RegistryState::Uninitialized);
        assert_eq!(registry.family_names(), DEFAULT_FAMILIES);
        assert!(matches!(
            registry.detector(),
            Err(PipelineError::NotInitialized)
        ));
    }

    #[test]
    fn families_are_registered_in_order() {
        let mut registry =
            DetectorRegistry::with_families(ScriptedEngine::new(), ["tag16h5", "tag36h11"]);
        registry.init().expect("init");
        let detector = registry.detector().expect("detector");
        assert_eq!(detector.families(), ["tag16h5", "tag36h11"]);
        assert_eq!(detector.config(), Some(&DetectorConfig::default()));
    }

    #[test]
    fn empty_family_list_fails_without_creating_handles() {
        let engine = ScriptedEngine::new();
        let stats = engine.stats();
        let mut registry = DetectorRegistry::with_families(engine, Vec::<String>::new());
        assert!(matches!(
            registry.init(),
            Err(PipelineError::InitializationFailure(EngineError::InvalidConfig(_)))
        ));
        assert_eq!(stats.detectors_created(), 0);
    }
}
