/// Failures reported by a detection engine.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("failed to create detector: {0}")]
    DetectorCreation(String),
    #[error("unknown tag family `{name}`")]
    UnknownFamily { name: String },
    #[error("failed to register tag family `{name}`: {reason}")]
    FamilyRegistration { name: String, reason: String },
    #[error("invalid detector configuration: {0}")]
    InvalidConfig(String),
    #[error("detection failed: {0}")]
    Detection(String),
    #[error("pose estimation failed: {0}")]
    PoseSolve(String),
}
