use tagscan_core::ConvertError;
use tagscan_engine::EngineError;

/// Errors produced by the registry, the detection pipeline and the pose estimator.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("detector initialization failed")]
    InitializationFailure(#[source] EngineError),

    #[error("detector registry is not initialized")]
    NotInitialized,

    #[error(transparent)]
    Convert(#[from] ConvertError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}
