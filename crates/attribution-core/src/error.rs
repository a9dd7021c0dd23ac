use thiserror::Error;
use uuid::Uuid;

pub type AttribResult<T> = Result<T, AttributionError>;

#[derive(Error, Debug)]
pub enum AttributionError {
    #[error("Unknown attribution model: {0}")]
    UnknownModel(String),

    #[error("Conversion {0} not found")]
    ConversionNotFound(Uuid),

    #[error("Data-driven model has not been trained")]
    ModelNotTrained,

    #[error("Insufficient training data: {available} journeys, {required} required")]
    InsufficientTrainingData { required: usize, available: usize },

    #[error("Contract violation: {0}")]
    Contract(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Repository failure: {0}")]
    Repository(#[from] anyhow::Error),
}
