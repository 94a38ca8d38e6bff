use thiserror::Error;

#[derive(Error, Debug)]
pub enum RiskError {
    #[error("Registry error: {0}")]
    Registry(String),

    #[error("Ingestion error: {0}")]
    Ingestion(String),

    #[error("Failed to load model artifact: {0}")]
    ArtifactLoad(String),

    #[error("Prediction error: {0}")]
    Prediction(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),
}

pub type Result<T> = std::result::Result<T, RiskError>;
