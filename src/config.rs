//! Pipeline configuration
//!
//! Values come from the process environment (optionally seeded from a `.env`
//! file by the binary) and can be overridden by command-line flags.

use crate::error::{RiskError, Result};
use std::path::PathBuf;

pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.8;
pub const DEFAULT_TREND_WINDOW: usize = 20;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Geography registry JSON. `None` uses the registry bundled with the crate.
    pub registry_path: Option<PathBuf>,
    pub model_path: PathBuf,
    pub encoder_path: PathBuf,
    /// Feature file written by `build-features` and read by `assess`.
    pub features_path: PathBuf,
    /// Minimum normalized similarity for accepting an approximate name match.
    pub match_threshold: f64,
    /// Number of dated feature vectors shown in a district trend.
    pub trend_window: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            registry_path: None,
            model_path: PathBuf::from("model/risk_model.json"),
            encoder_path: PathBuf::from("model/label_encoder.json"),
            features_path: PathBuf::from("data/final_ml_dataset.csv"),
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            trend_window: DEFAULT_TREND_WINDOW,
        }
    }
}

impl PipelineConfig {
    /// Build a configuration from `AADHAAR_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = lookup("AADHAAR_REGISTRY_PATH") {
            config.registry_path = Some(PathBuf::from(path));
        }
        if let Some(path) = lookup("AADHAAR_MODEL_PATH") {
            config.model_path = PathBuf::from(path);
        }
        if let Some(path) = lookup("AADHAAR_ENCODER_PATH") {
            config.encoder_path = PathBuf::from(path);
        }
        if let Some(path) = lookup("AADHAAR_FEATURES_PATH") {
            config.features_path = PathBuf::from(path);
        }
        if let Some(raw) = lookup("AADHAAR_MATCH_THRESHOLD") {
            let threshold = raw.trim().parse::<f64>().map_err(|e| {
                RiskError::Config(format!("AADHAAR_MATCH_THRESHOLD '{}' is not a number: {}", raw, e))
            })?;
            config.match_threshold = threshold;
        }
        if let Some(raw) = lookup("AADHAAR_TREND_WINDOW") {
            config.trend_window = raw.trim().parse::<usize>().map_err(|e| {
                RiskError::Config(format!("AADHAAR_TREND_WINDOW '{}' is not a count: {}", raw, e))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.match_threshold > 0.0 && self.match_threshold <= 1.0) {
            return Err(RiskError::Config(format!(
                "match threshold must lie in (0, 1], got {}",
                self.match_threshold
            )));
        }
        if self.trend_window == 0 {
            return Err(RiskError::Config("trend window must be at least 1".to_string()));
        }
        Ok(())
    }
}
