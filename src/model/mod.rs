//! Risk model - classifier interface, artifacts and the predictor built on them.

pub mod encoder;
pub mod forest;
pub mod predictor;

pub use encoder::LabelEncoder;
pub use forest::ForestModel;
pub use predictor::{ModelStore, Predictor};

use crate::error::{RiskError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Service stress classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskLabel {
    Low,
    Medium,
    High,
}

impl RiskLabel {
    /// One-line reading of the label for administrators.
    pub fn summary(&self) -> &'static str {
        match self {
            RiskLabel::High => "Service stress is high. Citizens may face access issues.",
            RiskLabel::Medium => "Early signs of stress detected. Monitoring is advised.",
            RiskLabel::Low => "Services appear stable in this region.",
        }
    }

    /// Suggested administrative actions.
    pub fn advisories(&self) -> &'static [&'static str] {
        match self {
            RiskLabel::High => &[
                "Deploy mobile Aadhaar vans",
                "Increase centre staff temporarily",
                "Enable alternate authentication (OTP)",
            ],
            RiskLabel::Medium => &[
                "Monitor centre load closely",
                "Extend service hours during peak days",
            ],
            RiskLabel::Low => &["Maintain current operations", "Continue monitoring trends"],
        }
    }
}

impl fmt::Display for RiskLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLabel::Low => write!(f, "Low"),
            RiskLabel::Medium => write!(f, "Medium"),
            RiskLabel::High => write!(f, "High"),
        }
    }
}

impl FromStr for RiskLabel {
    type Err = RiskError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(RiskLabel::Low),
            "medium" => Ok(RiskLabel::Medium),
            "high" => Ok(RiskLabel::High),
            other => Err(RiskError::ArtifactLoad(format!("unknown risk label '{}'", other))),
        }
    }
}

/// How much one input feature weighs in a prediction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureContribution {
    pub feature: String,
    pub value: f64,
    /// Model-wide importance of the feature (sums to 1 across features).
    pub importance: f64,
    /// `importance * |value|`
    pub contribution: f64,
}

/// Label plus the evidence behind it. Always recomputed from a feature vector.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskPrediction {
    pub label: RiskLabel,
    /// Probability of the chosen label.
    pub confidence: f64,
    pub probabilities: Vec<(RiskLabel, f64)>,
    /// Sorted by importance, highest first.
    pub contributions: Vec<FeatureContribution>,
}

/// A fitted classifier over named numeric features.
///
/// The predictor only relies on this contract, so the concrete model
/// technology can change without touching the pipeline.
pub trait RiskModel: Send + Sync {
    /// Names of the inputs, in the order `predict_proba` expects them.
    fn feature_names(&self) -> &[String];

    fn n_classes(&self) -> usize;

    /// Class probabilities, indexed like the label encoder's classes.
    fn predict_proba(&self, features: &[f64]) -> Result<Vec<f64>>;

    /// Relative importance per feature, aligned with `feature_names`.
    fn feature_importances(&self) -> Vec<f64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_parse_and_display() {
        assert_eq!("High".parse::<RiskLabel>().unwrap(), RiskLabel::High);
        assert_eq!(" medium ".parse::<RiskLabel>().unwrap(), RiskLabel::Medium);
        assert_eq!("LOW".parse::<RiskLabel>().unwrap(), RiskLabel::Low);
        assert!("Severe".parse::<RiskLabel>().is_err());
        assert_eq!(RiskLabel::Medium.to_string(), "Medium");
    }

    #[test]
    fn test_advisories() {
        assert_eq!(RiskLabel::High.advisories().len(), 3);
        assert!(RiskLabel::Low.summary().contains("stable"));
    }
}
