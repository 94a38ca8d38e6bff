//! Label encoder artifact

use crate::error::{RiskError, Result};
use crate::model::RiskLabel;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Maps classifier output indices back to label names.
///
/// Stored as `{"classes": ["High", "Low", "Medium"]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelEncoder {
    pub classes: Vec<String>,
}

impl LabelEncoder {
    pub fn new(classes: Vec<String>) -> Result<Self> {
        let encoder = Self { classes };
        encoder.labels()?;
        Ok(encoder)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let encoder: LabelEncoder = serde_json::from_str(json)
            .map_err(|e| RiskError::ArtifactLoad(format!("label encoder is not valid JSON: {}", e)))?;
        encoder.labels()?;
        Ok(encoder)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            RiskError::ArtifactLoad(format!("cannot read label encoder {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&json)
            .map_err(|e| RiskError::ArtifactLoad(format!("{}: {}", path.display(), e)))
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn inverse_transform(&self, index: usize) -> Result<&str> {
        self.classes.get(index).map(|s| s.as_str()).ok_or_else(|| {
            RiskError::Prediction(format!(
                "class index {} outside encoder with {} classes",
                index,
                self.classes.len()
            ))
        })
    }

    /// Every class parsed as a risk label; classes must be distinct.
    pub fn labels(&self) -> Result<Vec<RiskLabel>> {
        if self.classes.is_empty() {
            return Err(RiskError::ArtifactLoad("label encoder has no classes".to_string()));
        }
        let labels = self
            .classes
            .iter()
            .map(|c| c.parse::<RiskLabel>())
            .collect::<Result<Vec<_>>>()?;
        for (idx, label) in labels.iter().enumerate() {
            if labels[..idx].contains(label) {
                return Err(RiskError::ArtifactLoad(format!("label encoder repeats class {}", label)));
            }
        }
        Ok(labels)
    }
}
