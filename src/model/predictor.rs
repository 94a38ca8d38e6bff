//! Predictor - applies a fitted model to feature vectors

use crate::error::{RiskError, Result};
use crate::features::aggregator::{feature_index, FeatureVector};
use crate::model::{FeatureContribution, ForestModel, LabelEncoder, RiskLabel, RiskModel, RiskPrediction};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, info};

/// A model paired with its label mapping.
pub struct Predictor {
    model: Box<dyn RiskModel>,
    labels: Vec<RiskLabel>,
    /// Position of each model input in `FeatureVector::values`.
    inputs: Vec<usize>,
}

impl Predictor {
    /// Pair a model with its encoder. Every model input must name a known
    /// feature and the encoder must cover exactly the model's classes.
    pub fn new(model: Box<dyn RiskModel>, encoder: LabelEncoder) -> Result<Self> {
        let labels = encoder.labels()?;
        if labels.len() != model.n_classes() {
            return Err(RiskError::ArtifactLoad(format!(
                "label encoder has {} classes but the model predicts {}",
                labels.len(),
                model.n_classes()
            )));
        }

        let inputs = model
            .feature_names()
            .iter()
            .map(|name| {
                feature_index(name).ok_or_else(|| {
                    RiskError::ArtifactLoad(format!("model input '{}' is not a known feature", name))
                })
            })
            .collect::<Result<Vec<usize>>>()?;

        Ok(Self { model, labels, inputs })
    }

    /// Load the forest model and label encoder artifacts.
    pub fn load(model_path: &Path, encoder_path: &Path) -> Result<Self> {
        let model = ForestModel::load(model_path)?;
        let encoder = LabelEncoder::load(encoder_path)?;
        let predictor = Self::new(Box::new(model), encoder)?;
        info!(
            "Loaded risk model from {} ({} inputs, classes {:?})",
            model_path.display(),
            predictor.inputs.len(),
            predictor.labels
        );
        Ok(predictor)
    }

    pub fn feature_names(&self) -> &[String] {
        self.model.feature_names()
    }

    pub fn predict(&self, features: &FeatureVector) -> Result<RiskPrediction> {
        let all = features.values();
        let x: Vec<f64> = self.inputs.iter().map(|&idx| all[idx]).collect();

        let proba = self.model.predict_proba(&x)?;
        if proba.len() != self.labels.len() {
            return Err(RiskError::Prediction(format!(
                "model returned {} probabilities for {} classes",
                proba.len(),
                self.labels.len()
            )));
        }

        // Lowest index wins ties
        let mut best = 0;
        for (idx, p) in proba.iter().enumerate() {
            if *p > proba[best] {
                best = idx;
            }
        }

        let mut contributions: Vec<FeatureContribution> = self
            .model
            .feature_names()
            .iter()
            .zip(&x)
            .zip(self.model.feature_importances())
            .map(|((name, &value), importance)| FeatureContribution {
                feature: name.clone(),
                value,
                importance,
                contribution: importance * value.abs(),
            })
            .collect();
        contributions.sort_by(|a, b| {
            b.importance
                .partial_cmp(&a.importance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let label = self.labels[best];
        debug!(
            "Predicted {} for {} / {} on {} (p = {:.3})",
            label, features.district, features.state, features.date, proba[best]
        );

        Ok(RiskPrediction {
            label,
            confidence: proba[best],
            probabilities: self.labels.iter().copied().zip(proba.iter().copied()).collect(),
            contributions,
        })
    }
}

/// Loads the predictor on first use and keeps it for the rest of the process.
pub struct ModelStore {
    model_path: PathBuf,
    encoder_path: PathBuf,
    predictor: OnceLock<Predictor>,
}

impl ModelStore {
    pub fn new(model_path: impl Into<PathBuf>, encoder_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            encoder_path: encoder_path.into(),
            predictor: OnceLock::new(),
        }
    }

    /// Store around an already-built predictor.
    pub fn with_predictor(predictor: Predictor) -> Self {
        Self {
            model_path: PathBuf::new(),
            encoder_path: PathBuf::new(),
            predictor: OnceLock::from(predictor),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.predictor.get().is_some()
    }

    pub fn get(&self) -> Result<&Predictor> {
        if let Some(predictor) = self.predictor.get() {
            return Ok(predictor);
        }
        let predictor = Predictor::load(&self.model_path, &self.encoder_path)?;
        Ok(self.predictor.get_or_init(|| predictor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::forest::{DecisionTree, TreeNode};
    use chrono::NaiveDate;

    fn stump(feature: usize, threshold: f64, left: [f64; 3], right: [f64; 3]) -> DecisionTree {
        DecisionTree {
            nodes: vec![
                TreeNode::Split {
                    feature,
                    threshold,
                    left: 1,
                    right: 2,
                },
                TreeNode::Leaf { value: left.to_vec() },
                TreeNode::Leaf { value: right.to_vec() },
            ],
        }
    }

    fn predictor() -> Predictor {
        // Classes in encoder order: High, Low, Medium
        let model = ForestModel::new(
            vec!["total_enrolment".to_string(), "adult_biometric_ratio".to_string()],
            3,
            vec![
                stump(0, 1000.0, [0.0, 1.0, 0.0], [1.0, 0.0, 0.0]),
                stump(1, 0.5, [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]),
            ],
            Some(vec![0.7, 0.3]),
        )
        .unwrap();
        let encoder = LabelEncoder::new(vec!["High".into(), "Low".into(), "Medium".into()]).unwrap();
        Predictor::new(Box::new(model), encoder).unwrap()
    }

    fn vector(load: u64, adult_bio: f64) -> FeatureVector {
        FeatureVector {
            state: "Goa".to_string(),
            district: "North Goa".to_string(),
            date: NaiveDate::from_ymd_opt(2025, 9, 1).unwrap(),
            enrolment_load: load,
            child_share: 0.2,
            youth_share: 0.3,
            adult_share: 0.5,
            biometric_pressure: adult_bio,
            youth_biometric_ratio: 0.0,
            adult_biometric_ratio: adult_bio,
            demographic_pressure: 0.0,
            log_demand: (load as f64).ln_1p(),
            record_count: 1,
        }
    }

    #[test]
    fn test_predict_labels() {
        let predictor = predictor();

        let low = predictor.predict(&vector(10, 0.1)).unwrap();
        assert_eq!(low.label, RiskLabel::Low);
        assert_eq!(low.confidence, 1.0);

        let high = predictor.predict(&vector(5000, 0.2)).unwrap();
        // High 0.5 vs Low 0.5: lowest index (High) wins
        assert_eq!(high.label, RiskLabel::High);
        assert_eq!(high.confidence, 0.5);
        assert_eq!(high.probabilities[0], (RiskLabel::High, 0.5));
    }

    #[test]
    fn test_contributions_sorted_by_importance() {
        let prediction = predictor().predict(&vector(2000, 0.9)).unwrap();
        assert_eq!(prediction.label, RiskLabel::High);
        assert_eq!(prediction.contributions[0].feature, "total_enrolment");
        assert_eq!(prediction.contributions[0].value, 2000.0);
        assert!((prediction.contributions[0].contribution - 1400.0).abs() < 1e-9);
        assert_eq!(prediction.contributions[1].feature, "adult_biometric_ratio");
    }

    #[test]
    fn test_rejects_mismatched_artifacts() {
        let model = ForestModel::new(
            vec!["enrolment_load".to_string()],
            3,
            vec![stump(0, 1.0, [1.0, 0.0, 0.0], [0.0, 1.0, 0.0])],
            None,
        )
        .unwrap();
        let two_classes = LabelEncoder::new(vec!["Low".into(), "High".into()]).unwrap();
        assert!(matches!(
            Predictor::new(Box::new(model.clone()), two_classes),
            Err(RiskError::ArtifactLoad(_))
        ));

        let mut unknown = model;
        unknown.feature_names = vec!["pincode".to_string()];
        let encoder = LabelEncoder::new(vec!["Low".into(), "Medium".into(), "High".into()]).unwrap();
        assert!(matches!(
            Predictor::new(Box::new(unknown), encoder),
            Err(RiskError::ArtifactLoad(_))
        ));
    }

    #[test]
    fn test_store_around_built_predictor() {
        let store = ModelStore::with_predictor(predictor());
        assert!(store.is_loaded());
        assert_eq!(store.get().unwrap().predict(&vector(10, 0.1)).unwrap().label, RiskLabel::Low);
    }

    #[test]
    fn test_store_loads_lazily_and_once() {
        let dir = tempfile::tempdir().unwrap();
        let model_path = dir.path().join("risk_model.json");
        let encoder_path = dir.path().join("label_encoder.json");
        let store = ModelStore::new(&model_path, &encoder_path);

        // Nothing on disk yet: the first use reports the missing artifact
        assert!(matches!(store.get(), Err(RiskError::ArtifactLoad(_))));
        assert!(!store.is_loaded());

        let model = ForestModel::new(
            vec!["enrolment_load".to_string()],
            3,
            vec![stump(0, 100.0, [0.0, 1.0, 0.0], [1.0, 0.0, 0.0])],
            None,
        )
        .unwrap();
        std::fs::write(&model_path, serde_json::to_string(&model).unwrap()).unwrap();
        std::fs::write(&encoder_path, r#"{"classes": ["High", "Low", "Medium"]}"#).unwrap();

        let first = store.get().unwrap() as *const Predictor;
        assert!(store.is_loaded());

        // Later artifact changes are not picked up
        std::fs::remove_file(&model_path).unwrap();
        let second = store.get().unwrap() as *const Predictor;
        assert_eq!(first, second);
        assert_eq!(store.get().unwrap().predict(&vector(500, 0.0)).unwrap().label, RiskLabel::High);
    }
}
