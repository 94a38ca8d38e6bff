//! Tree ensemble model artifact
//!
//! A random forest exported to JSON: every tree is a flat node array whose
//! root is node 0. Splits send `x[feature] <= threshold` left. Leaves hold
//! per-class weights; the forest averages each tree's normalized leaf.

use crate::error::{RiskError, Result};
use crate::model::RiskModel;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: Vec<f64>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    pub nodes: Vec<TreeNode>,
}

impl DecisionTree {
    fn leaf_for(&self, features: &[f64]) -> &[f64] {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if features[*feature] <= *threshold { *left } else { *right };
                }
                TreeNode::Leaf { value } => return value,
            }
        }
    }

    // Children always point forward, so traversal terminates.
    fn validate(&self, tree_idx: usize, n_features: usize, n_classes: usize) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(invalid(format!("tree {} has no nodes", tree_idx)));
        }
        for (idx, node) in self.nodes.iter().enumerate() {
            match node {
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    if *feature >= n_features {
                        return Err(invalid(format!(
                            "tree {} node {} splits on feature {} of {}",
                            tree_idx, idx, feature, n_features
                        )));
                    }
                    if !threshold.is_finite() {
                        return Err(invalid(format!("tree {} node {} has a non-finite threshold", tree_idx, idx)));
                    }
                    for child in [*left, *right] {
                        if child <= idx || child >= self.nodes.len() {
                            return Err(invalid(format!(
                                "tree {} node {} has child {} outside ({}, {})",
                                tree_idx,
                                idx,
                                child,
                                idx,
                                self.nodes.len()
                            )));
                        }
                    }
                }
                TreeNode::Leaf { value } => {
                    if value.len() != n_classes {
                        return Err(invalid(format!(
                            "tree {} leaf {} has {} values for {} classes",
                            tree_idx,
                            idx,
                            value.len(),
                            n_classes
                        )));
                    }
                    if value.iter().any(|v| !v.is_finite() || *v < 0.0) || value.iter().sum::<f64>() <= 0.0 {
                        return Err(invalid(format!("tree {} leaf {} has invalid class weights", tree_idx, idx)));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Random forest classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestModel {
    pub feature_names: Vec<String>,
    pub n_classes: usize,
    pub trees: Vec<DecisionTree>,
    /// Exported importances; derived from split counts when absent.
    #[serde(default)]
    pub feature_importances: Option<Vec<f64>>,
}

impl ForestModel {
    pub fn new(
        feature_names: Vec<String>,
        n_classes: usize,
        trees: Vec<DecisionTree>,
        feature_importances: Option<Vec<f64>>,
    ) -> Result<Self> {
        let model = Self {
            feature_names,
            n_classes,
            trees,
            feature_importances,
        };
        model.validate()?;
        Ok(model)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let model: ForestModel = serde_json::from_str(json)
            .map_err(|e| invalid(format!("model is not valid JSON: {}", e)))?;
        model.validate()?;
        Ok(model)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| invalid(format!("cannot read model {}: {}", path.display(), e)))?;
        Self::from_json_str(&json)
    }

    fn validate(&self) -> Result<()> {
        if self.feature_names.is_empty() {
            return Err(invalid("model declares no features".to_string()));
        }
        if self.n_classes == 0 {
            return Err(invalid("model declares no classes".to_string()));
        }
        if self.trees.is_empty() {
            return Err(invalid("model has no trees".to_string()));
        }
        for (idx, tree) in self.trees.iter().enumerate() {
            tree.validate(idx, self.feature_names.len(), self.n_classes)?;
        }
        if let Some(importances) = &self.feature_importances {
            if importances.len() != self.feature_names.len() {
                return Err(invalid(format!(
                    "{} importances for {} features",
                    importances.len(),
                    self.feature_names.len()
                )));
            }
        }
        Ok(())
    }

    fn split_counts(&self) -> Vec<f64> {
        let mut counts = vec![0.0; self.feature_names.len()];
        for tree in &self.trees {
            for node in &tree.nodes {
                if let TreeNode::Split { feature, .. } = node {
                    counts[*feature] += 1.0;
                }
            }
        }
        counts
    }
}

impl RiskModel for ForestModel {
    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn n_classes(&self) -> usize {
        self.n_classes
    }

    fn predict_proba(&self, features: &[f64]) -> Result<Vec<f64>> {
        if features.len() != self.feature_names.len() {
            return Err(RiskError::Prediction(format!(
                "model expects {} features, got {}",
                self.feature_names.len(),
                features.len()
            )));
        }

        let mut proba = vec![0.0; self.n_classes];
        for tree in &self.trees {
            let leaf = tree.leaf_for(features);
            let total: f64 = leaf.iter().sum();
            for (p, v) in proba.iter_mut().zip(leaf) {
                *p += v / total;
            }
        }
        let n_trees = self.trees.len() as f64;
        proba.iter_mut().for_each(|p| *p /= n_trees);
        Ok(proba)
    }

    fn feature_importances(&self) -> Vec<f64> {
        let raw = self
            .feature_importances
            .clone()
            .unwrap_or_else(|| self.split_counts());
        let total: f64 = raw.iter().sum();
        if total > 0.0 {
            raw.iter().map(|v| v / total).collect()
        } else {
            vec![0.0; raw.len()]
        }
    }
}

fn invalid(msg: String) -> RiskError {
    RiskError::ArtifactLoad(msg)
}
