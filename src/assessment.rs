//! Assessment - answers a (state, district, date) selection with a risk
//! prediction, the feature vector behind it and some context.

use crate::error::Result;
use crate::features::aggregator::FeatureVector;
use crate::features::table::{FeatureTable, StateAverage};
use crate::geography::resolver::{NameResolver, ResolutionFailure};
use crate::model::{ModelStore, RiskPrediction};
use chrono::NaiveDate;
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Selection {
    pub state: String,
    pub district: String,
    /// `None` picks today when available, else the latest date.
    pub date: Option<NaiveDate>,
}

impl Selection {
    pub fn new(state: impl Into<String>, district: impl Into<String>, date: Option<NaiveDate>) -> Self {
        Self {
            state: state.into(),
            district: district.into(),
            date,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyGroupReason {
    /// The selected names match nothing in the registry.
    UnknownLocation(ResolutionFailure),
    /// The district has no feature vectors at all.
    NoRecords,
    /// The district has vectors, but not for the requested date.
    NoRecordsOnDate,
}

/// The selection has no underlying records; no prediction is made.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmptyGroupWarning {
    pub state: String,
    pub district: String,
    pub date: Option<NaiveDate>,
    pub reason: EmptyGroupReason,
}

/// How the selection compares with its state's average.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateComparison {
    pub average: StateAverage,
    /// Percent above (positive) or below the state's mean enrolment load.
    pub enrolment_change_pct: f64,
    /// Percent above or below the state's mean adult biometric ratio.
    pub biometric_change_pct: f64,
    pub child_share_pct: f64,
}

impl StateComparison {
    fn new(features: &FeatureVector, average: StateAverage) -> Self {
        let enrolment = features.enrolment_load as f64;
        let biometric = features.adult_biometric_ratio;
        Self {
            enrolment_change_pct: (enrolment - average.mean_enrolment_load) / (average.mean_enrolment_load + 1.0) * 100.0,
            biometric_change_pct: (biometric - average.mean_adult_biometric_ratio)
                / (average.mean_adult_biometric_ratio + 1e-6)
                * 100.0,
            child_share_pct: features.child_share * 100.0,
            average,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskReport {
    pub features: FeatureVector,
    pub prediction: RiskPrediction,
    pub comparison: StateComparison,
    /// Recent vectors of the district, oldest first. Empty when fewer than
    /// two dates exist.
    pub trend: Vec<FeatureVector>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Assessment {
    Scored(Box<RiskReport>),
    InsufficientData(EmptyGroupWarning),
}

pub struct Assessor<'a> {
    table: &'a FeatureTable,
    resolver: NameResolver<'a>,
    models: &'a ModelStore,
    trend_window: usize,
}

impl<'a> Assessor<'a> {
    pub fn new(
        table: &'a FeatureTable,
        resolver: NameResolver<'a>,
        models: &'a ModelStore,
        trend_window: usize,
    ) -> Self {
        Self {
            table,
            resolver,
            models,
            trend_window,
        }
    }

    /// Score a selection. Only artifact and prediction problems are errors;
    /// a selection without data yields [`Assessment::InsufficientData`].
    pub fn assess(&self, selection: &Selection, today: NaiveDate) -> Result<Assessment> {
        let insufficient = |reason: EmptyGroupReason| {
            warn!(
                "Insufficient data for {} / {} ({:?})",
                selection.district, selection.state, selection.date
            );
            Ok(Assessment::InsufficientData(EmptyGroupWarning {
                state: selection.state.clone(),
                district: selection.district.clone(),
                date: selection.date,
                reason,
            }))
        };

        // Step 1: canonical names for the selection
        let (state, district) = match self.locate(selection) {
            Ok(names) => names,
            Err(failure) => return insufficient(EmptyGroupReason::UnknownLocation(failure)),
        };

        // Step 2: the group's feature vector
        let date = match selection.date {
            Some(date) => date,
            None => match self.table.default_date(&state, &district, today) {
                Some(date) => date,
                None => return insufficient(EmptyGroupReason::NoRecords),
            },
        };
        let Some(features) = self.table.lookup(&state, &district, date) else {
            let reason = if self.table.dates(&state, &district).is_empty() {
                EmptyGroupReason::NoRecords
            } else {
                EmptyGroupReason::NoRecordsOnDate
            };
            return insufficient(reason);
        };

        // Step 3: prediction and context
        let prediction = self.models.get()?.predict(features)?;

        // A group exists, so its state has an average
        let average = self.table.state_average(&state).unwrap_or(StateAverage {
            state: state.clone(),
            vectors: 0,
            mean_enrolment_load: 0.0,
            mean_adult_biometric_ratio: 0.0,
        });
        let comparison = StateComparison::new(features, average);

        let trend = self.table.trend(&state, &district, self.trend_window);
        let trend = if trend.len() < 2 { Vec::new() } else { trend.to_vec() };

        info!(
            "Assessed {} / {} on {}: {} ({:.2})",
            district, state, date, prediction.label, prediction.confidence
        );

        Ok(Assessment::Scored(Box::new(RiskReport {
            features: features.clone(),
            prediction,
            comparison,
            trend,
        })))
    }

    /// Names as spelled in the table, or resolved through the registry.
    fn locate(&self, selection: &Selection) -> std::result::Result<(String, String), ResolutionFailure> {
        if self.table.districts(&selection.state).contains(&selection.district.as_str()) {
            return Ok((selection.state.clone(), selection.district.clone()));
        }
        let geo = self.resolver.resolve_geography(&selection.state, &selection.district)?;
        Ok((geo.state, geo.district))
    }
}
