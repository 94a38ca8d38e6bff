//! Aggregator
//!
//! Groups resolved records by (state, district, date) and derives one
//! feature vector per group.

use crate::geography::resolver::{FailureReason, ResolvedRecord};
use crate::geography::GeoLevel;
use crate::ingestion::RawRecord;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Numeric model inputs, in the order [`FeatureVector::values`] returns them.
pub const FEATURE_NAMES: [&str; 9] = [
    "enrolment_load",
    "child_share",
    "youth_share",
    "adult_share",
    "biometric_pressure",
    "youth_biometric_ratio",
    "adult_biometric_ratio",
    "demographic_pressure",
    "log_demand",
];

/// Position of a feature in [`FEATURE_NAMES`], accepting legacy dataset names.
pub fn feature_index(name: &str) -> Option<usize> {
    let canonical = match name {
        "total_enrolment" => "enrolment_load",
        "bio_ratio_5_17" => "youth_biometric_ratio",
        "bio_ratio_17" => "adult_biometric_ratio",
        "log_load" => "log_demand",
        other => other,
    };
    FEATURE_NAMES.iter().position(|n| *n == canonical)
}

/// Fixed-shape summary of one (state, district, date) group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureVector {
    pub state: String,
    pub district: String,
    pub date: NaiveDate,
    /// Sum of new enrolments.
    pub enrolment_load: u64,
    /// Age 0-5 share of the group's population.
    pub child_share: f64,
    /// Age 5-17 share of the group's population.
    pub youth_share: f64,
    /// Age 18+ share of the group's population.
    pub adult_share: f64,
    /// Biometric updates per enrolment.
    pub biometric_pressure: f64,
    /// Age 5-17 biometric updates per enrolment.
    pub youth_biometric_ratio: f64,
    /// Age 17+ biometric updates per enrolment.
    pub adult_biometric_ratio: f64,
    /// Demographic updates per enrolment.
    pub demographic_pressure: f64,
    /// `ln(1 + enrolment_load)`
    pub log_demand: f64,
    /// Input records merged into this vector.
    pub record_count: u32,
}

impl FeatureVector {
    /// Numeric feature by name. The legacy dataset column names
    /// (`total_enrolment`, `bio_ratio_5_17`, `bio_ratio_17`, `log_load`)
    /// are accepted as well.
    pub fn value_of(&self, name: &str) -> Option<f64> {
        feature_index(name).map(|idx| self.values()[idx])
    }

    pub fn values(&self) -> [f64; 9] {
        [
            self.enrolment_load as f64,
            self.child_share,
            self.youth_share,
            self.adult_share,
            self.biometric_pressure,
            self.youth_biometric_ratio,
            self.adult_biometric_ratio,
            self.demographic_pressure,
            self.log_demand,
        ]
    }

    pub fn share_total(&self) -> f64 {
        self.child_share + self.youth_share + self.adult_share
    }

    fn from_totals(key: GroupKey, totals: &GroupTotals) -> Self {
        let (state, district, date) = key;
        let enrolment_load = totals
            .age_0_5
            .saturating_add(totals.age_5_17)
            .saturating_add(totals.age_18_plus);
        let population = enrolment_load;

        let share = |band: u64| {
            if population == 0 {
                0.0
            } else {
                band as f64 / population as f64
            }
        };
        let per_enrolment = |count: u64| count as f64 / enrolment_load.max(1) as f64;

        Self {
            state,
            district,
            date,
            enrolment_load,
            child_share: share(totals.age_0_5),
            youth_share: share(totals.age_5_17),
            adult_share: share(totals.age_18_plus),
            biometric_pressure: per_enrolment(totals.bio_age_5_17.saturating_add(totals.bio_age_17_plus)),
            youth_biometric_ratio: per_enrolment(totals.bio_age_5_17),
            adult_biometric_ratio: per_enrolment(totals.bio_age_17_plus),
            demographic_pressure: per_enrolment(totals.demo_age_5_17.saturating_add(totals.demo_age_17_plus)),
            log_demand: (enrolment_load as f64).ln_1p(),
            record_count: totals.records,
        }
    }
}

type GroupKey = (String, String, NaiveDate);

#[derive(Debug, Default)]
struct GroupTotals {
    records: u32,
    age_0_5: u64,
    age_5_17: u64,
    age_18_plus: u64,
    bio_age_5_17: u64,
    bio_age_17_plus: u64,
    demo_age_5_17: u64,
    demo_age_17_plus: u64,
}

impl GroupTotals {
    // Saturating: records built outside ingestion are not bounded.
    fn add(&mut self, record: &RawRecord) {
        self.records = self.records.saturating_add(1);
        self.age_0_5 = self.age_0_5.saturating_add(record.age_0_5);
        self.age_5_17 = self.age_5_17.saturating_add(record.age_5_17);
        self.age_18_plus = self.age_18_plus.saturating_add(record.age_18_plus);
        self.bio_age_5_17 = self.bio_age_5_17.saturating_add(record.bio_age_5_17);
        self.bio_age_17_plus = self.bio_age_17_plus.saturating_add(record.bio_age_17_plus);
        self.demo_age_5_17 = self.demo_age_5_17.saturating_add(record.demo_age_5_17);
        self.demo_age_17_plus = self.demo_age_17_plus.saturating_add(record.demo_age_17_plus);
    }
}

/// A raw name that failed resolution, with how many rows carried it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnresolvedName {
    pub level: GeoLevel,
    pub raw: String,
    pub parent_hint: Option<String>,
    pub reason: FailureReason,
    pub best_candidate: Option<(String, f64)>,
    pub rows: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct AggregationOutput {
    /// One vector per group, ordered by (state, district, date).
    pub features: Vec<FeatureVector>,
    /// Records dropped because their geography did not resolve.
    pub excluded_records: usize,
    /// Distinct failed names, most frequent first.
    pub unresolved: Vec<UnresolvedName>,
}

/// Feature aggregator
#[derive(Debug, Default, Clone, Copy)]
pub struct Aggregator;

impl Aggregator {
    pub fn new() -> Self {
        Self
    }

    pub fn aggregate(&self, records: &[ResolvedRecord]) -> AggregationOutput {
        let mut groups: BTreeMap<GroupKey, GroupTotals> = BTreeMap::new();
        let mut failures: BTreeMap<(GeoLevel, String, Option<String>), UnresolvedName> = BTreeMap::new();
        let mut excluded_records = 0usize;

        for record in records {
            match &record.geography {
                Ok(geo) => {
                    groups
                        .entry((geo.state.clone(), geo.district.clone(), record.raw.date))
                        .or_default()
                        .add(&record.raw);
                }
                Err(failure) => {
                    excluded_records += 1;
                    failures
                        .entry((failure.level, failure.raw.clone(), failure.parent_hint.clone()))
                        .and_modify(|u| u.rows += 1)
                        .or_insert_with(|| UnresolvedName {
                            level: failure.level,
                            raw: failure.raw.clone(),
                            parent_hint: failure.parent_hint.clone(),
                            reason: failure.reason,
                            best_candidate: failure.best_candidate.clone(),
                            rows: 1,
                        });
                }
            }
        }

        let features: Vec<FeatureVector> = groups
            .into_iter()
            .map(|(key, totals)| FeatureVector::from_totals(key, &totals))
            .collect();

        let mut unresolved: Vec<UnresolvedName> = failures.into_values().collect();
        // stable: ties keep the BTreeMap order
        unresolved.sort_by(|a, b| b.rows.cmp(&a.rows));

        debug!("{} distinct unresolved names", unresolved.len());
        info!(
            "Aggregated {} records into {} feature vectors ({} excluded)",
            records.len() - excluded_records,
            features.len(),
            excluded_records
        );

        AggregationOutput {
            features,
            excluded_records,
            unresolved,
        }
    }
}
