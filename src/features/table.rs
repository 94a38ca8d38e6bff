//! Feature file - the tabular hand-off between the batch pipeline, offline
//! training and inference.

use crate::error::{RiskError, Result};
use crate::features::aggregator::FeatureVector;
use crate::geography::normalize::display_name;
use crate::geography::registry::GeoLevel;
use crate::geography::resolver::NameResolver;
use crate::ingestion::{format_date, parse_date};
use chrono::NaiveDate;
use polars::prelude::*;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Mean values over every vector of one state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateAverage {
    pub state: String,
    pub vectors: usize,
    pub mean_enrolment_load: f64,
    pub mean_adult_biometric_ratio: f64,
}

/// Feature vectors kept sorted by (state, district, date).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureTable {
    features: Vec<FeatureVector>,
}

impl FeatureTable {
    pub fn new(mut features: Vec<FeatureVector>) -> Self {
        features.sort_by(|a, b| {
            (a.state.as_str(), a.district.as_str(), a.date).cmp(&(b.state.as_str(), b.district.as_str(), b.date))
        });
        Self { features }
    }

    pub fn features(&self) -> &[FeatureVector] {
        &self.features
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Distinct states, sorted. Names containing digits are data-entry
    /// debris and are left out.
    pub fn states(&self) -> Vec<&str> {
        let mut states: Vec<&str> = self
            .features
            .iter()
            .map(|f| f.state.as_str())
            .filter(|s| !s.chars().any(|c| c.is_ascii_digit()))
            .collect();
        states.dedup();
        states
    }

    /// Distinct districts of a state, sorted.
    pub fn districts(&self, state: &str) -> Vec<&str> {
        let mut districts: Vec<&str> = self
            .state_slice(state)
            .iter()
            .map(|f| f.district.as_str())
            .collect();
        districts.dedup();
        districts
    }

    /// Dates with a vector for the district, ascending.
    pub fn dates(&self, state: &str, district: &str) -> Vec<NaiveDate> {
        self.district_slice(state, district).iter().map(|f| f.date).collect()
    }

    pub fn lookup(&self, state: &str, district: &str, date: NaiveDate) -> Option<&FeatureVector> {
        let slice = self.district_slice(state, district);
        slice
            .binary_search_by(|f| f.date.cmp(&date))
            .ok()
            .map(|idx| &slice[idx])
    }

    /// `today` when the district has a vector for it, else its latest date.
    pub fn default_date(&self, state: &str, district: &str, today: NaiveDate) -> Option<NaiveDate> {
        let slice = self.district_slice(state, district);
        if slice.iter().any(|f| f.date == today) {
            return Some(today);
        }
        slice.last().map(|f| f.date)
    }

    /// The most recent `limit` vectors of a district, oldest first.
    pub fn trend(&self, state: &str, district: &str, limit: usize) -> &[FeatureVector] {
        let slice = self.district_slice(state, district);
        &slice[slice.len().saturating_sub(limit)..]
    }

    pub fn state_average(&self, state: &str) -> Option<StateAverage> {
        let slice = self.state_slice(state);
        if slice.is_empty() {
            return None;
        }
        let n = slice.len() as f64;
        Some(StateAverage {
            state: state.to_string(),
            vectors: slice.len(),
            mean_enrolment_load: slice.iter().map(|f| f.enrolment_load as f64).sum::<f64>() / n,
            mean_adult_biometric_ratio: slice.iter().map(|f| f.adult_biometric_ratio).sum::<f64>() / n,
        })
    }

    /// Rewrite state and district names onto the registry's canonical
    /// spelling. Names the resolver rejects fall back to [`display_name`].
    pub fn with_canonical_names(self, resolver: &NameResolver<'_>) -> Self {
        let mut memo: HashMap<(String, String), (String, String)> = HashMap::new();

        let features: Vec<FeatureVector> = self
            .features
            .into_iter()
            .map(|mut fv| {
                let (state, district) = memo
                    .entry((fv.state.clone(), fv.district.clone()))
                    .or_insert_with(|| canonical_pair(resolver, &fv.state, &fv.district))
                    .clone();
                fv.state = state;
                fv.district = district;
                fv
            })
            .collect();

        debug!("Canonicalized {} distinct (state, district) names", memo.len());
        Self::new(features)
    }

    fn state_slice(&self, state: &str) -> &[FeatureVector] {
        let start = self.features.partition_point(|f| f.state.as_str() < state);
        let end = self.features.partition_point(|f| f.state.as_str() <= state);
        &self.features[start..end]
    }

    fn district_slice(&self, state: &str, district: &str) -> &[FeatureVector] {
        let slice = self.state_slice(state);
        let start = slice.partition_point(|f| f.district.as_str() < district);
        let end = slice.partition_point(|f| f.district.as_str() <= district);
        &slice[start..end]
    }

    /// Columnar form, one row per vector. Dates are written `DD-MM-YYYY`.
    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let f = &self.features;
        let df = df!(
            "state" => f.iter().map(|v| v.state.as_str()).collect::<Vec<_>>(),
            "district" => f.iter().map(|v| v.district.as_str()).collect::<Vec<_>>(),
            "date" => f.iter().map(|v| format_date(v.date)).collect::<Vec<_>>(),
            "enrolment_load" => f.iter().map(|v| v.enrolment_load).collect::<Vec<_>>(),
            "child_share" => f.iter().map(|v| v.child_share).collect::<Vec<_>>(),
            "youth_share" => f.iter().map(|v| v.youth_share).collect::<Vec<_>>(),
            "adult_share" => f.iter().map(|v| v.adult_share).collect::<Vec<_>>(),
            "biometric_pressure" => f.iter().map(|v| v.biometric_pressure).collect::<Vec<_>>(),
            "youth_biometric_ratio" => f.iter().map(|v| v.youth_biometric_ratio).collect::<Vec<_>>(),
            "adult_biometric_ratio" => f.iter().map(|v| v.adult_biometric_ratio).collect::<Vec<_>>(),
            "demographic_pressure" => f.iter().map(|v| v.demographic_pressure).collect::<Vec<_>>(),
            "log_demand" => f.iter().map(|v| v.log_demand).collect::<Vec<_>>(),
            "record_count" => f.iter().map(|v| v.record_count).collect::<Vec<_>>()
        )?;
        Ok(df)
    }

    /// Rebuild a table from its columnar form.
    ///
    /// Legacy feature files are accepted too: their column
    /// names (`total_enrolment`, `bio_ratio_5_17`, `bio_ratio_17`, `log_load`)
    /// are recognized, and columns they lack are derived or zeroed.
    pub fn from_dataframe(df: &DataFrame) -> Result<Self> {
        let height = df.height();

        let states = string_column(df, "state")?;
        let districts = string_column(df, "district")?;
        let dates = string_column(df, "date")?;
        let loads = float_column(df, &["enrolment_load", "total_enrolment"])?
            .ok_or_else(|| missing("enrolment_load"))?;
        let child = float_column(df, &["child_share"])?.ok_or_else(|| missing("child_share"))?;
        let youth = float_column(df, &["youth_share"])?.ok_or_else(|| missing("youth_share"))?;
        let adult = float_column(df, &["adult_share"])?.ok_or_else(|| missing("adult_share"))?;
        let youth_bio = float_column(df, &["youth_biometric_ratio", "bio_ratio_5_17"])?
            .unwrap_or_else(|| vec![0.0; height]);
        let adult_bio = float_column(df, &["adult_biometric_ratio", "bio_ratio_17"])?
            .unwrap_or_else(|| vec![0.0; height]);
        let pressure = float_column(df, &["biometric_pressure"])?.unwrap_or_else(|| {
            youth_bio.iter().zip(&adult_bio).map(|(y, a)| y + a).collect()
        });
        let demographic = float_column(df, &["demographic_pressure"])?.unwrap_or_else(|| vec![0.0; height]);
        let log_demand = float_column(df, &["log_demand", "log_load"])?
            .unwrap_or_else(|| loads.iter().map(|l| l.ln_1p()).collect());
        let record_counts = float_column(df, &["record_count"])?.unwrap_or_else(|| vec![0.0; height]);

        let mut features = Vec::with_capacity(height);
        for row in 0..height {
            let date = parse_date(&dates[row]).ok_or_else(|| {
                RiskError::Ingestion(format!("feature row {} has unparseable date '{}'", row, dates[row]))
            })?;
            if loads[row] < 0.0 {
                return Err(RiskError::Ingestion(format!(
                    "feature row {} has negative enrolment load {}",
                    row, loads[row]
                )));
            }
            features.push(FeatureVector {
                state: states[row].clone(),
                district: districts[row].clone(),
                date,
                enrolment_load: loads[row].round() as u64,
                child_share: child[row],
                youth_share: youth[row],
                adult_share: adult[row],
                biometric_pressure: pressure[row],
                youth_biometric_ratio: youth_bio[row],
                adult_biometric_ratio: adult_bio[row],
                demographic_pressure: demographic[row],
                log_demand: log_demand[row],
                record_count: record_counts[row].round() as u32,
            });
        }

        Ok(Self::new(features))
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut df = self.to_dataframe()?;
        let mut file = fs::File::create(path)?;
        CsvWriter::new(&mut file).include_header(true).finish(&mut df)?;
        info!("Wrote {} feature vectors to {}", self.len(), path.display());
        Ok(())
    }

    pub fn read_csv(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(RiskError::Ingestion(format!("feature file {} does not exist", path.display())));
        }
        let df = LazyCsvReader::new(path)
            .with_infer_schema_length(Some(10000))
            .finish()?
            .collect()?;
        let table = Self::from_dataframe(&df)?;
        info!("Loaded {} feature vectors from {}", table.len(), path.display());
        Ok(table)
    }
}

fn canonical_pair(resolver: &NameResolver<'_>, state: &str, district: &str) -> (String, String) {
    let state = match resolver.resolve(state, GeoLevel::State, None) {
        Ok(entry) => entry.name.clone(),
        Err(failure) => {
            debug!("Keeping feature-file name: {}", failure);
            display_name(state)
        }
    };
    let district = match resolver.resolve(district, GeoLevel::District, Some(state.as_str())) {
        Ok(entry) => entry.name.clone(),
        Err(failure) => {
            debug!("Keeping feature-file name: {}", failure);
            display_name(district)
        }
    };
    (state, district)
}

fn missing(column: &str) -> RiskError {
    RiskError::Ingestion(format!("feature file has no '{}' column", column))
}

fn string_column(df: &DataFrame, name: &str) -> Result<Vec<String>> {
    let series = df.column(name).map_err(|_| missing(name))?.cast(&DataType::String)?;
    series
        .str()?
        .into_iter()
        .enumerate()
        .map(|(row, value)| {
            value
                .map(|s| s.trim().to_string())
                .ok_or_else(|| RiskError::Ingestion(format!("feature row {} has no {}", row, name)))
        })
        .collect()
}

/// First of `names` present in the frame, as f64. `Ok(None)` when none is.
fn float_column(df: &DataFrame, names: &[&str]) -> Result<Option<Vec<f64>>> {
    let Some(name) = names.iter().find(|n| df.column(n).is_ok()) else {
        return Ok(None);
    };
    let series = df.column(name)?.cast(&DataType::Float64)?;
    let values = series
        .f64()?
        .into_iter()
        .enumerate()
        .map(|(row, value)| {
            value.ok_or_else(|| RiskError::Ingestion(format!("feature row {} has no {}", row, name)))
        })
        .collect::<Result<Vec<f64>>>()?;
    Ok(Some(values))
}
