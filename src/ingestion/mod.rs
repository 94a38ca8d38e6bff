//! Ingestion - raw Aadhaar extracts
//!
//! Three CSV extract kinds are understood (enrolment, biometric updates,
//! demographic updates). Every row becomes one [`RawRecord`]; rows of
//! different kinds are merged later by the aggregator.

pub mod csv_extract;

pub use csv_extract::{read_extract, read_extract_from_reader, Extract, ExtractKind, ExtractSummary};

use chrono::NaiveDate;
use serde::Serialize;

/// One input row. Counts the row's extract kind does not carry are zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawRecord {
    pub state_raw: String,
    pub district_raw: String,
    pub date: NaiveDate,
    pub pincode: Option<String>,
    pub age_0_5: u64,
    pub age_5_17: u64,
    pub age_18_plus: u64,
    pub bio_age_5_17: u64,
    pub bio_age_17_plus: u64,
    pub demo_age_5_17: u64,
    pub demo_age_17_plus: u64,
}

impl RawRecord {
    /// A record with all counts zero.
    pub fn new(state_raw: impl Into<String>, district_raw: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            state_raw: state_raw.into(),
            district_raw: district_raw.into(),
            date,
            pincode: None,
            age_0_5: 0,
            age_5_17: 0,
            age_18_plus: 0,
            bio_age_5_17: 0,
            bio_age_17_plus: 0,
            demo_age_5_17: 0,
            demo_age_17_plus: 0,
        }
    }

    pub fn with_enrolment(mut self, age_0_5: u64, age_5_17: u64, age_18_plus: u64) -> Self {
        self.age_0_5 = age_0_5;
        self.age_5_17 = age_5_17;
        self.age_18_plus = age_18_plus;
        self
    }

    pub fn with_biometric(mut self, bio_age_5_17: u64, bio_age_17_plus: u64) -> Self {
        self.bio_age_5_17 = bio_age_5_17;
        self.bio_age_17_plus = bio_age_17_plus;
        self
    }

    pub fn with_demographic(mut self, demo_age_5_17: u64, demo_age_17_plus: u64) -> Self {
        self.demo_age_5_17 = demo_age_5_17;
        self.demo_age_17_plus = demo_age_17_plus;
        self
    }

    pub fn with_pincode(mut self, pincode: impl Into<String>) -> Self {
        self.pincode = Some(pincode.into());
        self
    }

    /// New enrolments across all age bands.
    pub fn enrolment_count(&self) -> u64 {
        self.population_count()
    }

    /// Population counted in the age bands (child 0-5, youth 5-17, adult 18+).
    pub fn population_count(&self) -> u64 {
        self.age_0_5
            .saturating_add(self.age_5_17)
            .saturating_add(self.age_18_plus)
    }

    pub fn biometric_update_count(&self) -> u64 {
        self.bio_age_5_17.saturating_add(self.bio_age_17_plus)
    }

    pub fn demographic_update_count(&self) -> u64 {
        self.demo_age_5_17.saturating_add(self.demo_age_17_plus)
    }
}

/// Accepted date spellings, the extract's own `DD-MM-YYYY` first.
pub const DATE_FORMATS: [&str; 3] = ["%d-%m-%Y", "%Y-%m-%d", "%d/%m/%Y"];

/// Parse a date in any of [`DATE_FORMATS`].
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
}

/// Format a date the way the extracts and feature file spell it.
pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMATS[0]).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts() {
        let date = NaiveDate::from_ymd_opt(2025, 9, 1).unwrap();
        let record = RawRecord::new("Goa", "North Goa", date)
            .with_enrolment(3, 4, 5)
            .with_biometric(7, 11)
            .with_demographic(1, 2);
        assert_eq!(record.enrolment_count(), 12);
        assert_eq!(record.population_count(), 12);
        assert_eq!(record.biometric_update_count(), 18);
        assert_eq!(record.demographic_update_count(), 3);
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2025, 3, 9).unwrap();
        assert_eq!(parse_date("09-03-2025"), Some(expected));
        assert_eq!(parse_date("2025-03-09"), Some(expected));
        assert_eq!(parse_date(" 09/03/2025 "), Some(expected));
        assert_eq!(parse_date("31-02-2025"), None);
        assert_eq!(parse_date("yesterday"), None);
        assert_eq!(format_date(expected), "09-03-2025");
    }
}
