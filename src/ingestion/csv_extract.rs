//! CSV extract reader - turns one extract file into raw records

use crate::error::{RiskError, Result};
use crate::ingestion::{parse_date, RawRecord};
use csv::ReaderBuilder;
use serde::Serialize;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

const MAX_SKIP_SAMPLES: usize = 5;

/// Largest count accepted in a single cell. Also well inside the range where
/// `f64` holds integers exactly.
pub const MAX_COUNT: u64 = 1_000_000_000;

/// Which extract a file is, decided from its header row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractKind {
    /// `age_0_5, age_5_17, age_18_greater`
    Enrolment,
    /// `bio_age_5_17, bio_age_17_`
    Biometric,
    /// `demo_age_5_17, demo_age_17_`
    Demographic,
}

impl ExtractKind {
    fn count_columns(&self) -> &'static [&'static str] {
        match self {
            ExtractKind::Enrolment => &["age_0_5", "age_5_17", "age_18_greater"],
            ExtractKind::Biometric => &["bio_age_5_17", "bio_age_17_"],
            ExtractKind::Demographic => &["demo_age_5_17", "demo_age_17_"],
        }
    }

    fn detect(headers: &HashMap<String, usize>) -> Option<Self> {
        [ExtractKind::Enrolment, ExtractKind::Biometric, ExtractKind::Demographic]
            .into_iter()
            .find(|kind| kind.count_columns().iter().all(|c| headers.contains_key(*c)))
    }
}

impl fmt::Display for ExtractKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractKind::Enrolment => write!(f, "enrolment"),
            ExtractKind::Biometric => write!(f, "biometric"),
            ExtractKind::Demographic => write!(f, "demographic"),
        }
    }
}

/// Per-file ingestion outcome.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractSummary {
    pub source: String,
    pub kind: ExtractKind,
    pub rows_read: usize,
    pub rows_skipped: usize,
    /// First few skip reasons, for the report.
    pub skip_samples: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Extract {
    pub summary: ExtractSummary,
    pub records: Vec<RawRecord>,
}

/// Read an extract file from disk.
pub fn read_extract(path: &Path) -> Result<Extract> {
    let file = File::open(path).map_err(|e| {
        RiskError::Ingestion(format!("Failed to open extract {}: {}", path.display(), e))
    })?;
    read_extract_from_reader(&path.display().to_string(), file)
}

/// Read an extract from any reader; `source` names it in messages.
pub fn read_extract_from_reader<R: Read>(source: &str, reader: R) -> Result<Extract> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers: HashMap<String, usize> = rdr
        .headers()
        .map_err(|e| RiskError::Ingestion(format!("Failed to read CSV headers of {}: {}", source, e)))?
        .iter()
        .enumerate()
        .map(|(idx, h)| (h.trim().to_lowercase(), idx))
        .collect();

    // Step 1: work out which extract this is
    let kind = ExtractKind::detect(&headers).ok_or_else(|| {
        RiskError::Ingestion(format!(
            "{} is not an enrolment, biometric or demographic extract (headers: {:?})",
            source,
            sorted_headers(&headers)
        ))
    })?;

    let column = |name: &str| -> Result<usize> {
        headers.get(name).copied().ok_or_else(|| {
            RiskError::Ingestion(format!("{} extract {} has no '{}' column", kind, source, name))
        })
    };
    let date_col = column("date")?;
    let state_col = column("state")?;
    let district_col = column("district")?;
    let pincode_col = headers.get("pincode").copied();
    let count_cols: Vec<usize> = kind
        .count_columns()
        .iter()
        .map(|c| column(*c))
        .collect::<Result<_>>()?;

    // Step 2: parse rows, skipping the ones that cannot be trusted
    let mut records = Vec::new();
    let mut rows_read = 0usize;
    let mut skip_samples = Vec::new();
    let mut rows_skipped = 0usize;

    for (line, result) in rdr.byte_records().enumerate() {
        rows_read += 1;

        // Non-UTF-8 cells (Latin-1 exports) are decoded lossily; only a
        // broken reader aborts the file.
        let parsed = match result {
            Ok(row) => {
                let cells: Vec<Cow<str>> = row.iter().map(String::from_utf8_lossy).collect();
                let cell = |idx: usize| cells.get(idx).map(|c| c.trim()).unwrap_or("");
                parse_row(
                    kind,
                    cell(date_col),
                    cell(state_col),
                    cell(district_col),
                    pincode_col.map(cell),
                    &count_cols.iter().map(|&idx| cell(idx)).collect::<Vec<_>>(),
                )
            }
            Err(e) if matches!(e.kind(), csv::ErrorKind::Io(_)) => return Err(e.into()),
            Err(e) => Err(format!("malformed record: {}", e)),
        };

        match parsed {
            Ok(record) => records.push(record),
            Err(reason) => {
                rows_skipped += 1;
                if skip_samples.len() < MAX_SKIP_SAMPLES {
                    // line 1 is the header
                    skip_samples.push(format!("line {}: {}", line + 2, reason));
                }
            }
        }
    }

    if rows_skipped > 0 {
        warn!("Skipped {} of {} rows in {} extract {}", rows_skipped, rows_read, kind, source);
    }
    info!("Read {} {} records from {}", records.len(), kind, source);

    Ok(Extract {
        summary: ExtractSummary {
            source: source.to_string(),
            kind,
            rows_read,
            rows_skipped,
            skip_samples,
        },
        records,
    })
}

fn parse_row(
    kind: ExtractKind,
    date: &str,
    state: &str,
    district: &str,
    pincode: Option<&str>,
    counts: &[&str],
) -> std::result::Result<RawRecord, String> {
    let date = parse_date(date).ok_or_else(|| format!("unparseable date '{}'", date))?;

    let mut values = Vec::with_capacity(counts.len());
    for raw in counts {
        values.push(parse_count(raw)?);
    }

    let mut record = RawRecord::new(state, district, date);
    if let Some(pin) = pincode.filter(|p| !p.is_empty()) {
        record = record.with_pincode(pin);
    }

    Ok(match kind {
        ExtractKind::Enrolment => record.with_enrolment(values[0], values[1], values[2]),
        ExtractKind::Biometric => record.with_biometric(values[0], values[1]),
        ExtractKind::Demographic => record.with_demographic(values[0], values[1]),
    })
}

/// Counts may be blank (zero) or written as integral floats ("12.0"), and
/// never exceed [`MAX_COUNT`].
fn parse_count(raw: &str) -> std::result::Result<u64, String> {
    if raw.is_empty() {
        return Ok(0);
    }
    let count = match raw.parse::<u64>() {
        Ok(n) => n,
        Err(_) => match raw.parse::<f64>() {
            Ok(f) if f.is_finite() && f >= 0.0 && f.fract() == 0.0 && f <= MAX_COUNT as f64 => f as u64,
            Ok(f) if f.is_finite() && f > MAX_COUNT as f64 => {
                return Err(format!("count '{}' exceeds {}", raw, MAX_COUNT))
            }
            _ => return Err(format!("invalid count '{}'", raw)),
        },
    };
    if count > MAX_COUNT {
        return Err(format!("count '{}' exceeds {}", raw, MAX_COUNT));
    }
    Ok(count)
}

fn sorted_headers(headers: &HashMap<String, usize>) -> Vec<&str> {
    let mut names: Vec<(&str, usize)> = headers.iter().map(|(k, &v)| (k.as_str(), v)).collect();
    names.sort_by_key(|&(_, idx)| idx);
    names.into_iter().map(|(name, _)| name).collect()
}
