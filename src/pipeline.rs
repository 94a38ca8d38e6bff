//! Batch pipeline - extracts in, feature vectors out.
//!
//! Runs once per batch, synchronously: read every extract, resolve the raw
//! geography of each record, then aggregate the resolved records.

use crate::error::Result;
use crate::features::aggregator::{Aggregator, FeatureVector, UnresolvedName};
use crate::features::table::FeatureTable;
use crate::geography::resolver::NameResolver;
use crate::ingestion::{read_extract, Extract, ExtractSummary};
use itertools::Itertools;
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn};
use uuid::Uuid;

/// Outcome of one batch run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub run_id: Uuid,
    pub files: Vec<ExtractSummary>,
    pub rows_read: usize,
    pub rows_skipped: usize,
    pub records_resolved: usize,
    pub records_unresolved: usize,
    /// Distinct names that failed resolution, most frequent first.
    pub unresolved: Vec<UnresolvedName>,
    /// Ordered by (state, district, date).
    pub features: Vec<FeatureVector>,
}

impl PipelineReport {
    pub fn table(&self) -> FeatureTable {
        FeatureTable::new(self.features.clone())
    }
}

pub struct Pipeline<'r> {
    resolver: NameResolver<'r>,
    aggregator: Aggregator,
}

impl<'r> Pipeline<'r> {
    pub fn new(resolver: NameResolver<'r>) -> Self {
        Self {
            resolver,
            aggregator: Aggregator::new(),
        }
    }

    /// Run over extract files. A file that cannot be opened or has no
    /// recognizable header aborts the run; bad rows inside a file do not.
    pub fn run(&self, inputs: &[PathBuf]) -> Result<PipelineReport> {
        info!(
            "Starting pipeline over {} extract(s): {}",
            inputs.len(),
            inputs.iter().map(|p| p.display()).join(", ")
        );
        let extracts = inputs
            .iter()
            .map(|path| read_extract(path))
            .collect::<Result<Vec<Extract>>>()?;
        Ok(self.run_extracts(extracts))
    }

    /// Run over extracts that are already in memory.
    pub fn run_extracts(&self, extracts: Vec<Extract>) -> PipelineReport {
        let run_id = Uuid::new_v4();

        // Step 1: collect records and per-file summaries
        let mut files = Vec::with_capacity(extracts.len());
        let mut records = Vec::new();
        for extract in extracts {
            records.extend(extract.records);
            files.push(extract.summary);
        }
        let rows_read = files.iter().map(|f| f.rows_read).sum();
        let rows_skipped = files.iter().map(|f| f.rows_skipped).sum();

        // Step 2: resolve
        let resolved = self.resolver.resolve_all(records);

        // Step 3: aggregate
        let output = self.aggregator.aggregate(&resolved);
        let records_unresolved = output.excluded_records;
        let records_resolved = resolved.len() - records_unresolved;

        for name in output.unresolved.iter().take(10) {
            warn!(
                "Unresolved {} '{}' ({} rows, {:?})",
                name.level, name.raw, name.rows, name.reason
            );
        }
        info!(
            "Run {}: {} rows read, {} skipped, {} resolved, {} unresolved, {} feature vectors",
            run_id,
            rows_read,
            rows_skipped,
            records_resolved,
            records_unresolved,
            output.features.len()
        );

        PipelineReport {
            run_id,
            files,
            rows_read,
            rows_skipped,
            records_resolved,
            records_unresolved,
            unresolved: output.unresolved,
            features: output.features,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geography::registry::GeographyRegistry;
    use crate::ingestion::read_extract_from_reader;

    const ENROLMENT: &str = "\
date,state,district,pincode,age_0_5,age_5_17,age_18_greater
01-09-2025,Karnataka,Bangalore,560001,10,20,30
01-09-2025,karnataka,BENGALURU,560002,5,5,5
01-09-2025,Karnataka,Atlantis,560003,1,1,1
02-09-2025,Orissa,Khordha,751001,2,2,2
not-a-date,Karnataka,Mysuru,570001,1,1,1
";

    const BIOMETRIC: &str = "\
date,state,district,pincode,bio_age_5_17,bio_age_17_
01-09-2025,Karnataka,Bengaluru Urban,560001,7,14
";

    #[test]
    fn test_run_extracts() {
        let registry = GeographyRegistry::bundled().unwrap();
        let pipeline = Pipeline::new(NameResolver::with_default_threshold(registry));

        let extracts = vec![
            read_extract_from_reader("enrolment.csv", ENROLMENT.as_bytes()).unwrap(),
            read_extract_from_reader("biometric.csv", BIOMETRIC.as_bytes()).unwrap(),
        ];
        let report = pipeline.run_extracts(extracts);

        assert_eq!(report.files.len(), 2);
        assert_eq!(report.rows_read, 6);
        assert_eq!(report.rows_skipped, 1);
        assert_eq!(report.records_resolved, 4);
        assert_eq!(report.records_unresolved, 1);
        assert_eq!(report.unresolved[0].raw, "Atlantis");

        let bengaluru = report
            .features
            .iter()
            .find(|f| f.state == "Karnataka" && f.district == "Bengaluru Urban")
            .unwrap();
        assert_eq!(bengaluru.enrolment_load, 75);
        assert_eq!(bengaluru.record_count, 3);

        let table = report.table();
        assert!(table.states().contains(&"Odisha"));
    }

    #[test]
    fn test_run_ids_differ() {
        let registry = GeographyRegistry::bundled().unwrap();
        let pipeline = Pipeline::new(NameResolver::with_default_threshold(registry));
        let a = pipeline.run_extracts(Vec::new());
        let b = pipeline.run_extracts(Vec::new());
        assert_ne!(a.run_id, b.run_id);
        assert!(a.features.is_empty());
    }

    #[test]
    fn test_missing_file_aborts() {
        let registry = GeographyRegistry::bundled().unwrap();
        let pipeline = Pipeline::new(NameResolver::with_default_threshold(registry));
        assert!(pipeline.run(&[PathBuf::from("/nonexistent/extract.csv")]).is_err());
    }
}
