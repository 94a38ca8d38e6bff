use aadhaar_risk::assessment::{Assessment, Assessor, EmptyGroupReason, Selection};
use aadhaar_risk::features::FeatureTable;
use aadhaar_risk::geography::{GeographyRegistry, NameResolver};
use aadhaar_risk::model::{ModelStore, RiskLabel};
use aadhaar_risk::pipeline::Pipeline;
use chrono::NaiveDate;
use std::fs;
use std::path::{Path, PathBuf};

/// Write one extract of each kind into `dir`.
fn create_extracts(dir: &Path) -> Result<Vec<PathBuf>, Box<dyn std::error::Error>> {
    let enrolment = dir.join("enrolment.csv");
    fs::write(
        &enrolment,
        "date,state,district,pincode,age_0_5,age_5_17,age_18_greater\n\
         01-09-2025,Karnataka,Bangalore,560001,500,300,200\n\
         01-09-2025,KARNATAKA,bengaluru urban,560002,300,300,400\n\
         02-09-2025,Karnataka,Bengaluru,560001,10,10,10\n\
         01-09-2025,Karnataka,Mysore,570001,10,10,10\n\
         01-09-2025,Karnatka,Banglore Rural,562110,4,4,4\n\
         01-09-2025,Karnataka,Gotham,560099,1,1,1\n\
         31-02-2025,Karnataka,Mysuru,570001,1,1,1\n",
    )?;

    let biometric = dir.join("biometric.csv");
    fs::write(
        &biometric,
        "date,state,district,pincode,bio_age_5_17,bio_age_17_\n\
         01-09-2025,Karnataka,Bengaluru Urban,560001,3000,2000\n\
         01-09-2025,Karnataka,Mysuru,570001,,0\n",
    )?;

    let demographic = dir.join("demographic.csv");
    fs::write(
        &demographic,
        "date,state,district,pincode,demo_age_5_17,demo_age_17_\n\
         01-09-2025,Karnataka,Mysuru,570001,3,6\n",
    )?;

    Ok(vec![enrolment, biometric, demographic])
}

fn artifacts() -> (PathBuf, PathBuf) {
    let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("model");
    (root.join("risk_model.json"), root.join("label_encoder.json"))
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 9, d).unwrap()
}

#[test]
fn test_extracts_to_feature_file() {
    let dir = tempfile::tempdir().unwrap();
    let inputs = create_extracts(dir.path()).unwrap();

    let registry = GeographyRegistry::bundled().unwrap();
    let report = Pipeline::new(NameResolver::with_default_threshold(registry))
        .run(&inputs)
        .unwrap();

    assert_eq!(report.files.len(), 3);
    assert_eq!(report.rows_read, 10);
    assert_eq!(report.rows_skipped, 1);
    assert_eq!(report.records_unresolved, 1);
    assert_eq!(report.records_resolved, 8);
    assert_eq!(report.unresolved.len(), 1);
    assert_eq!(report.unresolved[0].raw, "Gotham");

    let output = dir.path().join("out").join("features.csv");
    report.table().write_csv(&output).unwrap();
    let table = FeatureTable::read_csv(&output).unwrap();
    assert_eq!(table.len(), report.features.len());

    let bengaluru = table.lookup("Karnataka", "Bengaluru Urban", day(1)).unwrap();
    assert_eq!(bengaluru.enrolment_load, 2000);
    assert!((bengaluru.child_share - 0.4).abs() < 1e-9);
    assert!((bengaluru.adult_biometric_ratio - 1.0).abs() < 1e-9);
    assert!((bengaluru.share_total() - 1.0).abs() < 1e-9);

    // Misspelled state and district both resolve
    assert!(table.lookup("Karnataka", "Bengaluru Rural", day(1)).is_some());

    // Enrolment, biometric and demographic rows land in one group
    let mysuru = table.lookup("Karnataka", "Mysuru", day(1)).unwrap();
    assert_eq!(mysuru.enrolment_load, 30);
    assert!((mysuru.demographic_pressure - 0.3).abs() < 1e-9);

    assert_eq!(table.dates("Karnataka", "Bengaluru Urban"), vec![day(1), day(2)]);
}

#[test]
fn test_assess_with_bundled_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let inputs = create_extracts(dir.path()).unwrap();

    let registry = GeographyRegistry::bundled().unwrap();
    let resolver = NameResolver::with_default_threshold(registry);
    let table = Pipeline::new(resolver).run(&inputs).unwrap().table();

    let (model_path, encoder_path) = artifacts();
    let models = ModelStore::new(model_path, encoder_path);
    let assessor = Assessor::new(&table, resolver, &models, 20);

    let high = assessor
        .assess(&Selection::new("Karnataka", "Bangalore", Some(day(1))), day(30))
        .unwrap();
    let Assessment::Scored(report) = high else {
        panic!("expected a scored assessment");
    };
    assert_eq!(report.prediction.label, RiskLabel::High);
    let total: f64 = report.prediction.probabilities.iter().map(|(_, p)| p).sum();
    assert!((total - 1.0).abs() < 1e-9);
    assert_eq!(report.prediction.contributions[0].feature, "total_enrolment");
    assert_eq!(report.trend.len(), 2);

    // The default date is the latest one when today has no data
    let low = assessor
        .assess(&Selection::new("Karnataka", "Bengaluru Urban", None), day(30))
        .unwrap();
    let Assessment::Scored(report) = low else {
        panic!("expected a scored assessment");
    };
    assert_eq!(report.features.date, day(2));
    assert_eq!(report.prediction.label, RiskLabel::Low);

    let empty = assessor
        .assess(&Selection::new("Karnataka", "Mysuru", Some(day(2))), day(30))
        .unwrap();
    assert!(matches!(
        empty,
        Assessment::InsufficientData(ref w) if w.reason == EmptyGroupReason::NoRecordsOnDate
    ));
}

#[test]
fn test_legacy_feature_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("final_ml_dataset.csv");
    fs::write(
        &path,
        "state,district,date,total_enrolment,child_share,youth_share,adult_share,bio_ratio_5_17,bio_ratio_17,log_load\n\
         Goa,North Goa,01-09-2025,40,0.25,0.25,0.5,0.1,0.2,3.713572\n\
         Goa,North Goa,02-09-2025,60,0.5,0.25,0.25,0.0,0.0,4.110874\n",
    )
    .unwrap();

    let table = FeatureTable::read_csv(&path).unwrap();
    assert_eq!(table.len(), 2);
    let first = table.lookup("Goa", "North Goa", day(1)).unwrap();
    assert_eq!(first.enrolment_load, 40);
    assert!((first.adult_biometric_ratio - 0.2).abs() < 1e-9);
    assert!((first.biometric_pressure - 0.3).abs() < 1e-9);

    let average = table.state_average("Goa").unwrap();
    assert!((average.mean_enrolment_load - 50.0).abs() < 1e-9);
}

#[test]
fn test_legacy_names_are_assessable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("final_ml_dataset.csv");
    fs::write(
        &path,
        "state,district,date,total_enrolment,child_share,youth_share,adult_share,bio_ratio_5_17,bio_ratio_17,log_load\n\
         west_bengal,north-24-parganas,01-09-2025,40,0.25,0.25,0.5,0.1,0.2,3.713572\n",
    )
    .unwrap();

    let registry = GeographyRegistry::bundled().unwrap();
    let resolver = NameResolver::with_default_threshold(registry);
    let table = FeatureTable::read_csv(&path).unwrap().with_canonical_names(&resolver);

    let (model_path, encoder_path) = artifacts();
    let models = ModelStore::new(model_path, encoder_path);
    let assessor = Assessor::new(&table, resolver, &models, 20);

    let assessment = assessor
        .assess(&Selection::new("West Bengal", "North 24 Parganas", None), day(30))
        .unwrap();
    let Assessment::Scored(report) = assessment else {
        panic!("expected a scored assessment");
    };
    assert_eq!(report.features.date, day(1));
    assert_eq!(report.features.enrolment_load, 40);
}
