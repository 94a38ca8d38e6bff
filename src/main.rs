use aadhaar_risk::assessment::{Assessment, Assessor, EmptyGroupReason, Selection};
use aadhaar_risk::config::PipelineConfig;
use aadhaar_risk::features::FeatureTable;
use aadhaar_risk::geography::{display_name, GeoLevel, GeographyRegistry, NameResolver};
use aadhaar_risk::ingestion::{format_date, parse_date};
use aadhaar_risk::model::ModelStore;
use aadhaar_risk::pipeline::Pipeline;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "aadhaar-risk")]
#[command(about = "District-level Aadhaar service stress risk pipeline")]
#[command(version)]
struct Args {
    /// Geography registry JSON (default: bundled registry, or AADHAAR_REGISTRY_PATH)
    #[arg(long, global = true)]
    registry: Option<PathBuf>,

    /// Minimum similarity for approximate name matches (or AADHAAR_MATCH_THRESHOLD)
    #[arg(long, global = true)]
    threshold: Option<f64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the feature file from enrolment, biometric and demographic extracts
    BuildFeatures {
        /// Extract CSV files
        #[arg(short, long, required = true, num_args = 1..)]
        input: Vec<PathBuf>,

        /// Feature file to write (or AADHAAR_FEATURES_PATH)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Assess the risk of one district on one date
    Assess {
        #[arg(long)]
        state: String,

        #[arg(long)]
        district: String,

        /// DD-MM-YYYY (default: today if present, else the latest date)
        #[arg(long)]
        date: Option<String>,

        /// Feature file to read (or AADHAAR_FEATURES_PATH)
        #[arg(long)]
        features: Option<PathBuf>,

        /// Print the assessment as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show how a raw name resolves against the registry
    Resolve {
        name: String,

        #[arg(long, value_enum, default_value_t = Level::State)]
        level: Level,

        /// Parent state, for district lookups
        #[arg(long)]
        parent: Option<String>,
    },
    /// List states, or the districts of a state, present in the feature file
    List {
        #[arg(long)]
        state: Option<String>,

        /// Feature file to read (or AADHAAR_FEATURES_PATH)
        #[arg(long)]
        features: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Level {
    State,
    District,
}

impl From<Level> for GeoLevel {
    fn from(level: Level) -> Self {
        match level {
            Level::State => GeoLevel::State,
            Level::District => GeoLevel::District,
        }
    }
}

fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = PipelineConfig::from_env().context("Invalid configuration")?;
    if let Some(path) = args.registry {
        config.registry_path = Some(path);
    }
    if let Some(threshold) = args.threshold {
        config.match_threshold = threshold;
    }
    config.validate().context("Invalid configuration")?;

    let owned;
    let registry: &GeographyRegistry = match &config.registry_path {
        Some(path) => {
            owned = GeographyRegistry::load(path)
                .with_context(|| format!("Failed to load registry {}", path.display()))?;
            &owned
        }
        None => GeographyRegistry::bundled().context("Failed to load bundled registry")?,
    };
    let resolver = NameResolver::new(registry, config.match_threshold);

    match args.command {
        Commands::BuildFeatures { input, output, json } => {
            let output = output.unwrap_or_else(|| config.features_path.clone());
            build_features(resolver, input, output, json)
        }
        Commands::Assess {
            state,
            district,
            date,
            features,
            json,
        } => {
            let date = match date {
                Some(raw) => Some(
                    parse_date(&raw).with_context(|| format!("Invalid date '{}', expected DD-MM-YYYY", raw))?,
                ),
                None => None,
            };
            let features = features.unwrap_or_else(|| config.features_path.clone());
            assess(&config, resolver, Selection::new(state, district, date), features, json)
        }
        Commands::Resolve { name, level, parent } => resolve(resolver, &name, level.into(), parent.as_deref()),
        Commands::List { state, features } => {
            let features = features.unwrap_or_else(|| config.features_path.clone());
            list(resolver, state.as_deref(), features)
        }
    }
}

fn build_features(resolver: NameResolver<'_>, input: Vec<PathBuf>, output: PathBuf, json: bool) -> Result<()> {
    let report = Pipeline::new(resolver).run(&input).context("Pipeline run failed")?;
    report
        .table()
        .write_csv(&output)
        .with_context(|| format!("Failed to write feature file {}", output.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("\n{}", "=".repeat(80));
    println!(" FEATURE BUILD {}", report.run_id);
    println!("{}", "=".repeat(80));
    for file in &report.files {
        println!(
            "   {} ({}): {} rows, {} skipped",
            file.source, file.kind, file.rows_read, file.rows_skipped
        );
        for sample in &file.skip_samples {
            println!("      - {}", sample);
        }
    }
    println!("\n Records resolved:   {}", report.records_resolved);
    println!(" Records unresolved: {}", report.records_unresolved);
    println!(" Feature vectors:    {}", report.features.len());
    println!(" Written to:         {}", output.display());

    if !report.unresolved.is_empty() {
        println!("\n UNRESOLVED NAMES");
        println!("{}", "-".repeat(80));
        for name in &report.unresolved {
            let parent = name.parent_hint.as_deref().map(|p| format!(" in '{}'", p)).unwrap_or_default();
            let closest = name
                .best_candidate
                .as_ref()
                .map(|(c, score)| format!(", closest '{}' ({:.3})", c, score))
                .unwrap_or_default();
            println!(
                "   {} '{}'{}: {} rows, {:?}{}",
                name.level, name.raw, parent, name.rows, name.reason, closest
            );
        }
    }
    Ok(())
}

fn assess(
    config: &PipelineConfig,
    resolver: NameResolver<'_>,
    selection: Selection,
    features: PathBuf,
    json: bool,
) -> Result<()> {
    info!("Loading feature file {}", features.display());
    let table = FeatureTable::read_csv(&features)
        .with_context(|| format!("Failed to load feature file {}", features.display()))?
        .with_canonical_names(&resolver);
    let models = ModelStore::new(&config.model_path, &config.encoder_path);
    let assessor = Assessor::new(&table, resolver, &models, config.trend_window);

    let today = chrono::Local::now().date_naive();
    let assessment = assessor.assess(&selection, today).context("Assessment failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&assessment)?);
        return Ok(());
    }

    let report = match assessment {
        Assessment::Scored(report) => report,
        Assessment::InsufficientData(warning) => {
            let reason = match &warning.reason {
                EmptyGroupReason::UnknownLocation(failure) => failure.to_string(),
                EmptyGroupReason::NoRecords => "no records for this district".to_string(),
                EmptyGroupReason::NoRecordsOnDate => "no records on this date".to_string(),
            };
            println!("\n Insufficient data for {} / {}: {}", warning.district, warning.state, reason);
            return Ok(());
        }
    };

    let f = &report.features;
    let p = &report.prediction;
    println!("\n{}", "=".repeat(80));
    println!(
        " {} / {} on {}",
        display_name(&f.district),
        display_name(&f.state),
        format_date(f.date)
    );
    println!("{}", "=".repeat(80));
    println!("\n Risk level: {} ({:.1}% confidence)", p.label, p.confidence * 100.0);
    println!("   {}", p.label.summary());
    for (label, prob) in &p.probabilities {
        println!("   P({}) = {:.3}", label, prob);
    }

    println!("\n Recommended actions:");
    for advisory in p.label.advisories() {
        println!("   - {}", advisory);
    }

    println!("\n Key factors:");
    for c in p.contributions.iter().take(5) {
        println!(
            "   {:<24} value {:>12.4}  importance {:.3}",
            c.feature, c.value, c.importance
        );
    }

    let cmp = &report.comparison;
    println!("\n Compared with the {} average ({} vectors):", cmp.average.state, cmp.average.vectors);
    println!("   Enrolment load: {} ({:+.1}%)", f.enrolment_load, cmp.enrolment_change_pct);
    println!(
        "   Adult biometric ratio: {:.3} ({:+.1}%)",
        f.adult_biometric_ratio, cmp.biometric_change_pct
    );
    println!("   Child share: {:.1}%", cmp.child_share_pct);

    println!("\n Trend:");
    if report.trend.is_empty() {
        println!("   Not enough historical dates for a trend");
    } else {
        for v in &report.trend {
            println!(
                "   {}  load {:>8}  biometric pressure {:.3}",
                format_date(v.date),
                v.enrolment_load,
                v.biometric_pressure
            );
        }
    }
    Ok(())
}

fn resolve(resolver: NameResolver<'_>, name: &str, level: GeoLevel, parent: Option<&str>) -> Result<()> {
    match resolver.resolve(name, level, parent) {
        Ok(entry) => {
            let parent = entry.parent.as_deref().map(|p| format!(" ({})", p)).unwrap_or_default();
            let score = entry
                .match_keys()
                .iter()
                .map(|key| NameResolver::similarity(name, key))
                .fold(0.0, f64::max);
            println!(" {} '{}' -> {}{} [similarity {:.3}]", level, name, entry.name, parent, score);
        }
        Err(failure) => println!(" {}", failure),
    }
    Ok(())
}

fn list(resolver: NameResolver<'_>, state: Option<&str>, features: PathBuf) -> Result<()> {
    let table = FeatureTable::read_csv(&features)
        .with_context(|| format!("Failed to load feature file {}", features.display()))?
        .with_canonical_names(&resolver);

    match state {
        None => {
            for state in table.states() {
                println!("{}", state);
            }
        }
        Some(raw) => {
            let state = if table.states().contains(&raw) {
                raw.to_string()
            } else {
                resolver
                    .resolve(raw, GeoLevel::State, None)
                    .map(|entry| entry.name.clone())
                    .map_err(|failure| anyhow::anyhow!("{}", failure))?
            };
            for district in table.districts(&state) {
                println!("{}", district);
            }
        }
    }
    Ok(())
}
