//! Service-stress risk pipeline for Aadhaar districts.
//!
//! Raw enrolment and update extracts are resolved onto a canonical
//! geography, aggregated into per-district daily feature vectors and scored
//! by a pre-trained classifier as Low, Medium or High risk.

pub mod assessment;
pub mod config;
pub mod error;
pub mod features;
pub mod geography;
pub mod ingestion;
pub mod model;
pub mod pipeline;

pub use assessment::{Assessment, Assessor, EmptyGroupReason, EmptyGroupWarning, RiskReport, Selection, StateComparison};
pub use config::PipelineConfig;
pub use error::{RiskError, Result};
pub use features::{Aggregator, FeatureTable, FeatureVector};
pub use geography::{GeographyRegistry, NameResolver};
pub use model::{ModelStore, Predictor, RiskLabel, RiskPrediction};
pub use pipeline::{Pipeline, PipelineReport};
