pub mod aggregator;
pub mod table;

pub use aggregator::{AggregationOutput, Aggregator, FeatureVector, UnresolvedName, FEATURE_NAMES};
pub use table::{FeatureTable, StateAverage};
