//! Geography - canonical state and district names and the resolver that maps
//! free-text names onto them.

pub mod normalize;
pub mod registry;
pub mod resolver;

pub use normalize::{display_name, normalize_name};
pub use registry::{CanonicalEntry, GeoLevel, GeographyRegistry};
pub use resolver::{FailureReason, NameResolver, ResolutionFailure, ResolvedGeography, ResolvedRecord};
