//! Canonical Registry
//!
//! Authoritative list of state and district names. Built once from a JSON
//! document and read-only afterwards, so it can be shared freely.

use crate::error::{RiskError, Result};
use crate::geography::normalize::normalize_name;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::ops::Range;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{debug, info};

const BUNDLED_REGISTRY: &str = include_str!("../../data/geography.json");

static BUNDLED: OnceLock<GeographyRegistry> = OnceLock::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeoLevel {
    State,
    District,
}

impl fmt::Display for GeoLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeoLevel::State => write!(f, "state"),
            GeoLevel::District => write!(f, "district"),
        }
    }
}

/// One authoritative state or district.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanonicalEntry {
    pub name: String,
    pub level: GeoLevel,
    /// Canonical name of the parent state (districts only).
    pub parent: Option<String>,
    /// Alternative spellings that resolve exactly to this entry.
    pub aliases: Vec<String>,
    /// Normalized name followed by normalized aliases.
    #[serde(skip)]
    pub(crate) match_keys: Vec<String>,
}

impl CanonicalEntry {
    fn new(name: &str, level: GeoLevel, parent: Option<&str>, aliases: &[String]) -> Self {
        let name = name.trim().to_string();
        let aliases: Vec<String> = aliases.iter().map(|a| a.trim().to_string()).collect();

        let mut match_keys = vec![normalize_name(&name)];
        for alias in &aliases {
            let key = normalize_name(alias);
            if !key.is_empty() && !match_keys.contains(&key) {
                match_keys.push(key);
            }
        }

        Self {
            name,
            level,
            parent: parent.map(|p| p.to_string()),
            aliases,
            match_keys,
        }
    }

    /// Normalized keys this entry answers to.
    pub fn match_keys(&self) -> &[String] {
        &self.match_keys
    }
}

#[derive(Debug, Deserialize)]
struct RegistryDocument {
    states: Vec<StateDocument>,
}

#[derive(Debug, Deserialize)]
struct StateDocument {
    name: String,
    #[serde(default)]
    aliases: Vec<String>,
    #[serde(default)]
    districts: Vec<DistrictDocument>,
}

// Districts may be listed as bare names or with aliases.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DistrictDocument {
    Name(String),
    Detailed {
        name: String,
        #[serde(default)]
        aliases: Vec<String>,
    },
}

/// Read-only registry of canonical geography names.
#[derive(Debug, Clone)]
pub struct GeographyRegistry {
    /// Sorted by name.
    states: Vec<CanonicalEntry>,
    /// Sorted by (parent, name), so each state's districts are contiguous.
    districts: Vec<CanonicalEntry>,
    district_ranges: HashMap<String, Range<usize>>,
    state_keys: HashMap<String, usize>,
    district_keys: HashMap<String, Vec<usize>>,
}

impl GeographyRegistry {
    /// Parse a registry from its JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let document: RegistryDocument = serde_json::from_str(json)?;

        let mut states = Vec::with_capacity(document.states.len());
        let mut districts = Vec::new();

        for state_doc in &document.states {
            let state = CanonicalEntry::new(&state_doc.name, GeoLevel::State, None, &state_doc.aliases);
            if state.match_keys[0].is_empty() {
                return Err(RiskError::Registry(format!(
                    "state name '{}' is empty after normalization",
                    state_doc.name
                )));
            }

            for district_doc in &state_doc.districts {
                let (name, aliases) = match district_doc {
                    DistrictDocument::Name(name) => (name.as_str(), &[][..]),
                    DistrictDocument::Detailed { name, aliases } => (name.as_str(), aliases.as_slice()),
                };
                let district = CanonicalEntry::new(name, GeoLevel::District, Some(&state.name), aliases);
                if district.match_keys[0].is_empty() {
                    return Err(RiskError::Registry(format!(
                        "district name '{}' in '{}' is empty after normalization",
                        name, state.name
                    )));
                }
                districts.push(district);
            }
            states.push(state);
        }

        Self::build(states, districts)
    }

    /// Load a registry from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            RiskError::Registry(format!("Failed to read registry {}: {}", path.display(), e))
        })?;
        let registry = Self::from_json_str(&json)?;
        info!(
            "Loaded geography registry from {} ({} states, {} districts)",
            path.display(),
            registry.states.len(),
            registry.districts.len()
        );
        Ok(registry)
    }

    /// The registry shipped with the crate, parsed once per process.
    pub fn bundled() -> Result<&'static GeographyRegistry> {
        if let Some(registry) = BUNDLED.get() {
            return Ok(registry);
        }
        let registry = Self::from_json_str(BUNDLED_REGISTRY)?;
        debug!(
            "Parsed bundled geography registry ({} states, {} districts)",
            registry.states.len(),
            registry.districts.len()
        );
        Ok(BUNDLED.get_or_init(|| registry))
    }

    fn build(mut states: Vec<CanonicalEntry>, mut districts: Vec<CanonicalEntry>) -> Result<Self> {
        states.sort_by(|a, b| a.name.cmp(&b.name));
        districts.sort_by(|a, b| a.parent.cmp(&b.parent).then_with(|| a.name.cmp(&b.name)));

        // Step 1: state keys must be unique across all states
        let mut state_keys: HashMap<String, usize> = HashMap::new();
        for (idx, state) in states.iter().enumerate() {
            for key in &state.match_keys {
                if let Some(&other) = state_keys.get(key) {
                    if other != idx {
                        return Err(RiskError::Registry(format!(
                            "state key '{}' is claimed by both '{}' and '{}'",
                            key, states[other].name, state.name
                        )));
                    }
                }
                state_keys.insert(key.clone(), idx);
            }
        }

        // Step 2: district keys must be unique within their parent state
        let mut district_ranges: HashMap<String, Range<usize>> = HashMap::new();
        let mut scoped: HashMap<(String, String), usize> = HashMap::new();
        let mut district_keys: HashMap<String, Vec<usize>> = HashMap::new();

        for (idx, district) in districts.iter().enumerate() {
            let parent = district.parent.clone().unwrap_or_default();
            district_ranges
                .entry(parent.clone())
                .and_modify(|range| range.end = idx + 1)
                .or_insert(idx..idx + 1);

            for key in &district.match_keys {
                if let Some(&other) = scoped.get(&(parent.clone(), key.clone())) {
                    if other != idx {
                        return Err(RiskError::Registry(format!(
                            "district key '{}' in '{}' is claimed by both '{}' and '{}'",
                            key, parent, districts[other].name, district.name
                        )));
                    }
                    continue;
                }
                scoped.insert((parent.clone(), key.clone()), idx);
                district_keys.entry(key.clone()).or_default().push(idx);
            }
        }

        Ok(Self {
            states,
            districts,
            district_ranges,
            state_keys,
            district_keys,
        })
    }

    /// All states, sorted by name.
    pub fn states(&self) -> &[CanonicalEntry] {
        &self.states
    }

    /// All districts, sorted by (state, name).
    pub fn all_districts(&self) -> &[CanonicalEntry] {
        &self.districts
    }

    /// Districts of a state given by its canonical name.
    pub fn districts_of(&self, state: &str) -> &[CanonicalEntry] {
        match self.district_ranges.get(state) {
            Some(range) => &self.districts[range.clone()],
            None => &[],
        }
    }

    /// Look up a state by its canonical name.
    pub fn state(&self, name: &str) -> Option<&CanonicalEntry> {
        self.states
            .binary_search_by(|s| s.name.as_str().cmp(name))
            .ok()
            .map(|idx| &self.states[idx])
    }

    /// Look up a district by the canonical names of its state and itself.
    pub fn district(&self, state: &str, name: &str) -> Option<&CanonicalEntry> {
        self.districts_of(state).iter().find(|d| d.name == name)
    }

    /// Number of entries across both levels.
    pub fn len(&self) -> usize {
        self.states.len() + self.districts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty() && self.districts.is_empty()
    }

    pub(crate) fn state_by_key(&self, key: &str) -> Option<&CanonicalEntry> {
        self.state_keys.get(key).map(|&idx| &self.states[idx])
    }

    /// Districts answering to a normalized key, optionally within one state.
    pub(crate) fn districts_by_key(&self, key: &str, state: Option<&str>) -> Vec<&CanonicalEntry> {
        self.district_keys
            .get(key)
            .map(|indices| {
                indices
                    .iter()
                    .map(|&idx| &self.districts[idx])
                    .filter(|d| state.map_or(true, |s| d.parent.as_deref() == Some(s)))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "states": [
            { "name": "Karnataka", "districts": [
                { "name": "Bengaluru Urban", "aliases": ["Bangalore"] },
                "Mysuru"
            ]},
            { "name": "Bihar", "districts": ["Aurangabad", "Patna"] },
            { "name": "Maharashtra", "districts": ["Aurangabad", "Pune"] }
        ]
    }"#;

    #[test]
    fn test_parse_and_sort() {
        let registry = GeographyRegistry::from_json_str(SAMPLE).unwrap();
        let names: Vec<&str> = registry.states().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Bihar", "Karnataka", "Maharashtra"]);
        assert_eq!(registry.len(), 9);

        let karnataka: Vec<&str> = registry.districts_of("Karnataka").iter().map(|d| d.name.as_str()).collect();
        assert_eq!(karnataka, vec!["Bengaluru Urban", "Mysuru"]);
        assert!(registry.districts_of("Goa").is_empty());
    }

    #[test]
    fn test_lookup_by_canonical_name() {
        let registry = GeographyRegistry::from_json_str(SAMPLE).unwrap();
        let pune = registry.district("Maharashtra", "Pune").unwrap();
        assert_eq!(pune.parent.as_deref(), Some("Maharashtra"));
        assert_eq!(pune.level, GeoLevel::District);
        assert!(registry.state("karnataka").is_none());
        assert!(registry.state("Karnataka").is_some());
    }

    #[test]
    fn test_alias_keys() {
        let registry = GeographyRegistry::from_json_str(SAMPLE).unwrap();
        let hits = registry.districts_by_key("bangalore", Some("Karnataka"));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "Bengaluru Urban");
    }

    #[test]
    fn test_same_district_name_in_two_states() {
        let registry = GeographyRegistry::from_json_str(SAMPLE).unwrap();
        assert_eq!(registry.districts_by_key("aurangabad", None).len(), 2);
        assert_eq!(registry.districts_by_key("aurangabad", Some("Bihar")).len(), 1);
    }

    #[test]
    fn test_rejects_duplicate_within_scope() {
        let json = r#"{ "states": [ { "name": "Goa", "districts": ["North Goa", "north  goa"] } ] }"#;
        assert!(matches!(
            GeographyRegistry::from_json_str(json),
            Err(RiskError::Registry(_))
        ));

        let json = r#"{ "states": [ { "name": "Odisha" }, { "name": "Orissa", "aliases": [] },
                                    { "name": "Other", "aliases": ["odisha"] } ] }"#;
        assert!(matches!(
            GeographyRegistry::from_json_str(json),
            Err(RiskError::Registry(_))
        ));
    }

    #[test]
    fn test_bundled_registry_loads() {
        let registry = GeographyRegistry::bundled().unwrap();
        assert!(registry.state("Uttar Pradesh").is_some());
        assert!(registry.district("Karnataka", "Bengaluru Urban").is_some());
        assert!(registry.states().len() >= 36);
    }
}
