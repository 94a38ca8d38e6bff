//! Name Resolver
//!
//! Maps raw state/district strings onto canonical registry entries: exact
//! lookup on the normalized form first, then edit-distance similarity over
//! the candidates in scope, accepted only above a fixed threshold.

use crate::config::DEFAULT_MATCH_THRESHOLD;
use crate::geography::normalize::normalize_name;
use crate::geography::registry::{CanonicalEntry, GeoLevel, GeographyRegistry};
use crate::ingestion::RawRecord;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use strsim::normalized_levenshtein;
use tracing::{debug, info};

/// Why a raw name could not be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Nothing left after normalization.
    EmptyName,
    /// The district's parent state hint did not resolve.
    ParentUnresolved,
    /// No candidate reached the similarity threshold.
    BelowThreshold,
}

/// A raw name with no acceptable canonical match. Non-fatal; kept for review.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolutionFailure {
    pub raw: String,
    pub level: GeoLevel,
    pub parent_hint: Option<String>,
    pub reason: FailureReason,
    /// Closest canonical name and its similarity, when any candidate was scored.
    pub best_candidate: Option<(String, f64)>,
}

impl fmt::Display for ResolutionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unresolved {} '{}'", self.level, self.raw)?;
        if let Some(parent) = &self.parent_hint {
            write!(f, " (in '{}')", parent)?;
        }
        match (&self.reason, &self.best_candidate) {
            (FailureReason::BelowThreshold, Some((name, score))) => {
                write!(f, ": closest '{}' at {:.3}", name, score)
            }
            (FailureReason::BelowThreshold, None) => write!(f, ": no candidates"),
            (FailureReason::EmptyName, _) => write!(f, ": empty name"),
            (FailureReason::ParentUnresolved, _) => write!(f, ": parent state unresolved"),
        }
    }
}

/// Canonical (state, district) pair for a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ResolvedGeography {
    pub state: String,
    pub district: String,
}

/// A raw record together with its resolution outcome.
#[derive(Debug, Clone)]
pub struct ResolvedRecord {
    pub raw: RawRecord,
    pub geography: Result<ResolvedGeography, ResolutionFailure>,
}

impl ResolvedRecord {
    pub fn is_resolved(&self) -> bool {
        self.geography.is_ok()
    }
}

/// Resolves raw names against a registry.
#[derive(Debug, Clone, Copy)]
pub struct NameResolver<'r> {
    registry: &'r GeographyRegistry,
    threshold: f64,
}

impl<'r> NameResolver<'r> {
    pub fn new(registry: &'r GeographyRegistry, threshold: f64) -> Self {
        Self { registry, threshold }
    }

    pub fn with_default_threshold(registry: &'r GeographyRegistry) -> Self {
        Self::new(registry, DEFAULT_MATCH_THRESHOLD)
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn registry(&self) -> &'r GeographyRegistry {
        self.registry
    }

    /// Similarity (0.0-1.0) between two raw names after normalization.
    pub fn similarity(a: &str, b: &str) -> f64 {
        normalized_levenshtein(&normalize_name(a), &normalize_name(b))
    }

    /// Resolve one raw name.
    ///
    /// For districts, `parent_hint` (a raw or canonical state name) restricts
    /// the candidates to that state's districts. Without a hint every district
    /// is a candidate.
    pub fn resolve(
        &self,
        raw: &str,
        level: GeoLevel,
        parent_hint: Option<&str>,
    ) -> Result<&'r CanonicalEntry, ResolutionFailure> {
        let failure = |reason: FailureReason, best: Option<(&CanonicalEntry, f64)>| ResolutionFailure {
            raw: raw.to_string(),
            level,
            parent_hint: parent_hint.map(|p| p.to_string()),
            reason,
            best_candidate: best.map(|(entry, score)| (entry.name.clone(), score)),
        };

        let key = normalize_name(raw);
        if key.is_empty() {
            return Err(failure(FailureReason::EmptyName, None));
        }

        match level {
            GeoLevel::State => {
                if let Some(state) = self.registry.state_by_key(&key) {
                    return Ok(state);
                }
                let best = best_candidate(&key, self.registry.states());
                self.accept(best).ok_or_else(|| failure(FailureReason::BelowThreshold, best))
            }
            GeoLevel::District => {
                let scope = match parent_hint {
                    Some(hint) => match self.resolve(hint, GeoLevel::State, None) {
                        Ok(state) => Some(state.name.as_str()),
                        Err(_) => return Err(failure(FailureReason::ParentUnresolved, None)),
                    },
                    None => None,
                };

                let mut exact = self.registry.districts_by_key(&key, scope);
                if !exact.is_empty() {
                    exact.sort_by(|a, b| tie_order(a).cmp(&tie_order(b)));
                    return Ok(exact[0]);
                }

                let candidates = match scope {
                    Some(state) => self.registry.districts_of(state),
                    None => self.registry.all_districts(),
                };
                let best = best_candidate(&key, candidates);
                self.accept(best).ok_or_else(|| failure(FailureReason::BelowThreshold, best))
            }
        }
    }

    /// Closest candidate regardless of threshold, with its similarity.
    pub fn closest(
        &self,
        raw: &str,
        level: GeoLevel,
        parent_state: Option<&str>,
    ) -> Option<(&'r CanonicalEntry, f64)> {
        let key = normalize_name(raw);
        if key.is_empty() {
            return None;
        }
        match level {
            GeoLevel::State => best_candidate(&key, self.registry.states()),
            GeoLevel::District => match parent_state {
                Some(state) => best_candidate(&key, self.registry.districts_of(state)),
                None => best_candidate(&key, self.registry.all_districts()),
            },
        }
    }

    fn accept(&self, best: Option<(&'r CanonicalEntry, f64)>) -> Option<&'r CanonicalEntry> {
        best.filter(|(_, score)| *score >= self.threshold).map(|(entry, _)| entry)
    }

    /// Resolve a (state, district) pair: the state first, then the district
    /// within the resolved state.
    pub fn resolve_geography(
        &self,
        state_raw: &str,
        district_raw: &str,
    ) -> Result<ResolvedGeography, ResolutionFailure> {
        let state = self.resolve(state_raw, GeoLevel::State, None)?;
        let district = self.resolve(district_raw, GeoLevel::District, Some(&state.name))?;
        Ok(ResolvedGeography {
            state: state.name.clone(),
            district: district.name.clone(),
        })
    }

    pub fn resolve_record(&self, record: RawRecord) -> ResolvedRecord {
        let geography = self.resolve_geography(&record.state_raw, &record.district_raw);
        ResolvedRecord { raw: record, geography }
    }

    /// Resolve a batch. Identical raw (state, district) pairs are looked up once.
    pub fn resolve_all(&self, records: Vec<RawRecord>) -> Vec<ResolvedRecord> {
        let mut memo: HashMap<(String, String), Result<ResolvedGeography, ResolutionFailure>> =
            HashMap::new();
        let mut failed = 0usize;

        let resolved: Vec<ResolvedRecord> = records
            .into_iter()
            .map(|record| {
                let key = (record.state_raw.clone(), record.district_raw.clone());
                let geography = memo
                    .entry(key)
                    .or_insert_with(|| self.resolve_geography(&record.state_raw, &record.district_raw))
                    .clone();
                if geography.is_err() {
                    failed += 1;
                }
                ResolvedRecord { raw: record, geography }
            })
            .collect();

        debug!("{} distinct raw geography pairs looked up", memo.len());
        info!(
            "Resolved {} of {} records ({} unresolved)",
            resolved.len() - failed,
            resolved.len(),
            failed
        );
        resolved
    }
}

fn tie_order(entry: &CanonicalEntry) -> (&str, Option<&str>) {
    (entry.name.as_str(), entry.parent.as_deref())
}

/// Highest-scoring candidate. A candidate scores the best similarity over its
/// name and aliases; equal scores go to the lexicographically first name.
fn best_candidate<'c>(key: &str, candidates: &'c [CanonicalEntry]) -> Option<(&'c CanonicalEntry, f64)> {
    let mut best: Option<(&CanonicalEntry, f64)> = None;

    for candidate in candidates {
        let score = candidate
            .match_keys()
            .iter()
            .map(|k| normalized_levenshtein(key, k))
            .fold(0.0, f64::max);

        best = match best {
            None => Some((candidate, score)),
            Some((current, current_score)) => {
                if score > current_score
                    || (score == current_score && tie_order(candidate) < tie_order(current))
                {
                    Some((candidate, score))
                } else {
                    Some((current, current_score))
                }
            }
        };
    }

    best
}
