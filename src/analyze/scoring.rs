//! Relevance scoring of a record against a profile.
//!
//! Component scorers return a fraction in [0,1]; `CompositeScorer` combines
//! the applicable ones into a 0–100 score:
//! - average:  mean(components) * 100
//! - weighted: round(Σ weight·fraction * 100 / Σ weight) over dimensions that
//!   have a nonzero weight and non-empty criteria
//!
//! When nothing applies the score is the neutral `NEUTRAL_SCORE`. That value
//! does not distinguish "no information" from "average match".

use std::sync::Arc;

use strsim::normalized_levenshtein;

use super::weights::{Dimension, ScoreWeights};
use crate::filter::{compile_techs, TechMatcher};
use crate::profile::Profile;
use crate::record::Record;

pub const NEUTRAL_SCORE: f64 = 50.0;

/// Lowest value a remote posting earns against a remote-accepting profile
/// whose listed locations do not match.
pub const REMOTE_PARTIAL_FLOOR: f64 = 0.3;

pub trait Scorer: Send + Sync {
    /// Fraction in [0,1].
    fn score(&self, record: &Record, profile: &Profile) -> f64;

    /// False when the profile carries no criteria for this component.
    fn applicable(&self, _profile: &Profile) -> bool {
        true
    }

    fn name(&self) -> &'static str;
}

fn overlap(haystack: &str, terms: &[String]) -> f64 {
    if terms.is_empty() {
        return 0.0;
    }
    let hits = terms
        .iter()
        .filter(|t| haystack.contains(t.to_lowercase().as_str()))
        .count();
    hits as f64 / terms.len() as f64
}

/// Fraction of profile keywords found in title+description.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeywordOverlap;

impl Scorer for KeywordOverlap {
    fn score(&self, record: &Record, profile: &Profile) -> f64 {
        overlap(&record.searchable_text(), &profile.keywords)
    }
    fn applicable(&self, profile: &Profile) -> bool {
        !profile.keywords.is_empty()
    }
    fn name(&self) -> &'static str {
        "keyword_overlap"
    }
}

/// Fraction of profile keywords found in the title alone.
#[derive(Debug, Default, Clone, Copy)]
pub struct TitleKeywordOverlap;

impl Scorer for TitleKeywordOverlap {
    fn score(&self, record: &Record, profile: &Profile) -> f64 {
        overlap(&record.title.to_lowercase(), &profile.keywords)
    }
    fn applicable(&self, profile: &Profile) -> bool {
        !profile.keywords.is_empty()
    }
    fn name(&self) -> &'static str {
        "title_keyword_overlap"
    }
}

/// Fraction of profile technologies mentioned (token-bounded).
/// Matchers are compiled once from the profile snapshot.
#[derive(Debug, Clone)]
pub struct TechnologyOverlap {
    matchers: Vec<TechMatcher>,
}

impl TechnologyOverlap {
    pub fn for_profile(profile: &Profile) -> Self {
        Self {
            matchers: compile_techs(&profile.technologies),
        }
    }
}

impl Scorer for TechnologyOverlap {
    fn score(&self, record: &Record, _profile: &Profile) -> f64 {
        if self.matchers.is_empty() {
            return 0.0;
        }
        let text = record.searchable_text();
        let hits = self.matchers.iter().filter(|m| m.is_match(&text)).count();
        hits as f64 / self.matchers.len() as f64
    }
    fn applicable(&self, _profile: &Profile) -> bool {
        !self.matchers.is_empty()
    }
    fn name(&self) -> &'static str {
        "technology_overlap"
    }
}

/// 1.0 when the title names one of the wanted seniority levels.
#[derive(Debug, Clone)]
pub struct SeniorityMatch {
    levels: Vec<TechMatcher>,
}

impl SeniorityMatch {
    pub fn for_profile(profile: &Profile) -> Self {
        Self {
            levels: compile_techs(&profile.seniority_levels),
        }
    }
}

impl Scorer for SeniorityMatch {
    fn score(&self, record: &Record, _profile: &Profile) -> f64 {
        let title = record.title.to_lowercase();
        if self.levels.iter().any(|m| m.is_match(&title)) {
            1.0
        } else {
            0.0
        }
    }
    fn applicable(&self, _profile: &Profile) -> bool {
        !self.levels.is_empty()
    }
    fn name(&self) -> &'static str {
        "seniority_match"
    }
}

/// Full match 1.0; remote posting vs. remote-accepting profile 0.3–1.0
/// (scaled by string similarity to the closest wanted location); else 0.0.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocationMatch;

impl Scorer for LocationMatch {
    fn score(&self, record: &Record, profile: &Profile) -> f64 {
        let loc = record.location.to_lowercase();
        let wanted: Vec<String> = profile.locations.iter().map(|l| l.to_lowercase()).collect();
        if !loc.is_empty() && wanted.iter().any(|w| loc.contains(w.as_str())) {
            return 1.0;
        }
        if record.is_remote() && profile.accepts_remote() {
            let best = wanted
                .iter()
                .map(|w| normalized_levenshtein(&loc, w))
                .fold(0.0_f64, f64::max);
            return (REMOTE_PARTIAL_FLOOR + (1.0 - REMOTE_PARTIAL_FLOOR) * best)
                .clamp(REMOTE_PARTIAL_FLOOR, 1.0);
        }
        0.0
    }
    fn applicable(&self, profile: &Profile) -> bool {
        !profile.locations.is_empty()
    }
    fn name(&self) -> &'static str {
        "location_match"
    }
}

/// 1.0 when the company is on the profile's allow-list.
#[derive(Debug, Default, Clone, Copy)]
pub struct CompanyMatch;

impl Scorer for CompanyMatch {
    fn score(&self, record: &Record, profile: &Profile) -> f64 {
        let company = record.company.to_lowercase();
        if company.is_empty() {
            return 0.0;
        }
        if profile
            .companies
            .iter()
            .any(|c| company.contains(c.to_lowercase().as_str()))
        {
            1.0
        } else {
            0.0
        }
    }
    fn applicable(&self, profile: &Profile) -> bool {
        !profile.companies.is_empty()
    }
    fn name(&self) -> &'static str {
        "company_match"
    }
}

/// 1.0 for remote postings when the profile prefers remote.
#[derive(Debug, Default, Clone, Copy)]
pub struct RemoteMatch;

impl Scorer for RemoteMatch {
    fn score(&self, record: &Record, _profile: &Profile) -> f64 {
        if record.is_remote() {
            1.0
        } else {
            0.0
        }
    }
    fn applicable(&self, profile: &Profile) -> bool {
        profile.prefer_remote
    }
    fn name(&self) -> &'static str {
        "remote_match"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combine {
    Average,
    Weighted,
}

#[derive(Clone)]
struct Part {
    scorer: Arc<dyn Scorer>,
    weight: f64,
}

/// Combines component scorers into a 0–100 relevance score.
#[derive(Clone)]
pub struct CompositeScorer {
    parts: Vec<Part>,
    combine: Combine,
}

impl std::fmt::Debug for CompositeScorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<(&str, f64)> = self
            .parts
            .iter()
            .map(|p| (p.scorer.name(), p.weight))
            .collect();
        f.debug_struct("CompositeScorer")
            .field("combine", &self.combine)
            .field("parts", &names)
            .finish()
    }
}

impl CompositeScorer {
    pub fn average(scorers: Vec<Arc<dyn Scorer>>) -> Self {
        Self {
            parts: scorers
                .into_iter()
                .map(|scorer| Part { scorer, weight: 1.0 })
                .collect(),
            combine: Combine::Average,
        }
    }

    pub fn weighted(parts: Vec<(Arc<dyn Scorer>, f64)>) -> Self {
        Self {
            parts: parts
                .into_iter()
                .map(|(scorer, weight)| Part { scorer, weight })
                .collect(),
            combine: Combine::Weighted,
        }
    }

    /// Weighted over the five dimensions when the profile carries weights,
    /// otherwise an unweighted average of every component.
    pub fn for_profile(profile: &Profile) -> Self {
        match profile.weights {
            Some(w) => Self::weighted(dimension_parts(profile, &w)),
            None => Self::average(vec![
                Arc::new(KeywordOverlap),
                Arc::new(TitleKeywordOverlap),
                Arc::new(TechnologyOverlap::for_profile(profile)),
                Arc::new(SeniorityMatch::for_profile(profile)),
                Arc::new(LocationMatch),
                Arc::new(CompanyMatch),
                Arc::new(RemoteMatch),
            ]),
        }
    }

    pub fn combine(&self) -> Combine {
        self.combine
    }

    /// Score in [0,100].
    pub fn score(&self, record: &Record, profile: &Profile) -> f64 {
        let out = match self.combine {
            Combine::Average => {
                let vals: Vec<f64> = self
                    .parts
                    .iter()
                    .filter(|p| p.scorer.applicable(profile))
                    .map(|p| clamp01(p.scorer.score(record, profile)))
                    .collect();
                if vals.is_empty() {
                    return NEUTRAL_SCORE;
                }
                vals.iter().sum::<f64>() / vals.len() as f64 * 100.0
            }
            Combine::Weighted => {
                let mut total = 0.0;
                let mut max_attainable = 0.0;
                for p in &self.parts {
                    let w = if p.weight.is_finite() { p.weight } else { 0.0 };
                    if w <= 0.0 || !p.scorer.applicable(profile) {
                        continue;
                    }
                    max_attainable += w;
                    total += w * clamp01(p.scorer.score(record, profile));
                }
                if max_attainable <= 0.0 {
                    return NEUTRAL_SCORE;
                }
                (total * 100.0 / max_attainable).round()
            }
        };
        out.clamp(0.0, 100.0)
    }

    /// Rounded integer score, as stored on a record.
    pub fn score_record(&self, record: &Record, profile: &Profile) -> i32 {
        self.score(record, profile).round() as i32
    }
}

fn dimension_parts(profile: &Profile, w: &ScoreWeights) -> Vec<(Arc<dyn Scorer>, f64)> {
    Dimension::ALL
        .iter()
        .map(|d| {
            let scorer: Arc<dyn Scorer> = match d {
                Dimension::Technology => Arc::new(TechnologyOverlap::for_profile(profile)),
                Dimension::Seniority => Arc::new(SeniorityMatch::for_profile(profile)),
                Dimension::Location => Arc::new(LocationMatch),
                Dimension::Company => Arc::new(CompanyMatch),
                Dimension::Remote => Arc::new(RemoteMatch),
            };
            (scorer, w.weight(*d))
        })
        .collect()
}

fn clamp01(x: f64) -> f64 {
    if x.is_nan() {
        0.0
    } else {
        x.clamp(0.0, 1.0)
    }
}
