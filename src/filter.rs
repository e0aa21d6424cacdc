//! # Filter pipeline
//!
//! A filter maps a set of records to a (usually smaller) set of records. Filters
//! work on the whole set rather than one record at a time so order-dependent
//! policies (remote-first reordering, sorting, limits) fit the same shape.
//!
//! `Pipeline::pipe([f1, f2, f3]).apply(x) == f3(f2(f1(x)))`.
//!
//! Every standard filter built from an empty criteria list is the identity, so
//! an unset profile field never restricts anything.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::dedup::dedup;
use crate::record::Record;

/// Extension point for filters outside the standard set.
pub trait RecordFilter: Send + Sync {
    fn apply(&self, records: Vec<Record>) -> Vec<Record>;
    fn name(&self) -> &str;
}

/// Wrapper so user filters can live inside [`Filter`].
#[derive(Clone)]
pub struct CustomFilter(pub Arc<dyn RecordFilter>);

impl fmt::Debug for CustomFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CustomFilter").field(&self.0.name()).finish()
    }
}

/// Case-insensitive technology matcher bounded on token edges, so `go`
/// matches "Go developer" but not "Google", and `c++` / `node.js` work.
#[derive(Debug, Clone)]
pub struct TechMatcher {
    tech: String,
    re: Regex,
}

impl TechMatcher {
    /// `None` for blank input.
    pub fn new(tech: &str) -> Option<Self> {
        let t = tech.trim().to_lowercase();
        if t.is_empty() {
            return None;
        }
        let pattern = format!(
            r"(?i)(?:^|[^a-z0-9+#.]){}(?:$|[^a-z0-9+#])",
            regex::escape(&t)
        );
        // escaped input always yields a valid pattern
        let re = Regex::new(&pattern).ok()?;
        Some(Self { tech: t, re })
    }

    pub fn tech(&self) -> &str {
        &self.tech
    }

    pub fn is_match(&self, haystack: &str) -> bool {
        self.re.is_match(haystack)
    }
}

pub fn compile_techs(techs: &[String]) -> Vec<TechMatcher> {
    techs.iter().filter_map(|t| TechMatcher::new(t)).collect()
}

/// Standard filters, dispatched through a single `match`.
#[derive(Debug, Clone)]
pub enum Filter {
    /// Keep records whose title+description contains any keyword.
    KeywordsAllow(Vec<String>),
    /// Drop records whose title+description contains any keyword.
    KeywordsDeny(Vec<String>),
    LocationAllow(Vec<String>),
    LocationDeny(Vec<String>),
    CompanyAllow(Vec<String>),
    CompanyDeny(Vec<String>),
    /// Inclusive bounds; `None` leaves that side open.
    ScoreRange { min: Option<i32>, max: Option<i32> },
    RequireContactEmail,
    ExcludeFlagged,
    /// Strictly after. Records without a posting date are kept.
    PostedAfter(DateTime<Utc>),
    /// Strictly before. Records without a posting date are kept.
    PostedBefore(DateTime<Utc>),
    TechAllow(Vec<TechMatcher>),
    TechDeny(Vec<TechMatcher>),
    /// Stable partition: remote records first, nothing removed.
    RemotePreferred,
    Dedup,
    /// Stable sort by score, highest first.
    SortByScoreDesc,
    /// Keep at most `n` records; 0 means unlimited.
    Limit(usize),
    Custom(CustomFilter),
}

impl Filter {
    pub fn keywords_allow<S: AsRef<str>>(words: &[S]) -> Self {
        Filter::KeywordsAllow(clean_terms(words))
    }

    pub fn keywords_deny<S: AsRef<str>>(words: &[S]) -> Self {
        Filter::KeywordsDeny(clean_terms(words))
    }

    pub fn location_allow<S: AsRef<str>>(terms: &[S]) -> Self {
        Filter::LocationAllow(clean_terms(terms))
    }

    pub fn location_deny<S: AsRef<str>>(terms: &[S]) -> Self {
        Filter::LocationDeny(clean_terms(terms))
    }

    pub fn company_allow<S: AsRef<str>>(terms: &[S]) -> Self {
        Filter::CompanyAllow(clean_terms(terms))
    }

    pub fn company_deny<S: AsRef<str>>(terms: &[S]) -> Self {
        Filter::CompanyDeny(clean_terms(terms))
    }

    pub fn tech_allow(techs: &[String]) -> Self {
        Filter::TechAllow(compile_techs(techs))
    }

    pub fn tech_deny(techs: &[String]) -> Self {
        Filter::TechDeny(compile_techs(techs))
    }

    pub fn custom(f: impl RecordFilter + 'static) -> Self {
        Filter::Custom(CustomFilter(Arc::new(f)))
    }

    /// True when this filter cannot change its input.
    pub fn is_identity(&self) -> bool {
        match self {
            Filter::KeywordsAllow(v)
            | Filter::KeywordsDeny(v)
            | Filter::LocationAllow(v)
            | Filter::LocationDeny(v)
            | Filter::CompanyAllow(v)
            | Filter::CompanyDeny(v) => v.is_empty(),
            Filter::TechAllow(v) | Filter::TechDeny(v) => v.is_empty(),
            Filter::ScoreRange { min, max } => min.is_none() && max.is_none(),
            Filter::Limit(n) => *n == 0,
            _ => false,
        }
    }

    /// Per-record verdict for the pure predicates; `None` for set-level filters.
    fn keeps(&self, r: &Record) -> Option<bool> {
        let keep = match self {
            Filter::KeywordsAllow(words) => {
                let text = r.searchable_text();
                words.iter().any(|w| text.contains(w.as_str()))
            }
            Filter::KeywordsDeny(words) => {
                let text = r.searchable_text();
                !words.iter().any(|w| text.contains(w.as_str()))
            }
            Filter::LocationAllow(terms) => contains_any(&r.location, terms),
            Filter::LocationDeny(terms) => !contains_any(&r.location, terms),
            Filter::CompanyAllow(terms) => contains_any(&r.company, terms),
            Filter::CompanyDeny(terms) => !contains_any(&r.company, terms),
            Filter::ScoreRange { min, max } => {
                min.map_or(true, |m| r.score >= m) && max.map_or(true, |m| r.score <= m)
            }
            Filter::RequireContactEmail => r.has_contact_email(),
            Filter::ExcludeFlagged => !r.has_flags,
            Filter::PostedAfter(bound) => r.posted_at.map_or(true, |t| t > *bound),
            Filter::PostedBefore(bound) => r.posted_at.map_or(true, |t| t < *bound),
            Filter::TechAllow(ms) => {
                let text = r.searchable_text();
                ms.iter().any(|m| m.is_match(&text))
            }
            Filter::TechDeny(ms) => {
                let text = r.searchable_text();
                !ms.iter().any(|m| m.is_match(&text))
            }
            _ => return None,
        };
        Some(keep)
    }

    pub fn name(&self) -> &str {
        match self {
            Filter::KeywordsAllow(_) => "keywords_allow",
            Filter::KeywordsDeny(_) => "keywords_deny",
            Filter::LocationAllow(_) => "location_allow",
            Filter::LocationDeny(_) => "location_deny",
            Filter::CompanyAllow(_) => "company_allow",
            Filter::CompanyDeny(_) => "company_deny",
            Filter::ScoreRange { .. } => "score_range",
            Filter::RequireContactEmail => "require_contact_email",
            Filter::ExcludeFlagged => "exclude_flagged",
            Filter::PostedAfter(_) => "posted_after",
            Filter::PostedBefore(_) => "posted_before",
            Filter::TechAllow(_) => "tech_allow",
            Filter::TechDeny(_) => "tech_deny",
            Filter::RemotePreferred => "remote_preferred",
            Filter::Dedup => "dedup",
            Filter::SortByScoreDesc => "sort_by_score_desc",
            Filter::Limit(_) => "limit",
            Filter::Custom(c) => c.0.name(),
        }
    }
}

impl RecordFilter for Filter {
    fn apply(&self, records: Vec<Record>) -> Vec<Record> {
        if self.is_identity() {
            return records;
        }
        match self {
            Filter::RemotePreferred => {
                let (mut remote, local): (Vec<_>, Vec<_>) =
                    records.into_iter().partition(Record::is_remote);
                remote.extend(local);
                remote
            }
            Filter::Dedup => dedup(records),
            Filter::SortByScoreDesc => {
                let mut v = records;
                v.sort_by(|a, b| b.score.cmp(&a.score));
                v
            }
            Filter::Limit(n) => {
                let mut v = records;
                v.truncate(*n);
                v
            }
            Filter::Custom(c) => c.0.apply(records),
            predicate => records
                .into_iter()
                .filter(|r| predicate.keeps(r).unwrap_or(true))
                .collect(),
        }
    }

    fn name(&self) -> &str {
        Filter::name(self)
    }
}

/// Ordered composition of filters, applied as a left fold.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    filters: Vec<Filter>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pipe(filters: impl IntoIterator<Item = Filter>) -> Self {
        Self {
            filters: filters.into_iter().collect(),
        }
    }

    pub fn then(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn push(&mut self, filter: Filter) {
        self.filters.push(filter);
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn apply(&self, records: Vec<Record>) -> Vec<Record> {
        self.filters.iter().fold(records, |acc, f| f.apply(acc))
    }
}

impl RecordFilter for Pipeline {
    fn apply(&self, records: Vec<Record>) -> Vec<Record> {
        Pipeline::apply(self, records)
    }

    fn name(&self) -> &str {
        "pipeline"
    }
}

fn clean_terms<S: AsRef<str>>(terms: &[S]) -> Vec<String> {
    terms
        .iter()
        .map(|t| t.as_ref().trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

fn contains_any(field: &str, lowered_terms: &[String]) -> bool {
    let f = field.to_lowercase();
    lowered_terms.iter().any(|t| f.contains(t.as_str()))
}
