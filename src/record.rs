//! # Record
//! The normalized job posting every source adapter produces.
//!
//! Identity (`id`) and origin (`source`) are fixed at construction and only
//! readable afterwards; everything else may be rewritten by pipeline stages
//! (sanitization, flag detection, scoring).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    id: String,
    source: String,
    pub title: String,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub posted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub salary: Option<String>,
    #[serde(default)]
    pub employment_type: Option<String>,
    #[serde(default)]
    pub contact_email: Option<String>,

    // pipeline-derived
    #[serde(default)]
    pub score: i32,
    #[serde(default)]
    pub has_flags: bool,
    #[serde(default)]
    pub flags: Vec<String>,
    #[serde(default)]
    pub applied: bool,
    #[serde(default)]
    pub applied_at: Option<DateTime<Utc>>,
}

impl Record {
    /// Build a record whose id is `"<source>:<key>"`.
    ///
    /// A blank `key` falls back to a short digest of the title so that
    /// adapters without a native identifier still get a stable id.
    pub fn new(source: impl Into<String>, key: &str, title: impl Into<String>) -> Self {
        let source = source.into();
        let title = title.into();
        let id = derive_id(&source, key, &title);
        Self::with_id(id, source, title)
    }

    /// Build a record with a caller-supplied identity (stores, tests).
    pub fn with_id(
        id: impl Into<String>,
        source: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            title: title.into(),
            company: String::new(),
            location: String::new(),
            description: String::new(),
            url: String::new(),
            posted_at: None,
            salary: None,
            employment_type: None,
            contact_email: None,
            score: 0,
            has_flags: false,
            flags: Vec::new(),
            applied: false,
            applied_at: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn with_company(mut self, company: impl Into<String>) -> Self {
        self.company = company.into();
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_posted_at(mut self, at: DateTime<Utc>) -> Self {
        self.posted_at = Some(at);
        self
    }

    pub fn with_contact_email(mut self, email: impl Into<String>) -> Self {
        self.contact_email = Some(email.into());
        self
    }

    pub fn with_score(mut self, score: i32) -> Self {
        self.score = score;
        self
    }

    /// True when the posting advertises remote work anywhere in location/title/description.
    pub fn is_remote(&self) -> bool {
        const MARKERS: [&str; 4] = ["remote", "anywhere", "work from home", "wfh"];
        let loc = self.location.to_lowercase();
        if MARKERS.iter().any(|m| loc.contains(m)) {
            return true;
        }
        let title = self.title.to_lowercase();
        if title.contains("remote") {
            return true;
        }
        let desc = self.description.to_lowercase();
        desc.contains("fully remote") || desc.contains("100% remote")
    }

    /// Lowercased `title + " " + description`, the haystack for keyword checks.
    pub fn searchable_text(&self) -> String {
        let mut s = String::with_capacity(self.title.len() + self.description.len() + 1);
        s.push_str(&self.title);
        s.push(' ');
        s.push_str(&self.description);
        s.to_lowercase()
    }

    pub fn has_contact_email(&self) -> bool {
        self.contact_email
            .as_deref()
            .is_some_and(|e| !e.trim().is_empty())
    }

    /// Attach a content-safety tag (no duplicates, insertion order kept).
    pub fn add_flag(&mut self, tag: impl Into<String>) {
        let tag = tag.into();
        if !self.flags.iter().any(|f| f == &tag) {
            self.flags.push(tag);
        }
        self.has_flags = !self.flags.is_empty();
    }

    pub fn mark_applied(&mut self, at: DateTime<Utc>) {
        self.applied = true;
        self.applied_at = Some(at);
    }
}

fn derive_id(source: &str, key: &str, title: &str) -> String {
    let source = escape_source(source);
    let key = key.trim();
    if !key.is_empty() {
        return format!("{source}:{key}");
    }
    format!("{source}:{}", short_digest(title))
}

/// The first `:` of an id always ends the source part.
fn escape_source(source: &str) -> std::borrow::Cow<'_, str> {
    if source.contains([':', '%']) {
        source.replace('%', "%25").replace(':', "%3A").into()
    } else {
        source.into()
    }
}

/// First 6 bytes of SHA-256, hex encoded.
pub(crate) fn short_digest(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}
