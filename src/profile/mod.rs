//! # Profile
//! User-declared matching/scoring criteria, loaded from TOML or JSON.
//!
//! Every field is optional in the file; an unset field imposes no restriction.
//! Dates are RFC 3339 strings (`posted_after = "2024-05-01T00:00:00Z"`).
//!
//! ```toml
//! name = "rust-remote"
//! keywords = ["rust", "backend"]
//! exclude_keywords = ["unpaid"]
//! technologies = ["rust", "postgres"]
//! min_score = 40
//! exclude_flagged = true
//! prefer_remote = true
//!
//! [weights]
//! technology = 40
//! seniority = 10
//! location = 20
//! company = 10
//! remote = 20
//! ```

pub mod compiler;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{Arc, RwLock},
    time::SystemTime,
};
use tracing::{info, warn};

pub use crate::analyze::weights::ScoreWeights;
pub use compiler::{compile, CompiledProfile};

pub const ENV_PROFILE_PATH: &str = "JOB_PROFILE_PATH";
pub const DEFAULT_PROFILE_PATH: &str = "config/profile.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    pub name: String,
    pub keywords: Vec<String>,
    pub exclude_keywords: Vec<String>,
    pub locations: Vec<String>,
    pub exclude_locations: Vec<String>,
    pub companies: Vec<String>,
    pub exclude_companies: Vec<String>,
    pub technologies: Vec<String>,
    pub exclude_technologies: Vec<String>,
    /// e.g. ["senior", "staff", "lead"]
    pub seniority_levels: Vec<String>,
    pub min_score: Option<i32>,
    pub max_score: Option<i32>,
    pub require_contact_email: bool,
    pub exclude_flagged: bool,
    pub prefer_remote: bool,
    pub posted_after: Option<DateTime<Utc>>,
    pub posted_before: Option<DateTime<Utc>>,
    pub weights: Option<ScoreWeights>,
}

impl Profile {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Trim/dedup every list and keep score bounds ordered.
    pub fn sanitized(mut self) -> Self {
        for list in [
            &mut self.keywords,
            &mut self.exclude_keywords,
            &mut self.locations,
            &mut self.exclude_locations,
            &mut self.companies,
            &mut self.exclude_companies,
            &mut self.technologies,
            &mut self.exclude_technologies,
            &mut self.seniority_levels,
        ] {
            *list = clean_list(std::mem::take(list));
        }
        if let (Some(lo), Some(hi)) = (self.min_score, self.max_score) {
            if lo > hi {
                // swap to keep a valid interval
                self.min_score = Some(hi);
                self.max_score = Some(lo);
            }
        }
        self
    }

    /// Remote counts as acceptable when the user prefers it or lists it as a location.
    pub fn accepts_remote(&self) -> bool {
        self.prefer_remote
            || self
                .locations
                .iter()
                .any(|l| l.to_lowercase().contains("remote"))
    }
}

/// Keeps first occurrence order (unlike the sorted whitelist loader) since
/// users tend to list the most important terms first.
fn clean_list(items: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for it in items {
        let t = it.trim();
        if t.is_empty() || out.iter().any(|o| o.eq_ignore_ascii_case(t)) {
            continue;
        }
        out.push(t.to_string());
    }
    out
}

/// Load a profile from an explicit path. Supports TOML or JSON formats.
pub fn load_profile_from(path: &Path) -> Result<Profile> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading profile from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_profile(&content, ext.as_str())
        .with_context(|| format!("parsing profile {}", path.display()))
}

/// Load the profile using env var + fallbacks:
/// 1) $JOB_PROFILE_PATH
/// 2) config/profile.toml
/// 3) config/profile.json
/// 4) an empty profile (no restrictions)
pub fn load_profile_default() -> Result<Profile> {
    if let Ok(p) = std::env::var(ENV_PROFILE_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_profile_from(&pb);
        }
        return Err(anyhow!("{ENV_PROFILE_PATH} points to non-existent path"));
    }
    for candidate in [DEFAULT_PROFILE_PATH, "config/profile.json"] {
        let pb = PathBuf::from(candidate);
        if pb.exists() {
            return load_profile_from(&pb);
        }
    }
    Ok(Profile::default())
}

pub fn parse_profile(s: &str, hint_ext: &str) -> Result<Profile> {
    if hint_ext == "json" || s.trim_start().starts_with('{') {
        let p: Profile = serde_json::from_str(s).context("profile json")?;
        return Ok(p.sanitized());
    }
    let p: Profile = toml::from_str(s).context("profile toml")?;
    Ok(p.sanitized())
}

/// Hot-reload wrapper: re-reads the profile file when its mtime changes and
/// hands out immutable snapshots, so a run in progress never sees an edit.
#[derive(Debug)]
pub struct HotReloadProfile {
    path: PathBuf,
    inner: RwLock<State>,
}

#[derive(Debug)]
struct State {
    profile: Arc<Profile>,
    last_modified: Option<SystemTime>,
}

impl HotReloadProfile {
    /// Create with a path (defaults to `$JOB_PROFILE_PATH` or "config/profile.toml" if `None`).
    pub fn new(path: Option<&Path>) -> Self {
        let path = path.map(Path::to_path_buf).unwrap_or_else(|| {
            std::env::var(ENV_PROFILE_PATH)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_PROFILE_PATH))
        });
        Self {
            path,
            inner: RwLock::new(State {
                profile: Arc::new(Profile::default()),
                last_modified: None,
            }),
        }
    }

    /// Fixed profile that is never reloaded (tests, embedded use).
    pub fn fixed(profile: Profile) -> Self {
        Self {
            path: PathBuf::new(),
            inner: RwLock::new(State {
                profile: Arc::new(profile),
                last_modified: None,
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Latest snapshot, reloading first if the file changed.
    /// A broken file keeps the previous snapshot.
    pub fn current(&self) -> Arc<Profile> {
        let needs_reload = match fs::metadata(&self.path).and_then(|m| m.modified()) {
            Ok(mtime) => {
                let guard = self.inner.read().expect("profile lock poisoned");
                guard.last_modified != Some(mtime)
            }
            Err(_) => false,
        };

        if !needs_reload {
            return self.inner.read().expect("profile lock poisoned").profile.clone();
        }

        let mut guard = self.inner.write().expect("profile lock poisoned");
        // Double-check in case of races.
        if let Ok(mtime) = fs::metadata(&self.path).and_then(|m| m.modified()) {
            if guard.last_modified != Some(mtime) {
                match load_profile_from(&self.path) {
                    Ok(p) => {
                        info!(target: "profile", name = %p.name, path = %self.path.display(), "profile reloaded");
                        guard.profile = Arc::new(p);
                    }
                    Err(e) => {
                        warn!(target: "profile", error = ?e, "profile reload failed; keeping previous snapshot");
                    }
                }
                guard.last_modified = Some(mtime);
            }
        }
        guard.profile.clone()
    }
}
