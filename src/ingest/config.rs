// src/ingest/config.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use super::incremental::ExecutionMode;
use super::providers::{FieldMap, JsonApiAdapter, RssFeedAdapter};
use super::types::SourceAdapter;

pub const ENV_SOURCES_PATH: &str = "JOB_SOURCES_PATH";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Rss,
    JsonApi,
}

/// One configured source. Either `url` or `fixture` (a local file) is required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSpec {
    pub name: String,
    pub kind: SourceKind,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub fixture: Option<PathBuf>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// JSON pointer to the item array (json_api only).
    #[serde(default)]
    pub items_pointer: Option<String>,
    #[serde(default)]
    pub fields: FieldMap,
}

fn default_enabled() -> bool {
    true
}

/// Load sources from an explicit path. Supports TOML or JSON formats.
pub fn load_sources_from(path: &Path) -> Result<Vec<SourceSpec>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading sources from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_sources(&content, ext.as_str())
}

/// Load sources using env var + fallbacks:
/// 1) $JOB_SOURCES_PATH
/// 2) config/sources.toml
/// 3) config/sources.json
pub fn load_sources_default() -> Result<Vec<SourceSpec>> {
    if let Ok(p) = std::env::var(ENV_SOURCES_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_sources_from(&pb);
        } else {
            return Err(anyhow!("JOB_SOURCES_PATH points to non-existent path"));
        }
    }
    let toml_p = PathBuf::from("config/sources.toml");
    if toml_p.exists() {
        return load_sources_from(&toml_p);
    }
    let json_p = PathBuf::from("config/sources.json");
    if json_p.exists() {
        return load_sources_from(&json_p);
    }
    Ok(Vec::new())
}

fn parse_sources(s: &str, hint_ext: &str) -> Result<Vec<SourceSpec>> {
    match hint_ext {
        "json" => parse_json(s),
        "toml" => parse_toml(s),
        // `[` opens both a JSON array and a TOML table header
        _ if s.trim_start().starts_with(['[', '{']) => {
            parse_json(s).or_else(|json_err| parse_toml(s).map_err(|_| json_err))
        }
        _ => parse_toml(s),
    }
}

#[derive(Deserialize)]
struct SourcesDoc {
    #[serde(default)]
    sources: Vec<SourceSpec>,
}

fn parse_toml(s: &str) -> Result<Vec<SourceSpec>> {
    let v: SourcesDoc = toml::from_str(s).context("sources toml")?;
    Ok(clean_list(v.sources))
}

/// Either a bare array or `{ "sources": [...] }`.
fn parse_json(s: &str) -> Result<Vec<SourceSpec>> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Doc {
        List(Vec<SourceSpec>),
        Wrapped(SourcesDoc),
    }
    let v: Doc = serde_json::from_str(s).context("sources json")?;
    let list = match v {
        Doc::List(l) => l,
        Doc::Wrapped(d) => d.sources,
    };
    Ok(clean_list(list))
}

/// Drop disabled, nameless and location-less entries; first name wins.
fn clean_list(items: Vec<SourceSpec>) -> Vec<SourceSpec> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::with_capacity(items.len());
    for mut it in items {
        it.name = it.name.trim().to_string();
        let has_location = it.url.as_deref().is_some_and(|u| !u.trim().is_empty())
            || it.fixture.is_some();
        if !it.enabled || it.name.is_empty() || !has_location {
            continue;
        }
        if !seen.insert(it.name.clone()) {
            tracing::warn!(target: "ingest", source = %it.name, "duplicate source name ignored");
            continue;
        }
        out.push(it);
    }
    out
}

/// Instantiate adapters in configuration order. Fixture files are read eagerly.
pub fn build_adapters(specs: &[SourceSpec]) -> Result<Vec<Arc<dyn SourceAdapter>>> {
    let client = reqwest::Client::new();
    let mut out: Vec<Arc<dyn SourceAdapter>> = Vec::with_capacity(specs.len());
    for spec in specs {
        let fixture = match &spec.fixture {
            Some(p) => Some(
                fs::read_to_string(p)
                    .with_context(|| format!("reading fixture {} for {}", p.display(), spec.name))?,
            ),
            None => None,
        };
        let url = spec.url.clone().unwrap_or_default();
        let adapter: Arc<dyn SourceAdapter> = match spec.kind {
            SourceKind::Rss => Arc::new(match fixture {
                Some(body) => RssFeedAdapter::from_fixture(&spec.name, body),
                None => RssFeedAdapter::from_url_with_client(&spec.name, url, client.clone()),
            }),
            SourceKind::JsonApi => {
                let a = match fixture {
                    Some(body) => JsonApiAdapter::from_fixture(&spec.name, body),
                    None => JsonApiAdapter::from_url_with_client(&spec.name, url, client.clone()),
                };
                Arc::new(
                    a.with_items_pointer(spec.items_pointer.clone().unwrap_or_default())
                        .with_fields(spec.fields.clone()),
                )
            }
        };
        out.push(adapter);
    }
    Ok(out)
}

/// Runtime knobs of an aggregation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatorSettings {
    pub per_source_timeout: Duration,
    pub run_deadline: Duration,
    pub mode: ExecutionMode,
}

impl Default for AggregatorSettings {
    fn default() -> Self {
        Self {
            per_source_timeout: Duration::from_secs(30),
            run_deadline: Duration::from_secs(300),
            mode: ExecutionMode::Sequential,
        }
    }
}

impl AggregatorSettings {
    /// `AGG_SOURCE_TIMEOUT_SECS`, `AGG_RUN_DEADLINE_SECS`,
    /// `AGG_PARALLEL`. Missing or invalid values keep the defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let d = Self::default();
        let positive = |k: &str| {
            get(k)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .filter(|n| *n > 0)
        };
        let parallel = get("AGG_PARALLEL").is_some_and(|v| {
            matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
        });
        Self {
            per_source_timeout: positive("AGG_SOURCE_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(d.per_source_timeout),
            run_deadline: positive("AGG_RUN_DEADLINE_SECS")
                .map(Duration::from_secs)
                .unwrap_or(d.run_deadline),
            mode: if parallel {
                ExecutionMode::Parallel
            } else {
                d.mode
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{collections::HashMap, env};

    #[test]
    fn cleans_disabled_blank_and_duplicate_entries() {
        let toml = r#"
            [[sources]]
            name = " remoteok "
            kind = "json_api"
            url = "https://remoteok.example/api"

            [[sources]]
            name = "remoteok"
            kind = "rss"
            url = "https://dup.example/feed"

            [[sources]]
            name = "off"
            kind = "rss"
            url = "https://off.example/feed"
            enabled = false

            [[sources]]
            name = "nowhere"
            kind = "rss"
        "#;
        let out = parse_toml(toml).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].name, "remoteok");
        assert_eq!(out[0].kind, SourceKind::JsonApi);
        assert_eq!(out[0].fields, FieldMap::default());
    }

    #[test]
    fn json_array_and_wrapped_forms() {
        let arr = r#"[{"name":"a","kind":"rss","url":"https://a"}]"#;
        let wrapped = r#"{"sources":[{"name":"b","kind":"json_api","url":"https://b",
            "items_pointer":"/jobs","fields":{"title":"position"}}]}"#;
        assert_eq!(parse_sources(arr, "").unwrap()[0].name, "a");
        assert_eq!(parse_sources(arr, "").unwrap()[0].kind, SourceKind::Rss);
        let b = &parse_sources(wrapped, "json").unwrap()[0];
        assert_eq!(b.items_pointer.as_deref(), Some("/jobs"));
        assert_eq!(b.fields.title, "position");
        assert_eq!(b.fields.company, "company");
    }

    #[test]
    fn settings_from_lookup_falls_back_on_garbage() {
        let vars: HashMap<&str, &str> = [
            ("AGG_SOURCE_TIMEOUT_SECS", "5"),
            ("AGG_RUN_DEADLINE_SECS", "soon"),
            ("AGG_PARALLEL", "true"),
        ]
        .into_iter()
        .collect();
        let s = AggregatorSettings::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(s.per_source_timeout, Duration::from_secs(5));
        assert_eq!(s.run_deadline, Duration::from_secs(300));
        assert_eq!(s.mode, ExecutionMode::Parallel);
    }

    #[test]
    fn toml_starting_with_table_header_is_not_json() {
        let doc = "[[sources]]\nname = \"t\"\nkind = \"rss\"\nurl = \"https://t\"\n";
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("sources.toml");
        fs::write(&p, doc).unwrap();
        assert_eq!(load_sources_from(&p).unwrap()[0].name, "t");

        // no extension: JSON is tried first, then TOML
        let bare = tmp.path().join("sources");
        fs::write(&bare, doc).unwrap();
        assert_eq!(load_sources_from(&bare).unwrap()[0].name, "t");
        assert!(parse_sources("[not valid", "").is_err());
    }

    #[serial_test::serial]
    #[test]
    fn default_uses_env_then_fallbacks() {
        // isolate CWD so a real config/ in the repo does not interfere
        let old = env::current_dir().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        env::set_current_dir(tmp.path()).unwrap();

        env::remove_var(ENV_SOURCES_PATH);

        // no files in the temp CWD -> empty
        let v = load_sources_default().unwrap();
        assert!(v.is_empty());

        // config/sources.toml fallback
        fs::create_dir_all(tmp.path().join("config")).unwrap();
        fs::write(
            tmp.path().join("config/sources.toml"),
            "[[sources]]\nname = \"t\"\nkind = \"rss\"\nurl = \"https://t\"\n",
        )
        .unwrap();
        assert_eq!(load_sources_default().unwrap()[0].name, "t");

        // env wins
        let p_json = tmp.path().join("sources.json");
        fs::write(&p_json, r#"[{"name":"X","kind":"rss","url":"https://x"}]"#).unwrap();
        env::set_var(ENV_SOURCES_PATH, p_json.display().to_string());
        let v2 = load_sources_default().unwrap();
        assert_eq!(v2[0].name, "X");

        env::set_var(ENV_SOURCES_PATH, tmp.path().join("missing.toml"));
        assert!(load_sources_default().is_err());
        env::remove_var(ENV_SOURCES_PATH);

        env::set_current_dir(&old).unwrap();
    }

    #[tokio::test]
    async fn builds_fixture_adapters() {
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("jobs.json");
        fs::write(&p, r#"{"jobs":[{"id":"1","title":"Rust Dev"}]}"#).unwrap();
        let specs = vec![SourceSpec {
            name: "local".into(),
            kind: SourceKind::JsonApi,
            url: None,
            fixture: Some(p),
            enabled: true,
            items_pointer: Some("/jobs".into()),
            fields: FieldMap::default(),
        }];
        let adapters = build_adapters(&specs).unwrap();
        assert_eq!(adapters[0].name(), "local");
        let recs = adapters[0].fetch().await.unwrap();
        assert_eq!(recs[0].id(), "local:1");
    }
}
