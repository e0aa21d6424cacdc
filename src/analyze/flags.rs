//! Content-safety scanner: tags postings that look like scams or unsafe offers.
//!
//! Minimal JSON DSL (case- and whitespace-insensitive), `config/flags.json`:
//! ```json
//! { "rules": [
//!     { "tag": "upfront-fee", "any_contains": ["training fee", "pay for equipment"] },
//!     { "tag": "chat-interview", "all_contains": ["interview"], "any_contains": ["telegram", "whatsapp"] }
//! ] }
//! ```
//! A rule matches when every present condition holds. Matching rules add their
//! tag to `Record::flags` (and set `has_flags`). A phrase only matches from the
//! start of a word; phrases of up to four characters (`ssn`, `usdt`) must also
//! end on a word edge.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::{fs, path::Path};

use crate::record::Record;

pub const ENV_FLAGS_PATH: &str = "JOB_FLAGS_PATH";

#[derive(Debug, Clone, Deserialize, Default)]
pub struct FlagRuleSet {
    pub rules: Vec<FlagRule>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FlagRule {
    pub tag: String,
    #[serde(default)]
    pub any_contains: Option<Vec<String>>,
    #[serde(default)]
    pub all_contains: Option<Vec<String>>,
}

impl FlagRuleSet {
    /// Built-in rules used when no config file is present.
    pub fn builtin() -> Self {
        fn any(tag: &str, phrases: &[&str]) -> FlagRule {
            FlagRule {
                tag: tag.to_string(),
                any_contains: Some(phrases.iter().map(|p| p.to_string()).collect()),
                all_contains: None,
            }
        }
        Self {
            rules: vec![
                any(
                    "upfront-fee",
                    &[
                        "training fee",
                        "registration fee",
                        "starter kit",
                        "pay for your equipment",
                        "processing fee",
                    ],
                ),
                any(
                    "wire-transfer",
                    &["wire transfer", "western union", "moneygram", "money order"],
                ),
                any(
                    "crypto-payment",
                    &["paid in crypto", "bitcoin payment", "usdt", "crypto wallet"],
                ),
                FlagRule {
                    tag: "chat-interview".to_string(),
                    any_contains: Some(vec![
                        "telegram".into(),
                        "whatsapp".into(),
                        "signal app".into(),
                        "google hangouts".into(),
                    ]),
                    all_contains: Some(vec!["interview".into()]),
                },
                any(
                    "bank-details",
                    &[
                        "bank account number",
                        "social security number",
                        "ssn",
                        "routing number",
                    ],
                ),
            ],
        }
    }
}

pub fn load_flag_rules_file(path: &Path) -> Result<FlagRuleSet> {
    let bytes =
        fs::read(path).with_context(|| format!("reading flag rules from {}", path.display()))?;
    let rules: FlagRuleSet = serde_json::from_slice(&bytes).context("flag rules json")?;
    Ok(rules)
}

/// `$JOB_FLAGS_PATH`, then `config/flags.json`, then the built-in set.
pub fn load_flag_rules_default() -> Result<FlagRuleSet> {
    if let Ok(p) = std::env::var(ENV_FLAGS_PATH) {
        return load_flag_rules_file(Path::new(&p));
    }
    let p = Path::new("config/flags.json");
    if p.exists() {
        return load_flag_rules_file(p);
    }
    Ok(FlagRuleSet::builtin())
}

/// Rules with phrases pre-normalized once.
#[derive(Debug, Clone)]
pub struct ContentScanner {
    rules: Vec<CompiledRule>,
}

#[derive(Debug, Clone)]
struct CompiledRule {
    tag: String,
    any: Vec<String>,
    all: Vec<String>,
}

impl Default for ContentScanner {
    fn default() -> Self {
        Self::new(&FlagRuleSet::builtin())
    }
}

impl ContentScanner {
    pub fn new(set: &FlagRuleSet) -> Self {
        let prep = |v: &Option<Vec<String>>| -> Vec<String> {
            v.iter()
                .flatten()
                .map(|p| normalize(p))
                .filter(|p| !p.is_empty())
                .collect()
        };
        let rules = set
            .rules
            .iter()
            .filter(|r| !r.tag.trim().is_empty())
            .map(|r| CompiledRule {
                tag: r.tag.trim().to_string(),
                any: prep(&r.any_contains),
                all: prep(&r.all_contains),
            })
            // a rule without conditions would tag everything
            .filter(|r| !(r.any.is_empty() && r.all.is_empty()))
            .collect();
        Self { rules }
    }

    /// Tags the rule set would attach to `text`, in rule order.
    pub fn tags_for(&self, text: &str) -> Vec<&str> {
        let text = normalize(text);
        self.rules
            .iter()
            .filter(|r| {
                (r.any.is_empty() || r.any.iter().any(|p| contains_phrase(&text, p)))
                    && r.all.iter().all(|p| contains_phrase(&text, p))
            })
            .map(|r| r.tag.as_str())
            .collect()
    }

    /// Add matching tags to the record; returns how many rules fired.
    pub fn scan(&self, record: &mut Record) -> usize {
        let haystack = format!("{} {}", record.title, record.description);
        let tags: Vec<String> = self
            .tags_for(&haystack)
            .into_iter()
            .map(str::to_string)
            .collect();
        let n = tags.len();
        for t in tags {
            record.add_flag(t);
        }
        n
    }
}

const SHORT_PHRASE_CHARS: usize = 4;

fn contains_phrase(text: &str, phrase: &str) -> bool {
    let whole_word = phrase.chars().count() <= SHORT_PHRASE_CHARS;
    text.match_indices(phrase).any(|(at, _)| {
        let starts_word = !text[..at]
            .chars()
            .next_back()
            .is_some_and(char::is_alphanumeric);
        let ends_word = !text[at + phrase.len()..]
            .chars()
            .next()
            .is_some_and(char::is_alphanumeric);
        starts_word && (ends_word || !whole_word)
    })
}

/// Lowercase + condensed whitespace.
fn normalize(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut last_space = false;
    for ch in input.chars() {
        let lc = ch.to_ascii_lowercase();
        if lc.is_whitespace() {
            if !last_space {
                out.push(' ');
                last_space = true;
            }
        } else {
            out.push(lc);
            last_space = false;
        }
    }
    out.trim().to_string()
}
