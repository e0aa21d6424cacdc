use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quick_xml::de::from_str;
use serde::Deserialize;
use time::{format_description::well_known::Rfc2822, OffsetDateTime};

use crate::ingest::types::{Record, SourceAdapter};
use crate::ingest::{normalize_text, MAX_DESCRIPTION_CHARS, MAX_FIELD_CHARS, MAX_TITLE_CHARS};

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    guid: Option<Guid>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
    company: Option<String>,
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Guid {
    #[serde(rename = "$text", default)]
    value: String,
}

fn parse_rfc2822(ts: &str) -> Option<DateTime<Utc>> {
    let dt = OffsetDateTime::parse(ts.trim(), &Rfc2822).ok()?;
    DateTime::<Utc>::from_timestamp(dt.unix_timestamp(), dt.nanosecond())
}

/// "Senior Rust Engineer at Acme" -> ("Senior Rust Engineer", Some("Acme")).
fn split_title_company(raw: &str) -> (&str, Option<&str>) {
    match raw.rsplit_once(" at ") {
        Some((title, company)) if !title.trim().is_empty() && !company.trim().is_empty() => {
            (title.trim(), Some(company.trim()))
        }
        _ => (raw.trim(), None),
    }
}

/// Job board RSS feed. Items become records keyed by `guid` (or `link`).
pub struct RssFeedAdapter {
    name: String,
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http { url: String, client: reqwest::Client },
}

impl RssFeedAdapter {
    /// Serve a fixed XML document (tests, offline runs).
    pub fn from_fixture(name: impl Into<String>, xml: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mode: Mode::Fixture(xml.into()),
        }
    }

    pub fn from_url_with_client(
        name: impl Into<String>,
        url: impl Into<String>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            name: name.into(),
            mode: Mode::Http {
                url: url.into(),
                client,
            },
        }
    }

    pub fn parse_items(&self, s: &str) -> Result<Vec<Record>> {
        let t0 = std::time::Instant::now();
        let xml_clean = scrub_html_entities_for_xml(s);
        let rss: Rss = from_str(&xml_clean)
            .with_context(|| format!("parsing rss xml for {}", self.name))?;

        let mut out = Vec::with_capacity(rss.channel.item.len());
        for it in rss.channel.item {
            let raw_title = normalize_text(it.title.as_deref().unwrap_or_default(), MAX_TITLE_CHARS);
            let (title, title_company) = split_title_company(&raw_title);
            if title.is_empty() {
                continue;
            }
            let key = it
                .guid
                .map(|g| g.value.trim().to_string())
                .filter(|g| !g.is_empty())
                .or_else(|| it.link.clone())
                .unwrap_or_default();

            let company = it
                .company
                .as_deref()
                .map(|c| normalize_text(c, MAX_FIELD_CHARS))
                .filter(|c| !c.is_empty())
                .or_else(|| title_company.map(str::to_string))
                .unwrap_or_default();

            let mut r = Record::new(self.name.as_str(), &key, title)
                .with_company(company)
                .with_location(normalize_text(
                    it.location.as_deref().unwrap_or_default(),
                    MAX_FIELD_CHARS,
                ))
                .with_description(normalize_text(
                    it.description.as_deref().unwrap_or_default(),
                    MAX_DESCRIPTION_CHARS,
                ))
                .with_url(it.link.unwrap_or_default().trim());
            r.posted_at = it.pub_date.as_deref().and_then(parse_rfc2822);
            out.push(r);
        }

        tracing::debug!(
            target: "ingest",
            source = %self.name,
            items = out.len(),
            parse_ms = t0.elapsed().as_millis() as u64,
            "rss parsed"
        );
        Ok(out)
    }
}

#[async_trait]
impl SourceAdapter for RssFeedAdapter {
    async fn fetch(&self) -> Result<Vec<Record>> {
        match &self.mode {
            Mode::Fixture(s) => self.parse_items(s),
            Mode::Http { url, client } => {
                let body = client
                    .get(url.as_str())
                    .send()
                    .await
                    .with_context(|| format!("{} http get()", self.name))?
                    .error_for_status()
                    .with_context(|| format!("{} http status", self.name))?
                    .text()
                    .await
                    .with_context(|| format!("{} http .text()", self.name))?;
                self.parse_items(&body)
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// HTML entities that are not valid XML; quick-xml rejects them.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
        .replace("&hellip;", "...")
}
