use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ingest::types::{Record, SourceAdapter};

/// Where each record field lives inside one JSON item.
///
/// A value starting with `/` is a JSON pointer (`/company/name`), anything
/// else a top-level key. An empty string disables the field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldMap {
    pub id: String,
    pub title: String,
    pub company: String,
    pub location: String,
    pub description: String,
    pub url: String,
    pub posted_at: String,
    pub salary: String,
    pub employment_type: String,
    pub contact_email: String,
}

impl Default for FieldMap {
    fn default() -> Self {
        Self {
            id: "id".into(),
            title: "title".into(),
            company: "company".into(),
            location: "location".into(),
            description: "description".into(),
            url: "url".into(),
            posted_at: "posted_at".into(),
            salary: "salary".into(),
            employment_type: "employment_type".into(),
            contact_email: "contact_email".into(),
        }
    }
}

fn lookup<'a>(item: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        None
    } else if path.starts_with('/') {
        item.pointer(path)
    } else {
        item.get(path)
    }
}

fn as_text(v: &Value) -> Option<String> {
    let s = match v {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!s.is_empty()).then_some(s)
}

/// RFC 3339 string, or unix seconds as number or numeric string.
fn as_timestamp(v: &Value) -> Option<DateTime<Utc>> {
    match v {
        Value::Number(n) => n.as_i64().and_then(|s| DateTime::<Utc>::from_timestamp(s, 0)),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            s.parse::<i64>()
                .ok()
                .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        }
        _ => None,
    }
}

/// JSON job API: one array of items, each mapped to a record via `FieldMap`.
pub struct JsonApiAdapter {
    name: String,
    items_pointer: Option<String>,
    fields: FieldMap,
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http { url: String, client: reqwest::Client },
}

impl JsonApiAdapter {
    pub fn from_fixture(name: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            items_pointer: None,
            fields: FieldMap::default(),
            mode: Mode::Fixture(body.into()),
        }
    }

    pub fn from_url_with_client(
        name: impl Into<String>,
        url: impl Into<String>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            name: name.into(),
            items_pointer: None,
            fields: FieldMap::default(),
            mode: Mode::Http {
                url: url.into(),
                client,
            },
        }
    }

    /// JSON pointer to the item array (e.g. `/data/jobs`). Root array by default.
    pub fn with_items_pointer(mut self, pointer: impl Into<String>) -> Self {
        let p = pointer.into();
        self.items_pointer = (!p.trim().is_empty()).then_some(p);
        self
    }

    pub fn with_fields(mut self, fields: FieldMap) -> Self {
        self.fields = fields;
        self
    }

    pub fn parse_items(&self, body: &str) -> Result<Vec<Record>> {
        let root: Value = serde_json::from_str(body)
            .with_context(|| format!("parsing json body for {}", self.name))?;
        let items = match &self.items_pointer {
            Some(p) => root
                .pointer(p)
                .ok_or_else(|| anyhow!("{}: pointer {p} not found", self.name))?,
            None => &root,
        };
        let items = items
            .as_array()
            .ok_or_else(|| anyhow!("{}: items are not a json array", self.name))?;

        let f = &self.fields;
        let text = |item: &Value, path: &str| lookup(item, path).and_then(as_text);
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            let Some(title) = text(item, &f.title) else {
                continue;
            };
            let key = text(item, &f.id)
                .or_else(|| text(item, &f.url))
                .unwrap_or_default();
            let mut r = Record::new(self.name.as_str(), &key, title)
                .with_company(text(item, &f.company).unwrap_or_default())
                .with_location(text(item, &f.location).unwrap_or_default())
                .with_description(text(item, &f.description).unwrap_or_default())
                .with_url(text(item, &f.url).unwrap_or_default());
            r.posted_at = lookup(item, &f.posted_at).and_then(as_timestamp);
            r.salary = text(item, &f.salary);
            r.employment_type = text(item, &f.employment_type);
            r.contact_email = text(item, &f.contact_email);
            out.push(r);
        }
        tracing::debug!(target: "ingest", source = %self.name, items = out.len(), "json parsed");
        Ok(out)
    }
}

#[async_trait]
impl SourceAdapter for JsonApiAdapter {
    async fn fetch(&self) -> Result<Vec<Record>> {
        match &self.mode {
            Mode::Fixture(s) => self.parse_items(s),
            Mode::Http { url, client } => {
                let body = client
                    .get(url.as_str())
                    .header(reqwest::header::ACCEPT, "application/json")
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
