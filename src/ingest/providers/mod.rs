// src/ingest/providers/mod.rs
pub mod json_api;
pub mod rss;

pub use json_api::{FieldMap, JsonApiAdapter};
pub use rss::RssFeedAdapter;
