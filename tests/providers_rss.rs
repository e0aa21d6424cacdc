// tests/providers_rss.rs
use job_stream_aggregator::analyze::Enricher;
use job_stream_aggregator::ingest::providers::RssFeedAdapter;
use job_stream_aggregator::SourceAdapter;

const FEED: &str = include_str!("fixtures/jobs_rss.xml");

#[tokio::test]
async fn rss_fixture_maps_items_to_records() {
    let adapter = RssFeedAdapter::from_fixture("examplejobs", FEED);
    assert_eq!(adapter.name(), "examplejobs");

    let recs = adapter.fetch().await.expect("fixture parses");
    assert_eq!(recs.len(), 3);

    let rust = &recs[0];
    assert_eq!(rust.id(), "examplejobs:101");
    assert_eq!(rust.title, "Senior Rust Engineer");
    assert_eq!(rust.company, "Ferrous Labs");
    assert_eq!(rust.location, "Remote (EU)");
    assert!(rust.description.starts_with("Build async services with Rust and Tokio."));
    assert!(!rust.description.contains('<'));
    assert_eq!(rust.url, "https://jobs.example/p/101");
    assert!(rust.posted_at.is_some());
    assert!(rust.is_remote());

    // nbsp / ndash scrubbed before XML parsing
    assert_eq!(recs[1].description, "Work on Go microservices - on-site.");

    // no guid: id falls back to the link; explicit <company> wins
    let scam = &recs[2];
    assert_eq!(scam.id(), "examplejobs:https://jobs.example/p/103");
    assert_eq!(scam.company, "QuickCash Ltd");
}

#[tokio::test]
async fn enrichment_flags_scam_and_extracts_email() {
    let recs = RssFeedAdapter::from_fixture("examplejobs", FEED)
        .fetch()
        .await
        .unwrap();
    let enricher = Enricher::default();

    let mut rust = recs[0].clone();
    enricher.enrich(&mut rust);
    assert_eq!(rust.contact_email.as_deref(), Some("hiring@ferrous.example"));
    assert!(!rust.has_flags);

    let mut scam = recs[2].clone();
    enricher.enrich(&mut scam);
    assert!(scam.has_flags);
    assert!(scam.flags.iter().any(|f| f == "upfront-fee"));
    assert!(scam.flags.iter().any(|f| f == "chat-interview"));
}

#[tokio::test]
async fn malformed_feed_is_an_error() {
    let adapter = RssFeedAdapter::from_fixture("broken", "not a feed");
    let err = adapter.fetch().await.unwrap_err();
    assert!(format!("{err:#}").contains("broken"));
}
