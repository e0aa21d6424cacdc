// tests/profile_config.rs
use std::fs::{self, File};
use std::time::{Duration, SystemTime};

use job_stream_aggregator::profile::{
    load_profile_default, load_profile_from, HotReloadProfile, ENV_PROFILE_PATH,
};
use job_stream_aggregator::{compile, Record};

fn write_with_mtime(path: &std::path::Path, body: &str, secs: u64) {
    fs::write(path, body).unwrap();
    let f = File::options().write(true).open(path).unwrap();
    f.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
        .unwrap();
}

#[test]
fn loads_toml_and_json_profiles_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let toml_p = dir.path().join("p.toml");
    fs::write(
        &toml_p,
        "name = \"t\"\nkeywords = [\" rust \", \"Rust\"]\nprefer_remote = true\n",
    )
    .unwrap();
    let p = load_profile_from(&toml_p).unwrap();
    assert_eq!(p.keywords, vec!["rust".to_string()]);
    assert!(p.prefer_remote);

    let json_p = dir.path().join("p.json");
    fs::write(&json_p, r#"{"technologies":["go"],"min_score":30}"#).unwrap();
    let p = load_profile_from(&json_p).unwrap();
    assert_eq!(p.min_score, Some(30));

    let bad = dir.path().join("bad.toml");
    fs::write(&bad, "keywords = 5").unwrap();
    let err = load_profile_from(&bad).unwrap_err();
    assert!(format!("{err:#}").contains("bad.toml"));
}

#[serial_test::serial]
#[test]
fn default_profile_uses_env_then_fallbacks() {
    let old = std::env::current_dir().unwrap();
    let tmp = tempfile::tempdir().unwrap();
    std::env::set_current_dir(tmp.path()).unwrap();
    std::env::remove_var(ENV_PROFILE_PATH);

    // nothing on disk -> unrestricted profile
    assert_eq!(load_profile_default().unwrap().keywords.len(), 0);

    fs::create_dir_all("config").unwrap();
    fs::write("config/profile.json", r#"{"keywords":["json"]}"#).unwrap();
    assert_eq!(load_profile_default().unwrap().keywords, vec!["json".to_string()]);

    fs::write("config/profile.toml", "keywords = [\"toml\"]").unwrap();
    assert_eq!(load_profile_default().unwrap().keywords, vec!["toml".to_string()]);

    let explicit = tmp.path().join("mine.toml");
    fs::write(&explicit, "keywords = [\"env\"]").unwrap();
    std::env::set_var(ENV_PROFILE_PATH, &explicit);
    assert_eq!(load_profile_default().unwrap().keywords, vec!["env".to_string()]);

    std::env::set_var(ENV_PROFILE_PATH, tmp.path().join("missing.toml"));
    assert!(load_profile_default().is_err());
    std::env::remove_var(ENV_PROFILE_PATH);

    std::env::set_current_dir(&old).unwrap();
}

#[test]
fn hot_reload_swaps_snapshot_on_mtime_change() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("profile.toml");
    write_with_mtime(&path, "keywords = [\"rust\"]", 1_000);

    let hot = HotReloadProfile::new(Some(path.as_path()));
    let first = hot.current();
    assert_eq!(first.keywords, vec!["rust".to_string()]);

    // a compiled pipeline keeps its own snapshot
    let compiled = compile(&first);

    write_with_mtime(&path, "keywords = [\"go\"]", 2_000);
    let second = hot.current();
    assert_eq!(second.keywords, vec!["go".to_string()]);
    assert_eq!(first.keywords, vec!["rust".to_string()]);
    assert!(compiled.process(Record::with_id("1", "s", "Rust Dev")).is_some());
    assert!(compiled.process(Record::with_id("2", "s", "Go Dev")).is_none());

    // broken edit keeps the previous snapshot
    write_with_mtime(&path, "keywords = [", 3_000);
    assert_eq!(hot.current().keywords, vec!["go".to_string()]);
}

#[test]
fn missing_file_serves_default_profile() {
    let dir = tempfile::tempdir().unwrap();
    let hot = HotReloadProfile::new(Some(dir.path().join("absent.toml").as_path()));
    assert_eq!(hot.current().keywords.len(), 0);
}

#[test]
fn shipped_example_configs_parse() {
    let root = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("config");

    let p = load_profile_from(&root.join("profile.example.toml")).unwrap();
    assert_eq!(p.name, "rust-remote");
    assert!(p.weights.is_some());

    let sources =
        job_stream_aggregator::ingest::config::load_sources_from(&root.join("sources.example.toml"))
            .unwrap();
    // the disabled offline entry is dropped
    let names: Vec<&str> = sources.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["remote-rss", "board-api"]);
    assert_eq!(sources[1].fields.title, "position");

    let rules =
        job_stream_aggregator::analyze::flags::load_flag_rules_file(&root.join("flags.example.json"))
            .unwrap();
    assert_eq!(rules.rules.len(), 4);
}
