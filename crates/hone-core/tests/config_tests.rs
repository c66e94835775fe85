//! File-based config loading and manifest serialization tests for hone-core.

use hone_core::Error;
use hone_core::cache::{CacheEntry, CacheManifest};
use hone_core::config::{Engine, HoneConfig};
use std::path::PathBuf;

#[test]
fn test_load_config_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Honefile.yaml");
    std::fs::write(
        &path,
        r#"
engine: local
jobs:
  - name: lint
    shell: cargo clippy
  - name: test
    deps: [lint]
    shell: cargo test
    inputs: [Cargo.lock]
"#,
    )
    .unwrap();

    let config = HoneConfig::load(&path).expect("load");
    assert_eq!(config.default_engine(), Engine::Local);
    assert_eq!(config.jobs[1].deps, vec!["lint"]);
    assert_eq!(config.jobs[1].inputs, vec![PathBuf::from("Cargo.lock")]);
}

#[test]
fn test_load_missing_file() {
    let err = HoneConfig::load(std::path::Path::new("/nonexistent/Honefile.yaml")).unwrap_err();
    assert!(matches!(err, Error::InvalidConfig(_)));
}

#[test]
fn test_malformed_yaml() {
    let err = HoneConfig::parse("jobs: [").unwrap_err();
    assert!(matches!(err, Error::InvalidConfig(_)));
}

#[test]
fn test_manifest_roundtrip() {
    let manifest = CacheManifest::new(
        "build-abc",
        vec![CacheEntry {
            path: PathBuf::from("out/app"),
            fingerprint: "e3b0c442".to_string(),
        }],
    );

    let json = serde_json::to_string(&manifest).expect("serialize");
    let parsed: CacheManifest = serde_json::from_str(&json).expect("deserialize");

    assert_eq!(parsed.key, "build-abc");
    assert_eq!(parsed.entries, manifest.entries);
    assert_eq!(parsed.created_at, manifest.created_at);
}
