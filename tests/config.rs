use codebase_mirror::error::PipelineError;
use codebase_mirror::PipelineConfig;
use std::path::{Path, PathBuf};

#[test]
fn defaults_are_valid() {
    let config = PipelineConfig::default();
    assert!(config.validate().is_ok());
    assert!(config.workers > 0);
    assert_eq!(config.max_file_size, 2 * 1024 * 1024);
    assert_eq!(config.file_timeout_secs, 30);
    assert!(config.use_cache);
    assert!(config.ignore_dirs.contains(&"node_modules".to_string()));
    assert_eq!(
        config.cache_dir_for(Path::new("out")),
        PathBuf::from("out/.cache")
    );
}

#[test]
fn toml_uses_camel_case_keys_and_fills_defaults() {
    let config = PipelineConfig::from_toml_str(
        r#"
workers = 3
maxFileSize = 1024
cacheDir = "/tmp/mirror-cache"
ignoreDirs = ["dist"]
"#,
    )
    .unwrap();

    assert_eq!(config.workers, 3);
    assert_eq!(config.max_file_size, 1024);
    assert_eq!(config.ignore_dirs, vec!["dist"]);
    assert_eq!(config.sniff_bytes, PipelineConfig::default().sniff_bytes);
    assert_eq!(
        config.cache_dir_for(Path::new("out")),
        PathBuf::from("/tmp/mirror-cache")
    );
}

#[test]
fn unknown_keys_are_rejected() {
    let err = PipelineConfig::from_toml_str("wokers = 3\n").unwrap_err();
    match err {
        PipelineError::Config(message) => assert!(message.contains("TOML parse error")),
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn non_positive_limits_are_rejected() {
    for toml in ["workers = 0", "fileTimeoutSecs = 0", "cacheCapacity = 0"] {
        assert!(
            matches!(PipelineConfig::from_toml_str(toml), Err(PipelineError::Config(_))),
            "{toml}"
        );
    }
}

#[test]
fn ignore_dirs_must_be_names() {
    let err = PipelineConfig::from_toml_str("ignoreDirs = [\"src/vendor\"]").unwrap_err();
    assert!(err.to_string().contains("ignoreDirs"));
}

#[test]
fn load_reads_a_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mirror.toml");
    std::fs::write(&path, "useCache = false\nfollowLinks = true\n").unwrap();

    let config = PipelineConfig::load(&path).unwrap();
    assert!(!config.use_cache);
    assert!(config.follow_links);

    assert!(PipelineConfig::load(&dir.path().join("missing.toml")).is_err());
}
