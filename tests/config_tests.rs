//! Integration tests for layered configuration.
//!
//! Defaults < TOML file < DUPESIFT_* environment < CLI flags.

use std::fs;
use std::sync::Mutex;

use clap::Parser;
use dupesift::cli::Cli;
use dupesift::config::{Config, ConfigError};
use dupesift::duplicates::{ImageMatchStrategy, NameMetric};
use tempfile::tempdir;

static ENV_MUTEX: Mutex<()> = Mutex::new(());

/// Clear all DUPESIFT_* environment variables to avoid interference.
fn clear_env() {
    for (key, _) in std::env::vars() {
        if key.starts_with("DUPESIFT_") {
            std::env::remove_var(key);
        }
    }
}

#[test]
fn test_load_defaults_without_file() {
    let _lock = ENV_MUTEX.lock().unwrap();
    clear_env();

    let config = Config::load(None).unwrap();
    assert_eq!(config, Config::default());
}

#[test]
fn test_toml_overrides_defaults() {
    let _lock = ENV_MUTEX.lock().unwrap();
    clear_env();
    let dir = tempdir().unwrap();
    let path = dir.path().join("dupesift.toml");
    fs::write(
        &path,
        r#"
block_size = 4096
name_metric = "levenshtein"
hamming_threshold = 5
image_matching = "bk-tree"
"#,
    )
    .unwrap();

    let config = Config::load(Some(&path)).unwrap();
    assert_eq!(config.block_size, 4096);
    assert_eq!(config.name_metric, NameMetric::Levenshtein);
    assert_eq!(config.hamming_threshold, 5);
    assert_eq!(config.image_matching, ImageMatchStrategy::BkTree);
    // untouched keys keep their defaults
    assert_eq!(config.grid_size, 8);
    assert_eq!(config.name_threshold, 0.70);
}

#[test]
fn test_env_overrides_toml() {
    let _lock = ENV_MUTEX.lock().unwrap();
    clear_env();
    let dir = tempdir().unwrap();
    let path = dir.path().join("dupesift.toml");
    fs::write(&path, "hamming_threshold = 5\nworkers = 3\n").unwrap();

    std::env::set_var("DUPESIFT_HAMMING_THRESHOLD", "6");
    std::env::set_var("DUPESIFT_NAME_THRESHOLD", "0.85");
    let config = Config::load(Some(&path));
    clear_env();

    let config = config.unwrap();
    assert_eq!(config.hamming_threshold, 6);
    assert_eq!(config.name_threshold, 0.85);
    assert_eq!(config.workers, 3);
}

#[test]
fn test_cli_flags_override_env() {
    let _lock = ENV_MUTEX.lock().unwrap();
    clear_env();

    std::env::set_var("DUPESIFT_GRID_SIZE", "12");
    let loaded = Config::load(None);
    clear_env();
    let mut config = loaded.unwrap();
    assert_eq!(config.grid_size, 12);

    let cli = Cli::try_parse_from(["dupesift", "--grid-size", "6", "a.png"]).unwrap();
    cli.apply_overrides(&mut config);
    assert_eq!(config.grid_size, 6);
    assert!(config.validate().is_ok());
}

#[test]
fn test_invalid_values_rejected() {
    let _lock = ENV_MUTEX.lock().unwrap();
    clear_env();
    let dir = tempdir().unwrap();
    let path = dir.path().join("dupesift.toml");

    fs::write(&path, "grid_size = 32\n").unwrap();
    assert!(matches!(
        Config::load(Some(&path)),
        Err(ConfigError::InvalidValue {
            field: "grid_size",
            ..
        })
    ));

    fs::write(&path, "name_metric = \"soundex\"\n").unwrap();
    assert!(matches!(Config::load(Some(&path)), Err(ConfigError::Load(_))));

    fs::write(&path, "block_size = \"large\"\n").unwrap();
    assert!(Config::load(Some(&path)).is_err());
}

#[test]
fn test_missing_config_file() {
    let _lock = ENV_MUTEX.lock().unwrap();
    clear_env();
    let dir = tempdir().unwrap();
    let err = Config::load(Some(&dir.path().join("absent.toml"))).unwrap_err();
    assert!(matches!(err, ConfigError::MissingFile(_)));
    assert!(err.to_string().contains("absent.toml"));
}

#[test]
fn test_rendered_toml_loads_back() {
    let _lock = ENV_MUTEX.lock().unwrap();
    clear_env();
    let dir = tempdir().unwrap();
    let path = dir.path().join("roundtrip.toml");

    let original = Config {
        hamming_threshold: 4,
        image_matching: ImageMatchStrategy::BkTree,
        name_metric: NameMetric::JaroWinkler,
        ..Config::default()
    };
    fs::write(&path, original.to_toml().unwrap()).unwrap();

    assert_eq!(Config::load(Some(&path)).unwrap(), original);
}

#[test]
fn test_detector_config_carries_values() {
    let config = Config {
        block_size: 1024,
        workers: 2,
        pass_timeout_secs: 7,
        ..Config::default()
    };
    let detector = config.to_detector_config();
    assert_eq!(detector.block_size, 1024);
    assert_eq!(detector.workers, 2);
    assert_eq!(detector.pass_timeout, std::time::Duration::from_secs(7));
}
