use clap::Parser;
use dupetree::cli::{Cli, Commands};
use dupetree::config::{Config, ConfigError};
use dupetree::scanner::{CryptoDigest, FastChecksum};
use std::fs;
use tempfile::tempdir;

use crate::ENV_MUTEX;

/// Clear all DUPETREE_* environment variables to avoid interference.
fn clear_env() {
    for (key, _) in std::env::vars() {
        if key.starts_with("DUPETREE_") {
            std::env::remove_var(key);
        }
    }
}

#[test]
fn test_file_layer_overrides_defaults() {
    let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();
    let dir = tempdir().unwrap();
    let path = dir.path().join("dupetree.toml");
    fs::write(
        &path,
        r#"
io_threads = 8
follow_symlinks = true
fast_checksum = "xxh32"
ignored_names = ["Thumbs.db"]
"#,
    )
    .unwrap();

    let config = Config::load(Some(path.as_path())).unwrap();
    assert_eq!(config.io_threads, 8);
    assert!(config.follow_symlinks);
    assert_eq!(config.ignored_names, vec!["Thumbs.db"]);
    assert_eq!(config.validate().unwrap().0, FastChecksum::Xxh32);
}

#[test]
fn test_env_overrides_file() {
    let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();
    let dir = tempdir().unwrap();
    let path = dir.path().join("dupetree.toml");
    fs::write(&path, "io_threads = 8\ndigest = \"sha256\"\n").unwrap();

    std::env::set_var("DUPETREE_IO_THREADS", "2");
    std::env::set_var("DUPETREE_DIGEST", "sha512");
    let config = Config::load(Some(path.as_path()));
    clear_env();

    let config = config.unwrap();
    assert_eq!(config.io_threads, 2);
    assert_eq!(config.validate().unwrap().1, CryptoDigest::Sha512);
}

#[test]
fn test_cli_overrides_env() {
    let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();
    std::env::set_var("DUPETREE_IO_THREADS", "2");
    let config = Config::load(None);
    clear_env();
    let mut config = config.unwrap();

    let cli = Cli::try_parse_from([
        "dupetree",
        "scan",
        "/data",
        "--io-threads",
        "6",
        "--allow-readonly",
        "--ignore",
        "*.bak",
    ])
    .unwrap();
    let Commands::Scan(args) = cli.command;
    config.apply_scan_args(&args);

    assert_eq!(config.io_threads, 6);
    assert!(!config.require_writable);
    assert!(config.ignore_patterns.contains(&"*.bak".to_string()));
}

#[test]
fn test_missing_explicit_file_uses_defaults() {
    let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();
    let dir = tempdir().unwrap();
    let config = Config::load(Some(dir.path().join("absent.toml").as_path())).unwrap();
    assert_eq!(config.io_threads, Config::default().io_threads);
}

#[test]
fn test_unknown_algorithm_is_fatal() {
    let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();
    let dir = tempdir().unwrap();
    let path = dir.path().join("dupetree.toml");
    fs::write(&path, "fast_checksum = \"crc32\"\n").unwrap();

    let config = Config::load_from_path(&path).unwrap();
    let err = config.finder_config().unwrap_err();
    assert!(matches!(err, ConfigError::UnsupportedAlgorithm { .. }));
    assert!(err.to_string().contains("crc32"));
}

#[test]
fn test_malformed_file_is_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("dupetree.toml");
    fs::write(&path, "io_threads = [").unwrap();
    assert!(matches!(Config::load_from_path(&path), Err(ConfigError::Load(_))));
}
