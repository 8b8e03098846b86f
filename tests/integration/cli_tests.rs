use clap::Parser;
use dupetree::cli::Cli;
use dupetree::duplicates::FinderError;
use dupetree::error::ExitCode;
use dupetree::run_app;
use std::fs;
use tempfile::tempdir;

use crate::ENV_MUTEX;

fn run(args: &[&str]) -> anyhow::Result<ExitCode> {
    let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let mut argv = vec!["dupetree", "-q"];
    argv.extend_from_slice(args);
    run_app(Cli::try_parse_from(argv).unwrap())
}

#[test]
fn test_exit_success_when_duplicates_found() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a"), b"same bytes").unwrap();
    fs::write(dir.path().join("b"), b"same bytes").unwrap();
    let root = dir.path().to_str().unwrap();

    assert_eq!(run(&["scan", root, "--no-progress"]).unwrap(), ExitCode::Success);
    assert_eq!(
        run(&["scan", root, "--output", "json", "--stats", "--no-progress"]).unwrap(),
        ExitCode::Success
    );
}

#[test]
fn test_exit_no_duplicates() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a"), b"one").unwrap();
    let root = dir.path().to_str().unwrap();

    assert_eq!(run(&["scan", root]).unwrap(), ExitCode::NoDuplicates);
}

#[test]
fn test_missing_root_is_error() {
    let err = run(&["scan", "/nonexistent/dupetree/root"]).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<FinderError>(),
        Some(FinderError::PathNotFound(_))
    ));
    assert_eq!(ExitCode::for_error(&err), ExitCode::GeneralError);
}

#[test]
fn test_unsupported_digest_is_error() {
    let dir = tempdir().unwrap();
    let root = dir.path().to_str().unwrap();
    let err = run(&["scan", root, "--digest", "md5"]).unwrap_err();
    assert!(format!("{:#}", err).contains("md5"));
}

#[test]
fn test_config_file_flag() {
    let dir = tempdir().unwrap();
    let data = dir.path().join("data");
    fs::create_dir(&data).unwrap();
    fs::write(data.join("a.bak"), b"same").unwrap();
    fs::write(data.join("b.bak"), b"same").unwrap();
    let config = dir.path().join("dupetree.toml");
    fs::write(&config, "ignore_patterns = [\"*.bak\"]\n").unwrap();

    let code = run(&[
        "--config",
        config.to_str().unwrap(),
        "scan",
        data.to_str().unwrap(),
    ])
    .unwrap();
    assert_eq!(code, ExitCode::NoDuplicates);
}
