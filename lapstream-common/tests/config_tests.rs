//! Unit tests for config file discovery and graceful degradation
//!
//! Tests cover:
//! - Missing config files do not cause failure (defaults apply)
//! - Priority order: CLI argument > environment variable > platform locations
//! - Malformed files are reported instead of silently ignored
//!
//! Note: Uses serial_test crate to prevent ENV variable race conditions.
//! Tests that manipulate LAPSTREAM_TEST_CONFIG are marked with #[serial].

use lapstream_common::config::{load_or_default, load_toml, resolve_config_path};
use lapstream_common::Error;
use serde::Deserialize;
use serial_test::serial;
use std::env;
use std::io::Write;
use std::path::PathBuf;

const TEST_ENV_VAR: &str = "LAPSTREAM_TEST_CONFIG";

#[derive(Debug, Deserialize, Default, PartialEq)]
#[serde(default)]
struct SampleConfig {
    base_url: String,
    cache_capacity: usize,
}

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(contents.as_bytes()).expect("Failed to write config");
    file
}

#[test]
#[serial]
fn test_env_var_used_when_no_cli_argument() {
    let file = write_config("base_url = \"http://env.example\"\n");
    env::set_var(TEST_ENV_VAR, file.path());

    let resolved = resolve_config_path(None, TEST_ENV_VAR);
    assert_eq!(resolved, Some(file.path().to_path_buf()));

    env::remove_var(TEST_ENV_VAR);
}

#[test]
#[serial]
fn test_cli_argument_overrides_env_var() {
    let env_file = write_config("base_url = \"http://env.example\"\n");
    let cli_file = write_config("base_url = \"http://cli.example\"\ncache_capacity = 4\n");
    env::set_var(TEST_ENV_VAR, env_file.path());

    let (config, path): (SampleConfig, Option<PathBuf>) =
        load_or_default(Some(cli_file.path()), TEST_ENV_VAR).expect("config should load");

    assert_eq!(path, Some(cli_file.path().to_path_buf()));
    assert_eq!(config.base_url, "http://cli.example");
    assert_eq!(config.cache_capacity, 4);

    env::remove_var(TEST_ENV_VAR);
}

#[test]
#[serial]
fn test_missing_explicit_file_falls_back_to_defaults() {
    env::remove_var(TEST_ENV_VAR);
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let missing = dir.path().join("does-not-exist.toml");

    let (config, path): (SampleConfig, Option<PathBuf>) =
        load_or_default(Some(&missing), TEST_ENV_VAR).expect("missing file is not an error");

    assert_eq!(config, SampleConfig::default());
    assert!(path.is_none());
}

#[test]
fn test_malformed_file_is_reported() {
    let file = write_config("cache_capacity = \"not a number\"\n");

    let result: lapstream_common::Result<SampleConfig> = load_toml(file.path());
    match result {
        Err(Error::Config(msg)) => assert!(msg.contains("Invalid config file")),
        other => panic!("Expected Config error, got {:?}", other),
    }
}
