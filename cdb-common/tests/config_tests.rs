//! Configuration resolution tests
//!
//! Uses serial_test: these tests set CDB_SYNC_* environment variables and
//! must not run in parallel with each other.

use cdb_common::config::{
    resolve_config_path, BridgeConfig, CONFIG_ENV_VAR, DATABASE_ENV_VAR, SYNC_BACK_ENV_VAR,
};
use serial_test::serial;
use std::env;
use std::path::PathBuf;
use tempfile::TempDir;

fn clear_env() {
    env::remove_var(CONFIG_ENV_VAR);
    env::remove_var(DATABASE_ENV_VAR);
    env::remove_var(SYNC_BACK_ENV_VAR);
}

fn write_config(dir: &TempDir, content: &str) -> PathBuf {
    let path = dir.path().join("config.toml");
    std::fs::write(&path, content).unwrap();
    path
}

#[test]
#[serial]
fn test_cli_path_has_priority_over_env() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let cli = write_config(&dir, "[sync_back]\nenabled = true\n");
    env::set_var(CONFIG_ENV_VAR, "/definitely/not/here.toml");

    let resolved = resolve_config_path(Some(&cli)).unwrap();
    assert_eq!(resolved, Some(cli));

    clear_env();
}

#[test]
#[serial]
fn test_env_path_used_without_cli() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[import]\nsave_max_attempts = 7\n");
    env::set_var(CONFIG_ENV_VAR, &path);

    let config = BridgeConfig::load(None).unwrap();
    assert_eq!(config.import.save_max_attempts, 7);

    clear_env();
}

#[test]
#[serial]
fn test_missing_explicit_file_is_an_error() {
    clear_env();
    let missing = PathBuf::from("/definitely/not/here.toml");
    assert!(BridgeConfig::load(Some(&missing)).is_err());
}

#[test]
#[serial]
fn test_env_overrides_apply_on_top_of_file() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        "database_path = \"/tmp/from-file.db\"\n[sync_back]\nenabled = false\n",
    );
    env::set_var(DATABASE_ENV_VAR, "/tmp/from-env.db");
    env::set_var(SYNC_BACK_ENV_VAR, "true");

    let config = BridgeConfig::load(Some(&path)).unwrap();
    assert_eq!(config.database_path(), PathBuf::from("/tmp/from-env.db"));
    assert!(config.sync_back.enabled);

    clear_env();
}

#[test]
#[serial]
fn test_invalid_sync_back_override_rejected() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "");
    env::set_var(SYNC_BACK_ENV_VAR, "sometimes");

    assert!(BridgeConfig::load(Some(&path)).is_err());

    clear_env();
}

#[test]
#[serial]
fn test_invalid_template_in_file_rejected() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[legacy]\nevent_url_template = \"http://legacy/event\"\n");

    assert!(BridgeConfig::load(Some(&path)).is_err());
}
