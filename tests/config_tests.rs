//! Unit tests for configuration loading and validation.

mod common;

use common::*;
use wpokt_validator::config::Config;

/// Writes the given YAML to a scratch file and returns its path.
fn write_config(name: &str, yaml: &str) -> String {
    let path = std::env::temp_dir().join(format!("wpokt-validator-{}-{}.yaml", std::process::id(), name));
    std::fs::write(&path, yaml).expect("write config");
    path.to_string_lossy().into_owned()
}

fn valid_yaml() -> String {
    let config = build_test_config("http://localhost:8081", "http://localhost:8545");
    serde_yaml::to_string(&config).expect("serialize config")
}

/// Test that a complete YAML file loads and validates.
#[test]
fn test_load_valid_config() {
    let path = write_config("valid", &valid_yaml());
    let config = Config::load(Some(path.as_str()), None).expect("config should load");
    assert_eq!(config.pocket.chain_id, "0001");
    assert_eq!(config.ethereum.chain_id, "1");
    assert_eq!(config.pocket.multisig_threshold, 2);
    std::fs::remove_file(path).ok();
}

/// Test that a missing config file is a startup error.
#[test]
fn test_load_missing_file() {
    assert!(Config::load(Some("/nonexistent/validator.yaml"), None).is_err());
}

/// Test that required fields are enforced.
#[test]
fn test_validate_missing_fields() {
    let mut config = build_test_config("http://localhost:8081", "http://localhost:8545");
    config.mongodb.uri.clear();
    assert!(config.validate().is_err());

    let mut config = build_test_config("http://localhost:8081", "http://localhost:8545");
    config.pocket.vault_address.clear();
    assert!(config.validate().is_err());

    let mut config = build_test_config("http://localhost:8081", "http://localhost:8545");
    config.ethereum.validator_addresses.clear();
    assert!(config.validate().is_err());
}

/// Test that the threshold must stay within the multisig set.
#[test]
fn test_validate_threshold_bounds() {
    let mut config = build_test_config("http://localhost:8081", "http://localhost:8545");
    config.pocket.multisig_threshold = 0;
    assert!(config.validate().is_err());

    config.pocket.multisig_threshold = config.pocket.multisig_public_keys.len() + 1;
    assert!(config.validate().is_err());

    config.pocket.multisig_threshold = config.pocket.multisig_public_keys.len();
    assert!(config.validate().is_ok());
}

/// Test that environment variables override file values and that an env
/// file fills in unset variables.
#[test]
fn test_env_overrides() {
    let path = write_config("env", &valid_yaml());
    let env_path = std::env::temp_dir().join(format!("wpokt-validator-{}.env", std::process::id()));
    std::fs::write(&env_path, "MONGODB_DATABASE=from-env-file\n# comment\n").expect("write env");

    std::env::set_var("MONGODB_URI", "mongodb://overridden:27017");
    let env_path_str = env_path.to_string_lossy().into_owned();
    let config = Config::load(Some(path.as_str()), Some(env_path_str.as_str())).expect("load");
    std::env::remove_var("MONGODB_URI");
    std::env::remove_var("MONGODB_DATABASE");

    assert_eq!(config.mongodb.uri, "mongodb://overridden:27017");
    assert_eq!(config.mongodb.database, "from-env-file");

    std::fs::remove_file(path).ok();
    std::fs::remove_file(env_path).ok();
}
