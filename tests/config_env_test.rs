//! Config environment variable tests
//!
//! These tests verify that Config::from_env() correctly reads and applies
//! environment variable overrides. Config::from_env() also loads from a
//! .env file via dotenvy, so these tests focus on override behavior.
//!
//! Tests use #[serial] to prevent race conditions with shared env vars.

use study_scheduler::config::{Config, LogFormat, DEFAULT_MAX_CYCLE_DAYS};
use study_scheduler::AppError;
use serial_test::serial;
use std::env;

#[test]
#[serial]
fn test_config_from_env_loads_successfully() {
    env::remove_var("MAX_CYCLE_DAYS");

    let result = Config::from_env();
    assert!(result.is_ok(), "Config::from_env() needs no required variables");
    assert_eq!(result.unwrap().scheduling.max_cycle_days, DEFAULT_MAX_CYCLE_DAYS);
}

#[test]
#[serial]
fn test_config_from_env_custom_database() {
    env::set_var("DATABASE_PATH", "/custom/study.db");
    env::set_var("DATABASE_MAX_CONNECTIONS", "10");

    let config = Config::from_env().unwrap();
    assert_eq!(config.database.path.to_str().unwrap(), "/custom/study.db");
    assert_eq!(config.database.max_connections, 10);

    env::remove_var("DATABASE_PATH");
    env::remove_var("DATABASE_MAX_CONNECTIONS");
}

#[test]
#[serial]
fn test_config_from_env_json_log_format() {
    env::set_var("LOG_FORMAT", "JSON");

    let config = Config::from_env().unwrap();
    assert_eq!(config.logging.format, LogFormat::Json);

    env::set_var("LOG_FORMAT", "pretty");
    let config = Config::from_env().unwrap();
    assert_eq!(config.logging.format, LogFormat::Pretty);

    env::remove_var("LOG_FORMAT");
}

#[test]
#[serial]
fn test_config_from_env_log_level() {
    env::set_var("LOG_LEVEL", "debug");

    let config = Config::from_env().unwrap();
    assert_eq!(config.logging.level, "debug");

    env::remove_var("LOG_LEVEL");
}

#[test]
#[serial]
fn test_config_invalid_connection_count_uses_default() {
    env::set_var("DATABASE_MAX_CONNECTIONS", "not-a-number");

    let config = Config::from_env().unwrap();
    assert_eq!(config.database.max_connections, 5);

    env::remove_var("DATABASE_MAX_CONNECTIONS");
}

#[test]
#[serial]
fn test_config_custom_max_cycle_days() {
    env::set_var("MAX_CYCLE_DAYS", "730");

    let config = Config::from_env().unwrap();
    assert_eq!(config.scheduling.max_cycle_days, 730);

    env::remove_var("MAX_CYCLE_DAYS");
}

#[test]
#[serial]
fn test_config_rejects_invalid_max_cycle_days() {
    for bad in ["0", "-5", "a year"] {
        env::set_var("MAX_CYCLE_DAYS", bad);

        let result = Config::from_env();
        assert!(
            matches!(result, Err(AppError::Config { .. })),
            "MAX_CYCLE_DAYS={} should be rejected",
            bad
        );
    }

    env::remove_var("MAX_CYCLE_DAYS");
}
