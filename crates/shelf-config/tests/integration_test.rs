//! Integration tests for shelf-config
//!
//! These tests verify the full config loading pipeline with real file system operations.

use std::path::PathBuf;

use shelf_config::logging::LogLevel;
use shelf_config::testing::TestEnvironment;
use shelf_config::{Config, SwapStrategy};

/// Test config loading from real global config file
#[test]
fn test_load_global_config_from_file() {
    let env = TestEnvironment::new().unwrap();
    env.write_global_config(
        r#"
[store]
root = "/custom/store"
size_mb = 64
force_new = true

[recovery]
sweep_on_open = false
swap_strategy = "journaled"

[log]
level = "debug"
"#,
    )
    .unwrap();

    let config = env.load_config().unwrap();
    assert_eq!(config.store.root, PathBuf::from("/custom/store"));
    assert_eq!(config.store.size_mb, 64);
    assert!(config.store.force_new);
    assert!(!config.recovery.sweep_on_open);
    assert_eq!(config.recovery.swap_strategy, SwapStrategy::Journaled);
    assert_eq!(config.log.level, LogLevel::Debug);
}

/// Test config hierarchy: project config overrides global key by key
#[test]
fn test_config_hierarchy_project_overrides_global() {
    let env = TestEnvironment::new().unwrap();
    env.write_global_config(
        r#"
[store]
root = "/global/store"
size_mb = 16

[recovery]
swap_strategy = "journaled"
"#,
    )
    .unwrap();
    env.write_project_config(
        r#"
[store]
size_mb = 256
"#,
    )
    .unwrap();

    let config = env.load_config().unwrap();
    // Overridden by the project
    assert_eq!(config.store.size_mb, 256);
    // Inherited from global
    assert_eq!(config.store.root, PathBuf::from("/global/store"));
    assert_eq!(config.recovery.swap_strategy, SwapStrategy::Journaled);
    // Defaults fill the rest
    assert!(config.recovery.sweep_on_open);
}

#[test]
fn test_missing_files_give_defaults() {
    let env = TestEnvironment::new().unwrap();
    let config = Config::load_from(
        Some(env.home_dir.join("nope.toml").as_path()),
        None,
    )
    .unwrap();
    assert_eq!(config, Config::default());
}

#[test]
fn test_invalid_toml_is_an_error() {
    let env = TestEnvironment::new().unwrap();
    env.write_project_config("[store\nsize_mb = ").unwrap();
    assert!(env.load_config().is_err());
}

#[test]
fn test_unknown_swap_strategy_is_an_error() {
    let env = TestEnvironment::new().unwrap();
    env.write_project_config("[recovery]\nswap_strategy = \"teleport\"\n")
        .unwrap();
    assert!(env.load_config().is_err());
}

/// Env overrides beat every file
#[test]
fn test_config_env_override_integration() {
    let env = TestEnvironment::new().unwrap();
    env.write_project_config("[store]\nroot = \"/from/file\"\nsize_mb = 2\n")
        .unwrap();

    let mut config = env.load_config().unwrap();
    config.apply_env_overrides(|key| match key {
        "SHELF_ROOT" => Some("/override/path".to_string()),
        "SHELF_SIZE_MB" => Some("16".to_string()),
        _ => None,
    });

    assert_eq!(config.store.root, PathBuf::from("/override/path"));
    assert_eq!(config.store.size_mb, 16);
    assert!(!config.store.force_new);
}

/// Test complete config serialization/deserialization cycle
#[test]
fn test_default_toml_loads_back() {
    let env = TestEnvironment::new().unwrap();
    env.write_project_config(&Config::default_toml().unwrap())
        .unwrap();

    let loaded = Config::load_from(None, Some(env.project_config_path().as_path())).unwrap();
    assert_eq!(loaded, Config::default());
}

/// Test partial config with defaults filling in
#[test]
fn test_partial_config_defaults_applied() {
    let config: Config = toml::from_str("[log]\nlevel = \"warn\"\n").unwrap();

    assert_eq!(config.log.level, LogLevel::Warn);
    assert_eq!(config.store.size_mb, 32);
    assert!(config.recovery.sweep_on_open);
}
