//! # shelf-config
//!
//! Configuration management for the shelf store.
//!
//! Loads configuration from:
//! 1. `~/.shelf/config.toml` (global)
//! 2. `.shelf/config.toml` (project-local, overrides global)
//! 3. Environment variables (highest priority)

pub mod logging;
pub mod testing;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard};
use tracing::debug;

use crate::logging::LogLevel;

/// Default store root before tilde expansion
pub const DEFAULT_STORE_ROOT: &str = "~/.shelf/store";

/// Environment overrides
pub const ENV_ROOT: &str = "SHELF_ROOT";
pub const ENV_SIZE_MB: &str = "SHELF_SIZE_MB";
pub const ENV_FORCE_NEW: &str = "SHELF_FORCE_NEW";

/// Global config instance
static CONFIG: Lazy<RwLock<Config>> = Lazy::new(|| RwLock::new(Config::load().unwrap_or_default()));

/// Get global config (read-only)
pub fn config() -> RwLockReadGuard<'static, Config> {
    CONFIG.read().unwrap_or_else(PoisonError::into_inner)
}

/// Reload config from disk
pub fn reload() -> Result<(), ConfigError> {
    let new_config = Config::load()?;
    *CONFIG.write().unwrap_or_else(PoisonError::into_inner) = new_config;
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML render error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub recovery: RecoveryConfig,
    pub log: LogConfig,
}

impl Config {
    /// Load config from standard locations
    pub fn load() -> Result<Self, ConfigError> {
        let global = Self::global_config_path();
        let mut config = Self::load_from(global.as_deref(), Some(Self::project_config_path().as_path()))?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load from explicit file locations, without environment overrides.
    ///
    /// Missing files are skipped. Keys set in `project` replace the same keys
    /// from `global`; everything else is inherited.
    pub fn load_from(global: Option<&Path>, project: Option<&Path>) -> Result<Self, ConfigError> {
        let mut merged = toml::Table::new();

        for path in [global, project].into_iter().flatten() {
            if path.exists() {
                debug!("Loading config from {:?}", path);
                let contents = std::fs::read_to_string(path)?;
                let layer: toml::Table = toml::from_str(&contents)?;
                merge_tables(&mut merged, layer);
            }
        }

        Ok(toml::Value::Table(merged).try_into()?)
    }

    /// Global config path: ~/.shelf/config.toml
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".shelf/config.toml"))
    }

    /// Project config path, relative to the working directory
    pub fn project_config_path() -> PathBuf {
        PathBuf::from(".shelf/config.toml")
    }

    /// Apply environment variable overrides, reading variables with `lookup`
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(root) = lookup(ENV_ROOT) {
            self.store.root = PathBuf::from(root);
        }
        if let Some(size) = lookup(ENV_SIZE_MB) {
            match size.parse() {
                Ok(n) => self.store.size_mb = n,
                Err(_) => debug!("Ignoring non-numeric {}={:?}", ENV_SIZE_MB, size),
            }
        }
        if let Some(force) = lookup(ENV_FORCE_NEW) {
            self.store.force_new = matches!(force.as_str(), "1" | "true" | "yes");
        }
    }

    /// Environment that reproduces this config's store settings
    pub fn store_env(&self) -> Vec<(String, String)> {
        vec![
            (ENV_ROOT.to_string(), self.store.root.display().to_string()),
            (ENV_SIZE_MB.to_string(), self.store.size_mb.to_string()),
            (
                ENV_FORCE_NEW.to_string(),
                if self.store.force_new { "1" } else { "0" }.to_string(),
            ),
        ]
    }

    /// Generate default config TOML string
    pub fn default_toml() -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(&Config::default())?)
    }
}

fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(nested)) => {
                merge_tables(existing, nested);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Expand a leading `~/` against the home directory
pub fn expand_tilde(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}

/// Store configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Store root directory
    pub root: PathBuf,
    /// Capacity in MiB
    pub size_mb: u64,
    /// Wipe existing segments on open
    pub force_new: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_STORE_ROOT),
            size_mb: 32,
            force_new: false,
        }
    }
}

impl StoreConfig {
    /// Root with `~` expanded
    pub fn resolved_root(&self) -> PathBuf {
        expand_tilde(&self.root)
    }
}

/// How the store exchanges two names
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwapStrategy {
    /// Kernel exchange where supported, journal otherwise
    #[default]
    Auto,
    /// Always use the rename journal
    Journaled,
}

/// Crash recovery configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Reclaim interrupted updates when the store opens
    pub sweep_on_open: bool,
    pub swap_strategy: SwapStrategy,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            sweep_on_open: true,
            swap_strategy: SwapStrategy::Auto,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: LogLevel,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.store.size_mb, 32);
        assert!(!config.store.force_new);
        assert!(config.recovery.sweep_on_open);
        assert_eq!(config.recovery.swap_strategy, SwapStrategy::Auto);
        assert_eq!(config.log.level, LogLevel::Info);
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml().unwrap();
        assert!(toml_str.contains("[store]"));
        assert!(toml_str.contains("[recovery]"));
        assert!(toml_str.contains("[log]"));
        assert!(toml_str.contains("swap_strategy = \"auto\""));
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_env_overrides(|key| match key {
            ENV_ROOT => Some("/tmp/shelf".to_string()),
            ENV_SIZE_MB => Some("128".to_string()),
            ENV_FORCE_NEW => Some("1".to_string()),
            _ => None,
        });
        assert_eq!(config.store.root, PathBuf::from("/tmp/shelf"));
        assert_eq!(config.store.size_mb, 128);
        assert!(config.store.force_new);
    }

    #[test]
    fn test_bad_size_env_is_ignored() {
        let mut config = Config::default();
        config.apply_env_overrides(|key| (key == ENV_SIZE_MB).then(|| "lots".to_string()));
        assert_eq!(config.store.size_mb, 32);
    }

    #[test]
    fn test_store_env_roundtrip() {
        let mut config = Config::default();
        config.store.root = PathBuf::from("/data/shelf");
        config.store.size_mb = 8;
        let env = config.store_env();

        let mut restored = Config::default();
        restored.apply_env_overrides(|key| {
            env.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone())
        });
        assert_eq!(restored.store, config.store);
    }

    #[test]
    fn test_expand_tilde() {
        assert_eq!(expand_tilde(Path::new("/abs/path")), PathBuf::from("/abs/path"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_tilde(Path::new("~/.shelf/store")), home.join(".shelf/store"));
        }
    }

    #[test]
    fn test_merge_tables_is_deep() {
        let mut base: toml::Table = toml::from_str("[store]\nsize_mb = 8\nforce_new = true\n").unwrap();
        let overlay: toml::Table = toml::from_str("[store]\nsize_mb = 64\n").unwrap();
        merge_tables(&mut base, overlay);

        let config: Config = toml::Value::Table(base).try_into().unwrap();
        assert_eq!(config.store.size_mb, 64);
        assert!(config.store.force_new);
    }
}
