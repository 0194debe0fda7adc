//! Test environment abstraction for isolated testing.
//!
//! Provides `TestEnvironment` to manage:
//! - A temporary store root
//! - Isolated global and project config files
//!
//! # Usage
//!
//! ```ignore
//! use shelf_config::testing::TestEnvironment;
//!
//! #[test]
//! fn test_something() {
//!     let env = TestEnvironment::new().unwrap();
//!     // env.store_root, env.project_root and env.home_dir are all isolated
//! }
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use tempfile::TempDir;

use crate::{Config, ConfigError};

/// Atomic counter for unique test IDs
static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Isolated test environment with unique paths
pub struct TestEnvironment {
    /// Temporary directory (dropped on cleanup)
    _temp_dir: TempDir,
    /// Store root for this test; not created, the store does that
    pub store_root: PathBuf,
    /// Stand-in for the user's home directory
    pub home_dir: PathBuf,
    /// Project root for the test
    pub project_root: PathBuf,
    /// Unique test ID
    pub test_id: u32,
}

impl TestEnvironment {
    /// Create a new isolated test environment
    pub fn new() -> anyhow::Result<Self> {
        let test_id = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();

        let home_dir = root.join("home");
        let project_root = root.join("project");
        std::fs::create_dir_all(home_dir.join(".shelf"))?;
        std::fs::create_dir_all(project_root.join(".shelf"))?;

        Ok(Self {
            store_root: root.join(format!("store-{}", test_id)),
            _temp_dir: temp_dir,
            home_dir,
            project_root,
            test_id,
        })
    }

    pub fn global_config_path(&self) -> PathBuf {
        self.home_dir.join(".shelf/config.toml")
    }

    pub fn project_config_path(&self) -> PathBuf {
        self.project_root.join(".shelf/config.toml")
    }

    pub fn write_global_config(&self, contents: &str) -> anyhow::Result<PathBuf> {
        let path = self.global_config_path();
        std::fs::write(&path, contents)?;
        Ok(path)
    }

    pub fn write_project_config(&self, contents: &str) -> anyhow::Result<PathBuf> {
        let path = self.project_config_path();
        std::fs::write(&path, contents)?;
        Ok(path)
    }

    /// Load config from this environment's files, pointed at `store_root`
    /// unless a config file says otherwise. No environment overrides.
    pub fn load_config(&self) -> Result<Config, ConfigError> {
        let mut config = Config::load_from(
            Some(self.global_config_path().as_path()),
            Some(self.project_config_path().as_path()),
        )?;
        if config.store.root == Config::default().store.root {
            config.store.root = self.store_root.clone();
        }
        Ok(config)
    }

    /// Environment variables pointing a spawned process at this store
    pub fn store_env(&self) -> Vec<(String, String)> {
        let mut cfg = Config::default();
        cfg.store.root = self.store_root.clone();
        cfg.store_env()
    }
}
