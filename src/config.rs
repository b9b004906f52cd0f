//! Store configuration, read from `.skilltree/config.yaml`.

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration file name within the store directory.
pub const CONFIG_FILE: &str = "config.yaml";

/// Configuration for a skilltree store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Skill tree name given to users created implicitly
    pub default_skill_tree_name: String,
    /// Where snapshot files go; relative paths are under the store directory
    pub snapshot_dir: PathBuf,
    /// Rewrite the user's snapshot after every start, complete and import
    pub auto_snapshot: bool,
    /// Daemon settings
    pub daemon: DaemonSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_skill_tree_name: "default".to_string(),
            snapshot_dir: PathBuf::from("skill_trees"),
            auto_snapshot: true,
            daemon: DaemonSettings::default(),
        }
    }
}

/// Daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DaemonSettings {
    /// Main loop tick in milliseconds
    pub tick_interval_ms: u64,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self { tick_interval_ms: 100 }
    }
}

impl DaemonSettings {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

impl Config {
    /// Load config from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    /// Load from `dir/config.yaml`, falling back to defaults when absent.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE);
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let yaml = fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_yaml(&yaml).with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Write to `dir/config.yaml` unless one already exists.
    pub fn write_if_missing(&self, dir: &Path) -> Result<()> {
        let path = dir.join(CONFIG_FILE);
        if path.exists() {
            return Ok(());
        }
        let yaml = self.to_yaml().context("Failed to serialize config")?;
        fs::write(&path, yaml).with_context(|| format!("Failed to write {}", path.display()))
    }

    /// Snapshot directory resolved against the store directory.
    pub fn snapshot_path(&self, dir: &Path) -> PathBuf {
        if self.snapshot_dir.is_absolute() {
            self.snapshot_dir.clone()
        } else {
            dir.join(&self.snapshot_dir)
        }
    }
}
