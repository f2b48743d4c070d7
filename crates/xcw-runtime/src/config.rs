use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Resolve the xcw state directory: `XCW_PATH` overrides, otherwise
/// `~/.xcw`. Resume files, learned patterns and the optional config file
/// all live here.
pub fn state_dir() -> PathBuf {
    if let Ok(path) = std::env::var("XCW_PATH") {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".xcw")
}

/// Optional `config.toml` seeding CLI defaults. All keys optional; a
/// missing file yields the built-in defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub format: String,
    pub level: String,
    pub quiet: bool,
    pub verbose: bool,
    pub defaults: Defaults,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Defaults {
    pub simulator: String,
    pub since: String,
    pub limit: u64,
    pub heartbeat: String,
    pub summary_interval: String,
    pub exclude_subsystems: Vec<String>,
    pub exclude_pattern: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            format: "ndjson".to_string(),
            level: "default".to_string(),
            quiet: false,
            verbose: false,
            defaults: Defaults::default(),
        }
    }
}

impl Default for Defaults {
    fn default() -> Self {
        Defaults {
            simulator: "booted".to_string(),
            since: "5m".to_string(),
            limit: 1000,
            heartbeat: "30s".to_string(),
            summary_interval: "60s".to_string(),
            exclude_subsystems: Vec::new(),
            exclude_pattern: String::new(),
        }
    }
}

impl Config {
    pub fn default_path() -> PathBuf {
        state_dir().join("config.toml")
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path())
    }

    /// Missing file is not an error; a malformed file is, so callers can
    /// warn and fall back to defaults.
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
