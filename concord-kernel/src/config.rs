//! Configuration parsing and management.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Main configuration struct matching the concord.yml schema
///
/// Every field is optional; an empty file yields the defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub runner: RunnerConfig,

    #[serde(default)]
    pub control: ControlConfig,

    #[serde(default)]
    pub journal: JournalConfig,

    // Path to the config file, for relative path resolution
    #[serde(skip)]
    config_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Propagation rounds per tick before queued events are dropped
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Reject synchronizations that reference unregistered concepts
    #[serde(default)]
    pub strict_rules: bool,

    /// Diagnostics kept until taken; the oldest are dropped beyond this
    #[serde(default = "default_max_diagnostics")]
    pub max_diagnostics: usize,
}

fn default_max_depth() -> usize {
    10
}

fn default_max_diagnostics() -> usize {
    1000
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            strict_rules: false,
            max_diagnostics: default_max_diagnostics(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlConfig {
    #[serde(default = "default_max_ticks")]
    pub max_ticks: u64,

    /// Sleep between polls when no command ran
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_max_ticks() -> u64 {
    1000
}

fn default_poll_interval_ms() -> u64 {
    100
}

impl ControlConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            max_ticks: default_max_ticks(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalConfig {
    /// Journal file; the command bus lives next to it as `<stem>.commands.json`
    #[serde(default = "default_journal_path")]
    pub path: PathBuf,

    /// Minimum time between journal writes; 0 writes on every save
    #[serde(default)]
    pub save_interval_ms: u64,
}

fn default_journal_path() -> PathBuf {
    PathBuf::from("execution.json")
}

impl JournalConfig {
    pub fn save_interval(&self) -> Duration {
        Duration::from_millis(self.save_interval_ms)
    }
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            path: default_journal_path(),
            save_interval_ms: 0,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::from_yaml(&contents)?;
        config.config_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Parse configuration from YAML text; paths stay relative to the cwd
    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        // serde_yaml reads an empty document as null
        let config: Config = if contents.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml::from_str(contents)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise use defaults anchored at `path`
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self {
                config_path: Some(path.to_path_buf()),
                ..Self::default()
            })
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.runner.max_depth == 0 {
            return Err(ConfigError::InvalidValue {
                field: "runner.max_depth".into(),
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }

    /// Journal file, resolved relative to the config file
    pub fn journal_path(&self) -> PathBuf {
        self.resolve_path(&self.journal.path)
    }

    /// Resolve an arbitrary path relative to the config file location
    pub fn resolve_relative(&self, path: &Path) -> PathBuf {
        self.resolve_path(path)
    }

    fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            return path.to_path_buf();
        }
        match self.config_path.as_deref().and_then(Path::parent) {
            Some(parent) => parent.join(path),
            None => path.to_path_buf(),
        }
    }
}
