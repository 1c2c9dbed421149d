//! Run configuration for the persona runner.
//!
//! `key=value` format read from `.persona/config`.
//! Precedence: CLI flags > `--config` file > `.persona/config` > defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::loop_detector::LoopDetectorConfig;
use crate::prompt::DEFAULT_FEEDBACK_LABEL;

pub const DEFAULT_CONFIG_PATH: &str = ".persona/config";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("invalid config line: {0}")]
    InvalidLine(String),
    #[error("invalid boolean value for {key}: {value}")]
    InvalidBool { key: String, value: String },
    #[error("invalid integer value for {key}: {value}")]
    InvalidInt { key: String, value: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Persona run configuration.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Config {
    // Agent budget
    pub max_steps: u32,
    pub max_actions_per_step: u32,
    pub max_failures: u32,
    pub use_vision: bool,
    pub timeout_per_persona_sec: u64,

    // Step pacing
    pub min_step_interval_ms: u64,
    pub failure_backoff_base_sec: u64,
    pub failure_backoff_cap_sec: u64,

    // Health check
    pub health_check_retries: u32,
    pub health_check_backoff_base_sec: u64,
    pub health_check_backoff_cap_sec: u64,

    // Failover
    pub rate_limit_cooldown_sec: u64,
    /// Attempts with fewer actions than this, not done and with errors, fail over.
    pub min_useful_steps: u32,

    // Batch
    pub cooldown_between_runs_sec: u64,
    pub rotate_providers: bool,

    // Loop detection
    pub loop_window_size: usize,
    pub loop_repeat_threshold: usize,
    pub loop_alternating_cycles: usize,

    // Paths and target
    pub personas_dir: PathBuf,
    pub results_dir: PathBuf,
    pub planner_url: String,
    pub headless: bool,
    pub feedback_link_label: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_steps: 60,
            max_actions_per_step: 3,
            max_failures: 5,
            use_vision: true,
            timeout_per_persona_sec: 600,
            min_step_interval_ms: 2500,
            failure_backoff_base_sec: 10,
            failure_backoff_cap_sec: 60,
            health_check_retries: 3,
            health_check_backoff_base_sec: 10,
            health_check_backoff_cap_sec: 60,
            rate_limit_cooldown_sec: 60,
            min_useful_steps: 10,
            cooldown_between_runs_sec: 30,
            rotate_providers: false,
            loop_window_size: 8,
            loop_repeat_threshold: 3,
            loop_alternating_cycles: 2,
            personas_dir: PathBuf::from("personas"),
            results_dir: PathBuf::from("output/results"),
            planner_url: "https://travliaq.com/planner".to_string(),
            headless: false,
            feedback_link_label: DEFAULT_FEEDBACK_LABEL.to_string(),
        }
    }
}

impl Config {
    /// Load config from a file, merging with defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let mut config = Self::default();
        config.load_file(path)?;
        Ok(config)
    }

    /// Explicit path if given, else `.persona/config` when present, else defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_PATH);
                if default_path.exists() {
                    Self::from_file(default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Load and merge values from a config file.
    pub fn load_file(&mut self, path: &Path) -> Result<()> {
        let content = std::fs::read_to_string(path)?;
        self.parse_content(&content, &path.display().to_string())
    }

    /// Parse config content (key=value format).
    pub fn parse_content(&mut self, content: &str, source: &str) -> Result<()> {
        for line in content.lines() {
            let trimmed = line.trim();

            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let Some((key, value)) = trimmed.split_once('=') else {
                return Err(ConfigError::InvalidLine(line.to_string()));
            };

            let key = key.trim();
            let value = Self::unquote(value.trim());

            self.apply_value(key, &value, source)?;
        }
        Ok(())
    }

    /// Remove surrounding quotes from a value.
    fn unquote(value: &str) -> String {
        if value.len() >= 2
            && ((value.starts_with('"') && value.ends_with('"'))
                || (value.starts_with('\'') && value.ends_with('\'')))
        {
            return value[1..value.len() - 1].to_string();
        }
        value.to_string()
    }

    /// Apply a single config value.
    fn apply_value(&mut self, key: &str, value: &str, source: &str) -> Result<()> {
        match key {
            "max_steps" => self.max_steps = Self::parse_int(key, value)?,
            "max_actions_per_step" => self.max_actions_per_step = Self::parse_int(key, value)?,
            "max_failures" => self.max_failures = Self::parse_int(key, value)?,
            "use_vision" => self.use_vision = Self::parse_bool(key, value)?,
            "timeout_per_persona_sec" => {
                self.timeout_per_persona_sec = Self::parse_int(key, value)?;
            }
            "min_step_interval_ms" => self.min_step_interval_ms = Self::parse_int(key, value)?,
            "failure_backoff_base_sec" => {
                self.failure_backoff_base_sec = Self::parse_int(key, value)?;
            }
            "failure_backoff_cap_sec" => {
                self.failure_backoff_cap_sec = Self::parse_int(key, value)?;
            }
            "health_check_retries" => self.health_check_retries = Self::parse_int(key, value)?,
            "health_check_backoff_base_sec" => {
                self.health_check_backoff_base_sec = Self::parse_int(key, value)?;
            }
            "health_check_backoff_cap_sec" => {
                self.health_check_backoff_cap_sec = Self::parse_int(key, value)?;
            }
            "rate_limit_cooldown_sec" => {
                self.rate_limit_cooldown_sec = Self::parse_int(key, value)?;
            }
            "min_useful_steps" => self.min_useful_steps = Self::parse_int(key, value)?,
            "cooldown_between_runs_sec" => {
                self.cooldown_between_runs_sec = Self::parse_int(key, value)?;
            }
            "rotate_providers" => self.rotate_providers = Self::parse_bool(key, value)?,
            "loop_window_size" => self.loop_window_size = Self::parse_int(key, value)?,
            "loop_repeat_threshold" => self.loop_repeat_threshold = Self::parse_int(key, value)?,
            "loop_alternating_cycles" => {
                self.loop_alternating_cycles = Self::parse_int(key, value)?;
            }
            "personas_dir" => self.personas_dir = PathBuf::from(value),
            "results_dir" => self.results_dir = PathBuf::from(value),
            "planner_url" => self.planner_url = value.to_string(),
            "headless" => self.headless = Self::parse_bool(key, value)?,
            "feedback_link_label" => self.feedback_link_label = value.to_string(),
            _ => {
                tracing::warn!(key, source, "unknown config key");
            }
        }
        Ok(())
    }

    fn parse_int<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
        value.parse().map_err(|_| ConfigError::InvalidInt {
            key: key.to_string(),
            value: value.to_string(),
        })
    }

    fn parse_bool(key: &str, value: &str) -> Result<bool> {
        match value.to_lowercase().as_str() {
            "true" | "1" | "yes" | "y" | "on" => Ok(true),
            "false" | "0" | "no" | "n" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidBool {
                key: key.to_string(),
                value: value.to_string(),
            }),
        }
    }

    /// Resolve relative paths against a workspace root.
    pub fn resolve_paths(&mut self, workspace_root: &Path) {
        if self.personas_dir.is_relative() {
            self.personas_dir = workspace_root.join(&self.personas_dir);
        }
        if self.results_dir.is_relative() {
            self.results_dir = workspace_root.join(&self.results_dir);
        }
    }

    pub fn persona_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_per_persona_sec)
    }

    pub fn min_step_interval(&self) -> Duration {
        Duration::from_millis(self.min_step_interval_ms)
    }

    pub fn failure_backoff_base(&self) -> Duration {
        Duration::from_secs(self.failure_backoff_base_sec)
    }

    pub fn failure_backoff_cap(&self) -> Duration {
        Duration::from_secs(self.failure_backoff_cap_sec)
    }

    pub fn health_check_backoff_base(&self) -> Duration {
        Duration::from_secs(self.health_check_backoff_base_sec)
    }

    pub fn health_check_backoff_cap(&self) -> Duration {
        Duration::from_secs(self.health_check_backoff_cap_sec)
    }

    pub fn rate_limit_cooldown(&self) -> Duration {
        Duration::from_secs(self.rate_limit_cooldown_sec)
    }

    pub fn cooldown_between_runs(&self) -> Duration {
        Duration::from_secs(self.cooldown_between_runs_sec)
    }

    pub fn loop_detector(&self) -> LoopDetectorConfig {
        LoopDetectorConfig {
            window_size: self.loop_window_size,
            repeat_threshold: self.loop_repeat_threshold,
            alternating_cycles: self.loop_alternating_cycles,
        }
    }
}
