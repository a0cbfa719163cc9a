use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::history::{Retention, RetentionWindow};

/// Top-level configuration for the dockmon agent.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Logging verbosity (debug, info, warn, error). Default: "info".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Metrics API connection configuration.
    #[serde(default)]
    pub api: ApiConfig,

    /// How often to run a poll cycle. Default: 2s.
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,

    /// History retention policy.
    #[serde(default)]
    pub retention: RetentionConfig,

    /// Path of the file holding the last selected entity id.
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
}

/// Metrics API connection configuration.
#[derive(Debug, Deserialize)]
pub struct ApiConfig {
    /// Base endpoint of the metrics API (e.g., "http://localhost:8000/api").
    #[serde(default)]
    pub endpoint: String,

    /// Per-request timeout. Default: 10s.
    #[serde(default = "default_api_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

/// History retention policy configuration.
#[derive(Debug, Deserialize)]
pub struct RetentionConfig {
    /// Retention mode: "count" or "window". Default: "count".
    #[serde(default)]
    pub mode: RetentionMode,

    /// Maximum points per series in count mode. Default: 20.
    #[serde(default = "default_max_points")]
    pub max_points: usize,

    /// Time window in window mode (1h, 6h, 12h, 24h, 7d). Default: 1h.
    #[serde(default)]
    pub window: RetentionWindow,
}

/// Which of the two retention policies bounds the series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetentionMode {
    #[default]
    Count,
    Window,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(2)
}

fn default_api_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_max_points() -> usize {
    20
}

fn default_state_file() -> PathBuf {
    PathBuf::from("dockmon.state")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            api: ApiConfig::default(),
            poll_interval: default_poll_interval(),
            retention: RetentionConfig::default(),
            state_file: default_state_file(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            timeout: default_api_timeout(),
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            mode: RetentionMode::default(),
            max_points: default_max_points(),
            window: RetentionWindow::default(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;

        let cfg: Config = serde_yaml::from_str(&data)
            .with_context(|| format!("parsing config file {}", path.display()))?;

        cfg.validate()?;

        Ok(cfg)
    }

    /// Validate the configuration for required fields and consistency.
    pub fn validate(&self) -> Result<()> {
        if self.api.endpoint.is_empty() {
            bail!("api.endpoint is required");
        }

        if self.api.timeout.is_zero() {
            bail!("api.timeout must be positive");
        }

        if self.poll_interval.is_zero() {
            bail!("poll_interval must be positive");
        }

        if self.retention.mode == RetentionMode::Count && self.retention.max_points == 0 {
            bail!("retention.max_points must be positive");
        }

        Ok(())
    }
}

impl RetentionConfig {
    /// Build the store-level retention policy from the configured mode.
    pub fn policy(&self) -> Retention {
        match self.mode {
            RetentionMode::Count => Retention::Count {
                max_points: self.max_points,
            },
            RetentionMode::Window => Retention::Window {
                window: self.window,
            },
        }
    }
}
