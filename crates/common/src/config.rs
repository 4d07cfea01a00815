use serde::Deserialize;
use std::fs;
use std::time::Duration;

use crate::detector::{self, DetectionEvent};
use crate::error::ConfigError;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ControlLoopConfig {
    pub session_name: String,
    pub mode: String, // "async" or "threaded"
    pub debounce_window_ms: u64,
    pub activation_delay_ms: u64,
    pub deactivation_delay_ms: u64,
    pub settle_ms: u64, // grace period after the last replayed event
    pub enable_logging: bool,
    pub light: LightConfig,
    pub trace: Vec<DetectionEvent>,
}

/// Behaviour of the simulated light used by demos and benchmarks.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct LightConfig {
    pub available: bool,
    pub fault_every: u32, // 0 = never fault
}

impl Default for LightConfig {
    fn default() -> Self {
        Self {
            available: true,
            fault_every: 0,
        }
    }
}

impl Default for ControlLoopConfig {
    fn default() -> Self {
        Self {
            session_name: "session".to_string(),
            mode: "async".to_string(),
            debounce_window_ms: 500,
            activation_delay_ms: 200,
            deactivation_delay_ms: 1000,
            settle_ms: 2500,
            enable_logging: false,
            light: LightConfig::default(),
            trace: detector::flicker_scenario(),
        }
    }
}

pub fn load_config(path: &str) -> Result<ControlLoopConfig, ConfigError> {
    ControlLoopConfig::from_file(path)
}

impl ControlLoopConfig {
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_string(),
            source,
        })?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: ControlLoopConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.mode.as_str() {
            "async" | "threaded" => Ok(()),
            other => Err(ConfigError::Invalid(format!(
                "unknown mode {other:?}, expected \"async\" or \"threaded\""
            ))),
        }
    }

    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_window_ms)
    }

    pub fn activation_delay(&self) -> Duration {
        Duration::from_millis(self.activation_delay_ms)
    }

    pub fn deactivation_delay(&self) -> Duration {
        Duration::from_millis(self.deactivation_delay_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}
