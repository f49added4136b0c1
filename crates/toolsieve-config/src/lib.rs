use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, warn};

use toolsieve_core::{SieveOptions, ToolCallPolicy, DEFAULT_CAPTURE_LIMIT, DEFAULT_TAIL_LIMIT};


/// Searched in order when no explicit path is given.
pub const DEFAULT_CONFIG_PATHS: [&str; 2] = ["./toolsieve.toml", "~/.config/toolsieve/config.toml"];

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub toolcall: ToolcallConfig,
    #[serde(default)]
    pub sieve: SieveConfig,
}

/// Tool-call policy. Values are kept as written and validated on load, so an
/// empty string means "use the default".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolcallConfig {
    /// "feature_match" (sieve model text for tool calls) or "off"
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mode: String,

    /// "high" forwards early deltas for a single certain call; "low" and "off" do not
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub early_emit_confidence: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SieveConfig {
    /// Bytes a capture may grow to before it is released as content
    #[serde(default = "default_capture_limit")]
    pub capture_limit: usize,

    /// Bytes of recently emitted text kept for code fence detection
    #[serde(default = "default_tail_limit")]
    pub tail_limit: usize,
}

fn default_capture_limit() -> usize {
    DEFAULT_CAPTURE_LIMIT
}

fn default_tail_limit() -> usize {
    DEFAULT_TAIL_LIMIT
}

impl Default for SieveConfig {
    fn default() -> Self {
        Self {
            capture_limit: default_capture_limit(),
            tail_limit: default_tail_limit(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("toolcall.mode must be feature_match or off (got {0:?})")]
    InvalidToolcallMode(String),

    #[error("toolcall.early_emit_confidence must be high, low or off (got {0:?})")]
    InvalidEarlyEmitConfidence(String),

    #[error("sieve.{0} must be greater than zero")]
    ZeroLimit(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ToolcallMode {
    #[default]
    FeatureMatch,
    Off,
}

impl FromStr for ToolcallMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "feature_match" => Ok(Self::FeatureMatch),
            "off" => Ok(Self::Off),
            _ => Err(ConfigError::InvalidToolcallMode(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EarlyEmitConfidence {
    #[default]
    High,
    Low,
    Off,
}

impl EarlyEmitConfidence {
    pub fn emits_deltas(self) -> bool {
        self == Self::High
    }
}

impl FromStr for EarlyEmitConfidence {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "high" => Ok(Self::High),
            "low" => Ok(Self::Low),
            "off" => Ok(Self::Off),
            _ => Err(ConfigError::InvalidEarlyEmitConfidence(s.to_string())),
        }
    }
}

/// Values given on the command line; each one replaces its file counterpart.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub toolcall_mode: Option<String>,
    pub early_emit_confidence: Option<String>,
    pub capture_limit: Option<usize>,
    pub tail_limit: Option<usize>,
}

impl Config {
    /// Load from `config_path`, or from the first default path that exists.
    /// With no file at all, defaults are used.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path = match config_path {
            Some(path) => {
                let expanded = PathBuf::from(shellexpand::tilde(path).as_ref());
                if !expanded.exists() {
                    bail!("Configuration file not found: {}", path);
                }
                Some(expanded)
            }
            None => Self::find_default_config(),
        };

        let config = match path {
            Some(path) => Self::load_from_file(&path)?,
            None => {
                debug!("No configuration file found, using defaults");
                Self::default()
            }
        };

        config.validate()?;
        Ok(config)
    }

    fn find_default_config() -> Option<PathBuf> {
        let candidates: Vec<PathBuf> = DEFAULT_CONFIG_PATHS
            .iter()
            .map(|path| PathBuf::from(shellexpand::tilde(path).as_ref()))
            .collect();
        first_config_file(&candidates)
    }

    fn load_from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from {}", path.display());
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    pub fn save(&self, path: &str) -> Result<()> {
        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;
        Ok(())
    }

    pub fn load_with_overrides(config_path: Option<&str>, overrides: ConfigOverrides) -> Result<Self> {
        let mut config = Self::load(config_path)?;

        if let Some(mode) = overrides.toolcall_mode {
            config.toolcall.mode = mode;
        }
        if let Some(level) = overrides.early_emit_confidence {
            config.toolcall.early_emit_confidence = level;
        }
        if let Some(limit) = overrides.capture_limit {
            config.sieve.capture_limit = limit;
        }
        if let Some(limit) = overrides.tail_limit {
            config.sieve.tail_limit = limit;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        self.toolcall_mode()?;
        self.early_emit_confidence()?;
        if self.sieve.capture_limit == 0 {
            return Err(ConfigError::ZeroLimit("capture_limit"));
        }
        if self.sieve.tail_limit == 0 {
            return Err(ConfigError::ZeroLimit("tail_limit"));
        }
        Ok(())
    }

    pub fn toolcall_mode(&self) -> std::result::Result<ToolcallMode, ConfigError> {
        self.toolcall.mode.parse()
    }

    pub fn early_emit_confidence(&self) -> std::result::Result<EarlyEmitConfidence, ConfigError> {
        self.toolcall.early_emit_confidence.parse()
    }

    pub fn tool_call_policy(&self) -> std::result::Result<ToolCallPolicy, ConfigError> {
        Ok(ToolCallPolicy {
            enabled: self.toolcall_mode()? == ToolcallMode::FeatureMatch,
            emit_deltas: self.early_emit_confidence()?.emits_deltas(),
        })
    }

    pub fn sieve_options(&self) -> SieveOptions {
        SieveOptions {
            capture_limit: self.sieve.capture_limit,
            tail_limit: self.sieve.tail_limit,
        }
    }
}

/// First candidate that is a regular file. Anything else at a candidate path
/// is skipped with a warning.
fn first_config_file(candidates: &[PathBuf]) -> Option<PathBuf> {
    for path in candidates {
        if path.is_file() {
            return Some(path.clone());
        }
        if path.exists() {
            warn!("Skipping config path {}: not a regular file", path.display());
        }
    }
    None
}
