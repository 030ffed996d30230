//! Configuration management for Playdeck
//!
//! This module handles loading and managing orchestrator configuration
//! from config files and environment variables.

use crate::binder::ResizeMode;
use crate::utils::error::{IntoPlaydeckError, PlaydeckError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main orchestrator configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Playback behavior
    pub playback: PlaybackConfig,

    /// Shared media source settings
    pub source: SourceConfig,

    /// General settings
    pub general: GeneralConfig,
}

/// Playback behavior configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Progress poll cadence in milliseconds
    pub progress_interval_ms: u64,

    /// Start playback as soon as a loaded instance is ready
    pub autoplay: bool,

    /// Initial volume for new instances (0.0 - 1.0)
    pub default_volume: f32,

    /// Stop the progress poller while paused. When false the poller keeps
    /// ticking through pauses and only stops on stop/clear/error/finish.
    pub pause_stops_poller: bool,

    /// Presentation mode applied to bound surfaces
    pub resize_mode: ResizeMode,
}

/// Shared media source configuration, applied to every engine session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Connection timeout in milliseconds
    pub connect_timeout_ms: u64,

    /// Read timeout in milliseconds
    pub read_timeout_ms: u64,

    /// Follow redirects that switch between http and https
    pub allow_cross_protocol_redirects: bool,
}

/// General configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            progress_interval_ms: 500,
            autoplay: true,
            default_volume: 1.0,
            pause_stops_poller: true,
            resize_mode: ResizeMode::Fill,
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 8000,
            read_timeout_ms: 8000,
            allow_cross_protocol_redirects: true,
        }
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl PlaybackConfig {
    /// Poll cadence as a Duration
    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}

impl Config {
    /// Load configuration from various sources
    ///
    /// Configuration is loaded in the following order (later sources
    /// override earlier):
    /// 1. Default values
    /// 2. User config file (~/.config/playdeck/config.toml on Linux)
    /// 3. Environment variables (PLAYDECK_* prefix)
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        if let Some(user_path) = Self::user_config_path() {
            if user_path.exists() {
                config = Self::from_file(&user_path)?;
            }
        }

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents =
            std::fs::read_to_string(path).config_err("Failed to read config file")?;

        let config: Config =
            toml::from_str(&contents).config_err("Failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the user config file
    pub fn save(&self) -> Result<()> {
        let path = Self::user_config_path()
            .ok_or_else(|| PlaydeckError::Config("Cannot determine user config path".to_string()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                PlaydeckError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let toml = toml::to_string_pretty(self)
            .map_err(|e| PlaydeckError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(&path, toml)
            .map_err(|e| PlaydeckError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(interval) = std::env::var("PLAYDECK_PROGRESS_INTERVAL_MS") {
            self.playback.progress_interval_ms = interval
                .parse()
                .map_err(|_| PlaydeckError::Config("Invalid PLAYDECK_PROGRESS_INTERVAL_MS".to_string()))?;
        }

        if let Ok(volume) = std::env::var("PLAYDECK_DEFAULT_VOLUME") {
            self.playback.default_volume = volume
                .parse()
                .map_err(|_| PlaydeckError::Config("Invalid PLAYDECK_DEFAULT_VOLUME".to_string()))?;
        }

        if let Ok(autoplay) = std::env::var("PLAYDECK_AUTOPLAY") {
            self.playback.autoplay = autoplay
                .parse()
                .map_err(|_| PlaydeckError::Config("Invalid PLAYDECK_AUTOPLAY".to_string()))?;
        }

        if let Ok(log_level) = std::env::var("PLAYDECK_LOG_LEVEL") {
            self.general.log_level = log_level;
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.playback.progress_interval_ms == 0 {
            return Err(PlaydeckError::Config(
                "Progress interval must be non-zero".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.playback.default_volume) {
            return Err(PlaydeckError::Config(
                "Default volume must be between 0.0 and 1.0".to_string(),
            ));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.general.log_level.as_str()) {
            return Err(PlaydeckError::Config(format!(
                "Invalid log level '{}', must be one of: {:?}",
                self.general.log_level, valid_log_levels
            )));
        }

        Ok(())
    }

    /// Get user config file path
    fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("playdeck").join("config.toml"))
    }
}
