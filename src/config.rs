// src/config.rs
//! Configuration management with platform-specific storage

use crate::error::{Result, SamplerError};
use crate::gps::source::{PollSettings, SamplingMethod};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    pub source_type: String, // "gpsd", "serial", "replay"
    pub serial_port: Option<String>,
    pub serial_baudrate: Option<u32>,
    pub gpsd_host: Option<String>,
    pub gpsd_port: Option<u16>,
    pub replay_path: Option<PathBuf>,
    pub replay_interval_ms: Option<u64>,
    pub sampling_method: SamplingMethod,
    pub poll_interval_ms: u64,
    pub poll_timeout_ms: u64,
    pub export_dir: Option<PathBuf>,
    pub targets: Vec<String>,
    pub share_command: Option<String>,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self::platform_default()
    }
}

impl SamplerConfig {
    /// Get platform-specific default configuration
    pub fn platform_default() -> Self {
        Self {
            source_type: "gpsd".to_string(),
            serial_port: None,
            serial_baudrate: Some(9600),
            gpsd_host: Some("localhost".to_string()),
            gpsd_port: Some(2947),
            replay_path: None,
            replay_interval_ms: Some(1000),
            sampling_method: SamplingMethod::Listening,
            poll_interval_ms: 1000,
            poll_timeout_ms: 800,
            export_dir: None,
            targets: vec!["Location 1".to_string(), "Location 2".to_string()],
            share_command: None,
        }
    }

    /// Load configuration from storage
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::get_config_path()?)
    }

    /// Save configuration to storage
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn load_from(config_path: &std::path::Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Self::platform_default());
        }

        let contents = std::fs::read_to_string(config_path)
            .map_err(|e| SamplerError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| SamplerError::Config(format!("Failed to parse config file: {}", e)))?;

        Ok(config)
    }

    pub fn save_to(&self, config_path: &std::path::Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SamplerError::Config(format!("Failed to create config directory: {}", e)))?;
        }

        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| SamplerError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(config_path, contents)
            .map_err(|e| SamplerError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Get config file path
    fn get_config_path() -> Result<PathBuf> {
        let home = std::env::var("HOME")
            .map_err(|_| SamplerError::Config("HOME environment variable not set".to_string()))?;

        Ok(PathBuf::from(home).join(".config").join("location-sampler").join("config.json"))
    }

    /// App-private directory export files are written to
    pub fn resolved_export_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.export_dir {
            return Ok(dir.clone());
        }
        if let Ok(cache) = std::env::var("XDG_CACHE_HOME") {
            if !cache.is_empty() {
                return Ok(PathBuf::from(cache).join("location-sampler"));
            }
        }
        let home = std::env::var("HOME")
            .map_err(|_| SamplerError::Config("HOME environment variable not set".to_string()))?;
        Ok(PathBuf::from(home).join(".cache").join("location-sampler"))
    }

    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            timeout: Duration::from_millis(self.poll_timeout_ms),
        }
    }

    /// Update configuration with new source settings
    pub fn update_source(&mut self, source_type: &str) {
        self.source_type = source_type.to_string();
    }

    /// Update serial port settings
    pub fn update_serial(&mut self, port: String, baudrate: u32) {
        self.source_type = "serial".to_string();
        self.serial_port = Some(port);
        self.serial_baudrate = Some(baudrate);
    }

    /// Update gpsd settings
    pub fn update_gpsd(&mut self, host: String, port: u16) {
        self.source_type = "gpsd".to_string();
        self.gpsd_host = Some(host);
        self.gpsd_port = Some(port);
    }

    /// Update replay settings
    pub fn update_replay(&mut self, path: PathBuf) {
        self.source_type = "replay".to_string();
        self.replay_path = Some(path);
    }
}
