//! Configuration management for facecam
//!
//! Provides loading, saving and validation of the camera negotiation,
//! control sync and console settings.

use crate::errors::CameraError;
use crate::negotiator::{NegotiationConfig, DEFAULT_FALLBACK_RESOLUTIONS};
use crate::types::Resolution;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FacecamConfig {
    pub camera: CameraConfig,
    pub controls: ControlsConfig,
    pub console: ConsoleConfig,
}

/// Capture request and negotiation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Facing mode requested when no device is selected ("user" or "environment")
    pub facing_mode: String,
    /// Frame rate asked for during negotiation
    pub desired_fps: f64,
    /// Lowest frame rate accepted before falling back to a smaller resolution
    pub min_fps: f64,
    /// Fallback resolutions, largest first
    pub fallback_resolutions: Vec<Resolution>,
    /// Negotiate resolution and frame rate after every start
    pub negotiate_on_start: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlsConfig {
    /// Quiet period before a slider edit is applied, in milliseconds
    pub debounce_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Entries kept by the in-app console; 0 keeps everything
    pub max_entries: usize,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            facing_mode: "user".to_string(),
            desired_fps: 30.0,
            min_fps: 30.0,
            fallback_resolutions: DEFAULT_FALLBACK_RESOLUTIONS.to_vec(),
            negotiate_on_start: true,
        }
    }
}

impl Default for ControlsConfig {
    fn default() -> Self {
        Self { debounce_ms: 150 }
    }
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self { max_entries: 500 }
    }
}

impl Default for FacecamConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig::default(),
            controls: ControlsConfig::default(),
            console: ConsoleConfig::default(),
        }
    }
}

impl CameraConfig {
    pub fn negotiation(&self) -> NegotiationConfig {
        NegotiationConfig {
            desired_fps: self.desired_fps,
            min_fps: self.min_fps,
            fallback_resolutions: self.fallback_resolutions.clone(),
        }
    }
}

impl ControlsConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl ConsoleConfig {
    pub fn capacity(&self) -> Option<usize> {
        (self.max_entries > 0).then_some(self.max_entries)
    }
}

impl FacecamConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, CameraError> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| CameraError::Config(format!("Failed to read config file: {}", e)))?;

        let config: FacecamConfig = toml::from_str(&contents)
            .map_err(|e| CameraError::Config(format!("Failed to parse config file: {}", e)))?;

        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), CameraError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                CameraError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| CameraError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| CameraError::Config(format!("Failed to write config file: {}", e)))?;

        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Get default config file path
    pub fn default_path() -> PathBuf {
        PathBuf::from("facecam.toml")
    }

    /// Load from default location or fall back to defaults
    pub fn load_or_default() -> Self {
        Self::load_from_file(Self::default_path()).unwrap_or_else(|e| {
            log::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Optional TOML file at `path` overlaid with `FACECAM__SECTION__KEY`
    /// environment variables, then validated.
    pub fn load_layered<P: AsRef<Path>>(path: P) -> Result<Self, CameraError> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()).required(false))
            .add_source(
                config::Environment::with_prefix("FACECAM")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| CameraError::Config(format!("Failed to build config: {}", e)))?;

        let loaded: FacecamConfig = settings
            .try_deserialize()
            .map_err(|e| CameraError::Config(format!("Failed to read config: {}", e)))?;

        loaded.validate().map_err(CameraError::Config)?;
        Ok(loaded)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        match self.camera.facing_mode.as_str() {
            "user" | "environment" | "left" | "right" => {}
            other => return Err(format!("Unknown facing mode: {}", other)),
        }
        if !(1.0..=240.0).contains(&self.camera.desired_fps) {
            return Err("Desired FPS must be between 1 and 240".to_string());
        }
        if !(1.0..=240.0).contains(&self.camera.min_fps) {
            return Err("Minimum FPS must be between 1 and 240".to_string());
        }
        if self
            .camera
            .fallback_resolutions
            .iter()
            .any(|r| r.width == 0 || r.height == 0)
        {
            return Err("Fallback resolutions must be non-zero".to_string());
        }
        if self.controls.debounce_ms > 5_000 {
            return Err("Debounce must be at most 5000 ms".to_string());
        }

        Ok(())
    }
}
