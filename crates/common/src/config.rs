//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::paths::DEFAULT_PIPELINE_CONFIG_ASSET;

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Directory where rendered targets are written by default.
    pub output_dir: PathBuf,

    /// Default renderer settings.
    pub renderer: RendererDefaults,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Default parameters for render runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RendererDefaults {
    /// Pause between preparing a target and submitting its job (ms).
    /// Zero disables the pause.
    pub grace_delay_ms: u64,

    /// Depth range used by the depth target (meters).
    pub depth_range_meters: f64,

    /// Named pipeline configuration used as the job template.
    pub pipeline_config: String,

    /// Directory the pipeline configuration name is resolved against.
    #[serde(default)]
    pub config_root: Option<PathBuf>,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "seqsynth=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            renderer: RendererDefaults::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for RendererDefaults {
    fn default() -> Self {
        Self {
            grace_delay_ms: 2000,
            depth_range_meters: 100.0,
            pipeline_config: DEFAULT_PIPELINE_CONFIG_ASSET.to_string(),
            config_root: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if config_path.exists() {
            match std::fs::read_to_string(&config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        let config_path = config_file_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }
}

/// Standard config file location.
fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("seqsynth").join("config.json")
}

/// Default render output directory.
fn default_output_dir() -> PathBuf {
    let base = std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local").join("share")
        });
    base.join("seqsynth").join("renders")
}
