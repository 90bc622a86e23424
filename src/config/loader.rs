// src/config/loader.rs
//! Configuration loader with environment overrides and default fallback

use crate::config::{constants::paths, ChannelConfiguration, SystemConfig};
use crate::error::{DaqError, DaqResult};
use crate::utils::validation::{validate_directory, validate_project};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Where the effective configuration came from
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigOrigin {
    File(PathBuf),
    /// Built-in defaults, with the reason the file was not used
    Defaults(String),
}

/// Result of a load: the file model plus its validated channel view
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub system: SystemConfig,
    pub channels: ChannelConfiguration,
    pub origin: ConfigOrigin,
}

/// Loads `SystemConfig` from TOML, falling back to defaults when the file is
/// missing, malformed or invalid.
pub struct ConfigLoader {
    config_path: PathBuf,
    env_prefix: String,
}

impl ConfigLoader {
    /// Loader for the default `channel_config.toml` in the working directory
    pub fn new() -> Self {
        Self::with_path(paths::DEFAULT_CONFIG_FILE)
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: path.into(),
            env_prefix: paths::ENV_PREFIX.to_string(),
        }
    }

    /// Use a different environment variable prefix
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = prefix.to_string();
        self
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load the configuration; never fails, recovers with built-in defaults
    pub fn load(&self) -> LoadedConfig {
        match self.try_load() {
            Ok((system, channels)) => {
                info!(
                    path = %self.config_path.display(),
                    analog = channels.analog_count(),
                    emg = channels.emg_count(),
                    rate_hz = channels.sampling_rate_hz(),
                    "Configuration loaded"
                );
                LoadedConfig {
                    system,
                    channels,
                    origin: ConfigOrigin::File(self.config_path.clone()),
                }
            }
            Err(err) => {
                warn!(path = %self.config_path.display(), error = %err, "Using default configuration");
                Self::defaults(err.to_string())
            }
        }
    }

    /// Load strictly, reporting why the file could not be used
    pub fn try_load(&self) -> DaqResult<(SystemConfig, ChannelConfiguration)> {
        let content = std::fs::read_to_string(&self.config_path).map_err(|e| {
            DaqError::configuration(
                "loader",
                format!("cannot read {}: {}", self.config_path.display(), e),
            )
        })?;

        let mut value: toml::Value = toml::from_str(&content)
            .map_err(|e| DaqError::configuration("loader", format!("parse error: {}", e)))?;

        self.apply_environment_overrides(&mut value, std::env::vars());

        let system = value
            .try_into::<SystemConfig>()
            .map_err(|e| DaqError::configuration("loader", format!("invalid document: {}", e)))?;
        let channels = ChannelConfiguration::from_system(&system)?;

        // File defaults go straight into trial file names
        let files = &system.file_settings;
        validate_directory(&files.default_directory)
            .and_then(|_| validate_project(&files.default_project))
            .map_err(|e| DaqError::configuration("file_settings", e.to_string()))?;

        Ok((system, channels))
    }

    /// Write a configuration back out as TOML
    pub fn export_config<P: AsRef<Path>>(config: &SystemConfig, path: P) -> DaqResult<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(config)
            .map_err(|e| DaqError::configuration("loader", format!("serialize error: {}", e)))?;
        std::fs::write(path, content).map_err(|e| DaqError::storage("write config", path, e))
    }

    fn defaults(reason: String) -> LoadedConfig {
        let system = SystemConfig::default();
        let channels = ChannelConfiguration::default();
        LoadedConfig {
            system,
            channels,
            origin: ConfigOrigin::Defaults(reason),
        }
    }

    /// `DAQ_HARDWARE_SAMPLING_RATE=1000` sets `hardware.sampling_rate`.
    fn apply_environment_overrides(
        &self,
        config: &mut toml::Value,
        vars: impl Iterator<Item = (String, String)>,
    ) {
        for (key, value) in vars {
            let Some(rest) = key.strip_prefix(&self.env_prefix) else {
                continue;
            };
            let Some((section, field)) = Self::split_section(&rest.to_lowercase()) else {
                continue;
            };
            let Some(root) = config.as_table_mut() else {
                return;
            };

            let entry = root
                .entry(section.clone())
                .or_insert_with(|| toml::Value::Table(toml::value::Table::new()));
            if let toml::Value::Table(table) = entry {
                info!(section = %section, field = %field, "Applying environment override");
                table.insert(field, Self::parse_env_value(&value));
            }
        }
    }

    fn split_section(key: &str) -> Option<(String, String)> {
        // Section names may themselves contain underscores (file_settings).
        const SECTIONS: [&str; 5] = ["hardware", "file_settings", "performance", "simulation", "display"];
        let section = SECTIONS
            .iter()
            .filter(|s| key.len() > s.len() + 1 && key.starts_with(&format!("{}_", s)))
            .max_by_key(|s| s.len())?;
        Some((section.to_string(), key[section.len() + 1..].to_string()))
    }

    fn parse_env_value(value: &str) -> toml::Value {
        if let Ok(int_val) = value.parse::<i64>() {
            toml::Value::Integer(int_val)
        } else if let Ok(float_val) = value.parse::<f64>() {
            toml::Value::Float(float_val)
        } else if let Ok(bool_val) = value.parse::<bool>() {
            toml::Value::Boolean(bool_val)
        } else {
            toml::Value::String(value.to_string())
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
