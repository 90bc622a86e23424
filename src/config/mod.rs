// src/config/mod.rs
//! Configuration management
//!
//! [`SystemConfig`] mirrors the on-disk TOML document. It is converted once at
//! startup into the immutable [`ChannelConfiguration`] that the rest of the
//! engine reads.

pub mod constants;
pub mod loader;

pub use constants::*;
pub use loader::ConfigLoader;

use crate::error::{DaqError, DaqResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Complete configuration file model
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SystemConfig {
    #[serde(default)]
    pub hardware: HardwareSettings,

    #[serde(default)]
    pub file_settings: FileSettings,

    #[serde(default)]
    pub performance: PerformanceSettings,

    #[serde(default)]
    pub simulation: SimulationSettings,

    #[serde(default)]
    pub display: DisplaySettings,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analog_channels: Option<Vec<ChannelEntry>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emg_channels: Option<Vec<ChannelEntry>>,
}

/// One channel as written in the configuration file
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct ChannelEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hardware_channel: Option<u32>,
}

/// Device and sampling parameters
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct HardwareSettings {
    #[serde(default = "defaults::device_name")]
    pub device_name: String,

    #[serde(default = "defaults::sampling_rate")]
    pub sampling_rate: f64,

    /// Seconds between acquisition cycles
    #[serde(default = "defaults::update_rate")]
    pub update_rate: f64,

    #[serde(default = "defaults::history_duration")]
    pub history_duration: f64,
}

/// Recording output defaults
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct FileSettings {
    #[serde(default = "defaults::default_directory")]
    pub default_directory: String,

    #[serde(default = "defaults::default_project")]
    pub default_project: String,
}

/// Refresh intervals and device buffering
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PerformanceSettings {
    #[serde(default = "defaults::web_update_interval")]
    pub web_update_interval: u64,

    #[serde(default = "defaults::status_update_interval")]
    pub status_update_interval: u64,

    /// Device buffer size in blocks
    #[serde(default = "defaults::buffer_multiplier")]
    pub buffer_multiplier: usize,
}

/// Synthetic source signal layout
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SimulationSettings {
    /// Leading analog channels that carry the quasi-periodic waveform
    #[serde(default = "defaults::periodic_channels")]
    pub periodic_channels: usize,

    /// Analog channels that behave as sparse binary events
    #[serde(default = "defaults::event_channels")]
    pub event_channels: Vec<usize>,

    #[serde(default = "defaults::event_probability")]
    pub event_probability: f64,

    #[serde(default = "defaults::event_high_level")]
    pub event_high_level: f64,

    /// Per-block probability of an emg burst
    #[serde(default = "defaults::burst_probability")]
    pub burst_probability: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

/// Operator display layout
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct DisplaySettings {
    #[serde(default = "defaults::grid_columns")]
    pub grid_columns: usize,
}

mod defaults {
    use crate::config::constants::*;

    pub fn device_name() -> String { hal::DEFAULT_DEVICE_NAME.to_string() }
    pub fn sampling_rate() -> f64 { signal::DEFAULT_SAMPLING_RATE_HZ }
    pub fn update_rate() -> f64 { signal::DEFAULT_UPDATE_PERIOD_S }
    pub fn history_duration() -> f64 { signal::DEFAULT_HISTORY_DURATION_S }

    pub fn default_directory() -> String { storage::DEFAULT_DIRECTORY.to_string() }
    pub fn default_project() -> String { storage::DEFAULT_PROJECT.to_string() }

    pub fn web_update_interval() -> u64 { display::DEFAULT_WEB_UPDATE_INTERVAL_MS }
    pub fn status_update_interval() -> u64 { display::DEFAULT_STATUS_UPDATE_INTERVAL_MS }
    pub fn buffer_multiplier() -> usize { hal::DEFAULT_BUFFER_MULTIPLIER }

    pub fn periodic_channels() -> usize { simulation::DEFAULT_PERIODIC_CHANNELS }
    pub fn event_channels() -> Vec<usize> { simulation::DEFAULT_EVENT_CHANNELS.to_vec() }
    pub fn event_probability() -> f64 { simulation::DEFAULT_EVENT_PROBABILITY }
    pub fn event_high_level() -> f64 { simulation::DEFAULT_EVENT_HIGH_LEVEL }
    pub fn burst_probability() -> f64 { simulation::DEFAULT_BURST_PROBABILITY }

    pub fn grid_columns() -> usize { display::DEFAULT_GRID_COLUMNS }
}

impl Default for HardwareSettings {
    fn default() -> Self {
        Self {
            device_name: defaults::device_name(),
            sampling_rate: defaults::sampling_rate(),
            update_rate: defaults::update_rate(),
            history_duration: defaults::history_duration(),
        }
    }
}

impl Default for FileSettings {
    fn default() -> Self {
        Self {
            default_directory: defaults::default_directory(),
            default_project: defaults::default_project(),
        }
    }
}

impl Default for PerformanceSettings {
    fn default() -> Self {
        Self {
            web_update_interval: defaults::web_update_interval(),
            status_update_interval: defaults::status_update_interval(),
            buffer_multiplier: defaults::buffer_multiplier(),
        }
    }
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            periodic_channels: defaults::periodic_channels(),
            event_channels: defaults::event_channels(),
            event_probability: defaults::event_probability(),
            event_high_level: defaults::event_high_level(),
            burst_probability: defaults::burst_probability(),
            seed: None,
        }
    }
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            grid_columns: defaults::grid_columns(),
        }
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        let analog = (0..signal::DEFAULT_ANALOG_CHANNEL_COUNT)
            .map(|i| ChannelEntry {
                name: Some(format!("Analog {}", i)),
                short_name: Some(format!("AI-{}", i)),
                hardware_channel: None,
            })
            .collect();

        let emg = signal::DEFAULT_EMG_CHANNELS
            .iter()
            .map(|(name, short, pin)| ChannelEntry {
                name: Some(name.to_string()),
                short_name: Some(short.to_string()),
                hardware_channel: Some(*pin),
            })
            .collect();

        Self {
            hardware: HardwareSettings::default(),
            file_settings: FileSettings::default(),
            performance: PerformanceSettings::default(),
            simulation: SimulationSettings::default(),
            display: DisplaySettings::default(),
            analog_channels: Some(analog),
            emg_channels: Some(emg),
        }
    }
}

/// Semantic role of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelRole {
    Analog,
    Emg,
}

impl fmt::Display for ChannelRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelRole::Analog => write!(f, "analog"),
            ChannelRole::Emg => write!(f, "emg"),
        }
    }
}

/// One logical signal with a fixed column in every sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    /// Column in the sample row
    pub index: usize,
    /// Position within its role group
    pub role_index: usize,
    pub role: ChannelRole,
    pub name: String,
    pub short_name: String,
    /// Device input pin, emg channels only
    pub hardware_pin: Option<u32>,
}

/// Immutable channel and sampling description used by the engine
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelConfiguration {
    analog: Vec<Channel>,
    emg: Vec<Channel>,
    sampling_rate_hz: f64,
    update_period_s: f64,
    history_duration_s: f64,
    device_name: String,
    buffer_multiplier: usize,
}

impl ChannelConfiguration {
    /// Build and validate a configuration from explicit channel lists
    pub fn new(
        analog: Vec<ChannelEntry>,
        emg: Vec<ChannelEntry>,
        sampling_rate_hz: f64,
        update_period_s: f64,
        history_duration_s: f64,
    ) -> DaqResult<Self> {
        let hardware = HardwareSettings {
            sampling_rate: sampling_rate_hz,
            update_rate: update_period_s,
            history_duration: history_duration_s,
            ..HardwareSettings::default()
        };
        Self::build(
            analog,
            emg,
            &hardware,
            hal::DEFAULT_BUFFER_MULTIPLIER,
        )
    }

    /// Configuration with generated labels, handy for tools and tests
    pub fn generic(
        analog_count: usize,
        emg_count: usize,
        sampling_rate_hz: f64,
        update_period_s: f64,
        history_duration_s: f64,
    ) -> DaqResult<Self> {
        Self::new(
            vec![ChannelEntry::default(); analog_count],
            vec![ChannelEntry::default(); emg_count],
            sampling_rate_hz,
            update_period_s,
            history_duration_s,
        )
    }

    /// Convert the file model, failing if a channel list is absent
    pub fn from_system(config: &SystemConfig) -> DaqResult<Self> {
        let analog = config
            .analog_channels
            .clone()
            .ok_or_else(|| DaqError::configuration("analog_channels", "channel list is missing"))?;
        let emg = config
            .emg_channels
            .clone()
            .ok_or_else(|| DaqError::configuration("emg_channels", "channel list is missing"))?;

        Self::build(analog, emg, &config.hardware, config.performance.buffer_multiplier)
    }

    fn build(
        analog: Vec<ChannelEntry>,
        emg: Vec<ChannelEntry>,
        hardware: &HardwareSettings,
        buffer_multiplier: usize,
    ) -> DaqResult<Self> {
        let positive = |field: &str, value: f64| {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(DaqError::configuration(
                    "hardware",
                    format!("{} must be positive, got {}", field, value),
                ))
            }
        };
        positive("sampling_rate", hardware.sampling_rate)?;
        positive("update_rate", hardware.update_rate)?;
        positive("history_duration", hardware.history_duration)?;

        if analog.is_empty() && emg.is_empty() {
            return Err(DaqError::configuration("channels", "at least one channel is required"));
        }
        if buffer_multiplier == 0 {
            return Err(DaqError::configuration("performance", "buffer_multiplier must be at least 1"));
        }

        let analog: Vec<Channel> = analog
            .into_iter()
            .enumerate()
            .map(|(i, entry)| Channel {
                index: i,
                role_index: i,
                role: ChannelRole::Analog,
                name: entry.name.unwrap_or_else(|| format!("Analog {}", i)),
                short_name: entry.short_name.unwrap_or_else(|| format!("AI-{}", i)),
                hardware_pin: None,
            })
            .collect();

        let offset = analog.len();
        let emg: Vec<Channel> = emg
            .into_iter()
            .enumerate()
            .map(|(i, entry)| Channel {
                index: offset + i,
                role_index: i,
                role: ChannelRole::Emg,
                name: entry.name.unwrap_or_else(|| format!("EMG {}", i)),
                short_name: entry.short_name.unwrap_or_else(|| format!("EMG-{}", i)),
                hardware_pin: Some(
                    entry
                        .hardware_channel
                        .unwrap_or(signal::EMG_PIN_BASE + i as u32),
                ),
            })
            .collect();

        let config = Self {
            analog,
            emg,
            sampling_rate_hz: hardware.sampling_rate,
            update_period_s: hardware.update_rate,
            history_duration_s: hardware.history_duration,
            device_name: hardware.device_name.clone(),
            buffer_multiplier,
        };

        if config.block_size() == 0 {
            return Err(DaqError::configuration(
                "hardware",
                format!(
                    "sampling_rate {} x update_rate {} yields an empty block",
                    config.sampling_rate_hz, config.update_period_s
                ),
            ));
        }

        Ok(config)
    }

    pub fn analog_channels(&self) -> &[Channel] {
        &self.analog
    }

    pub fn emg_channels(&self) -> &[Channel] {
        &self.emg
    }

    /// All channels in sample column order
    pub fn channels(&self) -> impl Iterator<Item = &Channel> {
        self.analog.iter().chain(self.emg.iter())
    }

    pub fn analog_count(&self) -> usize {
        self.analog.len()
    }

    pub fn emg_count(&self) -> usize {
        self.emg.len()
    }

    pub fn total_channels(&self) -> usize {
        self.analog.len() + self.emg.len()
    }

    pub fn sampling_rate_hz(&self) -> f64 {
        self.sampling_rate_hz
    }

    pub fn update_period_s(&self) -> f64 {
        self.update_period_s
    }

    pub fn history_duration_s(&self) -> f64 {
        self.history_duration_s
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn buffer_multiplier(&self) -> usize {
        self.buffer_multiplier
    }

    /// Samples per channel produced by one acquisition cycle
    pub fn block_size(&self) -> usize {
        (self.sampling_rate_hz * self.update_period_s).round() as usize
    }

    /// Samples retained for visualization
    pub fn history_capacity(&self) -> usize {
        // Absorb float noise so that exact products do not round up by one.
        let exact = self.sampling_rate_hz * self.history_duration_s;
        ((exact - 1e-9).ceil() as usize).max(1)
    }

    /// Bytes per row in the trial log: timestamp plus one value per channel
    pub fn row_width_bytes(&self) -> usize {
        storage::BYTES_PER_VALUE * (1 + self.total_channels())
    }

    pub fn analog_labels(&self) -> Vec<String> {
        self.analog.iter().map(|c| c.name.clone()).collect()
    }

    pub fn analog_short_labels(&self) -> Vec<String> {
        self.analog.iter().map(|c| c.short_name.clone()).collect()
    }

    pub fn emg_labels(&self) -> Vec<String> {
        self.emg.iter().map(|c| c.name.clone()).collect()
    }

    pub fn emg_short_labels(&self) -> Vec<String> {
        self.emg.iter().map(|c| c.short_name.clone()).collect()
    }

    /// Hardware pin of every emg channel, in emg order
    pub fn emg_pin_map(&self) -> Vec<u32> {
        self.emg.iter().filter_map(|c| c.hardware_pin).collect()
    }

    /// Plot labels in column order, e.g. `AI-0: AI-0` and `EMG-1: L-APB`
    pub fn display_labels(&self) -> Vec<String> {
        self.channels()
            .map(|c| match c.role {
                ChannelRole::Analog => format!("AI-{}: {}", c.role_index, c.short_name),
                ChannelRole::Emg => format!("EMG-{}: {}", c.role_index + 1, c.short_name),
            })
            .collect()
    }
}

impl Default for ChannelConfiguration {
    fn default() -> Self {
        // The built-in file model always converts; fall back to a minimal layout
        // only if the constants are ever edited into an invalid state.
        Self::from_system(&SystemConfig::default()).unwrap_or_else(|_| Self {
            analog: Vec::new(),
            emg: Vec::new(),
            sampling_rate_hz: signal::DEFAULT_SAMPLING_RATE_HZ,
            update_period_s: signal::DEFAULT_UPDATE_PERIOD_S,
            history_duration_s: signal::DEFAULT_HISTORY_DURATION_S,
            device_name: hal::DEFAULT_DEVICE_NAME.to_string(),
            buffer_multiplier: hal::DEFAULT_BUFFER_MULTIPLIER,
        })
    }
}
