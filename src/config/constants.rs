// src/config/constants.rs
//! System-wide configuration constants and built-in defaults

/// Sampling and channel defaults
pub mod signal {
    pub const DEFAULT_SAMPLING_RATE_HZ: f64 = 2500.0;
    pub const DEFAULT_UPDATE_PERIOD_S: f64 = 0.1;
    pub const DEFAULT_HISTORY_DURATION_S: f64 = 3.0;
    pub const DEFAULT_ANALOG_CHANNEL_COUNT: usize = 16;

    /// Default emg montage: (name, short name, hardware pin)
    pub const DEFAULT_EMG_CHANNELS: [(&str, &str, u32); 4] = [
        ("L_APB", "L-APB", 17),
        ("L-FLEX", "L-FLEX", 27),
        ("L_FDI", "L-FDI", 29),
        ("NC", "NC", 23),
    ];

    /// Pin assigned to emg channel `i` when the file leaves it out
    pub const EMG_PIN_BASE: u32 = 17;
}

/// Hardware abstraction layer constants
pub mod hal {
    use std::time::Duration;

    pub const DEFAULT_DEVICE_NAME: &str = "Dev1";
    pub const DEFAULT_BUFFER_MULTIPLIER: usize = 10;

    /// Emg pins at or above this value are not wired to analog inputs
    pub const MAX_MAPPED_EMG_PIN: u32 = 80;

    /// Extra time granted to a hardware read beyond one update period
    pub const READ_TIMEOUT_SLACK: Duration = Duration::from_secs(1);

    /// Channel opened by the connect probe
    pub const PROBE_CHANNEL_INDEX: u32 = 0;
}

/// Acquisition loop timing
pub mod timing {
    use std::time::Duration;

    /// Subtracted from the pacing sleep to absorb scheduler wake-up latency
    pub const SCHEDULING_ALLOWANCE: Duration = Duration::from_millis(10);

    /// Bounded wait for the loop to observe a stop request
    pub const STOP_JOIN_TIMEOUT: Duration = Duration::from_secs(2);
}

/// Recording output defaults
pub mod storage {
    pub const DEFAULT_DIRECTORY: &str = "data";
    pub const DEFAULT_PROJECT: &str = "swallow_JET";
    pub const METADATA_DIR: &str = "metadata";
    pub const METADATA_SUFFIX: &str = "_metadata";
    pub const LOG_EXTENSION: &str = "bin";
    pub const METADATA_EXTENSION: &str = "json";
    pub const BYTES_PER_VALUE: usize = std::mem::size_of::<f64>();
}

/// Synthetic source defaults
pub mod simulation {
    pub const DEFAULT_PERIODIC_CHANNELS: usize = 4;
    pub const DEFAULT_EVENT_CHANNELS: [usize; 5] = [4, 5, 6, 7, 8];
    pub const DEFAULT_EVENT_PROBABILITY: f64 = 0.05;
    pub const DEFAULT_EVENT_HIGH_LEVEL: f64 = 5.0;
    pub const DEFAULT_BURST_PROBABILITY: f64 = 0.1;

    pub const PERIODIC_AMPLITUDE: f64 = 0.5;
    pub const PERIODIC_NOISE: f64 = 0.1;
    pub const SLOW_AMPLITUDE: f64 = 0.2;
    pub const SLOW_FREQUENCY_HZ: f64 = 0.5;
    pub const SLOW_NOISE: f64 = 0.05;
    pub const EMG_BASELINE_NOISE: f64 = 0.1;
    pub const BURST_AMPLITUDE: f64 = 0.8;
    pub const BURST_CENTER_S: f64 = 0.05;
    pub const BURST_WIDTH_S: f64 = 0.02;
}

/// Operator interface refresh defaults
pub mod display {
    pub const DEFAULT_WEB_UPDATE_INTERVAL_MS: u64 = 100;
    pub const DEFAULT_STATUS_UPDATE_INTERVAL_MS: u64 = 2000;
    pub const DEFAULT_GRID_COLUMNS: usize = 4;
}

/// Configuration file locations
pub mod paths {
    pub const DEFAULT_CONFIG_FILE: &str = "channel_config.toml";
    pub const ENV_PREFIX: &str = "DAQ_";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_emg_montage() {
        assert_eq!(signal::DEFAULT_EMG_CHANNELS.len(), 4);
        assert!(signal::DEFAULT_EMG_CHANNELS
            .iter()
            .all(|(_, _, pin)| *pin < hal::MAX_MAPPED_EMG_PIN));
    }

    #[test]
    fn test_event_channels_are_analog() {
        assert!(simulation::DEFAULT_EVENT_CHANNELS
            .iter()
            .all(|&ch| ch < signal::DEFAULT_ANALOG_CHANNEL_COUNT));
        assert!(timing::SCHEDULING_ALLOWANCE < timing::STOP_JOIN_TIMEOUT);
    }
}
