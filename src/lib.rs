//! EMG-DAQ: multi-channel analog/EMG acquisition and buffering engine
//!
//! This library samples a fixed set of analog and EMG channels, keeps a
//! rolling history for live display and logs every sample of a recording
//! trial to a fixed-width binary file. It features:
//!
//! - Sample sources for DAQ hardware and a synthetic signal generator
//! - Bounded history buffer with consistent snapshots
//! - Binary trial logs with JSON metadata sidecars
//! - Session state machine driving a dedicated acquisition thread
//! - TOML configuration with built-in defaults
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use emg_daq::acquisition::{AcquisitionSession, RecordingOptions};
//! use emg_daq::config::ConfigLoader;
//! use emg_daq::hal::SyntheticSource;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let loaded = ConfigLoader::new().load();
//!     let source = SyntheticSource::new(&loaded.channels, loaded.system.simulation.clone());
//!     let session = AcquisitionSession::new(loaded.channels.clone(), Box::new(source))
//!         .with_system_config(&loaded.system);
//!
//!     session.connect()?;
//!     session.start_recording_with(RecordingOptions { max_blocks: Some(50) })?;
//!     std::thread::sleep(std::time::Duration::from_secs(5));
//!
//!     if let Some(snapshot) = session.query_snapshot(1.0) {
//!         println!("{} samples in the last second", snapshot.len());
//!     }
//!     println!("{}", session.stop_recording()?);
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]

pub mod acquisition;
pub mod config;
pub mod error;
pub mod hal;
pub mod utils;

// Re-export commonly used types for convenience
pub use acquisition::{
    AcquisitionSession, CommandOutcome, HistoryBuffer, HistorySnapshot, RecordingOptions,
    SessionState, SessionStatus, TrialLogWriter, TrialMetadata,
};
pub use config::{ChannelConfiguration, ConfigLoader, SystemConfig};
pub use error::{DaqError, DaqResult, ErrorKind, FailureReport};
pub use hal::{DaqDriver, DaqTask, HardwareSource, SampleBlock, SampleSource, SyntheticSource};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get library information
pub fn version_info() -> VersionInfo {
    VersionInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: "Multi-channel analog/EMG acquisition and buffering engine".to_string(),
        features: vec![
            "Hardware and synthetic sample sources".to_string(),
            "Bounded history with atomic snapshots".to_string(),
            "Fixed-width binary trial logs".to_string(),
            "TOML configuration with defaults".to_string(),
        ],
    }
}

/// Library version information
#[derive(Debug, Clone)]
pub struct VersionInfo {
    /// Library name
    pub name: String,
    /// Version string
    pub version: String,
    /// Description
    pub description: String,
    /// List of features
    pub features: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_info() {
        let info = version_info();
        assert_eq!(info.name, NAME);
        assert_eq!(info.version, VERSION);
        assert!(!info.features.is_empty());
    }

    #[test]
    fn test_constants() {
        assert!(!VERSION.is_empty());
        assert!(!NAME.is_empty());
    }
}
