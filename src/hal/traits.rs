// src/hal/traits.rs
//! Core HAL traits for sample sources and device drivers

use crate::error::DaqResult;
use crate::hal::types::{SampleBlock, SourceKind, SourceState, TaskSettings};
use std::time::Duration;

/// Producer of fixed-size blocks of time-stamped samples.
///
/// A source is probed at connect time, armed when a recording starts and
/// closed when it ends. Closing is idempotent and a closed source may be
/// armed again for the next trial.
pub trait SampleSource: Send {
    fn kind(&self) -> SourceKind;

    fn is_simulated(&self) -> bool {
        self.kind() == SourceKind::Synthetic
    }

    fn device_name(&self) -> &str;

    fn state(&self) -> SourceState;

    /// Check that the device can be reached; does not start acquisition
    fn probe(&mut self) -> DaqResult<()>;

    /// Configure channels and reset the session clock
    fn arm(&mut self) -> DaqResult<()>;

    /// Block until `block_size` samples per channel are available
    fn next_block(&mut self, block_size: usize, timeout: Duration) -> DaqResult<SampleBlock>;

    /// Release the device
    fn close(&mut self) -> DaqResult<()>;
}

/// Vendor driver binding for the acquisition device
pub trait DaqDriver: Send + Sync {
    /// Short read of one channel to verify the device answers
    fn probe(&self, device_name: &str, physical_channel: &str) -> DaqResult<()>;

    /// Create a continuous acquisition task
    fn open_task(&self, settings: &TaskSettings) -> DaqResult<Box<dyn DaqTask>>;
}

/// A configured, continuous acquisition task on the device
pub trait DaqTask: Send {
    fn start(&mut self) -> DaqResult<()>;

    /// Returns one vector per physical channel
    fn read(&mut self, samples_per_channel: usize, timeout: Duration) -> DaqResult<Vec<Vec<f64>>>;

    fn stop(&mut self) -> DaqResult<()>;

    fn close(&mut self) -> DaqResult<()>;
}
