// src/hal/types.rs
//! Core types shared by sample sources

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// One time-stamped row of channel values, analog first then emg
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Seconds since the session clock started
    pub timestamp: f64,
    pub values: Vec<f64>,
}

/// One acquisition cycle of samples in column-major layout
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBlock {
    /// One timestamp per sample, strictly increasing
    pub timestamps: Vec<f64>,
    /// `channels[c][i]` is the value of channel `c` at `timestamps[i]`
    pub channels: Vec<Vec<f64>>,
}

impl SampleBlock {
    pub fn new(timestamps: Vec<f64>, channels: Vec<Vec<f64>>) -> Self {
        Self {
            timestamps,
            channels,
        }
    }

    /// Samples per channel
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Row `i` as a [`Sample`]
    pub fn sample(&self, i: usize) -> Option<Sample> {
        let timestamp = *self.timestamps.get(i)?;
        let values = self
            .channels
            .iter()
            .map(|ch| ch.get(i).copied().unwrap_or(0.0))
            .collect();
        Some(Sample { timestamp, values })
    }

    /// Iterate rows in time order
    pub fn samples(&self) -> impl Iterator<Item = Sample> + '_ {
        (0..self.len()).filter_map(move |i| self.sample(i))
    }

    /// Timestamp of the last sample
    pub fn last_timestamp(&self) -> Option<f64> {
        self.timestamps.last().copied()
    }
}

/// Kind of a sample source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Hardware,
    Synthetic,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Hardware => write!(f, "hardware"),
            SourceKind::Synthetic => write!(f, "synthetic"),
        }
    }
}

/// Lifecycle of a sample source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceState {
    Uninitialized,
    /// Channels configured, waiting for the first block
    Armed,
    Streaming,
    Closed,
}

impl fmt::Display for SourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceState::Uninitialized => write!(f, "Uninitialized"),
            SourceState::Armed => write!(f, "Armed"),
            SourceState::Streaming => write!(f, "Streaming"),
            SourceState::Closed => write!(f, "Closed"),
        }
    }
}

/// Channel layout handed to a device driver when a task is opened
#[derive(Debug, Clone, PartialEq)]
pub struct TaskSettings {
    pub device_name: String,
    /// Physical channel names, e.g. `Dev1/ai3`
    pub physical_channels: Vec<String>,
    pub sampling_rate_hz: f64,
    /// Device-side buffer size per channel
    pub buffer_size: usize,
}

/// Timeout for a blocking read of one block
pub fn read_timeout(update_period_s: f64, slack: Duration) -> Duration {
    Duration::from_secs_f64(update_period_s.max(0.0)) + slack
}
