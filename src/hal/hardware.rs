// src/hal/hardware.rs
//! Hardware-backed sample source
//!
//! Wraps a vendor [`DaqDriver`]. One physical input is opened per analog
//! channel (`ai0..aiN`) plus one per emg channel whose pin the device can
//! address. Timestamps come from the host session clock, not the device.

use crate::config::constants::hal as hal_constants;
use crate::config::ChannelConfiguration;
use crate::error::{log_cleanup_failure, DaqError, DaqResult};
use crate::hal::traits::{DaqDriver, DaqTask, SampleSource};
use crate::hal::types::{SampleBlock, SourceKind, SourceState, TaskSettings};
use crate::utils::time::{SessionClock, TimeProvider};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Where each sample column comes from in a task read
#[derive(Debug, Clone, Copy, PartialEq)]
enum ColumnSource {
    /// Index into the task's physical channel list
    Task(usize),
    /// No physical input, zero-filled
    Unmapped,
}

pub struct HardwareSource {
    driver: Option<Arc<dyn DaqDriver>>,
    device_name: String,
    sampling_rate_hz: f64,
    buffer_size: usize,
    physical_channels: Vec<String>,
    columns: Vec<ColumnSource>,
    task: Option<Box<dyn DaqTask>>,
    clock: SessionClock,
    state: SourceState,
}

impl HardwareSource {
    /// `driver` is `None` on hosts without the vendor runtime
    pub fn new(channels: &ChannelConfiguration, driver: Option<Arc<dyn DaqDriver>>) -> Self {
        let clock = SessionClock::monotonic(channels.sampling_rate_hz());
        Self::with_clock(channels, driver, clock)
    }

    pub fn with_time_provider(
        channels: &ChannelConfiguration,
        driver: Option<Arc<dyn DaqDriver>>,
        provider: Box<dyn TimeProvider>,
    ) -> Self {
        let clock = SessionClock::new(channels.sampling_rate_hz(), provider);
        Self::with_clock(channels, driver, clock)
    }

    fn with_clock(
        channels: &ChannelConfiguration,
        driver: Option<Arc<dyn DaqDriver>>,
        clock: SessionClock,
    ) -> Self {
        let device = channels.device_name().to_string();
        let mut physical_channels = Vec::with_capacity(channels.total_channels());
        let mut columns = Vec::with_capacity(channels.total_channels());

        for i in 0..channels.analog_count() {
            columns.push(ColumnSource::Task(physical_channels.len()));
            physical_channels.push(physical_channel(&device, i as u32));
        }

        for channel in channels.emg_channels() {
            match channel.hardware_pin {
                Some(pin) if pin < hal_constants::MAX_MAPPED_EMG_PIN => {
                    columns.push(ColumnSource::Task(physical_channels.len()));
                    physical_channels.push(physical_channel(&device, pin));
                }
                _ => {
                    warn!(channel = %channel.name, pin = ?channel.hardware_pin, "Emg channel has no addressable input, it will read as zero");
                    columns.push(ColumnSource::Unmapped);
                }
            }
        }

        Self {
            driver,
            device_name: device,
            sampling_rate_hz: channels.sampling_rate_hz(),
            buffer_size: channels.block_size() * channels.buffer_multiplier(),
            physical_channels,
            columns,
            task: None,
            clock,
            state: SourceState::Uninitialized,
        }
    }

    /// Physical inputs opened when armed, e.g. `Dev1/ai17`
    pub fn physical_channels(&self) -> &[String] {
        &self.physical_channels
    }

    fn driver(&self) -> DaqResult<&Arc<dyn DaqDriver>> {
        self.driver.as_ref().ok_or_else(|| DaqError::DeviceUnavailable {
            device: self.device_name.clone(),
        })
    }

    fn release_task(&mut self) {
        if let Some(mut task) = self.task.take() {
            log_cleanup_failure("hardware task stop", task.stop());
            log_cleanup_failure("hardware task close", task.close());
        }
    }

    /// Match the task's channel count to the expected physical layout
    fn repair_channel_count(&self, mut data: Vec<Vec<f64>>, samples: usize) -> Vec<Vec<f64>> {
        let expected = self.physical_channels.len();
        if data.len() != expected {
            warn!(
                device = %self.device_name,
                expected,
                received = data.len(),
                "Channel count mismatch, padding or truncating"
            );
            data.resize_with(expected, || vec![0.0; samples]);
        }
        data
    }

    fn assemble(&self, data: Vec<Vec<f64>>, samples: usize) -> Vec<Vec<f64>> {
        self.columns
            .iter()
            .map(|column| match column {
                ColumnSource::Task(i) => {
                    let mut values = data.get(*i).cloned().unwrap_or_default();
                    values.resize(samples, 0.0);
                    values
                }
                ColumnSource::Unmapped => vec![0.0; samples],
            })
            .collect()
    }
}

fn physical_channel(device: &str, input: u32) -> String {
    format!("{}/ai{}", device, input)
}

impl SampleSource for HardwareSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Hardware
    }

    fn device_name(&self) -> &str {
        &self.device_name
    }

    fn state(&self) -> SourceState {
        self.state
    }

    fn probe(&mut self) -> DaqResult<()> {
        let driver = self.driver()?;
        let channel = physical_channel(&self.device_name, hal_constants::PROBE_CHANNEL_INDEX);
        driver
            .probe(&self.device_name, &channel)
            .map_err(|e| DaqError::ConnectionFailed {
                device: self.device_name.clone(),
                reason: e.to_string(),
            })?;
        info!(device = %self.device_name, channel = %channel, "Device probe succeeded");
        Ok(())
    }

    fn arm(&mut self) -> DaqResult<()> {
        self.release_task();

        let settings = TaskSettings {
            device_name: self.device_name.clone(),
            physical_channels: self.physical_channels.clone(),
            sampling_rate_hz: self.sampling_rate_hz,
            buffer_size: self.buffer_size,
        };

        let as_config_error = |e: DaqError| match e {
            DaqError::DeviceConfig { .. } | DaqError::DeviceUnavailable { .. } => e,
            other => DaqError::DeviceConfig {
                channel: settings.physical_channels.join(","),
                reason: other.to_string(),
            },
        };

        let mut task = self
            .driver()?
            .open_task(&settings)
            .map_err(as_config_error)?;

        if let Err(e) = task.start() {
            log_cleanup_failure("hardware task close", task.close());
            return Err(as_config_error(e));
        }

        info!(
            device = %self.device_name,
            channels = self.physical_channels.len(),
            rate_hz = self.sampling_rate_hz,
            buffer = self.buffer_size,
            "Hardware task armed"
        );
        self.task = Some(task);
        self.state = SourceState::Armed;
        Ok(())
    }

    fn next_block(&mut self, block_size: usize, timeout: Duration) -> DaqResult<SampleBlock> {
        if self.state == SourceState::Armed {
            self.clock.reset();
            self.state = SourceState::Streaming;
        }

        let Some(task) = self.task.as_mut() else {
            return Err(match self.state {
                SourceState::Uninitialized => DaqError::invalid_state("read a block", self.state),
                _ => DaqError::SourceClosed {
                    device: self.device_name.clone(),
                },
            });
        };

        let data = task.read(block_size, timeout)?;

        // A short read yields a short block, never a longer one
        let samples = data
            .iter()
            .map(Vec::len)
            .min()
            .unwrap_or(0)
            .min(block_size);
        if samples < block_size {
            warn!(device = %self.device_name, requested = block_size, received = samples, "Short read from device");
        }

        let data = self.repair_channel_count(data, samples);
        let channels = self.assemble(data, samples);
        let timestamps = self.clock.ramp(samples);

        debug!(device = %self.device_name, samples, "Hardware block read");
        Ok(SampleBlock::new(timestamps, channels))
    }

    fn close(&mut self) -> DaqResult<()> {
        if self.task.is_some() {
            info!(device = %self.device_name, "Releasing hardware task");
        }
        self.release_task();
        self.state = SourceState::Closed;
        Ok(())
    }
}

impl Drop for HardwareSource {
    fn drop(&mut self) {
        self.release_task();
    }
}
