// src/hal/simulator.rs
//! Synthetic sample source
//!
//! Produces plausible analog and emg signals without touching hardware:
//! - leading analog channels carry a quasi-periodic waveform at `index + 1` Hz
//! - a configurable subset of analog channels are sparse binary events
//! - the remaining analog channels are a slow 0.5 Hz waveform
//! - emg channels are baseline noise with an occasional Gaussian burst

use crate::config::constants::simulation;
use crate::config::{ChannelConfiguration, SimulationSettings};
use crate::error::{DaqError, DaqResult};
use crate::hal::traits::SampleSource;
use crate::hal::types::{SampleBlock, SourceKind, SourceState};
use crate::utils::time::{SessionClock, TimeProvider};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;
use std::time::Duration;
use tracing::debug;

/// Signal shape assigned to one analog channel
#[derive(Debug, Clone, Copy, PartialEq)]
enum AnalogShape {
    Periodic { frequency_hz: f64 },
    Event,
    Slow,
}

pub struct SyntheticSource {
    device_name: String,
    shapes: Vec<AnalogShape>,
    emg_count: usize,
    settings: SimulationSettings,
    rng: StdRng,
    clock: SessionClock,
    state: SourceState,
}

impl SyntheticSource {
    pub fn new(channels: &ChannelConfiguration, settings: SimulationSettings) -> Self {
        let clock = SessionClock::monotonic(channels.sampling_rate_hz());
        Self::with_clock(channels, settings, clock)
    }

    /// Source driven by an injected time provider
    pub fn with_time_provider(
        channels: &ChannelConfiguration,
        settings: SimulationSettings,
        provider: Box<dyn TimeProvider>,
    ) -> Self {
        let clock = SessionClock::new(channels.sampling_rate_hz(), provider);
        Self::with_clock(channels, settings, clock)
    }

    fn with_clock(
        channels: &ChannelConfiguration,
        settings: SimulationSettings,
        clock: SessionClock,
    ) -> Self {
        let rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let shapes = (0..channels.analog_count())
            .map(|i| {
                if i < settings.periodic_channels {
                    AnalogShape::Periodic {
                        frequency_hz: (i + 1) as f64,
                    }
                } else if settings.event_channels.contains(&i) {
                    AnalogShape::Event
                } else {
                    AnalogShape::Slow
                }
            })
            .collect();

        Self {
            device_name: format!("{} (simulated)", channels.device_name()),
            shapes,
            emg_count: channels.emg_count(),
            settings,
            rng,
            clock,
            state: SourceState::Uninitialized,
        }
    }

    /// Standard normal sample via Box-Muller
    fn gaussian(&mut self) -> f64 {
        // 1 - u keeps the argument of ln in (0, 1]
        let u1 = 1.0 - self.rng.gen::<f64>();
        let u2 = self.rng.gen::<f64>();
        (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
    }

    fn analog_channel(&mut self, shape: AnalogShape, timestamps: &[f64]) -> Vec<f64> {
        timestamps
            .iter()
            .map(|&t| match shape {
                AnalogShape::Periodic { frequency_hz } => {
                    simulation::PERIODIC_AMPLITUDE * (2.0 * PI * frequency_hz * t).sin()
                        + simulation::PERIODIC_NOISE * self.gaussian()
                }
                AnalogShape::Event => {
                    if self.rng.gen::<f64>() < self.settings.event_probability {
                        self.settings.event_high_level
                    } else {
                        0.0
                    }
                }
                AnalogShape::Slow => {
                    simulation::SLOW_AMPLITUDE
                        * (2.0 * PI * simulation::SLOW_FREQUENCY_HZ * t).sin()
                        + simulation::SLOW_NOISE * self.gaussian()
                }
            })
            .collect()
    }

    fn emg_channel(&mut self, timestamps: &[f64]) -> Vec<f64> {
        let mut values: Vec<f64> = timestamps
            .iter()
            .map(|_| simulation::EMG_BASELINE_NOISE * self.gaussian())
            .collect();

        if let Some(&t0) = timestamps.first() {
            if self.rng.gen::<f64>() < self.settings.burst_probability {
                let center = t0 + simulation::BURST_CENTER_S;
                for (value, &t) in values.iter_mut().zip(timestamps) {
                    let z = (t - center) / simulation::BURST_WIDTH_S;
                    *value += simulation::BURST_AMPLITUDE * (-z * z).exp();
                }
            }
        }

        values
    }
}

impl SampleSource for SyntheticSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Synthetic
    }

    fn device_name(&self) -> &str {
        &self.device_name
    }

    fn state(&self) -> SourceState {
        self.state
    }

    fn probe(&mut self) -> DaqResult<()> {
        Ok(())
    }

    fn arm(&mut self) -> DaqResult<()> {
        self.state = SourceState::Armed;
        Ok(())
    }

    /// Blocks until the clock reaches the end of the previous block, the
    /// way a device read waits for its samples.
    fn next_block(&mut self, block_size: usize, timeout: Duration) -> DaqResult<SampleBlock> {
        match self.state {
            SourceState::Closed => {
                return Err(DaqError::SourceClosed {
                    device: self.device_name.clone(),
                })
            }
            SourceState::Uninitialized => {
                return Err(DaqError::invalid_state("read a block", self.state))
            }
            SourceState::Armed => {
                self.clock.reset();
                self.state = SourceState::Streaming;
            }
            SourceState::Streaming => {
                if !self.clock.wait_for_next_start(timeout) {
                    return Err(DaqError::AcquisitionTimeout {
                        device: self.device_name.clone(),
                        timeout,
                    });
                }
            }
        }

        let timestamps = self.clock.ramp(block_size);

        let shapes = self.shapes.clone();
        let mut channels = Vec::with_capacity(shapes.len() + self.emg_count);
        for shape in shapes {
            channels.push(self.analog_channel(shape, &timestamps));
        }
        for _ in 0..self.emg_count {
            channels.push(self.emg_channel(&timestamps));
        }

        debug!(samples = block_size, start = timestamps.first().copied().unwrap_or(0.0), "Synthetic block generated");
        Ok(SampleBlock::new(timestamps, channels))
    }

    fn close(&mut self) -> DaqResult<()> {
        self.state = SourceState::Closed;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::utils::time::MockTimeProvider;
    use std::sync::Arc;

    fn seeded(seed: u64) -> SimulationSettings {
        SimulationSettings {
            seed: Some(seed),
            ..SimulationSettings::default()
        }
    }

    fn armed_source(channels: &ChannelConfiguration) -> (SyntheticSource, Arc<MockTimeProvider>) {
        let provider = Arc::new(MockTimeProvider::new());
        let mut source =
            SyntheticSource::with_time_provider(channels, seeded(7), Box::new(provider.clone()));
        source.arm().unwrap();
        (source, provider)
    }

    #[test]
    fn test_block_shape() {
        let channels = ChannelConfiguration::default();
        let (mut source, _provider) = armed_source(&channels);

        let block = source
            .next_block(channels.block_size(), Duration::from_secs(1))
            .unwrap();

        assert_eq!(block.len(), 250);
        assert_eq!(block.channel_count(), 20);
        assert!(block.channels.iter().all(|ch| ch.len() == 250));
        assert!(block.channels.iter().flatten().all(|v| v.is_finite()));
        assert_eq!(source.state(), SourceState::Streaming);
    }

    #[test]
    fn test_event_channels_are_binary() {
        let channels = ChannelConfiguration::default();
        let (mut source, _provider) = armed_source(&channels);

        for _ in 0..4 {
            let block = source.next_block(250, Duration::from_secs(1)).unwrap();
            for ch in 4..=8 {
                assert!(block.channels[ch].iter().all(|&v| v == 0.0 || v == 5.0));
            }
        }
    }

    #[test]
    fn test_event_probability_extremes() {
        let channels = ChannelConfiguration::generic(6, 0, 1000.0, 0.1, 1.0).unwrap();
        let settings = SimulationSettings {
            event_probability: 1.0,
            seed: Some(1),
            ..SimulationSettings::default()
        };
        let mut source = SyntheticSource::new(&channels, settings);
        source.arm().unwrap();

        let block = source.next_block(100, Duration::from_secs(1)).unwrap();
        assert!(block.channels[4].iter().all(|&v| v == 5.0));
        assert!(block.channels[5].iter().all(|&v| v == 5.0));
    }

    #[test]
    fn test_guaranteed_emg_burst() {
        let channels = ChannelConfiguration::generic(0, 1, 1000.0, 0.1, 1.0).unwrap();
        let settings = SimulationSettings {
            burst_probability: 1.0,
            seed: Some(3),
            ..SimulationSettings::default()
        };
        let mut source = SyntheticSource::new(&channels, settings);
        source.arm().unwrap();

        let block = source.next_block(100, Duration::from_secs(1)).unwrap();
        // Peak sits 50 ms into the block
        let peak = block.channels[0][50];
        let edge = block.channels[0][0];
        assert!(peak > edge);
        assert!(peak > 0.3);
    }

    #[test]
    fn test_timestamps_contiguous_across_blocks() {
        let channels = ChannelConfiguration::generic(2, 1, 1000.0, 0.1, 1.0).unwrap();
        let (mut source, _provider) = armed_source(&channels);

        let first = source.next_block(100, Duration::from_secs(1)).unwrap();
        let second = source.next_block(100, Duration::from_secs(1)).unwrap();

        assert!(first.timestamps.windows(2).all(|w| w[1] > w[0]));
        let gap = second.timestamps[0] - first.last_timestamp().unwrap();
        assert!((gap - 0.001).abs() < 1e-9);
    }

    #[test]
    fn test_blocks_are_paced_by_the_clock() {
        let channels = ChannelConfiguration::generic(2, 1, 1000.0, 0.1, 1.0).unwrap();
        let (mut source, provider) = armed_source(&channels);

        for _ in 0..10 {
            let block = source.next_block(100, Duration::from_secs(1)).unwrap();
            // A block is never handed out before its first sample is due
            assert!(block.timestamps[0] <= provider.elapsed().as_secs_f64() + 1e-9);
        }
        assert!((provider.elapsed().as_secs_f64() - 0.9).abs() < 1e-9);

        // Waiting longer than the read timeout is a timeout
        let err = source.next_block(100, Duration::from_millis(10)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AcquisitionTimeout);
    }

    #[test]
    fn test_read_requires_arm_and_fails_after_close() {
        let channels = ChannelConfiguration::generic(1, 1, 1000.0, 0.1, 1.0).unwrap();
        let mut source = SyntheticSource::new(&channels, seeded(9));

        let err = source.next_block(100, Duration::from_secs(1)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);

        source.arm().unwrap();
        source.close().unwrap();
        source.close().unwrap();
        let err = source.next_block(100, Duration::from_secs(1)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SourceClosed);

        source.arm().unwrap();
        assert!(source.next_block(100, Duration::from_secs(1)).is_ok());
    }

    #[test]
    fn test_rearm_restarts_clock() {
        let channels = ChannelConfiguration::generic(1, 0, 1000.0, 0.1, 1.0).unwrap();
        let (mut source, provider) = armed_source(&channels);

        source.next_block(100, Duration::from_secs(1)).unwrap();
        provider.advance_by(Duration::from_secs(5));
        source.close().unwrap();
        source.arm().unwrap();

        let block = source.next_block(100, Duration::from_secs(1)).unwrap();
        assert_eq!(block.timestamps[0], 0.0);
    }

    #[test]
    fn test_seeded_sources_are_reproducible() {
        let channels = ChannelConfiguration::generic(3, 1, 1000.0, 0.1, 1.0).unwrap();
        let (mut a, _pa) = armed_source(&channels);
        let (mut b, _pb) = armed_source(&channels);

        let block_a = a.next_block(100, Duration::from_secs(1)).unwrap();
        let block_b = b.next_block(100, Duration::from_secs(1)).unwrap();
        assert_eq!(block_a, block_b);
        assert!(a.is_simulated());
    }
}
