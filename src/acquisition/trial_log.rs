// src/acquisition/trial_log.rs
//! Binary trial log and its JSON metadata sidecar
//!
//! The log is a headerless sequence of fixed-width rows. Each row holds the
//! timestamp followed by one value per channel, all little-endian `f64`, so a
//! row is `8 * (1 + channels)` bytes and row `k` starts at `k * width`.

use crate::acquisition::naming::{metadata_dir, metadata_path};
use crate::config::ChannelConfiguration;
use crate::config::constants::storage;
use crate::error::{DaqError, DaqResult};
use crate::hal::types::{Sample, SampleBlock};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Sidecar written once per trial after the log is closed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialMetadata {
    pub trial_number: u32,
    /// Sampling rate in Hz
    pub fs: f64,
    pub analog_channels: usize,
    pub emg_channels: usize,
    pub total_channels: usize,
    pub analog_labels: Vec<String>,
    pub muscle_labels: Vec<String>,
    /// Hardware pin of each emg channel
    pub emg_ch_map: Vec<u32>,
    pub device_name: String,
    pub simulation_mode: bool,
    pub rows_written: u64,
    /// Reason the trial ended early, if it did
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_with_error: Option<String>,
    /// Completion time
    pub timestamp: DateTime<Local>,
}

impl TrialMetadata {
    pub fn new(
        trial_number: u32,
        channels: &ChannelConfiguration,
        device_name: &str,
        simulation_mode: bool,
    ) -> Self {
        Self {
            trial_number,
            fs: channels.sampling_rate_hz(),
            analog_channels: channels.analog_count(),
            emg_channels: channels.emg_count(),
            total_channels: channels.total_channels(),
            analog_labels: channels.analog_labels(),
            muscle_labels: channels.emg_labels(),
            emg_ch_map: channels.emg_pin_map(),
            device_name: device_name.to_string(),
            simulation_mode,
            rows_written: 0,
            completed_with_error: None,
            timestamp: Local::now(),
        }
    }
}

/// Appends fixed-width rows to one trial's log file
pub struct TrialLogWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    channel_count: usize,
    row: Vec<u8>,
    rows_written: u64,
}

impl TrialLogWriter {
    /// Create or truncate `path`, creating its directory and `metadata/`
    pub fn open(path: impl AsRef<Path>, channel_count: usize) -> DaqResult<Self> {
        let path = path.as_ref().to_path_buf();

        let meta_dir = metadata_dir(&path);
        fs::create_dir_all(&meta_dir)
            .map_err(|e| DaqError::storage("create directory", &meta_dir, e))?;

        let file = File::create(&path).map_err(|e| DaqError::storage("create", &path, e))?;
        info!(path = %path.display(), channels = channel_count, "Trial log opened");

        Ok(Self {
            path,
            writer: BufWriter::new(file),
            channel_count,
            row: Vec::with_capacity(storage::BYTES_PER_VALUE * (1 + channel_count)),
            rows_written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    pub fn row_width_bytes(&self) -> usize {
        storage::BYTES_PER_VALUE * (1 + self.channel_count)
    }

    /// Append one row; the row is rejected whole if its width is wrong
    pub fn write_sample(&mut self, sample: &Sample) -> DaqResult<()> {
        if sample.values.len() != self.channel_count {
            return Err(DaqError::InvalidInput {
                field: "sample".to_string(),
                value: format!("{} values", sample.values.len()),
                reason: format!("expected {} channel values", self.channel_count),
            });
        }

        self.row.clear();
        self.row.extend_from_slice(&sample.timestamp.to_le_bytes());
        for value in &sample.values {
            self.row.extend_from_slice(&value.to_le_bytes());
        }

        self.writer
            .write_all(&self.row)
            .map_err(|e| DaqError::storage("write", &self.path, e))?;
        self.rows_written += 1;
        Ok(())
    }

    /// Append every sample of a block in time order
    pub fn write_block(&mut self, block: &SampleBlock) -> DaqResult<()> {
        for sample in block.samples() {
            self.write_sample(&sample)?;
        }
        debug!(rows = block.len(), total = self.rows_written, "Block logged");
        Ok(())
    }

    pub fn flush(&mut self) -> DaqResult<()> {
        self.writer
            .flush()
            .map_err(|e| DaqError::storage("flush", &self.path, e))
    }

    /// Flush and close the log, then write the sidecar. Returns its path.
    pub fn close(self, mut metadata: TrialMetadata) -> DaqResult<PathBuf> {
        let Self {
            path,
            writer,
            rows_written,
            ..
        } = self;

        let file = writer
            .into_inner()
            .map_err(|e| DaqError::storage("flush", &path, e.into_error()))?;
        file.sync_all()
            .map_err(|e| DaqError::storage("sync", &path, e))?;
        drop(file);

        metadata.rows_written = rows_written;
        let sidecar = metadata_path(&path);
        let json = serde_json::to_string_pretty(&metadata).map_err(|e| {
            DaqError::storage("serialize metadata", &sidecar, std::io::Error::other(e))
        })?;
        fs::write(&sidecar, json).map_err(|e| DaqError::storage("write", &sidecar, e))?;

        info!(
            path = %path.display(),
            metadata = %sidecar.display(),
            rows = rows_written,
            trial = metadata.trial_number,
            "Trial log closed"
        );
        Ok(sidecar)
    }
}

/// Read a trial log back into rows of `1 + channel_count` values
pub fn read_trial_log(path: impl AsRef<Path>, channel_count: usize) -> DaqResult<Vec<Vec<f64>>> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|e| DaqError::storage("read", path, e))?;
    let width = storage::BYTES_PER_VALUE * (1 + channel_count);

    // A trailing partial row is ignored
    Ok(bytes
        .chunks_exact(width)
        .map(|row| {
            row.chunks_exact(storage::BYTES_PER_VALUE)
                .map(|b| {
                    let mut raw = [0u8; 8];
                    raw.copy_from_slice(b);
                    f64::from_le_bytes(raw)
                })
                .collect()
        })
        .collect())
}
