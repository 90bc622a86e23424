// src/acquisition/session.rs
//! Acquisition session: lifecycle state machine and the acquisition loop
//!
//! `Idle -> Connected -> Recording -> Connected`. While recording, a
//! dedicated thread pulls blocks from the sample source, appends them to the
//! history buffer and the trial log, then paces itself to the update period.

use crate::acquisition::history::{HistoryBuffer, HistorySnapshot};
use crate::acquisition::naming::RecordingSettings;
use crate::acquisition::trial_log::{TrialLogWriter, TrialMetadata};
use crate::config::constants::{hal as hal_constants, timing};
use crate::config::{ChannelConfiguration, DisplaySettings, PerformanceSettings, SystemConfig};
use crate::error::{log_cleanup_failure, DaqError, DaqResult, FailureReport};
use crate::hal::traits::SampleSource;
use crate::hal::types::{read_timeout, SourceState};
use chrono::Local;
use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Lifecycle state of the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Idle,
    Connected,
    Recording,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "Idle"),
            SessionState::Connected => write!(f, "Connected"),
            SessionState::Recording => write!(f, "Recording"),
        }
    }
}

/// Human-readable result of an accepted command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutcome {
    pub message: String,
}

impl CommandOutcome {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for CommandOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Per-recording options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordingOptions {
    /// Stop acquiring after this many blocks; the session stays in
    /// `Recording` until `stop_recording` is called.
    pub max_blocks: Option<u64>,
}

impl RecordingOptions {
    /// Quota covering at least `duration_s` of data
    pub fn for_duration(duration_s: f64, channels: &ChannelConfiguration) -> Self {
        let blocks = (duration_s / channels.update_period_s()).ceil().max(1.0) as u64;
        Self {
            max_blocks: Some(blocks),
        }
    }
}

/// Read-only status view for the control surface
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub state: SessionState,
    pub connected: bool,
    pub recording: bool,
    pub simulation_mode: bool,
    pub trial_number: u32,
    pub device_name: String,
    pub current_directory: String,
    pub current_project: String,
    pub default_directory: String,
    pub default_project: String,
    pub sampling_rate_hz: f64,
    pub analog_channels: usize,
    pub emg_channels: usize,
    pub history_duration_s: f64,
    pub web_update_interval_ms: u64,
    pub status_update_interval_ms: u64,
    pub grid_columns: usize,
    /// Blocks acquired in the current or last trial
    pub blocks_recorded: u64,
    pub log_path: Option<PathBuf>,
    pub last_error: Option<FailureReport>,
}

/// History reshaped into labelled per-channel series for plotting
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlotData {
    pub timestamps: Vec<f64>,
    pub series: Vec<Vec<f64>>,
    pub labels: Vec<String>,
    pub analog_count: usize,
    pub emg_count: usize,
}

/// State shared between the control surface and the acquisition loop
struct SharedState {
    state: RwLock<SessionState>,
    trial: AtomicU32,
    blocks_recorded: AtomicU64,
    last_error: Mutex<Option<FailureReport>>,
}

impl SharedState {
    fn state(&self) -> SessionState {
        *self.state.read()
    }

    fn set_state(&self, state: SessionState) {
        *self.state.write() = state;
    }

    /// Move `Recording -> Connected` and advance the trial counter, once per
    /// trial. Returns false if someone else already finished `trial`.
    ///
    /// Called by `stop_recording` and by the loop when a failure ends the
    /// trial. A failed trial still leaves a log and sidecar under its number,
    /// so the counter advances either way and no two logs share a trial number.
    fn finish_trial(&self, trial: u32) -> bool {
        let mut state = self.state.write();
        if *state == SessionState::Recording && self.trial.load(Ordering::SeqCst) == trial {
            self.trial.store(trial + 1, Ordering::SeqCst);
            *state = SessionState::Connected;
            true
        } else {
            false
        }
    }
}

/// What the loop reports once it has closed the trial log
#[derive(Debug)]
struct LoopReport {
    rows: u64,
    failure: Option<FailureReport>,
    metadata_path: Option<PathBuf>,
}

struct ActiveRecording {
    trial: u32,
    log_path: PathBuf,
    stop_tx: Sender<()>,
    done_rx: Receiver<LoopReport>,
    handle: JoinHandle<()>,
}

/// Owns the sample source, history and trial lifecycle
pub struct AcquisitionSession {
    channels: ChannelConfiguration,
    performance: PerformanceSettings,
    display: DisplaySettings,
    simulated: bool,
    device_name: String,
    source: Arc<Mutex<Box<dyn SampleSource>>>,
    history: Arc<Mutex<HistoryBuffer>>,
    settings: RwLock<RecordingSettings>,
    shared: Arc<SharedState>,
    /// Control lock; serializes commands and holds the running loop
    active: Mutex<Option<ActiveRecording>>,
}

impl AcquisitionSession {
    pub fn new(channels: ChannelConfiguration, source: Box<dyn SampleSource>) -> Self {
        let history = HistoryBuffer::new(channels.history_capacity());
        Self {
            simulated: source.is_simulated(),
            device_name: source.device_name().to_string(),
            performance: PerformanceSettings::default(),
            display: DisplaySettings::default(),
            source: Arc::new(Mutex::new(source)),
            history: Arc::new(Mutex::new(history)),
            settings: RwLock::new(RecordingSettings::default()),
            shared: Arc::new(SharedState {
                state: RwLock::new(SessionState::Idle),
                trial: AtomicU32::new(1),
                blocks_recorded: AtomicU64::new(0),
                last_error: Mutex::new(None),
            }),
            active: Mutex::new(None),
            channels,
        }
    }

    /// Take refresh intervals, layout and output defaults from the file model
    pub fn with_system_config(mut self, system: &SystemConfig) -> Self {
        self.performance = system.performance.clone();
        self.display = system.display.clone();
        self.settings = RwLock::new(RecordingSettings::new(&system.file_settings));
        self
    }

    pub fn channels(&self) -> &ChannelConfiguration {
        &self.channels
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    pub fn trial_number(&self) -> u32 {
        self.shared.trial.load(Ordering::SeqCst)
    }

    pub fn is_simulated(&self) -> bool {
        self.simulated
    }

    pub fn blocks_recorded(&self) -> u64 {
        self.shared.blocks_recorded.load(Ordering::SeqCst)
    }

    /// Failure that ended the last recording, if any
    pub fn last_error(&self) -> Option<FailureReport> {
        self.shared.last_error.lock().clone()
    }

    fn lock_source(
        &self,
        operation: &str,
    ) -> DaqResult<parking_lot::MutexGuard<'_, Box<dyn SampleSource>>> {
        // A detached loop still owns the source until it finalizes
        self.source
            .try_lock()
            .ok_or_else(|| {
                DaqError::invalid_state(operation, "the previous acquisition loop is still running")
            })
    }

    /// Probe the device and move to `Connected`
    pub fn connect(&self) -> DaqResult<CommandOutcome> {
        let _control = self.active.lock();

        match self.shared.state() {
            SessionState::Recording => {
                return Err(DaqError::invalid_state("connect", SessionState::Recording))
            }
            SessionState::Connected => {
                return Ok(CommandOutcome::new(format!(
                    "Already connected to {}",
                    self.device_name
                )))
            }
            SessionState::Idle => {}
        }

        let mut source = self.lock_source("connect")?;
        if let Err(err) = source.probe() {
            warn!(device = %self.device_name, error = %err, "Connect failed");
            return Err(err);
        }
        drop(source);

        self.shared.set_state(SessionState::Connected);
        info!(device = %self.device_name, simulated = self.is_simulated(), "Session connected");

        let mode = if self.is_simulated() { "simulation" } else { "hardware" };
        Ok(CommandOutcome::new(format!(
            "Connected to {} ({} mode)",
            self.device_name, mode
        )))
    }

    pub fn start_recording(&self) -> DaqResult<CommandOutcome> {
        self.start_recording_with(RecordingOptions::default())
    }

    /// Open a new trial log and launch the acquisition loop
    pub fn start_recording_with(&self, options: RecordingOptions) -> DaqResult<CommandOutcome> {
        let mut active = self.active.lock();

        let state = self.shared.state();
        if state != SessionState::Connected {
            return Err(DaqError::invalid_state("start recording", state));
        }

        if let Some(previous) = active.take() {
            reap(previous);
        }

        let trial = self.trial_number();
        let log_path = self.settings.read().trial_log_path(trial, Local::now());

        let mut source = self.lock_source("start recording")?;
        let writer = TrialLogWriter::open(&log_path, self.channels.total_channels())?;

        if source.state() != SourceState::Armed {
            if let Err(err) = source.arm() {
                drop(writer);
                log_cleanup_failure(
                    "unused trial log",
                    std::fs::remove_file(&log_path)
                        .map_err(|e| DaqError::storage("remove", &log_path, e)),
                );
                warn!(device = %self.device_name, error = %err, "Could not arm sample source");
                return Err(err);
            }
        }
        drop(source);

        self.history.lock().clear();
        self.shared.blocks_recorded.store(0, Ordering::SeqCst);
        *self.shared.last_error.lock() = None;

        let (stop_tx, stop_rx) = bounded(1);
        let (done_tx, done_rx) = bounded(1);
        let worker = AcquisitionLoop {
            trial,
            channels: self.channels.clone(),
            max_blocks: options.max_blocks,
            device_name: self.device_name.clone(),
            simulated: self.is_simulated(),
            source: Arc::clone(&self.source),
            history: Arc::clone(&self.history),
            shared: Arc::clone(&self.shared),
            writer,
            stop_rx,
            done_tx,
        };

        // Recording must be visible before the loop can finish the trial
        self.shared.set_state(SessionState::Recording);
        let handle = match thread::Builder::new()
            .name(format!("acquisition-trial-{}", trial))
            .spawn(move || worker.run())
        {
            Ok(handle) => handle,
            Err(e) => {
                self.shared.set_state(SessionState::Connected);
                return Err(DaqError::configuration(
                    "acquisition",
                    format!("cannot spawn acquisition thread: {}", e),
                ));
            }
        };

        info!(
            trial,
            path = %log_path.display(),
            block_size = self.channels.block_size(),
            max_blocks = ?options.max_blocks,
            "Recording started"
        );

        let message = format!("Recording started: trial {} -> {}", trial, log_path.display());
        *active = Some(ActiveRecording {
            trial,
            log_path,
            stop_tx,
            done_rx,
            handle,
        });
        Ok(CommandOutcome::new(message))
    }

    /// Halt the loop, wait for it to close the trial log, advance the trial
    pub fn stop_recording(&self) -> DaqResult<CommandOutcome> {
        let mut active = self.active.lock();

        let state = self.shared.state();
        if state != SessionState::Recording {
            return Err(DaqError::invalid_state("stop recording", state));
        }
        let Some(recording) = active.take() else {
            return Err(DaqError::invalid_state("stop recording", "no acquisition loop is running"));
        };

        // A full channel means a stop is already pending
        let _ = recording.stop_tx.try_send(());

        let report = match recording.done_rx.recv_timeout(timing::STOP_JOIN_TIMEOUT) {
            Ok(report) => {
                if recording.handle.join().is_err() {
                    warn!(trial = recording.trial, "Acquisition thread panicked during shutdown");
                }
                Some(report)
            }
            Err(_) => {
                warn!(
                    trial = recording.trial,
                    timeout = ?timing::STOP_JOIN_TIMEOUT,
                    "Acquisition loop did not stop in time, detaching it"
                );
                None
            }
        };

        self.shared.finish_trial(recording.trial);

        let message = match &report {
            Some(LoopReport {
                rows,
                failure: None,
                metadata_path,
            }) => {
                info!(
                    trial = recording.trial,
                    rows,
                    metadata = ?metadata_path,
                    "Recording stopped"
                );
                format!(
                    "Recording stopped. Trial {} saved to {} ({} rows)",
                    recording.trial,
                    recording.log_path.display(),
                    rows
                )
            }
            Some(LoopReport {
                failure: Some(failure),
                ..
            }) => format!(
                "Recording stopped. Trial {} ended with error: {}",
                recording.trial, failure.reason
            ),
            None => format!(
                "Recording stopped. Trial {} is still being finalized",
                recording.trial
            ),
        };
        Ok(CommandOutcome::new(message))
    }

    /// Retained samples from the last `window_s` seconds, `None` when empty
    pub fn query_snapshot(&self, window_s: f64) -> Option<HistorySnapshot> {
        self.history.lock().snapshot(window_s)
    }

    /// Snapshot as per-channel series with display labels
    pub fn query_plot(&self, window_s: f64) -> Option<PlotData> {
        let snapshot = self.query_snapshot(window_s)?;
        let series = (0..self.channels.total_channels())
            .map(|c| snapshot.channel(c))
            .collect();

        Some(PlotData {
            timestamps: snapshot.timestamps,
            series,
            labels: self.channels.display_labels(),
            analog_count: self.channels.analog_count(),
            emg_count: self.channels.emg_count(),
        })
    }

    /// Change output directory and/or project; applies to the next trial
    pub fn update_settings(
        &self,
        directory: Option<&str>,
        project: Option<&str>,
    ) -> DaqResult<CommandOutcome> {
        let mut settings = self.settings.write();
        if let Err(err) = settings.update(directory, project) {
            warn!(error = %err, "Settings update rejected");
            return Err(err);
        }
        info!(directory = %settings.directory, project = %settings.project, "Settings updated");
        Ok(CommandOutcome::new(format!(
            "Settings updated: directory={}, project={}",
            settings.directory, settings.project
        )))
    }

    pub fn recording_settings(&self) -> RecordingSettings {
        self.settings.read().clone()
    }

    pub fn status(&self) -> SessionStatus {
        let state = self.shared.state();
        let settings = self.settings.read().clone();
        let log_path = self
            .active
            .try_lock()
            .and_then(|active| active.as_ref().map(|r| r.log_path.clone()));

        SessionStatus {
            state,
            connected: state != SessionState::Idle,
            recording: state == SessionState::Recording,
            simulation_mode: self.is_simulated(),
            trial_number: self.trial_number(),
            device_name: self.device_name.clone(),
            current_directory: settings.directory,
            current_project: settings.project,
            default_directory: settings.default_directory,
            default_project: settings.default_project,
            sampling_rate_hz: self.channels.sampling_rate_hz(),
            analog_channels: self.channels.analog_count(),
            emg_channels: self.channels.emg_count(),
            history_duration_s: self.channels.history_duration_s(),
            web_update_interval_ms: self.performance.web_update_interval,
            status_update_interval_ms: self.performance.status_update_interval,
            grid_columns: self.display.grid_columns,
            blocks_recorded: self.blocks_recorded(),
            log_path,
            last_error: self.last_error(),
        }
    }

    /// Stop any recording in progress; used on process exit
    pub fn shutdown(&self) {
        if self.state() == SessionState::Recording {
            match self.stop_recording() {
                Ok(outcome) => info!(message = %outcome, "Recording stopped on shutdown"),
                Err(err) => warn!(error = %err, "Could not stop recording on shutdown"),
            }
        }
    }
}

impl Drop for AcquisitionSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Join a loop that already ended on its own
fn reap(previous: ActiveRecording) {
    if previous.handle.is_finished() {
        if previous.handle.join().is_err() {
            warn!(trial = previous.trial, "Previous acquisition thread panicked");
        }
    } else {
        debug!(trial = previous.trial, "Previous acquisition thread still finishing, detaching");
    }
}

/// Everything the acquisition thread owns for one trial
struct AcquisitionLoop {
    trial: u32,
    channels: ChannelConfiguration,
    max_blocks: Option<u64>,
    device_name: String,
    simulated: bool,
    source: Arc<Mutex<Box<dyn SampleSource>>>,
    history: Arc<Mutex<HistoryBuffer>>,
    shared: Arc<SharedState>,
    writer: TrialLogWriter,
    stop_rx: Receiver<()>,
    done_tx: Sender<LoopReport>,
}

impl AcquisitionLoop {
    fn run(self) {
        let Self {
            trial,
            channels,
            max_blocks,
            device_name,
            simulated,
            source,
            history,
            shared,
            mut writer,
            stop_rx,
            done_tx,
        } = self;

        let block_size = channels.block_size();
        let period = Duration::from_secs_f64(channels.update_period_s());
        let timeout = read_timeout(channels.update_period_s(), hal_constants::READ_TIMEOUT_SLACK);

        let mut source = source.lock();
        let mut blocks = 0u64;

        let failure = loop {
            if max_blocks.is_some_and(|max| blocks >= max) {
                info!(trial, blocks, "Block quota reached, waiting for stop");
                log_cleanup_failure("trial log flush", writer.flush());
                log_cleanup_failure("sample source close", source.close());
                // Sender dropped counts as a stop
                let _ = stop_rx.recv();
                break None;
            }

            let cycle_start = Instant::now();

            let block = match source.next_block(block_size, timeout) {
                Ok(block) => block,
                Err(err) => break Some(err),
            };

            // Whole block under one lock so snapshots never see half of it
            history.lock().append(&block);

            if let Err(err) = writer.write_block(&block) {
                break Some(err);
            }

            blocks += 1;
            shared.blocks_recorded.store(blocks, Ordering::SeqCst);

            let pause = period
                .saturating_sub(timing::SCHEDULING_ALLOWANCE)
                .saturating_sub(cycle_start.elapsed());
            match stop_rx.recv_timeout(pause) {
                Err(RecvTimeoutError::Timeout) => continue,
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break None,
            }
        };

        log_cleanup_failure("sample source close", source.close());
        drop(source);

        let mut metadata = TrialMetadata::new(trial, &channels, &device_name, simulated);
        metadata.completed_with_error = failure.as_ref().map(|e| e.to_string());
        let rows = writer.rows_written();

        let (failure, metadata_path) = match (failure, writer.close(metadata)) {
            (None, Ok(path)) => (None, Some(path)),
            (None, Err(close_err)) => (Some(close_err), None),
            (Some(err), Ok(path)) => (Some(err), Some(path)),
            (Some(err), Err(close_err)) => {
                log_cleanup_failure::<()>("trial log close", Err(close_err));
                (Some(err), None)
            }
        };

        let failure = failure.map(|err| {
            if err.is_acquisition_failure() {
                error!(trial, blocks, error = %err, "Acquisition loop failed, recording stopped");
            } else {
                error!(
                    trial,
                    blocks,
                    error = %err,
                    kind = %err.kind(),
                    "Unexpected error in acquisition loop, recording stopped"
                );
            }
            let report = FailureReport::from(&err);
            *shared.last_error.lock() = Some(report.clone());
            if shared.finish_trial(trial) {
                info!(trial, "Session returned to Connected after failure");
            }
            report
        });

        let report = LoopReport {
            rows,
            failure,
            metadata_path,
        };
        if done_tx.send(report).is_err() {
            debug!(trial, "No one is waiting for the loop report");
        }
    }
}
