// tests/hal_integration.rs
//! Integration tests for the hardware source against a scripted driver

use emg_daq::acquisition::{read_trial_log, AcquisitionSession, SessionState, TrialMetadata};
use emg_daq::config::ChannelConfiguration;
use emg_daq::error::{DaqError, DaqResult, ErrorKind};
use emg_daq::hal::{DaqDriver, DaqTask, HardwareSource, SampleSource, SourceState, TaskSettings};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Behaviour of the fake device
#[derive(Clone, Default)]
struct Script {
    probe_fails: bool,
    open_fails: bool,
    /// Each task times out after this many reads
    reads_before_timeout: Option<usize>,
    /// The first read after this many hangs once for the given time
    stall: Option<(usize, Duration)>,
}

struct ScriptedDriver {
    script: Script,
    tasks_opened: AtomicUsize,
    tasks_closed: Arc<AtomicUsize>,
    stalled: Arc<AtomicBool>,
}

impl ScriptedDriver {
    fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script,
            tasks_opened: AtomicUsize::new(0),
            tasks_closed: Arc::new(AtomicUsize::new(0)),
            stalled: Arc::new(AtomicBool::new(false)),
        })
    }
}

struct ScriptedTask {
    channels: usize,
    reads: usize,
    reads_before_timeout: Option<usize>,
    stall: Option<(usize, Duration)>,
    stalled: Arc<AtomicBool>,
    closed: Arc<AtomicUsize>,
}

impl DaqDriver for ScriptedDriver {
    fn probe(&self, device_name: &str, _physical_channel: &str) -> DaqResult<()> {
        if self.script.probe_fails {
            return Err(DaqError::DeviceRead {
                device: device_name.to_string(),
                reason: "device not found".to_string(),
            });
        }
        Ok(())
    }

    fn open_task(&self, settings: &TaskSettings) -> DaqResult<Box<dyn DaqTask>> {
        if self.script.open_fails {
            return Err(DaqError::DeviceConfig {
                channel: settings.physical_channels.join(","),
                reason: "pin is reserved".to_string(),
            });
        }
        self.tasks_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedTask {
            channels: settings.physical_channels.len(),
            reads: 0,
            reads_before_timeout: self.script.reads_before_timeout,
            stall: self.script.stall,
            stalled: Arc::clone(&self.stalled),
            closed: Arc::clone(&self.tasks_closed),
        }))
    }
}

impl DaqTask for ScriptedTask {
    fn start(&mut self) -> DaqResult<()> {
        Ok(())
    }

    fn read(&mut self, samples: usize, timeout: Duration) -> DaqResult<Vec<Vec<f64>>> {
        if self.reads_before_timeout.is_some_and(|limit| self.reads >= limit) {
            return Err(DaqError::AcquisitionTimeout {
                device: "Dev1".to_string(),
                timeout,
            });
        }
        if let Some((after, hang)) = self.stall {
            // The driver ignores its timeout, as a wedged device would
            if self.reads >= after && !self.stalled.swap(true, Ordering::SeqCst) {
                thread::sleep(hang);
            }
        }
        self.reads += 1;
        Ok((0..self.channels)
            .map(|c| vec![c as f64 * 0.1; samples])
            .collect())
    }

    fn stop(&mut self) -> DaqResult<()> {
        Ok(())
    }

    fn close(&mut self) -> DaqResult<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        // Secondary failures during teardown must not surface
        Err(DaqError::DeviceRead {
            device: "Dev1".to_string(),
            reason: "already closed".to_string(),
        })
    }
}

fn channels() -> ChannelConfiguration {
    ChannelConfiguration::generic(2, 1, 1000.0, 0.1, 1.0).unwrap()
}

fn hardware_session(driver: Arc<ScriptedDriver>, dir: &TempDir) -> AcquisitionSession {
    let channels = channels();
    let source = HardwareSource::new(&channels, Some(driver));
    let session = AcquisitionSession::new(channels, Box::new(source));
    let directory = dir.path().join("hw");
    session
        .update_settings(directory.to_str(), Some("hw_test"))
        .unwrap();
    session
}

fn wait_for_state(session: &AcquisitionSession, state: SessionState) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while session.state() != state {
        assert!(Instant::now() < deadline, "timed out waiting for {}", state);
        thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn test_probe_failure_keeps_session_idle() {
    let dir = TempDir::new().unwrap();
    let session = hardware_session(
        ScriptedDriver::new(Script {
            probe_fails: true,
            ..Script::default()
        }),
        &dir,
    );

    let err = session.connect().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConnectionFailed);
    assert!(err.to_string().contains("device not found"));
    assert_eq!(session.state(), SessionState::Idle);
}

#[test]
fn test_missing_driver_reports_unavailable() {
    let dir = TempDir::new().unwrap();
    let channels = channels();
    let session = AcquisitionSession::new(
        channels.clone(),
        Box::new(HardwareSource::new(&channels, None)),
    );
    let directory = dir.path().join("none");
    session.update_settings(directory.to_str(), None).unwrap();

    let err = session.connect().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DeviceUnavailable);
    assert_eq!(session.state(), SessionState::Idle);
    assert!(!session.status().simulation_mode);
}

#[test]
fn test_arm_failure_aborts_start() {
    let dir = TempDir::new().unwrap();
    let session = hardware_session(
        ScriptedDriver::new(Script {
            open_fails: true,
            ..Script::default()
        }),
        &dir,
    );
    session.connect().unwrap();

    let err = session.start_recording().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DeviceConfigError);
    assert_eq!(session.state(), SessionState::Connected);
    assert_eq!(session.trial_number(), 1);

    // The log opened for the aborted trial is removed again
    let logs: Vec<_> = std::fs::read_dir(dir.path().join("hw"))
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "bin"))
        .collect();
    assert!(logs.is_empty());
}

#[test]
fn test_read_timeout_ends_recording() {
    let dir = TempDir::new().unwrap();
    let driver = ScriptedDriver::new(Script {
        reads_before_timeout: Some(3),
        ..Script::default()
    });
    let session = hardware_session(Arc::clone(&driver), &dir);
    session.connect().unwrap();
    session.start_recording().unwrap();
    let log_path = session.status().log_path.unwrap();

    wait_for_state(&session, SessionState::Connected);

    assert_eq!(session.trial_number(), 2);
    let failure = session.last_error().unwrap();
    assert_eq!(failure.kind, ErrorKind::AcquisitionTimeout);
    assert!(session.status().last_error.is_some());

    let err = session.stop_recording().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);

    // Wait for the loop to finish writing the sidecar
    let metadata_dir = log_path.parent().unwrap().join("metadata");
    let deadline = Instant::now() + Duration::from_secs(10);
    let sidecar = loop {
        let found = std::fs::read_dir(&metadata_dir)
            .ok()
            .and_then(|mut entries| entries.find_map(|e| e.ok().map(|e| e.path())));
        if let Some(path) = found {
            break path;
        }
        assert!(Instant::now() < deadline, "metadata sidecar never appeared");
        thread::sleep(Duration::from_millis(10));
    };

    let metadata: TrialMetadata =
        serde_json::from_str(&std::fs::read_to_string(&sidecar).unwrap()).unwrap();
    assert_eq!(metadata.trial_number, 1);
    assert_eq!(metadata.rows_written, 300);
    assert!(!metadata.simulation_mode);
    assert!(metadata.completed_with_error.is_some());

    let rows = read_trial_log(&log_path, 3).unwrap();
    assert_eq!(rows.len(), 300);
    assert_eq!(rows[0][1..], [0.0, 0.1, 0.2]);
    assert_eq!(driver.tasks_closed.load(Ordering::SeqCst), 1);

    // A fresh start is the retry path
    session.start_recording().unwrap();
    assert_eq!(session.state(), SessionState::Recording);
    assert_eq!(driver.tasks_opened.load(Ordering::SeqCst), 2);
    wait_for_state(&session, SessionState::Connected);
    assert_eq!(session.trial_number(), 3);
}

#[test]
fn test_stop_detaches_a_stuck_loop() {
    let dir = TempDir::new().unwrap();
    let driver = ScriptedDriver::new(Script {
        stall: Some((1, Duration::from_millis(3500))),
        ..Script::default()
    });
    let session = hardware_session(Arc::clone(&driver), &dir);
    session.connect().unwrap();
    session.start_recording().unwrap();
    let log_path = session.status().log_path.unwrap();

    // Let the loop get into the hanging second read
    while session.blocks_recorded() < 1 {
        thread::sleep(Duration::from_millis(10));
    }
    thread::sleep(Duration::from_millis(300));

    let started = Instant::now();
    let outcome = session.stop_recording().unwrap();
    let waited = started.elapsed();
    assert!(waited >= Duration::from_millis(1900), "stop returned after {:?}", waited);
    assert!(waited < Duration::from_secs(3), "stop returned after {:?}", waited);
    assert!(outcome.message.contains("still being finalized"));
    assert_eq!(session.state(), SessionState::Connected);
    assert_eq!(session.trial_number(), 2);

    // The detached loop still owns the device, so a new trial is refused at once
    let started = Instant::now();
    let err = session.start_recording().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    assert!(started.elapsed() < Duration::from_millis(500));
    assert_eq!(session.trial_number(), 2);

    // Once the read returns, the loop finalizes the trial on its own
    let sidecar = log_path
        .parent()
        .unwrap()
        .join("metadata")
        .join(format!(
            "{}_metadata.json",
            log_path.file_stem().unwrap().to_string_lossy()
        ));
    let deadline = Instant::now() + Duration::from_secs(10);
    while !sidecar.exists() {
        assert!(Instant::now() < deadline, "detached loop never wrote its sidecar");
        thread::sleep(Duration::from_millis(20));
    }
    // The sidecar is written with a single call; give it a moment to land
    thread::sleep(Duration::from_millis(100));

    let metadata: TrialMetadata =
        serde_json::from_str(&std::fs::read_to_string(&sidecar).unwrap()).unwrap();
    assert_eq!(metadata.trial_number, 1);
    assert_eq!(metadata.rows_written, 200);
    assert!(metadata.completed_with_error.is_none());
    assert_eq!(read_trial_log(&log_path, 3).unwrap().len(), 200);
    assert_eq!(driver.tasks_closed.load(Ordering::SeqCst), 1);

    // The device is free again
    session.start_recording().unwrap();
    assert_eq!(session.state(), SessionState::Recording);
    session.stop_recording().unwrap();
    assert_eq!(session.trial_number(), 3);
}

#[test]
fn test_hardware_timestamps_are_contiguous() {
    let channels = channels();
    let driver = ScriptedDriver::new(Script::default());
    let mut source = HardwareSource::new(&channels, Some(driver));

    source.probe().unwrap();
    source.arm().unwrap();
    assert_eq!(source.state(), SourceState::Armed);

    let first = source.next_block(100, Duration::from_millis(1100)).unwrap();
    let second = source.next_block(100, Duration::from_millis(1100)).unwrap();
    assert_eq!(source.state(), SourceState::Streaming);

    assert_eq!(first.len(), 100);
    assert!(first.timestamps.windows(2).all(|w| w[1] > w[0]));
    assert!(second.timestamps[0] > first.last_timestamp().unwrap());

    source.close().unwrap();
    source.close().unwrap();
}
