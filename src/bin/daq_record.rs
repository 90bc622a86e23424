// src/bin/daq_record.rs
//! Headless recorder: connects, records one timed trial and logs live status

use clap::Parser;
use emg_daq::acquisition::{AcquisitionSession, RecordingOptions, SessionState};
use emg_daq::config::{constants::paths, ConfigLoader};
use emg_daq::hal::{HardwareSource, SampleSource, SyntheticSource};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "daq-record",
    version,
    about = "Record analog/EMG trials from a DAQ device or the built-in simulator"
)]
struct Cli {
    /// Use the synthetic signal source (default)
    #[arg(long, conflicts_with = "hardware")]
    sim: bool,

    /// Use the DAQ hardware
    #[arg(long)]
    hardware: bool,

    /// Channel configuration file
    #[arg(long, env = "DAQ_CONFIG", default_value = paths::DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Trial length in seconds
    #[arg(long, default_value_t = 10.0)]
    duration: f64,

    /// Output directory, overrides the configured default
    #[arg(long)]
    directory: Option<String>,

    /// Project name, overrides the configured default
    #[arg(long)]
    project: Option<String>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbose: u8) {
    let default_filter = match verbose {
        0 => "emg_daq=info,daq_record=info",
        1 => "emg_daq=debug,daq_record=debug",
        _ => "emg_daq=trace,daq_record=trace",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    info!(version = emg_daq::VERSION, "Starting DAQ recorder");

    let loaded = ConfigLoader::with_path(&cli.config).load();
    let channels = loaded.channels.clone();

    let synthetic = || -> Box<dyn SampleSource> {
        Box::new(SyntheticSource::new(&channels, loaded.system.simulation.clone()))
    };

    let mut session = if cli.hardware {
        // No vendor driver is linked into this build
        AcquisitionSession::new(channels.clone(), Box::new(HardwareSource::new(&channels, None)))
    } else {
        AcquisitionSession::new(channels.clone(), synthetic())
    }
    .with_system_config(&loaded.system);

    if let Err(err) = session.update_settings(cli.directory.as_deref(), cli.project.as_deref()) {
        error!(error = %err, "Invalid output settings");
        return ExitCode::from(2);
    }

    if let Err(err) = session.connect() {
        if !cli.hardware {
            error!(error = %err, "Connect failed");
            return ExitCode::FAILURE;
        }
        warn!(error = %err, "Hardware unavailable, falling back to simulation");
        session = AcquisitionSession::new(channels.clone(), synthetic())
            .with_system_config(&loaded.system);
        if let Err(err) = session.update_settings(cli.directory.as_deref(), cli.project.as_deref()) {
            error!(error = %err, "Invalid output settings");
            return ExitCode::from(2);
        }
        if let Err(err) = session.connect() {
            error!(error = %err, "Connect failed");
            return ExitCode::FAILURE;
        }
    }

    let session = Arc::new(session);
    let options = RecordingOptions::for_duration(cli.duration, &channels);
    let max_blocks = options.max_blocks.unwrap_or(u64::MAX);

    match session.start_recording_with(options) {
        Ok(outcome) => info!("{}", outcome),
        Err(err) => {
            error!(error = %err, "Could not start recording");
            return ExitCode::FAILURE;
        }
    }

    let status_period = Duration::from_millis(loaded.system.performance.status_update_interval.max(100));
    let mut ticker = tokio::time::interval(status_period);
    let mut interrupted = false;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted, stopping recording");
                interrupted = true;
                break;
            }
            _ = ticker.tick() => {
                let status = session.status();
                let window = session.query_snapshot(1.0);
                info!(
                    trial = status.trial_number,
                    blocks = status.blocks_recorded,
                    samples_last_second = window.as_ref().map(|s| s.len()).unwrap_or(0),
                    "Recording"
                );
                if status.state != SessionState::Recording || status.blocks_recorded >= max_blocks {
                    break;
                }
            }
        }
    }

    let stopper = Arc::clone(&session);
    let stopped = tokio::task::spawn_blocking(move || {
        if stopper.state() == SessionState::Recording {
            Some(stopper.stop_recording())
        } else {
            None
        }
    })
    .await;

    let failed = match stopped {
        Ok(Some(Ok(outcome))) => {
            info!("{}", outcome);
            false
        }
        Ok(Some(Err(err))) => {
            error!(error = %err, "Stop failed");
            true
        }
        Ok(None) => false,
        Err(err) => {
            error!(error = %err, "Stop task failed");
            true
        }
    };

    if let Some(failure) = session.last_error() {
        error!(kind = %failure.kind, reason = %failure.reason, "Recording ended with an error");
        return ExitCode::FAILURE;
    }

    if failed || interrupted {
        ExitCode::from(if failed { 1 } else { 130 })
    } else {
        ExitCode::SUCCESS
    }
}
