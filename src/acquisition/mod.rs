// src/acquisition/mod.rs
//! Acquisition engine: history, trial logging and the session state machine

pub mod history;
pub mod naming;
pub mod session;
pub mod trial_log;

pub use history::{HistoryBuffer, HistorySnapshot};
pub use naming::RecordingSettings;
pub use session::{
    AcquisitionSession, CommandOutcome, PlotData, RecordingOptions, SessionState, SessionStatus,
};
pub use trial_log::{read_trial_log, TrialLogWriter, TrialMetadata};
