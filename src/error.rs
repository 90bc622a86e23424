// src/error.rs
//! Unified error handling for the acquisition engine
//!
//! Every failure the engine can report maps onto one [`DaqError`] variant. The
//! control surface never sees a panic: operations return a [`DaqResult`] whose
//! error carries a category ([`ErrorKind`]) and a human-readable reason.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for acquisition operations
pub type DaqResult<T> = Result<T, DaqError>;

/// Unified error type for the acquisition engine
#[derive(Debug, Error)]
pub enum DaqError {
    /// Bad or missing configuration values
    #[error("[CONFIG] {component}: {reason}")]
    Configuration { component: String, reason: String },

    /// No hardware driver is present on this host
    #[error("[DEVICE] No DAQ driver available for device {device}")]
    DeviceUnavailable { device: String },

    /// Device probe during connect failed
    #[error("[DEVICE] Connection to {device} failed: {reason}")]
    ConnectionFailed { device: String, reason: String },

    /// Channel or pin setup on the device failed
    #[error("[DEVICE] Configuration of {channel} failed: {reason}")]
    DeviceConfig { channel: String, reason: String },

    /// Device read failed for a reason other than a timeout
    #[error("[DEVICE] Read from {device} failed: {reason}")]
    DeviceRead { device: String, reason: String },

    /// No data arrived within the read timeout
    #[error("[TIMING] No data within {timeout:?} from {device}")]
    AcquisitionTimeout { device: String, timeout: Duration },

    /// The source was closed while a block was requested
    #[error("[SOURCE] Sample source {device} is closed")]
    SourceClosed { device: String },

    /// Operation requested from a state that forbids it
    #[error("[STATE] Cannot {operation} while {state}")]
    InvalidState { operation: String, state: String },

    /// Trial log could not be opened or written
    #[error("[STORAGE] {operation} {path}: {source}")]
    Storage {
        operation: String,
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Settings validation failure
    #[error("[INPUT] Invalid {field} '{value}': {reason}")]
    InvalidInput {
        field: String,
        value: String,
        reason: String,
    },
}

/// Flat error category reported to the control surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ConfigurationError,
    DeviceUnavailable,
    ConnectionFailed,
    DeviceConfigError,
    AcquisitionTimeout,
    DeviceReadError,
    SourceClosed,
    InvalidState,
    StorageError,
    InvalidInput,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::ConfigurationError => "ConfigurationError",
            ErrorKind::DeviceUnavailable => "DeviceUnavailable",
            ErrorKind::ConnectionFailed => "ConnectionFailed",
            ErrorKind::DeviceConfigError => "DeviceConfigError",
            ErrorKind::AcquisitionTimeout => "AcquisitionTimeout",
            ErrorKind::DeviceReadError => "DeviceReadError",
            ErrorKind::SourceClosed => "SourceClosed",
            ErrorKind::InvalidState => "InvalidState",
            ErrorKind::StorageError => "StorageError",
            ErrorKind::InvalidInput => "InvalidInput",
        };
        f.write_str(name)
    }
}

impl DaqError {
    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            DaqError::Configuration { .. } => ErrorKind::ConfigurationError,
            DaqError::DeviceUnavailable { .. } => ErrorKind::DeviceUnavailable,
            DaqError::ConnectionFailed { .. } => ErrorKind::ConnectionFailed,
            DaqError::DeviceConfig { .. } => ErrorKind::DeviceConfigError,
            DaqError::DeviceRead { .. } => ErrorKind::DeviceReadError,
            DaqError::AcquisitionTimeout { .. } => ErrorKind::AcquisitionTimeout,
            DaqError::SourceClosed { .. } => ErrorKind::SourceClosed,
            DaqError::InvalidState { .. } => ErrorKind::InvalidState,
            DaqError::Storage { .. } => ErrorKind::StorageError,
            DaqError::InvalidInput { .. } => ErrorKind::InvalidInput,
        }
    }

    /// Errors that end an in-progress recording
    pub fn is_acquisition_failure(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::AcquisitionTimeout
                | ErrorKind::DeviceReadError
                | ErrorKind::SourceClosed
                | ErrorKind::StorageError
        )
    }

    pub fn configuration(component: &str, reason: impl Into<String>) -> Self {
        DaqError::Configuration {
            component: component.to_string(),
            reason: reason.into(),
        }
    }

    pub fn invalid_state(operation: &str, state: impl fmt::Display) -> Self {
        DaqError::InvalidState {
            operation: operation.to_string(),
            state: state.to_string(),
        }
    }

    pub fn storage(operation: &str, path: &std::path::Path, source: std::io::Error) -> Self {
        DaqError::Storage {
            operation: operation.to_string(),
            path: path.display().to_string(),
            source,
        }
    }
}

/// Serializable failure report for the control surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureReport {
    pub kind: ErrorKind,
    pub reason: String,
}

impl From<&DaqError> for FailureReport {
    fn from(err: &DaqError) -> Self {
        Self {
            kind: err.kind(),
            reason: err.to_string(),
        }
    }
}

/// Cleanup policy: secondary failures are logged and dropped so they never
/// mask the primary error.
pub fn log_cleanup_failure<T>(component: &str, result: DaqResult<T>) {
    if let Err(err) = result {
        tracing::warn!(component, error = %err, "Ignoring error during cleanup");
    }
}
