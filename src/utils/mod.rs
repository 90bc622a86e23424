// src/utils/mod.rs
//! Shared utilities: session timing and input validation

pub mod time;
pub mod validation;

pub use time::{MockTimeProvider, MonotonicTimeProvider, SessionClock, TimeProvider};
pub use validation::{validate_directory, validate_project};
