// src/hal/mod.rs
//! Hardware Abstraction Layer for sample sources

pub mod hardware;
pub mod simulator;
pub mod traits;
pub mod types;

pub use hardware::HardwareSource;
pub use simulator::SyntheticSource;
pub use traits::*;
pub use types::*;
