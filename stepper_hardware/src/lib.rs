//! Actuator drivers behind the `stepper_traits` contract.
//!
//! The simulated bus is always available; the GPIO step/dir backend needs
//! the `hardware` feature (Linux, rppal).
pub mod error;
#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod gpio;
pub mod sim;
pub mod util;

pub use error::HwError;
pub use sim::{SimActuator, SimBus, SimCfg, SimMotorState};
