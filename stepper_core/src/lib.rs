#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Background position-tracking controllers for stepper actuators.
//!
//! All hardware interaction goes through `stepper_traits::Actuator` and
//! `stepper_traits::Bus`; nothing here knows about a concrete driver.
//!
//! ## Architecture
//!
//! - **`StepMotor`**: one actuator, one loop thread. Writing a different
//!   target wakes the loop, which issues a single move toward it and waits
//!   for the move to finish.
//! - **`StepMotorGroup`**: up to four actuators (one per `Port`), one loop
//!   thread. A pass starts a move on every slot that is off target and joins
//!   all of them before the next pass.
//! - **Wake signal** (`signal`): auto-reset token; rapid writes coalesce.
//! - **Slots** (`slots`): targets with change detection, speeds without.
//! - **Dispatch** (`dispatch`): error-to-command planning shared by both loops.
//!
//! Runtime read or move failures are not retried. They are logged, counted in
//! `stats()` and kept as `last_error()`; `resync()` forces another pass.

pub mod config;
pub mod conversions;
pub mod dispatch;
pub mod error;
pub mod group;
pub mod hw_error;
pub mod mocks;
pub mod motor;
pub mod signal;
pub mod slots;
pub mod stats;

pub use config::ControllerCfg;
pub use dispatch::plan_move;
pub use error::{BuildError, Report, Result, StepError};
pub use group::StepMotorGroup;
pub use motor::StepMotor;
pub use slots::{SlotId, Speeds, Targets};
pub use stats::StatsSnapshot;
pub use stepper_traits::{MoveCommand, MoveOutcome, Port, SLOT_COUNT};
