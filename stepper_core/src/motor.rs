//! Single-actuator controller with a background dispatch loop.
//!
//! The loop parks on the wake signal, and on each serviced wake reads the
//! live position, issues one move toward the stored target and waits for it
//! to finish. A target written while a move runs re-arms the signal and is
//! picked up by the next pass.
//!
//! Each `StepMotor` owns exactly one loop thread; `shutdown` (or drop) stops
//! and joins it, then powers the actuator off.
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use eyre::WrapErr;
use stepper_traits::{Actuator, Bus, Port};

use crate::config::ControllerCfg;
use crate::dispatch::{Shared, dispatch, note_outcome, power_off_quietly};
use crate::error::{BuildError, Result, StepError};
use crate::hw_error::lift;
use crate::stats::StatsSnapshot;

const SLOT: usize = 0;

pub struct StepMotor<A: Actuator + 'static> {
    actuator: Arc<A>,
    shared: Arc<Shared<1>>,
    join: Option<JoinHandle<()>>,
}

impl<A: Actuator + 'static> std::fmt::Debug for StepMotor<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepMotor")
            .field("port", &self.actuator.port())
            .field("target", &self.target())
            .field("speed", &self.speed())
            .field("running", &self.join.is_some())
            .finish_non_exhaustive()
    }
}

impl<A: Actuator + 'static> StepMotor<A> {
    /// Bind `port` on `bus` and start the loop.
    pub fn open<B>(bus: &B, port: Port, cfg: &ControllerCfg) -> Result<Self>
    where
        B: Bus<Actuator = A>,
    {
        let actuator = lift(port, bus.open(port)).wrap_err_with(|| format!("open port {port}"))?;
        Self::new(actuator, cfg)
    }

    /// Take ownership of an opened actuator and start the loop.
    ///
    /// The live position becomes the initial target, so nothing moves until
    /// a different target is written.
    pub fn new(actuator: A, cfg: &ControllerCfg) -> Result<Self> {
        let port = actuator.port();
        if cfg.is_reversed(port) {
            lift(port, actuator.set_reverse(true))
                .wrap_err_with(|| format!("reverse port {port}"))?;
        }
        let initial = lift(port, actuator.position())
            .wrap_err_with(|| format!("read initial position of port {port}"))?;

        let actuator = Arc::new(actuator);
        let shared = Arc::new(Shared::new([initial], cfg.speed));
        let join = {
            let actuator = Arc::clone(&actuator);
            let shared = Arc::clone(&shared);
            std::thread::Builder::new()
                .name(format!("step-motor-{port}"))
                .spawn(move || run(actuator.as_ref(), &shared))
                .map_err(|e| BuildError::Spawn(e.to_string()))?
        };
        tracing::info!(%port, position = initial, speed = cfg.speed, "motor loop started");

        Ok(Self {
            actuator,
            shared,
            join: Some(join),
        })
    }

    pub fn port(&self) -> Port {
        self.actuator.port()
    }

    /// Last stored target, not necessarily reached yet.
    pub fn target(&self) -> i32 {
        self.shared.targets.get(SLOT)
    }

    /// Store a new target. Only a differing value wakes the loop; returns
    /// whether it did. Never blocks on motion.
    pub fn set_target(&self, value: i32) -> bool {
        self.shared.targets.set(SLOT, value)
    }

    pub fn speed(&self) -> i8 {
        self.shared.speeds.get(SLOT)
    }

    /// Takes effect on the next dispatched move. Sign is ignored.
    pub fn set_speed(&self, speed: i8) {
        self.shared.speeds.set(SLOT, speed);
    }

    /// Live position counter.
    pub fn position(&self) -> Result<i32> {
        Ok(lift(self.port(), self.actuator.position())?)
    }

    /// Zero the stored target and the actuator's counter.
    ///
    /// Not atomic with respect to a move already in flight.
    pub fn reset_position(&self) -> Result<()> {
        self.shared.targets.zero();
        lift(self.port(), self.actuator.reset_position())?;
        tracing::debug!(port = %self.port(), "position reset");
        Ok(())
    }

    pub fn brake(&self) -> Result<()> {
        Ok(lift(self.port(), self.actuator.brake())?)
    }

    pub fn power_off(&self) -> Result<()> {
        Ok(lift(self.port(), self.actuator.power_off())?)
    }

    pub fn set_reverse(&self, reverse: bool) -> Result<()> {
        Ok(lift(self.port(), self.actuator.set_reverse(reverse))?)
    }

    pub fn reverse(&self) -> bool {
        self.actuator.reverse()
    }

    /// Run a pass even though the target did not change, e.g. after a fault
    /// left it unreached.
    pub fn resync(&self) {
        self.shared.targets.force();
    }

    pub fn is_idle(&self) -> bool {
        self.shared.targets.is_idle()
    }

    /// Block until every written target has been serviced, or `timeout`.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.shared.targets.wait_idle(timeout)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    pub fn last_error(&self) -> Option<StepError> {
        self.shared.stats.last_error()
    }

    /// Stop the loop, join it and power the actuator off.
    pub fn shutdown(mut self) -> Result<()> {
        Ok(self.dispose()?)
    }

    fn dispose(&mut self) -> std::result::Result<(), StepError> {
        let Some(join) = self.join.take() else {
            return Ok(());
        };
        let port = self.port();
        self.shared.request_stop();
        let joined = join.join();
        power_off_quietly(self.actuator.as_ref());
        tracing::info!(%port, "motor shut down");
        joined.map_err(|_| StepError::State(format!("control loop for port {port} panicked")))
    }
}

impl<A: Actuator + 'static> Drop for StepMotor<A> {
    fn drop(&mut self) {
        if let Err(e) = self.dispose() {
            tracing::warn!(error = %e, "motor shutdown during drop failed");
        }
    }
}

fn run<A: Actuator>(actuator: &A, shared: &Shared<1>) {
    let port = actuator.port();
    while shared.targets.wait_wake() {
        if shared.stopping() {
            break;
        }
        let Some(pending) = shared.targets.take_pending() else {
            tracing::trace!(%port, "wake without pending work");
            continue;
        };
        shared.stats.pass();
        if let Some(mut done) = dispatch(
            actuator,
            pending.values[SLOT],
            shared.speeds.get(SLOT),
            &shared.stats,
        ) {
            note_outcome(port, done.wait(), &shared.stats);
        }
        shared.targets.mark_serviced(pending.seq);
    }
    tracing::info!(%port, "motor loop exited");
}
