//! Group controller: one loop fanning moves out to up to four actuators.
//!
//! A pass starts a move on every bound slot whose target differs from its
//! live position, then joins all of them before waiting for the next wake.
//! Slots that did not move keep an already-satisfied completion, so the join
//! never waits on stale work.
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use eyre::WrapErr;
use stepper_traits::{Actuator, Bus, Completion, Port, SLOT_COUNT};

use crate::config::ControllerCfg;
use crate::dispatch::{Shared, dispatch, note_outcome, power_off_quietly};
use crate::error::{BuildError, Result, StepError};
use crate::hw_error::lift;
use crate::slots::{Speeds, Targets};
use crate::stats::StatsSnapshot;

type Slots<A> = [Option<A>; SLOT_COUNT];

pub struct StepMotorGroup<A: Actuator + 'static> {
    slots: Arc<Slots<A>>,
    shared: Arc<Shared<SLOT_COUNT>>,
    join: Option<JoinHandle<()>>,
}

impl<A: Actuator + 'static> std::fmt::Debug for StepMotorGroup<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepMotorGroup")
            .field("ports", &self.ports())
            .field("targets", &self.shared.targets.snapshot())
            .field("running", &self.join.is_some())
            .finish_non_exhaustive()
    }
}

fn check_ports(ports: &[Port]) -> std::result::Result<(), BuildError> {
    if ports.is_empty() {
        return Err(BuildError::NoPorts);
    }
    for (i, p) in ports.iter().enumerate() {
        if ports[..i].contains(p) {
            return Err(BuildError::DuplicatePort(*p));
        }
    }
    Ok(())
}

impl<A: Actuator + 'static> StepMotorGroup<A> {
    /// Bind every port in `ports` on `bus` and start the loop.
    ///
    /// Fails without starting anything if a port is listed twice or cannot
    /// be opened; ports opened before the failure are released.
    pub fn open<B>(bus: &B, ports: &[Port], cfg: &ControllerCfg) -> Result<Self>
    where
        B: Bus<Actuator = A>,
    {
        check_ports(ports)?;
        let mut actuators = Vec::with_capacity(ports.len());
        for &port in ports {
            let a = lift(port, bus.open(port)).wrap_err_with(|| format!("open port {port}"))?;
            actuators.push(a);
        }
        Self::new(actuators, cfg)
    }

    /// Take ownership of opened actuators, one per distinct port.
    pub fn new(actuators: Vec<A>, cfg: &ControllerCfg) -> Result<Self> {
        let ports: Vec<Port> = actuators.iter().map(Actuator::port).collect();
        check_ports(&ports)?;

        let mut slots: Slots<A> = std::array::from_fn(|_| None);
        let mut initial = [0i32; SLOT_COUNT];
        for a in actuators {
            let port = a.port();
            if cfg.is_reversed(port) {
                lift(port, a.set_reverse(true)).wrap_err_with(|| format!("reverse port {port}"))?;
            }
            initial[port.index()] = lift(port, a.position())
                .wrap_err_with(|| format!("read initial position of port {port}"))?;
            slots[port.index()] = Some(a);
        }

        let slots = Arc::new(slots);
        let shared = Arc::new(Shared::new(initial, cfg.speed));
        let join = {
            let slots = Arc::clone(&slots);
            let shared = Arc::clone(&shared);
            std::thread::Builder::new()
                .name("step-group".into())
                .spawn(move || run(&slots, &shared))
                .map_err(|e| BuildError::Spawn(e.to_string()))?
        };
        tracing::info!(ports = ?ports, speed = cfg.speed, "group loop started");

        Ok(Self {
            slots,
            shared,
            join: Some(join),
        })
    }

    /// Per-slot targets, indexable by `Port` or slot number.
    pub fn targets(&self) -> &Targets<SLOT_COUNT> {
        &self.shared.targets
    }

    /// Per-slot speeds. Writes take effect on the next dispatched move.
    pub fn speeds(&self) -> &Speeds<SLOT_COUNT> {
        &self.shared.speeds
    }

    /// Bound ports in slot order.
    pub fn ports(&self) -> Vec<Port> {
        self.bound().map(Actuator::port).collect()
    }

    pub fn is_bound(&self, port: Port) -> bool {
        self.slots[port.index()].is_some()
    }

    fn bound(&self) -> impl Iterator<Item = &A> {
        self.slots.iter().flatten()
    }

    fn slot(&self, port: Port) -> std::result::Result<&A, StepError> {
        self.slots[port.index()]
            .as_ref()
            .ok_or(StepError::NotConnected(port))
    }

    /// Live counters; `None` for empty slots.
    pub fn positions(&self) -> Result<[Option<i32>; SLOT_COUNT]> {
        let mut out = [None; SLOT_COUNT];
        for a in self.bound() {
            out[a.port().index()] = Some(lift(a.port(), a.position())?);
        }
        Ok(out)
    }

    pub fn set_reverse(&self, port: Port, reverse: bool) -> Result<()> {
        let a = self.slot(port)?;
        Ok(lift(port, a.set_reverse(reverse))?)
    }

    /// `false` for empty slots.
    pub fn reverse(&self, port: Port) -> bool {
        self.slots[port.index()]
            .as_ref()
            .is_some_and(Actuator::reverse)
    }

    /// Zero every stored target and every bound actuator's counter.
    pub fn reset_all(&self) -> Result<()> {
        self.shared.targets.zero();
        self.for_each_bound("reset", Actuator::reset_position)
    }

    pub fn brake_all(&self) -> Result<()> {
        self.for_each_bound("brake", Actuator::brake)
    }

    pub fn power_off_all(&self) -> Result<()> {
        self.for_each_bound("power_off", Actuator::power_off)
    }

    /// Apply `op` to every bound actuator even if some fail; reports the
    /// first failure.
    fn for_each_bound(
        &self,
        what: &'static str,
        op: impl Fn(&A) -> stepper_traits::HwResult<()>,
    ) -> Result<()> {
        let mut first: Option<StepError> = None;
        for a in self.bound() {
            if let Err(e) = lift(a.port(), op(a)) {
                tracing::warn!(port = %a.port(), error = %e, "{what} failed");
                first.get_or_insert(e);
            }
        }
        match first {
            Some(e) => Err(e).wrap_err_with(|| format!("{what} across group")),
            None => Ok(()),
        }
    }

    pub fn resync(&self) {
        self.shared.targets.force();
    }

    pub fn is_idle(&self) -> bool {
        self.shared.targets.is_idle()
    }

    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.shared.targets.wait_idle(timeout)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    pub fn last_error(&self) -> Option<StepError> {
        self.shared.stats.last_error()
    }

    /// Stop the loop, join it and power off every bound actuator.
    pub fn shutdown(mut self) -> Result<()> {
        Ok(self.dispose()?)
    }

    fn dispose(&mut self) -> std::result::Result<(), StepError> {
        let Some(join) = self.join.take() else {
            return Ok(());
        };
        self.shared.request_stop();
        let joined = join.join();
        for a in self.bound() {
            power_off_quietly(a);
        }
        tracing::info!(ports = ?self.ports(), "group shut down");
        joined.map_err(|_| StepError::State("group control loop panicked".into()))
    }
}

impl<A: Actuator + 'static> Drop for StepMotorGroup<A> {
    fn drop(&mut self) {
        if let Err(e) = self.dispose() {
            tracing::warn!(error = %e, "group shutdown during drop failed");
        }
    }
}

fn run<A: Actuator>(slots: &Slots<A>, shared: &Shared<SLOT_COUNT>) {
    let mut tasks: [Completion; SLOT_COUNT] = std::array::from_fn(|_| Completion::ready());
    while shared.targets.wait_wake() {
        if shared.stopping() {
            break;
        }
        let Some(pending) = shared.targets.take_pending() else {
            tracing::trace!("group wake without pending work");
            continue;
        };
        shared.stats.pass();

        let mut issued = [false; SLOT_COUNT];
        for (i, slot) in slots.iter().enumerate() {
            let Some(a) = slot else { continue };
            if let Some(done) = dispatch(a, pending.values[i], shared.speeds.get(i), &shared.stats)
            {
                tasks[i] = done;
                issued[i] = true;
            }
        }

        // Join all: slots not moved this pass hold satisfied handles.
        for (i, task) in tasks.iter_mut().enumerate() {
            let outcome = task.wait();
            if issued[i] {
                note_outcome(Port::ALL[i], outcome, &shared.stats);
            }
        }
        tracing::trace!(moved = issued.iter().filter(|m| **m).count(), "group pass joined");
        shared.targets.mark_serviced(pending.seq);
    }
    tracing::info!("group loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_list_checks() {
        assert_eq!(check_ports(&[]), Err(BuildError::NoPorts));
        assert_eq!(
            check_ports(&[Port::A, Port::C, Port::A]),
            Err(BuildError::DuplicatePort(Port::A))
        );
        assert_eq!(check_ports(&[Port::D, Port::B]), Ok(()));
    }
}
