//! Simulated actuator bus.
//!
//! Each port has a persistent `SimMotorState` that outlives any actuator
//! bound to it, so tests can inspect counters after a controller has been
//! shut down. Moves run on a short-lived worker thread that advances the
//! position one step per interval and resolves the move's `Completion`.
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use stepper_traits::{
    Actuator, Bus, Clock, Completion, HwResult, MonotonicClock, MoveCommand, MoveOutcome, Port,
    SLOT_COUNT,
};
use tracing::{debug, trace};

use crate::error::HwError;
use crate::util::step_interval;

/// Simulation parameters.
#[derive(Debug, Clone)]
pub struct SimCfg {
    /// Interval between steps at full speed. Zero applies a move at once.
    pub step_period: Duration,
    /// Ports that have an actuator attached.
    pub connected: [bool; SLOT_COUNT],
}

impl Default for SimCfg {
    fn default() -> Self {
        Self {
            step_period: Duration::ZERO,
            connected: [true; SLOT_COUNT],
        }
    }
}

/// Observable state of one simulated motor.
#[derive(Debug, Default)]
pub struct SimMotorState {
    position: AtomicI32,
    generation: AtomicU64,
    moving: AtomicBool,
    reverse: AtomicBool,
    moves: AtomicU64,
    brakes: AtomicU64,
    power_offs: AtomicU64,
    resets: AtomicU64,
}

impl SimMotorState {
    pub fn position(&self) -> i32 {
        self.position.load(Ordering::SeqCst)
    }
    pub fn is_moving(&self) -> bool {
        self.moving.load(Ordering::SeqCst)
    }
    pub fn moves(&self) -> u64 {
        self.moves.load(Ordering::SeqCst)
    }
    pub fn brakes(&self) -> u64 {
        self.brakes.load(Ordering::SeqCst)
    }
    pub fn power_offs(&self) -> u64 {
        self.power_offs.load(Ordering::SeqCst)
    }
    pub fn resets(&self) -> u64 {
        self.resets.load(Ordering::SeqCst)
    }

    /// Bump the move generation so a running worker stops at its next step.
    fn interrupt(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.moving.store(false, Ordering::SeqCst);
    }
}

struct BusInner {
    cfg: SimCfg,
    bound: Mutex<[bool; SLOT_COUNT]>,
    motors: [Arc<SimMotorState>; SLOT_COUNT],
    clock: Arc<dyn Clock + Send + Sync>,
}

/// Cheap to clone; clones share the same motors.
#[derive(Clone)]
pub struct SimBus {
    inner: Arc<BusInner>,
}

impl Default for SimBus {
    fn default() -> Self {
        Self::new(SimCfg::default())
    }
}

impl SimBus {
    pub fn new(cfg: SimCfg) -> Self {
        Self::with_clock(cfg, MonotonicClock::new())
    }

    pub fn with_clock<C: Clock + Send + Sync + 'static>(cfg: SimCfg, clock: C) -> Self {
        Self {
            inner: Arc::new(BusInner {
                cfg,
                bound: Mutex::new([false; SLOT_COUNT]),
                motors: std::array::from_fn(|_| Arc::new(SimMotorState::default())),
                clock: Arc::new(clock),
            }),
        }
    }

    /// Handle on a port's motor state, valid whether or not it is bound.
    pub fn probe(&self, port: Port) -> Arc<SimMotorState> {
        self.inner.motors[port.index()].clone()
    }

    /// Move the shaft "by hand", as if an external force turned it.
    pub fn set_position(&self, port: Port, value: i32) {
        self.inner.motors[port.index()]
            .position
            .store(value, Ordering::SeqCst);
    }

    pub fn is_bound(&self, port: Port) -> bool {
        self.inner
            .bound
            .lock()
            .map(|b| b[port.index()])
            .unwrap_or(false)
    }
}

impl Bus for SimBus {
    type Actuator = SimActuator;

    fn open(&self, port: Port) -> HwResult<SimActuator> {
        if !self.inner.cfg.connected[port.index()] {
            return Err(Box::new(HwError::NotConnected(port)));
        }
        let mut bound = self
            .inner
            .bound
            .lock()
            .map_err(|_| HwError::Io(std::io::Error::other("sim bus lock poisoned")))?;
        if bound[port.index()] {
            return Err(Box::new(HwError::PortBusy(port)));
        }
        bound[port.index()] = true;
        debug!(%port, "sim actuator bound");
        Ok(SimActuator {
            port,
            state: self.inner.motors[port.index()].clone(),
            bus: self.inner.clone(),
        })
    }
}

/// Actuator handle on a `SimBus` port. Releases the port on drop.
pub struct SimActuator {
    port: Port,
    state: Arc<SimMotorState>,
    bus: Arc<BusInner>,
}

impl Actuator for SimActuator {
    fn port(&self) -> Port {
        self.port
    }

    fn position(&self) -> HwResult<i32> {
        Ok(self.state.position())
    }

    fn reset_position(&self) -> HwResult<()> {
        self.state.position.store(0, Ordering::SeqCst);
        self.state.resets.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn start_move(&self, cmd: MoveCommand) -> HwResult<Completion> {
        let st = &self.state;
        st.moves.fetch_add(1, Ordering::SeqCst);
        let generation = st.generation.fetch_add(1, Ordering::SeqCst) + 1;

        if cmd.steps == 0 {
            return Ok(Completion::ready());
        }
        let Some(interval) = step_interval(self.bus.cfg.step_period, cmd.speed) else {
            return Ok(Completion::resolved(MoveOutcome::Stalled));
        };
        let delta: i32 = if cmd.speed < 0 { -1 } else { 1 };

        if interval.is_zero() {
            let total = i64::from(cmd.steps) * i64::from(delta);
            let next = i64::from(st.position()).saturating_add(total);
            st.position.store(
                next.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32,
                Ordering::SeqCst,
            );
            trace!(port = %self.port, steps = cmd.steps, "sim move applied");
            return Ok(Completion::ready());
        }

        let (tx, completion) = Completion::channel();
        let state = self.state.clone();
        let clock = self.bus.clock.clone();
        let port = self.port;
        state.moving.store(true, Ordering::SeqCst);
        std::thread::Builder::new()
            .name(format!("sim-move-{port}"))
            .spawn(move || {
                let epoch = clock.now();
                for _ in 0..cmd.steps {
                    clock.sleep(interval);
                    if state.generation.load(Ordering::SeqCst) != generation {
                        trace!(%port, "sim move interrupted");
                        tx.complete(MoveOutcome::Interrupted);
                        return;
                    }
                    state.position.fetch_add(delta, Ordering::SeqCst);
                }
                if state.generation.load(Ordering::SeqCst) == generation {
                    state.moving.store(false, Ordering::SeqCst);
                }
                trace!(%port, elapsed_ms = clock.ms_since(epoch), "sim move done");
                tx.complete(MoveOutcome::Reached);
            })
            .map_err(HwError::Io)?;
        Ok(completion)
    }

    fn brake(&self) -> HwResult<()> {
        self.state.interrupt();
        self.state.brakes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn power_off(&self) -> HwResult<()> {
        self.state.interrupt();
        self.state.power_offs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn set_reverse(&self, reverse: bool) -> HwResult<()> {
        self.state.reverse.store(reverse, Ordering::SeqCst);
        Ok(())
    }

    fn reverse(&self) -> bool {
        self.state.reverse.load(Ordering::SeqCst)
    }
}

impl Drop for SimActuator {
    fn drop(&mut self) {
        if let Ok(mut bound) = self.bus.bound.lock() {
            bound[self.port.index()] = false;
        }
        debug!(port = %self.port, "sim actuator released");
    }
}
