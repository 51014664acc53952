//! Test and helper mocks for stepper_core.
//!
//! `MockBus` hands out `MockActuator`s whose shared `MockMotor` state stays
//! reachable through `probe`, so tests can inspect issued commands, hold
//! completions open to build barriers, and inject read/move failures.
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use stepper_traits::{
    Actuator, Bus, Completion, CompletionSender, Direction, HwResult, MoveCommand, MoveOutcome,
    Port, SLOT_COUNT,
};

use crate::error::StepError;

#[derive(Debug, Default)]
struct MockState {
    position: i32,
    commands: Vec<MoveCommand>,
    hold: bool,
    held: Vec<(CompletionSender, MoveCommand)>,
}

/// Shared state behind a `MockActuator`.
#[derive(Debug)]
pub struct MockMotor {
    port: Port,
    state: Mutex<MockState>,
    changed: Condvar,
    reverse: AtomicBool,
    brakes: AtomicUsize,
    power_offs: AtomicUsize,
    resets: AtomicUsize,
    fail_reads: AtomicUsize,
    fail_moves: AtomicUsize,
}

fn apply(position: i32, cmd: &MoveCommand) -> i32 {
    let steps = i64::from(cmd.steps);
    let next = match cmd.direction() {
        Direction::Forward => i64::from(position) + steps,
        Direction::Reverse => i64::from(position) - steps,
    };
    i32::try_from(next).unwrap_or(if next > 0 { i32::MAX } else { i32::MIN })
}

impl MockMotor {
    pub fn new(port: Port) -> Self {
        Self {
            port,
            state: Mutex::new(MockState::default()),
            changed: Condvar::new(),
            reverse: AtomicBool::new(false),
            brakes: AtomicUsize::new(0),
            power_offs: AtomicUsize::new(0),
            resets: AtomicUsize::new(0),
            fail_reads: AtomicUsize::new(0),
            fail_moves: AtomicUsize::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn port(&self) -> Port {
        self.port
    }

    pub fn position(&self) -> i32 {
        self.lock().position
    }

    pub fn set_position(&self, position: i32) {
        self.lock().position = position;
    }

    /// Every command issued so far, in order.
    pub fn commands(&self) -> Vec<MoveCommand> {
        self.lock().commands.clone()
    }

    pub fn command_count(&self) -> usize {
        self.lock().commands.len()
    }

    /// While holding, moves stay pending until `release`/`release_all`.
    pub fn set_hold(&self, hold: bool) {
        self.lock().hold = hold;
    }

    pub fn held_count(&self) -> usize {
        self.lock().held.len()
    }

    /// Finish up to `n` held moves in issue order. Returns how many finished.
    pub fn release(&self, n: usize) -> usize {
        let done: Vec<_> = {
            let mut st = self.lock();
            let n = n.min(st.held.len());
            let done: Vec<_> = st.held.drain(..n).collect();
            for (_, cmd) in &done {
                st.position = apply(st.position, cmd);
            }
            done
        };
        let count = done.len();
        for (tx, _) in done {
            tx.complete(MoveOutcome::Reached);
        }
        count
    }

    pub fn release_all(&self) -> usize {
        self.release(usize::MAX)
    }

    /// Block until at least `n` moves are held.
    pub fn wait_for_held(&self, n: usize, timeout: Duration) -> bool {
        self.wait_until(timeout, |st| st.held.len() >= n)
    }

    /// Block until at least `n` commands were issued.
    pub fn wait_for_commands(&self, n: usize, timeout: Duration) -> bool {
        self.wait_until(timeout, |st| st.commands.len() >= n)
    }

    fn wait_until(&self, timeout: Duration, done: impl Fn(&MockState) -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        let mut st = self.lock();
        while !done(&st) {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                return false;
            }
            st = self
                .changed
                .wait_timeout(st, left)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }

    /// Fail the next `n` position reads.
    pub fn fail_next_reads(&self, n: usize) {
        self.fail_reads.store(n, Ordering::SeqCst);
    }

    /// Fail the next `n` move requests.
    pub fn fail_next_moves(&self, n: usize) {
        self.fail_moves.store(n, Ordering::SeqCst);
    }

    pub fn brakes(&self) -> usize {
        self.brakes.load(Ordering::SeqCst)
    }

    pub fn power_offs(&self) -> usize {
        self.power_offs.load(Ordering::SeqCst)
    }

    pub fn resets(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }

    pub fn is_reversed(&self) -> bool {
        self.reverse.load(Ordering::SeqCst)
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn start_move(&self, cmd: MoveCommand) -> HwResult<Completion> {
        if Self::take_failure(&self.fail_moves) {
            return Err(Box::new(std::io::Error::other("injected move failure")));
        }
        let mut st = self.lock();
        st.commands.push(cmd);
        let completion = if cmd.speed == 0 {
            Completion::resolved(MoveOutcome::Stalled)
        } else if st.hold {
            let (tx, c) = Completion::channel();
            st.held.push((tx, cmd));
            c
        } else {
            st.position = apply(st.position, &cmd);
            Completion::ready()
        };
        drop(st);
        self.changed.notify_all();
        Ok(completion)
    }

    /// Held moves end `Interrupted` without finishing their steps.
    fn interrupt(&self) {
        let held: Vec<_> = self.lock().held.drain(..).collect();
        for (tx, _) in held {
            tx.complete(MoveOutcome::Interrupted);
        }
        self.changed.notify_all();
    }
}

/// `Actuator` over a shared `MockMotor`. Dropping it releases its bus binding.
#[derive(Debug)]
pub struct MockActuator {
    motor: Arc<MockMotor>,
    bound: Option<Arc<Mutex<[bool; SLOT_COUNT]>>>,
}

impl MockActuator {
    pub fn new(port: Port) -> Self {
        Self {
            motor: Arc::new(MockMotor::new(port)),
            bound: None,
        }
    }

    pub fn at(port: Port, position: i32) -> Self {
        let a = Self::new(port);
        a.motor.set_position(position);
        a
    }

    pub fn probe(&self) -> Arc<MockMotor> {
        Arc::clone(&self.motor)
    }
}

impl Drop for MockActuator {
    fn drop(&mut self) {
        if let Some(bound) = &self.bound {
            bound.lock().unwrap_or_else(PoisonError::into_inner)[self.motor.port.index()] = false;
        }
    }
}

impl Actuator for MockActuator {
    fn port(&self) -> Port {
        self.motor.port
    }

    fn position(&self) -> HwResult<i32> {
        if MockMotor::take_failure(&self.motor.fail_reads) {
            return Err(Box::new(std::io::Error::other("injected read failure")));
        }
        Ok(self.motor.position())
    }

    fn reset_position(&self) -> HwResult<()> {
        self.motor.resets.fetch_add(1, Ordering::SeqCst);
        self.motor.set_position(0);
        Ok(())
    }

    fn start_move(&self, cmd: MoveCommand) -> HwResult<Completion> {
        self.motor.start_move(cmd)
    }

    fn brake(&self) -> HwResult<()> {
        self.motor.brakes.fetch_add(1, Ordering::SeqCst);
        self.motor.interrupt();
        Ok(())
    }

    fn power_off(&self) -> HwResult<()> {
        self.motor.power_offs.fetch_add(1, Ordering::SeqCst);
        self.motor.interrupt();
        Ok(())
    }

    fn set_reverse(&self, reverse: bool) -> HwResult<()> {
        self.motor.reverse.store(reverse, Ordering::SeqCst);
        Ok(())
    }

    fn reverse(&self) -> bool {
        self.motor.is_reversed()
    }
}

/// In-memory bus with one `MockMotor` per port.
#[derive(Debug, Clone)]
pub struct MockBus {
    motors: [Arc<MockMotor>; SLOT_COUNT],
    connected: [bool; SLOT_COUNT],
    bound: Arc<Mutex<[bool; SLOT_COUNT]>>,
}

impl Default for MockBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBus {
    /// Every port connected.
    pub fn new() -> Self {
        Self::with_connected([true; SLOT_COUNT])
    }

    pub fn with_connected(connected: [bool; SLOT_COUNT]) -> Self {
        Self {
            motors: Port::ALL.map(|p| Arc::new(MockMotor::new(p))),
            connected,
            bound: Arc::new(Mutex::new([false; SLOT_COUNT])),
        }
    }

    /// Shared state of the motor on `port`, bound or not.
    pub fn probe(&self, port: Port) -> Arc<MockMotor> {
        Arc::clone(&self.motors[port.index()])
    }

    pub fn is_bound(&self, port: Port) -> bool {
        self.bound.lock().unwrap_or_else(PoisonError::into_inner)[port.index()]
    }
}

impl Bus for MockBus {
    type Actuator = MockActuator;

    fn open(&self, port: Port) -> HwResult<MockActuator> {
        if !self.connected[port.index()] {
            return Err(Box::new(StepError::NotConnected(port)));
        }
        let mut bound = self.bound.lock().unwrap_or_else(PoisonError::into_inner);
        if bound[port.index()] {
            return Err(Box::new(StepError::PortBusy(port)));
        }
        bound[port.index()] = true;
        Ok(MockActuator {
            motor: self.probe(port),
            bound: Some(Arc::clone(&self.bound)),
        })
    }
}
