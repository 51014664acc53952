//! Position-delta dispatch shared by the single and group loops.
use std::sync::atomic::{AtomicBool, Ordering};

use stepper_traits::{Actuator, Completion, MoveCommand, MoveOutcome, Port};

use crate::error::StepError;
use crate::hw_error::map_hw_error;
use crate::signal::WakeSignal;
use crate::slots::{Speeds, Targets};
use crate::stats::LoopStats;

/// Command that moves an actuator from `position` to `target`, or `None`
/// when it is already there.
///
/// The speed's sign is ignored; direction comes from the sign of the error.
/// Ramps are zero and the move brakes at the end.
pub fn plan_move(target: i32, position: i32, speed: i8) -> Option<MoveCommand> {
    if target == position {
        return None;
    }
    let magnitude = speed.saturating_abs();
    let speed = if target > position {
        magnitude
    } else {
        -magnitude
    };
    Some(MoveCommand {
        speed,
        ramp_up: 0,
        steps: target.abs_diff(position),
        ramp_down: 0,
        brake: true,
    })
}

/// State shared between a controller handle and its loop thread.
#[derive(Debug)]
pub(crate) struct Shared<const N: usize> {
    pub targets: Targets<N>,
    pub speeds: Speeds<N>,
    pub stop: AtomicBool,
    pub stats: LoopStats,
}

impl<const N: usize> Shared<N> {
    pub fn new(initial: [i32; N], speed: i8) -> Self {
        Self {
            targets: Targets::new(initial, WakeSignal::new()),
            speeds: Speeds::new(speed),
            stop: AtomicBool::new(false),
            stats: LoopStats::default(),
        }
    }

    #[inline]
    pub fn stopping(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Set the stop flag and deliver the wake the loop needs to observe it.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
        self.targets.wake();
    }
}

/// Record a runtime fault: logged, counted, kept as `last_error`.
pub(crate) fn record_fault(stats: &LoopStats, e: StepError) {
    tracing::error!(port = ?e.port(), error = %e, "control loop fault");
    stats.fault(e);
}

/// Read `actuator`'s position and issue the move toward `target`.
///
/// Returns the move's completion, or `None` when no move was issued
/// (already at target, or a read/move failure that was recorded).
pub(crate) fn dispatch<A: Actuator>(
    actuator: &A,
    target: i32,
    speed: i8,
    stats: &LoopStats,
) -> Option<Completion> {
    let port = actuator.port();
    let position = match actuator.position() {
        Ok(p) => p,
        Err(e) => {
            record_fault(stats, map_hw_error(port, &*e));
            return None;
        }
    };
    let Some(cmd) = plan_move(target, position, speed) else {
        tracing::trace!(%port, target, position, "at target");
        return None;
    };
    tracing::debug!(
        %port,
        target,
        position,
        err = i64::from(target) - i64::from(position),
        steps = cmd.steps,
        speed = cmd.speed,
        "dispatch move"
    );
    match actuator.start_move(cmd) {
        Ok(c) => {
            stats.moved();
            Some(c)
        }
        Err(e) => {
            record_fault(stats, map_hw_error(port, &*e));
            None
        }
    }
}

/// Log and count a finished move that did not reach its step count.
pub(crate) fn note_outcome(port: Port, outcome: MoveOutcome, stats: &LoopStats) {
    if outcome.is_reached() {
        tracing::trace!(%port, "move reached");
    } else {
        tracing::warn!(%port, outcome = outcome.as_str(), "move ended early");
        stats.stalled();
    }
}

/// Power off during disposal. Failures are logged; disposal continues.
pub(crate) fn power_off_quietly<A: Actuator>(actuator: &A) {
    if let Err(e) = actuator.power_off() {
        tracing::warn!(port = %actuator.port(), error = %e, "power_off failed during shutdown");
    }
}
