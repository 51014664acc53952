//! Loop counters and the last recorded fault.
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::error::StepError;

#[derive(Debug, Default)]
pub struct LoopStats {
    passes: AtomicU64,
    moves: AtomicU64,
    faults: AtomicU64,
    stalls: AtomicU64,
    last_error: Mutex<Option<StepError>>,
}

/// Point-in-time copy of `LoopStats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Service passes run (spurious wakes excluded).
    pub passes: u64,
    /// Motion commands issued.
    pub moves: u64,
    /// Read or move failures.
    pub faults: u64,
    /// Moves that ended without reaching their step count.
    pub stalls: u64,
}

impl LoopStats {
    pub(crate) fn pass(&self) {
        self.passes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn moved(&self) {
        self.moves.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn stalled(&self) {
        self.stalls.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn fault(&self, e: StepError) {
        self.faults.fetch_add(1, Ordering::Relaxed);
        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(e);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            passes: self.passes.load(Ordering::Relaxed),
            moves: self.moves.load(Ordering::Relaxed),
            faults: self.faults.load(Ordering::Relaxed),
            stalls: self.stalls.load(Ordering::Relaxed),
        }
    }

    pub fn last_error(&self) -> Option<StepError> {
        self.last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
