//! Target and speed storage shared between callers and a control loop.
//!
//! `Targets` keeps every slot's value, a group-wide dirty flag and two
//! sequence counters under one mutex, so the loop can check-and-clear the
//! dirty flag atomically with respect to concurrent writers. `Speeds` is a
//! plain per-slot array of atomics with no change detection.
use std::sync::atomic::{AtomicI8, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use stepper_traits::Port;

use crate::signal::WakeSignal;

/// Anything that names a slot.
pub trait SlotId: Copy {
    fn slot(self) -> usize;
}

impl SlotId for usize {
    #[inline]
    fn slot(self) -> usize {
        self
    }
}

impl SlotId for Port {
    #[inline]
    fn slot(self) -> usize {
        self.index()
    }
}

#[track_caller]
fn checked<const N: usize>(slot: impl SlotId) -> usize {
    let i = slot.slot();
    assert!(i < N, "slot {i} out of range for {N} slots");
    i
}

#[derive(Debug)]
struct SlotState<const N: usize> {
    values: [i32; N],
    dirty: bool,
    /// Bumped on every change request.
    requested: u64,
    /// Highest `requested` value covered by a finished pass.
    serviced: u64,
}

/// Snapshot handed to the loop when there is pending work.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Pending<const N: usize> {
    pub values: [i32; N],
    pub seq: u64,
}

#[derive(Debug)]
pub struct Targets<const N: usize> {
    state: Mutex<SlotState<N>>,
    idle: Condvar,
    wake: WakeSignal,
}

impl<const N: usize> Targets<N> {
    pub(crate) fn new(initial: [i32; N], wake: WakeSignal) -> Self {
        Self {
            state: Mutex::new(SlotState {
                values: initial,
                dirty: false,
                requested: 0,
                serviced: 0,
            }),
            idle: Condvar::new(),
            wake,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SlotState<N>> {
        // Values stay consistent even if a writer panicked mid-call.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of slots.
    pub const fn len(&self) -> usize {
        N
    }

    pub const fn is_empty(&self) -> bool {
        N == 0
    }

    /// Last stored value for `slot`.
    ///
    /// # Panics
    ///
    /// If `slot` is out of range, like slice indexing.
    #[track_caller]
    pub fn get(&self, slot: impl SlotId) -> i32 {
        let i = checked::<N>(slot);
        self.lock().values[i]
    }

    /// Store `value`. Returns `true` when it differed and the loop was woken.
    ///
    /// # Panics
    ///
    /// If `slot` is out of range.
    #[track_caller]
    pub fn set(&self, slot: impl SlotId, value: i32) -> bool {
        let i = checked::<N>(slot);
        {
            let mut st = self.lock();
            if st.values[i] == value {
                return false;
            }
            st.values[i] = value;
            st.dirty = true;
            st.requested += 1;
        }
        self.wake.notify();
        true
    }

    /// Apply several writes under one lock with at most one wake.
    /// `None` keeps the slot's value.
    pub fn set_many(&self, values: [Option<i32>; N]) -> bool {
        let changed = {
            let mut st = self.lock();
            let mut changed = false;
            for (cur, new) in st.values.iter_mut().zip(values) {
                if let Some(v) = new
                    && *cur != v
                {
                    *cur = v;
                    changed = true;
                }
            }
            if changed {
                st.dirty = true;
                st.requested += 1;
            }
            changed
        };
        if changed {
            self.wake.notify();
        }
        changed
    }

    pub fn snapshot(&self) -> [i32; N] {
        self.lock().values
    }

    /// Every requested change has been covered by a finished pass.
    pub fn is_idle(&self) -> bool {
        let st = self.lock();
        st.serviced >= st.requested
    }

    /// Block until idle or `timeout` elapses. Returns `true` when idle.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let st = self.lock();
        let (st, _) = self
            .idle
            .wait_timeout_while(st, timeout, |s| s.serviced < s.requested)
            .unwrap_or_else(PoisonError::into_inner);
        st.serviced >= st.requested
    }

    /// Request a pass without changing any value.
    pub(crate) fn force(&self) {
        {
            let mut st = self.lock();
            st.dirty = true;
            st.requested += 1;
        }
        self.wake.notify();
    }

    /// Check-and-clear the dirty flag. `None` when the wake was spurious.
    pub(crate) fn take_pending(&self) -> Option<Pending<N>> {
        let mut st = self.lock();
        if !st.dirty {
            return None;
        }
        st.dirty = false;
        Some(Pending {
            values: st.values,
            seq: st.requested,
        })
    }

    pub(crate) fn mark_serviced(&self, seq: u64) {
        let mut st = self.lock();
        if seq > st.serviced {
            st.serviced = seq;
        }
        if st.serviced >= st.requested {
            self.idle.notify_all();
        }
    }

    /// Zero every value without requesting a pass.
    pub(crate) fn zero(&self) {
        self.lock().values = [0; N];
    }

    /// Wake the loop without marking work. Used by disposal.
    pub(crate) fn wake(&self) {
        self.wake.notify();
    }

    /// Loop side: block until woken.
    pub(crate) fn wait_wake(&self) -> bool {
        self.wake.wait()
    }
}

/// Per-slot speeds. Sign is ignored by the dispatcher.
#[derive(Debug)]
pub struct Speeds<const N: usize> {
    values: [AtomicI8; N],
}

impl<const N: usize> Speeds<N> {
    pub(crate) fn new(initial: i8) -> Self {
        Self {
            values: std::array::from_fn(|_| AtomicI8::new(initial)),
        }
    }

    pub const fn len(&self) -> usize {
        N
    }

    pub const fn is_empty(&self) -> bool {
        N == 0
    }

    /// # Panics
    ///
    /// If `slot` is out of range.
    #[track_caller]
    pub fn get(&self, slot: impl SlotId) -> i8 {
        self.values[checked::<N>(slot)].load(Ordering::Relaxed)
    }

    /// # Panics
    ///
    /// If `slot` is out of range.
    #[track_caller]
    pub fn set(&self, slot: impl SlotId, speed: i8) {
        self.values[checked::<N>(slot)].store(speed, Ordering::Relaxed);
    }

    /// Commanded magnitude for `slot`; `i8::MIN` saturates to 127.
    ///
    /// # Panics
    ///
    /// If `slot` is out of range.
    #[track_caller]
    pub fn magnitude(&self, slot: impl SlotId) -> i8 {
        self.get(slot).saturating_abs()
    }
}
