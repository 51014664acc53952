//! Auto-reset wake signal between callers and a control loop.
//!
//! Backed by a bounded(1) channel: at most one wake token is pending, extra
//! notifications coalesce into it, and each `wait` consumes exactly one.
use crossbeam_channel as xch;

#[derive(Debug, Clone)]
pub struct WakeSignal {
    tx: xch::Sender<()>,
    rx: xch::Receiver<()>,
}

impl Default for WakeSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl WakeSignal {
    pub fn new() -> Self {
        let (tx, rx) = xch::bounded(1);
        Self { tx, rx }
    }

    /// Arm the signal. Never blocks.
    pub fn notify(&self) {
        // Full means a token is already pending; the loop will see it.
        let _ = self.tx.try_send(());
    }

    /// Block until armed, consuming the token. `false` if the channel closed.
    pub fn wait(&self) -> bool {
        self.rx.recv().is_ok()
    }

    pub fn is_armed(&self) -> bool {
        !self.rx.is_empty()
    }
}
