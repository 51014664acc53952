//! One-shot completion handles for motion commands.
//!
//! A `Completion` is either already resolved or backed by a bounded(1)
//! channel that the driver fills once the move ends. Waiting on a resolved
//! handle returns immediately, which lets a join step treat "no move issued"
//! and "move finished" the same way.
use crossbeam_channel as xch;

/// How a motion command ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    /// The commanded step count was executed.
    Reached,
    /// The driver gave up (stall detection or its own timeout).
    Stalled,
    /// Cut short by a brake or power-off request.
    Interrupted,
    /// The driver dropped the handle without reporting.
    Abandoned,
}

impl MoveOutcome {
    #[inline]
    pub fn is_reached(self) -> bool {
        matches!(self, MoveOutcome::Reached)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MoveOutcome::Reached => "reached",
            MoveOutcome::Stalled => "stalled",
            MoveOutcome::Interrupted => "interrupted",
            MoveOutcome::Abandoned => "abandoned",
        }
    }
}

#[derive(Debug)]
enum State {
    Done(MoveOutcome),
    Pending(xch::Receiver<MoveOutcome>),
}

#[derive(Debug)]
pub struct Completion {
    state: State,
}

/// Driver side of a `Completion`.
#[derive(Debug)]
pub struct CompletionSender {
    tx: xch::Sender<MoveOutcome>,
}

impl CompletionSender {
    /// Resolve the paired handle. Never blocks.
    pub fn complete(self, outcome: MoveOutcome) {
        // Receiver may already be gone (controller shut down); nothing to report then.
        let _ = self.tx.try_send(outcome);
    }
}

impl Completion {
    /// A handle that is already satisfied.
    pub fn ready() -> Self {
        Self::resolved(MoveOutcome::Reached)
    }

    pub fn resolved(outcome: MoveOutcome) -> Self {
        Self {
            state: State::Done(outcome),
        }
    }

    /// Create a pending handle and the sender that resolves it.
    pub fn channel() -> (CompletionSender, Completion) {
        let (tx, rx) = xch::bounded(1);
        (
            CompletionSender { tx },
            Completion {
                state: State::Pending(rx),
            },
        )
    }

    /// Block until the move ends. Repeated calls return the cached outcome.
    pub fn wait(&mut self) -> MoveOutcome {
        if let State::Pending(rx) = &self.state {
            let o = rx.recv().unwrap_or(MoveOutcome::Abandoned);
            self.state = State::Done(o);
        }
        match self.state {
            State::Done(o) => o,
            State::Pending(_) => MoveOutcome::Abandoned,
        }
    }
}
