pub mod clock;
pub mod completion;
pub mod port;

pub use clock::{Clock, MonotonicClock};
pub use completion::{Completion, CompletionSender, MoveOutcome};
pub use port::{Port, SLOT_COUNT};

/// Error type used at the hardware trait boundary.
pub type HwResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Rotation sense of a motion command, derived from the sign of its speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Reverse,
}

/// A single bounded movement instruction for one actuator.
///
/// `speed` carries the direction in its sign; `steps` is always a magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveCommand {
    pub speed: i8,
    pub ramp_up: u32,
    pub steps: u32,
    pub ramp_down: u32,
    pub brake: bool,
}

impl MoveCommand {
    pub fn direction(&self) -> Direction {
        if self.speed < 0 {
            Direction::Reverse
        } else {
            Direction::Forward
        }
    }
}

/// A position-counting motor bound to one port.
///
/// Methods take `&self`: `brake`, `power_off` and `reset_position` must be
/// callable while a move started by `start_move` is still running.
pub trait Actuator: Send + Sync {
    fn port(&self) -> Port;

    /// Absolute position counter.
    fn position(&self) -> HwResult<i32>;

    fn reset_position(&self) -> HwResult<()>;

    /// Start a move and return immediately. The returned handle resolves
    /// when the hardware reports the move finished.
    fn start_move(&self, cmd: MoveCommand) -> HwResult<Completion>;

    fn brake(&self) -> HwResult<()>;

    fn power_off(&self) -> HwResult<()>;

    fn set_reverse(&self, reverse: bool) -> HwResult<()>;

    fn reverse(&self) -> bool;
}

/// Opens actuators by port. Fails for unknown, unreachable, or already bound ports.
pub trait Bus {
    type Actuator: Actuator + 'static;

    fn open(&self, port: Port) -> HwResult<Self::Actuator>;
}
