use stepper_traits::Port;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StepError {
    #[error("no actuator connected on port {0}")]
    NotConnected(Port),
    #[error("port {0} is already bound")]
    PortBusy(Port),
    #[error("hardware error on port {port}: {reason}")]
    Hardware { port: Port, reason: String },
    #[error("hardware fault on port {port}: {reason}")]
    HardwareFault { port: Port, reason: String },
    #[error("timeout talking to port {0}")]
    Timeout(Port),
    #[error("invalid state: {0}")]
    State(String),
}

impl StepError {
    /// Port the error originated from, when there is one.
    pub fn port(&self) -> Option<Port> {
        match self {
            StepError::NotConnected(p) | StepError::PortBusy(p) | StepError::Timeout(p) => Some(*p),
            StepError::Hardware { port, .. } | StepError::HardwareFault { port, .. } => {
                Some(*port)
            }
            StepError::State(_) => None,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("no ports to bind")]
    NoPorts,
    #[error("port {0} listed twice")]
    DuplicatePort(Port),
    #[error("failed to spawn control loop: {0}")]
    Spawn(String),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
