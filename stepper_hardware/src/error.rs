use stepper_traits::Port;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("no actuator connected on port {0}")]
    NotConnected(Port),
    #[error("port {0} is already bound")]
    PortBusy(Port),
    #[error("gpio error: {0}")]
    Gpio(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
