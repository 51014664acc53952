//! Maps `Box<dyn Error>` from trait boundaries to typed `StepError`.
//!
//! The traits in `stepper_traits` use `Box<dyn Error + Send + Sync>` so any
//! driver can plug in; this module converts those to our typed error enum,
//! with an optional feature-gated path for `stepper_hardware::HwError`
//! downcasting.

use stepper_traits::{HwResult, Port};

use crate::error::StepError;

/// Map a trait-boundary error raised while talking to `port`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to string-based heuristics.
pub fn map_hw_error(port: Port, e: &(dyn std::error::Error + 'static)) -> StepError {
    if let Some(se) = e.downcast_ref::<StepError>() {
        return se.clone();
    }

    #[cfg(feature = "hardware-errors")]
    {
        use stepper_hardware::HwError;
        if let Some(hw) = e.downcast_ref::<HwError>() {
            return match hw {
                HwError::NotConnected(p) => StepError::NotConnected(*p),
                HwError::PortBusy(p) => StepError::PortBusy(*p),
                other => StepError::HardwareFault {
                    port,
                    reason: other.to_string(),
                },
            };
        }
    }

    let s = e.to_string();
    let lower = s.to_lowercase();
    if lower.contains("timeout") || lower.contains("timed out") {
        StepError::Timeout(port)
    } else if lower.contains("already bound") {
        StepError::PortBusy(port)
    } else {
        StepError::Hardware { port, reason: s }
    }
}

/// Map the error side of a trait-boundary result.
pub(crate) fn lift<T>(port: Port, r: HwResult<T>) -> Result<T, StepError> {
    r.map_err(|e| map_hw_error(port, &*e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_string_heuristics() {
        let e = std::io::Error::other("read timed out");
        assert_eq!(map_hw_error(Port::B, &e), StepError::Timeout(Port::B));

        let e = std::io::Error::other("bus glitch");
        match map_hw_error(Port::A, &e) {
            StepError::Hardware { port, reason } => {
                assert_eq!(port, Port::A);
                assert_eq!(reason, "bus glitch");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn typed_errors_pass_through() {
        let e = StepError::NotConnected(Port::D);
        assert_eq!(map_hw_error(Port::D, &e), e);
    }

    #[cfg(feature = "hardware-errors")]
    #[test]
    fn downcasts_driver_errors() {
        use stepper_hardware::HwError;
        let e = HwError::PortBusy(Port::C);
        assert_eq!(map_hw_error(Port::C, &e), StepError::PortBusy(Port::C));
        let e = HwError::Gpio("pin 4 busy".into());
        assert!(matches!(
            map_hw_error(Port::D, &e),
            StepError::HardwareFault { port: Port::D, .. }
        ));
    }
}
