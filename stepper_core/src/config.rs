//! Runtime configuration for the controllers.
//!
//! Separate from the TOML-deserialized config in `stepper_config`; see
//! `conversions` for the mapping.
use stepper_traits::Port;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerCfg {
    /// Initial speed for every bound slot. Sign is ignored.
    pub speed: i8,
    /// Ports whose polarity is reversed at construction.
    pub reversed: Vec<Port>,
}

impl Default for ControllerCfg {
    fn default() -> Self {
        Self {
            speed: i8::MAX,
            reversed: Vec::new(),
        }
    }
}

impl ControllerCfg {
    pub fn is_reversed(&self, port: Port) -> bool {
        self.reversed.contains(&port)
    }
}
