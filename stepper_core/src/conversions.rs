//! Conversions bridging `stepper_config` types to `stepper_core` types.

use crate::config::ControllerCfg;

// ── ControllerCfg ────────────────────────────────────────────────────────────

impl TryFrom<&stepper_config::Config> for ControllerCfg {
    type Error = eyre::Report;

    fn try_from(c: &stepper_config::Config) -> Result<Self, Self::Error> {
        Ok(Self {
            speed: c.motion.speed,
            reversed: c.reversed()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stepper_traits::Port;

    #[test]
    fn maps_motion_section() {
        let cfg = stepper_config::load_toml(
            r#"
            [motion]
            speed = -60
            reverse = ["c", "A"]
            "#,
        )
        .unwrap();
        let cc = ControllerCfg::try_from(&cfg).unwrap();
        assert_eq!(cc.speed, -60);
        assert_eq!(cc.reversed, vec![Port::C, Port::A]);
        assert!(cc.is_reversed(Port::A));
        assert!(!cc.is_reversed(Port::B));
    }

    #[test]
    fn bad_reverse_list_is_rejected() {
        let cfg = stepper_config::load_toml("[motion]\nreverse = [\"Z\"]\n").unwrap();
        let err = ControllerCfg::try_from(&cfg).unwrap_err();
        assert!(err.to_string().contains("motion.reverse"));
    }
}
