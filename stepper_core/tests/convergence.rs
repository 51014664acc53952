//! Property tests: any write sequence settles on its last value.

use std::time::Duration;

use proptest::collection::vec;
use proptest::prelude::*;
use stepper_core::mocks::MockBus;
use stepper_core::{ControllerCfg, Port, StepMotor, StepMotorGroup};

const T: Duration = Duration::from_secs(5);

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn single_motor_settles_on_last_write(
        writes in vec(-500i32..500, 1..20),
        speed in 1i8..=127,
    ) {
        let bus = MockBus::new();
        let probe = bus.probe(Port::A);
        let m = StepMotor::open(&bus, Port::A, &ControllerCfg::default()).unwrap();
        m.set_speed(speed);
        for w in &writes {
            m.set_target(*w);
        }
        prop_assert!(m.wait_idle(T));

        let last = *writes.last().unwrap();
        prop_assert_eq!(m.target(), last);
        prop_assert_eq!(probe.position(), last);
        prop_assert!(probe.command_count() <= writes.len());
        for c in probe.commands() {
            prop_assert_eq!(c.speed.unsigned_abs(), speed.unsigned_abs());
            prop_assert!(c.steps > 0);
        }
        m.shutdown().unwrap();
    }

    #[test]
    fn group_settles_on_last_row(
        rows in vec(proptest::array::uniform4(proptest::option::of(-300i32..300)), 1..12),
    ) {
        let bus = MockBus::new();
        let g = StepMotorGroup::open(&bus, &Port::ALL, &ControllerCfg::default()).unwrap();
        let mut want = [0i32; 4];
        for row in &rows {
            g.targets().set_many(*row);
            for (w, v) in want.iter_mut().zip(row) {
                if let Some(v) = v {
                    *w = *v;
                }
            }
        }
        prop_assert!(g.wait_idle(T));
        prop_assert_eq!(g.targets().snapshot(), want);
        prop_assert_eq!(g.positions().unwrap(), want.map(Some));
        g.shutdown().unwrap();
    }
}
