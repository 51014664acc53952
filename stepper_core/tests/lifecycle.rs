//! Construction failures and disposal.

use std::time::Duration;

use rstest::rstest;
use stepper_core::mocks::{MockActuator, MockBus};
use stepper_core::{BuildError, ControllerCfg, Port, Report, StepError, StepMotor, StepMotorGroup};
use stepper_hardware::{SimBus, SimCfg};

const T: Duration = Duration::from_secs(2);

fn step_error(e: &Report) -> Option<&StepError> {
    e.chain().find_map(|c| c.downcast_ref::<StepError>())
}

fn build_error(e: &Report) -> Option<&BuildError> {
    e.chain().find_map(|c| c.downcast_ref::<BuildError>())
}

#[test]
fn shutdown_powers_off_once_and_releases_port() {
    let bus = MockBus::new();
    let m = StepMotor::open(&bus, Port::B, &ControllerCfg::default()).unwrap();
    assert!(bus.is_bound(Port::B));
    m.shutdown().unwrap();
    assert_eq!(bus.probe(Port::B).power_offs(), 1);
    assert!(!bus.is_bound(Port::B));
}

#[test]
fn drop_disposes_like_shutdown() {
    let bus = MockBus::new();
    {
        let _m = StepMotor::open(&bus, Port::A, &ControllerCfg::default()).unwrap();
    }
    assert_eq!(bus.probe(Port::A).power_offs(), 1);
    assert!(!bus.is_bound(Port::A));
}

#[test]
fn shutdown_waits_for_move_in_flight() {
    let bus = MockBus::new();
    let probe = bus.probe(Port::A);
    probe.set_hold(true);
    let m = StepMotor::open(&bus, Port::A, &ControllerCfg::default()).unwrap();
    m.set_target(20);
    assert!(probe.wait_for_held(1, T));

    let releaser = {
        let probe = probe.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            probe.release_all()
        })
    };
    m.shutdown().unwrap();
    assert_eq!(releaser.join().unwrap(), 1);
    assert_eq!(probe.position(), 20);
    assert_eq!(probe.power_offs(), 1);
}

#[test]
fn group_shutdown_powers_off_each_bound_actuator_once() {
    let bus = MockBus::new();
    let g = StepMotorGroup::open(&bus, &[Port::A, Port::C, Port::D], &ControllerCfg::default())
        .unwrap();
    assert_eq!(g.ports(), vec![Port::A, Port::C, Port::D]);
    g.shutdown().unwrap();
    for p in [Port::A, Port::C, Port::D] {
        assert_eq!(bus.probe(p).power_offs(), 1);
        assert!(!bus.is_bound(p));
    }
    assert_eq!(bus.probe(Port::B).power_offs(), 0);
}

#[test]
fn unconnected_port_fails_construction() {
    let bus = MockBus::with_connected([true, false, true, true]);
    let err = StepMotor::open(&bus, Port::B, &ControllerCfg::default()).unwrap_err();
    assert_eq!(step_error(&err), Some(&StepError::NotConnected(Port::B)));
}

#[test]
fn port_cannot_be_bound_twice() {
    let bus = MockBus::new();
    let _first = StepMotor::open(&bus, Port::A, &ControllerCfg::default()).unwrap();
    let err = StepMotor::open(&bus, Port::A, &ControllerCfg::default()).unwrap_err();
    assert_eq!(step_error(&err), Some(&StepError::PortBusy(Port::A)));
}

#[rstest]
#[case(&[], BuildError::NoPorts)]
#[case(&[Port::A, Port::B, Port::A], BuildError::DuplicatePort(Port::A))]
fn group_port_list_is_checked_before_binding(#[case] ports: &[Port], #[case] want: BuildError) {
    let bus = MockBus::new();
    let err = StepMotorGroup::open(&bus, ports, &ControllerCfg::default()).unwrap_err();
    assert_eq!(build_error(&err), Some(&want));
    assert!(Port::ALL.iter().all(|p| !bus.is_bound(*p)));
}

#[test]
fn partial_group_open_releases_earlier_ports() {
    let bus = MockBus::with_connected([true, false, true, true]);
    let err = StepMotorGroup::open(&bus, &[Port::A, Port::B], &ControllerCfg::default())
        .unwrap_err();
    assert_eq!(step_error(&err), Some(&StepError::NotConnected(Port::B)));
    assert!(!bus.is_bound(Port::A));
}

#[test]
fn failed_initial_read_fails_construction() {
    let a = MockActuator::new(Port::D);
    a.probe().fail_next_reads(1);
    let err = StepMotor::new(a, &ControllerCfg::default()).unwrap_err();
    assert!(format!("{err:#}").contains("read initial position of port D"));
    assert!(matches!(
        step_error(&err),
        Some(StepError::Hardware { port: Port::D, .. })
    ));
}

#[test]
fn group_new_rejects_duplicate_actuators() {
    let err = StepMotorGroup::new(
        vec![MockActuator::new(Port::C), MockActuator::new(Port::C)],
        &ControllerCfg::default(),
    )
    .unwrap_err();
    assert_eq!(build_error(&err), Some(&BuildError::DuplicatePort(Port::C)));
}

#[test]
fn simulated_bus_round_trip() {
    let bus = SimBus::new(SimCfg {
        step_period: Duration::from_micros(200),
        ..SimCfg::default()
    });
    bus.set_position(Port::B, -10);
    let g = StepMotorGroup::open(&bus, &[Port::A, Port::B], &ControllerCfg::default()).unwrap();
    assert_eq!(g.targets().get(Port::B), -10);

    g.targets().set_many([Some(30), Some(10), None, None]);
    assert!(g.wait_idle(T));
    assert_eq!(g.positions().unwrap(), [Some(30), Some(10), None, None]);

    g.shutdown().unwrap();
    assert_eq!(bus.probe(Port::A).power_offs(), 1);
    assert!(!bus.is_bound(Port::A));
    assert!(!bus.is_bound(Port::B));
}

#[test]
fn simulated_bus_errors_map_to_typed_errors() {
    let bus = SimBus::new(SimCfg {
        connected: [true, true, false, true],
        ..SimCfg::default()
    });
    let err = StepMotor::open(&bus, Port::C, &ControllerCfg::default()).unwrap_err();
    assert_eq!(step_error(&err), Some(&StepError::NotConnected(Port::C)));

    let _a = StepMotor::open(&bus, Port::A, &ControllerCfg::default()).unwrap();
    let err = StepMotor::open(&bus, Port::A, &ControllerCfg::default()).unwrap_err();
    assert_eq!(step_error(&err), Some(&StepError::PortBusy(Port::A)));
}
